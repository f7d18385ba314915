//! Error types for the **bitforest** anchor pipeline crate.

use thiserror::Error;

/// Anchor crate error type.
#[derive(Debug, Error)]
pub enum Error {
    /// A lower-level codec error from `bitforest-core`.
    #[error(transparent)]
    Core(#[from] bitforest_core::Error),

    /// A diff-forest error surfaced while listing roots.
    #[error(transparent)]
    Forest(#[from] bitforest_forest::Error),

    /// A Bitcoin RPC collaborator error (sign/broadcast/etc).
    #[error(transparent)]
    Rpc(#[from] bitforest_rpc::Error),

    /// The local TX_HISTORY/FUNDS store returned an error.
    #[error("anchor store error: {0}")]
    Db(String),

    /// Available funding can't cover the dust output plus fee.
    #[error("insufficient funds: have {available}, need more than {dust_plus_fee}")]
    InsufficientFunds { available: u64, dust_plus_fee: u64 },

    /// There is no prior anchor and no unspent `FUNDS` row to build from.
    #[error("no funding source available")]
    NoFunding,
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Db(e.to_string())
    }
}

/// Convenient result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
