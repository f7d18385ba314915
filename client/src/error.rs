//! Error types for the **bitforest** client crate.

use thiserror::Error;

/// Client crate error type.
#[derive(Debug, Error)]
pub enum Error {
    /// A codec error from `bitforest-core`.
    #[error(transparent)]
    Core(#[from] bitforest_core::Error),

    /// An HTTP transport error while fetching a served artifact.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// A cache-directory read/write error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A served artifact's JSON body didn't parse.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// The cached header chain failed the backward linkage check.
    #[error("invalid header chain")]
    InvalidHeaders,

    /// The cached transaction chain failed the forward linkage or Merkle
    /// check.
    #[error("invalid tx chain")]
    InvalidTxChain,

    /// A served op-log entry's shape or proof didn't check out.
    #[error("invalid op log entries")]
    InvalidOpEntries,

    /// The cached tx chain is shorter than the server's op-log entries;
    /// the caller should re-`sync` and retry.
    #[error("cache out of sync with server")]
    OutOfSync,

    /// A cached artifact file had the wrong shape to even start parsing
    /// (e.g. a `block_headers` file not a multiple of the header length).
    #[error("malformed cached artifact: {0}")]
    MalformedCache(String),
}

/// Convenient result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
