//! Error types for the **bitforest** Bitcoin RPC crate.

use thiserror::Error;

/// RPC crate error type.
#[derive(Debug, Error)]
pub enum Error {
    /// The HTTP transport itself failed (connection refused, timeout, TLS).
    #[error("rpc transport error: {0}")]
    Transport(String),

    /// The node returned a non-2xx HTTP status.
    #[error("rpc http status {0}")]
    HttpStatus(u16),

    /// The JSON-RPC envelope carried a non-null `error` field.
    #[error("rpc error: {0}")]
    Remote(String),

    /// The response body wasn't the JSON shape this call expected.
    #[error("unexpected rpc response shape: {0}")]
    BadShape(String),

    /// A hex field in the response failed to decode.
    #[error("bad hex in rpc response")]
    BadHex,

    /// A lower-level codec error from `bitforest-core`.
    #[error(transparent)]
    Core(#[from] bitforest_core::Error),

    /// Requested block/tx index or hash is absent from this collaborator.
    #[error("not found")]
    NotFound,
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

/// Convenient result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
