//! Error types for the **bitforest** diff-forest crate.

use thiserror::Error;

/// Forest crate error type.
#[derive(Debug, Error)]
pub enum Error {
    /// A lower-level codec or identity-script error from `bitforest-core`.
    #[error(transparent)]
    Core(#[from] bitforest_core::Error),

    /// The underlying SQLite store returned an error.
    #[error("forest store error: {0}")]
    Db(String),

    /// A tree-root hash did not resolve to any stored node.
    #[error("unknown tree root")]
    UnknownRoot,

    /// A staged key was looked up during commit but its value vanished.
    #[error("staging entry disappeared mid-commit")]
    StagingVanished,
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Db(e.to_string())
    }
}

/// Convenient result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
