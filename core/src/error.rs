//! Error types for the **bitforest** core crate.
//!
//! All high-level operations return [`crate::Result`] which is a convenient
//! alias for `core::result::Result<T, Error>`.
//!
//! The enum is intentionally minimal and high-level.  Lower-level errors are
//! mapped into one of these variants before bubbling up to callers.
//!
//! # Examples
//!
//! ```
//! use bitforest_core::{Error, Result};
//!
//! fn demo_fn(fail: bool) -> Result<()> {
//!     if fail {
//!         Err(Error::InvalidId)
//!     } else {
//!         Ok(())
//!     }
//! }
//! ```

use thiserror::Error;

/// Core crate error type.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum Error {
    /// A header, transaction or block was the wrong length or truncated.
    #[error("bad length")]
    BadLength,

    /// Extra bytes remained after decoding a block.
    #[error("garbage after block")]
    GarbageAfterBlock,

    /// A varint-prefixed count exceeded the sanity bound.
    #[error("unreasonable count")]
    UnreasonableCount,

    /// An identity script was malformed, truncated, or referenced an
    /// out-of-bounds signature.
    #[error("invalid identity script")]
    InvalidId,

    /// The identity script ran to completion but the quorum was not met.
    #[error("quorum not satisfied")]
    NoQuorum,

    /// An operation's binary encoding was malformed.
    #[error("invalid operation")]
    InvalidOp,

    /// An operation log failed signature-chain or nonce-uniqueness validation.
    #[error("invalid operation log")]
    InvalidLog,

    /// Placeholder for errors originating from external crates.
    #[error("{0}")]
    Other(&'static str),
}

/// Convenient result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
