//! Bitforest Core Library
//!
//! Provides the cryptographic primitives shared by every other bitforest
//! crate: the Bitcoin-compatible binary codec, the identity-script
//! interpreter, and operation/operation-log semantics.

pub mod codec;
pub mod error;
pub mod idscript;
pub mod operation;

pub use codec::{dsha256, hash256, Block, Header, Transaction, TxInput, TxOutput, HEADER_LEN};
pub use error::{Error, Result};
pub use idscript::IdScript;
pub use operation::{Operation, OperationLog};

/// A bare 32-byte hash, used throughout for tree-node and transaction hashes.
pub type Hash = [u8; 32];

/// The all-zero hash sentinel used for absent children in the diff-forest.
pub const ZERO_HASH: Hash = [0u8; 32];
