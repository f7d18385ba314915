//! Bitforest authenticated diff-forest.
//!
//! A content-addressed store of immutable binary-search-tree snapshots
//! over `(name -> operation-log bytes)` bindings. Writers stage operations
//! per name and commit them into a new tree snapshot; readers ask for an
//! inclusion or exclusion proof against any historical root.

pub mod cache;
pub mod error;
pub mod node;
pub mod store;

pub use error::{Error, Result};
pub use node::{AbbrNode, FullNode, Proof};
pub use store::Store;
