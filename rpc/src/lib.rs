//! Bitcoin RPC collaborator.
//!
//! Everything the anchor pipeline and server need from an external Bitcoin
//! node, behind one trait: [`BitcoinRpc`]. [`client::CoreRpcClient`] talks
//! to a real Bitcoin-Core-compatible node over JSON-RPC 1.0;
//! [`mock::MockRpc`] is an in-process synthetic chain for tests and local
//! demos.

pub mod client;
pub mod error;
pub mod mock;

pub use client::CoreRpcClient;
pub use error::{Error, Result};
pub use mock::MockRpc;

/// Everything the rest of the workspace needs from a Bitcoin node.
///
/// Hashes (block hashes, tx hashes) are always in *internal* (little-endian)
/// order here, matching how they're packed into headers and inputs
/// elsewhere in this workspace — implementations are responsible for any
/// byte-order conversion their backend needs.
pub trait BitcoinRpc {
    /// Total number of blocks in the canonical chain.
    fn block_count(&self) -> Result<u64>;

    /// The hash of the block at `idx`.
    fn block_hash(&self, idx: u64) -> Result<[u8; 32]>;

    /// The height of the block identified by `hash`.
    fn block_idx(&self, hash: [u8; 32]) -> Result<u64>;

    /// The full serialized block at `idx`.
    fn block(&self, idx: u64) -> Result<Vec<u8>>;

    /// The 80-byte serialized header at `idx`.
    fn header(&self, idx: u64) -> Result<Vec<u8>>;

    /// The height of the block containing `tx_hash`, if confirmed.
    fn locate_tx(&self, tx_hash: [u8; 32]) -> Result<u64>;

    /// Signs `tx` with the key behind `wif`, returning the signed tx bytes.
    fn sign_tx(&self, tx: &[u8], wif: &str) -> Result<Vec<u8>>;

    /// Submits `tx` to the node's mempool.
    fn broadcast_tx(&self, tx: &[u8]) -> Result<()>;
}
