//! Pure generators for the artifacts a bitforest server exposes to clients:
//! the concatenated header chain, the self-chained anchor transaction
//! history (with confirmation position and Merkle branch when known), and
//! a name's full operation-log entries.

use bitforest_anchor::Pipeline;
use bitforest_core::codec::{hash256, Block, Transaction};
use bitforest_forest::Store as ForestStore;
use bitforest_rpc::BitcoinRpc;
use serde::Serialize;

use crate::error::Result;

/// One entry of `/txchain.json`: a self-chained anchor transaction plus
/// (when the transaction has been mined) where it landed.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TxChainEntry {
    pub raw_tx: String,
    /// Height of the confirming block, or `-1` if still unconfirmed.
    pub block_idx: i64,
    /// Index of the transaction within that block, or `-1` if unconfirmed.
    pub pos_in_blk: i64,
    /// Merkle branch from the transaction up to the block's Merkle root,
    /// empty if unconfirmed.
    pub merkle: Vec<String>,
}

/// One entry of `/oplogs/<name>.json`: the bytes staged for `name` at a
/// given tree root, and the abbreviated inclusion (or exclusion) proof
/// against that root. `proof` is `None` only for the final entry, which
/// represents the not-yet-committed staging batch.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OpLogEntry {
    pub raw_ops: String,
    pub proof: Option<Vec<String>>,
}

/// Builds the `/txchain.json` body: the anchor pipeline's history, each
/// entry annotated with its confirmation position via `rpc`.
pub fn tx_chain_body<R: BitcoinRpc>(pipeline: &Pipeline<R>, rpc: &R) -> Result<Vec<u8>> {
    let mut entries = Vec::new();
    for raw_tx in pipeline.history()? {
        let tx = Transaction::from_bytes(&raw_tx)?;
        let tx_hash = hash256(&tx);
        let (block_idx, pos_in_blk, merkle) = match rpc.locate_tx(tx_hash) {
            Ok(idx) => {
                let block_bytes = rpc.block(idx)?;
                let block = Block::from_bytes(&block_bytes)?;
                match block.merkle_branch(&tx_hash) {
                    Some((branch, pos)) => (
                        idx as i64,
                        pos as i64,
                        branch.iter().map(hex::encode).collect(),
                    ),
                    None => (-1, -1, Vec::new()),
                }
            }
            Err(_) => (-1, -1, Vec::new()),
        };
        entries.push(TxChainEntry {
            raw_tx: hex::encode(&raw_tx),
            block_idx,
            pos_in_blk,
            merkle,
        });
    }
    Ok(serde_json::to_vec(&entries)?)
}

/// Builds the `/oplogs/<name>.json` body: one entry per historical tree
/// root (inclusion or exclusion proof, `raw_ops` empty when excluded),
/// plus a trailing staging entry (`proof: null`) when `name` has a
/// not-yet-committed batch pending.
pub fn oplog_body(forest: &ForestStore, name: &str) -> Result<Vec<u8>> {
    let mut entries = Vec::new();
    for root in forest.tree_roots()? {
        let (proof, value) = forest.find_proof(root, name)?;
        let proof_bytes = proof.0.iter().map(|n| hex::encode(n.to_bytes())).collect();
        entries.push(OpLogEntry {
            raw_ops: hex::encode(value.unwrap_or_default()),
            proof: Some(proof_bytes),
        });
    }
    if let Some(staged) = forest.peek_staging(name)? {
        entries.push(OpLogEntry { raw_ops: hex::encode(staged), proof: None });
    }
    Ok(serde_json::to_vec(&entries)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitforest_rpc::MockRpc;

    #[test]
    fn oplog_body_mixes_confirmed_and_staging_entries() {
        let forest = ForestStore::open(":memory:").unwrap();
        forest.stage("alice", b"alice registers").unwrap();
        forest.commit().unwrap();
        forest.stage("bob", b"bob registers").unwrap();
        forest.commit().unwrap();
        forest.stage("alice", b"alice updates").unwrap();

        let bytes = oplog_body(&forest, "alice").unwrap();
        let entries: Vec<OpLogEntry> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].raw_ops, hex::encode(b"alice registers"));
        assert!(entries[0].proof.is_some());
        assert_eq!(entries[1].raw_ops, ""); // alice absent from the bob-only round
        assert!(entries[1].proof.is_some());
        assert_eq!(entries[2].raw_ops, hex::encode(b"alice updates"));
        assert!(entries[2].proof.is_none()); // staging, not yet committed
    }

    #[test]
    fn tx_chain_body_reports_unconfirmed_then_confirmed() {
        let forest = ForestStore::open(":memory:").unwrap();
        forest.stage("alice", b"alice registers").unwrap();
        forest.commit().unwrap();

        let (mock, bogus_funds) = MockRpc::new();
        let pipeline = Pipeline::open(":memory:", mock.clone(), "dummy-wif").unwrap();
        pipeline.add_funds(&bogus_funds).unwrap();
        pipeline.run(&forest).unwrap();

        let bytes = tx_chain_body(&pipeline, &mock).unwrap();
        let entries: Vec<TxChainEntry> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].block_idx, -1); // broadcast but not yet mined

        mock.mine_block();
        let bytes = tx_chain_body(&pipeline, &mock).unwrap();
        let entries: Vec<TxChainEntry> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(entries[0].block_idx, 0);
        assert_eq!(entries[0].pos_in_blk, 0);
    }
}
