//! An in-process, no-proof-of-work, no-signature-checking fake Bitcoin
//! chain. Useful for exercising the anchor pipeline and client verifier in
//! tests or a local `cli` demo without a real node.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use bitforest_core::codec::{dsha256, hash256, Block, Header, Transaction, TxInput, TxOutput};

use crate::error::{Error, Result};
use crate::BitcoinRpc;

struct Inner {
    blocks: Vec<Block>,
    block_idx: HashMap<[u8; 32], usize>,
    tx_idx: HashMap<[u8; 32], usize>,
    mempool: Vec<Transaction>,
}

/// A shared handle to a fake chain. Cloning shares the same underlying
/// state (mempool, blocks).
#[derive(Clone)]
pub struct MockRpc(Arc<Mutex<Inner>>);

impl MockRpc {
    /// Creates a fresh mock chain along with a bogus, already-"confirmed"
    /// funding transaction the caller can treat as spendable seed money.
    pub fn new() -> (Self, Vec<u8>) {
        let mock = MockRpc(Arc::new(Mutex::new(Inner {
            blocks: Vec::new(),
            block_idx: HashMap::new(),
            tx_idx: HashMap::new(),
            mempool: Vec::new(),
        })));
        let bogus_tx = Transaction {
            version: 1,
            inputs: vec![TxInput { prev_hash: [0u8; 32], prev_idx: 0, script: vec![], seqno: 0xFFFF_FFFF }],
            outputs: vec![TxOutput { value: 1_000_000, script: vec![] }],
            lock_time: 0,
        };
        (mock, bogus_tx.to_bytes())
    }

    /// Mines everything currently in the mempool into a new block, chained
    /// onto the tip. A no-op if the mempool is empty.
    pub fn mine_block(&self) {
        let mut inner = self.0.lock().unwrap();
        if inner.mempool.is_empty() {
            return;
        }
        let prev_block = inner
            .blocks
            .last()
            .map(|b| dsha256(&b.header.to_bytes()))
            .unwrap_or([0u8; 32]);
        let body = std::mem::take(&mut inner.mempool);
        let mut header = Header {
            version: 4,
            prev_block,
            merkle_root: [0u8; 32],
            time: pseudo_now(),
            bits: 0,
            nonce: pseudo_nonce(),
        };
        let draft = Block { header: header.clone(), transactions: body };
        if let Some((branch, pos)) = draft.merkle_branch(&hash256(&draft.transactions[0])) {
            header.merkle_root =
                bitforest_core::codec::compute_merkle_root(hash256(&draft.transactions[0]), &branch, pos);
        }
        let block = Block { header, transactions: draft.transactions };
        let block_hash = dsha256(&block.header.to_bytes());
        let idx = inner.blocks.len();
        for tx in &block.transactions {
            inner.tx_idx.insert(hash256(tx), idx);
        }
        inner.blocks.push(block);
        inner.block_idx.insert(block_hash, idx);
    }

    /// Spawns a background thread that mines a block roughly every
    /// `interval`, mirroring the reference mock's always-on miner goroutine.
    pub fn spawn_background_miner(&self, interval: Duration) -> thread::JoinHandle<()> {
        let handle = self.clone();
        thread::spawn(move || loop {
            thread::sleep(interval);
            handle.mine_block();
        })
    }
}

fn pseudo_now() -> u32 {
    use rand::Rng;
    rand::thread_rng().gen()
}

fn pseudo_nonce() -> u32 {
    use rand::Rng;
    rand::thread_rng().gen()
}

impl BitcoinRpc for MockRpc {
    fn block_count(&self) -> Result<u64> {
        Ok(self.0.lock().unwrap().blocks.len() as u64)
    }

    fn block_hash(&self, idx: u64) -> Result<[u8; 32]> {
        let inner = self.0.lock().unwrap();
        let block = inner.blocks.get(idx as usize).ok_or(Error::NotFound)?;
        Ok(dsha256(&block.header.to_bytes()))
    }

    fn block_idx(&self, hash: [u8; 32]) -> Result<u64> {
        let inner = self.0.lock().unwrap();
        inner.block_idx.get(&hash).map(|&i| i as u64).ok_or(Error::NotFound)
    }

    fn block(&self, idx: u64) -> Result<Vec<u8>> {
        let inner = self.0.lock().unwrap();
        let block = inner.blocks.get(idx as usize).ok_or(Error::NotFound)?;
        Ok(block.to_bytes())
    }

    fn header(&self, idx: u64) -> Result<Vec<u8>> {
        let inner = self.0.lock().unwrap();
        let block = inner.blocks.get(idx as usize).ok_or(Error::NotFound)?;
        Ok(block.header.to_bytes().to_vec())
    }

    fn locate_tx(&self, tx_hash: [u8; 32]) -> Result<u64> {
        let inner = self.0.lock().unwrap();
        inner.tx_idx.get(&tx_hash).map(|&i| i as u64).ok_or(Error::NotFound)
    }

    fn sign_tx(&self, tx: &[u8], _wif: &str) -> Result<Vec<u8>> {
        // "signing" is a no-op: the mock never checks identity scripts.
        Ok(tx.to_vec())
    }

    fn broadcast_tx(&self, tx: &[u8]) -> Result<()> {
        let parsed = Transaction::from_bytes(tx)?;
        self.0.lock().unwrap().mempool.push(parsed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mines_and_locates_broadcast_tx() {
        let (mock, _bogus) = MockRpc::new();
        let tx = Transaction {
            version: 1,
            inputs: vec![TxInput { prev_hash: [9u8; 32], prev_idx: 0, script: vec![], seqno: 0xFFFF_FFFF }],
            outputs: vec![TxOutput { value: 100, script: vec![] }],
            lock_time: 0,
        };
        let tx_bytes = tx.to_bytes();
        mock.broadcast_tx(&tx_bytes).unwrap();
        mock.mine_block();

        assert_eq!(mock.block_count().unwrap(), 1);
        let idx = mock.locate_tx(hash256(&tx)).unwrap();
        assert_eq!(idx, 0);
        let hash = mock.block_hash(0).unwrap();
        assert_eq!(mock.block_idx(hash).unwrap(), 0);
    }

    #[test]
    fn mining_empty_mempool_is_noop() {
        let (mock, _bogus) = MockRpc::new();
        mock.mine_block();
        assert_eq!(mock.block_count().unwrap(), 0);
    }
}
