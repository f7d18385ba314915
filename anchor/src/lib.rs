//! Bitcoin-anchoring pipeline.
//!
//! Turns each new, not-yet-anchored diff-forest root into a spendable
//! Bitcoin transaction, chained onto the previous anchor's residual
//! output, funded additionally from a pool of unspent `FUNDS` rows.

pub mod error;

pub use error::{Error, Result};

use std::sync::Mutex;

use bitforest_core::codec::{hash256, Transaction, TxInput, TxOutput};
use bitforest_forest::Store as ForestStore;
use bitforest_rpc::BitcoinRpc;
use rusqlite::{params, Connection, OptionalExtension};

/// Satoshi value of the anchor commitment output. Below Bitcoin Core's
/// default dust relay threshold this output would be non-standard.
const DUST_SATS: u64 = 10_000;

/// Builds the `76 A9 14 <20 bytes> 88 AC` P2PKH-shaped commitment script
/// for the first 20 bytes of a tree-root hash.
fn commitment_script(root_hash: [u8; 32]) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.push(0x76);
    script.push(0xA9);
    script.push(0x14);
    script.extend_from_slice(&root_hash[0..20]);
    script.push(0x88);
    script.push(0xAC);
    script
}

/// Anchors forest roots into a self-chained Bitcoin transaction sequence.
pub struct Pipeline<R: BitcoinRpc> {
    conn: Mutex<Connection>,
    rpc: R,
    wif: String,
}

impl<R: BitcoinRpc> Pipeline<R> {
    /// Opens (or creates) the local `TX_HISTORY`/`FUNDS` store at `path`,
    /// signing future anchors with `wif`.
    pub fn open(path: &str, rpc: R, wif: impl Into<String>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tx_history (
                 id        INTEGER PRIMARY KEY AUTOINCREMENT,
                 root_hash BLOB NOT NULL UNIQUE,
                 raw_tx    BLOB NOT NULL
             );
             CREATE TABLE IF NOT EXISTS funds (
                 raw_tx BLOB PRIMARY KEY,
                 spent  INTEGER NOT NULL DEFAULT 0
             );",
        )?;
        Ok(Pipeline { conn: Mutex::new(conn), rpc, wif: wif.into() })
    }

    /// Seeds the funding pool with an externally-provided UTXO-bearing
    /// transaction, spendable at output index 0.
    pub fn add_funds(&self, raw_tx: &[u8]) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO funds (raw_tx, spent) VALUES (?1, 0)",
            params![raw_tx],
        )?;
        Ok(())
    }

    /// The self-chained anchor history, oldest first.
    pub fn history(&self) -> Result<Vec<Vec<u8>>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT raw_tx FROM tx_history ORDER BY id ASC")?;
        let rows = stmt.query_map([], |r| r.get::<_, Vec<u8>>(0))?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    /// Anchors every root committed to `forest` that isn't yet in
    /// `TX_HISTORY`, in commit order. Returns the root hashes anchored this
    /// call (empty if nothing was pending).
    pub fn run(&self, forest: &ForestStore) -> Result<Vec<[u8; 32]>> {
        let all_roots = forest.tree_roots()?;
        let mut anchored = Vec::new();
        for root_hash in all_roots {
            if self.is_anchored(root_hash)? {
                continue;
            }
            self.anchor_one(root_hash)?;
            anchored.push(root_hash);
        }
        Ok(anchored)
    }

    fn is_anchored(&self, root_hash: [u8; 32]) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM tx_history WHERE root_hash = ?1",
                params![root_hash.to_vec()],
                |r| r.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn anchor_one(&self, root_hash: [u8; 32]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let prev_raw: Option<Vec<u8>> = tx
            .query_row("SELECT raw_tx FROM tx_history ORDER BY id DESC LIMIT 1", [], |r| r.get(0))
            .optional()?;
        let prev_tx = prev_raw.as_deref().map(Transaction::from_bytes).transpose()?;

        let mut stmt = tx.prepare("SELECT raw_tx FROM funds WHERE spent = 0")?;
        let fund_raws: Vec<Vec<u8>> =
            stmt.query_map([], |r| r.get::<_, Vec<u8>>(0))?.collect::<std::result::Result<_, _>>()?;
        drop(stmt);
        let fund_txs: Vec<Transaction> =
            fund_raws.iter().map(|raw| Transaction::from_bytes(raw)).collect::<bitforest_core::Result<_>>()?;

        if prev_tx.is_none() && fund_txs.is_empty() {
            return Err(Error::NoFunding);
        }

        let mut inputs = Vec::new();
        let mut total_funding = 0u64;
        let mut self_script = Vec::new();
        if let Some(prev) = &prev_tx {
            self_script = prev.outputs[0].script.clone();
            inputs.push(TxInput {
                prev_hash: hash256(prev),
                prev_idx: 0,
                script: prev.outputs[0].script.clone(),
                seqno: 0xFFFF_FFFF,
            });
            total_funding += prev.outputs[0].value;
        }
        for fund_tx in &fund_txs {
            if self_script.is_empty() {
                self_script = fund_tx.outputs[0].script.clone();
            }
            inputs.push(TxInput {
                prev_hash: hash256(fund_tx),
                prev_idx: 0,
                script: fund_tx.outputs[0].script.clone(),
                seqno: 0xFFFF_FFFF,
            });
            total_funding += fund_tx.outputs[0].value;
        }

        let draft = Transaction {
            version: 1,
            inputs: inputs.clone(),
            outputs: vec![
                TxOutput { value: 0, script: self_script.clone() },
                TxOutput { value: DUST_SATS, script: commitment_script(root_hash) },
            ],
            lock_time: 0,
        };
        let fee = 400 * (100 + draft.to_bytes().len() as u64);
        let dust_plus_fee = DUST_SATS + fee;
        if total_funding <= dust_plus_fee {
            return Err(Error::InsufficientFunds { available: total_funding, dust_plus_fee });
        }

        let unsigned = Transaction {
            version: 1,
            inputs,
            outputs: vec![
                TxOutput { value: total_funding - dust_plus_fee, script: self_script },
                TxOutput { value: DUST_SATS, script: commitment_script(root_hash) },
            ],
            lock_time: 0,
        };

        let signed_bytes = self.rpc.sign_tx(&unsigned.to_bytes(), &self.wif)?;
        Transaction::from_bytes(&signed_bytes)?; // confirm the signer returned something well-formed
        self.rpc.broadcast_tx(&signed_bytes)?;

        tx.execute(
            "INSERT INTO tx_history (root_hash, raw_tx) VALUES (?1, ?2)",
            params![root_hash.to_vec(), signed_bytes],
        )?;
        for raw in &fund_raws {
            tx.execute("UPDATE funds SET spent = 1 WHERE raw_tx = ?1", params![raw])?;
        }
        tx.commit()?;
        log::info!("anchored root {} in tx", hex::encode(root_hash));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitforest_rpc::MockRpc;

    #[test]
    fn anchors_commits_in_order_and_chains() {
        let forest = ForestStore::open(":memory:").unwrap();
        forest.stage("alice", b"alice registers").unwrap();
        let root0 = forest.commit().unwrap();
        forest.stage("bob", b"bob registers").unwrap();
        let root1 = forest.commit().unwrap();

        let (rpc, bogus_funds) = MockRpc::new();
        let pipeline = Pipeline::open(":memory:", rpc, "dummy-wif").unwrap();
        pipeline.add_funds(&bogus_funds).unwrap();

        let anchored = pipeline.run(&forest).unwrap();
        assert_eq!(anchored, vec![root0, root1]);

        let history = pipeline.history().unwrap();
        assert_eq!(history.len(), 2);
        let tx0 = Transaction::from_bytes(&history[0]).unwrap();
        let tx1 = Transaction::from_bytes(&history[1]).unwrap();
        assert_eq!(tx1.inputs[0].prev_hash, hash256(&tx0));
        assert_eq!(&tx0.outputs[1].script[3..23], &root0[0..20]);
        assert_eq!(&tx1.outputs[1].script[3..23], &root1[0..20]);

        // re-running is a no-op: both roots are already anchored
        assert!(pipeline.run(&forest).unwrap().is_empty());
    }

    #[test]
    fn no_funding_source_is_an_error() {
        let forest = ForestStore::open(":memory:").unwrap();
        forest.stage("alice", b"x").unwrap();
        forest.commit().unwrap();

        let (rpc, _bogus) = MockRpc::new();
        let pipeline = Pipeline::open(":memory:", rpc, "dummy-wif").unwrap();
        assert!(matches!(pipeline.run(&forest), Err(Error::NoFunding)));
    }
}
