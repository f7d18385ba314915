//! Client-side verification: downloads a server's header chain and anchor
//! transaction chain into a local cache, checks both end-to-end, and walks
//! a name's op-log proofs against the cached anchor chain.
//!
//! Mirrors the original `Client.Sync`/`Client.GetOpLog` pair: nothing here
//! trusts the server beyond what the cached artifacts themselves prove.

pub mod error;
mod wire;

pub use error::{Error, Result};
pub use wire::{OpEntry, TxChainEntry};

use std::fs;
use std::path::PathBuf;

use bitforest_core::codec::{dsha256, hash256, Header, Transaction, HEADER_LEN};
use bitforest_core::{Operation, OperationLog};
use bitforest_forest::Proof;

const BLOCK_HEADERS_FILE: &str = "block_headers";
const TX_CHAIN_FILE: &str = "txchain.json";

/// A bitforest client: a server URL plus a local cache directory.
pub struct Client {
    server_url: reqwest::Url,
    cache_dir: PathBuf,
    http: reqwest::blocking::Client,
}

impl Client {
    pub fn new(server_url: reqwest::Url, cache_dir: impl Into<PathBuf>) -> Self {
        Client { server_url, cache_dir: cache_dir.into(), http: reqwest::blocking::Client::new() }
    }

    /// Downloads the header chain and anchor transaction chain, persists
    /// them to the cache directory, and verifies both end-to-end.
    pub fn sync(&self) -> Result<()> {
        fs::create_dir_all(&self.cache_dir)?;

        let headers_body = self.http.get(self.url("/blockchain_headers")).send()?.bytes()?;
        fs::write(self.cache_dir.join(BLOCK_HEADERS_FILE), &headers_body)?;

        let tx_chain_body = self.http.get(self.url("/txchain.json")).send()?.bytes()?;
        fs::write(self.cache_dir.join(TX_CHAIN_FILE), &tx_chain_body)?;

        let headers = self.cached_headers()?;
        if !check_headers(&headers) {
            return Err(Error::InvalidHeaders);
        }

        let tx_chain = self.cached_tx_chain()?;
        if !check_tx_chain(&tx_chain, &headers) {
            return Err(Error::InvalidTxChain);
        }

        Ok(())
    }

    /// Fetches, verifies, and decodes the full operation log for `name`.
    /// Returns the log plus the number of confirmed (anchored-and-mined)
    /// operations within it.
    pub fn get_op_log(&self, name: &str) -> Result<(OperationLog, usize)> {
        let body = self.http.get(self.url(&format!("/oplogs/{name}.json"))).send()?.bytes()?;
        let op_entries = wire::parse_op_entries(&body)?;
        if op_entries.is_empty() {
            return Err(Error::InvalidOpEntries);
        }

        let tx_chain = self.cached_tx_chain()?;

        // A proven (non-staging) run, optionally followed by exactly one
        // trailing staging entry (proof == null).
        let staging = op_entries.last().filter(|e| e.proof.is_none());
        let proven = if staging.is_some() { &op_entries[..op_entries.len() - 1] } else { &op_entries[..] };
        if proven.iter().any(|e| e.proof.is_none()) {
            return Err(Error::InvalidOpEntries);
        }
        if tx_chain.len() < proven.len() {
            return Err(Error::OutOfSync);
        }

        // Within the proven run: a confirmed prefix (block_idx >= 0),
        // followed by an unconfirmed suffix (block_idx < 0). Any confirmed
        // entry after an unconfirmed one is a protocol violation.
        let mut confirmed_count = 0;
        let mut seen_unconfirmed = false;
        for (i, _) in proven.iter().enumerate() {
            if tx_chain[i].block_idx >= 0 {
                if seen_unconfirmed {
                    return Err(Error::InvalidOpEntries);
                }
                confirmed_count += 1;
            } else {
                seen_unconfirmed = true;
            }
        }

        let mut ops = Vec::new();
        for (i, entry) in proven.iter().enumerate() {
            let anchor_tx = Transaction::from_bytes(&tx_chain[i].raw_tx)?;
            let commitment: [u8; 20] = anchor_tx
                .outputs
                .get(1)
                .and_then(|o| o.script.get(3..23))
                .ok_or(Error::InvalidOpEntries)?
                .try_into()
                .map_err(|_| Error::InvalidOpEntries)?;
            let mut root_hash = [0u8; 32];
            root_hash[0..20].copy_from_slice(&commitment);

            let proof_nodes = entry.proof.as_ref().expect("checked above");
            let proof = Proof(proof_nodes.clone());
            let value_hash = if entry.raw_ops.is_empty() { None } else { Some(dsha256(&entry.raw_ops)) };
            if !proof.check(root_hash, name, value_hash) {
                return Err(Error::InvalidOpEntries);
            }
            if !entry.raw_ops.is_empty() {
                ops.extend(decode_ops(&entry.raw_ops)?);
            }
        }
        if let Some(entry) = staging {
            if !entry.raw_ops.is_empty() {
                ops.extend(decode_ops(&entry.raw_ops)?);
            }
        }

        let log = OperationLog(ops);
        if !log.is_valid() {
            return Err(Error::InvalidOpEntries);
        }
        Ok((log, confirmed_count))
    }

    fn cached_headers(&self) -> Result<Vec<Header>> {
        let path = self.cache_dir.join(BLOCK_HEADERS_FILE);
        let data = fs::read(path)?;
        if data.len() % HEADER_LEN != 0 {
            return Err(Error::MalformedCache("block_headers length not a multiple of HEADER_LEN".into()));
        }
        data.chunks(HEADER_LEN).map(Header::from_bytes).map(|r| r.map_err(Error::from)).collect()
    }

    fn cached_tx_chain(&self) -> Result<Vec<TxChainEntry>> {
        let path = self.cache_dir.join(TX_CHAIN_FILE);
        let data = fs::read(path)?;
        wire::parse_tx_chain(&data)
    }

    fn url(&self, path: &str) -> reqwest::Url {
        self.server_url.join(path).expect("path is a well-formed relative URL")
    }
}

fn decode_ops(raw: &[u8]) -> Result<Vec<Operation>> {
    Ok(OperationLog::unpack_all(raw)?.0)
}

/// Backward header-chain check: each header's `prev_block` must equal the
/// double-SHA256 of the previous header's bytes, compared in constant time.
fn check_headers(headers: &[Header]) -> bool {
    for i in (1..headers.len()).rev() {
        let expected = dsha256(&headers[i - 1].to_bytes());
        if !constant_time_eq(&headers[i].prev_block, &expected) {
            return false;
        }
    }
    true
}

/// Forward tx-chain check: each self-chained anchor spends the previous
/// one's output, and every confirmed entry's Merkle branch resolves against
/// the header it claims to be mined in.
fn check_tx_chain(tx_chain: &[TxChainEntry], headers: &[Header]) -> bool {
    let mut parsed = Vec::with_capacity(tx_chain.len());
    for entry in tx_chain {
        match Transaction::from_bytes(&entry.raw_tx) {
            Ok(tx) => parsed.push(tx),
            Err(_) => return false,
        }
    }

    for i in 1..parsed.len() {
        if parsed[i].inputs.is_empty() || parsed[i].inputs[0].prev_hash != hash256(&parsed[i - 1]) {
            return false;
        }
    }

    for (entry, tx) in tx_chain.iter().zip(parsed.iter()) {
        if entry.block_idx < 0 {
            continue;
        }
        let idx = entry.block_idx as usize;
        let Some(header) = headers.get(idx) else { return false };
        if !header.check_merkle(&entry.merkle, entry.pos_in_blk as usize, tx) {
            return false;
        }
    }
    true
}

fn constant_time_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    let mut diff = 0u8;
    for i in 0..32 {
        diff |= a[i] ^ b[i];
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header(prev: [u8; 32]) -> Header {
        Header { version: 1, prev_block: prev, merkle_root: [0u8; 32], time: 0, bits: 0, nonce: 0 }
    }

    #[test]
    fn check_headers_accepts_well_linked_chain() {
        let h0 = sample_header([0u8; 32]);
        let h1 = sample_header(dsha256(&h0.to_bytes()));
        let h2 = sample_header(dsha256(&h1.to_bytes()));
        assert!(check_headers(&[h0, h1, h2]));
    }

    #[test]
    fn check_headers_rejects_broken_link() {
        let h0 = sample_header([0u8; 32]);
        let mut h1 = sample_header(dsha256(&h0.to_bytes()));
        h1.prev_block[0] ^= 0xFF;
        assert!(!check_headers(&[h0, h1]));
    }

    #[test]
    fn client_sync_path_joins_relative_urls() {
        let client = Client::new(reqwest::Url::parse("http://localhost:8080").unwrap(), "/tmp/whatever");
        assert_eq!(client.url("/blockchain_headers").as_str(), "http://localhost:8080/blockchain_headers");
    }

    use bitforest_core::codec::{Block, TxInput, TxOutput};

    fn sample_tx(prev_hash: [u8; 32]) -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxInput { prev_hash, prev_idx: 0, script: vec![], seqno: 0xFFFF_FFFF }],
            outputs: vec![TxOutput { value: 10_000, script: vec![0u8; 25] }],
            lock_time: 0,
        }
    }

    #[test]
    fn check_tx_chain_accepts_chained_and_mined_entries() {
        let tx0 = sample_tx([0u8; 32]);
        let tx1 = sample_tx(hash256(&tx0));

        let block = Block { header: sample_header([0u8; 32]), transactions: vec![tx1.clone()] };
        let (branch, pos) = block.merkle_branch(&hash256(&tx1)).unwrap();
        // single-transaction block: the Merkle root is just the tx hash itself.
        let mut header = sample_header([0u8; 32]);
        header.merkle_root = hash256(&tx1);
        let headers = vec![header];

        let tx_chain = vec![
            TxChainEntry { raw_tx: tx0.to_bytes(), block_idx: -1, pos_in_blk: -1, merkle: vec![] },
            TxChainEntry { raw_tx: tx1.to_bytes(), block_idx: 0, pos_in_blk: pos as i64, merkle: branch },
        ];
        assert!(check_tx_chain(&tx_chain, &headers));
    }

    #[test]
    fn check_tx_chain_rejects_broken_chain_link() {
        let tx0 = sample_tx([0u8; 32]);
        let mut tx1 = sample_tx(hash256(&tx0));
        tx1.inputs[0].prev_hash[0] ^= 0xFF;

        let tx_chain = vec![
            TxChainEntry { raw_tx: tx0.to_bytes(), block_idx: -1, pos_in_blk: -1, merkle: vec![] },
            TxChainEntry { raw_tx: tx1.to_bytes(), block_idx: -1, pos_in_blk: -1, merkle: vec![] },
        ];
        assert!(!check_tx_chain(&tx_chain, &[]));
    }
}
