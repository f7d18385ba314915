//! On-the-wire JSON shapes served at `/txchain.json` and
//! `/oplogs/<name>.json`, and the hex-decoded forms the rest of the crate
//! works with.

use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
pub(crate) struct RawTxChainEntry {
    raw_tx: String,
    block_idx: i64,
    pos_in_blk: i64,
    merkle: Vec<String>,
}

/// One entry of the cached transaction chain: a self-chained anchor
/// transaction and, once mined, where it landed.
#[derive(Debug, Clone)]
pub struct TxChainEntry {
    pub raw_tx: Vec<u8>,
    pub block_idx: i64,
    pub pos_in_blk: i64,
    pub merkle: Vec<[u8; 32]>,
}

impl TryFrom<RawTxChainEntry> for TxChainEntry {
    type Error = Error;

    fn try_from(raw: RawTxChainEntry) -> Result<Self> {
        let raw_tx = hex::decode(raw.raw_tx).map_err(|_| Error::InvalidTxChain)?;
        let merkle = raw
            .merkle
            .iter()
            .map(|h| decode_hash(h))
            .collect::<Result<Vec<_>>>()?;
        Ok(TxChainEntry { raw_tx, block_idx: raw.block_idx, pos_in_blk: raw.pos_in_blk, merkle })
    }
}

pub(crate) fn parse_tx_chain(body: &[u8]) -> Result<Vec<TxChainEntry>> {
    let raw: Vec<RawTxChainEntry> = serde_json::from_slice(body)?;
    raw.into_iter().map(TxChainEntry::try_from).collect()
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawOpEntry {
    raw_ops: String,
    proof: Option<Vec<String>>,
}

/// One entry of a name's op log: the bytes staged at some tree root, and
/// (unless this is the trailing staging entry) its abbreviated proof path.
#[derive(Debug, Clone)]
pub struct OpEntry {
    pub raw_ops: Vec<u8>,
    pub proof: Option<Vec<bitforest_forest::AbbrNode>>,
}

impl TryFrom<RawOpEntry> for OpEntry {
    type Error = Error;

    fn try_from(raw: RawOpEntry) -> Result<Self> {
        let raw_ops = hex::decode(raw.raw_ops).map_err(|_| Error::InvalidOpEntries)?;
        let proof = raw
            .proof
            .map(|nodes| {
                nodes
                    .iter()
                    .map(|n| {
                        let bytes = hex::decode(n).map_err(|_| Error::InvalidOpEntries)?;
                        bitforest_forest::AbbrNode::from_bytes(&bytes).ok_or(Error::InvalidOpEntries)
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .transpose()?;
        Ok(OpEntry { raw_ops, proof })
    }
}

pub(crate) fn parse_op_entries(body: &[u8]) -> Result<Vec<OpEntry>> {
    let raw: Vec<RawOpEntry> = serde_json::from_slice(body)?;
    raw.into_iter().map(OpEntry::try_from).collect()
}

fn decode_hash(s: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(s).map_err(|_| Error::InvalidTxChain)?;
    bytes.try_into().map_err(|_| Error::InvalidTxChain)
}
