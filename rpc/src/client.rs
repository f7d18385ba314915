//! JSON-RPC 1.0 client against a Bitcoin-Core-compatible node.
//!
//! Bitcoin Core's RPC returns block/transaction hashes as big-endian hex
//! strings ("display order"); everywhere else in this workspace a 32-byte
//! hash is little-endian ("internal order", the order it appears packed
//! into a header or txinput). [`reverse32`] converts between the two.

use std::time::Duration;

use rand::Rng;
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::BitcoinRpc;

/// Reverses a 32-byte hash, converting between display order and internal
/// order (the operation is its own inverse).
pub fn reverse32(mut h: [u8; 32]) -> [u8; 32] {
    h.reverse();
    h
}

fn hash_from_hex(s: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(s).map_err(|_| Error::BadHex)?;
    if bytes.len() != 32 {
        return Err(Error::BadHex);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(reverse32(out))
}

/// A client to a real Bitcoin Core node (or anything speaking its RPC
/// dialect) over JSON-RPC 1.0 with HTTP Basic auth.
pub struct CoreRpcClient {
    addr: String,
    user: String,
    password: String,
    http: reqwest::blocking::Client,
}

impl CoreRpcClient {
    pub fn new(addr: impl Into<String>, user: impl Into<String>, password: impl Into<String>) -> Self {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(200))
            .pool_idle_timeout(Duration::from_secs(120))
            .pool_max_idle_per_host(32)
            .build()
            .expect("static client config is always valid");
        CoreRpcClient { addr: addr.into(), user: user.into(), password: password.into(), http }
    }

    fn call(&self, method: &str, params: Value) -> Result<Value> {
        let id: u32 = rand::thread_rng().gen();
        let body = json!({ "jsonrpc": "1.0", "id": id, "method": method, "params": params });
        let resp = self
            .http
            .post(&self.addr)
            .basic_auth(&self.user, Some(&self.password))
            .json(&body)
            .send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::HttpStatus(status.as_u16()));
        }
        let mut envelope: Value = resp.json()?;
        if let Some(err) = envelope.get("error") {
            if !err.is_null() {
                return Err(Error::Remote(err.to_string()));
            }
        }
        envelope
            .get_mut("result")
            .map(Value::take)
            .ok_or_else(|| Error::BadShape("missing result field".into()))
    }

    fn call_str(&self, method: &str, params: Value) -> Result<String> {
        self.call(method, params)?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::BadShape(format!("{method} result was not a string")))
    }
}

impl BitcoinRpc for CoreRpcClient {
    fn block_count(&self) -> Result<u64> {
        let result = self.call("getblockcount", json!([]))?;
        result.as_u64().ok_or_else(|| Error::BadShape("getblockcount result was not an integer".into()))
    }

    fn block_hash(&self, idx: u64) -> Result<[u8; 32]> {
        let hex_str = self.call_str("getblockhash", json!([idx]))?;
        hash_from_hex(&hex_str)
    }

    fn block_idx(&self, hash: [u8; 32]) -> Result<u64> {
        let display_hex = hex::encode(reverse32(hash));
        let result = self.call("getblock", json!([display_hex, true]))?;
        result
            .get("height")
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::BadShape("getblock missing height".into()))
    }

    fn block(&self, idx: u64) -> Result<Vec<u8>> {
        let hash = self.block_hash(idx)?;
        let display_hex = hex::encode(reverse32(hash));
        let hex_str = self.call_str("getblock", json!([display_hex, false]))?;
        hex::decode(hex_str).map_err(|_| Error::BadHex)
    }

    fn header(&self, idx: u64) -> Result<Vec<u8>> {
        let hash = self.block_hash(idx)?;
        let display_hex = hex::encode(reverse32(hash));
        let hex_str = self.call_str("getblockheader", json!([display_hex, false]))?;
        hex::decode(hex_str).map_err(|_| Error::BadHex)
    }

    fn locate_tx(&self, tx_hash: [u8; 32]) -> Result<u64> {
        let display_hex = hex::encode(reverse32(tx_hash));
        let result = self.call("getrawtransaction", json!([display_hex, true]))?;
        let blockhash_hex = result
            .get("blockhash")
            .and_then(Value::as_str)
            .ok_or(Error::NotFound)?;
        let blockhash = hash_from_hex(blockhash_hex)?;
        self.block_idx(blockhash)
    }

    fn sign_tx(&self, tx: &[u8], wif: &str) -> Result<Vec<u8>> {
        let hex_str =
            self.call("signrawtransaction", json!([hex::encode(tx), Value::Null, [wif]]))?
                .get("hex")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::BadShape("signrawtransaction missing hex".into()))?
                .to_string();
        hex::decode(hex_str).map_err(|_| Error::BadHex)
    }

    fn broadcast_tx(&self, tx: &[u8]) -> Result<()> {
        self.call("sendrawtransaction", json!([hex::encode(tx)]))?;
        Ok(())
    }
}
