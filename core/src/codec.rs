//! Bitcoin-compatible binary codec.
//!
//! Everything in this module is pure and infallible to *call* — malformed
//! input never panics, it maps to [`Error::BadLength`],
//! [`Error::UnreasonableCount`] or [`Error::GarbageAfterBlock`]. Multi-byte
//! integers are little-endian, matching the Bitcoin wire format; varint
//! encoding follows Bitcoin's `CompactSize`.

use byteorder::{ByteOrder, LittleEndian};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Absolute cap on input/output counts and script lengths. Anything claiming
/// to be larger is almost certainly garbage or an attempt to make us
/// allocate unreasonably.
const MAX_COUNT: u64 = 128 * 1024;

/// Length of a serialized block header.
pub const HEADER_LEN: usize = 80;

/// sha256(sha256(x)).
pub fn dsha256(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    second.into()
}

/// Double-SHA256 of a transaction's packed wire form.
pub fn hash256(tx: &Transaction) -> [u8; 32] {
    dsha256(&tx.to_bytes())
}

/// Reads a Bitcoin `CompactSize` varint, returning the value and the number
/// of bytes consumed.
pub fn read_varint(buf: &[u8]) -> Result<(u64, usize)> {
    let discr = *buf.first().ok_or(Error::BadLength)?;
    match discr {
        0xFF => {
            let rest = buf.get(1..9).ok_or(Error::BadLength)?;
            Ok((LittleEndian::read_u64(rest), 9))
        }
        0xFE => {
            let rest = buf.get(1..5).ok_or(Error::BadLength)?;
            Ok((LittleEndian::read_u32(rest) as u64, 5))
        }
        0xFD => {
            let rest = buf.get(1..3).ok_or(Error::BadLength)?;
            Ok((LittleEndian::read_u16(rest) as u64, 3))
        }
        small => Ok((small as u64, 1)),
    }
}

/// Writes `val` as a Bitcoin `CompactSize` varint.
pub fn write_varint(out: &mut Vec<u8>, val: u64) {
    if val < 0xFD {
        out.push(val as u8);
    } else if val <= 0xFFFF {
        out.push(0xFD);
        let mut b = [0u8; 2];
        LittleEndian::write_u16(&mut b, val as u16);
        out.extend_from_slice(&b);
    } else if val <= 0xFFFF_FFFF {
        out.push(0xFE);
        let mut b = [0u8; 4];
        LittleEndian::write_u32(&mut b, val as u32);
        out.extend_from_slice(&b);
    } else {
        out.push(0xFF);
        let mut b = [0u8; 8];
        LittleEndian::write_u64(&mut b, val);
        out.extend_from_slice(&b);
    }
}

fn read_count(buf: &[u8]) -> Result<(u64, usize)> {
    let (count, consumed) = read_varint(buf)?;
    if count > MAX_COUNT {
        return Err(Error::UnreasonableCount);
    }
    Ok((count, consumed))
}

/// An 80-byte Bitcoin block header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: u32,
    pub prev_block: [u8; 32],
    pub merkle_root: [u8; 32],
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl Header {
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        LittleEndian::write_u32(&mut out[0..4], self.version);
        out[4..36].copy_from_slice(&self.prev_block);
        out[36..68].copy_from_slice(&self.merkle_root);
        LittleEndian::write_u32(&mut out[68..72], self.time);
        LittleEndian::write_u32(&mut out[72..76], self.bits);
        LittleEndian::write_u32(&mut out[76..80], self.nonce);
        out
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() != HEADER_LEN {
            return Err(Error::BadLength);
        }
        let mut prev_block = [0u8; 32];
        let mut merkle_root = [0u8; 32];
        prev_block.copy_from_slice(&buf[4..36]);
        merkle_root.copy_from_slice(&buf[36..68]);
        Ok(Header {
            version: LittleEndian::read_u32(&buf[0..4]),
            prev_block,
            merkle_root,
            time: LittleEndian::read_u32(&buf[68..72]),
            bits: LittleEndian::read_u32(&buf[72..76]),
            nonce: LittleEndian::read_u32(&buf[76..80]),
        })
    }

    /// Returns `true` if a transaction's Merkle branch resolves to this
    /// header's `merkle_root`.
    pub fn check_merkle(&self, branch: &[[u8; 32]], pos: usize, tx: &Transaction) -> bool {
        let root = compute_merkle_root(hash256(tx), branch, pos);
        constant_time_eq(&root, &self.merkle_root)
    }
}

/// Recomputes a Merkle root from a leaf hash and its sibling branch.
pub fn compute_merkle_root(mut h: [u8; 32], branch: &[[u8; 32]], pos: usize) -> [u8; 32] {
    for (i, sibling) in branch.iter().enumerate() {
        let mut buf = [0u8; 64];
        if (pos >> i) & 1 == 1 {
            buf[0..32].copy_from_slice(sibling);
            buf[32..64].copy_from_slice(&h);
        } else {
            buf[0..32].copy_from_slice(&h);
            buf[32..64].copy_from_slice(sibling);
        }
        h = dsha256(&buf);
    }
    h
}

fn constant_time_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    let mut diff = 0u8;
    for i in 0..32 {
        diff |= a[i] ^ b[i];
    }
    diff == 0
}

/// An input to a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    pub prev_hash: [u8; 32],
    pub prev_idx: u32,
    pub script: Vec<u8>,
    pub seqno: u32,
}

impl TxInput {
    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32 + 4 + self.script.len() + 8);
        out.extend_from_slice(&self.prev_hash);
        let mut idx = [0u8; 4];
        LittleEndian::write_u32(&mut idx, self.prev_idx);
        out.extend_from_slice(&idx);
        write_varint(&mut out, self.script.len() as u64);
        out.extend_from_slice(&self.script);
        let mut seq = [0u8; 4];
        LittleEndian::write_u32(&mut seq, self.seqno);
        out.extend_from_slice(&seq);
        out
    }

    fn from_bytes(buf: &[u8]) -> Result<(Self, usize)> {
        if buf.len() < 36 {
            return Err(Error::BadLength);
        }
        let mut prev_hash = [0u8; 32];
        prev_hash.copy_from_slice(&buf[0..32]);
        let prev_idx = LittleEndian::read_u32(&buf[32..36]);
        let mut off = 36;
        let (scrlen, consumed) = read_count(&buf[off..])?;
        off += consumed;
        let scrlen = scrlen as usize;
        let script_end = off.checked_add(scrlen).ok_or(Error::BadLength)?;
        if buf.len() < script_end + 4 {
            return Err(Error::BadLength);
        }
        let script = buf[off..script_end].to_vec();
        off = script_end;
        let seqno = LittleEndian::read_u32(&buf[off..off + 4]);
        off += 4;
        Ok((
            TxInput {
                prev_hash,
                prev_idx,
                script,
                seqno,
            },
            off,
        ))
    }
}

/// An output of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    pub value: u64,
    pub script: Vec<u8>,
}

impl TxOutput {
    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.script.len());
        let mut val = [0u8; 8];
        LittleEndian::write_u64(&mut val, self.value);
        out.extend_from_slice(&val);
        write_varint(&mut out, self.script.len() as u64);
        out.extend_from_slice(&self.script);
        out
    }

    fn from_bytes(buf: &[u8]) -> Result<(Self, usize)> {
        if buf.len() < 8 {
            return Err(Error::BadLength);
        }
        let value = LittleEndian::read_u64(&buf[0..8]);
        let mut off = 8;
        let (scrlen, consumed) = read_count(&buf[off..])?;
        off += consumed;
        let scrlen = scrlen as usize;
        let script_end = off.checked_add(scrlen).ok_or(Error::BadLength)?;
        if buf.len() < script_end {
            return Err(Error::BadLength);
        }
        let script = buf[off..script_end].to_vec();
        Ok((TxOutput { value, script }, script_end))
    }
}

/// A Bitcoin-format transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub lock_time: u32,
}

impl Transaction {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut ver = [0u8; 4];
        LittleEndian::write_u32(&mut ver, self.version);
        out.extend_from_slice(&ver);
        write_varint(&mut out, self.inputs.len() as u64);
        for txi in &self.inputs {
            out.extend_from_slice(&txi.to_bytes());
        }
        write_varint(&mut out, self.outputs.len() as u64);
        for txo in &self.outputs {
            out.extend_from_slice(&txo.to_bytes());
        }
        let mut lt = [0u8; 4];
        LittleEndian::write_u32(&mut lt, self.lock_time);
        out.extend_from_slice(&lt);
        out
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        let (tx, consumed) = Self::parse(buf)?;
        if consumed != buf.len() {
            return Err(Error::GarbageAfterBlock);
        }
        Ok(tx)
    }

    fn parse(buf: &[u8]) -> Result<(Self, usize)> {
        if buf.len() < 4 {
            return Err(Error::BadLength);
        }
        let version = LittleEndian::read_u32(&buf[0..4]);
        let mut off = 4;
        let (n_in, consumed) = read_count(&buf[off..])?;
        off += consumed;
        let mut inputs = Vec::with_capacity(n_in as usize);
        for _ in 0..n_in {
            let (txi, used) = TxInput::from_bytes(&buf[off..])?;
            off += used;
            inputs.push(txi);
        }
        let (n_out, consumed) = read_count(&buf[off..])?;
        off += consumed;
        let mut outputs = Vec::with_capacity(n_out as usize);
        for _ in 0..n_out {
            let (txo, used) = TxOutput::from_bytes(&buf[off..])?;
            off += used;
            outputs.push(txo);
        }
        if buf.len() < off + 4 {
            return Err(Error::BadLength);
        }
        let lock_time = LittleEndian::read_u32(&buf[off..off + 4]);
        off += 4;
        Ok((
            Transaction {
                version,
                inputs,
                outputs,
                lock_time,
            },
            off,
        ))
    }
}

/// A Bitcoin-format block: a header followed by its transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: Header,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.header.to_bytes());
        write_varint(&mut out, self.transactions.len() as u64);
        for tx in &self.transactions {
            out.extend_from_slice(&tx.to_bytes());
        }
        out
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_LEN {
            return Err(Error::BadLength);
        }
        let header = Header::from_bytes(&buf[0..HEADER_LEN])?;
        let mut off = HEADER_LEN;
        let (tx_count, consumed) = read_count(&buf[off..])?;
        off += consumed;
        let mut transactions = Vec::with_capacity(tx_count as usize);
        for _ in 0..tx_count {
            let (tx, used) = Transaction::parse(&buf[off..])?;
            off += used;
            transactions.push(tx);
        }
        if off != buf.len() {
            return Err(Error::GarbageAfterBlock);
        }
        Ok(Block {
            header,
            transactions,
        })
    }

    /// Builds the sibling-hash Merkle branch and position for `tx_hash`,
    /// if it is among this block's transactions.
    pub fn merkle_branch(&self, tx_hash: &[u8; 32]) -> Option<(Vec<[u8; 32]>, usize)> {
        let mut level: Vec<[u8; 32]> = self.transactions.iter().map(hash256).collect();
        let mut pos = level.iter().position(|h| h == tx_hash)?;
        let mut branch = Vec::new();
        while level.len() > 1 {
            if level.len() % 2 == 1 {
                level.push(*level.last().unwrap());
            }
            let sibling_idx = pos ^ 1;
            branch.push(level[sibling_idx]);
            let mut next = Vec::with_capacity(level.len() / 2);
            for pair in level.chunks(2) {
                let mut buf = [0u8; 64];
                buf[0..32].copy_from_slice(&pair[0]);
                buf[32..64].copy_from_slice(&pair[1]);
                next.push(dsha256(&buf));
            }
            level = next;
            pos /= 2;
        }
        Some((branch, pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx(nonce: u8) -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxInput {
                prev_hash: [nonce; 32],
                prev_idx: 0,
                script: vec![1, 2, 3],
                seqno: 0xFFFF_FFFF,
            }],
            outputs: vec![TxOutput {
                value: 5000,
                script: vec![0x76, 0xA9, 0x14],
            }],
            lock_time: 0,
        }
    }

    #[test]
    fn varint_roundtrip_boundaries() {
        for v in [
            0u64,
            0xFC,
            0xFD,
            0xFFFF,
            0x1_0000,
            0xFFFF_FFFF,
            0x1_0000_0000,
            u64::MAX,
        ] {
            let mut buf = Vec::new();
            write_varint(&mut buf, v);
            let (decoded, consumed) = read_varint(&buf).unwrap();
            assert_eq!(decoded, v);
            assert_eq!(consumed, buf.len());
        }
    }

    #[test]
    fn header_roundtrip() {
        let hdr = Header {
            version: 4,
            prev_block: [7u8; 32],
            merkle_root: [9u8; 32],
            time: 1_600_000_000,
            bits: 0x1d00ffff,
            nonce: 42,
        };
        let bytes = hdr.to_bytes();
        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(Header::from_bytes(&bytes).unwrap(), hdr);
    }

    #[test]
    fn header_bad_length() {
        assert_eq!(Header::from_bytes(&[0u8; 79]), Err(Error::BadLength));
        assert_eq!(Header::from_bytes(&[0u8; 81]), Err(Error::BadLength));
    }

    #[test]
    fn transaction_roundtrip() {
        let tx = Transaction {
            version: 2,
            inputs: vec![TxInput {
                prev_hash: [1u8; 32],
                prev_idx: 3,
                script: vec![0xAB; 10],
                seqno: 0,
            }],
            outputs: vec![
                TxOutput {
                    value: 100,
                    script: vec![],
                },
                TxOutput {
                    value: 200,
                    script: vec![0x76, 0xA9],
                },
            ],
            lock_time: 500_000,
        };
        let bytes = tx.to_bytes();
        assert_eq!(Transaction::from_bytes(&bytes).unwrap(), tx);
    }

    #[test]
    fn transaction_garbage_after() {
        let tx = sample_tx(1);
        let mut bytes = tx.to_bytes();
        bytes.push(0xFF);
        assert_eq!(Transaction::from_bytes(&bytes), Err(Error::GarbageAfterBlock));
    }

    #[test]
    fn transaction_truncated_never_panics() {
        let tx = sample_tx(2);
        let bytes = tx.to_bytes();
        for len in 0..bytes.len() {
            let _ = Transaction::from_bytes(&bytes[..len]);
        }
    }

    #[test]
    fn block_roundtrip_and_merkle_branch() {
        let txs: Vec<Transaction> = (0..5).map(sample_tx).collect();
        let hashes: Vec<[u8; 32]> = txs.iter().map(hash256).collect();
        let block = Block {
            header: Header {
                version: 1,
                prev_block: [0u8; 32],
                merkle_root: [0u8; 32], // filled below
                time: 0,
                bits: 0,
                nonce: 0,
            },
            transactions: txs,
        };
        let (branch, pos) = block.merkle_branch(&hashes[2]).unwrap();
        let root = compute_merkle_root(hashes[2], &branch, pos);
        let mut header = block.header.clone();
        header.merkle_root = root;
        assert!(header.check_merkle(&branch, pos, &block.transactions[2]));

        let bytes = block.to_bytes();
        // header.merkle_root in `block` is a placeholder; round-trip should
        // still preserve the bytes exactly.
        assert_eq!(Block::from_bytes(&bytes).unwrap(), block);
    }

    #[test]
    fn block_trailing_garbage_rejected() {
        let block = Block {
            header: Header {
                version: 1,
                prev_block: [0u8; 32],
                merkle_root: [0u8; 32],
                time: 0,
                bits: 0,
                nonce: 0,
            },
            transactions: vec![sample_tx(9)],
        };
        let mut bytes = block.to_bytes();
        bytes.push(0);
        assert_eq!(Block::from_bytes(&bytes), Err(Error::GarbageAfterBlock));
    }
}
