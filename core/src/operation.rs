//! Operations and operation logs.
//!
//! An [`Operation`] is a single write intent under a name: a nonce, the
//! [`IdScript`] that must authorize the *next* operation, opaque data, and
//! the signatures authorizing *this* operation under the previous
//! operation's `next_id`. An [`OperationLog`] is the ordered chain of
//! operations staged/committed for one name.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};
use crate::idscript::IdScript;

/// `len(nonce)` is fixed at 16 bytes.
pub const NONCE_LEN: usize = 16;
/// Maximum encoded length of a `next_id` script.
pub const MAX_ID_LEN: u32 = 32 * 1024;
/// Maximum length of an operation's `data` payload.
pub const MAX_DATA_LEN: u32 = 128 * 1024;
/// Maximum length of a single signature.
pub const MAX_SIG_LEN: u32 = 2 * 1024;

/// A single signed write intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub nonce: [u8; NONCE_LEN],
    pub next_id: IdScript,
    pub data: Vec<u8>,
    pub signatures: Vec<Vec<u8>>,
}

impl Operation {
    /// The region of bytes that signatures are computed over:
    /// `nonce || u32_be(len next_id) || next_id || u32_be(len data) || data`.
    pub fn signed_part(&self) -> Vec<u8> {
        let id_bytes = self.next_id.as_bytes();
        let mut out = Vec::with_capacity(NONCE_LEN + 8 + id_bytes.len() + self.data.len());
        out.extend_from_slice(&self.nonce);
        push_u32(&mut out, id_bytes.len() as u32);
        out.extend_from_slice(id_bytes);
        push_u32(&mut out, self.data.len() as u32);
        out.extend_from_slice(&self.data);
        out
    }

    /// Serializes the operation: `signed_part() || u32_be(total_sig_bytes) ||
    /// [u16_be(len) || bytes]*`, where `total_sig_bytes` counts each
    /// signature's bytes plus its own 2-byte length prefix.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.signed_part();
        let total: usize = self.signatures.iter().map(|s| s.len() + 2).sum();
        push_u32(&mut out, total as u32);
        for sig in &self.signatures {
            push_u16(&mut out, sig.len() as u16);
            out.extend_from_slice(sig);
        }
        out
    }

    /// Parses a single operation from the front of `buf`, returning the
    /// operation and the number of bytes consumed. Used both by
    /// [`Operation::from_bytes`] (which requires the whole buffer to be
    /// consumed) and by [`OperationLog::unpack_all`] (which parses
    /// concatenated operations back to back).
    pub fn parse(buf: &[u8]) -> Result<(Self, usize)> {
        if buf.len() < NONCE_LEN {
            return Err(Error::InvalidOp);
        }
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&buf[0..NONCE_LEN]);
        let mut off = NONCE_LEN;

        let id_len = read_u32(buf, off)? as usize;
        off += 4;
        if id_len as u32 > MAX_ID_LEN {
            return Err(Error::InvalidOp);
        }
        let id_end = off.checked_add(id_len).ok_or(Error::InvalidOp)?;
        let next_id = IdScript::from_bytes(buf.get(off..id_end).ok_or(Error::InvalidOp)?.to_vec());
        off = id_end;

        let data_len = read_u32(buf, off)? as usize;
        off += 4;
        if data_len as u32 > MAX_DATA_LEN {
            return Err(Error::InvalidOp);
        }
        let data_end = off.checked_add(data_len).ok_or(Error::InvalidOp)?;
        let data = buf.get(off..data_end).ok_or(Error::InvalidOp)?.to_vec();
        off = data_end;

        let sig_region_len = read_u32(buf, off)? as usize;
        off += 4;
        let sig_region_end = off.checked_add(sig_region_len).ok_or(Error::InvalidOp)?;
        let sig_region = buf.get(off..sig_region_end).ok_or(Error::InvalidOp)?;
        off = sig_region_end;

        let mut signatures = Vec::new();
        let mut sig_off = 0usize;
        while sig_off < sig_region.len() {
            let slen = read_u16(sig_region, sig_off)? as usize;
            sig_off += 2;
            if slen as u32 > MAX_SIG_LEN {
                return Err(Error::InvalidOp);
            }
            let sig_end = sig_off.checked_add(slen).ok_or(Error::InvalidOp)?;
            let sig = sig_region.get(sig_off..sig_end).ok_or(Error::InvalidOp)?.to_vec();
            signatures.push(sig);
            sig_off = sig_end;
        }

        Ok((
            Operation {
                nonce,
                next_id,
                data,
                signatures,
            },
            off,
        ))
    }

    /// Deserializes an operation, requiring `buf` to contain exactly one.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        let (op, consumed) = Self::parse(buf)?;
        if consumed != buf.len() {
            return Err(Error::InvalidOp);
        }
        Ok(op)
    }
}

fn push_u32(out: &mut Vec<u8>, v: u32) {
    let mut b = [0u8; 4];
    BigEndian::write_u32(&mut b, v);
    out.extend_from_slice(&b);
}

fn push_u16(out: &mut Vec<u8>, v: u16) {
    let mut b = [0u8; 2];
    BigEndian::write_u16(&mut b, v);
    out.extend_from_slice(&b);
}

fn read_u32(buf: &[u8], off: usize) -> Result<u32> {
    let slice = buf.get(off..off + 4).ok_or(Error::InvalidOp)?;
    Ok(BigEndian::read_u32(slice))
}

fn read_u16(buf: &[u8], off: usize) -> Result<u16> {
    let slice = buf.get(off..off + 2).ok_or(Error::InvalidOp)?;
    Ok(BigEndian::read_u16(slice))
}

/// An ordered sequence of operations staged/committed for one name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationLog(pub Vec<Operation>);

impl OperationLog {
    /// Parses a concatenation of operations (the raw bytes stored under a
    /// name in the forest) by repeatedly consuming one `Operation` off the
    /// front until the buffer is exhausted.
    pub fn unpack_all(buf: &[u8]) -> Result<Self> {
        let mut ops = Vec::new();
        let mut off = 0;
        while off < buf.len() {
            let (op, consumed) = Operation::parse(&buf[off..])?;
            if consumed == 0 {
                return Err(Error::InvalidOp);
            }
            off += consumed;
            ops.push(op);
        }
        Ok(OperationLog(ops))
    }

    /// Concatenates every operation's wire encoding, matching how the
    /// forest stores a name's value.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.iter().flat_map(|op| op.to_bytes()).collect()
    }

    /// Validates the signature chain and nonce uniqueness.
    ///
    /// The genesis operation (`ops[0]`) is not itself signature-checked by
    /// the log — the server's staging/commit step is what vouches for it;
    /// clients trust it transitively via the anchor. Every subsequent
    /// operation must verify under the *previous* operation's `next_id`.
    pub fn is_valid(&self) -> bool {
        let mut seen_nonces: Vec<&[u8; NONCE_LEN]> = Vec::with_capacity(self.0.len());
        for op in &self.0 {
            if seen_nonces.iter().any(|n| **n == op.nonce) {
                return false;
            }
            seen_nonces.push(&op.nonce);
        }

        for window in self.0.windows(2) {
            let (prev, cur) = (&window[0], &window[1]);
            if prev
                .next_id
                .verify(&cur.signed_part(), &cur.signatures)
                .is_err()
            {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Keypair, SecretKey, Signer};

    fn keypair(seed: u8) -> Keypair {
        let secret = SecretKey::from_bytes(&[seed; 32]).unwrap();
        let public = PublicKey::from(&secret);
        Keypair { secret, public }
    }
    use ed25519_dalek::PublicKey;

    fn script_for(pk: &Keypair) -> IdScript {
        IdScript::assemble(&format!(".ed25519 {}", hex::encode(pk.public.as_bytes()))).unwrap()
    }

    fn genesis_op(next: &Keypair, data: &[u8]) -> Operation {
        Operation {
            nonce: [1u8; NONCE_LEN],
            next_id: script_for(next),
            data: data.to_vec(),
            signatures: vec![],
        }
    }

    fn signed_op(signer: &Keypair, next: &Keypair, nonce: u8, data: &[u8]) -> Operation {
        let mut op = Operation {
            nonce: [nonce; NONCE_LEN],
            next_id: script_for(next),
            data: data.to_vec(),
            signatures: vec![],
        };
        let sig = signer.sign(&op.signed_part()).to_bytes().to_vec();
        op.signatures = vec![sig];
        op
    }

    #[test]
    fn operation_roundtrip() {
        let kp = keypair(1);
        let op = genesis_op(&kp, b"hello world");
        let bytes = op.to_bytes();
        assert_eq!(Operation::from_bytes(&bytes).unwrap(), op);
    }

    #[test]
    fn log_chain_of_two_is_valid() {
        let kp0 = keypair(10);
        let kp1 = keypair(11);
        let op0 = genesis_op(&kp0, b"genesis");
        let op1 = signed_op(&kp0, &kp1, 2, b"second");
        let log = OperationLog(vec![op0, op1]);
        assert!(log.is_valid());
    }

    #[test]
    fn log_rejects_duplicate_nonce() {
        let kp0 = keypair(20);
        let kp1 = keypair(21);
        let op0 = genesis_op(&kp0, b"genesis");
        let mut op1 = signed_op(&kp0, &kp1, 2, b"second");
        op1.nonce = op0.nonce;
        let log = OperationLog(vec![op0, op1]);
        assert!(!log.is_valid());
    }

    #[test]
    fn log_rejects_swapped_operations() {
        let kp0 = keypair(30);
        let kp1 = keypair(31);
        let kp2 = keypair(32);
        let op0 = genesis_op(&kp0, b"genesis");
        let op1 = signed_op(&kp0, &kp1, 2, b"second");
        let op2 = signed_op(&kp1, &kp2, 3, b"third");
        let mut log = OperationLog(vec![op0, op1, op2]);
        assert!(log.is_valid());
        log.0.swap(1, 2);
        assert!(!log.is_valid());
    }

    #[test]
    fn log_rejects_substituted_signature() {
        let kp0 = keypair(40);
        let kp1 = keypair(41);
        let op0 = genesis_op(&kp0, b"genesis");
        let mut op1 = signed_op(&kp0, &kp1, 2, b"second");
        op1.signatures[0][0] ^= 0xFF;
        let log = OperationLog(vec![op0, op1]);
        assert!(!log.is_valid());
    }

    #[test]
    fn unpack_all_splits_concatenated_ops() {
        let kp0 = keypair(50);
        let kp1 = keypair(51);
        let op0 = genesis_op(&kp0, b"genesis");
        let op1 = signed_op(&kp0, &kp1, 2, b"second");
        let blob: Vec<u8> = op0
            .to_bytes()
            .into_iter()
            .chain(op1.to_bytes())
            .collect();
        let log = OperationLog::unpack_all(&blob).unwrap();
        assert_eq!(log.0, vec![op0, op1]);
    }
}
