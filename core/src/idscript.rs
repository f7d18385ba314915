//! Identity scripts: a tiny postfix machine over two opcodes that decides
//! who may authorize the next operation in a log.
//!
//! ```text
//! 0x00 0x01 <32-byte pubkey>   push(ed25519_verify(pubkey, msg, next_sig))
//! 0xFF <need> <max>            push(sum(pop() * max) >= need)
//! ```
//!
//! [`IdScript::verify`] must never panic, however adversarial the script or
//! the input — every malformed path resolves to [`Error::InvalidId`].

use ed25519_dalek::{PublicKey, Signature};

use crate::error::{Error, Result};

const OP_ED25519: u8 = 0x00;
const OP_ED25519_TAG: u8 = 0x01;
const OP_QUORUM: u8 = 0xFF;

/// A compiled identity script: an opaque byte program, assembled by
/// [`IdScript::assemble`] or parsed from a stored operation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IdScript(pub Vec<u8>);

impl IdScript {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        IdScript(bytes)
    }

    /// Assembles a human-readable script into its binary form.
    ///
    /// Grammar: whitespace-separated tokens, `.ed25519 <hex32>` for a key
    /// check, `.quorum N. M.` for a quorum gate with both `N` and `M` decimal
    /// integers in `1..=256` (256 is written literally as `256.`; it is
    /// encoded on the wire as byte `0`).
    pub fn assemble(asm: &str) -> Result<Self> {
        let tokens: Vec<&str> = asm.split_whitespace().collect();
        let mut out = Vec::new();
        let mut i = 0;
        while i < tokens.len() {
            match tokens[i] {
                ".ed25519" => {
                    let hex_tok = tokens.get(i + 1).ok_or(Error::InvalidId)?;
                    let key = hex::decode(hex_tok).map_err(|_| Error::InvalidId)?;
                    if key.len() != 32 {
                        return Err(Error::InvalidId);
                    }
                    out.push(OP_ED25519);
                    out.push(OP_ED25519_TAG);
                    out.extend_from_slice(&key);
                    i += 2;
                }
                ".quorum" => {
                    let need_tok = tokens.get(i + 1).ok_or(Error::InvalidId)?;
                    let max_tok = tokens.get(i + 2).ok_or(Error::InvalidId)?;
                    let need = parse_dotted_count(need_tok)?;
                    let max = parse_dotted_count(max_tok)?;
                    if need == 0 || max == 0 || need > max {
                        return Err(Error::InvalidId);
                    }
                    out.push(OP_QUORUM);
                    out.push(encode_count(need));
                    out.push(encode_count(max));
                    i += 3;
                }
                _ => return Err(Error::InvalidId),
            }
        }
        Ok(IdScript(out))
    }

    /// Runs the script against `message` and `sigs`. Signature consumption
    /// is positional: the `k`-th `.ed25519` opcode consumes `sigs[k]`.
    pub fn verify(&self, message: &[u8], sigs: &[Vec<u8>]) -> Result<()> {
        let mut stack: Vec<u8> = Vec::new();
        let mut key_idx = 0usize;
        let mut cursor = 0usize;
        let bytes = &self.0;

        while cursor < bytes.len() {
            match bytes[cursor] {
                OP_ED25519 => {
                    let tag = *bytes.get(cursor + 1).ok_or(Error::InvalidId)?;
                    if tag != OP_ED25519_TAG {
                        return Err(Error::InvalidId);
                    }
                    let key_bytes = bytes.get(cursor + 2..cursor + 34).ok_or(Error::InvalidId)?;
                    cursor += 34;

                    let sig_bytes = sigs.get(key_idx).ok_or(Error::InvalidId)?;
                    key_idx += 1;

                    let ok = PublicKey::from_bytes(key_bytes)
                        .and_then(|pk| {
                            Signature::from_bytes(sig_bytes).map(|sig| (pk, sig))
                        })
                        .map(|(pk, sig)| pk.verify_strict(message, &sig).is_ok())
                        .unwrap_or(false);
                    stack.push(ok as u8);
                }
                OP_QUORUM => {
                    let need = decode_count(*bytes.get(cursor + 1).ok_or(Error::InvalidId)?);
                    let max = decode_count(*bytes.get(cursor + 2).ok_or(Error::InvalidId)?);
                    cursor += 3;
                    if need == 0 || max == 0 || need > max || max as usize > stack.len() {
                        return Err(Error::InvalidId);
                    }
                    let drain_from = stack.len() - max as usize;
                    let sum: u32 = stack.drain(drain_from..).map(|v| v as u32).sum();
                    stack.push((sum >= need as u32) as u8);
                }
                _ => return Err(Error::InvalidId),
            }
        }

        if stack.len() != 1 {
            return Err(Error::InvalidId);
        }
        if stack[0] == 1 {
            Ok(())
        } else {
            Err(Error::NoQuorum)
        }
    }
}

/// Parses a `.quorum`-style token like `"256."` into an integer in `1..=256`.
fn parse_dotted_count(tok: &str) -> Result<u16> {
    let digits = tok.strip_suffix('.').ok_or(Error::InvalidId)?;
    let n: u16 = digits.parse().map_err(|_| Error::InvalidId)?;
    if n == 0 || n > 256 {
        return Err(Error::InvalidId);
    }
    Ok(n)
}

/// Encodes `1..=256` into a single byte, with 256 wrapping to 0.
fn encode_count(n: u16) -> u8 {
    if n == 256 {
        0
    } else {
        n as u8
    }
}

/// Inverse of [`encode_count`]: byte `0` decodes to 256, any other byte `b`
/// decodes to `b` itself.
fn decode_count(b: u8) -> u16 {
    if b == 0 {
        256
    } else {
        b as u16
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

    #[test]
    fn single_key_verifies() {
        let kp = keypair(1);
        let asm = format!(".ed25519 {}", hex::encode(kp.public.as_bytes()));
        let script = IdScript::assemble(&asm).unwrap();
        let msg = b"hello";
        let sig = kp.sign(msg).to_bytes().to_vec();
        assert!(script.verify(msg, &[sig]).is_ok());
    }

    #[test]
    fn wrong_signature_yields_no_quorum() {
        let kp = keypair(2);
        let asm = format!(".ed25519 {}", hex::encode(kp.public.as_bytes()));
        let script = IdScript::assemble(&asm).unwrap();
        let bad_sig = vec![0u8; 64];
        assert_eq!(script.verify(b"hello", &[bad_sig]), Err(Error::NoQuorum));
    }

    #[test]
    fn quorum_one_of_two() {
        let kp1 = keypair(3);
        let kp2 = keypair(4);
        let asm = format!(
            ".ed25519 {} .ed25519 {} .quorum 1. 2.",
            hex::encode(kp1.public.as_bytes()),
            hex::encode(kp2.public.as_bytes())
        );
        let script = IdScript::assemble(&asm).unwrap();
        let msg = b"quorum test";
        let good = kp1.sign(msg).to_bytes().to_vec();
        let zero = vec![0u8; 64];
        assert!(script.verify(msg, &[good.clone(), zero.clone()]).is_ok());
        assert_eq!(script.verify(msg, &[zero.clone(), zero]), Err(Error::NoQuorum));
    }

    #[test]
    fn quorum_zero_rejected_at_assembly() {
        assert_eq!(IdScript::assemble(".quorum 0. 2."), Err(Error::InvalidId));
        assert_eq!(IdScript::assemble(".quorum 1. 0."), Err(Error::InvalidId));
    }

    #[test]
    fn quorum_256_roundtrips_through_zero_byte() {
        let asm = ".quorum 256. 256.";
        let script = IdScript::assemble(asm).unwrap();
        assert_eq!(script.0[1], 0);
        assert_eq!(script.0[2], 0);
    }

    #[test]
    fn unrecognized_token_rejected() {
        assert_eq!(IdScript::assemble(".frobnicate"), Err(Error::InvalidId));
    }

    #[test]
    fn truncated_script_never_panics() {
        let kp = keypair(5);
        let asm = format!(".ed25519 {}", hex::encode(kp.public.as_bytes()));
        let script = IdScript::assemble(&asm).unwrap();
        for len in 0..script.0.len() {
            let truncated = IdScript(script.0[..len].to_vec());
            let result = truncated.verify(b"x", &[vec![0u8; 64]]);
            assert!(result.is_err());
        }
    }

    #[test]
    fn fuzz_random_bytes_never_panic() {
        // deterministic pseudo-random bytes, no external dependency needed
        let mut state = 0x243F_6A88_85A3_08D3u64;
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };
        for _ in 0..500 {
            let len = (next() % 40) as usize;
            let bytes: Vec<u8> = (0..len).map(|_| next() as u8).collect();
            let script = IdScript(bytes);
            let sigs = vec![vec![0u8; 64], vec![1u8; 64]];
            let _ = script.verify(b"fuzz", &sigs);
        }
    }
}
