//! Tree-node hashing and inclusion/exclusion proofs over the diff-forest.
//!
//! A [`FullNode`] carries the actual value bytes and lives in the node
//! store; an [`AbbrNode`] carries only the value's hash and is what a
//! [`Proof`] ships to a client. Both hash identically, so a client can
//! check a proof without ever seeing the values of sibling subtrees.

use bitforest_core::dsha256;
use std::cmp::Ordering;

const ZERO: [u8; 32] = [0u8; 32];

/// A tree node as stored in the forest: key, value, and child hashes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullNode {
    pub key: String,
    pub value: Vec<u8>,
    pub left_hash: Option<[u8; 32]>,
    pub right_hash: Option<[u8; 32]>,
}

impl FullNode {
    /// `dsha256(key || dsha256(value) || left_hash_or_zero || right_hash_or_zero)`.
    pub fn hash(&self) -> [u8; 32] {
        let mut buf = Vec::with_capacity(self.key.len() + 32 * 3);
        buf.extend_from_slice(self.key.as_bytes());
        buf.extend_from_slice(&dsha256(&self.value));
        buf.extend_from_slice(&self.left_hash.unwrap_or(ZERO));
        buf.extend_from_slice(&self.right_hash.unwrap_or(ZERO));
        dsha256(&buf)
    }

    /// The abbreviated form of this node, as emitted into a proof.
    pub fn abbreviate(&self) -> AbbrNode {
        AbbrNode {
            key: self.key.clone(),
            v_hash: dsha256(&self.value),
            l_hash: self.left_hash.unwrap_or(ZERO),
            r_hash: self.right_hash.unwrap_or(ZERO),
        }
    }
}

/// A node as carried in a [`Proof`]: the key and the three hashes, never
/// the value itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbbrNode {
    pub key: String,
    pub v_hash: [u8; 32],
    pub l_hash: [u8; 32],
    pub r_hash: [u8; 32],
}

impl AbbrNode {
    /// Identical hashing contract to [`FullNode::hash`], since `v_hash`
    /// already equals `dsha256(value)`.
    pub fn hash(&self) -> [u8; 32] {
        let mut buf = Vec::with_capacity(self.key.len() + 32 * 3);
        buf.extend_from_slice(self.key.as_bytes());
        buf.extend_from_slice(&self.v_hash);
        buf.extend_from_slice(&self.l_hash);
        buf.extend_from_slice(&self.r_hash);
        dsha256(&buf)
    }

    /// Wire form: `key_bytes || v_hash (32) || l_hash (32) || r_hash (32)`;
    /// `key_bytes` is everything but the trailing 96 bytes, so the key
    /// length is inferred from the total length rather than prefixed.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.key.len() + 96);
        out.extend_from_slice(self.key.as_bytes());
        out.extend_from_slice(&self.v_hash);
        out.extend_from_slice(&self.l_hash);
        out.extend_from_slice(&self.r_hash);
        out
    }

    /// Inverse of [`AbbrNode::to_bytes`]. Malformed input yields `None`
    /// rather than panicking.
    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < 96 {
            return None;
        }
        let split = buf.len() - 96;
        let key = std::str::from_utf8(&buf[..split]).ok()?.to_string();
        let tail = &buf[split..];
        let mut v_hash = [0u8; 32];
        let mut l_hash = [0u8; 32];
        let mut r_hash = [0u8; 32];
        v_hash.copy_from_slice(&tail[0..32]);
        l_hash.copy_from_slice(&tail[32..64]);
        r_hash.copy_from_slice(&tail[64..96]);
        Some(AbbrNode { key, v_hash, l_hash, r_hash })
    }
}

/// An ordered, non-empty path of abbreviated nodes from a tree root down to
/// the key being proven (in)existent.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Proof(pub Vec<AbbrNode>);

impl Proof {
    /// Checks this proof against `root_hash` for `name`.
    ///
    /// `value_hash` present proves inclusion of `name` with that value
    /// hash; `None` proves `name` is absent from the tree.
    pub fn check(&self, root_hash: [u8; 32], name: &str, value_hash: Option<[u8; 32]>) -> bool {
        let Some(first) = self.0.first() else {
            return false;
        };
        if first.hash() != root_hash {
            return false;
        }

        // all keys in the path must be distinct
        for i in 0..self.0.len() {
            for j in (i + 1)..self.0.len() {
                if self.0[i].key == self.0[j].key {
                    return false;
                }
            }
        }

        for pair in self.0.windows(2) {
            let (x, y) = (&pair[0], &pair[1]);
            match name.cmp(&x.key) {
                Ordering::Less => {
                    if y.hash() != x.l_hash || y.key >= x.key {
                        return false;
                    }
                }
                Ordering::Greater => {
                    if y.hash() != x.r_hash || y.key <= x.key {
                        return false;
                    }
                }
                Ordering::Equal => return false,
            }
        }

        let last = self.0.last().unwrap();
        match value_hash {
            Some(vh) => last.key == name && last.v_hash == vh,
            None => last.key != name && last.l_hash == ZERO && last.r_hash == ZERO,
        }
    }
}
