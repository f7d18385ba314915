//! SQLite-backed diff-forest storage: staging, atomic commit, and proof
//! generation over the tree-node relations.
//!
//! Schema mirrors the reference forest: `NODES` is the content-addressed
//! node store, `ROOTS` the append-only snapshot history, `STAGING` the
//! not-yet-committed per-name batch.

use std::collections::BTreeMap;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use crate::cache::NodeCache;
use crate::error::{Error, Result};
use crate::node::{FullNode, Proof};

/// A SQLite-backed diff-forest.
pub struct Store {
    conn: Mutex<Connection>,
    cache: NodeCache,
}

impl Store {
    /// Opens or creates a forest database at `path`. Use `":memory:"` for an
    /// ephemeral, process-local forest.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             CREATE TABLE IF NOT EXISTS nodes (
                 hash        BLOB PRIMARY KEY,
                 key         TEXT NOT NULL,
                 value       BLOB NOT NULL,
                 left_hash   BLOB REFERENCES nodes(hash),
                 right_hash  BLOB REFERENCES nodes(hash)
             );
             CREATE TABLE IF NOT EXISTS roots (
                 serial    INTEGER PRIMARY KEY,
                 ctime     INTEGER NOT NULL,
                 root_hash BLOB NOT NULL REFERENCES nodes(hash)
             );
             CREATE TABLE IF NOT EXISTS staging (
                 key   TEXT PRIMARY KEY,
                 value BLOB NOT NULL
             );",
        )?;
        Ok(Store { conn: Mutex::new(conn), cache: NodeCache::new() })
    }

    /// Appends `op_bytes` to the pending batch for `name`, creating the
    /// staging row if absent.
    pub fn stage(&self, name: &str, op_bytes: &[u8]) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let existing: Option<Vec<u8>> = conn
            .query_row("SELECT value FROM staging WHERE key = ?1", params![name], |r| r.get(0))
            .optional()?;
        match existing {
            Some(mut value) => {
                value.extend_from_slice(op_bytes);
                conn.execute("UPDATE staging SET value = ?1 WHERE key = ?2", params![value, name])?;
            }
            None => {
                conn.execute(
                    "INSERT INTO staging (key, value) VALUES (?1, ?2)",
                    params![name, op_bytes],
                )?;
            }
        }
        Ok(())
    }

    /// Snapshots the current staging batch into a new perfectly balanced
    /// BST, records its root, and clears staging. Returns the tip root hash
    /// (the newly committed one, or the prior tip if nothing was staged).
    pub fn commit(&self) -> Result<[u8; 32]> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let mut stmt = tx.prepare("SELECT key, value FROM staging")?;
        let rows: BTreeMap<String, Vec<u8>> = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, Vec<u8>>(1)?)))?
            .collect::<std::result::Result<_, _>>()?;
        drop(stmt);

        if rows.is_empty() {
            let tip = Self::latest_root(&tx)?;
            tx.commit()?;
            return tip.ok_or(Error::UnknownRoot);
        }

        let keys: Vec<&String> = rows.keys().collect();
        let root_hash = Self::alloc_balanced(&tx, &keys, &rows)?
            .expect("non-empty key set always yields a root");

        let serial: i64 = tx
            .query_row("SELECT COALESCE(MAX(serial), -1) + 1 FROM roots", [], |r| r.get(0))?;
        let ctime = Self::current_serial_time(&tx)?;
        tx.execute(
            "INSERT INTO roots (serial, ctime, root_hash) VALUES (?1, ?2, ?3)",
            params![serial, ctime, root_hash.to_vec()],
        )?;
        tx.execute("DELETE FROM staging", [])?;
        tx.commit()?;
        Ok(root_hash)
    }

    /// The not-yet-committed staged bytes for `name`, if any.
    pub fn peek_staging(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.conn.lock().unwrap();
        let value: Option<Vec<u8>> = conn
            .query_row("SELECT value FROM staging WHERE key = ?1", params![name], |r| r.get(0))
            .optional()?;
        Ok(value)
    }

    /// All recorded tree roots, oldest first.
    pub fn tree_roots(&self) -> Result<Vec<[u8; 32]>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT root_hash FROM roots ORDER BY serial ASC")?;
        let out = stmt
            .query_map([], |r| r.get::<_, Vec<u8>>(0))?
            .map(|r| r.map(|v| to_hash(&v)))
            .collect::<std::result::Result<_, _>>()?;
        Ok(out)
    }

    /// Descends from `root_hash` looking for `name`, returning the proof
    /// path and, if `name` matched, the raw value bytes at the terminal
    /// node (the concatenated staged operation blob committed for it).
    pub fn find_proof(&self, root_hash: [u8; 32], name: &str) -> Result<(Proof, Option<Vec<u8>>)> {
        let conn = self.conn.lock().unwrap();
        let mut path = Vec::new();
        let mut cursor = Some(root_hash);
        let mut matched_value = None;

        while let Some(hash) = cursor {
            let node = self.get_node(&conn, hash)?;
            let ord = name.cmp(node.key.as_str());
            path.push(node.abbreviate());
            cursor = match ord {
                std::cmp::Ordering::Less => node.left_hash,
                std::cmp::Ordering::Greater => node.right_hash,
                std::cmp::Ordering::Equal => {
                    matched_value = Some(node.value.clone());
                    None
                }
            };
        }

        Ok((Proof(path), matched_value))
    }

    fn get_node(&self, conn: &Connection, hash: [u8; 32]) -> Result<FullNode> {
        self.cache.get_or_insert_with(hash, || Self::load_node(conn, hash))
    }

    fn load_node(conn: &Connection, hash: [u8; 32]) -> Result<FullNode> {
        conn.query_row(
            "SELECT key, value, left_hash, right_hash FROM nodes WHERE hash = ?1",
            params![hash.to_vec()],
            |r| {
                let left: Option<Vec<u8>> = r.get(2)?;
                let right: Option<Vec<u8>> = r.get(3)?;
                Ok(FullNode {
                    key: r.get(0)?,
                    value: r.get(1)?,
                    left_hash: left.map(|v| to_hash(&v)),
                    right_hash: right.map(|v| to_hash(&v)),
                })
            },
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Error::UnknownRoot,
            other => other.into(),
        })
    }

    /// Inserts `node` if its hash isn't already present (structural
    /// sharing across snapshots), returning its hash either way.
    fn alloc_node(tx: &Connection, node: &FullNode) -> Result<[u8; 32]> {
        let hash = node.hash();
        let exists: Option<Vec<u8>> = tx
            .query_row("SELECT hash FROM nodes WHERE hash = ?1", params![hash.to_vec()], |r| r.get(0))
            .optional()?;
        if exists.is_none() {
            tx.execute(
                "INSERT INTO nodes (hash, key, value, left_hash, right_hash) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    hash.to_vec(),
                    node.key,
                    node.value,
                    node.left_hash.map(|h| h.to_vec()),
                    node.right_hash.map(|h| h.to_vec()),
                ],
            )?;
        }
        Ok(hash)
    }

    /// Builds a perfectly balanced BST over `keys` (already sorted by
    /// `BTreeMap` iteration order), returning the root hash. `None` iff
    /// `keys` is empty.
    fn alloc_balanced(
        tx: &Connection,
        keys: &[&String],
        values: &BTreeMap<String, Vec<u8>>,
    ) -> Result<Option<[u8; 32]>> {
        if keys.is_empty() {
            return Ok(None);
        }
        if keys.len() == 1 {
            let key = keys[0];
            let node = FullNode { key: key.clone(), value: values[key].clone(), left_hash: None, right_hash: None };
            return Ok(Some(Self::alloc_node(tx, &node)?));
        }
        let mid = keys.len() / 2;
        let (left, rest) = keys.split_at(mid);
        let (mid_key, right) = rest.split_first().unwrap();
        let left_hash = Self::alloc_balanced(tx, left, values)?;
        let right_hash = Self::alloc_balanced(tx, right, values)?;
        let node = FullNode {
            key: (*mid_key).clone(),
            value: values[*mid_key].clone(),
            left_hash,
            right_hash,
        };
        Ok(Some(Self::alloc_node(tx, &node)?))
    }

    fn latest_root(tx: &Connection) -> Result<Option<[u8; 32]>> {
        let row: Option<Vec<u8>> = tx
            .query_row("SELECT root_hash FROM roots ORDER BY serial DESC LIMIT 1", [], |r| r.get(0))
            .optional()?;
        Ok(row.map(|v| to_hash(&v)))
    }

    /// Monotonic logical clock for `ctime`: one past the previous row's
    /// value, so commits stay ordered without depending on wall-clock time.
    fn current_serial_time(tx: &Connection) -> Result<i64> {
        let prev: i64 = tx.query_row("SELECT COALESCE(MAX(ctime), -1) FROM roots", [], |r| r.get(0))?;
        Ok(prev + 1)
    }
}

fn to_hash(bytes: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let n = bytes.len().min(32);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}
