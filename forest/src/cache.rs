//! Process-wide FIFO-evicting cache of [`FullNode`]s, keyed by hash.
//!
//! Purely advisory: a cache miss just means one more SQLite read. Correctness
//! of the forest never depends on what is or isn't cached.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::node::FullNode;

/// Cap on resident entries before the oldest is evicted.
const LIMIT: usize = 1024 * 1024;

struct Inner {
    table: HashMap<[u8; 32], FullNode>,
    order: VecDeque<[u8; 32]>,
}

/// A bounded FIFO cache shared across an entire process.
pub struct NodeCache(Mutex<Inner>);

impl NodeCache {
    pub fn new() -> Self {
        NodeCache(Mutex::new(Inner { table: HashMap::new(), order: VecDeque::new() }))
    }

    /// Returns the cached node for `hash` if present, computing and caching
    /// it via `gen` otherwise.
    pub fn get_or_insert_with<E>(
        &self,
        hash: [u8; 32],
        gen: impl FnOnce() -> Result<FullNode, E>,
    ) -> Result<FullNode, E> {
        let mut inner = self.0.lock().unwrap();
        if let Some(node) = inner.table.get(&hash) {
            return Ok(node.clone());
        }
        drop(inner);
        let node = gen()?;
        inner = self.0.lock().unwrap();
        inner.table.insert(hash, node.clone());
        inner.order.push_back(hash);
        if inner.order.len() > LIMIT {
            if let Some(oldest) = inner.order.pop_front() {
                inner.table.remove(&oldest);
            }
        }
        Ok(node)
    }
}

impl Default for NodeCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caches_and_reuses() {
        let cache = NodeCache::new();
        let hash = [1u8; 32];
        let mut calls = 0;
        for _ in 0..3 {
            let node = cache
                .get_or_insert_with(hash, || -> Result<FullNode, ()> {
                    calls += 1;
                    Ok(FullNode { key: "k".into(), value: vec![], left_hash: None, right_hash: None })
                })
                .unwrap();
            assert_eq!(node.key, "k");
        }
        assert_eq!(calls, 1);
    }
}
