//! In-memory, periodically-refreshed cache of confirmed block headers.
//!
//! Fetches are fanned out across a bounded worker pool so that catching up
//! from a cold cache doesn't serialize one request per block.

use std::sync::Arc;

use bitforest_core::codec::HEADER_LEN;
use bitforest_rpc::BitcoinRpc;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinSet;

use crate::error::{Error, Result};

/// Target number of concurrent header fetches during a sync.
const FETCH_CONCURRENCY: usize = 15;

/// A shared, write-locked cache of confirmed headers, in height order.
pub struct HeaderCache {
    headers: RwLock<Vec<[u8; HEADER_LEN]>>,
}

impl HeaderCache {
    pub fn new() -> Self {
        HeaderCache { headers: RwLock::new(Vec::new()) }
    }

    /// A snapshot of the currently cached headers.
    pub async fn snapshot(&self) -> Vec<[u8; HEADER_LEN]> {
        self.headers.read().await.clone()
    }

    /// The concatenated raw bytes of every cached header, in order — the
    /// exact body served at `/blockchain_headers`.
    pub async fn serialize(&self) -> Vec<u8> {
        let headers = self.headers.read().await;
        let mut out = Vec::with_capacity(headers.len() * HEADER_LEN);
        for h in headers.iter() {
            out.extend_from_slice(h);
        }
        out
    }

    /// Fetches any headers between the cache's current length and the
    /// collaborator's reported chain tip, fanning requests out across a
    /// bounded worker pool. On any single fetch failure, the cache is left
    /// exactly as it was before this call — no partial extension is kept.
    pub async fn sync<R>(&self, rpc: Arc<R>) -> Result<usize>
    where
        R: BitcoinRpc + Send + Sync + 'static,
    {
        let start_len = self.headers.read().await.len() as u64;
        let tip = {
            let rpc = rpc.clone();
            tokio::task::spawn_blocking(move || rpc.block_count()).await??
        };
        if tip <= start_len {
            return Ok(0);
        }

        let semaphore = Arc::new(Semaphore::new(FETCH_CONCURRENCY));
        let mut joinset = JoinSet::new();
        for idx in start_len..tip {
            let rpc = rpc.clone();
            let permit = semaphore.clone();
            joinset.spawn(async move {
                let _permit = permit.acquire_owned().await.expect("semaphore never closed");
                let bytes = tokio::task::spawn_blocking(move || rpc.header(idx)).await??;
                let header = to_header(idx, &bytes)?;
                Ok::<(u64, [u8; HEADER_LEN]), Error>((idx, header))
            });
        }

        let mut fetched = vec![None; (tip - start_len) as usize];
        while let Some(res) = joinset.join_next().await {
            match res? {
                Ok((idx, header)) => fetched[(idx - start_len) as usize] = Some(header),
                Err(e) => {
                    // leave the cache untouched; a later tick retries from scratch
                    return Err(e);
                }
            }
        }

        let mut headers = self.headers.write().await;
        // another sync may have raced us to a longer cache already; only
        // extend if we're still exactly where we started from.
        if headers.len() as u64 == start_len {
            for h in fetched.into_iter().flatten() {
                headers.push(h);
            }
        }
        Ok((tip - start_len) as usize)
    }
}

impl Default for HeaderCache {
    fn default() -> Self {
        Self::new()
    }
}

fn to_header(idx: u64, bytes: &[u8]) -> Result<[u8; HEADER_LEN]> {
    if bytes.len() != HEADER_LEN {
        return Err(Error::BadHeaderLength(idx));
    }
    let mut out = [0u8; HEADER_LEN];
    out.copy_from_slice(bytes);
    Ok(out)
}
