//! Background task that refreshes the header cache once a minute, the
//! cadence `SPEC_FULL.md §4.6` calls for.

use std::sync::Arc;
use std::time::Duration;

use bitforest_rpc::BitcoinRpc;
use tokio_util::sync::CancellationToken;

use crate::header_cache::HeaderCache;

const SYNC_INTERVAL: Duration = Duration::from_secs(60);

/// Runs the header-sync loop until `token` is cancelled: sync now, then wait
/// a minute (or until cancelled) and repeat. A failed sync is logged and
/// retried on the next tick rather than aborting the loop.
pub async fn run<R>(token: CancellationToken, cache: Arc<HeaderCache>, rpc: Arc<R>)
where
    R: BitcoinRpc + Send + Sync + 'static,
{
    loop {
        match cache.sync(rpc.clone()).await {
            Ok(added) if added > 0 => log::info!("header sync: added {added} headers"),
            Ok(_) => {}
            Err(e) => log::warn!("header sync failed, retrying next tick: {e}"),
        }

        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(SYNC_INTERVAL) => {}
        }
    }
}
