//! Background task that periodically commits staged operations and runs
//! the anchor pipeline, aligned to absolute clock boundaries.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bitforest_anchor::Pipeline;
use bitforest_forest::Store as ForestStore;
use bitforest_rpc::BitcoinRpc;
use tokio_util::sync::CancellationToken;

/// Runs the anchor loop until `token` is cancelled.
///
/// On every tick (aligned to `k * interval` seconds since the Unix epoch),
/// a synthetic heartbeat operation is staged under `heartbeat_name`, the
/// forest is committed, and the anchor pipeline is run. Each of those three
/// sub-steps retries with a one-second backoff until it succeeds or the
/// token is cancelled.
pub async fn run<R>(
    token: CancellationToken,
    forest: Arc<ForestStore>,
    pipeline: Arc<Pipeline<R>>,
    heartbeat_name: String,
    interval: Duration,
) where
    R: BitcoinRpc + Send + Sync + 'static,
{
    loop {
        let sleep = tokio::time::sleep(time_until_next_boundary(interval));
        tokio::select! {
            _ = token.cancelled() => return,
            _ = sleep => {}
        }

        let forest_for_commit = forest.clone();
        let tick_name = heartbeat_name.clone();
        let committed = retry_until_cancelled(&token, move || {
            let forest = forest_for_commit.clone();
            let name = tick_name.clone();
            async move {
                let stamp = now_secs().to_be_bytes().to_vec();
                tokio::task::spawn_blocking(move || {
                    forest.stage(&name, &stamp)?;
                    forest.commit().map(|_| ())
                })
                .await
                .map_err(|e| e.to_string())?
                .map_err(|e| e.to_string())
            }
        })
        .await;
        if committed.is_none() {
            return; // cancelled mid-retry
        }

        let forest_for_anchor = forest.clone();
        let pipeline_for_anchor = pipeline.clone();
        let anchored = retry_until_cancelled(&token, move || {
            let pipeline = pipeline_for_anchor.clone();
            let forest = forest_for_anchor.clone();
            async move {
                tokio::task::spawn_blocking(move || pipeline.run(&forest).map(|_| ()))
                    .await
                    .map_err(|e| e.to_string())?
                    .map_err(|e| e.to_string())
            }
        })
        .await;
        if anchored.is_none() {
            return;
        }
    }
}

/// Retries `op` with a one-second backoff on failure until it succeeds
/// (`Some(())`) or `token` is cancelled (`None`), logging each transient
/// failure.
async fn retry_until_cancelled<F, Fut>(token: &CancellationToken, mut op: F) -> Option<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<(), String>>,
{
    loop {
        match op().await {
            Ok(()) => return Some(()),
            Err(e) => {
                log::warn!("anchor loop step failed, retrying in 1s: {e}");
                tokio::select! {
                    _ = token.cancelled() => return None,
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                }
            }
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

fn time_until_next_boundary(interval: Duration) -> Duration {
    let interval_secs = interval.as_secs().max(1);
    let now = now_secs();
    let next_boundary = (now / interval_secs + 1) * interval_secs;
    Duration::from_secs(next_boundary - now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_is_always_in_the_future_and_aligned() {
        let interval = Duration::from_secs(600);
        let wait = time_until_next_boundary(interval);
        assert!(wait.as_secs() <= 600);
        let next = now_secs() + wait.as_secs();
        assert_eq!(next % 600, 0);
    }
}
