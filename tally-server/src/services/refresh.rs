//! Timer driving the allow-list cache refresh.

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::services::allow_list::{AllowListCache, AllowListSource, UpdateError, UpdateSummary};

/// Periodically refreshes an [`AllowListCache`] from its source.
#[derive(Debug)]
pub struct RefreshService<S> {
    cache: Arc<AllowListCache>,
    source: S,
    interval: Duration,
    timeout: Duration,
}

impl<S> RefreshService<S>
where
    S: AllowListSource + 'static,
{
    /// Creates the service. Each cycle is cancelled if it takes longer than `timeout`.
    pub fn new(cache: Arc<AllowListCache>, source: S, interval: Duration, timeout: Duration) -> Self {
        Self {
            cache,
            source,
            interval,
            timeout,
        }
    }

    /// Runs a single refresh cycle.
    ///
    /// A cycle that runs into the timeout is dropped before it swaps the cache, so the previous
    /// generation stays in place.
    pub async fn refresh(&self) -> Result<UpdateSummary, UpdateError> {
        tokio::time::timeout(self.timeout, self.cache.update(&self.source))
            .await
            .map_err(|_| UpdateError::Timeout)?
    }

    /// Runs a cycle and logs its outcome.
    pub async fn refresh_logged(&self) {
        match self.refresh().await {
            Ok(summary) => tally_log::debug!(
                apps = summary.apps,
                stale = summary.stale.len(),
                failed = summary.failed.len(),
                "allow-list refresh finished",
            ),
            Err(error) => {
                tally_log::warn!(error = &error as &dyn Error, "allow-list refresh failed")
            }
        }
    }

    /// Spawns the refresh loop.
    ///
    /// The first cycle runs one interval after the start, since callers perform the initial
    /// refresh themselves. The loop exits when `shutdown` is cancelled.
    pub fn start(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;

                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        tokio::select! {
                            biased;

                            _ = shutdown.cancelled() => break,
                            _ = self.refresh_logged() => (),
                        }
                    }
                }
            }

            tally_log::debug!("allow-list refresh stopped");
        })
    }
}
