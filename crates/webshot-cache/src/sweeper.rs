//! Periodic expiry sweep

use crate::store::CacheStore;
use std::sync::Weak;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Background task running `CacheStore::cleanup` on a fixed interval.
///
/// Holds only a weak reference to the store, so it stops by itself once the
/// store is dropped.
pub struct Sweeper {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Sweeper {
    pub fn spawn(store: Weak<CacheStore>, every: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_secs = every.as_secs(), "Cache sweeper started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown_rx.changed() => break,
                }

                let Some(store) = store.upgrade() else {
                    debug!("Cache dropped, sweeper exiting");
                    break;
                };

                let report = store.cleanup().await;
                if report.failures > 0 {
                    warn!(
                        memory_expired = report.memory_expired,
                        durable_expired = report.durable_expired,
                        orphans_removed = report.orphans_removed,
                        failures = report.failures,
                        "Cache sweep finished with failures"
                    );
                } else {
                    info!(
                        memory_expired = report.memory_expired,
                        durable_expired = report.durable_expired,
                        orphans_removed = report.orphans_removed,
                        "Cache sweep finished"
                    );
                }
            }

            info!("Cache sweeper stopped");
        });

        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Signal the task and wait for it to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Cache sweeper task failed");
        }
    }
}
