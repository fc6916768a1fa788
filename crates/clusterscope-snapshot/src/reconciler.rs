use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::store::SnapshotStore;

/// Produces a fresh, complete list of summaries
#[async_trait]
pub trait SnapshotBuilder: Send + Sync {
    type Item: Clone + Send + Sync + 'static;

    async fn build(&self) -> anyhow::Result<Vec<Self::Item>>;
}

/// Rebuilds a [`SnapshotStore`] on a fixed interval
///
/// A failed build is logged and the previous snapshot stays in place.
pub struct Reconciler<B: SnapshotBuilder> {
    name: &'static str,
    builder: B,
    store: Arc<SnapshotStore<B::Item>>,
    interval: Duration,
}

impl<B: SnapshotBuilder> Reconciler<B> {
    pub fn new(
        name: &'static str,
        builder: B,
        store: Arc<SnapshotStore<B::Item>>,
        interval: Duration,
    ) -> Self {
        Self {
            name,
            builder,
            store,
            interval,
        }
    }

    /// Rebuild once. Returns whether the store was replaced.
    pub async fn refresh(&self) -> bool {
        match self.builder.build().await {
            Ok(items) => {
                let count = items.len();
                self.store.replace(items);
                info!(snapshot = self.name, count, "Snapshot refreshed");
                true
            }
            Err(err) => {
                error!(
                    snapshot = self.name,
                    error = %format!("{err:#}"),
                    "Snapshot refresh failed, keeping previous snapshot"
                );
                false
            }
        }
    }

    /// Refresh immediately and then every interval until `cancel` fires
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = self.refresh() => {}
                    }
                }
            }
        }

        debug!(snapshot = self.name, "Snapshot reconciler stopped");
    }
}
