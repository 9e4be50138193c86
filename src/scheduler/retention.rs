//! Retention manager for reclaiming expired history.

use crate::state::Store;

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Periodically drops history entries past the retention horizon, so idle
/// series are reclaimed even when nothing new is appended to them.
pub struct RetentionManager {
    store: Arc<Store>,
    every: Duration,
    stop: broadcast::Sender<()>,
}

impl RetentionManager {
    pub fn new(store: Arc<Store>) -> Self {
        Self::with_interval(store, SWEEP_INTERVAL)
    }

    pub fn with_interval(store: Arc<Store>, every: Duration) -> Self {
        let (stop, _) = broadcast::channel(1);
        Self { store, every, stop }
    }

    /// Start the retention background task.
    pub fn start(&self) {
        let store = self.store.clone();
        let mut rx = self.stop.subscribe();
        let mut interval = tokio::time::interval(self.every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = rx.recv() => break,
                    _ = interval.tick() => {
                        process_retention(&store).await;
                    }
                }
            }
        });
    }

    /// Stop the retention manager.
    pub fn stop(&self) {
        let _ = self.stop.send(());
    }
}

async fn process_retention(store: &Store) {
    let removed = store.prune_history(Utc::now()).await;
    if removed > 0 {
        tracing::debug!("RetentionManager: pruned {} expired history entries", removed);
    }
}
