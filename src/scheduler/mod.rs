//! Scheduler module for running check rounds and feeding results to the store.

mod retention;

pub use retention::*;

use crate::config::Group;
use crate::probe::{CheckerRegistry, Target};
use crate::state::{CheckResult, Store};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Semaphore};

/// Marks a target as having a probe in flight. Released on drop, including
/// when the probe task panics.
struct InFlight(Arc<AtomicBool>);

impl InFlight {
    fn try_claim(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag.clone()))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Everything a dispatched probe needs, shared by all group loops.
struct ProbeContext {
    registry: Arc<CheckerRegistry>,
    semaphore: Arc<Semaphore>,
    result_tx: mpsc::Sender<CheckResult>,
    in_flight: HashMap<String, Arc<AtomicBool>>,
}

/// The main scheduler that orchestrates check rounds.
pub struct Scheduler {
    groups: Vec<Group>,
    ctx: Arc<ProbeContext>,
    stop_tx: broadcast::Sender<()>,
    retention_manager: RetentionManager,
}

impl Scheduler {
    /// Create a scheduler and spawn its result writer.
    pub fn new(
        store: Arc<Store>,
        registry: Arc<CheckerRegistry>,
        groups: Vec<Group>,
        max_concurrency: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel(1000);
        tokio::spawn(run_result_writer(rx, store.clone()));

        let in_flight = groups
            .iter()
            .flat_map(|g| g.targets.iter())
            .map(|t| (t.name().to_string(), Arc::new(AtomicBool::new(false))))
            .collect();

        let (stop_tx, _) = broadcast::channel(1);

        Self {
            groups,
            ctx: Arc::new(ProbeContext {
                registry,
                semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
                result_tx: tx,
                in_flight,
            }),
            stop_tx,
            retention_manager: RetentionManager::new(store),
        }
    }

    /// Start one loop per group plus the retention sweep.
    pub fn start(&self) {
        let monitored: usize = self
            .groups
            .iter()
            .map(|g| g.targets.iter().filter(|t| t.checker.is_some()).count())
            .sum();
        tracing::info!(
            "Starting scheduler with {} groups, {} monitored targets",
            self.groups.len(),
            monitored
        );

        for group in &self.groups {
            tokio::spawn(run_group_loop(
                group.clone(),
                self.ctx.clone(),
                self.stop_tx.subscribe(),
            ));
        }

        self.retention_manager.start();
    }

    /// Stop all group loops. Probes already in flight still complete and
    /// have their results recorded.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(());
        self.retention_manager.stop();
        tracing::info!("Scheduler stopped");
    }
}

/// Run the loop for one group: a check round per interval tick.
async fn run_group_loop(group: Group, ctx: Arc<ProbeContext>, mut stop_rx: broadcast::Receiver<()>) {
    let mut interval = tokio::time::interval(group.interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = stop_rx.recv() => {
                break;
            }
            _ = interval.tick() => {
                let dispatched = dispatch_round(&group.targets, &ctx);
                tracing::debug!(
                    "Dispatched {} probes (interval {}s)",
                    dispatched,
                    group.interval.as_secs()
                );
            }
        }
    }
}

/// Spawn one probe per monitorable target. Targets whose previous probe is
/// still running are skipped for this round.
fn dispatch_round(targets: &[Target], ctx: &Arc<ProbeContext>) -> usize {
    let mut dispatched = 0;

    for target in targets.iter().filter(|t| t.checker.is_some()) {
        let Some(flag) = ctx.in_flight.get(target.name()) else {
            continue;
        };
        let Some(guard) = InFlight::try_claim(flag) else {
            tracing::warn!(
                "Skipping probe for {}: previous check still in flight",
                target.name()
            );
            continue;
        };

        let target = target.clone();
        let ctx = ctx.clone();
        dispatched += 1;

        tokio::spawn(async move {
            let _guard = guard;

            let jitter = Duration::from_millis(rand::random::<u64>() % 100);
            tokio::time::sleep(jitter).await;

            let _permit = match ctx.semaphore.clone().acquire_owned().await {
                Ok(p) => p,
                Err(_) => return,
            };

            if let Some(result) = ctx.registry.probe(&target).await {
                if ctx.result_tx.send(result).await.is_err() {
                    tracing::error!("Failed to send result for {}", target.name());
                }
            }
        });
    }

    dispatched
}

/// Apply results to the store in arrival order. This task is the store's
/// only writer of check results.
async fn run_result_writer(mut rx: mpsc::Receiver<CheckResult>, store: Arc<Store>) {
    while let Some(result) = rx.recv().await {
        store.record(result).await;
    }
    tracing::debug!("Result writer exiting");
}
