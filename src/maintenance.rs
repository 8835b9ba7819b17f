//! # Maintenance
//!
//! Keeps the usage store bounded. A prune pass removes, in one write:
//!
//! | Reason | Rule |
//! |--------|------|
//! | uninstalled | identity is not in the still-installed set |
//! | stale | idle longer than the staleness horizon and launched fewer than `noise_threshold` times |
//! | evicted | beyond `max_records`, least recently used first |
//!
//! Pruning is never part of a ranking query. Run it when the installed app
//! set changes, or let [`Maintenance::spawn_scheduled`] run it periodically.

use crate::config::Config;
use crate::error::StoreError;
use crate::usage::{EpochMillis, LaunchableId, UsageRecord, UsageStore};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Thresholds for a prune pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrunePolicy {
    pub staleness_horizon: Duration,
    pub noise_threshold: u64,
    pub max_records: usize,
}

impl Default for PrunePolicy {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for PrunePolicy {
    fn from(config: &Config) -> Self {
        Self {
            staleness_horizon: config.staleness_horizon(),
            noise_threshold: config.noise_threshold,
            max_records: config.max_records,
        }
    }
}

impl PrunePolicy {
    fn is_stale(&self, record: &UsageRecord, now: EpochMillis) -> bool {
        let horizon = i64::try_from(self.staleness_horizon.as_millis()).unwrap_or(i64::MAX);
        record.age_millis(now) > horizon && record.launch_count < self.noise_threshold
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reason {
    Uninstalled,
    Stale,
    Evicted { last_used_at: EpochMillis },
}

/// What a prune pass removed, each list in identity order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PruneReport {
    pub uninstalled: Vec<LaunchableId>,
    pub stale: Vec<LaunchableId>,
    pub evicted: Vec<LaunchableId>,
    pub remaining: usize,
}

impl PruneReport {
    pub fn removed(&self) -> usize {
        self.uninstalled.len() + self.stale.len() + self.evicted.len()
    }
}

/// Prune runner bound to one store.
#[derive(Debug, Clone)]
pub struct Maintenance {
    store: Arc<UsageStore>,
    policy: PrunePolicy,
}

impl Maintenance {
    pub fn new(store: Arc<UsageStore>, policy: PrunePolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &PrunePolicy {
        &self.policy
    }

    /// Remove records of uninstalled, stale and surplus launchables.
    ///
    /// The plan is made from a snapshot and re-checked against the live
    /// record at removal time, so a launch recorded in between keeps its
    /// record unless the app really is gone.
    pub fn prune(
        &self,
        still_installed: &HashSet<LaunchableId>,
        now: EpochMillis,
    ) -> Result<PruneReport, StoreError> {
        let plan = self.plan(still_installed, now)?;
        if plan.is_empty() {
            let remaining = self.store.len();
            debug!(remaining, "nothing to prune");
            return Ok(PruneReport {
                remaining,
                ..PruneReport::default()
            });
        }

        let policy = &self.policy;
        let removed = self.store.retain(|record| match plan.get(&record.identity) {
            None => true,
            Some(Reason::Uninstalled) => false,
            Some(Reason::Stale) => !policy.is_stale(record, now),
            Some(Reason::Evicted { last_used_at }) => record.last_used_at != *last_used_at,
        })?;

        let mut report = PruneReport {
            remaining: self.store.len(),
            ..PruneReport::default()
        };
        for record in removed {
            let list = match plan.get(&record.identity) {
                Some(Reason::Uninstalled) => &mut report.uninstalled,
                Some(Reason::Stale) => &mut report.stale,
                Some(Reason::Evicted { .. }) | None => &mut report.evicted,
            };
            list.push(record.identity);
        }
        report.uninstalled.sort();
        report.stale.sort();
        report.evicted.sort();

        info!(
            uninstalled = report.uninstalled.len(),
            stale = report.stale.len(),
            evicted = report.evicted.len(),
            remaining = report.remaining,
            "pruned usage store"
        );
        Ok(report)
    }

    fn plan(
        &self,
        still_installed: &HashSet<LaunchableId>,
        now: EpochMillis,
    ) -> Result<HashMap<LaunchableId, Reason>, StoreError> {
        let mut plan = HashMap::new();
        let mut survivors = Vec::new();

        for record in self.store.scan_all()? {
            if !still_installed.contains(&record.identity) {
                plan.insert(record.identity, Reason::Uninstalled);
            } else if self.policy.is_stale(&record, now) {
                plan.insert(record.identity, Reason::Stale);
            } else {
                survivors.push(record);
            }
        }

        if survivors.len() > self.policy.max_records {
            survivors.sort_by(|a, b| {
                b.last_used_at
                    .cmp(&a.last_used_at)
                    .then_with(|| a.identity.cmp(&b.identity))
            });
            for record in survivors.drain(self.policy.max_records..) {
                plan.insert(
                    record.identity,
                    Reason::Evicted {
                        last_used_at: record.last_used_at,
                    },
                );
            }
        }

        Ok(plan)
    }

    /// Prune every `interval`, starting immediately, on the current Tokio
    /// runtime. `installed` is asked for the installed set on each run; an
    /// empty set is taken as "enumeration unavailable" and that run is
    /// skipped. The task stops when the returned handle is dropped or
    /// stopped.
    pub fn spawn_scheduled<F>(self, interval: Duration, installed: F) -> MaintenanceHandle
    where
        F: Fn() -> HashSet<LaunchableId> + Send + Sync + 'static,
    {
        let (shutdown, mut stop) = oneshot::channel::<()>();
        let installed = Arc::new(installed);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut runs = 0u64;

            loop {
                tokio::select! {
                    _ = &mut stop => break,
                    _ = ticker.tick() => {}
                }

                let set = installed();
                if set.is_empty() {
                    warn!("installed app set is empty, skipping scheduled prune");
                    continue;
                }

                let maintenance = self.clone();
                let now = crate::usage::now_millis();
                match tokio::task::spawn_blocking(move || maintenance.prune(&set, now)).await {
                    Ok(Ok(_)) => runs += 1,
                    Ok(Err(e)) => warn!(error = %e, "scheduled prune failed"),
                    Err(e) => warn!(error = %e, "scheduled prune panicked"),
                }
            }

            debug!(runs, "maintenance task stopped");
            runs
        });

        MaintenanceHandle {
            shutdown: Some(shutdown),
            task,
        }
    }
}

/// Handle to a scheduled maintenance task.
#[derive(Debug)]
pub struct MaintenanceHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<u64>,
}

impl MaintenanceHandle {
    /// Stop the task and return how many prune runs succeeded.
    pub async fn stop(mut self) -> u64 {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        (&mut self.task).await.unwrap_or(0)
    }
}
