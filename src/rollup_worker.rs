// Background rollup: one task per level >= 1 ticking at that level's interval,
// plus a retention sweep task that also drives VACUUM on a configurable
// schedule (cron expression or fixed interval).
//
// Progress lives in the store as the next bucket start per (agent, level). A
// bucket is compacted once now >= bucket_end + grace and, for level >= 2, once
// the previous level has completed up to bucket_end.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::alerting::AlertEngine;
use crate::clock::Clock;
use crate::config::AppConfig;
use crate::error::Result;
use crate::keyed_lock::KeyedLocks;
use crate::rollup::RollupEngine;
use crate::store::CollectorStore;

/// Config for the rollup worker.
#[derive(Debug, Clone)]
pub struct RollupWorkerConfig {
    pub grace_ms: i64,
    pub retention_sweep_interval_secs: u64,
    pub trace_retention_ms: i64,
    /// Optional cron expression for VACUUM (e.g. "0 0 3 * * *" = 03:00 daily). Uses local time.
    pub vacuum_schedule: Option<String>,
    /// Run VACUUM every N seconds when vacuum_schedule is not set.
    pub vacuum_interval_secs: u64,
}

impl RollupWorkerConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            grace_ms: config.rollup.grace_ms(),
            retention_sweep_interval_secs: config.rollup.retention_sweep_interval_secs,
            trace_retention_ms: (config.traces.retention_hours as i64).saturating_mul(3_600_000),
            vacuum_schedule: config.rollup.vacuum_schedule.clone(),
            vacuum_interval_secs: config.rollup.vacuum_interval_secs,
        }
    }
}

/// Result of one level tick across all agents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub agents: usize,
    /// Buckets that produced at least one rolled-up row.
    pub buckets: usize,
    pub skipped_busy: usize,
    pub failed: usize,
}

pub struct RollupWorker {
    store: Arc<dyn CollectorStore>,
    engine: Arc<RollupEngine>,
    alerts: Arc<AlertEngine>,
    clock: Arc<dyn Clock>,
    config: RollupWorkerConfig,
    in_flight: KeyedLocks<(String, usize)>,
}

impl RollupWorker {
    pub fn new(
        store: Arc<dyn CollectorStore>,
        engine: Arc<RollupEngine>,
        alerts: Arc<AlertEngine>,
        clock: Arc<dyn Clock>,
        config: RollupWorkerConfig,
    ) -> Self {
        Self {
            store,
            engine,
            alerts,
            clock,
            config,
            in_flight: KeyedLocks::new(),
        }
    }

    pub fn level_count(&self) -> usize {
        self.engine.levels().len()
    }

    /// Runs one pass of `level` for every known agent. Used by the level task
    /// and by the startup catch-up.
    #[instrument(skip(self), fields(operation = "rollup_tick"))]
    pub async fn run_one_tick(&self, level: usize) -> Result<TickSummary> {
        let now = self.clock.now_ms();
        let agent_ids = self.store.list_agent_ids().await?;
        let mut summary = TickSummary {
            agents: agent_ids.len(),
            ..TickSummary::default()
        };

        for agent_id in agent_ids {
            let Some(_guard) = self.in_flight.try_lock(&(agent_id.clone(), level)) else {
                debug!(agent_id = %agent_id, level, "rollup already running, skipping");
                summary.skipped_busy += 1;
                continue;
            };
            match self.rollup_agent(level, &agent_id, now).await {
                Ok((buckets, Some(last_end))) => {
                    summary.buckets += buckets;
                    self.check_alerts(&agent_id, last_end).await;
                }
                Ok((buckets, None)) => summary.buckets += buckets,
                Err(e) => {
                    warn!(agent_id = %agent_id, level, error = %e, "rollup failed, retrying next tick");
                    summary.failed += 1;
                }
            }
        }

        if summary.buckets > 0 {
            info!(level, rolled_up_buckets = summary.buckets, "rollup tick");
        }
        Ok(summary)
    }

    /// Compacts every ready bucket of one agent at `level`. Returns the number
    /// of non-empty buckets written and the end of the last one.
    async fn rollup_agent(
        &self,
        level: usize,
        agent_id: &str,
        now: i64,
    ) -> Result<(usize, Option<i64>)> {
        let Some(lvl) = self.engine.levels().get(level).copied() else {
            return Ok((0, None));
        };
        let source = level - 1;
        let interval = lvl.interval_ms();

        // Buckets ending at or before the horizon are ready.
        let mut horizon = lvl.bucket_start(now - self.config.grace_ms);
        if level >= 2 {
            let Some(done) = self.store.rollup_progress(agent_id, source).await? else {
                return Ok((0, None));
            };
            horizon = horizon.min(lvl.bucket_start(done));
        }

        // Expired history is never rebuilt.
        let retention_floor = lvl.bucket_start(now - lvl.retention_ms());
        let start = match self.store.rollup_progress(agent_id, level).await? {
            Some(progress) => progress.max(retention_floor),
            None => match self
                .store
                .first_capture_time(agent_id, source, retention_floor)
                .await?
            {
                Some(t) => lvl.bucket_start(t),
                None => return Ok((0, None)),
            },
        };

        let mut bucket_start = start;
        let mut buckets = 0;
        let mut last_end = None;
        while bucket_start.saturating_add(interval) <= horizon {
            let bucket_end = bucket_start + interval;
            let rolled = self
                .engine
                .rollup(level, agent_id, bucket_start, bucket_end)
                .await?;
            self.store
                .advance_rollup_progress(agent_id, level, bucket_end)
                .await?;
            if !rolled.is_empty() {
                buckets += 1;
                last_end = Some(bucket_end);
            }
            bucket_start = match self
                .store
                .first_capture_time(agent_id, source, bucket_end)
                .await?
            {
                Some(t) => lvl.bucket_start(t),
                None => horizon,
            };
        }
        if horizon > start {
            // Nothing left to compact before the horizon.
            self.store
                .advance_rollup_progress(agent_id, level, horizon)
                .await?;
        }
        Ok((buckets, last_end))
    }

    async fn check_alerts(&self, agent_id: &str, capture_time: i64) {
        if let Err(e) = self.alerts.sweep_alerts(agent_id, capture_time).await {
            warn!(agent_id = %agent_id, capture_time, error = %e, "alert sweep failed");
        }
    }

    /// Deletes rows past each level's retention and traces past trace retention.
    #[instrument(skip(self), fields(operation = "retention_sweep"))]
    pub async fn run_retention_sweep(&self) -> Result<u64> {
        let now = self.clock.now_ms();
        let mut deleted = 0;
        for (level, lvl) in self.engine.levels().iter() {
            deleted += self
                .store
                .expire_before(level, now - lvl.retention_ms())
                .await?;
        }
        deleted += self
            .store
            .expire_traces_before(now - self.config.trace_retention_ms)
            .await?;
        if deleted > 0 {
            info!(deleted_rows = deleted, "retention sweep");
        }
        Ok(deleted)
    }
}

/// Spawns one task per rollup level plus the retention/vacuum task. All of
/// them stop when `shutdown` flips to true.
pub fn spawn(
    worker: Arc<RollupWorker>,
    shutdown: watch::Receiver<bool>,
) -> Vec<tokio::task::JoinHandle<()>> {
    let mut handles = Vec::new();
    for (level, lvl) in worker.engine.levels().iter().skip(1) {
        let worker = worker.clone();
        let shutdown = shutdown.clone();
        let every = lvl.interval;
        handles.push(tokio::spawn(async move {
            run_level(worker, level, every, shutdown).await;
        }));
    }
    let worker = worker.clone();
    handles.push(tokio::spawn(async move {
        run_maintenance(worker, shutdown).await;
    }));
    handles
}

#[instrument(skip(worker, shutdown))]
async fn run_level(
    worker: Arc<RollupWorker>,
    level: usize,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = worker.run_one_tick(level).await {
                    warn!(error = %e, "rollup tick failed");
                }
            }
            _ = shutdown.changed() => {
                debug!("rollup task stopping");
                break;
            }
        }
    }
}

#[instrument(skip(worker, shutdown), fields(interval_secs = worker.config.retention_sweep_interval_secs))]
async fn run_maintenance(worker: Arc<RollupWorker>, mut shutdown: watch::Receiver<bool>) {
    let mut sweep_interval =
        tokio::time::interval(Duration::from_secs(worker.config.retention_sweep_interval_secs));
    sweep_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let (vacuum_tx, mut vacuum_rx) = tokio::sync::mpsc::channel::<()>(1);
    let vacuum_task = tokio::spawn(vacuum_scheduler(worker.config.clone(), vacuum_tx));

    loop {
        tokio::select! {
            _ = sweep_interval.tick() => {
                if let Err(e) = worker.run_retention_sweep().await {
                    warn!(error = %e, "retention sweep failed");
                }
            }
            Some(()) = vacuum_rx.recv() => {
                if let Err(e) = worker.store.vacuum().await {
                    warn!(error = %e, "vacuum failed");
                } else {
                    info!("vacuum complete");
                }
            }
            _ = shutdown.changed() => {
                debug!("maintenance task stopping");
                break;
            }
        }
    }
    vacuum_task.abort();
}

/// Sends a message on `tx` at each VACUUM time (cron or fixed interval). Uses local time for cron.
async fn vacuum_scheduler(config: RollupWorkerConfig, tx: tokio::sync::mpsc::Sender<()>) {
    if let Some(ref cron_str) = config.vacuum_schedule {
        let Ok(schedule) = cron::Schedule::from_str(cron_str) else {
            warn!(cron = %cron_str, "invalid vacuum_schedule; VACUUM will not run");
            return;
        };
        loop {
            let now = chrono::Local::now();
            if let Some(next) = schedule.after(&now).next() {
                let delay = (next - now).to_std().unwrap_or(Duration::from_secs(1));
                tokio::time::sleep(delay).await;
                if tx.send(()).await.is_err() {
                    break;
                }
            } else {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        }
    } else {
        let interval = Duration::from_secs(config.vacuum_interval_secs);
        loop {
            tokio::time::sleep(interval).await;
            if tx.send(()).await.is_err() {
                break;
            }
        }
    }
}
