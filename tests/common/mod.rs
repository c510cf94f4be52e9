// Shared test helpers: temp SQLite store, fault-injecting store and notifier,
// point/batch builders and a wired-up collector harness.
#![allow(dead_code)]

use apm_collector::alerting::{AlertEngine, Notifier};
use apm_collector::clock::ManualClock;
use apm_collector::collector::Collector;
use apm_collector::error::{CollectorError, Result};
use apm_collector::models::*;
use apm_collector::rollup_levels::{RollupLevel, RollupLevels};
use apm_collector::store::{CollectorStore, SqliteStore};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const MINUTE: i64 = 60_000;

pub async fn temp_store() -> (Arc<SqliteStore>, TempDir) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("collector.db");
    let store = SqliteStore::connect(path.to_str().unwrap(), 4, Duration::from_secs(5))
        .await
        .unwrap();
    store.init().await.unwrap();
    (Arc::new(store), dir)
}

/// 1 min raw (3 h), 5 min (48 h), 30 min (30 days).
pub fn test_levels() -> RollupLevels {
    RollupLevels::new(vec![
        RollupLevel {
            interval: Duration::from_secs(60),
            retention: Duration::from_secs(3 * 3600),
        },
        RollupLevel {
            interval: Duration::from_secs(300),
            retention: Duration::from_secs(48 * 3600),
        },
        RollupLevel {
            interval: Duration::from_secs(1800),
            retention: Duration::from_secs(720 * 3600),
        },
    ])
    .unwrap()
}

pub fn overall_point(
    transaction_type: &str,
    capture_time: i64,
    count: u64,
    errors: u64,
) -> AggregatePoint {
    AggregatePoint {
        transaction_type: transaction_type.into(),
        transaction_name: None,
        capture_time,
        total_duration_nanos: 2_000_000.0 * count as f64,
        total_cpu_nanos: 500_000.0 * count as f64,
        error_count: errors,
        transaction_count: count,
        timers: TimerTree::from_node(&TimerNode::new("http request", 2_000_000 * count, count)),
        histogram: DurationHistogram::from_values(&vec![2_000_000; count as usize]),
        queries: vec![],
    }
}

pub fn named_point(
    transaction_type: &str,
    transaction_name: &str,
    capture_time: i64,
    count: u64,
    errors: u64,
) -> AggregatePoint {
    AggregatePoint {
        transaction_name: Some(transaction_name.into()),
        ..overall_point(transaction_type, capture_time, count, errors)
    }
}

pub fn gauge(name: &str, capture_time: i64, value: f64) -> GaugeValue {
    GaugeValue {
        gauge_name: name.into(),
        capture_time,
        value,
        weight: 1,
    }
}

pub fn aggregate(count: u64, errors: u64, duration_nanos: u64) -> Aggregate {
    Aggregate {
        total_duration_nanos: (duration_nanos * count) as f64,
        total_cpu_nanos: not_available::NA_F64,
        error_count: errors,
        transaction_count: count,
        root_timer: TimerNode::new("http request", duration_nanos * count, count),
        histogram: HistogramMessage {
            ordered_raw_values: vec![duration_nanos; count as usize],
            encoded_bytes: None,
        },
        queries: vec![],
    }
}

/// One transaction type with an overall aggregate and no per-name aggregates.
pub fn batch(transaction_type: &str, count: u64, errors: u64) -> Vec<AggregatesByType> {
    vec![AggregatesByType {
        transaction_type: transaction_type.into(),
        overall_aggregate: aggregate(count, errors, 2_000_000),
        transaction_aggregates: vec![],
    }]
}

pub fn error_rate_rule(id: &str, time_period_secs: u64, threshold: f64) -> AlertRule {
    AlertRule {
        id: id.into(),
        agent_id: None,
        time_period_secs,
        threshold,
        notify_on_recovery: true,
        condition: AlertCondition::ErrorRate {
            transaction_type: "Web".into(),
            min_transaction_count: 0,
        },
    }
}

pub fn gauge_rule(id: &str, gauge_name: &str, time_period_secs: u64, threshold: f64) -> AlertRule {
    AlertRule {
        id: id.into(),
        agent_id: None,
        time_period_secs,
        threshold,
        notify_on_recovery: true,
        condition: AlertCondition::Gauge {
            gauge_name: gauge_name.into(),
        },
    }
}

/// Records every notification; optionally fails after recording.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
    pub fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(CollectorError::Notification("smtp unreachable".into()));
        }
        Ok(())
    }
}

/// Delegates to an inner store; flags inject failures.
pub struct FaultyStore {
    pub inner: Arc<dyn CollectorStore>,
    /// Aggregate/gauge/trace writes fail with a storage error.
    pub fail_writes: AtomicBool,
    /// Alert-window reads fail with a transient timeout.
    pub timeout_reads: AtomicBool,
    /// Alert-window reads fail with a non-transient storage error.
    pub fail_reads: AtomicBool,
}

impl FaultyStore {
    pub fn new(inner: Arc<dyn CollectorStore>) -> Self {
        Self {
            inner,
            fail_writes: AtomicBool::new(false),
            timeout_reads: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
        }
    }

    fn check_write(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CollectorError::Storage(sqlx::Error::PoolClosed));
        }
        Ok(())
    }

    fn check_read(&self) -> Result<()> {
        if self.timeout_reads.load(Ordering::SeqCst) {
            return Err(CollectorError::Timeout("read timed out".into()));
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CollectorError::Storage(sqlx::Error::PoolClosed));
        }
        Ok(())
    }
}

#[async_trait]
impl CollectorStore for FaultyStore {
    async fn store_agent(
        &self,
        agent_id: &str,
        environment: &Environment,
        declared: &AgentConfig,
        now: i64,
    ) -> Result<AgentConfig> {
        self.inner
            .store_agent(agent_id, environment, declared, now)
            .await
    }

    async fn read_agent(&self, agent_id: &str) -> Result<Option<AgentRecord>> {
        self.inner.read_agent(agent_id).await
    }

    async fn list_agent_ids(&self) -> Result<Vec<String>> {
        self.inner.list_agent_ids().await
    }

    async fn store_aggregates(
        &self,
        agent_id: &str,
        level: usize,
        capture_time: i64,
        points: &[AggregatePoint],
    ) -> Result<()> {
        self.check_write()?;
        self.inner
            .store_aggregates(agent_id, level, capture_time, points)
            .await
    }

    async fn query_aggregates(
        &self,
        agent_id: &str,
        level: usize,
        range: TimeRange,
    ) -> Result<Vec<AggregatePoint>> {
        self.inner.query_aggregates(agent_id, level, range).await
    }

    async fn query_overall_aggregates(
        &self,
        agent_id: &str,
        level: usize,
        transaction_type: &str,
        range: TimeRange,
    ) -> Result<Vec<AggregatePoint>> {
        self.check_read()?;
        self.inner
            .query_overall_aggregates(agent_id, level, transaction_type, range)
            .await
    }

    async fn store_gauge_values(
        &self,
        agent_id: &str,
        level: usize,
        values: &[GaugeValue],
    ) -> Result<()> {
        self.check_write()?;
        self.inner.store_gauge_values(agent_id, level, values).await
    }

    async fn query_gauge_values(
        &self,
        agent_id: &str,
        level: usize,
        gauge_name: Option<&str>,
        range: TimeRange,
    ) -> Result<Vec<GaugeValue>> {
        self.check_read()?;
        self.inner
            .query_gauge_values(agent_id, level, gauge_name, range)
            .await
    }

    async fn first_capture_time(
        &self,
        agent_id: &str,
        level: usize,
        from: i64,
    ) -> Result<Option<i64>> {
        self.inner.first_capture_time(agent_id, level, from).await
    }

    async fn rollup_progress(&self, agent_id: &str, level: usize) -> Result<Option<i64>> {
        self.inner.rollup_progress(agent_id, level).await
    }

    async fn advance_rollup_progress(
        &self,
        agent_id: &str,
        level: usize,
        next_bucket_start: i64,
    ) -> Result<()> {
        self.inner
            .advance_rollup_progress(agent_id, level, next_bucket_start)
            .await
    }

    async fn store_trace(&self, agent_id: &str, trace: &StoredTrace) -> Result<()> {
        self.check_write()?;
        self.inner.store_trace(agent_id, trace).await
    }

    async fn read_trace(&self, agent_id: &str, trace_id: &str) -> Result<Option<StoredTrace>> {
        self.inner.read_trace(agent_id, trace_id).await
    }

    async fn triggered_alert(&self, key: &TriggeredAlertKey) -> Result<Option<TriggeredAlert>> {
        self.inner.triggered_alert(key).await
    }

    async fn insert_triggered_alert(&self, alert: &TriggeredAlert) -> Result<bool> {
        self.inner.insert_triggered_alert(alert).await
    }

    async fn delete_triggered_alert(&self, key: &TriggeredAlertKey) -> Result<bool> {
        self.inner.delete_triggered_alert(key).await
    }

    async fn list_triggered_alerts(&self, agent_id: &str) -> Result<Vec<TriggeredAlert>> {
        self.inner.list_triggered_alerts(agent_id).await
    }

    async fn alert_evaluated_at(&self, key: &TriggeredAlertKey) -> Result<Option<i64>> {
        self.inner.alert_evaluated_at(key).await
    }

    async fn record_alert_evaluation(
        &self,
        key: &TriggeredAlertKey,
        evaluated_at: i64,
    ) -> Result<()> {
        self.inner.record_alert_evaluation(key, evaluated_at).await
    }

    async fn expire_before(&self, level: usize, cutoff: i64) -> Result<u64> {
        self.inner.expire_before(level, cutoff).await
    }

    async fn expire_traces_before(&self, cutoff: i64) -> Result<u64> {
        self.inner.expire_traces_before(cutoff).await
    }

    async fn vacuum(&self) -> Result<()> {
        self.inner.vacuum().await
    }
}

/// Collector wired to a temp store behind a FaultyStore, a manual clock and a
/// recording notifier.
pub struct Harness {
    pub dir: TempDir,
    pub store: Arc<FaultyStore>,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<RecordingNotifier>,
    pub alerts: Arc<AlertEngine>,
    pub collector: Arc<Collector>,
}

impl Harness {
    pub async fn new(rules: Vec<AlertRule>, now: i64) -> Self {
        let (sqlite, dir) = temp_store().await;
        let store = Arc::new(FaultyStore::new(sqlite));
        let clock = Arc::new(ManualClock::new(now));
        let notifier = Arc::new(RecordingNotifier::default());
        let alerts = Arc::new(AlertEngine::new(
            store.clone(),
            test_levels(),
            rules,
            notifier.clone(),
            clock.clone(),
        ));
        let collector = Arc::new(Collector::new(
            store.clone(),
            alerts.clone(),
            clock.clone(),
        ));
        Self {
            dir,
            store,
            clock,
            notifier,
            alerts,
            collector,
        }
    }

    pub async fn triggered(&self, agent_id: &str) -> Vec<TriggeredAlert> {
        self.store.list_triggered_alerts(agent_id).await.unwrap()
    }
}
