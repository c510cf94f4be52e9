// Alert engine: evaluates configured rules over a trailing window and keeps
// the triggered-alert ledger so each breach notifies exactly once.
//
// The raw level is read over (t - window, t]; rollup levels over the buckets
// starting in [t - window, t). Evaluation and the ledger read-then-write are
// serialized per (agent, alert) by a keyed lock, and the writes themselves are
// conditional. An evaluation at a time older than the newest one already
// applied for that (agent, alert) never changes the ledger.

pub mod notifier;

use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::clock::Clock;
use crate::error::Result;
use crate::keyed_lock::KeyedLocks;
use crate::models::{
    AlertCondition, AlertRule, DurationHistogram, Notification, TimeRange, TriggeredAlert,
    TriggeredAlertKey, weighted_average,
};
use crate::rollup_levels::RollupLevels;
use crate::store::CollectorStore;

pub use notifier::{LogNotifier, Notifier};

const NANOS_PER_MILLI: f64 = 1_000_000.0;

/// What one rule evaluation did to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertOutcome {
    /// Not enough data to decide; ledger untouched.
    Indeterminate,
    /// Older than an evaluation already applied; ledger untouched.
    Stale,
    Triggered,
    StillTriggered,
    Recovered,
    Clear,
}

pub struct AlertEngine {
    store: Arc<dyn CollectorStore>,
    levels: RollupLevels,
    rules: Vec<AlertRule>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    locks: KeyedLocks<TriggeredAlertKey>,
}

impl AlertEngine {
    pub fn new(
        store: Arc<dyn CollectorStore>,
        levels: RollupLevels,
        rules: Vec<AlertRule>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            levels,
            rules,
            notifier,
            clock,
            locks: KeyedLocks::new(),
        }
    }

    #[instrument(skip(self), fields(operation = "check_transaction_alerts"))]
    pub async fn check_transaction_alerts(&self, agent_id: &str, capture_time: i64) -> Result<()> {
        self.check_rules(agent_id, capture_time, false).await
    }

    #[instrument(skip(self), fields(operation = "check_gauge_alerts"))]
    pub async fn check_gauge_alerts(&self, agent_id: &str, capture_time: i64) -> Result<()> {
        self.check_rules(agent_id, capture_time, true).await
    }

    /// Periodic sweep after a rollup: only rules whose window is read from a
    /// rollup level, since raw-level rules are evaluated on every ingestion.
    #[instrument(skip(self), fields(operation = "sweep_alerts"))]
    pub async fn sweep_alerts(&self, agent_id: &str, capture_time: i64) -> Result<()> {
        let now = self.clock.now_ms();
        self.check_matching(agent_id, capture_time, |rule| {
            self.window(rule, now, capture_time).0 > 0
        })
        .await
    }

    async fn check_rules(&self, agent_id: &str, capture_time: i64, gauges: bool) -> Result<()> {
        self.check_matching(agent_id, capture_time, |rule| rule.is_gauge() == gauges)
            .await
    }

    /// Every applicable rule is evaluated; transient failures skip the rule for
    /// this cycle, the first other failure is returned after the rest ran.
    async fn check_matching(
        &self,
        agent_id: &str,
        capture_time: i64,
        selected: impl Fn(&AlertRule) -> bool,
    ) -> Result<()> {
        let mut first_err = None;
        for rule in self
            .rules
            .iter()
            .filter(|r| r.applies_to(agent_id) && selected(*r))
        {
            match self.check_rule(rule, agent_id, capture_time).await {
                Ok(outcome) => {
                    debug!(alert_id = %rule.id, ?outcome, "alert evaluated");
                }
                Err(e) if e.is_transient() => {
                    warn!(agent_id = %agent_id, alert_id = %rule.id, error = %e, "alert check skipped");
                }
                Err(e) => {
                    warn!(agent_id = %agent_id, alert_id = %rule.id, error = %e, "alert check failed");
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Evaluates one rule at `capture_time` and applies the ledger transition.
    pub async fn check_rule(
        &self,
        rule: &AlertRule,
        agent_id: &str,
        capture_time: i64,
    ) -> Result<AlertOutcome> {
        let key = TriggeredAlertKey {
            agent_id: agent_id.to_owned(),
            alert_id: rule.id.clone(),
        };

        let _guard = self.locks.lock(&key).await;
        let latest = self.store.alert_evaluated_at(&key).await?;
        if latest.is_some_and(|latest| capture_time < latest) {
            debug!(alert_id = %rule.id, capture_time, ?latest, "stale alert evaluation skipped");
            return Ok(AlertOutcome::Stale);
        }
        let Some(metric) = self.evaluate(rule, agent_id, capture_time).await? else {
            return Ok(AlertOutcome::Indeterminate);
        };
        self.store
            .record_alert_evaluation(&key, capture_time)
            .await?;

        let breached = metric > rule.threshold;
        let existing = self.store.triggered_alert(&key).await?;
        let outcome = match (breached, existing) {
            (true, None) => {
                let record = TriggeredAlert {
                    agent_id: key.agent_id.clone(),
                    alert_id: key.alert_id.clone(),
                    first_triggered_at: capture_time,
                };
                if !self.store.insert_triggered_alert(&record).await? {
                    return Ok(AlertOutcome::StillTriggered);
                }
                self.send(rule, agent_id, true, metric).await;
                AlertOutcome::Triggered
            }
            (true, Some(_)) => AlertOutcome::StillTriggered,
            (false, Some(_)) => {
                if !self.store.delete_triggered_alert(&key).await? {
                    return Ok(AlertOutcome::Clear);
                }
                if rule.notify_on_recovery {
                    self.send(rule, agent_id, false, metric).await;
                }
                AlertOutcome::Recovered
            }
            (false, None) => AlertOutcome::Clear,
        };
        Ok(outcome)
    }

    /// Level and time range read for `rule` evaluated at `capture_time`.
    fn window(&self, rule: &AlertRule, now: i64, capture_time: i64) -> (usize, TimeRange) {
        let window = rule.time_period_ms();
        let window_start = capture_time.saturating_sub(window);
        let level = self.levels.level_for_window(now, window_start, window);
        let range = if level == 0 {
            TimeRange::new(window_start.saturating_add(1), capture_time.saturating_add(1))
        } else {
            TimeRange::new(window_start, capture_time)
        };
        (level, range)
    }

    /// The rule's metric over its window, or `None` when indeterminate.
    async fn evaluate(
        &self,
        rule: &AlertRule,
        agent_id: &str,
        capture_time: i64,
    ) -> Result<Option<f64>> {
        let (level, range) = self.window(rule, self.clock.now_ms(), capture_time);

        match &rule.condition {
            AlertCondition::ErrorRate {
                transaction_type,
                min_transaction_count,
            } => {
                let points = self
                    .store
                    .query_overall_aggregates(agent_id, level, transaction_type, range)
                    .await?;
                let count: u64 = points.iter().map(|p| p.transaction_count).sum();
                let errors: u64 = points.iter().map(|p| p.error_count).sum();
                if count == 0 || count < *min_transaction_count {
                    return Ok(None);
                }
                Ok(Some(errors as f64 / count as f64))
            }
            AlertCondition::Percentile {
                transaction_type,
                percentile,
                min_transaction_count,
            } => {
                let points = self
                    .store
                    .query_overall_aggregates(agent_id, level, transaction_type, range)
                    .await?;
                let count: u64 = points.iter().map(|p| p.transaction_count).sum();
                if count < *min_transaction_count {
                    return Ok(None);
                }
                let mut histogram = DurationHistogram::new();
                for p in &points {
                    histogram.merge(&p.histogram);
                }
                Ok(histogram
                    .value_at_percentile(*percentile)
                    .map(|nanos| nanos as f64 / NANOS_PER_MILLI))
            }
            AlertCondition::Gauge { gauge_name } => {
                let values = self
                    .store
                    .query_gauge_values(agent_id, level, Some(gauge_name), range)
                    .await?;
                let refs: Vec<_> = values.iter().collect();
                Ok(weighted_average(&refs).map(|(avg, _)| avg))
            }
        }
    }

    async fn send(&self, rule: &AlertRule, agent_id: &str, breached: bool, metric: f64) {
        let notification = Notification {
            agent_id: agent_id.to_owned(),
            alert_id: rule.id.clone(),
            breached,
            details: describe(rule, metric),
        };
        if let Err(e) = self.notifier.notify(&notification).await {
            warn!(agent_id = %agent_id, alert_id = %rule.id, error = %e, "notification failed");
        }
    }
}

fn describe(rule: &AlertRule, metric: f64) -> String {
    let what = match &rule.condition {
        AlertCondition::ErrorRate {
            transaction_type, ..
        } => format!("{} error rate", transaction_type),
        AlertCondition::Percentile {
            transaction_type,
            percentile,
            ..
        } => format!("{} {}th percentile (ms)", transaction_type, percentile),
        AlertCondition::Gauge { gauge_name } => format!("gauge {}", gauge_name),
    };
    format!(
        "{} over the last {} seconds is {} (threshold {})",
        what, rule.time_period_secs, metric, rule.threshold
    )
}
