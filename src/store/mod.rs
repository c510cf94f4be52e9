// Storage boundary for the collector. Every write is an overwrite by key so
// agent retries, duplicate deliveries and rollup re-runs never double count.
//
// SqliteStore is the bundled implementation (sqlx + wincode blobs).

mod blob;
mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    AgentConfig, AgentRecord, AggregatePoint, Environment, GaugeValue, StoredTrace, TimeRange,
    TriggeredAlert, TriggeredAlertKey,
};

#[async_trait]
pub trait CollectorStore: Send + Sync {
    /// Registers or refreshes an agent. Returns the canonical config: the stored
    /// one if the agent is already known, else `declared` (which is then stored).
    async fn store_agent(
        &self,
        agent_id: &str,
        environment: &Environment,
        declared: &AgentConfig,
        now: i64,
    ) -> Result<AgentConfig>;

    async fn read_agent(&self, agent_id: &str) -> Result<Option<AgentRecord>>;

    async fn list_agent_ids(&self) -> Result<Vec<String>>;

    /// Replaces every point stored for (agent, level, capture_time) with `points`.
    async fn store_aggregates(
        &self,
        agent_id: &str,
        level: usize,
        capture_time: i64,
        points: &[AggregatePoint],
    ) -> Result<()>;

    /// Points with capture time in `range`, ordered by capture time, type, name.
    async fn query_aggregates(
        &self,
        agent_id: &str,
        level: usize,
        range: TimeRange,
    ) -> Result<Vec<AggregatePoint>>;

    /// Overall (transaction name unset) points for one transaction type.
    async fn query_overall_aggregates(
        &self,
        agent_id: &str,
        level: usize,
        transaction_type: &str,
        range: TimeRange,
    ) -> Result<Vec<AggregatePoint>>;

    /// Upserts by (agent, level, gauge name, capture time).
    async fn store_gauge_values(
        &self,
        agent_id: &str,
        level: usize,
        values: &[GaugeValue],
    ) -> Result<()>;

    async fn query_gauge_values(
        &self,
        agent_id: &str,
        level: usize,
        gauge_name: Option<&str>,
        range: TimeRange,
    ) -> Result<Vec<GaugeValue>>;

    /// Earliest aggregate or gauge capture time at `level` that is >= `from`.
    async fn first_capture_time(
        &self,
        agent_id: &str,
        level: usize,
        from: i64,
    ) -> Result<Option<i64>>;

    /// Start of the next bucket to compact for (agent, level).
    async fn rollup_progress(&self, agent_id: &str, level: usize) -> Result<Option<i64>>;

    /// Moves progress forward; never moves it back.
    async fn advance_rollup_progress(
        &self,
        agent_id: &str,
        level: usize,
        next_bucket_start: i64,
    ) -> Result<()>;

    /// Upserts by (agent, trace id).
    async fn store_trace(&self, agent_id: &str, trace: &StoredTrace) -> Result<()>;

    async fn read_trace(&self, agent_id: &str, trace_id: &str) -> Result<Option<StoredTrace>>;

    async fn triggered_alert(&self, key: &TriggeredAlertKey) -> Result<Option<TriggeredAlert>>;

    /// Inserts only if absent. Returns whether a record was created.
    async fn insert_triggered_alert(&self, alert: &TriggeredAlert) -> Result<bool>;

    /// Returns whether a record was removed.
    async fn delete_triggered_alert(&self, key: &TriggeredAlertKey) -> Result<bool>;

    async fn list_triggered_alerts(&self, agent_id: &str) -> Result<Vec<TriggeredAlert>>;

    /// Capture time of the newest evaluation applied for this (agent, alert).
    async fn alert_evaluated_at(&self, key: &TriggeredAlertKey) -> Result<Option<i64>>;

    /// Raises the stored evaluation time; never lowers it.
    async fn record_alert_evaluation(&self, key: &TriggeredAlertKey, evaluated_at: i64)
    -> Result<()>;

    /// Deletes aggregate and gauge rows at `level` captured before `cutoff`.
    async fn expire_before(&self, level: usize, cutoff: i64) -> Result<u64>;

    async fn expire_traces_before(&self, cutoff: i64) -> Result<u64>;

    async fn vacuum(&self) -> Result<()>;
}
