// Ingestion coordinator: the entry point for every agent call.
// Persistence failures fail the call (the agent retries the whole batch);
// alert evaluation after a successful write is isolated and only logged.

use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::alerting::AlertEngine;
use crate::clock::Clock;
use crate::error::{CollectorError, Result};
use crate::models::{
    AgentConfig, Aggregate, AggregatePoint, AggregatesByType, DurationHistogram, Environment,
    GaugeValue, LogEvent, QueryStat, TimerTree, Trace,
};
use crate::store::CollectorStore;

/// Aggregates and gauges arrive at the raw level.
pub const RAW_LEVEL: usize = 0;

pub struct Collector {
    store: Arc<dyn CollectorStore>,
    alerts: Arc<AlertEngine>,
    clock: Arc<dyn Clock>,
}

impl Collector {
    pub fn new(
        store: Arc<dyn CollectorStore>,
        alerts: Arc<AlertEngine>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            alerts,
            clock,
        }
    }

    /// Registers the agent. Returns the stored config only when it differs from
    /// the one the agent declared.
    #[instrument(skip(self, environment, declared), fields(operation = "collect_init"))]
    pub async fn collect_init(
        &self,
        agent_id: &str,
        environment: &Environment,
        declared: &AgentConfig,
    ) -> Result<Option<AgentConfig>> {
        let canonical = self
            .store
            .store_agent(agent_id, environment, declared, self.clock.now_ms())
            .await?;
        Ok((canonical != *declared).then_some(canonical))
    }

    #[instrument(
        skip(self, aggregates_by_type, shared_query_texts),
        fields(operation = "collect_aggregates", types = aggregates_by_type.len())
    )]
    pub async fn collect_aggregates(
        &self,
        agent_id: &str,
        capture_time: i64,
        aggregates_by_type: &[AggregatesByType],
        shared_query_texts: &[String],
    ) -> Result<()> {
        let points = flatten(capture_time, aggregates_by_type, shared_query_texts)?;
        if !points.is_empty() {
            self.store
                .store_aggregates(agent_id, RAW_LEVEL, capture_time, &points)
                .await?;
        }
        debug!(points = points.len(), "aggregates stored");
        if let Err(e) = self
            .alerts
            .check_transaction_alerts(agent_id, capture_time)
            .await
        {
            warn!(agent_id = %agent_id, capture_time, error = %e, "transaction alert check failed");
        }
        Ok(())
    }

    #[instrument(skip(self, gauge_values), fields(operation = "collect_gauge_values", values = gauge_values.len()))]
    pub async fn collect_gauge_values(
        &self,
        agent_id: &str,
        gauge_values: &[GaugeValue],
    ) -> Result<()> {
        let Some(max_capture_time) = gauge_values.iter().map(|v| v.capture_time).max() else {
            return Ok(());
        };
        self.store
            .store_gauge_values(agent_id, RAW_LEVEL, gauge_values)
            .await?;
        if let Err(e) = self
            .alerts
            .check_gauge_alerts(agent_id, max_capture_time)
            .await
        {
            warn!(agent_id = %agent_id, capture_time = max_capture_time, error = %e, "gauge alert check failed");
        }
        Ok(())
    }

    #[instrument(skip(self, trace), fields(operation = "collect_trace", trace_id = %trace.id))]
    pub async fn collect_trace(&self, agent_id: &str, trace: Trace) -> Result<()> {
        let stored = trace.into_stored();
        self.store.store_trace(agent_id, &stored).await
    }

    /// Forwards an agent-side log event into the collector log.
    pub fn log(&self, agent_id: &str, event: &LogEvent) {
        warn!(
            agent_id = %agent_id,
            agent_level = %event.level,
            logger = %event.logger_name,
            throwable = event.throwable.as_deref().unwrap_or(""),
            "agent: {}",
            event.message
        );
    }
}

/// Flattens a batch into raw points, resolving shared query text indexes.
pub fn flatten(
    capture_time: i64,
    aggregates_by_type: &[AggregatesByType],
    shared_query_texts: &[String],
) -> Result<Vec<AggregatePoint>> {
    let mut points = Vec::new();
    for by_type in aggregates_by_type {
        points.push(to_point(
            &by_type.transaction_type,
            None,
            capture_time,
            &by_type.overall_aggregate,
            shared_query_texts,
        )?);
        for tx in &by_type.transaction_aggregates {
            // an empty name is reserved for the overall aggregate
            if tx.transaction_name.is_empty() {
                return Err(CollectorError::InvalidRequest(format!(
                    "empty transaction name for type {}",
                    by_type.transaction_type
                )));
            }
            points.push(to_point(
                &by_type.transaction_type,
                Some(&tx.transaction_name),
                capture_time,
                &tx.aggregate,
                shared_query_texts,
            )?);
        }
    }
    Ok(points)
}

fn to_point(
    transaction_type: &str,
    transaction_name: Option<&str>,
    capture_time: i64,
    aggregate: &Aggregate,
    shared_query_texts: &[String],
) -> Result<AggregatePoint> {
    let mut queries = Vec::with_capacity(aggregate.queries.len());
    for q in &aggregate.queries {
        let text = shared_query_texts
            .get(q.shared_query_text_index)
            .ok_or_else(|| {
                CollectorError::InvalidRequest(format!(
                    "shared query text index {} out of range ({} texts)",
                    q.shared_query_text_index,
                    shared_query_texts.len()
                ))
            })?;
        queries.push(QueryStat {
            query_type: q.query_type.clone(),
            text: text.clone(),
            total_duration_nanos: q.total_duration_nanos,
            execution_count: q.execution_count,
            total_rows: q.total_rows,
        });
    }
    Ok(AggregatePoint {
        transaction_type: transaction_type.to_owned(),
        transaction_name: transaction_name.map(str::to_owned),
        capture_time,
        total_duration_nanos: aggregate.total_duration_nanos,
        total_cpu_nanos: aggregate.total_cpu_nanos,
        error_count: aggregate.error_count,
        transaction_count: aggregate.transaction_count,
        timers: TimerTree::from_node(&aggregate.root_timer),
        histogram: DurationHistogram::from_message(&aggregate.histogram)?,
        queries,
    })
}
