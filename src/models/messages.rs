// Collector call payloads (JSON). Aggregates arrive grouped by transaction type
// with query texts shared across the whole batch.

use serde::{Deserialize, Serialize};

use super::agent::{AgentConfig, Environment};
use super::gauge::GaugeValue;
use super::histogram::HistogramMessage;
use super::not_available::{NA, NA_F64};
use super::timer::TimerNode;
use super::trace::Trace;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitMessage {
    pub agent_id: String,
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub agent_config: AgentConfig,
}

/// Empty unless the server's config differs from what the agent declared.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_config: Option<AgentConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateMessage {
    pub agent_id: String,
    pub capture_time: i64,
    #[serde(default)]
    pub aggregates_by_type: Vec<AggregatesByType>,
    #[serde(default)]
    pub shared_query_texts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatesByType {
    pub transaction_type: String,
    pub overall_aggregate: Aggregate,
    #[serde(default)]
    pub transaction_aggregates: Vec<TransactionAggregate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionAggregate {
    pub transaction_name: String,
    pub aggregate: Aggregate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregate {
    pub total_duration_nanos: f64,
    #[serde(default = "na_f64")]
    pub total_cpu_nanos: f64,
    #[serde(default)]
    pub error_count: u64,
    pub transaction_count: u64,
    pub root_timer: TimerNode,
    #[serde(default)]
    pub histogram: HistogramMessage,
    #[serde(default)]
    pub queries: Vec<QueryMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMessage {
    pub query_type: String,
    pub shared_query_text_index: usize,
    pub total_duration_nanos: f64,
    pub execution_count: u64,
    #[serde(default = "na_i64")]
    pub total_rows: i64,
}

fn na_f64() -> f64 {
    NA_F64
}

fn na_i64() -> i64 {
    NA
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GaugeValueMessage {
    pub agent_id: String,
    #[serde(default)]
    pub gauge_values: Vec<GaugeValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceMessage {
    pub agent_id: String,
    pub trace: Trace,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    pub level: String,
    #[serde(default)]
    pub logger_name: String,
    pub message: String,
    #[serde(default)]
    pub throwable: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogMessage {
    pub agent_id: String,
    pub log_event: LogEvent,
}
