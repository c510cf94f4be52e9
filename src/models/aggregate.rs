// Aggregate points: one row per (agent, level, capture time, transaction type, transaction name).
// Raw points live at level 0; rollups derive new points at coarser levels.

use wincode::{SchemaRead, SchemaWrite};

use super::histogram::DurationHistogram;
use super::not_available;
use super::timer::TimerTree;

/// Query statistics with the shared query text already resolved.
#[derive(Debug, Clone, PartialEq, SchemaRead, SchemaWrite)]
pub struct QueryStat {
    pub query_type: String,
    pub text: String,
    pub total_duration_nanos: f64,
    pub execution_count: u64,
    /// Not-available ([`not_available::NA`]) when the driver cannot count rows.
    pub total_rows: i64,
}

impl QueryStat {
    pub fn merge(&mut self, other: &QueryStat) {
        self.total_duration_nanos += other.total_duration_nanos;
        self.execution_count = self.execution_count.saturating_add(other.execution_count);
        self.total_rows = not_available::add(self.total_rows, other.total_rows);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregatePoint {
    pub transaction_type: String,
    /// `None` is the overall aggregate for the transaction type.
    pub transaction_name: Option<String>,
    pub capture_time: i64,
    pub total_duration_nanos: f64,
    /// Not-available when the agent cannot measure thread CPU time.
    pub total_cpu_nanos: f64,
    pub error_count: u64,
    pub transaction_count: u64,
    pub timers: TimerTree,
    pub histogram: DurationHistogram,
    pub queries: Vec<QueryStat>,
}

impl AggregatePoint {
    pub fn is_overall(&self) -> bool {
        self.transaction_name.is_none()
    }

    /// Key used to group points inside a rollup bucket.
    pub fn key(&self) -> (String, Option<String>) {
        (self.transaction_type.clone(), self.transaction_name.clone())
    }
}

/// Accumulates points with the same transaction key into one rolled-up point.
#[derive(Debug)]
pub struct AggregateAccumulator {
    point: AggregatePoint,
}

impl AggregateAccumulator {
    pub fn new(first: &AggregatePoint, capture_time: i64) -> Self {
        let mut point = first.clone();
        point.capture_time = capture_time;
        Self { point }
    }

    pub fn add(&mut self, other: &AggregatePoint) {
        let p = &mut self.point;
        p.total_duration_nanos += other.total_duration_nanos;
        p.total_cpu_nanos = not_available::add_f64(p.total_cpu_nanos, other.total_cpu_nanos);
        p.error_count = p.error_count.saturating_add(other.error_count);
        p.transaction_count = p.transaction_count.saturating_add(other.transaction_count);
        p.timers.merge_tree(&other.timers);
        p.histogram.merge(&other.histogram);
        for q in &other.queries {
            match p
                .queries
                .iter_mut()
                .find(|existing| existing.query_type == q.query_type && existing.text == q.text)
            {
                Some(existing) => existing.merge(q),
                None => p.queries.push(q.clone()),
            }
        }
    }

    pub fn finish(self) -> AggregatePoint {
        self.point
    }
}
