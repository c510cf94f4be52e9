// Domain models: timer trees, aggregates, gauges, traces, agents, alerts and call payloads.

mod aggregate;
mod agent;
mod alert;
mod gauge;
pub mod histogram;
mod messages;
pub mod not_available;
mod timer;
mod trace;

pub use aggregate::{AggregateAccumulator, AggregatePoint, QueryStat};
pub use agent::{AgentConfig, AgentRecord, Environment, GaugeConfig, GeneralConfig};
pub use alert::{
    AlertCondition, AlertRule, Notification, TriggeredAlert, TriggeredAlertKey,
};
pub use gauge::{GaugeValue, weighted_average};
pub use histogram::{DurationHistogram, HistogramMessage};
pub use messages::{
    Aggregate, AggregateMessage, AggregatesByType, GaugeValueMessage, InitMessage, InitResponse,
    LogEvent, LogMessage, QueryMessage, TraceMessage, TransactionAggregate,
};
pub use timer::{TimerNode, TimerSlot, TimerTree};
pub use trace::{StoredTrace, Trace, TraceHeader};

/// Half-open time range `[from, to)` in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub from: i64,
    pub to: i64,
}

impl TimeRange {
    pub fn new(from: i64, to: i64) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, t: i64) -> bool {
        t >= self.from && t < self.to
    }
}
