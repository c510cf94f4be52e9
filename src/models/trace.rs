// Traces: one per slow/errored transaction. Per-thread timer trees are merged
// into one tree at ingestion.

use serde::{Deserialize, Serialize};

use super::timer::{TimerNode, TimerTree};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceHeader {
    pub transaction_type: String,
    pub transaction_name: String,
    pub start_time: i64,
    pub capture_time: i64,
    pub duration_nanos: u64,
    #[serde(default)]
    pub error: bool,
    /// Partial traces are sent while the transaction is still running and
    /// overwritten by the complete trace later.
    #[serde(default)]
    pub partial: bool,
    #[serde(default)]
    pub headline: String,
    #[serde(default)]
    pub user: String,
}

/// Trace as sent by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trace {
    pub id: String,
    pub header: TraceHeader,
    pub main_thread_timer: TimerNode,
    #[serde(default)]
    pub auxiliary_thread_timers: Vec<TimerNode>,
}

/// Trace as persisted: header plus the merged timer tree.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTrace {
    pub id: String,
    pub header: TraceHeader,
    pub timers: TimerTree,
}

impl Trace {
    /// Merges the main thread tree and every auxiliary thread tree into one
    /// tree rooted at the main thread's root timer.
    pub fn merged_timers(&self) -> TimerTree {
        let mut tree = TimerTree::from_node(&self.main_thread_timer);
        for aux in &self.auxiliary_thread_timers {
            tree.merge(aux);
        }
        tree
    }

    pub fn into_stored(self) -> StoredTrace {
        let timers = self.merged_timers();
        StoredTrace {
            id: self.id,
            header: self.header,
            timers,
        }
    }
}
