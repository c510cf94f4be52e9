// Alert rules (read-only config), the triggered-alert ledger record, and notifications.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AlertRule {
    pub id: String,
    /// Applies to every agent when unset.
    #[serde(default)]
    pub agent_id: Option<String>,
    pub time_period_secs: u64,
    pub threshold: f64,
    #[serde(default = "default_notify_on_recovery")]
    pub notify_on_recovery: bool,
    pub condition: AlertCondition,
}

fn default_notify_on_recovery() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertCondition {
    /// errors / transactions over the window, threshold is a ratio (0.1 = 10%).
    ErrorRate {
        transaction_type: String,
        #[serde(default)]
        min_transaction_count: u64,
    },
    /// Duration percentile over the window, threshold in milliseconds.
    Percentile {
        transaction_type: String,
        percentile: f64,
        #[serde(default)]
        min_transaction_count: u64,
    },
    /// Weighted gauge average over the window.
    Gauge { gauge_name: String },
}

impl AlertRule {
    pub fn applies_to(&self, agent_id: &str) -> bool {
        self.agent_id.as_deref().is_none_or(|a| a == agent_id)
    }

    pub fn is_gauge(&self) -> bool {
        matches!(self.condition, AlertCondition::Gauge { .. })
    }

    pub fn time_period_ms(&self) -> i64 {
        (self.time_period_secs as i64).saturating_mul(1000)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TriggeredAlertKey {
    pub agent_id: String,
    pub alert_id: String,
}

/// Presence means "currently firing, already notified".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggeredAlert {
    pub agent_id: String,
    pub alert_id: String,
    pub first_triggered_at: i64,
}

impl TriggeredAlert {
    pub fn key(&self) -> TriggeredAlertKey {
        TriggeredAlertKey {
            agent_id: self.agent_id.clone(),
            alert_id: self.alert_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub agent_id: String,
    pub alert_id: String,
    pub breached: bool,
    pub details: String,
}
