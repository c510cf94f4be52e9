// Gauge samples. Rollups keep a weighted average so coarser levels stay exact
// with respect to the raw samples they summarise.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GaugeValue {
    pub gauge_name: String,
    pub capture_time: i64,
    pub value: f64,
    #[serde(default = "default_weight")]
    pub weight: u64,
}

fn default_weight() -> u64 {
    1
}

/// Weighted average of a set of samples for one gauge. `None` when the total weight is zero.
pub fn weighted_average(values: &[&GaugeValue]) -> Option<(f64, u64)> {
    let mut sum = 0.0;
    let mut weight: u64 = 0;
    for v in values {
        sum += v.value * v.weight as f64;
        weight = weight.saturating_add(v.weight);
    }
    if weight == 0 {
        return None;
    }
    Some((sum / weight as f64, weight))
}
