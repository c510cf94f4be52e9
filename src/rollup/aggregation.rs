// Pure rollup logic: combine finer points of one bucket into one point per
// transaction key and one weighted gauge value per gauge name.
// DB access (read range, overwrite bucket) stays in rollup::mod.

use std::collections::BTreeMap;

use crate::models::{AggregateAccumulator, AggregatePoint, GaugeValue, weighted_average};

/// Rolls a bucket of finer aggregate points into one point per
/// (transaction type, transaction name), stamped with `bucket_start`.
/// Input order decides timer child order, so callers pass points sorted by capture time.
pub fn rollup_aggregates(points: &[AggregatePoint], bucket_start: i64) -> Vec<AggregatePoint> {
    let mut by_key: BTreeMap<(String, Option<String>), AggregateAccumulator> = BTreeMap::new();
    for p in points {
        by_key
            .entry(p.key())
            .and_modify(|acc| acc.add(p))
            .or_insert_with(|| AggregateAccumulator::new(p, bucket_start));
    }
    by_key.into_values().map(AggregateAccumulator::finish).collect()
}

/// One value per gauge name: weighted average of the samples, weight = total weight.
/// Gauges whose samples all carry zero weight are dropped.
pub fn rollup_gauge_values(values: &[GaugeValue], bucket_start: i64) -> Vec<GaugeValue> {
    let mut by_name: BTreeMap<&str, Vec<&GaugeValue>> = BTreeMap::new();
    for v in values {
        by_name.entry(v.gauge_name.as_str()).or_default().push(v);
    }
    by_name
        .into_iter()
        .filter_map(|(name, samples)| {
            let (value, weight) = weighted_average(&samples)?;
            Some(GaugeValue {
                gauge_name: name.to_owned(),
                capture_time: bucket_start,
                value,
                weight,
            })
        })
        .collect()
}
