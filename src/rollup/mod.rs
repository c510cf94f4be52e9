// Rollup engine: compacts one bucket of level L-1 data into level L.
// Writing a bucket replaces whatever was stored for it before, so re-running a
// bucket yields identical rows. Finer data is left for the retention sweep.

pub mod aggregation;

use std::sync::Arc;
use tracing::{debug, instrument};

use crate::error::{CollectorError, Result};
use crate::models::TimeRange;
use crate::rollup_levels::RollupLevels;
use crate::store::CollectorStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RollupSummary {
    pub points: usize,
    pub gauge_values: usize,
}

impl RollupSummary {
    pub fn is_empty(&self) -> bool {
        self.points == 0 && self.gauge_values == 0
    }
}

pub struct RollupEngine {
    store: Arc<dyn CollectorStore>,
    levels: RollupLevels,
}

impl RollupEngine {
    pub fn new(store: Arc<dyn CollectorStore>, levels: RollupLevels) -> Self {
        Self { store, levels }
    }

    pub fn levels(&self) -> &RollupLevels {
        &self.levels
    }

    /// Compacts `[bucket_start, bucket_end)` of level `level - 1` into one bucket at `level`.
    #[instrument(skip(self), fields(operation = "rollup"))]
    pub async fn rollup(
        &self,
        level: usize,
        agent_id: &str,
        bucket_start: i64,
        bucket_end: i64,
    ) -> Result<RollupSummary> {
        if level == 0 || level >= self.levels.len() {
            return Err(CollectorError::InvalidRequest(format!(
                "rollup level {} out of range 1..{}",
                level,
                self.levels.len()
            )));
        }
        if bucket_end <= bucket_start {
            return Err(CollectorError::InvalidRequest(format!(
                "empty bucket [{}, {})",
                bucket_start, bucket_end
            )));
        }
        let source = level - 1;
        let range = TimeRange::new(bucket_start, bucket_end);

        let points = self.store.query_aggregates(agent_id, source, range).await?;
        let rolled = aggregation::rollup_aggregates(&points, bucket_start);
        if !rolled.is_empty() {
            self.store
                .store_aggregates(agent_id, level, bucket_start, &rolled)
                .await?;
        }

        let values = self
            .store
            .query_gauge_values(agent_id, source, None, range)
            .await?;
        let gauges = aggregation::rollup_gauge_values(&values, bucket_start);
        self.store
            .store_gauge_values(agent_id, level, &gauges)
            .await?;

        let summary = RollupSummary {
            points: rolled.len(),
            gauge_values: gauges.len(),
        };
        debug!(
            source_points = points.len(),
            source_gauge_values = values.len(),
            points = summary.points,
            gauge_values = summary.gauge_values,
            "bucket rolled up"
        );
        Ok(summary)
    }
}
