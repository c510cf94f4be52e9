// Rollup level table: level 0 is raw, each later level is coarser.
// Intervals and retentions strictly increase and every interval is an exact
// multiple of the previous one, so a coarse bucket never splits a finer one.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollupLevel {
    pub interval: Duration,
    pub retention: Duration,
}

impl RollupLevel {
    pub fn interval_ms(&self) -> i64 {
        self.interval.as_millis() as i64
    }

    pub fn retention_ms(&self) -> i64 {
        self.retention.as_millis() as i64
    }

    /// Start of the bucket containing `t`.
    pub fn bucket_start(&self, t: i64) -> i64 {
        t.div_euclid(self.interval_ms())
            .saturating_mul(self.interval_ms())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollupLevels {
    levels: Vec<RollupLevel>,
}

impl RollupLevels {
    pub fn new(levels: Vec<RollupLevel>) -> anyhow::Result<Self> {
        anyhow::ensure!(!levels.is_empty(), "rollup.levels must not be empty");
        for (i, level) in levels.iter().enumerate() {
            anyhow::ensure!(
                level.interval_ms() > 0,
                "rollup.levels[{}].interval_secs must be > 0",
                i
            );
            anyhow::ensure!(
                level.retention_ms() > 0,
                "rollup.levels[{}].retention_hours must be > 0",
                i
            );
        }
        for (i, pair) in levels.windows(2).enumerate() {
            let (finer, coarser) = (pair[0], pair[1]);
            anyhow::ensure!(
                coarser.interval > finer.interval,
                "rollup.levels[{}].interval_secs must be greater than level {}",
                i + 1,
                i
            );
            anyhow::ensure!(
                coarser.retention > finer.retention,
                "rollup.levels[{}].retention_hours must be greater than level {}",
                i + 1,
                i
            );
            anyhow::ensure!(
                coarser.interval_ms() % finer.interval_ms() == 0,
                "rollup.levels[{}].interval_secs must be a multiple of level {}",
                i + 1,
                i
            );
        }
        Ok(Self { levels })
    }

    pub fn get(&self, level: usize) -> Option<&RollupLevel> {
        self.levels.get(level)
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &RollupLevel)> {
        self.levels.iter().enumerate()
    }

    /// Finest level whose interval fits the window and whose retention still
    /// reaches back to `window_start`. Falls back to the raw level.
    pub fn level_for_window(&self, now: i64, window_start: i64, window_ms: i64) -> usize {
        let age = now.saturating_sub(window_start);
        self.levels
            .iter()
            .position(|l| l.interval_ms() <= window_ms && l.retention_ms() >= age)
            .unwrap_or(0)
    }
}
