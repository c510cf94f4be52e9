use serde::Deserialize;
use std::time::Duration;

use crate::models::{AlertCondition, AlertRule};
use crate::rollup_levels::{RollupLevel, RollupLevels};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub rollup: RollupConfig,
    #[serde(default)]
    pub traces: TraceConfig,
    #[serde(default)]
    pub alerts: Vec<AlertRule>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_pool_size: u32,
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,
}

fn default_busy_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct RollupConfig {
    /// Wait this long past a bucket's end before compacting it (late agent batches).
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,
    #[serde(default = "default_retention_sweep_interval_secs")]
    pub retention_sweep_interval_secs: u64,
    /// Optional cron expression for VACUUM (e.g. "0 0 3 * * *" = 03:00 daily). Uses local time.
    #[serde(default)]
    pub vacuum_schedule: Option<String>,
    /// Run VACUUM every N seconds when vacuum_schedule is not set.
    #[serde(default = "default_vacuum_interval_secs")]
    pub vacuum_interval_secs: u64,
    /// First entry is the raw level agents report at.
    pub levels: Vec<RollupLevelConfig>,
}

fn default_grace_secs() -> u64 {
    30
}

fn default_retention_sweep_interval_secs() -> u64 {
    3600
}

fn default_vacuum_interval_secs() -> u64 {
    86_400
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RollupLevelConfig {
    pub interval_secs: u64,
    pub retention_hours: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TraceConfig {
    pub retention_hours: u64,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            retention_hours: 24 * 7,
        }
    }
}

impl RollupConfig {
    pub fn rollup_levels(&self) -> anyhow::Result<RollupLevels> {
        RollupLevels::new(
            self.levels
                .iter()
                .map(|l| RollupLevel {
                    interval: Duration::from_secs(l.interval_secs),
                    retention: Duration::from_secs(l.retention_hours.saturating_mul(3600)),
                })
                .collect(),
        )
    }

    pub fn grace_ms(&self) -> i64 {
        (self.grace_secs as i64).saturating_mul(1000)
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            !self.database.path.is_empty(),
            "database.path must be non-empty"
        );
        anyhow::ensure!(
            self.database.max_pool_size > 0,
            "database.max_pool_size must be > 0, got {}",
            self.database.max_pool_size
        );
        anyhow::ensure!(
            self.rollup.retention_sweep_interval_secs > 0,
            "rollup.retention_sweep_interval_secs must be > 0, got {}",
            self.rollup.retention_sweep_interval_secs
        );
        anyhow::ensure!(
            self.rollup.vacuum_interval_secs > 0,
            "rollup.vacuum_interval_secs must be > 0, got {}",
            self.rollup.vacuum_interval_secs
        );
        if let Some(ref cron_str) = self.rollup.vacuum_schedule {
            anyhow::ensure!(
                cron_str.parse::<cron::Schedule>().is_ok(),
                "rollup.vacuum_schedule is not a valid cron expression: {}",
                cron_str
            );
        }
        self.rollup.rollup_levels()?;
        anyhow::ensure!(
            self.traces.retention_hours > 0,
            "traces.retention_hours must be > 0, got {}",
            self.traces.retention_hours
        );

        let mut ids = std::collections::HashSet::new();
        for rule in &self.alerts {
            anyhow::ensure!(!rule.id.is_empty(), "alerts.id must be non-empty");
            anyhow::ensure!(
                ids.insert(rule.id.as_str()),
                "alerts.id must be unique, got duplicate {}",
                rule.id
            );
            anyhow::ensure!(
                rule.time_period_secs > 0,
                "alerts[{}].time_period_secs must be > 0",
                rule.id
            );
            anyhow::ensure!(
                rule.threshold.is_finite(),
                "alerts[{}].threshold must be finite",
                rule.id
            );
            if let AlertCondition::Percentile { percentile, .. } = rule.condition {
                anyhow::ensure!(
                    (0.0..=100.0).contains(&percentile),
                    "alerts[{}].condition.percentile must be within 0..=100, got {}",
                    rule.id,
                    percentile
                );
            }
        }
        Ok(())
    }
}
