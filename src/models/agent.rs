// Agent identity and declared instrumentation config. The stored config is
// authoritative: an agent that declares something else gets the stored one back.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    #[serde(default)]
    pub host_name: String,
    #[serde(default)]
    pub process_id: Option<u64>,
    #[serde(default)]
    pub start_time: i64,
    #[serde(default)]
    pub runtime_version: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneralConfig {
    pub slow_threshold_millis: u64,
    pub profiling_interval_millis: u64,
    pub capture_thread_stats: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            slow_threshold_millis: 2_000,
            profiling_interval_millis: 1_000,
            capture_thread_stats: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GaugeConfig {
    pub mbean_object_name: String,
    #[serde(default)]
    pub attributes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub gauges: Vec<GaugeConfig>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentRecord {
    pub agent_id: String,
    pub environment: Environment,
    pub config: AgentConfig,
    pub last_seen: i64,
}
