use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub port: Option<u16>,
    pub metrics_port: Option<u16>,
    pub logging_level: Option<String>,

    // Feature configs
    pub scoring: Option<ScoringConfig>,
    pub anomaly: Option<AnomalyConfig>,
    pub trending_job: Option<TrendingJobConfig>,
    pub broadcast: Option<BroadcastConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ScoringConfig {
    pub velocity_weight: Option<f64>,
    pub total_votes_weight: Option<f64>,
    pub positive_ratio_weight: Option<f64>,
    pub velocity_window_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct AnomalyConfig {
    pub velocity_threshold_per_min: Option<f64>,
    pub velocity_window_secs: Option<u64>,
    pub negative_ratio_threshold: Option<f64>,
    pub negative_ratio_min_votes: Option<i64>,
    pub voter_burst_threshold: Option<u64>,
    pub voter_burst_window_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct TrendingJobConfig {
    pub interval_minutes: Option<u64>,
    pub show_lookahead_days: Option<i64>,
    pub lease_ttl_secs: Option<i64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct BroadcastConfig {
    pub publish_timeout_ms: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
