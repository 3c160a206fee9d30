mod file_config;

pub use file_config::{
    AnomalyConfig, BroadcastConfig, FileConfig, ScoringConfig, TrendingJobConfig,
};

use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_dir: PathBuf,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,

    // Feature configs (with defaults)
    pub scoring: ScoringSettings,
    pub anomaly: AnomalySettings,
    pub trending_job: TrendingJobSettings,
    pub broadcast: BroadcastSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        // TOML overrides CLI for each field
        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        // Validate db_dir exists
        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        // Scoring settings - merge file config with defaults
        let sc_file = file.scoring.unwrap_or_default();
        let scoring = ScoringSettings {
            velocity_weight: sc_file.velocity_weight.unwrap_or(0.4),
            total_votes_weight: sc_file.total_votes_weight.unwrap_or(0.3),
            positive_ratio_weight: sc_file.positive_ratio_weight.unwrap_or(0.3),
            velocity_window_secs: sc_file.velocity_window_secs.unwrap_or(300),
        };

        let an_file = file.anomaly.unwrap_or_default();
        let anomaly = AnomalySettings {
            velocity_threshold_per_min: an_file.velocity_threshold_per_min.unwrap_or(50.0),
            velocity_window_secs: an_file.velocity_window_secs.unwrap_or(60),
            negative_ratio_threshold: an_file.negative_ratio_threshold.unwrap_or(0.8),
            negative_ratio_min_votes: an_file.negative_ratio_min_votes.unwrap_or(10),
            voter_burst_threshold: an_file.voter_burst_threshold.unwrap_or(10),
            voter_burst_window_secs: an_file.voter_burst_window_secs.unwrap_or(60),
        };

        let tj_file = file.trending_job.unwrap_or_default();
        let trending_job = TrendingJobSettings {
            interval_minutes: tj_file.interval_minutes.unwrap_or(15),
            show_lookahead_days: tj_file.show_lookahead_days.unwrap_or(90),
            lease_ttl_secs: tj_file.lease_ttl_secs.unwrap_or(600),
        };

        let br_file = file.broadcast.unwrap_or_default();
        let broadcast = BroadcastSettings {
            publish_timeout_ms: br_file.publish_timeout_ms.unwrap_or(2000),
        };

        Ok(Self {
            db_dir,
            port,
            metrics_port,
            logging_level,
            scoring,
            anomaly,
            trending_job,
            broadcast,
        })
    }

    pub fn catalog_db_path(&self) -> PathBuf {
        self.db_dir.join("catalog.db")
    }

    pub fn votes_db_path(&self) -> PathBuf {
        self.db_dir.join("votes.db")
    }

    pub fn server_db_path(&self) -> PathBuf {
        self.db_dir.join("server.db")
    }
}

/// Weights and window for the incremental per-song trending score.
#[derive(Debug, Clone)]
pub struct ScoringSettings {
    pub velocity_weight: f64,
    pub total_votes_weight: f64,
    pub positive_ratio_weight: f64,
    /// Window over which votes/minute is measured for scoring.
    pub velocity_window_secs: u64,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            velocity_weight: 0.4,
            total_votes_weight: 0.3,
            positive_ratio_weight: 0.3,
            velocity_window_secs: 300,
        }
    }
}

impl ScoringSettings {
    pub fn velocity_window(&self) -> Duration {
        Duration::from_secs(self.velocity_window_secs)
    }
}

/// Thresholds for the anomaly rules. Each rule is independent and advisory.
#[derive(Debug, Clone)]
pub struct AnomalySettings {
    pub velocity_threshold_per_min: f64,
    /// The velocity rule measures over its own, shorter window.
    pub velocity_window_secs: u64,
    pub negative_ratio_threshold: f64,
    /// The ratio rule only fires once a song has more than this many votes.
    pub negative_ratio_min_votes: i64,
    pub voter_burst_threshold: u64,
    pub voter_burst_window_secs: u64,
}

impl Default for AnomalySettings {
    fn default() -> Self {
        Self {
            velocity_threshold_per_min: 50.0,
            velocity_window_secs: 60,
            negative_ratio_threshold: 0.8,
            negative_ratio_min_votes: 10,
            voter_burst_threshold: 10,
            voter_burst_window_secs: 60,
        }
    }
}

impl AnomalySettings {
    pub fn velocity_window(&self) -> Duration {
        Duration::from_secs(self.velocity_window_secs)
    }

    pub fn voter_burst_window(&self) -> Duration {
        Duration::from_secs(self.voter_burst_window_secs)
    }
}

#[derive(Debug, Clone)]
pub struct TrendingJobSettings {
    pub interval_minutes: u64,
    pub show_lookahead_days: i64,
    pub lease_ttl_secs: i64,
}

impl Default for TrendingJobSettings {
    fn default() -> Self {
        Self {
            interval_minutes: 15,
            show_lookahead_days: 90,
            lease_ttl_secs: 600,
        }
    }
}

/// Bounds for best-effort downstream work on the vote hot path.
#[derive(Debug, Clone)]
pub struct BroadcastSettings {
    pub publish_timeout_ms: u64,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            publish_timeout_ms: 2000,
        }
    }
}

impl BroadcastSettings {
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_temp_db_dir() -> TempDir {
        TempDir::new().unwrap()
    }

    #[test]
    fn test_parse_logging_level() {
        assert!(matches!(
            parse_logging_level("none"),
            Some(RequestsLoggingLevel::None)
        ));
        assert!(matches!(
            parse_logging_level("path"),
            Some(RequestsLoggingLevel::Path)
        ));
        // Case insensitive
        assert!(matches!(
            parse_logging_level("PATH"),
            Some(RequestsLoggingLevel::Path)
        ));
        // Invalid
        assert!(parse_logging_level("invalid").is_none());
    }

    #[test]
    fn test_resolve_cli_only() {
        let temp_dir = make_temp_db_dir();
        let cli = CliConfig {
            db_dir: Some(temp_dir.path().to_path_buf()),
            port: 3001,
            metrics_port: 9091,
            logging_level: RequestsLoggingLevel::Headers,
        };

        let config = AppConfig::resolve(&cli, None).unwrap();

        assert_eq!(config.db_dir, temp_dir.path());
        assert_eq!(config.port, 3001);
        assert_eq!(config.metrics_port, 9091);
        assert_eq!(config.logging_level, RequestsLoggingLevel::Headers);
        // Defaults applied for feature settings
        assert_eq!(config.scoring.velocity_weight, 0.4);
        assert_eq!(config.scoring.velocity_window_secs, 300);
        assert_eq!(config.anomaly.velocity_threshold_per_min, 50.0);
        assert_eq!(config.anomaly.voter_burst_threshold, 10);
        assert_eq!(config.trending_job.interval_minutes, 15);
        assert_eq!(config.broadcast.publish_timeout_ms, 2000);
    }

    #[test]
    fn test_resolve_toml_overrides_cli() {
        let temp_dir = make_temp_db_dir();
        let cli = CliConfig {
            db_dir: Some(PathBuf::from("/should/be/overridden")),
            port: 3001,
            metrics_port: 9091,
            logging_level: RequestsLoggingLevel::Path,
        };

        let file_config = FileConfig {
            db_dir: Some(temp_dir.path().to_string_lossy().to_string()),
            port: Some(4000),
            logging_level: Some("body".to_string()),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, Some(file_config)).unwrap();

        // TOML values should override CLI
        assert_eq!(config.db_dir, temp_dir.path());
        assert_eq!(config.port, 4000);
        assert_eq!(config.logging_level, RequestsLoggingLevel::Body);
        // CLI value used when TOML doesn't specify
        assert_eq!(config.metrics_port, 9091);
    }

    #[test]
    fn test_resolve_scoring_overrides() {
        let temp_dir = make_temp_db_dir();
        let cli = CliConfig {
            db_dir: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        };

        let file_config = FileConfig {
            scoring: Some(ScoringConfig {
                velocity_weight: Some(0.6),
                velocity_window_secs: Some(120),
                ..Default::default()
            }),
            anomaly: Some(AnomalyConfig {
                velocity_threshold_per_min: Some(100.0),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, Some(file_config)).unwrap();

        assert_eq!(config.scoring.velocity_weight, 0.6);
        assert_eq!(config.scoring.velocity_window_secs, 120);
        // Unset fields keep defaults
        assert_eq!(config.scoring.total_votes_weight, 0.3);
        assert_eq!(config.anomaly.velocity_threshold_per_min, 100.0);
        assert_eq!(config.anomaly.negative_ratio_threshold, 0.8);
    }

    #[test]
    fn test_resolve_missing_db_dir_error() {
        let cli = CliConfig::default();
        let result = AppConfig::resolve(&cli, None);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("db_dir must be specified"));
    }

    #[test]
    fn test_resolve_nonexistent_db_dir_error() {
        let cli = CliConfig {
            db_dir: Some(PathBuf::from("/nonexistent/path/that/should/not/exist")),
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli, None);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("does not exist"));
    }

    #[test]
    fn test_db_path_helpers() {
        let temp_dir = make_temp_db_dir();
        let cli = CliConfig {
            db_dir: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, None).unwrap();

        assert_eq!(config.catalog_db_path(), temp_dir.path().join("catalog.db"));
        assert_eq!(config.votes_db_path(), temp_dir.path().join("votes.db"));
        assert_eq!(config.server_db_path(), temp_dir.path().join("server.db"));
    }
}
