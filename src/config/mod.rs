//! Configuration management for CLI, environment variables, and config files.

use crate::error::{PoolError, ValidationIssue};
use crate::planner::DEFAULT_HOUR_WEIGHTS;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use strum::{Display, EnumString};

/// Main configuration for prize-pool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub feeder: FeederConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which shared store holds pool counters and code sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Redis,
}

/// Configuration for the counter/set store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub url: String,
    /// Snapshot file for the memory backend; `None` keeps it purely in memory.
    pub snapshot_path: Option<PathBuf>,
    pub op_timeout_ms: u64,
}

/// Configuration for release planning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Share of a day's quantity released in each hour, in percent.
    pub hour_weights: Vec<u32>,
    /// Offset from UTC used to decide the wall-clock hour of a timestamp.
    pub utc_offset_secs: i32,
}

/// Configuration for the periodic plan feeder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeederConfig {
    pub interval_secs: u64,
    /// Drop every pool counter when the service starts.
    pub reset_pools_on_start: bool,
}

/// Configuration for the active-reward cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub active_ttl_secs: u64,
    pub max_entries: usize,
}

/// Configuration for logging output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Interval of the periodic metrics summary; 0 disables it.
    pub metrics_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            url: "redis://127.0.0.1:6379".to_string(),
            snapshot_path: None,
            op_timeout_ms: 500,
        }
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            hour_weights: DEFAULT_HOUR_WEIGHTS.to_vec(),
            utc_offset_secs: 0,
        }
    }
}

impl Default for FeederConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            reset_pools_on_start: false,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            active_ttl_secs: 60,
            max_entries: 16,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            metrics_interval_secs: 300,
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, val: &str) -> Result<T, PoolError> {
    val.parse()
        .map_err(|_| PoolError::InvalidArgument(format!("{} has invalid format", name)))
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(path: &PathBuf) -> Result<Self, PoolError> {
        let content = std::fs::read_to_string(path).map_err(|e| PoolError::Io(e.to_string()))?;

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());
        match ext.as_deref() {
            Some("json") => {
                serde_json::from_str(&content).map_err(|e| PoolError::Parse(e.to_string()))
            }
            _ => toml::from_str(&content).map_err(|e| PoolError::Parse(e.to_string())),
        }
    }

    pub fn from_default_locations() -> Result<Self, PoolError> {
        let config_dirs = [
            dirs::config_dir().map(|d| d.join("prize-pool/config.toml")),
            Some(PathBuf::from("/etc/prize-pool/config.toml")),
            Some(PathBuf::from("./prize-pool.toml")),
        ];

        for path in config_dirs.iter().flatten() {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        Ok(Self::default())
    }

    pub fn merge_from_env(mut self) -> Result<Self, PoolError> {
        if let Ok(val) = std::env::var("PRIZE_POOL_STORE_BACKEND") {
            self.store.backend = parse_env("PRIZE_POOL_STORE_BACKEND", &val)?;
        }
        if let Ok(val) = std::env::var("PRIZE_POOL_STORE_URL") {
            self.store.url = val;
        }
        if let Ok(val) = std::env::var("PRIZE_POOL_SNAPSHOT_PATH") {
            self.store.snapshot_path = Some(PathBuf::from(val));
        }
        if let Ok(val) = std::env::var("PRIZE_POOL_OP_TIMEOUT_MS") {
            self.store.op_timeout_ms = parse_env("PRIZE_POOL_OP_TIMEOUT_MS", &val)?;
        }
        if let Ok(val) = std::env::var("PRIZE_POOL_FEED_INTERVAL") {
            self.feeder.interval_secs = parse_env("PRIZE_POOL_FEED_INTERVAL", &val)?;
        }
        if let Ok(val) = std::env::var("PRIZE_POOL_UTC_OFFSET") {
            self.planner.utc_offset_secs = parse_env("PRIZE_POOL_UTC_OFFSET", &val)?;
        }
        if let Ok(val) = std::env::var("PRIZE_POOL_LOG_LEVEL") {
            self.logging.level = val;
        }

        Ok(self)
    }

    pub fn merge_from_cli(mut self, cli: &CliArgs) -> Self {
        if let Some(ref url) = cli.store_url {
            self.store.backend = StoreBackend::Redis;
            self.store.url = url.clone();
        }

        if let Some(ref path) = cli.snapshot_path {
            self.store.snapshot_path = Some(path.clone());
        }

        if let Some(interval) = cli.feed_interval {
            self.feeder.interval_secs = interval;
        }

        self
    }

    pub fn load() -> Result<Self, PoolError> {
        Self::from_default_locations()?.merge_from_env()
    }

    pub fn load_with_cli(cli: &CliArgs) -> Result<Self, PoolError> {
        let base = match cli.config_file {
            Some(ref path) => Self::from_file(path)?,
            None => Self::from_default_locations()?,
        };
        Ok(base.merge_from_env()?.merge_from_cli(cli))
    }

    pub fn validate(&self) -> Result<(), PoolError> {
        let mut issues = Vec::new();

        if self.store.backend == StoreBackend::Redis && self.store.url.is_empty() {
            issues.push(ValidationIssue {
                field: "store.url".to_string(),
                message: "URL cannot be empty for the redis backend".to_string(),
            });
        }

        if self.store.op_timeout_ms == 0 || self.store.op_timeout_ms > 60_000 {
            issues.push(ValidationIssue {
                field: "store.op_timeout_ms".to_string(),
                message: "must be between 1 and 60000".to_string(),
            });
        }

        if self.planner.hour_weights.len() != 24 {
            issues.push(ValidationIssue {
                field: "planner.hour_weights".to_string(),
                message: format!(
                    "expected 24 hourly weights, got {}",
                    self.planner.hour_weights.len()
                ),
            });
        } else {
            let sum: u32 = self.planner.hour_weights.iter().sum();
            if sum != 100 {
                issues.push(ValidationIssue {
                    field: "planner.hour_weights".to_string(),
                    message: format!("weights must sum to 100, got {}", sum),
                });
            }
        }

        if self.planner.utc_offset_secs.abs() >= 86_400 {
            issues.push(ValidationIssue {
                field: "planner.utc_offset_secs".to_string(),
                message: "offset must be less than one day".to_string(),
            });
        }

        if self.feeder.interval_secs == 0 {
            issues.push(ValidationIssue {
                field: "feeder.interval_secs".to_string(),
                message: "interval must be positive".to_string(),
            });
        }

        if self.cache.max_entries == 0 {
            issues.push(ValidationIssue {
                field: "cache.max_entries".to_string(),
                message: "cache must hold at least one entry".to_string(),
            });
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            issues.push(ValidationIssue {
                field: "logging.level".to_string(),
                message: format!(
                    "Invalid log level '{}'. Valid levels: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            });
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(PoolError::ValidationError(issues))
        }
    }
}

/// Command-line arguments that override configuration values.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config_file: Option<PathBuf>,
    pub store_url: Option<String>,
    pub snapshot_path: Option<PathBuf>,
    pub feed_interval: Option<u64>,
}
