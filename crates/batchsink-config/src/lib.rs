// batchsink-config - Producer and logging configuration
//
// Supports configuration from multiple sources:
// 1. Environment variables (highest priority)
// 2. Config file path from BATCHSINK_CONFIG env var
// 3. Config file contents from BATCHSINK_CONFIG_CONTENT env var
// 4. Default config file locations (./batchsink.toml, ./.batchsink.toml)
// 5. Built-in defaults (lowest priority)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

mod env_overrides;
mod sources;
mod validation;

pub use env_overrides::{apply_env_overrides, EnvSource, ENV_PREFIX};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SinkConfig {
    #[serde(default)]
    pub producer: ProducerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Batching, dispatch and backpressure settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerConfig {
    /// Requests per batch; a group closes as soon as it reaches this size.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default)]
    pub shutdown_mode: ShutdownMode,

    /// Concurrent dispatcher workers. 1 keeps strict global FIFO.
    #[serde(default = "default_dispatch_workers")]
    pub dispatch_workers: usize,

    /// Close groups older than this even if not full.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_batch_age_ms: Option<u64>,

    /// Limit enforced by `try_add`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_outstanding_records: Option<usize>,
}

// Batch-write APIs of typical key-value stores cap a request at 25 items.
fn default_batch_size() -> usize {
    25
}

fn default_dispatch_workers() -> usize {
    1
}

impl ProducerConfig {
    pub fn max_batch_age(&self) -> Option<Duration> {
        self.max_batch_age_ms.map(Duration::from_millis)
    }
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            shutdown_mode: ShutdownMode::default(),
            dispatch_workers: default_dispatch_workers(),
            max_batch_age_ms: None,
            max_outstanding_records: None,
        }
    }
}

/// What happens to undelivered work on shutdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownMode {
    /// Flush pending groups and deliver every queued batch before stopping.
    #[default]
    Drain,
    /// Fail pending groups and queued batches with a shutdown error.
    Immediate,
}

impl std::fmt::Display for ShutdownMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownMode::Drain => write!(f, "drain"),
            ShutdownMode::Immediate => write!(f, "immediate"),
        }
    }
}

impl std::str::FromStr for ShutdownMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "drain" | "graceful" => Ok(ShutdownMode::Drain),
            "immediate" | "abort" => Ok(ShutdownMode::Immediate),
            _ => anyhow::bail!("Unsupported shutdown mode: {}. Supported: drain, immediate", s),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl SinkConfig {
    /// Load configuration from all sources with priority
    pub fn load() -> Result<Self> {
        sources::load_config()
    }

    /// Load from a specific file, then apply environment overrides
    pub fn load_from_file_path(path: impl AsRef<Path>) -> Result<Self> {
        sources::load_from_file_path(path)
    }

    /// Parse TOML content without consulting the environment
    pub fn from_toml(content: &str) -> Result<Self> {
        sources::parse(content, "inline config")
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

impl ProducerConfig {
    pub fn validate(&self) -> Result<()> {
        validation::validate_producer_config(self)
    }
}
