use super::{LogFormat, ShutdownMode, SinkConfig};
use anyhow::{anyhow, Context, Result};

pub const ENV_PREFIX: &str = "BATCHSINK_";

/// Abstraction over environment-variable lookups so tests and embedders can
/// supply their own source of overrides.
pub trait EnvSource {
    /// Look up `key` with the BATCHSINK_ prefix applied.
    fn get(&self, key: &str) -> Option<String>;
}

/// Apply environment-variable overrides (highest priority) to the config.
pub fn apply_env_overrides<E: EnvSource>(config: &mut SinkConfig, env: &E) -> Result<()> {
    // Producer configuration
    if let Some(val) = get_env_usize(env, "BATCH_SIZE")? {
        config.producer.batch_size = val;
    }
    if let Some(mode) = env.get("SHUTDOWN_MODE") {
        config.producer.shutdown_mode = mode
            .parse::<ShutdownMode>()
            .context("Invalid BATCHSINK_SHUTDOWN_MODE value")?;
    }
    if let Some(val) = get_env_usize(env, "DISPATCH_WORKERS")? {
        config.producer.dispatch_workers = val;
    }
    if let Some(val) = get_env_u64(env, "MAX_BATCH_AGE_MS")? {
        config.producer.max_batch_age_ms = Some(val);
    }
    if let Some(val) = get_env_usize(env, "MAX_OUTSTANDING_RECORDS")? {
        config.producer.max_outstanding_records = Some(val);
    }

    // Logging configuration
    if let Some(level) = env.get("LOG_LEVEL") {
        config.logging.log_level = level;
    }
    if let Some(format) = env.get("LOG_FORMAT") {
        config.logging.log_format = match format.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };
    }

    Ok(())
}

fn get_env_usize<E: EnvSource>(env: &E, key: &str) -> Result<Option<usize>> {
    match env.get(key) {
        Some(val) => {
            let parsed = val
                .parse::<usize>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

fn get_env_u64<E: EnvSource>(env: &E, key: &str) -> Result<Option<u64>> {
    match env.get(key) {
        Some(val) => {
            let parsed = val
                .parse::<u64>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}
