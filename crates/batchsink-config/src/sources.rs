// Configuration source loading.
//
// Priority order:
// 1. Environment variables (BATCHSINK_* prefix)
// 2. Config file path from BATCHSINK_CONFIG
// 3. Inline config content from BATCHSINK_CONFIG_CONTENT
// 4. Default config files (./batchsink.toml, ./.batchsink.toml)
// 5. Built-in defaults

use crate::env_overrides::{self, EnvSource, ENV_PREFIX};
use crate::SinkConfig;
use anyhow::{Context, Result};
use std::env;
use std::path::Path;

pub fn load_config() -> Result<SinkConfig> {
    let mut config = load_from_file()?.unwrap_or_default();

    env_overrides::apply_env_overrides(&mut config, &StdEnvSource)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from a specific file path. Fails if the file is
/// missing or can't be parsed; environment overrides still apply on top.
pub fn load_from_file_path(path: impl AsRef<Path>) -> Result<SinkConfig> {
    let path = path.as_ref();
    let mut config = read_file(path)?;

    env_overrides::apply_env_overrides(&mut config, &StdEnvSource)?;
    config.validate()?;
    Ok(config)
}

pub(crate) fn parse(content: &str, origin: &str) -> Result<SinkConfig> {
    toml::from_str(content).with_context(|| format!("Failed to parse {}", origin))
}

fn load_from_file() -> Result<Option<SinkConfig>> {
    if let Ok(path) = env::var("BATCHSINK_CONFIG") {
        return read_file(Path::new(&path)).map(Some);
    }

    if let Ok(content) = env::var("BATCHSINK_CONFIG_CONTENT") {
        return parse(&content, "inline config from BATCHSINK_CONFIG_CONTENT").map(Some);
    }

    for path in &["./batchsink.toml", "./.batchsink.toml"] {
        let path = Path::new(path);
        if path.exists() {
            return read_file(path).map(Some);
        }
    }

    Ok(None)
}

fn read_file(path: &Path) -> Result<SinkConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse(&content, &format!("config file: {}", path.display()))
}

struct StdEnvSource;

impl EnvSource for StdEnvSource {
    fn get(&self, key: &str) -> Option<String> {
        env::var(format!("{}{}", ENV_PREFIX, key)).ok()
    }
}
