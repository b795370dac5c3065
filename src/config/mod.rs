pub mod types;

use anyhow::{Context, Result};
use std::path::Path;

pub use types::{Config, LogConfig, ScriptingConfig};

pub fn load_config(path: &str) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path))?;
    let config = parse_config(&content)?;
    Ok(config)
}

/// 配置文件不存在时使用默认配置
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        return Ok(Config::default());
    }
    load_config(&path.to_string_lossy())
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = if content.trim().is_empty() {
        Config::default()
    } else {
        serde_yml::from_str(content)?
    };
    config.validate()?;
    Ok(config)
}
