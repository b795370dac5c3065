use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Deserialize;

use crate::plugin::diagnostic::SeverityPolicy;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub scripting: ScriptingConfig,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        let s = &self.scripting;
        if s.extension.is_empty() {
            anyhow::bail!("scripting.extension must not be empty");
        }
        if s.extension.starts_with('.') {
            anyhow::bail!(
                "scripting.extension '{}' must not start with '.'",
                s.extension
            );
        }
        if s.disabled_marker.is_empty() {
            anyhow::bail!("scripting.disabled_marker must not be empty");
        }
        if s
            .disabled_marker
            .chars()
            .any(|c| c.is_alphanumeric() || c == '/' || c == '\\' || c == '.')
        {
            anyhow::bail!(
                "scripting.disabled_marker '{}' must not contain alphanumerics, '.' or path separators",
                s.disabled_marker
            );
        }
        for repo in &s.repositories {
            if !(repo.starts_with("http://") || repo.starts_with("https://")) {
                anyhow::bail!("repository '{}' must be an http(s) URL", repo);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// 脚本目录与依赖解析配置
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptingConfig {
    /// 脚本目录，相对路径基于宿主根目录
    #[serde(default = "default_dir")]
    pub dir: PathBuf,
    /// 脚本文件后缀（不含点）
    #[serde(default = "default_extension")]
    pub extension: String,
    /// 文件名带此前缀的脚本视为禁用
    #[serde(default = "default_disabled_marker")]
    pub disabled_marker: String,
    /// 下载依赖的本地缓存目录
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// 默认仓库，排在脚本自身声明的仓库之后
    #[serde(default)]
    pub repositories: Vec<String>,
    /// 离线模式：不访问远程仓库
    #[serde(default)]
    pub offline: bool,
    #[serde(default)]
    pub severity: SeverityPolicy,
}

impl Default for ScriptingConfig {
    fn default() -> Self {
        Self {
            dir: default_dir(),
            extension: default_extension(),
            disabled_marker: default_disabled_marker(),
            cache_dir: default_cache_dir(),
            repositories: Vec::new(),
            offline: false,
            severity: SeverityPolicy::default(),
        }
    }
}

impl ScriptingConfig {
    pub fn scripts_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.dir)
    }

    pub fn cache_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.cache_dir)
    }
}

fn default_dir() -> PathBuf {
    PathBuf::from("scripts")
}

fn default_extension() -> String {
    "ows".to_string()
}

fn default_disabled_marker() -> String {
    "-".to_string()
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".script-cache")
}
