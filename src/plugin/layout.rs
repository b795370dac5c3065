//! 脚本目录布局：一个文件一个脚本，文件名前缀标记禁用

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;

use super::error::{FileStateError, ScriptingError};

/// 目录扫描得到的脚本
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptDescriptor {
    pub name: String,
    pub path: PathBuf,
    pub enabled: bool,
}

#[derive(Debug, Clone)]
pub struct ScriptLayout {
    dir: PathBuf,
    extension: String,
    disabled_marker: String,
}

impl ScriptLayout {
    pub fn new(
        dir: impl Into<PathBuf>,
        extension: impl Into<String>,
        disabled_marker: impl Into<String>,
    ) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
            disabled_marker: disabled_marker.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 名称不能为空、不能以禁用标记开头，也不能包含路径分隔符
    pub fn validate_name(&self, name: &str) -> Result<(), ScriptingError> {
        if name.is_empty()
            || name.starts_with(&self.disabled_marker)
            || name.contains(['/', '\\'])
            || name == "."
            || name == ".."
        {
            return Err(ScriptingError::InvalidName(name.to_string()));
        }
        Ok(())
    }

    pub fn enabled_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, self.extension))
    }

    pub fn disabled_path(&self, name: &str) -> PathBuf {
        self.dir
            .join(format!("{}{}.{}", self.disabled_marker, name, self.extension))
    }

    /// 文件名 → (脚本名, 是否启用)；后缀不符时返回 `None`
    pub fn parse_file_name(&self, file_name: &str) -> Option<(String, bool)> {
        let stem = file_name.strip_suffix(&self.extension)?.strip_suffix('.')?;
        let (name, enabled) = match stem.strip_prefix(&self.disabled_marker) {
            Some(rest) => (rest, false),
            None => (stem, true),
        };
        if name.is_empty() {
            return None;
        }
        Some((name.to_string(), enabled))
    }

    /// 列出脚本目录（不递归），按名称排序；目录不存在时创建
    ///
    /// 同名脚本同时存在启用与禁用两种文件时以启用的为准。
    pub fn scan(&self) -> io::Result<Vec<ScriptDescriptor>> {
        fs::create_dir_all(&self.dir)?;
        let mut found: BTreeMap<String, ScriptDescriptor> = BTreeMap::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            let Some((name, enabled)) = self.parse_file_name(file_name) else {
                continue;
            };
            let descriptor = ScriptDescriptor {
                name: name.clone(),
                path: entry.path(),
                enabled,
            };
            match found.get(&name) {
                Some(existing) if existing.enabled != enabled => {
                    warn!(
                        script = name.as_str(),
                        "both enabled and disabled files exist, using the enabled one"
                    );
                    if enabled {
                        found.insert(name, descriptor);
                    }
                }
                _ => {
                    found.insert(name, descriptor);
                }
            }
        }
        Ok(found.into_values().collect())
    }

    /// 把禁用形式改名为启用形式；已是启用形式时不动
    pub fn mark_enabled(&self, name: &str) -> Result<PathBuf, FileStateError> {
        let enabled = self.enabled_path(name);
        let disabled = self.disabled_path(name);
        if disabled.exists() {
            rename_no_clobber(&disabled, &enabled)?;
            return Ok(enabled);
        }
        if enabled.exists() {
            return Ok(enabled);
        }
        Err(FileStateError::Missing(enabled))
    }

    /// 把启用形式改名为禁用形式；启用文件不存在时不动
    pub fn mark_disabled(&self, name: &str) -> Result<Option<PathBuf>, FileStateError> {
        let enabled = self.enabled_path(name);
        if !enabled.exists() {
            return Ok(None);
        }
        let disabled = self.disabled_path(name);
        rename_no_clobber(&enabled, &disabled)?;
        Ok(Some(disabled))
    }
}

/// 改名且绝不覆盖：先建硬链接（目标已存在时由文件系统拒绝），再删除原名
fn rename_no_clobber(from: &Path, to: &Path) -> Result<(), FileStateError> {
    let rename_error = |source| FileStateError::Rename {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };
    match fs::hard_link(from, to) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(FileStateError::TargetExists {
                from: from.to_path_buf(),
                to: to.to_path_buf(),
            });
        }
        Err(e) => return Err(rename_error(e)),
    }
    if let Err(e) = fs::remove_file(from) {
        // 撤销链接，保持只有原名存在
        let _ = fs::remove_file(to);
        return Err(rename_error(e));
    }
    Ok(())
}
