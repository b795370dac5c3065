//! 依赖解析
//!
//! 每个坐标按顺序尝试各后端，第一个成功的生效。任一坐标在所有后端都失败时，
//! 整个脚本的解析失败，错误中列出每个失败坐标及各后端给出的原因。

pub mod backend;
pub mod coordinate;

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

pub use backend::{
    FileSystemBackend, LocalCacheBackend, RepositoryBackend, ResolutionBackend, ResolveContext,
};
pub use coordinate::{extract, Coordinate, ScriptDependencies};

/// 一个坐标的失败记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinateFailure {
    pub coordinate: Coordinate,
    /// (后端名, 原因)
    pub reasons: Vec<(&'static str, String)>,
}

impl fmt::Display for CoordinateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.coordinate)?;
        if self.reasons.is_empty() {
            return f.write_str(" (no backend handles this coordinate)");
        }
        for (backend, reason) in &self.reasons {
            write!(f, "\n    {}: {}", backend, reason)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub struct DependencyResolutionError {
    pub script: String,
    pub failures: Vec<CoordinateFailure>,
}

impl fmt::Display for DependencyResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to resolve {} dependenc{} of script '{}'",
            self.failures.len(),
            if self.failures.len() == 1 { "y" } else { "ies" },
            self.script
        )?;
        for failure in &self.failures {
            write!(f, "\n  {}", failure)?;
        }
        Ok(())
    }
}

pub struct DependencyResolver {
    backends: Vec<Box<dyn ResolutionBackend>>,
}

impl fmt::Debug for DependencyResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.backends.iter().map(|b| b.name()).collect();
        f.debug_struct("DependencyResolver")
            .field("backends", &names)
            .finish()
    }
}

impl DependencyResolver {
    pub fn new(backends: Vec<Box<dyn ResolutionBackend>>) -> Self {
        Self { backends }
    }

    /// 本地文件 → 本地缓存 → 远程仓库
    pub fn standard(cache_dir: &Path, repositories: Vec<String>, offline: bool) -> Self {
        Self::new(vec![
            Box::new(FileSystemBackend),
            Box::new(LocalCacheBackend::new(cache_dir)),
            Box::new(RepositoryBackend::new(cache_dir, repositories, offline)),
        ])
    }

    /// 解析全部坐标；结果按声明顺序、去重
    ///
    /// 在调用线程上阻塞执行文件与网络访问。
    pub fn resolve(
        &self,
        script: &str,
        deps: &ScriptDependencies,
        script_dir: &Path,
    ) -> Result<Vec<PathBuf>, DependencyResolutionError> {
        let ctx = ResolveContext {
            script_dir,
            repositories: &deps.repositories,
        };
        let mut resolved = Vec::with_capacity(deps.coordinates.len());
        let mut failures = Vec::new();

        for coordinate in &deps.coordinates {
            match self.resolve_one(coordinate, &ctx) {
                Ok(path) => {
                    debug!(script = script, %coordinate, path = %path.display(), "dependency resolved");
                    if !resolved.contains(&path) {
                        resolved.push(path);
                    }
                }
                Err(reasons) => failures.push(CoordinateFailure {
                    coordinate: coordinate.clone(),
                    reasons,
                }),
            }
        }

        if failures.is_empty() {
            Ok(resolved)
        } else {
            Err(DependencyResolutionError {
                script: script.to_string(),
                failures,
            })
        }
    }

    fn resolve_one(
        &self,
        coordinate: &Coordinate,
        ctx: &ResolveContext<'_>,
    ) -> Result<PathBuf, Vec<(&'static str, String)>> {
        let mut reasons = Vec::new();
        for backend in &self.backends {
            match backend.resolve(coordinate, ctx) {
                Ok(Some(path)) => return Ok(path),
                Ok(None) => {}
                Err(reason) => reasons.push((backend.name(), reason)),
            }
        }
        Err(reasons)
    }
}
