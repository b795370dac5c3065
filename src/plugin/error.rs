//! 脚本子系统错误类型

use std::path::PathBuf;

use thiserror::Error;

use super::diagnostic::CompilationError;
use super::engine::ScriptError;
use super::lifecycle::LifecycleHookError;
use super::resolver::DependencyResolutionError;
use super::router::UnresolvedCallError;

/// 启用/禁用时磁盘上的文件状态不符合预期
#[derive(Debug, Error)]
pub enum FileStateError {
    #[error("script file {} not found", .0.display())]
    Missing(PathBuf),

    #[error("cannot rename {} to {}: target already exists", .from.display(), .to.display())]
    TargetExists { from: PathBuf, to: PathBuf },

    #[error("failed to rename {} to {}: {source}", .from.display(), .to.display())]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ScriptingError {
    #[error(transparent)]
    DependencyResolution(#[from] DependencyResolutionError),

    #[error(transparent)]
    Compilation(#[from] CompilationError),

    #[error(transparent)]
    LifecycleHook(#[from] LifecycleHookError),

    #[error(transparent)]
    UnresolvedCall(#[from] UnresolvedCallError),

    #[error(transparent)]
    FileState(#[from] FileStateError),

    /// 被调用的脚本函数执行失败
    #[error("call to {script}::{function} failed: {source}")]
    Invocation {
        script: String,
        function: String,
        #[source]
        source: ScriptError,
    },

    #[error("script '{0}' is not loaded")]
    NotLoaded(String),

    #[error("invalid script name '{0}'")]
    InvalidName(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ScriptingError>;
