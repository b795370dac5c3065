//! 脚本扩展系统
//!
//! 从脚本目录发现独立编写的 `.ows` 脚本，解析其声明的依赖，编译为运行中的实例，
//! 并在不重启宿主进程的情况下管理其生命周期（加载、激活、停用、重载）。
//!
//! 组成：
//! - `resolver`：依赖坐标解析（本地文件、本地缓存、远程仓库）
//! - `compiler` / `loader`：编译、链接、实例化
//! - `lifecycle`：激活/停用钩子调度
//! - `router`：按运行时参数类型选择重载
//! - `manager`：目录扫描与启用/禁用/重启

pub mod compiler;
pub mod diagnostic;
pub mod engine;
pub mod error;
pub mod host_api;
pub mod instance;
pub mod layout;
pub mod lifecycle;
pub mod loader;
pub mod manager;
pub mod resolver;
pub mod router;
pub mod value;

pub use diagnostic::{CompilationError, Diagnostic, Severity, SeverityPolicy};
pub use error::{FileStateError, ScriptingError};
pub use host_api::{ScriptHost, TracingHost};
pub use instance::ScriptInstance;
pub use layout::{ScriptDescriptor, ScriptLayout};
pub use lifecycle::LifecycleHookError;
pub use loader::ScriptLoader;
pub use manager::{LoadedScript, ScanReport, ScriptManager};
pub use resolver::{Coordinate, DependencyResolutionError, DependencyResolver};
pub use router::UnresolvedCallError;
pub use value::{Signature, Value, ValueType};
