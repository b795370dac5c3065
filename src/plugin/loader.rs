//! 脚本加载：读取 → 依赖预扫描 → 依赖解析 → 编译与实例化

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use super::compiler::{self, ModuleSource};
use super::diagnostic::SeverityPolicy;
use super::error::ScriptingError;
use super::host_api::ScriptHost;
use super::instance::ScriptInstance;
use super::resolver::{self, DependencyResolver};

pub struct ScriptLoader {
    resolver: DependencyResolver,
    policy: SeverityPolicy,
    host: Arc<dyn ScriptHost>,
}

impl ScriptLoader {
    pub fn new(
        resolver: DependencyResolver,
        policy: SeverityPolicy,
        host: Arc<dyn ScriptHost>,
    ) -> Self {
        Self {
            resolver,
            policy,
            host,
        }
    }

    /// 加载脚本文件；不运行激活钩子
    pub fn load(&self, name: &str, path: &Path) -> Result<ScriptInstance, ScriptingError> {
        let source = fs::read_to_string(path)?;
        let file = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let deps = resolver::extract(name, Path::new(&file), &source)?;
        let script_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let classpath = if deps.is_empty() {
            Vec::new()
        } else {
            self.resolver.resolve(name, &deps, script_dir)?
        };
        debug!(script = name, dependencies = classpath.len(), "compiling script");

        let (instance, warnings) = compiler::load(
            ModuleSource {
                name,
                file: &file,
                source: &source,
            },
            &classpath,
            &self.policy,
            self.host.clone(),
        )?;
        for w in &warnings {
            warn!(script = name, diagnostic = %w, "script compiled with warnings");
        }
        Ok(instance)
    }
}

impl std::fmt::Debug for ScriptLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptLoader")
            .field("resolver", &self.resolver)
            .field("policy", &self.policy)
            .finish()
    }
}
