//! 脚本管理器
//!
//! 负责扫描脚本目录、加载、启用/禁用/重启脚本，并维护名称到已加载脚本的映射。
//! 所有操作在调用线程上阻塞执行；异步调用方应通过 `spawn_blocking` 调用。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;

use tracing::{debug, info, warn};

use super::error::ScriptingError;
use super::host_api::{ScriptHost, TracingHost};
use super::instance::ScriptInstance;
use super::layout::ScriptLayout;
use super::lifecycle::{self, LifecycleHookError};
use super::loader::ScriptLoader;
use super::resolver::DependencyResolver;
use super::router;
use super::value::Value;
use crate::config::ScriptingConfig;

/// 已加载并激活的脚本
#[derive(Debug, Clone)]
pub struct LoadedScript {
    pub name: String,
    pub instance: Arc<ScriptInstance>,
    pub path: PathBuf,
    pub loaded_at: SystemTime,
}

/// 启动扫描结果
#[derive(Debug, Default)]
pub struct ScanReport {
    /// 本次成功加载的脚本，按名称排序
    pub loaded: Vec<String>,
    pub failures: Vec<(String, ScriptingError)>,
}

pub struct ScriptManager {
    layout: ScriptLayout,
    loader: ScriptLoader,
    scripts: RwLock<HashMap<String, LoadedScript>>,
    /// 同名操作串行化
    name_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl std::fmt::Debug for ScriptManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptManager")
            .field("layout", &self.layout)
            .field("loaded", &self.names())
            .finish()
    }
}

impl ScriptManager {
    /// 按配置构建；相对路径基于 `root`
    pub fn new(config: &ScriptingConfig, root: &Path) -> Self {
        Self::with_host(config, root, Arc::new(TracingHost))
    }

    pub fn with_host(config: &ScriptingConfig, root: &Path, host: Arc<dyn ScriptHost>) -> Self {
        let layout = ScriptLayout::new(
            config.scripts_dir(root),
            config.extension.clone(),
            config.disabled_marker.clone(),
        );
        let resolver = DependencyResolver::standard(
            &config.cache_dir(root),
            config.repositories.clone(),
            config.offline,
        );
        let loader = ScriptLoader::new(resolver, config.severity.clone(), host);
        Self::with_parts(layout, loader)
    }

    pub fn with_parts(layout: ScriptLayout, loader: ScriptLoader) -> Self {
        Self {
            layout,
            loader,
            scripts: RwLock::new(HashMap::new()),
            name_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn layout(&self) -> &ScriptLayout {
        &self.layout
    }

    /// 扫描脚本目录并加载全部启用的脚本
    ///
    /// 单个脚本失败不会中止扫描，失败记录在返回的报告中。
    pub fn scan_and_load_all(&self) -> Result<ScanReport, ScriptingError> {
        let descriptors = self.layout.scan()?;
        let mut report = ScanReport::default();

        for descriptor in descriptors {
            if !descriptor.enabled {
                debug!(script = descriptor.name.as_str(), "script disabled, skipping");
                continue;
            }
            let outcome = self.with_name_lock(&descriptor.name, || {
                if self.is_loaded(&descriptor.name) {
                    debug!(script = descriptor.name.as_str(), "script already loaded, skipping");
                    return None;
                }
                Some(self.load_and_register(&descriptor.name, &descriptor.path))
            });
            match outcome {
                None => {}
                Some(Ok(())) => report.loaded.push(descriptor.name),
                Some(Err(e)) => {
                    warn!(script = descriptor.name.as_str(), error = %e, "failed to load script");
                    report.failures.push((descriptor.name, e));
                }
            }
        }

        info!(
            loaded = report.loaded.len(),
            failed = report.failures.len(),
            "script scan complete"
        );
        Ok(report)
    }

    /// 启用脚本：改名为启用形式，编译、激活并登记
    ///
    /// 已加载时什么也不做。失败时脚本不在映射中，文件保持启用形式。
    pub fn enable(&self, name: &str) -> Result<(), ScriptingError> {
        self.layout.validate_name(name)?;
        self.with_name_lock(name, || self.enable_locked(name))
    }

    /// 禁用脚本：改名为禁用形式，运行停用钩子并移出映射
    ///
    /// 未加载时什么也不做。停用钩子失败时错误照常返回，但脚本仍被移除。
    pub fn disable(&self, name: &str) -> Result<(), ScriptingError> {
        self.layout.validate_name(name)?;
        self.with_name_lock(name, || self.disable_locked(name))
    }

    /// 先禁用再启用
    ///
    /// 遇到第一个错误即返回；启用失败时脚本最终处于未加载状态，不回滚。
    pub fn restart(&self, name: &str) -> Result<(), ScriptingError> {
        self.layout.validate_name(name)?;
        self.with_name_lock(name, || -> Result<(), ScriptingError> {
            self.disable_locked(name)?;
            self.enable_locked(name)
        })
    }

    /// 按名称与实参调用已加载脚本的函数
    pub fn invoke(
        &self,
        name: &str,
        function: &str,
        args: Vec<Value>,
    ) -> Result<Value, ScriptingError> {
        let instance = self
            .get(name)
            .ok_or_else(|| ScriptingError::NotLoaded(name.to_string()))?;
        router::invoke(&instance, function, args)
    }

    pub fn get(&self, name: &str) -> Option<Arc<ScriptInstance>> {
        self.read().get(name).map(|s| s.instance.clone())
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// 已加载脚本名称，排序
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn count(&self) -> usize {
        self.read().len()
    }

    /// 按名称顺序遍历已加载脚本
    ///
    /// 遍历期间持有读锁，访问者不能调用 enable/disable/restart。
    pub fn for_each(&self, mut visitor: impl FnMut(&LoadedScript)) {
        let scripts = self.read();
        let mut entries: Vec<&LoadedScript> = scripts.values().collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        for entry in entries {
            visitor(entry);
        }
    }

    /// 运行全部已加载脚本的停用钩子并清空映射，不改动文件
    pub fn shutdown(&self) -> Vec<(String, LifecycleHookError)> {
        let drained: Vec<LoadedScript> = {
            let mut scripts = self.write();
            let mut all: Vec<LoadedScript> = scripts.drain().map(|(_, s)| s).collect();
            all.sort_by(|a, b| a.name.cmp(&b.name));
            all
        };
        let mut errors = Vec::new();
        for script in drained {
            if let Err(e) = lifecycle::deactivate(&script.instance) {
                warn!(script = script.name.as_str(), error = %e, "deactivation failed during shutdown");
                errors.push((script.name, e));
            } else {
                info!(script = script.name.as_str(), "script unloaded");
            }
        }
        errors
    }

    fn enable_locked(&self, name: &str) -> Result<(), ScriptingError> {
        if self.is_loaded(name) {
            info!(script = name, "script already enabled");
            return Ok(());
        }
        let path = self.layout.mark_enabled(name)?;
        self.load_and_register(name, &path).inspect_err(|e| {
            warn!(script = name, error = %e, "failed to enable script");
        })
    }

    fn disable_locked(&self, name: &str) -> Result<(), ScriptingError> {
        if !self.is_loaded(name) {
            info!(script = name, "script already disabled");
            return Ok(());
        }
        self.layout.mark_disabled(name)?;
        let Some(script) = self.write().remove(name) else {
            return Ok(());
        };
        lifecycle::deactivate(&script.instance).map_err(|e| {
            warn!(script = name, error = %e, "deactivation hook failed, script removed anyway");
            ScriptingError::from(e)
        })?;
        info!(script = name, "script disabled");
        Ok(())
    }

    /// 编译并激活；激活失败的脚本不登记
    fn load_and_register(&self, name: &str, path: &Path) -> Result<(), ScriptingError> {
        let instance = self.loader.load(name, path)?;
        lifecycle::activate(&instance)?;
        let loaded = LoadedScript {
            name: name.to_string(),
            instance: Arc::new(instance),
            path: path.to_path_buf(),
            loaded_at: SystemTime::now(),
        };
        self.write().insert(name.to_string(), loaded);
        info!(script = name, path = %path.display(), "script loaded");
        Ok(())
    }

    /// 持有该名称的操作锁执行 `f`
    ///
    /// 没有其他线程等待时，结束后移除锁条目，映射大小不随历史名称增长。
    fn with_name_lock<T>(&self, name: &str, f: impl FnOnce() -> T) -> T {
        let lock = {
            let mut locks = self.locks();
            locks.entry(name.to_string()).or_default().clone()
        };
        let result = {
            let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
            f()
        };
        let mut locks = self.locks();
        // 只在映射锁内克隆，这里计数为 2 说明没有其他持有者
        if Arc::strong_count(&lock) == 2 {
            locks.remove(name);
        }
        result
    }

    fn locks(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Mutex<()>>>> {
        self.name_locks.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, LoadedScript>> {
        self.scripts.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, LoadedScript>> {
        self.scripts.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn manager(root: &Path) -> ScriptManager {
        let config = ScriptingConfig {
            offline: true,
            ..Default::default()
        };
        ScriptManager::new(&config, root)
    }

    #[test]
    fn scan_skips_disabled_and_reports_failures() {
        let root = tempfile::tempdir().unwrap();
        let scripts = root.path().join("scripts");
        fs::create_dir_all(&scripts).unwrap();
        fs::write(scripts.join("good.ows"), "fn ping() { return \"pong\" }").unwrap();
        fs::write(scripts.join("-off.ows"), "fn ping() { return 1 }").unwrap();
        fs::write(scripts.join("bad.ows"), "fn ping( {").unwrap();

        let mgr = manager(root.path());
        let report = mgr.scan_and_load_all().unwrap();
        assert_eq!(report.loaded, vec!["good"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "bad");
        assert_eq!(mgr.names(), vec!["good"]);
        assert_eq!(
            mgr.invoke("good", "ping", vec![]).unwrap(),
            Value::from("pong")
        );
        assert!(matches!(
            mgr.invoke("off", "ping", vec![]),
            Err(ScriptingError::NotLoaded(_))
        ));
    }

    #[test]
    fn invalid_names_rejected() {
        let root = tempfile::tempdir().unwrap();
        let mgr = manager(root.path());
        assert!(matches!(
            mgr.enable("../etc"),
            Err(ScriptingError::InvalidName(_))
        ));
        assert!(matches!(mgr.disable("-x"), Err(ScriptingError::InvalidName(_))));
    }

    #[test]
    fn enable_missing_file_is_file_state_error() {
        let root = tempfile::tempdir().unwrap();
        let mgr = manager(root.path());
        mgr.scan_and_load_all().unwrap();
        assert!(matches!(
            mgr.enable("ghost"),
            Err(ScriptingError::FileState(_))
        ));
        assert_eq!(mgr.count(), 0);
    }

    #[test]
    fn name_locks_do_not_accumulate() {
        let root = tempfile::tempdir().unwrap();
        let scripts = root.path().join("scripts");
        fs::create_dir_all(&scripts).unwrap();
        fs::write(scripts.join("a.ows"), "fn f() { }").unwrap();
        let mgr = manager(root.path());
        mgr.scan_and_load_all().unwrap();

        for i in 0..50 {
            let _ = mgr.enable(&format!("ghost{}", i));
        }
        mgr.disable("a").unwrap();
        mgr.restart("a").unwrap();
        assert!(mgr.locks().is_empty());
        assert!(mgr.is_loaded("a"));
    }

    #[test]
    fn for_each_visits_in_name_order() {
        let root = tempfile::tempdir().unwrap();
        let scripts = root.path().join("scripts");
        fs::create_dir_all(&scripts).unwrap();
        for name in ["c", "a", "b"] {
            fs::write(scripts.join(format!("{}.ows", name)), "fn f() { }").unwrap();
        }
        let mgr = manager(root.path());
        mgr.scan_and_load_all().unwrap();
        let mut seen = Vec::new();
        mgr.for_each(|s| seen.push(s.name.clone()));
        assert_eq!(seen, vec!["a", "b", "c"]);
    }

    #[test]
    fn shutdown_keeps_files_enabled() {
        let root = tempfile::tempdir().unwrap();
        let scripts = root.path().join("scripts");
        fs::create_dir_all(&scripts).unwrap();
        fs::write(scripts.join("a.ows"), "@destructor\nfn stop() { fail \"x\" }").unwrap();
        fs::write(scripts.join("b.ows"), "@destructor\nfn stop() { }").unwrap();
        let mgr = manager(root.path());
        mgr.scan_and_load_all().unwrap();

        let errors = mgr.shutdown();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, "a");
        assert_eq!(mgr.count(), 0);
        assert!(scripts.join("a.ows").exists());
        assert!(scripts.join("b.ows").exists());
    }
}
