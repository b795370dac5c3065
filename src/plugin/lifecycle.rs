//! 生命周期钩子调度

use thiserror::Error;
use tracing::debug;

use super::engine::ScriptError;
use super::instance::ScriptInstance;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Activation,
    Deactivation,
}

impl std::fmt::Display for HookKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            HookKind::Activation => "activation",
            HookKind::Deactivation => "deactivation",
        })
    }
}

#[derive(Debug, Error)]
#[error("{kind} hook {script}::{hook} failed: {source}")]
pub struct LifecycleHookError {
    pub script: String,
    pub hook: String,
    pub kind: HookKind,
    #[source]
    pub source: ScriptError,
}

/// 按声明顺序执行全部激活钩子，遇到第一个失败即停止
pub fn activate(instance: &ScriptInstance) -> Result<(), LifecycleHookError> {
    run(instance, HookKind::Activation)
}

/// 按声明顺序执行全部停用钩子，遇到第一个失败即停止
pub fn deactivate(instance: &ScriptInstance) -> Result<(), LifecycleHookError> {
    run(instance, HookKind::Deactivation)
}

fn run(instance: &ScriptInstance, kind: HookKind) -> Result<(), LifecycleHookError> {
    let caps = instance.capabilities();
    let hooks = match kind {
        HookKind::Activation => &caps.activation_hooks,
        HookKind::Deactivation => &caps.deactivation_hooks,
    };
    for &id in hooks {
        let hook = instance.function_name(id);
        debug!(script = instance.name(), hook = hook, "running {} hook", kind);
        instance
            .call(id, Vec::new())
            .map_err(|source| LifecycleHookError {
                script: instance.name().to_string(),
                hook: hook.to_string(),
                kind,
                source,
            })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::plugin::compiler::{load, ModuleSource};
    use crate::plugin::diagnostic::SeverityPolicy;
    use crate::plugin::host_api::ScriptHost;
    use crate::plugin::value::Value;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl ScriptHost for Recorder {
        fn log(&self, _script: &str, message: &str) {
            self.0.lock().unwrap().push(message.to_string());
        }

        fn emit(&self, _script: &str, event: &Value) {
            self.0.lock().unwrap().push(event.to_string());
        }
    }

    fn instance(source: &str, host: Arc<Recorder>) -> ScriptInstance {
        load(
            ModuleSource {
                name: "hooks",
                file: "hooks.ows",
                source,
            },
            &[],
            &SeverityPolicy::default(),
            host,
        )
        .unwrap()
        .0
    }

    #[test]
    fn hooks_run_in_declaration_order() {
        let host = Arc::new(Recorder::default());
        let inst = instance(
            "@entrypoint\nfn one() { log \"a1\" }\n@destructor\nfn three() { emit \"d1\" }\n@entrypoint\nfn two() { log \"a2\" }",
            host.clone(),
        );
        activate(&inst).unwrap();
        deactivate(&inst).unwrap();
        assert_eq!(*host.0.lock().unwrap(), vec!["a1", "a2", "d1"]);
    }

    #[test]
    fn failing_hook_skips_the_rest() {
        let host = Arc::new(Recorder::default());
        let inst = instance(
            "@entrypoint\nfn one() { fail \"boom\" }\n@entrypoint\nfn two() { log \"never\" }",
            host.clone(),
        );
        let err = activate(&inst).unwrap_err();
        assert_eq!(err.hook, "one");
        assert_eq!(err.kind, HookKind::Activation);
        assert!(matches!(err.source, ScriptError::Raised { .. }));
        assert!(host.0.lock().unwrap().is_empty());
    }

    #[test]
    fn no_hooks_is_ok() {
        let host = Arc::new(Recorder::default());
        let inst = instance("fn f() { }", host);
        activate(&inst).unwrap();
        deactivate(&inst).unwrap();
    }
}
