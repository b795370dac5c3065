//! Host API — 脚本与宿主交互的接口

use tracing::{debug, info};

use super::value::Value;

/// 脚本可以调用的宿主能力
///
/// 由 `log` / `emit` 语句触发。实现必须线程安全：不同脚本可能在不同线程上执行。
pub trait ScriptHost: Send + Sync {
    fn log(&self, script: &str, message: &str);

    fn emit(&self, script: &str, event: &Value);
}

/// 默认宿主：转发到 tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHost;

impl ScriptHost for TracingHost {
    fn log(&self, script: &str, message: &str) {
        info!(script = script, "{}", message);
    }

    fn emit(&self, script: &str, event: &Value) {
        debug!(script = script, event = %event, "script event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracing_host_is_object_safe() {
        let host: Box<dyn ScriptHost> = Box::new(TracingHost);
        host.log("demo", "hello");
        host.emit("demo", &Value::Int(1));
    }
}
