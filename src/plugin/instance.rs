//! 运行中的脚本实例

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use super::diagnostic::{codes, CompilationError, Diagnostic, Location};
use super::engine::{Capabilities, FnId, Globals, Interpreter, OverloadSet, Program, ScriptError};
use super::host_api::ScriptHost;
use super::value::Value;

/// 编译完成的脚本及其模块状态
///
/// 同一实例上的调用互斥执行：每次调用在整个执行期间持有模块状态锁。
pub struct ScriptInstance {
    program: Program,
    globals: Mutex<Globals>,
    host: Arc<dyn ScriptHost>,
}

impl fmt::Debug for ScriptInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptInstance")
            .field("name", &self.program.script)
            .field("functions", &self.program.functions.len())
            .finish()
    }
}

impl ScriptInstance {
    /// 运行模块变量初始化表达式
    pub(crate) fn instantiate(
        program: Program,
        file: &str,
        host: Arc<dyn ScriptHost>,
    ) -> Result<Self, CompilationError> {
        let mut globals = Globals::new();
        Interpreter::new(&program, &mut globals, host.as_ref())
            .initialize_globals()
            .map_err(|(idx, e)| {
                let (name, init) = &program.globals[idx];
                let d = Diagnostic::error(
                    codes::INITIALIZER_FAILED,
                    format!("initializer of '{}' failed: {}", name, e),
                )
                .at(Location::new(file, init.span.line, init.span.column))
                .caused_by(Arc::new(e));
                CompilationError::single(&program.script, d)
            })?;
        Ok(Self {
            program,
            globals: Mutex::new(globals),
            host,
        })
    }

    pub fn name(&self) -> &str {
        &self.program.script
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.program.capabilities
    }

    pub fn callables(&self) -> &HashMap<String, OverloadSet> {
        &self.program.capabilities.callables
    }

    pub fn function_name(&self, id: FnId) -> &str {
        &self.program.function(id).name
    }

    /// 调用脚本函数；参数不符时返回 `ArgumentMismatch`
    pub fn call(&self, id: FnId, args: Vec<Value>) -> Result<Value, ScriptError> {
        // 脚本错误不会在持锁期间 panic，中毒时直接取回
        let mut globals = self.globals.lock().unwrap_or_else(|e| e.into_inner());
        Interpreter::new(&self.program, &mut globals, self.host.as_ref()).call(id, args)
    }

    /// 读取模块变量的当前值
    pub fn global(&self, name: &str) -> Option<Value> {
        let globals = self.globals.lock().unwrap_or_else(|e| e.into_inner());
        globals.get(name).cloned()
    }
}
