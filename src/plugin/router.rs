//! 动态调用路由：按名称与运行时参数类型选择脚本函数

use thiserror::Error;

use super::engine::Selection;
use super::error::ScriptingError;
use super::instance::ScriptInstance;
use super::value::{Signature, Value};

/// 没有唯一可调用的函数
#[derive(Debug, Clone, Error)]
#[error("{script}: no callable '{function}' matches {signature}{}", candidates_suffix(.candidates))]
pub struct UnresolvedCallError {
    pub script: String,
    pub function: String,
    pub signature: Signature,
    /// 同名函数的已声明签名（按声明顺序）
    pub candidates: Vec<Signature>,
}

fn candidates_suffix(candidates: &[Signature]) -> String {
    if candidates.is_empty() {
        return String::new();
    }
    let list: Vec<String> = candidates
        .iter()
        .map(|sig| sig.to_string())
        .collect();
    format!(" (candidates: {})", list.join(", "))
}

/// 调用脚本函数
///
/// 同名只有一个函数时直接调用，参数不符由调用本身报告；
/// 多个重载时要求实参签名与某个重载完全相等，绝不退回任意候选。
pub fn invoke(
    instance: &ScriptInstance,
    function: &str,
    args: Vec<Value>,
) -> Result<Value, ScriptingError> {
    let unresolved = |candidates: Vec<Signature>, args: &[Value]| UnresolvedCallError {
        script: instance.name().to_string(),
        function: function.to_string(),
        signature: Signature::of(args),
        candidates,
    };

    let Some(set) = instance.callables().get(function) else {
        return Err(unresolved(Vec::new(), &args).into());
    };
    let id = match set.select(&args) {
        Selection::Only(id) | Selection::Exact(id) => id,
        Selection::NoMatch => {
            return Err(unresolved(set.signatures().cloned().collect(), &args).into());
        }
    };
    instance
        .call(id, args)
        .map_err(|source| ScriptingError::Invocation {
            script: instance.name().to_string(),
            function: function.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::plugin::compiler::{load, ModuleSource};
    use crate::plugin::diagnostic::SeverityPolicy;
    use crate::plugin::engine::ScriptError;
    use crate::plugin::host_api::TracingHost;
    use crate::plugin::value::ValueType;

    fn greeter() -> ScriptInstance {
        load(
            ModuleSource {
                name: "greeter",
                file: "greeter.ows",
                source: "fn greet(name: string) { return \"hello \" + name }\n\
                         fn greet(n: int) { return n * 2 }\n\
                         fn shout(s: string) { return s + \"!\" }",
            },
            &[],
            &SeverityPolicy::default(),
            Arc::new(TracingHost),
        )
        .unwrap()
        .0
    }

    #[test]
    fn overload_selected_by_runtime_type() {
        let inst = greeter();
        assert_eq!(
            invoke(&inst, "greet", vec![Value::from("Ada")]).unwrap(),
            Value::from("hello Ada")
        );
        assert_eq!(invoke(&inst, "greet", vec![Value::Int(7)]).unwrap(), Value::Int(14));
    }

    #[test]
    fn no_exact_overload_is_unresolved() {
        let inst = greeter();
        let err = invoke(&inst, "greet", vec![Value::Float(3.5)]).unwrap_err();
        let ScriptingError::UnresolvedCall(err) = err else {
            panic!("expected unresolved call, got {:?}", err);
        };
        assert_eq!(err.signature, Signature(vec![ValueType::Float]));
        assert_eq!(
            err.candidates,
            vec![
                Signature(vec![ValueType::Str]),
                Signature(vec![ValueType::Int])
            ]
        );
        assert!(err.to_string().contains("candidates: (string), (int)"));
    }

    #[test]
    fn unknown_function_is_unresolved() {
        let inst = greeter();
        let err = invoke(&inst, "wave", vec![]).unwrap_err();
        assert!(matches!(
            err,
            ScriptingError::UnresolvedCall(UnresolvedCallError { ref candidates, .. }) if candidates.is_empty()
        ));
    }

    #[test]
    fn single_candidate_reports_argument_mismatch() {
        let inst = greeter();
        let err = invoke(&inst, "shout", vec![Value::Int(1)]).unwrap_err();
        assert!(matches!(
            err,
            ScriptingError::Invocation {
                source: ScriptError::ArgumentMismatch { .. },
                ..
            }
        ));
    }
}
