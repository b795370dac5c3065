//! 内置脚本引擎
//!
//! `.ows` 脚本的完整编译流水线：词法 → 语法 → 语义检查 → 链接 → 解释执行。
//! 不依赖外部脚本运行时。

pub mod ast;
pub mod check;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod program;

pub use interp::{Globals, Interpreter, ScriptError, MAX_CALL_DEPTH, MAX_EVAL_DEPTH};
pub use parser::{parse, ParseError, MAX_NESTING};
pub use program::{Capabilities, CompiledFunction, FnId, Linkage, OverloadSet, Program, Selection};

/// 内置函数的参数个数
pub fn builtin_arity(name: &str) -> Option<usize> {
    match name {
        "str" | "len" => Some(1),
        _ => None,
    }
}
