//! 树遍历解释器

use std::collections::HashMap;

use thiserror::Error;

use super::ast::*;
use super::program::{FnId, Linkage, Program, Selection};
use crate::plugin::host_api::ScriptHost;
use crate::plugin::value::{Signature, Value};

/// 调用深度上限
pub const MAX_CALL_DEPTH: usize = 64;

/// 求值嵌套上限：调用、语句块与复合表达式共用
///
/// 按 2 MiB 线程栈（tokio 阻塞线程的默认值）估算，调试构建下也不会溢出。
pub const MAX_EVAL_DEPTH: usize = 192;

/// 脚本执行期错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    /// 脚本通过 `fail` 主动抛出
    #[error("{function} raised: {message}")]
    Raised { function: String, message: String },

    #[error("runtime error in {function} at line {line}: {message}")]
    Runtime {
        function: String,
        line: usize,
        message: String,
    },

    #[error("{function}{expected} cannot be called with {actual}")]
    ArgumentMismatch {
        function: String,
        expected: Signature,
        actual: Signature,
    },

    #[error("no overload of '{name}' accepts {signature}")]
    NoOverload { name: String, signature: Signature },

    #[error("call depth exceeded {0}")]
    StackOverflow(usize),

    #[error("evaluation nesting exceeded {0}")]
    NestingTooDeep(usize),
}

/// 模块变量
pub type Globals = HashMap<String, Value>;

enum Flow {
    Next,
    Return(Value),
}

struct Frame<'p> {
    function: &'p str,
    linkage: Linkage,
    scopes: Vec<HashMap<String, Value>>,
}

pub struct Interpreter<'a> {
    program: &'a Program,
    globals: &'a mut Globals,
    host: &'a dyn ScriptHost,
    depth: usize,
    nesting: usize,
}

impl<'a> Interpreter<'a> {
    pub fn new(program: &'a Program, globals: &'a mut Globals, host: &'a dyn ScriptHost) -> Self {
        Self {
            program,
            globals,
            host,
            depth: 0,
            nesting: 0,
        }
    }

    /// 在嵌套预算内执行 `f`
    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ScriptError>,
    ) -> Result<T, ScriptError> {
        if self.nesting >= MAX_EVAL_DEPTH {
            return Err(ScriptError::NestingTooDeep(MAX_EVAL_DEPTH));
        }
        self.nesting += 1;
        let result = f(self);
        self.nesting -= 1;
        result
    }

    /// 按顺序求值模块变量初始化表达式
    pub fn initialize_globals(&mut self) -> Result<(), (usize, ScriptError)> {
        let program = self.program;
        for (idx, (name, init)) in program.globals.iter().enumerate() {
            let mut frame = Frame {
                function: "<init>",
                linkage: Linkage::Module,
                scopes: Vec::new(),
            };
            let value = self.eval(&mut frame, init).map_err(|e| (idx, e))?;
            self.globals.insert(name.clone(), value);
        }
        Ok(())
    }

    /// 调用函数，检查参数个数与类型
    pub fn call(&mut self, id: FnId, args: Vec<Value>) -> Result<Value, ScriptError> {
        let program = self.program;
        let func = program.function(id);
        if !func.signature.accepts(&args) {
            return Err(ScriptError::ArgumentMismatch {
                function: func.name.clone(),
                expected: func.signature.clone(),
                actual: Signature::of(&args),
            });
        }
        if self.depth >= MAX_CALL_DEPTH {
            return Err(ScriptError::StackOverflow(MAX_CALL_DEPTH));
        }

        let params: HashMap<String, Value> = func
            .params
            .iter()
            .map(|(name, _)| name.clone())
            .zip(args)
            .collect();
        let mut frame = Frame {
            function: &func.name,
            linkage: func.linkage,
            scopes: vec![params],
        };

        self.depth += 1;
        let result = self.exec_block(&mut frame, &func.body);
        self.depth -= 1;

        match result? {
            Flow::Return(v) => Ok(v),
            Flow::Next => Ok(Value::Unit),
        }
    }

    fn exec_block(&mut self, frame: &mut Frame<'_>, block: &Block) -> Result<Flow, ScriptError> {
        self.nested(|this| this.exec_scoped(frame, block))
    }

    fn exec_scoped(&mut self, frame: &mut Frame<'_>, block: &Block) -> Result<Flow, ScriptError> {
        frame.scopes.push(HashMap::new());
        let mut flow = Flow::Next;
        for stmt in block {
            match self.exec(frame, stmt) {
                Ok(Flow::Next) => {}
                Ok(ret) => {
                    flow = ret;
                    break;
                }
                Err(e) => {
                    frame.scopes.pop();
                    return Err(e);
                }
            }
        }
        frame.scopes.pop();
        Ok(flow)
    }

    fn exec(&mut self, frame: &mut Frame<'_>, stmt: &Stmt) -> Result<Flow, ScriptError> {
        match &stmt.kind {
            StmtKind::Let { name, value } => {
                let v = self.eval(frame, value)?;
                if let Some(scope) = frame.scopes.last_mut() {
                    scope.insert(name.clone(), v);
                }
            }
            StmtKind::Set { name, value } => {
                let v = self.eval(frame, value)?;
                match frame.scopes.iter().rposition(|scope| scope.contains_key(name)) {
                    Some(idx) => {
                        frame.scopes[idx].insert(name.clone(), v);
                    }
                    None if frame.linkage == Linkage::Module
                        && self.globals.contains_key(name) =>
                    {
                        self.globals.insert(name.clone(), v);
                    }
                    None => {
                        return Err(runtime(
                            frame,
                            stmt.span,
                            format!("unknown variable '{}'", name),
                        ));
                    }
                }
            }
            StmtKind::Log(e) => {
                let v = self.eval(frame, e)?;
                self.host.log(&self.program.script, &v.to_string());
            }
            StmtKind::Emit(e) => {
                let v = self.eval(frame, e)?;
                self.host.emit(&self.program.script, &v);
            }
            StmtKind::Fail(e) => {
                let v = self.eval(frame, e)?;
                return Err(ScriptError::Raised {
                    function: frame.function.to_string(),
                    message: v.to_string(),
                });
            }
            StmtKind::Return(value) => {
                let v = match value {
                    Some(e) => self.eval(frame, e)?,
                    None => Value::Unit,
                };
                return Ok(Flow::Return(v));
            }
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                let c = self.eval(frame, cond)?;
                let Value::Bool(c) = c else {
                    return Err(runtime(
                        frame,
                        cond.span,
                        format!("condition must be bool, got {}", c.value_type()),
                    ));
                };
                if c {
                    return self.exec_block(frame, then);
                } else if let Some(otherwise) = otherwise {
                    return self.exec_block(frame, otherwise);
                }
            }
            StmtKind::Expr(e) => {
                self.eval(frame, e)?;
            }
        }
        Ok(Flow::Next)
    }

    fn lookup(&self, frame: &Frame<'_>, name: &str) -> Option<Value> {
        for scope in frame.scopes.iter().rev() {
            if let Some(v) = scope.get(name) {
                return Some(v.clone());
            }
        }
        if frame.linkage == Linkage::Module {
            return self.globals.get(name).cloned();
        }
        None
    }

    fn eval(&mut self, frame: &mut Frame<'_>, expr: &Expr) -> Result<Value, ScriptError> {
        match &expr.kind {
            ExprKind::Literal(_) | ExprKind::Name(_) => self.eval_node(frame, expr),
            _ => self.nested(|this| this.eval_node(frame, expr)),
        }
    }

    fn eval_node(&mut self, frame: &mut Frame<'_>, expr: &Expr) -> Result<Value, ScriptError> {
        match &expr.kind {
            ExprKind::Literal(v) => Ok(v.clone()),
            ExprKind::Name(name) => self
                .lookup(frame, name)
                .ok_or_else(|| runtime(frame, expr.span, format!("unknown variable '{}'", name))),
            ExprKind::Call { name, args } => {
                let mut values = Vec::with_capacity(args.len());
                for a in args {
                    values.push(self.eval(frame, a)?);
                }
                self.call_named(frame, expr.span, name, values)
            }
            ExprKind::Unary { op, expr: inner } => {
                let v = self.eval(frame, inner)?;
                match (op, v) {
                    (UnaryOp::Neg, Value::Int(n)) => n
                        .checked_neg()
                        .map(Value::Int)
                        .ok_or_else(|| runtime(frame, expr.span, "integer overflow".into())),
                    (UnaryOp::Neg, Value::Float(x)) => Ok(Value::Float(-x)),
                    (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                    (op, v) => Err(runtime(
                        frame,
                        expr.span,
                        format!(
                            "cannot apply '{}' to {}",
                            if *op == UnaryOp::Neg { "-" } else { "!" },
                            v.value_type()
                        ),
                    )),
                }
            }
            ExprKind::Binary { op, lhs, rhs } => match op {
                BinaryOp::And | BinaryOp::Or => {
                    let l = self.eval(frame, lhs)?;
                    let Value::Bool(l) = l else {
                        return Err(runtime(
                            frame,
                            lhs.span,
                            format!("'{}' expects bool, got {}", op.symbol(), l.value_type()),
                        ));
                    };
                    // 短路求值
                    if (*op == BinaryOp::And && !l) || (*op == BinaryOp::Or && l) {
                        return Ok(Value::Bool(l));
                    }
                    let r = self.eval(frame, rhs)?;
                    match r {
                        Value::Bool(r) => Ok(Value::Bool(r)),
                        other => Err(runtime(
                            frame,
                            rhs.span,
                            format!("'{}' expects bool, got {}", op.symbol(), other.value_type()),
                        )),
                    }
                }
                _ => {
                    let l = self.eval(frame, lhs)?;
                    let r = self.eval(frame, rhs)?;
                    binary(*op, l, r).map_err(|message| runtime(frame, expr.span, message))
                }
            },
        }
    }

    fn call_named(
        &mut self,
        frame: &Frame<'_>,
        span: Span,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Value, ScriptError> {
        let program = self.program;
        if let Some(set) = program.symbols(frame.linkage).get(name) {
            // 没有同参数个数的重载时，同名内置函数优先
            let prefer_builtin = !set.has_arity(args.len()) && builtin(name, &args).is_some();
            if !prefer_builtin {
                return match set.select(&args) {
                    Selection::Only(id) | Selection::Exact(id) => self.call(id, args),
                    Selection::NoMatch => Err(ScriptError::NoOverload {
                        name: name.to_string(),
                        signature: Signature::of(&args),
                    }),
                };
            }
        }
        match builtin(name, &args) {
            Some(result) => result.map_err(|message| runtime(frame, span, message)),
            None => Err(ScriptError::NoOverload {
                name: name.to_string(),
                signature: Signature::of(&args),
            }),
        }
    }
}

fn runtime(frame: &Frame<'_>, span: Span, message: String) -> ScriptError {
    ScriptError::Runtime {
        function: frame.function.to_string(),
        line: span.line,
        message,
    }
}

/// 内置函数；名称或参数个数不符时返回 `None`
fn builtin(name: &str, args: &[Value]) -> Option<Result<Value, String>> {
    match (name, args) {
        ("str", [v]) => Some(Ok(Value::Str(v.to_string()))),
        ("len", [Value::Str(s)]) => Some(Ok(Value::Int(s.chars().count() as i64))),
        ("len", [other]) => Some(Err(format!(
            "len expects string, got {}",
            other.value_type()
        ))),
        _ => None,
    }
}

fn binary(op: BinaryOp, l: Value, r: Value) -> Result<Value, String> {
    use Value::*;

    let type_error =
        |l: &Value, r: &Value| format!("cannot apply '{}' to {} and {}", op.symbol(), l.value_type(), r.value_type());

    match op {
        BinaryOp::Add => match (&l, &r) {
            (Str(a), b) => Ok(Str(format!("{}{}", a, b))),
            (a, Str(b)) => Ok(Str(format!("{}{}", a, b))),
            _ => arith(op, &l, &r).ok_or_else(|| type_error(&l, &r))?,
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            arith(op, &l, &r).ok_or_else(|| type_error(&l, &r))?
        }
        BinaryOp::Eq => Ok(Bool(values_equal(&l, &r))),
        BinaryOp::Ne => Ok(Bool(!values_equal(&l, &r))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ord = match (&l, &r) {
                (Str(a), Str(b)) => a.partial_cmp(b),
                _ => match (as_f64(&l), as_f64(&r)) {
                    (Some(a), Some(b)) => a.partial_cmp(&b),
                    _ => return Err(type_error(&l, &r)),
                },
            };
            let Some(ord) = ord else {
                return Ok(Bool(false));
            };
            Ok(Bool(match op {
                BinaryOp::Lt => ord.is_lt(),
                BinaryOp::Le => ord.is_le(),
                BinaryOp::Gt => ord.is_gt(),
                _ => ord.is_ge(),
            }))
        }
        BinaryOp::And | BinaryOp::Or => Err(type_error(&l, &r)),
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Int(n) => Some(*n as f64),
        Value::Float(x) => Some(*x),
        _ => None,
    }
}

fn values_equal(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
        _ => l == r,
    }
}

/// 数值运算；非数值返回 `None`，运行错误返回 `Some(Err)`
fn arith(op: BinaryOp, l: &Value, r: &Value) -> Option<Result<Value, String>> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => {
            let (a, b) = (*a, *b);
            let result = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Sub => a.checked_sub(b),
                BinaryOp::Mul => a.checked_mul(b),
                BinaryOp::Div | BinaryOp::Rem if b == 0 => {
                    return Some(Err("division by zero".into()));
                }
                BinaryOp::Div => a.checked_div(b),
                BinaryOp::Rem => a.checked_rem(b),
                _ => return None,
            };
            Some(result.map(Value::Int).ok_or_else(|| "integer overflow".to_string()))
        }
        _ => {
            let (a, b) = (as_f64(l)?, as_f64(r)?);
            let x = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                BinaryOp::Rem => a % b,
                _ => return None,
            };
            Some(Ok(Value::Float(x)))
        }
    }
}
