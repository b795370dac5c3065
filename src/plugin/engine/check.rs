//! 函数体的语义检查：名称解析、调用解析、未使用变量与不可达代码

use std::collections::{HashMap, HashSet};

use super::ast::*;
use super::builtin_arity;
use super::program::OverloadSet;
use crate::plugin::diagnostic::{codes, Diagnostic, Location};

struct Binding {
    name: String,
    used: bool,
    span: Span,
    is_param: bool,
}

pub struct BodyChecker<'a> {
    file: &'a str,
    symbols: &'a HashMap<String, OverloadSet>,
    globals: &'a HashSet<String>,
    scopes: Vec<Vec<Binding>>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> BodyChecker<'a> {
    pub fn new(
        file: &'a str,
        symbols: &'a HashMap<String, OverloadSet>,
        globals: &'a HashSet<String>,
    ) -> Self {
        Self {
            file,
            symbols,
            globals,
            scopes: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn check_function(mut self, decl: &FunctionDecl) -> Vec<Diagnostic> {
        let params = decl
            .params
            .iter()
            .map(|p| Binding {
                name: p.name.clone(),
                used: false,
                span: p.span,
                is_param: true,
            })
            .collect();
        self.scopes.push(params);
        self.block_in_current_scope(&decl.body);
        self.pop_scope();
        self.diagnostics
    }

    /// 模块变量初始化表达式：只可见之前声明的模块变量
    pub fn check_initializer(mut self, expr: &Expr) -> Vec<Diagnostic> {
        self.expr(expr);
        self.diagnostics
    }

    fn loc(&self, span: Span) -> Location {
        Location::new(self.file, span.line, span.column)
    }

    fn pop_scope(&mut self) {
        let Some(scope) = self.scopes.pop() else {
            return;
        };
        for b in scope {
            if !b.used && !b.is_param && !b.name.starts_with('_') {
                let d = Diagnostic::warning(
                    codes::UNUSED_VARIABLE,
                    format!("variable '{}' is never read", b.name),
                )
                .at(self.loc(b.span));
                self.diagnostics.push(d);
            }
        }
    }

    fn block(&mut self, block: &Block) {
        self.scopes.push(Vec::new());
        self.block_in_current_scope(block);
        self.pop_scope();
    }

    fn block_in_current_scope(&mut self, block: &Block) {
        let mut diverged = false;
        let mut reported = false;
        for stmt in block {
            if diverged && !reported {
                let d = Diagnostic::warning(codes::UNREACHABLE_CODE, "unreachable statement")
                    .at(self.loc(stmt.span));
                self.diagnostics.push(d);
                reported = true;
            }
            self.stmt(stmt);
            diverged |= stmt.kind.diverges();
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Let { name, value } => {
                self.expr(value);
                let scope = self.scopes.last_mut();
                if let Some(scope) = scope {
                    if scope.iter().any(|b| b.name == *name) {
                        let d = Diagnostic::error(
                            codes::DUPLICATE_VARIABLE,
                            format!("variable '{}' is already declared in this scope", name),
                        )
                        .at(Location::new(self.file, stmt.span.line, stmt.span.column));
                        self.diagnostics.push(d);
                    } else {
                        scope.push(Binding {
                            name: name.clone(),
                            used: false,
                            span: stmt.span,
                            is_param: false,
                        });
                    }
                }
            }
            StmtKind::Set { name, value } => {
                self.expr(value);
                if !self.is_local(name) && !self.globals.contains(name) {
                    self.unresolved_name(name, stmt.span);
                }
            }
            StmtKind::Log(e) | StmtKind::Emit(e) | StmtKind::Fail(e) | StmtKind::Expr(e) => {
                self.expr(e)
            }
            StmtKind::Return(value) => {
                if let Some(e) = value {
                    self.expr(e);
                }
            }
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                self.expr(cond);
                self.block(then);
                if let Some(otherwise) = otherwise {
                    self.block(otherwise);
                }
            }
        }
    }

    fn is_local(&self, name: &str) -> bool {
        self.scopes
            .iter()
            .any(|scope| scope.iter().any(|b| b.name == name))
    }

    /// 标记最内层同名绑定为已使用
    fn mark_used(&mut self, name: &str) -> bool {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(b) = scope.iter_mut().rev().find(|b| b.name == name) {
                b.used = true;
                return true;
            }
        }
        false
    }

    fn unresolved_name(&mut self, name: &str, span: Span) {
        let d = Diagnostic::error(codes::UNRESOLVED_NAME, format!("unresolved name '{}'", name))
            .at(self.loc(span));
        self.diagnostics.push(d);
    }

    fn expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Literal(_) => {}
            ExprKind::Name(name) => {
                if !self.mark_used(name) && !self.globals.contains(name) {
                    self.unresolved_name(name, expr.span);
                }
            }
            ExprKind::Call { name, args } => {
                for a in args {
                    self.expr(a);
                }
                let arity = args.len();
                let resolved = match self.symbols.get(name) {
                    Some(set) => set.has_arity(arity),
                    None => false,
                } || builtin_arity(name) == Some(arity);
                if !resolved {
                    let message = if self.symbols.contains_key(name) || builtin_arity(name).is_some()
                    {
                        format!("no overload of '{}' takes {} argument(s)", name, arity)
                    } else {
                        format!("unresolved function '{}'", name)
                    };
                    let d = Diagnostic::error(codes::UNRESOLVED_FUNCTION, message)
                        .at(self.loc(expr.span));
                    self.diagnostics.push(d);
                }
            }
            ExprKind::Unary { expr: inner, .. } => self.expr(inner),
            ExprKind::Binary { lhs, rhs, .. } => {
                self.expr(lhs);
                self.expr(rhs);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::engine::parser::parse;
    use crate::plugin::value::{Signature, ValueType};

    fn check(src: &str, symbols: &HashMap<String, OverloadSet>) -> Vec<Diagnostic> {
        let unit = parse(src).unwrap();
        let globals: HashSet<String> = unit
            .items
            .iter()
            .filter_map(|i| match i {
                Item::Global { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect();
        let mut out = Vec::new();
        for item in &unit.items {
            if let Item::Function(f) = item {
                out.extend(BodyChecker::new("t.ows", symbols, &globals).check_function(f));
            }
        }
        out
    }

    fn codes_of(diags: &[Diagnostic]) -> Vec<&'static str> {
        diags.iter().map(|d| d.code).collect()
    }

    #[test]
    fn clean_function() {
        let diags = check(
            "var hits = 0\nfn f(n: int) { let x = n + 1\n set hits = hits + x\n log str(x) }",
            &HashMap::new(),
        );
        assert!(diags.is_empty(), "{:?}", diags);
    }

    #[test]
    fn unresolved_names_and_functions() {
        let diags = check("fn f() { log y\n nope(1)\n set z = 1 }", &HashMap::new());
        assert_eq!(
            codes_of(&diags),
            vec![
                codes::UNRESOLVED_NAME,
                codes::UNRESOLVED_FUNCTION,
                codes::UNRESOLVED_NAME
            ]
        );
        assert_eq!(diags[0].location.as_ref().unwrap().line, 1);
        assert_eq!(diags[1].location.as_ref().unwrap().line, 2);
    }

    #[test]
    fn call_arity_checked_against_symbols() {
        let mut symbols = HashMap::new();
        let mut set = OverloadSet::default();
        set.insert(Signature(vec![ValueType::Int]), 0);
        symbols.insert("twice".to_string(), set);

        assert!(check("fn f() { twice(2) }", &symbols).is_empty());
        let diags = check("fn f() { twice(2, 3) }", &symbols);
        assert_eq!(codes_of(&diags), vec![codes::UNRESOLVED_FUNCTION]);
        assert!(diags[0].message.contains("2 argument"));
    }

    #[test]
    fn unused_and_unreachable() {
        let diags = check(
            "fn f() {\n let unused = 1\n let _quiet = 2\n return\n log 3\n log 4\n}",
            &HashMap::new(),
        );
        assert_eq!(
            codes_of(&diags),
            vec![codes::UNREACHABLE_CODE, codes::UNUSED_VARIABLE]
        );
        assert_eq!(diags[0].location.as_ref().unwrap().line, 5);
    }

    #[test]
    fn duplicate_let_in_same_scope() {
        let diags = check("fn f() { let a = 1\n let a = 2\n log a }", &HashMap::new());
        assert_eq!(codes_of(&diags), vec![codes::DUPLICATE_VARIABLE]);
    }

    #[test]
    fn shadowing_in_nested_block_allowed() {
        let diags = check(
            "fn f(a: int) { if a > 0 { let a = 2\n log a } }",
            &HashMap::new(),
        );
        assert!(diags.is_empty(), "{:?}", diags);
    }

    #[test]
    fn block_scoped_bindings_do_not_leak() {
        let diags = check("fn f() { if true { let a = 1\n log a }\n log a }", &HashMap::new());
        assert_eq!(codes_of(&diags), vec![codes::UNRESOLVED_NAME]);
    }
}
