//! 脚本编译器
//!
//! 把脚本源码与已解析的依赖库编译、链接为 [`ScriptInstance`]。
//! 所有诊断先收集，再由 [`SeverityPolicy`] 决定是否中止加载。

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use super::diagnostic::{
    codes, CompilationError, Diagnostic, Location, Severity, SeverityPolicy,
};
use super::engine::ast::{Expr, FunctionDecl, Item, SourceUnit};
use super::engine::check::BodyChecker;
use super::engine::parser::{parse, ParseError};
use super::engine::program::{CompiledFunction, Linkage, OverloadSet, Program};
use super::host_api::ScriptHost;
use super::instance::ScriptInstance;
use super::value::{Signature, ValueType};

const ENTRYPOINT: &str = "entrypoint";
const DESTRUCTOR: &str = "destructor";
const DIRECTIVES: [&str; 2] = ["repository", "depends"];

/// 待编译的脚本
#[derive(Debug, Clone, Copy)]
pub struct ModuleSource<'a> {
    /// 脚本名（不含后缀与禁用标记）
    pub name: &'a str,
    /// 诊断中显示的文件名
    pub file: &'a str,
    pub source: &'a str,
}

/// 编译成功的结果，附带未达到致命级别的诊断
#[derive(Debug)]
pub struct Compilation {
    pub program: Program,
    pub warnings: Vec<Diagnostic>,
}

/// 编译并实例化脚本
///
/// 模块变量初始化失败同样是编译错误（`INITIALIZER_FAILED`）。
pub fn load(
    module: ModuleSource<'_>,
    classpath: &[PathBuf],
    policy: &SeverityPolicy,
    host: Arc<dyn ScriptHost>,
) -> Result<(ScriptInstance, Vec<Diagnostic>), CompilationError> {
    let Compilation { program, warnings } = compile(module, classpath, policy)?;
    let instance = ScriptInstance::instantiate(program, module.file, host)?;
    Ok((instance, warnings))
}

/// 编译、链接，不执行任何脚本代码
pub fn compile(
    module: ModuleSource<'_>,
    classpath: &[PathBuf],
    policy: &SeverityPolicy,
) -> Result<Compilation, CompilationError> {
    let mut diagnostics = Vec::new();
    let unit = match parse(module.source) {
        Ok(unit) => Some(unit),
        Err(e) => {
            diagnostics.push(syntax(module.file, e));
            None
        }
    };

    let mut libraries = Vec::with_capacity(classpath.len());
    for path in classpath {
        let file = path.display().to_string();
        match fs::read_to_string(path) {
            Ok(source) => match parse(&source) {
                Ok(unit) => libraries.push((file, unit)),
                Err(e) => diagnostics.push(syntax(&file, e)),
            },
            Err(e) => diagnostics.push(
                Diagnostic::error(
                    codes::DEPENDENCY_UNREADABLE,
                    format!("cannot read dependency {}: {}", file, e),
                )
                .caused_by(Arc::new(e)),
            ),
        }
    }

    let mut linker = Linker::new(module.name, diagnostics);
    if let Some(unit) = &unit {
        linker.add_module(module.file, unit);
    }
    for (file, unit) in &libraries {
        linker.add_library(file, unit);
    }

    let (program, diagnostics) = linker.finish();
    if let Some(err) = CompilationError::from_diagnostics(module.name, &diagnostics, policy) {
        return Err(err);
    }
    Ok(Compilation {
        program,
        warnings: diagnostics,
    })
}

fn syntax(file: &str, e: ParseError) -> Diagnostic {
    Diagnostic::error(codes::SYNTAX, e.message).at(Location::new(file, e.line, e.column))
}

/// 已声明、待检查函数体的函数
struct Pending<'u> {
    file: String,
    decl: &'u FunctionDecl,
}

struct Linker<'u> {
    program: Program,
    module: Vec<Pending<'u>>,
    library: Vec<Pending<'u>>,
    global_inits: Vec<(String, &'u str, &'u Expr)>,
    global_names: HashSet<String>,
    diagnostics: Vec<Diagnostic>,
}

impl<'u> Linker<'u> {
    fn new(script: &str, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            program: Program {
                script: script.to_string(),
                ..Default::default()
            },
            module: Vec::new(),
            library: Vec::new(),
            global_inits: Vec::new(),
            global_names: HashSet::new(),
            diagnostics,
        }
    }

    fn push(&mut self, d: Diagnostic) {
        self.diagnostics.push(d);
    }

    fn add_module(&mut self, file: &str, unit: &'u SourceUnit) {
        for item in &unit.items {
            match item {
                Item::Directive { name, span, .. } => {
                    if !DIRECTIVES.contains(&name.as_str()) {
                        self.push(
                            Diagnostic::error(
                                codes::BAD_DIRECTIVE,
                                format!("unknown directive '@{}'", name),
                            )
                            .at(Location::new(file, span.line, span.column)),
                        );
                    }
                }
                Item::Global { name, init, span } => {
                    if !self.global_names.insert(name.clone()) {
                        self.push(
                            Diagnostic::error(
                                codes::DUPLICATE_VARIABLE,
                                format!("module variable '{}' is already declared", name),
                            )
                            .at(Location::new(file, span.line, span.column)),
                        );
                    } else {
                        self.global_inits.push((file.to_string(), name.as_str(), init));
                    }
                }
                Item::Function(decl) => self.module.push(Pending {
                    file: file.to_string(),
                    decl,
                }),
            }
        }
    }

    fn add_library(&mut self, file: &str, unit: &'u SourceUnit) {
        for item in &unit.items {
            let (what, span) = match item {
                Item::Function(decl) if decl.annotations.is_empty() => {
                    self.library.push(Pending {
                        file: file.to_string(),
                        decl,
                    });
                    continue;
                }
                Item::Function(decl) => ("annotated function", decl.annotations[0].span),
                Item::Directive { span, .. } => ("directive", *span),
                Item::Global { span, .. } => ("module variable", *span),
            };
            self.push(
                Diagnostic::error(
                    codes::LIBRARY_DECLARATION,
                    format!("dependencies may only declare plain functions, found {}", what),
                )
                .at(Location::new(file, span.line, span.column)),
            );
        }
    }

    /// 解析参数类型并登记函数；类型无效时不登记
    fn declare(&mut self, pending: &Pending<'u>, linkage: Linkage) -> Option<usize> {
        let decl = pending.decl;
        let mut params = Vec::with_capacity(decl.params.len());
        let mut ok = true;
        for p in &decl.params {
            match ValueType::from_keyword(&p.type_name) {
                Some(t) => params.push((p.name.clone(), t)),
                None => {
                    ok = false;
                    self.push(
                        Diagnostic::error(
                            codes::UNKNOWN_TYPE,
                            format!(
                                "unknown type '{}' for parameter '{}'",
                                p.type_name, p.name
                            ),
                        )
                        .at(Location::new(&pending.file, p.span.line, p.span.column)),
                    );
                }
            }
        }
        if !ok {
            return None;
        }

        let signature = Signature(params.iter().map(|(_, t)| *t).collect());
        let id = self.program.functions.len();
        let symbols = match linkage {
            Linkage::Module => &mut self.program.capabilities.callables,
            Linkage::Library => &mut self.program.library_symbols,
        };
        if !symbols
            .entry(decl.name.clone())
            .or_default()
            .insert(signature.clone(), id)
        {
            let d = Diagnostic::error(
                codes::DUPLICATE_SIGNATURE,
                format!("function {}{} is already declared", decl.name, signature),
            )
            .at(Location::new(&pending.file, decl.span.line, decl.span.column));
            self.push(d);
            return None;
        }

        self.program.functions.push(CompiledFunction {
            name: decl.name.clone(),
            params,
            signature,
            body: decl.body.clone(),
            linkage,
            origin: pending.file.clone(),
            span: decl.span,
        });
        Some(id)
    }

    fn hooks(&mut self, pending: &Pending<'u>, id: Option<usize>) {
        let decl = pending.decl;
        for a in &decl.annotations {
            let loc = Location::new(&pending.file, a.span.line, a.span.column);
            let activation = match a.name.as_str() {
                ENTRYPOINT => true,
                DESTRUCTOR => false,
                other => {
                    self.push(
                        Diagnostic::error(
                            codes::UNKNOWN_ANNOTATION,
                            format!("unknown annotation '@{}'", other),
                        )
                        .at(loc),
                    );
                    continue;
                }
            };
            if !decl.params.is_empty() {
                self.push(
                    Diagnostic::error(
                        codes::HOOK_PARAMETERS,
                        format!("@{} function '{}' must take no parameters", a.name, decl.name),
                    )
                    .at(loc),
                );
                continue;
            }
            let caps = &mut self.program.capabilities;
            let hooks = if activation {
                &mut caps.activation_hooks
            } else {
                &mut caps.deactivation_hooks
            };
            if let Some(id) = id {
                if !hooks.contains(&id) {
                    hooks.push(id);
                }
            }
        }
    }

    fn finish(mut self) -> (Program, Vec<Diagnostic>) {
        let module = std::mem::take(&mut self.module);
        let library = std::mem::take(&mut self.library);

        for pending in &module {
            let id = self.declare(pending, Linkage::Module);
            self.hooks(pending, id);
        }
        for pending in &library {
            self.declare(pending, Linkage::Library);
        }
        self.link();

        if self.program.capabilities.is_empty() && !self.has_errors() {
            self.push(Diagnostic::warning(
                codes::EMPTY_SURFACE,
                format!(
                    "script '{}' exposes no hooks or callables",
                    self.program.script
                ),
            ));
        }

        self.check_bodies(&module, &library);
        (self.program, self.diagnostics)
    }

    fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// 模块符号表 = 脚本函数 + 未被遮蔽的依赖库函数
    fn link(&mut self) {
        let mut symbols: HashMap<String, OverloadSet> = self.program.capabilities.callables.clone();
        let mut shadowed = Vec::new();
        for (name, set) in &self.program.library_symbols {
            for (sig, id) in set.iter() {
                let slot = symbols.entry(name.clone()).or_default();
                if !slot.insert(sig.clone(), id) {
                    shadowed.push(id);
                }
            }
        }
        shadowed.sort_unstable();
        for id in shadowed {
            let f = &self.program.functions[id];
            let d = Diagnostic::warning(
                codes::LIBRARY_SHADOWED,
                format!(
                    "{}{} from {} is shadowed by the script's own definition",
                    f.name, f.signature, f.origin
                ),
            )
            .at(Location::new(&f.origin, f.span.line, f.span.column));
            self.diagnostics.push(d);
        }
        self.program.module_symbols = symbols;
    }

    fn check_bodies(&mut self, module: &[Pending<'u>], library: &[Pending<'u>]) {
        // 初始化表达式只能引用之前声明的模块变量
        let mut visible = HashSet::new();
        let mut inits = Vec::new();
        for (file, name, init) in &self.global_inits {
            let diags = BodyChecker::new(file, &self.program.module_symbols, &visible)
                .check_initializer(init);
            self.diagnostics.extend(diags);
            visible.insert(name.to_string());
            inits.push((name.to_string(), (*init).clone()));
        }
        self.program.globals = inits;

        let no_globals = HashSet::new();
        for pending in module {
            let diags = BodyChecker::new(
                &pending.file,
                &self.program.module_symbols,
                &self.global_names,
            )
            .check_function(pending.decl);
            self.diagnostics.extend(diags);
        }
        for pending in library {
            let diags = BodyChecker::new(&pending.file, &self.program.library_symbols, &no_globals)
                .check_function(pending.decl);
            self.diagnostics.extend(diags);
        }
    }
}
