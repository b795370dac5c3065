//! 编译诊断与严重级别策略

use std::cmp::Ordering;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// 诊断附带的底层错误
pub type Cause = Arc<dyn StdError + Send + Sync>;

/// 稳定的诊断代码
pub mod codes {
    pub const SYNTAX: &str = "SYNTAX";
    pub const BAD_DIRECTIVE: &str = "BAD_DIRECTIVE";
    pub const UNKNOWN_ANNOTATION: &str = "UNKNOWN_ANNOTATION";
    pub const UNKNOWN_TYPE: &str = "UNKNOWN_TYPE";
    pub const HOOK_PARAMETERS: &str = "HOOK_PARAMETERS";
    pub const DUPLICATE_SIGNATURE: &str = "DUPLICATE_SIGNATURE";
    pub const DUPLICATE_VARIABLE: &str = "DUPLICATE_VARIABLE";
    pub const UNRESOLVED_FUNCTION: &str = "UNRESOLVED_FUNCTION";
    pub const UNRESOLVED_NAME: &str = "UNRESOLVED_NAME";
    pub const LIBRARY_DECLARATION: &str = "LIBRARY_DECLARATION";
    pub const DEPENDENCY_UNREADABLE: &str = "DEPENDENCY_UNREADABLE";
    pub const INITIALIZER_FAILED: &str = "INITIALIZER_FAILED";

    pub const UNUSED_VARIABLE: &str = "UNUSED_VARIABLE";
    pub const UNREACHABLE_CODE: &str = "UNREACHABLE_CODE";
    pub const LIBRARY_SHADOWED: &str = "LIBRARY_SHADOWED";
    pub const EMPTY_SURFACE: &str = "EMPTY_SURFACE";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        })
    }
}

/// 源码位置（行列从 1 开始）
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    pub file: String,
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(file: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: &'static str,
    pub message: String,
    pub location: Option<Location>,
    pub cause: Option<Cause>,
}

impl Diagnostic {
    pub fn error(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, code, message)
    }

    pub fn warning(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, code, message)
    }

    fn new(severity: Severity, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            location: None,
            cause: None,
        }
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn caused_by(mut self, cause: Cause) -> Self {
        self.cause = Some(cause);
        self
    }

    /// 排序：无位置的在前，其次按文件、行、列，最后按代码
    fn sort_key_cmp(&self, other: &Self) -> Ordering {
        self.location
            .cmp(&other.location)
            .then_with(|| self.code.cmp(other.code))
            .then_with(|| self.message.cmp(&other.message))
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(
                f,
                "{}: {} [{}] {}",
                loc, self.severity, self.code, self.message
            ),
            None => write!(f, "{} [{}] {}", self.severity, self.code, self.message),
        }
    }
}

/// 哪些诊断会中止加载
///
/// 错误总是致命的；警告可以整体提升、按代码提升，或在没有源码位置时提升。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityPolicy {
    #[serde(default)]
    pub warnings_as_errors: bool,
    #[serde(default)]
    pub promote_unlocated: bool,
    #[serde(default)]
    pub promote: Vec<String>,
}

impl SeverityPolicy {
    pub fn is_fatal(&self, diagnostic: &Diagnostic) -> bool {
        match diagnostic.severity {
            Severity::Error => true,
            Severity::Warning => {
                self.warnings_as_errors
                    || (self.promote_unlocated && diagnostic.location.is_none())
                    || self.promote.iter().any(|c| c == diagnostic.code)
            }
            Severity::Info => false,
        }
    }
}

/// 编译失败：全部致命诊断（已排序）以及第一个底层错误
#[derive(Debug, Clone)]
pub struct CompilationError {
    pub script: String,
    pub diagnostics: Vec<Diagnostic>,
    pub cause: Option<Cause>,
}

impl CompilationError {
    /// 按策略筛选致命诊断；没有致命诊断时返回 `None`
    pub fn from_diagnostics(
        script: &str,
        diagnostics: &[Diagnostic],
        policy: &SeverityPolicy,
    ) -> Option<Self> {
        let mut fatal: Vec<Diagnostic> = diagnostics
            .iter()
            .filter(|d| policy.is_fatal(d))
            .cloned()
            .collect();
        if fatal.is_empty() {
            return None;
        }
        fatal.sort_by(Diagnostic::sort_key_cmp);
        let cause = diagnostics.iter().find_map(|d| d.cause.clone());
        Some(Self {
            script: script.to_string(),
            diagnostics: fatal,
            cause,
        })
    }

    /// 单条诊断构成的错误，总是致命
    pub fn single(script: &str, diagnostic: Diagnostic) -> Self {
        let cause = diagnostic.cause.clone();
        Self {
            script: script.to_string(),
            diagnostics: vec![diagnostic],
            cause,
        }
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.diagnostics.iter().any(|d| d.code == code)
    }
}

impl fmt::Display for CompilationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "script '{}' failed to compile ({} fatal diagnostic{})",
            self.script,
            self.diagnostics.len(),
            if self.diagnostics.len() == 1 { "" } else { "s" }
        )?;
        for d in &self.diagnostics {
            write!(f, "\n  {}", d)?;
        }
        Ok(())
    }
}

impl StdError for CompilationError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_ref()
            .map(|c| &**c as &(dyn StdError + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn located(code: &'static str, line: usize) -> Diagnostic {
        Diagnostic::error(code, "x").at(Location::new("a.ows", line, 1))
    }

    #[test]
    fn errors_always_fatal() {
        let policy = SeverityPolicy::default();
        assert!(policy.is_fatal(&Diagnostic::error(codes::SYNTAX, "bad")));
        assert!(!policy.is_fatal(&Diagnostic::warning(codes::UNUSED_VARIABLE, "x")));
    }

    #[test]
    fn unlocated_warnings_promoted() {
        let policy = SeverityPolicy {
            promote_unlocated: true,
            ..Default::default()
        };
        assert!(policy.is_fatal(&Diagnostic::warning(codes::EMPTY_SURFACE, "empty")));
        let located =
            Diagnostic::warning(codes::UNUSED_VARIABLE, "x").at(Location::new("a.ows", 1, 1));
        assert!(!policy.is_fatal(&located));
    }

    #[test]
    fn promote_by_code() {
        let policy = SeverityPolicy {
            promote: vec![codes::UNREACHABLE_CODE.to_string()],
            ..Default::default()
        };
        assert!(policy.is_fatal(&Diagnostic::warning(codes::UNREACHABLE_CODE, "dead")));
        assert!(!policy.is_fatal(&Diagnostic::warning(codes::UNUSED_VARIABLE, "x")));
    }

    #[test]
    fn fatal_diagnostics_sorted_and_filtered() {
        let diags = vec![
            located(codes::UNRESOLVED_NAME, 9),
            Diagnostic::warning(codes::UNUSED_VARIABLE, "ignored").at(Location::new("a.ows", 1, 1)),
            located(codes::SYNTAX, 2),
            Diagnostic::error(codes::DEPENDENCY_UNREADABLE, "gone"),
        ];
        let err = CompilationError::from_diagnostics("a", &diags, &SeverityPolicy::default())
            .unwrap();
        let order: Vec<&str> = err.diagnostics.iter().map(|d| d.code).collect();
        assert_eq!(
            order,
            vec![
                codes::DEPENDENCY_UNREADABLE,
                codes::SYNTAX,
                codes::UNRESOLVED_NAME
            ]
        );
        assert!(err.to_string().contains("3 fatal diagnostics"));
    }

    #[test]
    fn first_cause_is_kept() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing lib");
        let diags = vec![
            Diagnostic::error(codes::SYNTAX, "bad"),
            Diagnostic::error(codes::DEPENDENCY_UNREADABLE, "lib").caused_by(Arc::new(io)),
        ];
        let err = CompilationError::from_diagnostics("a", &diags, &SeverityPolicy::default())
            .unwrap();
        assert!(err.source().unwrap().to_string().contains("missing lib"));
    }

    #[test]
    fn nothing_fatal() {
        let diags = vec![Diagnostic::warning(codes::UNUSED_VARIABLE, "x")];
        assert!(
            CompilationError::from_diagnostics("a", &diags, &SeverityPolicy::default()).is_none()
        );
    }
}
