//! 依赖坐标与源码预扫描

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::plugin::diagnostic::{codes, CompilationError, Diagnostic, Location};

/// 依赖坐标
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Coordinate {
    /// `group:artifact:version`
    Artifact {
        group: String,
        artifact: String,
        version: String,
    },
    /// 相对脚本目录（或绝对）的本地文件
    File(PathBuf),
}

fn artifact_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9_\-]+(?:\.[A-Za-z0-9_\-]+)*):([A-Za-z0-9_.\-]+):([A-Za-z0-9_.+\-]+)$")
            .unwrap_or_else(|e| unreachable!("artifact pattern: {}", e))
    })
}

fn directive_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^\s*@(repository|depends)\b\s*(?:"([^"\\]*)")?\s*(?:(?:#|//).*)?$"#)
            .unwrap_or_else(|e| unreachable!("directive pattern: {}", e))
    })
}

impl Coordinate {
    pub fn parse(text: &str) -> Result<Self, String> {
        let text = text.trim();
        if text.is_empty() {
            return Err("empty coordinate".into());
        }
        if text.contains('/') || text.ends_with(".ows") {
            return Ok(Coordinate::File(PathBuf::from(text)));
        }
        let caps = artifact_pattern()
            .captures(text)
            .ok_or_else(|| format!("'{}' is not of the form group:artifact:version", text))?;
        // artifact 与 version 是缓存目录下的路径段
        if [&caps[2], &caps[3]].iter().any(|seg| *seg == "." || *seg == "..") {
            return Err(format!("'{}' contains a '.' or '..' path segment", text));
        }
        Ok(Coordinate::Artifact {
            group: caps[1].to_string(),
            artifact: caps[2].to_string(),
            version: caps[3].to_string(),
        })
    }

    /// 仓库与本地缓存共用的相对路径布局
    pub fn artifact_path(&self) -> Option<PathBuf> {
        match self {
            Coordinate::Artifact {
                group,
                artifact,
                version,
            } => {
                let mut path: PathBuf = group.split('.').collect();
                path.push(artifact);
                path.push(version);
                path.push(format!("{}-{}.ows", artifact, version));
                Some(path)
            }
            Coordinate::File(_) => None,
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Coordinate::Artifact {
                group,
                artifact,
                version,
            } => write!(f, "{}:{}:{}", group, artifact, version),
            Coordinate::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// 脚本声明的仓库与依赖，声明顺序，已去重
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptDependencies {
    pub repositories: Vec<String>,
    pub coordinates: Vec<Coordinate>,
}

impl ScriptDependencies {
    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }
}

/// 编译前的预扫描：逐行提取 `@repository` / `@depends` 指令
///
/// 格式错误的指令作为 `BAD_DIRECTIVE` 编译错误返回。
pub fn extract(
    script: &str,
    file: &Path,
    source: &str,
) -> Result<ScriptDependencies, CompilationError> {
    let display = file.display().to_string();
    let mut deps = ScriptDependencies::default();
    let mut diagnostics = Vec::new();

    for (idx, line) in source.lines().enumerate() {
        let trimmed = line.trim_start();
        let Some(rest) = trimmed
            .strip_prefix("@repository")
            .or_else(|| trimmed.strip_prefix("@depends"))
        else {
            continue;
        };
        // 例如 `@dependsOn`：不是依赖指令，交给编译器
        if rest.starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_') {
            continue;
        }
        let column = line.len() - trimmed.len() + 1;
        let loc = Location::new(&display, idx + 1, column);
        let Some(caps) = directive_pattern().captures(line) else {
            diagnostics.push(
                Diagnostic::error(codes::BAD_DIRECTIVE, "directive expects one string literal")
                    .at(loc),
            );
            continue;
        };
        let Some(value) = caps.get(2).map(|m| m.as_str()) else {
            diagnostics.push(
                Diagnostic::error(
                    codes::BAD_DIRECTIVE,
                    format!("@{} expects one string literal", &caps[1]),
                )
                .at(loc),
            );
            continue;
        };

        match &caps[1] {
            "repository" => {
                let url = value.trim_end_matches('/');
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    diagnostics.push(
                        Diagnostic::error(
                            codes::BAD_DIRECTIVE,
                            format!("repository '{}' must be an http(s) URL", value),
                        )
                        .at(loc),
                    );
                } else if !deps.repositories.iter().any(|r| r == url) {
                    deps.repositories.push(url.to_string());
                }
            }
            _ => match Coordinate::parse(value) {
                Ok(coord) => {
                    if !deps.coordinates.contains(&coord) {
                        deps.coordinates.push(coord);
                    }
                }
                Err(message) => {
                    diagnostics.push(Diagnostic::error(codes::BAD_DIRECTIVE, message).at(loc))
                }
            },
        }
    }

    if diagnostics.is_empty() {
        return Ok(deps);
    }
    Err(CompilationError {
        script: script.to_string(),
        diagnostics,
        cause: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_coordinates() {
        assert_eq!(
            Coordinate::parse("net.example:greetings:1.2.0").unwrap(),
            Coordinate::Artifact {
                group: "net.example".into(),
                artifact: "greetings".into(),
                version: "1.2.0".into(),
            }
        );
        assert_eq!(
            Coordinate::parse("lib/util.ows").unwrap(),
            Coordinate::File(PathBuf::from("lib/util.ows"))
        );
        assert_eq!(
            Coordinate::parse("shared.ows").unwrap(),
            Coordinate::File(PathBuf::from("shared.ows"))
        );
        assert!(Coordinate::parse("just-a-name").is_err());
        assert!(Coordinate::parse("a:b").is_err());
        assert!(Coordinate::parse("a::c").is_err());
        assert!(Coordinate::parse("").is_err());
    }

    #[test]
    fn dot_segments_rejected() {
        for text in ["evil:..:..", "evil:..:1.0", "evil:x:..", "evil:.:1.0", "evil:x:."] {
            let err = Coordinate::parse(text).unwrap_err();
            assert!(err.contains("path segment"), "{}: {}", text, err);
        }
        // 含点但不是 `.`/`..` 的段仍然合法
        let c = Coordinate::parse("net.example:a..b:1.0..2").unwrap();
        let path = c.artifact_path().unwrap();
        assert!(path
            .components()
            .all(|part| matches!(part, std::path::Component::Normal(_))));
    }

    #[test]
    fn artifact_layout() {
        let c = Coordinate::parse("net.example:greetings:1.2.0").unwrap();
        assert_eq!(
            c.artifact_path().unwrap(),
            PathBuf::from("net/example/greetings/1.2.0/greetings-1.2.0.ows")
        );
        assert_eq!(c.to_string(), "net.example:greetings:1.2.0");
    }

    #[test]
    fn extract_directives_in_order_without_duplicates() {
        let source = r#"
@repository "https://repo.example.com/scripts/"
  @depends "net.example:greetings:1.2.0"   # greetings
@depends "lib/util.ows"
@depends "net.example:greetings:1.2.0"

fn main() { }
"#;
        let deps = extract("demo", Path::new("demo.ows"), source).unwrap();
        assert_eq!(deps.repositories, vec!["https://repo.example.com/scripts"]);
        assert_eq!(deps.coordinates.len(), 2);
        assert_eq!(deps.coordinates[1], Coordinate::File(PathBuf::from("lib/util.ows")));
    }

    #[test]
    fn malformed_directives_are_located() {
        let source = "@depends \"nope\"\n@repository \"ftp://x\"\n@depends\n@entrypoint\nfn f() { }";
        let err = extract("demo", Path::new("demo.ows"), source).unwrap_err();
        let lines: Vec<usize> = err
            .diagnostics
            .iter()
            .map(|d| {
                assert_eq!(d.code, codes::BAD_DIRECTIVE);
                d.location.as_ref().unwrap().line
            })
            .collect();
        assert_eq!(lines, vec![1, 2, 3]);
    }

    #[test]
    fn similar_annotations_are_ignored() {
        let deps = extract("demo", Path::new("demo.ows"), "@dependsOn\nfn f() { }").unwrap();
        assert!(deps.is_empty());
    }
}
