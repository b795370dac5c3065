//! 依赖解析后端：本地文件、本地缓存、远程仓库

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

use super::coordinate::Coordinate;

/// 单个脚本的解析上下文
#[derive(Debug, Clone)]
pub struct ResolveContext<'a> {
    /// 文件坐标的相对基准
    pub script_dir: &'a Path,
    /// 脚本自身声明的仓库
    pub repositories: &'a [String],
}

/// 解析后端
///
/// `Ok(None)` 表示该后端不处理这类坐标；`Err` 为失败原因。
pub trait ResolutionBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn resolve(
        &self,
        coordinate: &Coordinate,
        ctx: &ResolveContext<'_>,
    ) -> Result<Option<PathBuf>, String>;
}

/// 文件坐标，相对脚本目录
#[derive(Debug, Default, Clone, Copy)]
pub struct FileSystemBackend;

impl ResolutionBackend for FileSystemBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    fn resolve(
        &self,
        coordinate: &Coordinate,
        ctx: &ResolveContext<'_>,
    ) -> Result<Option<PathBuf>, String> {
        let Coordinate::File(path) = coordinate else {
            return Ok(None);
        };
        let full = if path.is_absolute() {
            path.clone()
        } else {
            ctx.script_dir.join(path)
        };
        if full.is_file() {
            Ok(Some(full))
        } else {
            Err(format!("{} does not exist", full.display()))
        }
    }
}

/// 本地缓存：`<cache>/<group 路径>/<artifact>/<version>/<artifact>-<version>.ows`
#[derive(Debug, Clone)]
pub struct LocalCacheBackend {
    root: PathBuf,
}

impl LocalCacheBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ResolutionBackend for LocalCacheBackend {
    fn name(&self) -> &'static str {
        "cache"
    }

    fn resolve(
        &self,
        coordinate: &Coordinate,
        _ctx: &ResolveContext<'_>,
    ) -> Result<Option<PathBuf>, String> {
        let Some(relative) = coordinate.artifact_path() else {
            return Ok(None);
        };
        let path = self.root.join(relative);
        if path.is_file() {
            Ok(Some(path))
        } else {
            Err(format!("not cached at {}", path.display()))
        }
    }
}

/// 远程仓库：下载到本地缓存后返回缓存路径
///
/// 依次尝试脚本声明的仓库和配置的默认仓库。请求不设超时。
#[derive(Debug, Clone)]
pub struct RepositoryBackend {
    cache: PathBuf,
    defaults: Vec<String>,
    offline: bool,
}

impl RepositoryBackend {
    pub fn new(cache: impl Into<PathBuf>, defaults: Vec<String>, offline: bool) -> Self {
        Self {
            cache: cache.into(),
            defaults: defaults
                .into_iter()
                .map(|r| r.trim_end_matches('/').to_string())
                .collect(),
            offline,
        }
    }

    fn fetch(
        &self,
        client: &reqwest::blocking::Client,
        repository: &str,
        relative: &Path,
    ) -> Result<PathBuf, String> {
        let url_path: Vec<String> = relative
            .iter()
            .map(|c| c.to_string_lossy().into_owned())
            .collect();
        let url = format!("{}/{}", repository, url_path.join("/"));

        let response = client
            .get(&url)
            .send()
            .map_err(|e| format!("HTTP request failed: {}", e))?;
        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }
        let body = response
            .bytes()
            .map_err(|e| format!("failed to read response body: {}", e))?;

        if let Some(expected) = fetch_checksum(client, &url) {
            let actual = hex_digest(&body);
            if !expected.eq_ignore_ascii_case(&actual) {
                return Err(format!(
                    "checksum mismatch (expected {}, got {})",
                    expected, actual
                ));
            }
        }

        let dest = self.cache.join(relative);
        write_atomic(&dest, &body).map_err(|e| {
            format!("failed to write cache file {}: {}", dest.display(), e)
        })?;
        info!(url = url.as_str(), path = %dest.display(), "dependency downloaded and cached");
        Ok(dest)
    }
}

impl ResolutionBackend for RepositoryBackend {
    fn name(&self) -> &'static str {
        "repository"
    }

    fn resolve(
        &self,
        coordinate: &Coordinate,
        ctx: &ResolveContext<'_>,
    ) -> Result<Option<PathBuf>, String> {
        let Some(relative) = coordinate.artifact_path() else {
            return Ok(None);
        };
        if self.offline {
            return Err("offline mode".into());
        }

        let mut repositories: Vec<&str> = Vec::new();
        for repo in ctx.repositories.iter().chain(self.defaults.iter()) {
            if !repositories.contains(&repo.as_str()) {
                repositories.push(repo);
            }
        }
        if repositories.is_empty() {
            return Err("no repositories declared".into());
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(None::<std::time::Duration>)
            .build()
            .map_err(|e| format!("failed to build HTTP client: {}", e))?;

        let mut reasons = Vec::with_capacity(repositories.len());
        for repo in repositories {
            match self.fetch(&client, repo, &relative) {
                Ok(path) => return Ok(Some(path)),
                Err(reason) => {
                    debug!(repository = repo, %coordinate, reason = reason.as_str(), "repository miss");
                    reasons.push(format!("{}: {}", repo, reason));
                }
            }
        }
        Err(reasons.join("; "))
    }
}

/// 仓库提供 `<url>.sha256` 时返回其中的摘要
fn fetch_checksum(client: &reqwest::blocking::Client, url: &str) -> Option<String> {
    let response = client.get(format!("{}.sha256", url)).send().ok()?;
    if !response.status().is_success() {
        return None;
    }
    let text = response.text().ok()?;
    text.split_whitespace().next().map(str::to_string)
}

fn hex_digest(data: &[u8]) -> String {
    Sha256::digest(data)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// 先写临时文件再 rename，读者不会看到半个文件
fn write_atomic(dest: &Path, data: &[u8]) -> std::io::Result<()> {
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;
    let file_name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = parent.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));
    fs::write(&tmp, data)?;
    if let Err(e) = fs::rename(&tmp, dest) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(dir: &'a Path, repos: &'a [String]) -> ResolveContext<'a> {
        ResolveContext {
            script_dir: dir,
            repositories: repos,
        }
    }

    #[test]
    fn file_backend_relative_to_script_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("lib")).unwrap();
        fs::write(dir.path().join("lib/util.ows"), "fn f() { }").unwrap();

        let found = FileSystemBackend
            .resolve(&Coordinate::File("lib/util.ows".into()), &ctx(dir.path(), &[]))
            .unwrap();
        assert_eq!(found, Some(dir.path().join("lib/util.ows")));

        let missing = FileSystemBackend.resolve(&Coordinate::File("nope.ows".into()), &ctx(dir.path(), &[]));
        assert!(missing.unwrap_err().contains("does not exist"));

        let artifact = Coordinate::parse("a.b:c:1").unwrap();
        assert_eq!(FileSystemBackend.resolve(&artifact, &ctx(dir.path(), &[])), Ok(None));
    }

    #[test]
    fn cache_backend_layout() {
        let dir = tempfile::tempdir().unwrap();
        let coord = Coordinate::parse("net.example:greetings:1.2.0").unwrap();
        let backend = LocalCacheBackend::new(dir.path());
        assert!(backend.resolve(&coord, &ctx(dir.path(), &[])).is_err());

        let path = dir.path().join(coord.artifact_path().unwrap());
        write_atomic(&path, b"fn hi() { }").unwrap();
        assert_eq!(backend.resolve(&coord, &ctx(dir.path(), &[])), Ok(Some(path)));
    }

    #[test]
    fn repository_backend_offline() {
        let dir = tempfile::tempdir().unwrap();
        let backend = RepositoryBackend::new(dir.path(), vec!["http://127.0.0.1:9".into()], true);
        let coord = Coordinate::parse("a.b:c:1").unwrap();
        assert_eq!(
            backend.resolve(&coord, &ctx(dir.path(), &[])),
            Err("offline mode".to_string())
        );
    }

    #[test]
    fn repository_backend_without_repositories() {
        let dir = tempfile::tempdir().unwrap();
        let backend = RepositoryBackend::new(dir.path(), Vec::new(), false);
        let coord = Coordinate::parse("a.b:c:1").unwrap();
        assert!(backend
            .resolve(&coord, &ctx(dir.path(), &[]))
            .unwrap_err()
            .contains("no repositories"));
    }

    #[test]
    fn digest_is_lowercase_hex() {
        assert_eq!(
            hex_digest(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
