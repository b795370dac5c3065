//! 依赖解析：本地文件、远程仓库下载、校验和与本地缓存

use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::Path;
use std::sync::{Arc, Mutex};

use openworld_scripting::config::ScriptingConfig;
use openworld_scripting::plugin::{ScriptManager, ScriptingError, Value};
use sha2::{Digest, Sha256};

const GREETINGS: &str = "fn salute(name: string) { return \"greetings, \" + name }";
const ARTIFACT: &str = "/net/example/greetings/1.2.0/greetings-1.2.0.ows";

/// 极简 HTTP 仓库：按路径返回固定内容，其余 404
struct Repository {
    url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl Repository {
    fn serve(files: HashMap<String, String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();

        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut request_line = String::new();
                if reader.read_line(&mut request_line).is_err() {
                    continue;
                }
                loop {
                    let mut header = String::new();
                    match reader.read_line(&mut header) {
                        Ok(0) => break,
                        Ok(_) if header == "\r\n" || header == "\n" => break,
                        Ok(_) => {}
                        Err(_) => break,
                    }
                }
                let path = request_line
                    .split_whitespace()
                    .nth(1)
                    .unwrap_or("/")
                    .to_string();
                seen.lock().unwrap().push(path.clone());

                let response = match files.get(&path) {
                    Some(body) => format!(
                        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    ),
                    None => "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                        .to_string(),
                };
                let _ = stream.write_all(response.as_bytes());
                let _ = stream.flush();
            }
        });

        Self { url, requests }
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

fn sha256_hex(data: &str) -> String {
    Sha256::digest(data.as_bytes())
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn write_script(root: &Path, file: &str, source: &str) {
    let dir = root.join("scripts");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(file), source).unwrap();
}

fn manager(root: &Path, offline: bool) -> ScriptManager {
    let config = ScriptingConfig {
        offline,
        ..Default::default()
    };
    ScriptManager::new(&config, root)
}

fn caller(repository: &str) -> String {
    format!(
        "@repository \"{}\"\n@depends \"net.example:greetings:1.2.0\"\n\
         fn hello(name: string) {{ return salute(name) }}",
        repository
    )
}

#[test]
fn downloads_verifies_and_caches_artifact() {
    let mut files = HashMap::new();
    files.insert(ARTIFACT.to_string(), GREETINGS.to_string());
    files.insert(
        format!("{}.sha256", ARTIFACT),
        format!("{}  greetings-1.2.0.ows\n", sha256_hex(GREETINGS)),
    );
    let repo = Repository::serve(files);

    let root = tempfile::tempdir().unwrap();
    write_script(root.path(), "caller.ows", &caller(&repo.url));

    let mgr = manager(root.path(), false);
    let report = mgr.scan_and_load_all().unwrap();
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert_eq!(
        mgr.invoke("caller", "hello", vec![Value::from("Ada")]).unwrap(),
        Value::from("greetings, Ada")
    );
    assert!(root
        .path()
        .join(".script-cache/net/example/greetings/1.2.0/greetings-1.2.0.ows")
        .is_file());
    assert!(repo.requests().contains(&ARTIFACT.to_string()));

    // 之后离线也能从缓存解析
    let offline = manager(root.path(), true);
    let report = offline.scan_and_load_all().unwrap();
    assert!(report.failures.is_empty(), "{:?}", report.failures);
}

#[test]
fn checksum_mismatch_fails_resolution() {
    let mut files = HashMap::new();
    files.insert(ARTIFACT.to_string(), GREETINGS.to_string());
    files.insert(format!("{}.sha256", ARTIFACT), "0".repeat(64));
    let repo = Repository::serve(files);

    let root = tempfile::tempdir().unwrap();
    write_script(root.path(), "caller.ows", &caller(&repo.url));

    let mgr = manager(root.path(), false);
    let report = mgr.scan_and_load_all().unwrap();
    assert_eq!(report.failures.len(), 1);
    let ScriptingError::DependencyResolution(err) = &report.failures[0].1 else {
        panic!("expected resolution error, got {:?}", report.failures[0].1);
    };
    assert!(err.to_string().contains("checksum mismatch"), "{}", err);
    assert!(!root.path().join(".script-cache/net").exists());
}

#[test]
fn missing_artifact_lists_every_failure() {
    let repo = Repository::serve(HashMap::new());
    let root = tempfile::tempdir().unwrap();
    write_script(
        root.path(),
        "caller.ows",
        &format!(
            "@repository \"{}\"\n@depends \"net.example:absent:0.1\"\n@depends \"lib/none.ows\"\nfn f() {{ }}",
            repo.url
        ),
    );

    let mgr = manager(root.path(), false);
    let err = mgr.enable("caller").unwrap_err();
    let ScriptingError::DependencyResolution(err) = err else {
        panic!("expected resolution error, got {:?}", err);
    };
    assert_eq!(err.script, "caller");
    assert_eq!(err.failures.len(), 2);
    let text = err.to_string();
    assert!(text.contains("net.example:absent:0.1"));
    assert!(text.contains("HTTP 404"));
    assert!(text.contains("none.ows"));
    assert!(!mgr.is_loaded("caller"));
}

#[test]
fn local_file_dependency_relative_to_script_dir() {
    let root = tempfile::tempdir().unwrap();
    let lib_dir = root.path().join("scripts/lib");
    fs::create_dir_all(&lib_dir).unwrap();
    fs::write(lib_dir.join("strings.ows"), "fn shout(s: string) { return s + \"!\" }").unwrap();
    write_script(
        root.path(),
        "loud.ows",
        "@depends \"lib/strings.ows\"\nfn hey(s: string) { return shout(s) }",
    );

    let mgr = manager(root.path(), true);
    mgr.scan_and_load_all().unwrap();
    assert_eq!(
        mgr.invoke("loud", "hey", vec![Value::from("hey")]).unwrap(),
        Value::from("hey!")
    );
    // 依赖库函数不对外暴露
    assert!(matches!(
        mgr.invoke("loud", "shout", vec![Value::from("x")]),
        Err(ScriptingError::UnresolvedCall(_))
    ));
}
