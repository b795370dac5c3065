pub mod console;

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

use crate::config::Config;
use crate::plugin::ScriptManager;

use console::Command;

pub struct App {
    manager: Arc<ScriptManager>,
    root: PathBuf,
}

impl App {
    pub fn new(config: Config, root: &Path) -> Result<Self> {
        let manager = Arc::new(ScriptManager::new(&config.scripting, root));
        Ok(Self {
            manager,
            root: root.to_path_buf(),
        })
    }

    pub fn manager(&self) -> &Arc<ScriptManager> {
        &self.manager
    }

    /// 扫描脚本目录后从 stdin 读取控制台命令
    pub async fn run(self) -> Result<()> {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.run_with(stdin, stdout).await
    }

    /// 控制台主循环；输入结束或 `quit` 时停用全部脚本
    pub async fn run_with<R, W>(self, input: R, mut output: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!(root = %self.root.display(), "OpenWorld scripting started");

        let manager = self.manager.clone();
        let report = tokio::task::spawn_blocking(move || manager.scan_and_load_all()).await??;
        for (name, e) in &report.failures {
            output
                .write_all(format!("failed to load {}: {}\n", name, e).as_bytes())
                .await?;
        }
        output
            .write_all(format!("{} scripts loaded, type 'help' for commands\n", report.loaded.len()).as_bytes())
            .await?;
        output.flush().await?;

        let mut lines = input.lines();
        while let Some(line) = lines.next_line().await? {
            let command = match console::parse_command(&line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(message) => {
                    output.write_all(format!("{}\n", message).as_bytes()).await?;
                    output.flush().await?;
                    continue;
                }
            };
            let quit = command == Command::Quit;

            let manager = self.manager.clone();
            let reply = tokio::task::spawn_blocking(move || console::execute(&manager, command))
                .await?
                .unwrap_or_else(|e| format!("error: {}", e));
            output.write_all(format!("{}\n", reply).as_bytes()).await?;
            output.flush().await?;
            if quit {
                break;
            }
        }

        let manager = self.manager.clone();
        let errors = tokio::task::spawn_blocking(move || manager.shutdown()).await?;
        for (name, e) in errors {
            warn!(script = name.as_str(), error = %e, "script failed to deactivate");
        }
        info!("OpenWorld scripting stopped");
        Ok(())
    }
}
