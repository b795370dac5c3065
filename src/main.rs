use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// OpenWorld 脚本宿主
#[derive(Debug, Parser)]
#[command(name = "openworld-scripts", version, about)]
struct Args {
    /// 宿主根目录，脚本目录与缓存目录相对于此
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// 配置文件（默认 <root>/openworld.yaml，不存在时使用默认配置）
    #[arg(long)]
    config: Option<PathBuf>,
}

/// 工作线程与阻塞线程的栈大小；脚本调用在阻塞线程上执行
const THREAD_STACK_SIZE: usize = 8 * 1024 * 1024;

fn main() -> Result<()> {
    let args = Args::parse();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("openworld-scripts")
        .thread_stack_size(THREAD_STACK_SIZE)
        .build()?;
    runtime.block_on(run(args))
}

async fn run(args: Args) -> Result<()> {
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| args.root.join("openworld.yaml"));
    let config = match &args.config {
        Some(path) => openworld_scripting::config::load_config(&path.to_string_lossy())?,
        None => openworld_scripting::config::load_config_or_default(&config_path)?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log.level)),
        )
        .init();

    info!(config = %config_path.display(), "config loaded");

    let app = openworld_scripting::app::App::new(config, &args.root)?;
    app.run().await?;

    Ok(())
}
