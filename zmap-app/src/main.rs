use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};
use zmap_config::{AppConfig, ConfigError};

mod cli;
mod console;
mod loader;

/// 矢量图层演示：加载要素、应用样式并打印绘制顺序。
#[derive(Debug, Parser)]
#[command(name = "zmap-app", version)]
struct Args {
    /// 配置文件路径，缺省时按 `ZMAP_CONFIG` 与 `./config/default.toml` 查找
    #[arg(long)]
    config: Option<PathBuf>,

    /// 要加载的 GeoJSON 文件
    #[arg(long)]
    input: Option<PathBuf>,

    /// 样式文件（JSON）
    #[arg(long)]
    style: Option<PathBuf>,

    /// 加载后让视图适配新增要素的范围
    #[arg(long)]
    fit: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_configuration(args.config.clone());
    init_logging(&config);
    info!("启动 zmap 图层演示");

    let options = cli::RunOptions {
        input: args.input.or_else(|| config.resources.sample_data.clone()),
        style: args.style.or_else(|| config.resources.style_file.clone()),
        fit: args.fit || config.layer.fit_view,
    };
    cli::run(&config, &options)
}

fn load_configuration(override_path: Option<PathBuf>) -> AppConfig {
    match override_path {
        Some(path) => AppConfig::from_file(&path).unwrap_or_else(|err| {
            warn!(path = %path.display(), error = %err, "加载指定配置失败，使用默认配置");
            AppConfig::default()
        }),
        None => AppConfig::discover().unwrap_or_else(|err| {
            match &err {
                ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
                    warn!(path = %path.display(), error = %err, "加载默认配置失败，使用内建默认值");
                }
                ConfigError::Context { .. } => {
                    warn!(error = %err, "加载默认配置失败，使用内建默认值");
                }
            }
            AppConfig::default()
        }),
    }
}

/// 日志输出到 stderr，stdout 只留给图层概览。
fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}
