//! wabridge 主入口

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing::{error, info};

use wabridge::infra::config::{Config, ConfigLoader};
use wabridge::infra::logging::{self, LoggingConfig};
use wabridge::service::{RelayService, ServiceConfig};

const VERSION: &str = env!("CARGO_PKG_VERSION");

// 命令行参数解析结构体
#[derive(Parser, Debug)]
#[command(name = "wabridge")]
#[command(version)]
#[command(about = "WhatsApp 消息中继：Webhook 转发、自动回复与回显抑制", long_about = None)]
struct Args {
    /// 配置文件路径
    #[arg(short, long, default_value = "wabridge.toml")]
    config: String,

    /// 是否启用 verbose 模式（显示 DEBUG 日志）
    #[arg(short, long)]
    verbose: bool,

    /// 子命令
    #[command(subcommand)]
    command: Option<Commands>,
}

// 子命令枚举
#[derive(Subcommand, Debug)]
enum Commands {
    /// 启动中继服务
//
// 配置只加载一次，日志和服务共用
async fn run_service(config_path: &str, verbose: bool) -> ExitCode {
    let config = match ConfigLoader::new().load(config_path).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("加载配置失败: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&config, verbose) {
        eprintln!("初始化日志失败: {}", e);
        return ExitCode::FAILURE;
    }

    info!(version = VERSION, path = config_path, "wabridge 启动");

    if let Err(e) = config.validate() {
        error!(error = %e, "配置校验失败");
        return ExitCode::FAILURE;
    }

    let mut service = RelayService::new(ServiceConfig {
        config_path: config_path.to_string(),
    })
    .with_config(config);

    if let Err(e) = service.start().await {
        error!(error = %e, "服务运行出错");
        return ExitCode::FAILURE;
    }

    info!("服务退出");
    ExitCode::SUCCESS
}

fn init_logging(config: &Config, verbose: bool) -> wabridge::infra::error::Result<()> {
    let logging_config = LoggingConfig::from_section(&config.logging, verbose)?;
    logging::init(&logging_config)
}

// 检查配置文件是否有效
async fn check_config(config_path: &str) -> ExitCode {
    println!("验证配置文件: {}", config_path);

    let loaded = ConfigLoader::new()
        .load(config_path)
        .await
        .and_then(|config| config.validate().map(|_| config));

    match loaded {
        Ok(config) => {
            println!("配置验证成功!");
            println!("- 网关: {} (实例 {})", config.gateway.base_url, config.gateway.instance);
            println!("- 监听地址: {}", config.gateway.listen_addr);
            println!("- 入站转发: {}", config.webhooks.inbound_url.as_deref().unwrap_or("未配置"));
            println!("- 出站转发: {}", config.webhooks.outbound_url.as_deref().unwrap_or("未配置"));
            println!("- 自动回复: {}", config.webhooks.responder_url.as_deref().unwrap_or("未配置"));
            println!("- 身份重映射: {} 条", config.relay.identity_remap.len());
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("配置验证失败: {}", e);
            ExitCode::FAILURE
        }
    }
}
