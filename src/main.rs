//! Service Warden 主程序入口
//!
//! 服务生命周期监控工具

use anyhow::{Context, Result};
use clap::Parser;
use service_warden::cli::args::{Args, Commands, LifecycleAction};
use service_warden::cli::commands::{
    Command, InitCommand, LifecycleCommand, StatusCommand, TestNotificationCommand,
    ValidateCommand, VersionCommand, WatchCommand,
};
use service_warden::host::{ServiceHost, SystemdHost};
use service_warden::logging::{LogConfig, LoggingSystem};
use std::sync::Arc;
use tracing::{debug, error, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let args = Args::parse();

    // 初始化日志系统
    let log_config = LogConfig {
        level: args.log_level.clone().into(),
        console: true,
        json_format: false,
        ..Default::default()
    };

    let _logging_system = LoggingSystem::setup_logging(log_config).context("初始化日志系统失败")?;

    debug!("Service Warden v{} 启动", service_warden::VERSION);

    // 执行命令
    if let Err(e) = execute_command(&args).await {
        error!("命令执行失败: {}", e);
        eprintln!("❌ {e:#}");
        std::process::exit(1);
    }

    Ok(())
}

/// 执行CLI命令
async fn execute_command(args: &Args) -> Result<()> {
    let systemd = if args.user {
        SystemdHost::user()
    } else {
        SystemdHost::new()
    };

    let needs_host = matches!(
        args.command,
        Commands::Watch { .. }
            | Commands::Status { .. }
            | Commands::Start { .. }
            | Commands::Stop { .. }
            | Commands::Restart { .. }
    );
    if needs_host && !systemd.is_available().await {
        warn!("未检测到可用的 systemctl，服务状态查询和控制命令将会失败");
    }

    let host: Arc<dyn ServiceHost> = Arc::new(systemd);

    let command: Box<dyn Command> = match &args.command {
        Commands::Watch { .. } => Box::new(WatchCommand::new(host)),
        Commands::Status { .. } => Box::new(StatusCommand::new(host)),
        Commands::Start { .. } => Box::new(LifecycleCommand::new(host, LifecycleAction::Start)),
        Commands::Stop { .. } => Box::new(LifecycleCommand::new(host, LifecycleAction::Stop)),
        Commands::Restart { .. } => {
            Box::new(LifecycleCommand::new(host, LifecycleAction::Restart))
        }
        Commands::Init { .. } => Box::new(InitCommand),
        Commands::Validate { .. } => Box::new(ValidateCommand),
        Commands::Version { .. } => Box::new(VersionCommand),
        Commands::TestNotification { .. } => Box::new(TestNotificationCommand),
    };

    command.execute(args).await.map_err(|e| anyhow::anyhow!(e))
}
