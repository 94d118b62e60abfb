//! 命令处理逻辑
//!
//! 实现各种CLI命令的处理逻辑

use crate::cli::args::{Args, Commands, LifecycleAction, OutputFormat};
use crate::config::{
    sample_config, Config, ConfigLoader, GlobalConfig, MonitorConfig, TomlConfigLoader,
};
use crate::error::{ConfigError, NotificationError, Result, ServiceWardenError};
use crate::host::ServiceHost;
use crate::logging::LoggingSystem;
use crate::monitor::{CommandOutcome, MonitorSet, ServiceHandle, ServiceMonitor};
use crate::notification::{
    FeishuSender, MessageType, NoOpSender, NotificationForwarder, NotificationMessage,
    NotificationSender,
};
use crate::status::{BoardOverview, ServiceStatus, StatusBoard};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// 命令处理器trait
#[async_trait]
pub trait Command: Send + Sync {
    /// 执行命令
    async fn execute(&self, args: &Args) -> Result<()>;
}

/// 加载并验证配置文件
async fn load_config(path: &Path) -> Result<Config> {
    TomlConfigLoader::new(true).load_from_file(path).await
}

/// 版本命令
pub struct VersionCommand;

#[async_trait]
impl Command for VersionCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Version { format } = &args.command {
            match format {
                OutputFormat::Json => {
                    let version_info = serde_json::json!({
                        "name": crate::APP_NAME,
                        "version": crate::VERSION,
                        "description": crate::APP_DESCRIPTION
                    });
                    println!("{}", serde_json::to_string_pretty(&version_info)?);
                }
                OutputFormat::Text => {
                    println!("{} v{}", crate::APP_NAME, crate::VERSION);
                    println!("{}", crate::APP_DESCRIPTION);
                }
            }
        }
        Ok(())
    }
}

/// 初始化命令
pub struct InitCommand;

#[async_trait]
impl Command for InitCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Init { config_path, force } = &args.command {
            self.create_config_file(config_path, *force).await?;
        }
        Ok(())
    }
}

impl InitCommand {
    /// 创建配置文件
    ///
    /// # 返回
    /// * `Result<bool>` - 是否写入了文件
    pub async fn create_config_file(&self, config_path: &Path, force: bool) -> Result<bool> {
        if config_path.exists() && !force {
            eprintln!("配置文件已存在: {}", config_path.display());
            eprintln!("使用 --force 参数覆盖现有文件");
            return Ok(false);
        }

        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        tokio::fs::write(config_path, sample_config()).await?;

        println!("配置文件已创建: {}", config_path.display());
        println!("请编辑配置文件以添加需要监控的服务");

        Ok(true)
    }
}

/// 验证命令
pub struct ValidateCommand;

#[async_trait]
impl Command for ValidateCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Validate { config_path } = &args.command {
            let config_file = config_path
                .clone()
                .unwrap_or_else(|| args.get_config_path());

            self.validate_config_file(&config_file, args.is_verbose())
                .await?;
        }
        Ok(())
    }
}

impl ValidateCommand {
    /// 验证配置文件
    pub async fn validate_config_file(&self, config_path: &Path, verbose: bool) -> Result<Config> {
        println!("验证配置文件: {}", config_path.display());

        let config = load_config(config_path).await?;

        if verbose {
            println!("配置验证通过！");
            println!("全局配置:");
            println!("  日志级别: {}", config.global.log_level);
            println!("  轮询间隔: {}ms", config.global.poll_interval_ms);
            println!("  过渡超时: {}秒", config.global.transition_timeout_seconds);
            println!(
                "  通知: {}",
                if config.global.default_feishu_webhook_url.is_some() {
                    "已配置"
                } else {
                    "未配置"
                }
            );

            println!("监控配置:");
            for (i, monitor) in config.monitors.iter().enumerate() {
                println!("  {}. {}", i + 1, monitor.service);
                if let Some(description) = &monitor.description {
                    println!("     描述: {}", description);
                }
                if !monitor.dependents.is_empty() {
                    println!("     依赖服务: {}", monitor.dependents.join(" -> "));
                }
                println!(
                    "     启用状态: {}",
                    if monitor.enabled { "是" } else { "否" }
                );
            }
        } else {
            println!("✓ 配置文件验证通过");
            println!("✓ 找到 {} 个监控配置", config.monitors.len());
        }

        Ok(config)
    }
}

/// 状态命令
pub struct StatusCommand {
    host: Arc<dyn ServiceHost>,
}

#[async_trait]
impl Command for StatusCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Status { service, format } = &args.command {
            let monitors = match service {
                Some(name) => {
                    let config = load_config(&args.get_config_path()).await.ok();
                    let monitor = config
                        .as_ref()
                        .and_then(|c| c.find_monitor(name).cloned())
                        .unwrap_or_else(|| MonitorConfig::new(name.clone()));
                    vec![monitor]
                }
                None => load_config(&args.get_config_path()).await?.monitors,
            };

            let overview = self.collect(&monitors).await;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&overview)?),
                OutputFormat::Text => print_text_status(&overview),
            }
        }
        Ok(())
    }
}

impl StatusCommand {
    /// 创建状态命令
    pub fn new(host: Arc<dyn ServiceHost>) -> Self {
        Self { host }
    }

    /// 读取服务及其依赖服务的当前状态
    pub async fn collect(&self, monitors: &[MonitorConfig]) -> BoardOverview {
        let board = StatusBoard::new();

        for monitor in monitors {
            self.record(&board, &monitor.service, false).await;
            for dependent in &monitor.dependents {
                if board.get(dependent).await.is_none() {
                    self.record(&board, dependent, true).await;
                }
            }
        }

        board.overview().await
    }

    async fn record(&self, board: &StatusBoard, service_name: &str, is_dependent: bool) {
        let handle = ServiceHandle::new(Arc::clone(&self.host), service_name);

        let snapshot = async {
            let identity = handle.identity().await?;
            let state = handle.current_state().await?;
            let startup_mode = handle.startup_mode().await.ok();
            Ok::<_, ServiceWardenError>((identity, state, startup_mode))
        }
        .await;

        match snapshot {
            Ok((identity, state, startup_mode)) => {
                board
                    .record(&identity, state, startup_mode, is_dependent)
                    .await
            }
            Err(e) => board.record_error(service_name, e.to_string(), is_dependent).await,
        }
    }
}

/// 打印文本格式状态
fn print_text_status(overview: &BoardOverview) {
    println!("🔍 Service Warden 状态报告");
    println!(
        "生成时间: {}",
        overview.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!();
    println!(
        "{:<28} {:<10} {:<8} {:<12} {}",
        "服务名称", "状态", "启动模式", "颜色", "备注"
    );
    println!("{}", "-".repeat(80));

    for service in &overview.services {
        println!("{}", format_status_row(service));
    }

    println!();
    println!(
        "💡 运行中: {}/{}，需要处理: {}，无法读取: {}",
        overview.running_services,
        overview.total_services,
        overview.attention_services,
        overview.degraded_services
    );
}

/// 格式化单行状态
fn format_status_row(service: &ServiceStatus) -> String {
    let name = if service.is_dependent {
        format!("  └ {}", service.service_name)
    } else {
        service.service_name.clone()
    };
    let state = service
        .state
        .map(|s| s.to_string())
        .unwrap_or_else(|| "未知".to_string());
    let startup_mode = service
        .startup_mode
        .map(|m| m.to_string())
        .unwrap_or_else(|| "-".to_string());
    let color = service
        .color
        .map(|c| format!("\x1b[{}m{}\x1b[0m", c.ansi_code(), c))
        .unwrap_or_else(|| "-".to_string());
    let note = match (&service.degraded_reason, service.needs_attention) {
        (Some(reason), _) => reason.clone(),
        (None, true) => "需要重启".to_string(),
        (None, false) => String::new(),
    };

    format!(
        "{:<28} {:<10} {:<8} {:<12} {}",
        truncate_string(&name, 28),
        state,
        startup_mode,
        color,
        note
    )
}

/// 截断字符串到指定字符数
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}

/// 生命周期命令（启动/停止/重启）
pub struct LifecycleCommand {
    host: Arc<dyn ServiceHost>,
    action: LifecycleAction,
}

#[async_trait]
impl Command for LifecycleCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        let (service, timeout) = match &args.command {
            Commands::Start { service, timeout }
            | Commands::Stop { service, timeout }
            | Commands::Restart { service, timeout } => (service, *timeout),
            _ => return Ok(()),
        };

        // 没有配置文件时只操作服务本身
        let config = match load_config(&args.get_config_path()).await {
            Ok(config) => config,
            Err(ServiceWardenError::Config(ConfigError::FileNotFound { path })) => {
                warn!("配置文件不存在: {}，不处理依赖服务", path);
                Config {
                    global: GlobalConfig::default(),
                    monitors: Vec::new(),
                }
            }
            Err(e) => return Err(e),
        };

        let outcome = self
            .run(&config, service, timeout.map(Duration::from_secs))
            .await;

        let action = self.action.to_string();
        match &outcome {
            Ok(outcome) => {
                LoggingSystem::audit_log(&action, service, "success", None);
                match outcome {
                    CommandOutcome::Completed(state) => {
                        println!("✅ {} {} 完成，当前状态: {}", self.action, service, state)
                    }
                    CommandOutcome::Skipped(state) => {
                        println!("ℹ️ {} 当前状态为 {}，无需 {}", service, state, self.action)
                    }
                }
            }
            Err(e) => LoggingSystem::audit_log(&action, service, "failed", Some(&e.to_string())),
        }

        outcome.map(|_| ())
    }
}

impl LifecycleCommand {
    /// 创建生命周期命令
    pub fn new(host: Arc<dyn ServiceHost>, action: LifecycleAction) -> Self {
        Self { host, action }
    }

    /// 使用配置中的依赖关系执行命令
    pub async fn run(
        &self,
        config: &Config,
        service: &str,
        timeout: Option<Duration>,
    ) -> Result<CommandOutcome> {
        let monitor_config = config
            .find_monitor(service)
            .cloned()
            .unwrap_or_else(|| MonitorConfig::new(service));

        let mut options = monitor_config.to_options(&config.global);
        if let Some(timeout) = timeout {
            options = options.with_transition_timeout(timeout);
        }

        let monitor = ServiceMonitor::new(Arc::clone(&self.host), options).await?;
        let outcome = match self.action {
            LifecycleAction::Start => monitor.start().await,
            LifecycleAction::Stop => monitor.stop().await,
            LifecycleAction::Restart => monitor.restart().await,
        };
        monitor.shutdown().await;

        outcome
    }
}

/// 监控命令
pub struct WatchCommand {
    host: Arc<dyn ServiceHost>,
}

#[async_trait]
impl Command for WatchCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Watch {
            status_file,
            no_notify,
        } = &args.command
        {
            let config = load_config(&args.get_config_path()).await?;

            // 先订阅再监听信号，避免启动阶段的中断信号丢失
            let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
            let signal_tx = shutdown_tx.clone();
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        info!("收到中断信号，正在停止监控...");
                        let _ = signal_tx.send(());
                    }
                    Err(err) => error!("监听中断信号失败: {}", err),
                }
            });

            self.run(
                &config,
                status_file.clone(),
                !*no_notify,
                shutdown_tx,
                shutdown_rx,
            )
            .await?;
        }
        Ok(())
    }
}

impl WatchCommand {
    /// 创建监控命令
    pub fn new(host: Arc<dyn ServiceHost>) -> Self {
        Self { host }
    }

    /// 创建监控器并运行，直到 `shutdown_rx` 收到关闭信号
    pub async fn run(
        &self,
        config: &Config,
        status_file: Option<PathBuf>,
        notify: bool,
        shutdown_tx: broadcast::Sender<()>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<StatusBoard> {
        let monitors = MonitorSet::build(Arc::clone(&self.host), config).await?;
        let board = StatusBoard::new();

        let sender = build_sender(config, notify)?;
        let mut tasks = Vec::new();

        for (service, monitor) in monitors.iter() {
            let monitor_config = config.find_monitor(service);

            if let Some(sender) = &sender {
                if monitor_config.is_none_or(|m| m.notify) {
                    let webhook_url = monitor_config
                        .and_then(|m| m.feishu_webhook_url.clone());
                    let forwarder = NotificationForwarder::new(Arc::clone(sender), webhook_url);
                    tasks.push(forwarder.spawn(monitor.subscribe(), shutdown_tx.subscribe()));
                }
            }

            let state = monitor.cached_state().await;
            let startup_mode = monitor.startup_mode().await.ok();
            board
                .record(monitor.identity(), state, startup_mode, false)
                .await;

            tasks.push(spawn_board_updater(
                board.clone(),
                monitor.subscribe(),
                shutdown_tx.subscribe(),
                status_file.clone(),
            ));
        }

        if let Some(path) = &status_file {
            if let Err(e) = board.save_to_file(path).await {
                warn!("写入状态文件失败: {}", e);
            }
        }

        info!("开始监控 {} 个服务", monitors.len());

        if let Err(e) = shutdown_rx.recv().await {
            error!("等待关闭信号失败: {}", e);
        }
        // 信号可能早于后台任务订阅到达，这里再广播一次
        let _ = shutdown_tx.send(());

        monitors.shutdown_all().await;
        for result in futures::future::join_all(tasks).await {
            if let Err(e) = result {
                warn!("后台任务异常退出: {}", e);
            }
        }

        info!("监控已停止");
        Ok(board)
    }
}

/// 根据配置创建通知发送器
fn build_sender(config: &Config, notify: bool) -> Result<Option<Arc<dyn NotificationSender>>> {
    if !notify {
        return Ok(None);
    }

    let has_webhook = config.global.default_feishu_webhook_url.is_some()
        || config
            .monitors
            .iter()
            .any(|m| m.feishu_webhook_url.is_some());
    if !has_webhook {
        return Ok(Some(Arc::new(NoOpSender)));
    }

    let sender = FeishuSender::new(
        config.global.default_feishu_webhook_url.clone(),
        config.global.message_template.as_deref(),
    )
    .map_err(|e| NotificationError::TemplateError(format!("{e:#}")))?
    .with_secret(config.global.feishu_secret.clone());

    Ok(Some(Arc::new(sender)))
}

/// 启动看板更新任务
fn spawn_board_updater(
    board: StatusBoard,
    mut events: broadcast::Receiver<crate::monitor::MonitorEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
    status_file: Option<PathBuf>,
) -> tokio::task::JoinHandle<()> {
    use tokio::sync::broadcast::error::RecvError;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                received = events.recv() => match received {
                    Ok(event) => {
                        board.apply(&event).await;
                        if let Some(path) = &status_file {
                            if let Err(e) = board.save_to_file(path).await {
                                warn!("写入状态文件失败: {}", e);
                            }
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => warn!("状态看板丢弃了 {} 条事件", skipped),
                    Err(RecvError::Closed) => break,
                }
            }
        }
    })
}

/// 测试通知命令
pub struct TestNotificationCommand;

#[async_trait]
impl Command for TestNotificationCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::TestNotification { message } = &args.command {
            self.test_feishu_notification(args, message).await?;
        }
        Ok(())
    }
}

impl TestNotificationCommand {
    /// 测试飞书通知
    async fn test_feishu_notification(&self, args: &Args, message: &str) -> Result<()> {
        println!("测试通知功能...");
        let config = load_config(&args.get_config_path()).await?;

        let webhook_url = match config.global.default_feishu_webhook_url {
            Some(url) => url,
            None => {
                println!("请在配置文件中设置 global.default_feishu_webhook_url");
                return Err(NotificationError::ConfigError("未配置飞书webhook URL".to_string()).into());
            }
        };

        println!("🔗 使用webhook URL: {webhook_url}");

        let sender = FeishuSender::new(Some(webhook_url), None)?
            .with_secret(config.global.feishu_secret.clone());

        let test_message = NotificationMessage {
            title: "🧪 Service Warden 通知测试".to_string(),
            content: format!(
                "**测试时间**: {}\n**测试消息**: {}\n\n这是一条来自 Service Warden 的测试通知。",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
                message
            ),
            service_name: "test-service".to_string(),
            message_type: MessageType::Info,
        };

        println!("📤 发送测试消息...");
        match sender.send_message(&test_message).await {
            Ok(()) => {
                println!("✅ 测试消息发送成功！");
                println!("请检查您的飞书群组是否收到测试消息。");
                Ok(())
            }
            Err(e) => {
                println!("❌ 测试消息发送失败: {e}");
                println!("请检查：");
                println!("  1. webhook URL是否正确");
                println!("  2. 网络连接是否正常");
                println!("  3. 飞书机器人是否已添加到群组");
                Err(NotificationError::SendError(format!("{e:#}")).into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{FakeHost, FakeService, HostCommand, RunState, StartupMode};

    fn fast_config(monitors: Vec<MonitorConfig>) -> Config {
        Config {
            global: GlobalConfig {
                poll_interval_ms: 10,
                wait_poll_interval_ms: 2,
                transition_timeout_seconds: 2,
                ..GlobalConfig::default()
            },
            monitors,
        }
    }

    fn host() -> Arc<FakeHost> {
        Arc::new(
            FakeHost::new()
                .with_service("postgresql", FakeService::new("PostgreSQL"))
                .with_service(
                    "pgbouncer",
                    FakeService::new("PgBouncer").with_startup_mode(StartupMode::Automatic),
                ),
        )
    }

    #[tokio::test]
    async fn test_lifecycle_uses_configured_dependents() {
        let host = host();
        let config = fast_config(vec![MonitorConfig {
            dependents: vec!["pgbouncer".to_string()],
            ..MonitorConfig::new("postgresql")
        }]);

        let command = LifecycleCommand::new(host.clone(), LifecycleAction::Start);
        let outcome = command.run(&config, "postgresql", None).await.unwrap();

        assert_eq!(outcome, CommandOutcome::Completed(RunState::Running));
        assert_eq!(
            host.command_log(),
            vec![
                HostCommand::Start("postgresql".to_string()),
                HostCommand::Start("pgbouncer".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_lifecycle_unconfigured_service() {
        let host = host();
        let command = LifecycleCommand::new(host.clone(), LifecycleAction::Stop);

        let outcome = command
            .run(&fast_config(Vec::new()), "postgresql", None)
            .await
            .unwrap();

        assert_eq!(outcome, CommandOutcome::Skipped(RunState::Stopped));
        assert!(host.command_log().is_empty());
    }

    #[tokio::test]
    async fn test_status_collects_dependents_and_missing() {
        let command = StatusCommand::new(host());
        let overview = command
            .collect(&[MonitorConfig {
                dependents: vec!["pgbouncer".to_string(), "ghost".to_string()],
                ..MonitorConfig::new("postgresql")
            }])
            .await;

        assert_eq!(overview.total_services, 3);
        assert_eq!(overview.degraded_services, 1);
        let pgbouncer = overview
            .services
            .iter()
            .find(|s| s.service_name == "pgbouncer")
            .unwrap();
        assert!(pgbouncer.is_dependent);
        assert_eq!(pgbouncer.startup_mode, Some(StartupMode::Automatic));
    }

    #[tokio::test]
    async fn test_watch_runs_until_shutdown() {
        let host = host();
        let config = fast_config(vec![MonitorConfig::new("postgresql")]);
        let dir = tempfile::tempdir().unwrap();
        let status_file = dir.path().join("status.json");

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let watch = WatchCommand::new(host.clone());
        let trigger = shutdown_tx.clone();
        let external = host.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            external.set_state("postgresql", RunState::Running);
            tokio::time::sleep(Duration::from_millis(60)).await;
            let _ = trigger.send(());
        });

        let board = watch
            .run(
                &config,
                Some(status_file.clone()),
                false,
                shutdown_tx,
                shutdown_rx,
            )
            .await
            .unwrap();

        let status = board.get("postgresql").await.unwrap();
        assert_eq!(status.state, Some(RunState::Running));
        let saved = StatusBoard::load_from_file(&status_file).unwrap();
        assert_eq!(saved.running_services, 1);
    }

    #[tokio::test]
    async fn test_watch_honors_shutdown_sent_during_startup() {
        let host = host();
        let config = fast_config(vec![MonitorConfig::new("postgresql")]);

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        // 监控器创建之前就已收到中断信号
        shutdown_tx.send(()).unwrap();

        let board = tokio::time::timeout(
            Duration::from_secs(2),
            WatchCommand::new(host).run(&config, None, true, shutdown_tx, shutdown_rx),
        )
        .await
        .expect("监控应在收到启动期间的信号后退出")
        .unwrap();

        assert!(board.get("postgresql").await.is_some());
    }

    #[tokio::test]
    async fn test_init_respects_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("warden.toml");

        assert!(InitCommand.create_config_file(&path, false).await.unwrap());
        assert!(!InitCommand.create_config_file(&path, false).await.unwrap());
        assert!(InitCommand.create_config_file(&path, true).await.unwrap());

        let config = ValidateCommand
            .validate_config_file(&path, true)
            .await
            .unwrap();
        assert_eq!(config.monitors.len(), 1);
    }

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("short", 10), "short");
        assert_eq!(truncate_string("a-very-long-service-name", 10), "a-very-...");
    }
}
