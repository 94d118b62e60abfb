//! 服务监控模块
//!
//! 提供服务状态轮询、变化通知以及按依赖顺序执行的启动/停止/重启功能

pub mod dependency;
pub mod events;
pub mod handle;
pub mod set;

pub use dependency::{detect_cycle, ensure_acyclic, validate_dependents, DependencyGraph};
pub use events::{ChangeCause, MonitorEvent, StateChange};
pub use handle::ServiceHandle;
pub use set::MonitorSet;

use crate::error::{Result, ServiceWardenError};
use crate::host::{RunState, ServiceHost, ServiceIdentity, StartupMode};
use crate::logging::transition_log;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 默认轮询间隔
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// 默认状态过渡超时
pub const DEFAULT_TRANSITION_TIMEOUT: Duration = Duration::from_secs(30);

/// 默认事件通道容量
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// 监控器构造参数
#[derive(Debug, Clone)]
pub struct MonitorOptions {
    /// 主服务名称
    pub service_name: String,
    /// 关联ID，未指定时自动生成
    pub correlation_id: Option<Uuid>,
    /// 轮询间隔
    pub poll_interval: Duration,
    /// 依赖服务名称，按声明顺序
    pub dependents: Vec<String>,
    /// 单次状态过渡的最长等待时间
    pub transition_timeout: Duration,
    /// 等待状态时的查询间隔
    pub wait_poll_interval: Duration,
    /// 事件通道容量
    pub event_capacity: usize,
}

impl MonitorOptions {
    /// 使用默认参数创建
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            correlation_id: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            dependents: Vec::new(),
            transition_timeout: DEFAULT_TRANSITION_TIMEOUT,
            wait_poll_interval: handle::DEFAULT_WAIT_POLL_INTERVAL,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// 设置关联ID
    pub fn with_correlation_id(mut self, id: Uuid) -> Self {
        self.correlation_id = Some(id);
        self
    }

    /// 设置轮询间隔
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// 设置依赖服务
    pub fn with_dependents<I, S>(mut self, dependents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependents = dependents.into_iter().map(Into::into).collect();
        self
    }

    /// 设置状态过渡超时
    pub fn with_transition_timeout(mut self, timeout: Duration) -> Self {
        self.transition_timeout = timeout;
        self
    }

    /// 设置等待状态时的查询间隔
    pub fn with_wait_poll_interval(mut self, interval: Duration) -> Self {
        self.wait_poll_interval = interval;
        self
    }
}

/// 生命周期命令的执行结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// 命令已执行，携带主服务最终状态
    Completed(RunState),
    /// 前置条件不满足，未执行任何操作，携带主服务当时的状态
    Skipped(RunState),
}

impl CommandOutcome {
    /// 主服务状态
    pub fn state(&self) -> RunState {
        match self {
            CommandOutcome::Completed(state) | CommandOutcome::Skipped(state) => *state,
        }
    }

    /// 是否实际执行
    pub fn is_completed(&self) -> bool {
        matches!(self, CommandOutcome::Completed(_))
    }
}

/// 监控器缓存
#[derive(Debug)]
struct MonitorCache {
    /// 最后观察到的状态
    state: RunState,
    /// 轮询是否处于失败状态
    degraded: bool,
}

/// 轮询任务与监控器共享的状态
struct MonitorShared {
    /// 关联ID
    id: Uuid,
    /// 主服务标识
    identity: ServiceIdentity,
    /// 主服务句柄
    primary: ServiceHandle,
    /// 状态缓存，读取主机、更新缓存、发送通知在同一把锁内完成
    cache: Mutex<MonitorCache>,
    /// 事件发送器
    events: broadcast::Sender<MonitorEvent>,
}

impl MonitorShared {
    /// 读取主服务状态并在变化时发送通知
    ///
    /// 读取失败时返回错误，调用方决定是否降级
    async fn refresh(&self) -> Result<RunState> {
        let mut cache = self.cache.lock().await;
        self.refresh_locked(&mut cache).await
    }

    /// 在已持有缓存锁的情况下读取主服务状态
    async fn refresh_locked(&self, cache: &mut MonitorCache) -> Result<RunState> {
        let state = self.primary.current_state().await?;
        cache.degraded = false;

        if cache.state != state {
            let previous = cache.state;
            cache.state = state;
            transition_log(
                self.id,
                &self.identity.service_name,
                Some(previous),
                state,
                ChangeCause::PrimaryStateChanged,
            );
            // 没有订阅者时发送失败是正常情况
            let _ = self.events.send(MonitorEvent::StateChanged(StateChange {
                monitor_id: self.id,
                service: self.identity.clone(),
                cause: ChangeCause::PrimaryStateChanged,
                state,
                previous: Some(previous),
                timestamp: Utc::now(),
            }));
        }

        Ok(state)
    }

    /// 轮询一次，读取失败只记录并发送降级通知
    ///
    /// 读取与降级标记在同一把锁内完成
    async fn poll_once(&self) {
        let mut cache = self.cache.lock().await;
        if let Err(e) = self.refresh_locked(&mut cache).await {
            self.mark_degraded(&mut cache, &e);
        }
    }

    /// 标记降级，同一次连续失败只通知一次
    fn mark_degraded(&self, cache: &mut MonitorCache, error: &ServiceWardenError) {
        if cache.degraded {
            debug!("服务 {} 仍无法读取状态: {}", self.identity, error);
            return;
        }

        cache.degraded = true;
        warn!("轮询服务 {} 状态失败: {}", self.identity, error);
        let _ = self.events.send(MonitorEvent::Degraded {
            monitor_id: self.id,
            service: self.identity.clone(),
            reason: error.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// 发送依赖服务状态变化通知
    async fn publish_dependent(&self, dependent: &ServiceHandle, state: RunState) {
        let service = dependent
            .identity()
            .await
            .unwrap_or_else(|_| ServiceIdentity::new(dependent.service_name(), dependent.service_name()));

        // 与主服务通知共用一把锁，保证事件顺序
        let _cache = self.cache.lock().await;
        transition_log(
            self.id,
            &service.service_name,
            None,
            state,
            ChangeCause::DependentStateChanged,
        );
        let _ = self.events.send(MonitorEvent::StateChanged(StateChange {
            monitor_id: self.id,
            service,
            cause: ChangeCause::DependentStateChanged,
            state,
            previous: None,
            timestamp: Utc::now(),
        }));
    }
}

/// 服务监控器
///
/// 构造时立即启动轮询任务，调用 [`ServiceMonitor::shutdown`] 显式释放；
/// 未调用时在 drop 时中止轮询任务
pub struct ServiceMonitor {
    /// 共享状态
    shared: Arc<MonitorShared>,
    /// 依赖服务句柄，按声明顺序
    dependents: Vec<ServiceHandle>,
    /// 构造参数
    options: MonitorOptions,
    /// 生命周期命令互斥锁
    operation_lock: Mutex<()>,
    /// 关闭信号发送器
    shutdown_tx: broadcast::Sender<()>,
    /// 轮询任务句柄
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ServiceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceMonitor")
            .field("id", &self.shared.id)
            .field("identity", &self.shared.identity)
            .field("dependents", &self.options.dependents)
            .field("poll_interval", &self.options.poll_interval)
            .finish()
    }
}

impl ServiceMonitor {
    /// 创建监控器并启动轮询任务
    ///
    /// # 参数
    /// * `host` - 主机接口
    /// * `options` - 构造参数
    ///
    /// # 返回
    /// * `Result<Self>` - 服务不存在时返回 `ServiceNotFound`，依赖声明非法时返回 `DependencyCycle`，
    ///   轮询间隔为零时返回 `InvalidOptions`
    pub async fn new(host: Arc<dyn ServiceHost>, options: MonitorOptions) -> Result<Self> {
        validate_intervals(&options)?;
        validate_dependents(&options.service_name, &options.dependents)?;

        let primary = ServiceHandle::new(Arc::clone(&host), options.service_name.clone())
            .with_wait_poll_interval(options.wait_poll_interval);
        let identity = primary.identity().await?;
        let initial_state = primary.current_state().await?;

        let dependents = options
            .dependents
            .iter()
            .map(|name| {
                ServiceHandle::new(Arc::clone(&host), name.clone())
                    .with_wait_poll_interval(options.wait_poll_interval)
            })
            .collect();

        let id = options.correlation_id.unwrap_or_else(Uuid::new_v4);
        let (events, _) = broadcast::channel(options.event_capacity.max(1));
        let shared = Arc::new(MonitorShared {
            id,
            identity,
            primary,
            cache: Mutex::new(MonitorCache {
                state: initial_state,
                degraded: false,
            }),
            events,
        });

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let poll_task = tokio::spawn(run_poll_loop(
            Arc::clone(&shared),
            options.poll_interval,
            shutdown_rx,
        ));

        info!(
            "启动服务监控: {} (id: {}, 初始状态: {}, 依赖: {:?})",
            shared.identity, id, initial_state, options.dependents
        );

        Ok(Self {
            shared,
            dependents,
            options,
            operation_lock: Mutex::new(()),
            shutdown_tx,
            poll_task: Mutex::new(Some(poll_task)),
        })
    }

    /// 关联ID
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// 主服务标识
    pub fn identity(&self) -> &ServiceIdentity {
        &self.shared.identity
    }

    /// 依赖服务名称
    pub fn dependents(&self) -> &[String] {
        &self.options.dependents
    }

    /// 轮询间隔
    pub fn poll_interval(&self) -> Duration {
        self.options.poll_interval
    }

    /// 状态过渡超时
    pub fn transition_timeout(&self) -> Duration {
        self.options.transition_timeout
    }

    /// 最后观察到的主服务状态，最多滞后一个轮询间隔
    pub async fn cached_state(&self) -> RunState {
        self.shared.cache.lock().await.state
    }

    /// 轮询是否处于降级状态
    pub async fn is_degraded(&self) -> bool {
        self.shared.cache.lock().await.degraded
    }

    /// 主服务当前是否允许停止
    pub async fn can_stop(&self) -> Result<bool> {
        self.shared.primary.can_stop().await
    }

    /// 主服务启动模式
    pub async fn startup_mode(&self) -> Result<StartupMode> {
        self.shared.primary.startup_mode().await
    }

    /// 主服务句柄
    pub fn primary(&self) -> &ServiceHandle {
        &self.shared.primary
    }

    /// 订阅监控事件
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.shared.events.subscribe()
    }

    /// 立即刷新一次缓存状态
    pub async fn refresh(&self) -> Result<RunState> {
        self.shared.refresh().await
    }

    /// 轮询任务是否仍在运行
    pub async fn is_running(&self) -> bool {
        self.poll_task
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// 启动主服务，然后按声明顺序启动依赖服务
    ///
    /// 主服务不处于已停止状态时不执行任何操作。依赖服务失败时中止，
    /// 已启动的服务不会回滚
    pub async fn start(&self) -> Result<CommandOutcome> {
        let _guard = self.operation_lock.lock().await;
        self.start_locked().await
    }

    /// 先按声明顺序停止依赖服务，再停止主服务
    ///
    /// 主服务不可停止或不处于运行/暂停状态时不执行任何操作
    pub async fn stop(&self) -> Result<CommandOutcome> {
        let _guard = self.operation_lock.lock().await;
        self.stop_locked().await
    }

    /// 重启主服务及其依赖服务
    ///
    /// 停止阶段失败时不会尝试启动，错误原样返回给调用方
    pub async fn restart(&self) -> Result<CommandOutcome> {
        let _guard = self.operation_lock.lock().await;
        let primary = &self.shared.primary;
        let timeout = self.options.transition_timeout;
        let mut acted = false;

        info!("重启服务: {}", self.shared.identity);

        if primary.can_stop().await? && primary.current_state().await?.is_stoppable() {
            self.stop_locked().await?;
            primary.wait_for_state(RunState::Stopped, timeout).await?;
            acted = true;
        }

        if primary.current_state().await? == RunState::Stopped {
            self.start_locked().await?;
            primary.wait_for_state(RunState::Running, timeout).await?;
            acted = true;
        }

        let state = self.shared.refresh().await?;
        if acted {
            info!("服务重启完成: {}", self.shared.identity);
            Ok(CommandOutcome::Completed(state))
        } else {
            debug!("服务 {} 当前状态 {} 无需重启", self.shared.identity, state);
            Ok(CommandOutcome::Skipped(state))
        }
    }

    /// 显式关闭监控器，停止轮询任务并等待其退出
    pub async fn shutdown(&self) {
        let task = self.poll_task.lock().await.take();
        if let Some(task) = task {
            let _ = self.shutdown_tx.send(());
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!("监控任务异常退出 {}: {}", self.shared.identity, e);
                }
            }
            info!("停止服务监控: {} (id: {})", self.shared.identity, self.shared.id);
        }
    }

    async fn start_locked(&self) -> Result<CommandOutcome> {
        let primary = &self.shared.primary;
        let timeout = self.options.transition_timeout;

        let state = primary.current_state().await?;
        if state != RunState::Stopped {
            debug!("服务 {} 当前状态 {}，跳过启动", self.shared.identity, state);
            return Ok(CommandOutcome::Skipped(state));
        }

        info!("启动服务: {}", self.shared.identity);
        primary.start().await?;
        primary.wait_for_state(RunState::Running, timeout).await?;

        for dependent in &self.dependents {
            self.start_dependent(dependent)
                .await
                .map_err(|source| ServiceWardenError::DependentOperationFailed {
                    dependent: dependent.service_name().to_string(),
                    source: Box::new(source),
                })?;
        }

        let state = self.shared.refresh().await?;
        info!("服务启动完成: {} ({})", self.shared.identity, state);
        Ok(CommandOutcome::Completed(state))
    }

    async fn start_dependent(&self, dependent: &ServiceHandle) -> Result<()> {
        if dependent.startup_mode().await? == StartupMode::Disabled {
            debug!("跳过已禁用的依赖服务: {}", dependent.service_name());
            return Ok(());
        }
        if dependent.current_state().await? != RunState::Stopped {
            debug!("依赖服务未处于停止状态，跳过: {}", dependent.service_name());
            return Ok(());
        }

        info!("启动依赖服务: {}", dependent.service_name());
        dependent.start().await?;
        dependent
            .wait_for_state(RunState::Running, self.options.transition_timeout)
            .await?;
        self.shared
            .publish_dependent(dependent, RunState::Running)
            .await;
        Ok(())
    }

    async fn stop_locked(&self) -> Result<CommandOutcome> {
        let primary = &self.shared.primary;
        let timeout = self.options.transition_timeout;

        let state = primary.current_state().await?;
        if !primary.can_stop().await? || !state.is_stoppable() {
            debug!("服务 {} 当前状态 {}，跳过停止", self.shared.identity, state);
            return Ok(CommandOutcome::Skipped(state));
        }

        info!("停止服务: {}", self.shared.identity);
        for dependent in &self.dependents {
            self.stop_dependent(dependent)
                .await
                .map_err(|source| ServiceWardenError::DependentOperationFailed {
                    dependent: dependent.service_name().to_string(),
                    source: Box::new(source),
                })?;
        }

        primary.stop().await?;
        primary.wait_for_state(RunState::Stopped, timeout).await?;

        let state = self.shared.refresh().await?;
        info!("服务停止完成: {} ({})", self.shared.identity, state);
        Ok(CommandOutcome::Completed(state))
    }

    async fn stop_dependent(&self, dependent: &ServiceHandle) -> Result<()> {
        if dependent.startup_mode().await? == StartupMode::Disabled {
            debug!("跳过已禁用的依赖服务: {}", dependent.service_name());
            return Ok(());
        }
        if !dependent.can_stop().await? {
            debug!("依赖服务不可停止，跳过: {}", dependent.service_name());
            return Ok(());
        }
        if !dependent.current_state().await?.is_stoppable() {
            debug!("依赖服务未在运行，跳过: {}", dependent.service_name());
            return Ok(());
        }

        info!("停止依赖服务: {}", dependent.service_name());
        dependent.stop().await?;
        dependent
            .wait_for_state(RunState::Stopped, self.options.transition_timeout)
            .await?;
        self.shared
            .publish_dependent(dependent, RunState::Stopped)
            .await;
        Ok(())
    }
}

impl Drop for ServiceMonitor {
    fn drop(&mut self) {
        // 未显式关闭时中止轮询任务
        if let Some(task) = self.poll_task.get_mut().take() {
            task.abort();
        }
    }
}

/// 轮询间隔和等待查询间隔必须大于零
fn validate_intervals(options: &MonitorOptions) -> Result<()> {
    let invalid = |reason: &str| ServiceWardenError::InvalidOptions {
        service: options.service_name.clone(),
        reason: reason.to_string(),
    };

    if options.poll_interval.is_zero() {
        return Err(invalid("轮询间隔不能为0"));
    }
    if options.wait_poll_interval.is_zero() {
        return Err(invalid("等待查询间隔不能为0"));
    }
    Ok(())
}

/// 轮询循环
async fn run_poll_loop(
    shared: Arc<MonitorShared>,
    poll_interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // 首次 tick 立即完成，初始状态已在构造时读取
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => {
                debug!("轮询服务状态: {}", shared.identity);
                shared.poll_once().await;
            }
        }
    }

    debug!("轮询任务退出: {}", shared.identity);
}
