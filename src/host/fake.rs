//! 内存主机实现
//!
//! 确定性的服务主机模拟，用于测试监控器的生命周期逻辑，无需真实的操作系统服务

use crate::error::{Result, ServiceWardenError};
use crate::host::{RunState, ServiceHost, ServiceIdentity, StartupMode};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// 模拟主机收到的命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCommand {
    /// 启动命令
    Start(String),
    /// 停止命令
    Stop(String),
}

impl HostCommand {
    /// 命令针对的服务名称
    pub fn service_name(&self) -> &str {
        match self {
            HostCommand::Start(name) | HostCommand::Stop(name) => name,
        }
    }
}

/// 正在进行的状态过渡
#[derive(Debug, Clone, Copy)]
struct PendingTransition {
    /// 目标状态
    target: RunState,
    /// 剩余需要报告过渡状态的查询次数
    remaining_polls: u32,
}

/// 模拟服务
#[derive(Debug, Clone)]
pub struct FakeService {
    /// 显示名称
    pub display_name: String,
    /// 当前状态
    pub state: RunState,
    /// 启动模式
    pub startup_mode: StartupMode,
    /// 是否允许停止
    pub can_stop: bool,
    /// 启动命令被拒绝时的原因
    pub reject_start: Option<String>,
    /// 停止命令被拒绝时的原因
    pub reject_stop: Option<String>,
    /// 过渡状态永远不会完成
    pub stall: bool,
    pending: Option<PendingTransition>,
}

impl FakeService {
    /// 创建处于已停止状态、手动启动的服务
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            state: RunState::Stopped,
            startup_mode: StartupMode::Manual,
            can_stop: true,
            reject_start: None,
            reject_stop: None,
            stall: false,
            pending: None,
        }
    }

    /// 设置初始状态
    pub fn with_state(mut self, state: RunState) -> Self {
        self.state = state;
        self
    }

    /// 设置启动模式
    pub fn with_startup_mode(mut self, startup_mode: StartupMode) -> Self {
        self.startup_mode = startup_mode;
        self
    }

    /// 标记为不可停止
    pub fn not_stoppable(mut self) -> Self {
        self.can_stop = false;
        self
    }

    /// 拒绝启动命令
    pub fn rejecting_start(mut self, reason: impl Into<String>) -> Self {
        self.reject_start = Some(reason.into());
        self
    }

    /// 拒绝停止命令
    pub fn rejecting_stop(mut self, reason: impl Into<String>) -> Self {
        self.reject_stop = Some(reason.into());
        self
    }

    /// 接受命令但过渡永远不完成
    pub fn stalling(mut self) -> Self {
        self.stall = true;
        self
    }

    /// 读取状态并推进过渡
    fn observe(&mut self) -> RunState {
        if let Some(pending) = self.pending.as_mut() {
            if self.stall {
                return self.state;
            }
            if pending.remaining_polls == 0 {
                self.state = pending.target;
                self.pending = None;
            } else {
                pending.remaining_polls -= 1;
            }
        }
        self.state
    }

    fn begin(&mut self, pending_state: RunState, target: RunState, transition_polls: u32) {
        self.state = pending_state;
        self.pending = Some(PendingTransition {
            target,
            remaining_polls: transition_polls,
        });
    }
}

/// 内存主机
#[derive(Debug)]
pub struct FakeHost {
    /// 服务表
    services: Mutex<HashMap<String, FakeService>>,
    /// 命令记录
    commands: Mutex<Vec<HostCommand>>,
    /// 过渡状态持续的查询次数
    transition_polls: u32,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeHost {
    /// 创建空的模拟主机，过渡状态持续一次查询
    pub fn new() -> Self {
        Self::with_transition_polls(1)
    }

    /// 创建模拟主机并指定过渡状态持续的查询次数
    pub fn with_transition_polls(transition_polls: u32) -> Self {
        Self {
            services: Mutex::new(HashMap::new()),
            commands: Mutex::new(Vec::new()),
            transition_polls,
        }
    }

    /// 注册服务（构建器形式）
    pub fn with_service(self, service_name: impl Into<String>, service: FakeService) -> Self {
        self.insert(service_name, service);
        self
    }

    /// 注册或替换服务
    pub fn insert(&self, service_name: impl Into<String>, service: FakeService) {
        self.services().insert(service_name.into(), service);
    }

    /// 模拟外部操作直接修改服务状态
    pub fn set_state(&self, service_name: &str, state: RunState) {
        if let Some(service) = self.services().get_mut(service_name) {
            service.state = state;
            service.pending = None;
        }
    }

    /// 模拟服务被卸载
    pub fn remove_service(&self, service_name: &str) -> Option<FakeService> {
        self.services().remove(service_name)
    }

    /// 读取服务状态，不推进过渡
    pub fn state_of(&self, service_name: &str) -> Option<RunState> {
        self.services().get(service_name).map(|s| s.state)
    }

    /// 获取命令记录
    pub fn command_log(&self) -> Vec<HostCommand> {
        self.commands().clone()
    }

    fn services(&self) -> MutexGuard<'_, HashMap<String, FakeService>> {
        self.services.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn commands(&self) -> MutexGuard<'_, Vec<HostCommand>> {
        self.commands.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_existing<T>(
        &self,
        service_name: &str,
        f: impl FnOnce(&mut FakeService) -> Result<T>,
    ) -> Result<T> {
        let mut services = self.services();
        let service = services
            .get_mut(service_name)
            .ok_or_else(|| ServiceWardenError::not_found(service_name))?;
        f(service)
    }
}

#[async_trait]
impl ServiceHost for FakeHost {
    async fn describe(&self, service_name: &str) -> Result<ServiceIdentity> {
        self.with_existing(service_name, |service| {
            Ok(ServiceIdentity::new(service_name, service.display_name.clone()))
        })
    }

    async fn query_state(&self, service_name: &str) -> Result<RunState> {
        self.with_existing(service_name, |service| Ok(service.observe()))
    }

    async fn can_stop(&self, service_name: &str) -> Result<bool> {
        self.with_existing(service_name, |service| Ok(service.can_stop))
    }

    async fn startup_mode(&self, service_name: &str) -> Result<StartupMode> {
        self.with_existing(service_name, |service| Ok(service.startup_mode))
    }

    async fn start(&self, service_name: &str) -> Result<()> {
        let transition_polls = self.transition_polls;
        self.with_existing(service_name, |service| {
            self.commands()
                .push(HostCommand::Start(service_name.to_string()));

            if let Some(reason) = &service.reject_start {
                return Err(ServiceWardenError::rejected(service_name, "start", reason.clone()));
            }
            if service.startup_mode == StartupMode::Disabled {
                return Err(ServiceWardenError::rejected(service_name, "start", "服务已禁用"));
            }
            if service.state != RunState::Stopped {
                return Err(ServiceWardenError::rejected(
                    service_name,
                    "start",
                    format!("当前状态不允许启动: {}", service.state),
                ));
            }

            service.begin(RunState::StartPending, RunState::Running, transition_polls);
            Ok(())
        })
    }

    async fn stop(&self, service_name: &str) -> Result<()> {
        let transition_polls = self.transition_polls;
        self.with_existing(service_name, |service| {
            self.commands()
                .push(HostCommand::Stop(service_name.to_string()));

            if let Some(reason) = &service.reject_stop {
                return Err(ServiceWardenError::rejected(service_name, "stop", reason.clone()));
            }
            if !service.can_stop {
                return Err(ServiceWardenError::rejected(service_name, "stop", "服务不允许停止"));
            }
            if !service.state.is_stoppable() {
                return Err(ServiceWardenError::rejected(
                    service_name,
                    "stop",
                    format!("当前状态不允许停止: {}", service.state),
                ));
            }

            service.begin(RunState::StopPending, RunState::Stopped, transition_polls);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_transitions_through_pending() {
        let host = FakeHost::new().with_service("alpha", FakeService::new("Alpha"));

        host.start("alpha").await.unwrap();
        assert_eq!(host.query_state("alpha").await.unwrap(), RunState::StartPending);
        assert_eq!(host.query_state("alpha").await.unwrap(), RunState::Running);
        assert_eq!(host.query_state("alpha").await.unwrap(), RunState::Running);
        assert_eq!(
            host.command_log(),
            vec![HostCommand::Start("alpha".to_string())]
        );
    }

    #[tokio::test]
    async fn test_stop_requires_running() {
        let host = FakeHost::new().with_service("alpha", FakeService::new("Alpha"));

        let result = host.stop("alpha").await;
        assert!(matches!(
            result,
            Err(ServiceWardenError::CommandRejected { .. })
        ));
    }

    #[tokio::test]
    async fn test_disabled_service_rejects_start() {
        let host = FakeHost::new().with_service(
            "gamma",
            FakeService::new("Gamma").with_startup_mode(StartupMode::Disabled),
        );

        assert!(host.start("gamma").await.is_err());
        assert_eq!(host.state_of("gamma"), Some(RunState::Stopped));
    }

    #[tokio::test]
    async fn test_missing_service_not_found() {
        let host = FakeHost::new();
        let err = host.query_state("ghost").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_stalled_transition_never_completes() {
        let host = FakeHost::new().with_service("slow", FakeService::new("Slow").stalling());

        host.start("slow").await.unwrap();
        for _ in 0..5 {
            assert_eq!(host.query_state("slow").await.unwrap(), RunState::StartPending);
        }
    }

    #[tokio::test]
    async fn test_set_state_clears_pending() {
        let host = FakeHost::with_transition_polls(3)
            .with_service("alpha", FakeService::new("Alpha"));

        host.start("alpha").await.unwrap();
        host.set_state("alpha", RunState::Stopped);
        assert_eq!(host.query_state("alpha").await.unwrap(), RunState::Stopped);
    }
}
