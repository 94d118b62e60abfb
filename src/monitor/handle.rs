//! 服务句柄
//!
//! 绑定单个服务名称与主机的实时查询/控制接口

use crate::error::{Result, ServiceWardenError};
use crate::host::{RunState, ServiceHost, ServiceIdentity, StartupMode};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// 等待状态时默认的查询间隔
pub const DEFAULT_WAIT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// 单个服务的查询/控制句柄
///
/// 每次调用都直接访问主机，不缓存任何状态
#[derive(Clone)]
pub struct ServiceHandle {
    /// 服务名称
    service_name: String,
    /// 主机接口
    host: Arc<dyn ServiceHost>,
    /// 等待状态时的查询间隔
    wait_poll_interval: Duration,
}

impl std::fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("service_name", &self.service_name)
            .field("wait_poll_interval", &self.wait_poll_interval)
            .finish()
    }
}

impl ServiceHandle {
    /// 创建新的服务句柄
    ///
    /// # 参数
    /// * `host` - 主机接口
    /// * `service_name` - 服务名称
    pub fn new(host: Arc<dyn ServiceHost>, service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            host,
            wait_poll_interval: DEFAULT_WAIT_POLL_INTERVAL,
        }
    }

    /// 设置等待状态时的查询间隔
    pub fn with_wait_poll_interval(mut self, interval: Duration) -> Self {
        self.wait_poll_interval = interval;
        self
    }

    /// 服务名称
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// 解析服务标识
    pub async fn identity(&self) -> Result<ServiceIdentity> {
        self.host.describe(&self.service_name).await
    }

    /// 查询当前运行状态
    pub async fn current_state(&self) -> Result<RunState> {
        self.host.query_state(&self.service_name).await
    }

    /// 主机当前是否允许停止
    pub async fn can_stop(&self) -> Result<bool> {
        self.host.can_stop(&self.service_name).await
    }

    /// 查询启动模式
    pub async fn startup_mode(&self) -> Result<StartupMode> {
        self.host.startup_mode(&self.service_name).await
    }

    /// 发出启动命令
    pub async fn start(&self) -> Result<()> {
        debug!("发出启动命令: {}", self.service_name);
        self.host.start(&self.service_name).await
    }

    /// 发出停止命令
    pub async fn stop(&self) -> Result<()> {
        debug!("发出停止命令: {}", self.service_name);
        self.host.stop(&self.service_name).await
    }

    /// 等待服务进入目标状态
    ///
    /// # 参数
    /// * `target` - 目标状态
    /// * `timeout` - 最长等待时间
    ///
    /// # 返回
    /// * `Result<()>` - 超时返回 `Timeout`，查询失败时原样返回
    ///
    /// 超出 `Instant` 表示范围的等待时间视为不设期限
    pub async fn wait_for_state(&self, target: RunState, timeout: Duration) -> Result<()> {
        let started = Instant::now();
        let deadline = started.checked_add(timeout);

        loop {
            if self.current_state().await? == target {
                debug!(
                    "服务 {} 已进入 {} 状态，耗时 {:?}",
                    self.service_name,
                    target,
                    started.elapsed()
                );
                return Ok(());
            }

            let pause = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(ServiceWardenError::Timeout {
                            service: self.service_name.clone(),
                            target,
                            waited: started.elapsed(),
                        });
                    }
                    self.wait_poll_interval.min(deadline - now)
                }
                None => self.wait_poll_interval,
            };
            tokio::time::sleep(pause).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{FakeHost, FakeService};

    fn handle_for(host: Arc<FakeHost>, name: &str) -> ServiceHandle {
        ServiceHandle::new(host, name).with_wait_poll_interval(Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_wait_for_state_reaches_target() {
        let host = Arc::new(FakeHost::with_transition_polls(2).with_service("alpha", FakeService::new("Alpha")));
        let handle = handle_for(host.clone(), "alpha");

        handle.start().await.unwrap();
        handle
            .wait_for_state(RunState::Running, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(handle.current_state().await.unwrap(), RunState::Running);
    }

    #[tokio::test]
    async fn test_wait_for_state_accepts_unbounded_timeout() {
        let host = Arc::new(FakeHost::with_transition_polls(2).with_service("alpha", FakeService::new("Alpha")));
        let handle = handle_for(host, "alpha");

        handle.start().await.unwrap();
        handle
            .wait_for_state(RunState::Running, Duration::from_secs(u64::MAX))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_for_state_times_out() {
        let host = Arc::new(FakeHost::new().with_service("slow", FakeService::new("Slow").stalling()));
        let handle = handle_for(host, "slow");

        handle.start().await.unwrap();
        let err = handle
            .wait_for_state(RunState::Running, Duration::from_millis(30))
            .await
            .unwrap_err();

        match err {
            ServiceWardenError::Timeout { service, target, .. } => {
                assert_eq!(service, "slow");
                assert_eq!(target, RunState::Running);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_queries_round_trip_to_host() {
        let host = Arc::new(FakeHost::new().with_service(
            "beta",
            FakeService::new("Beta")
                .with_state(RunState::Running)
                .with_startup_mode(StartupMode::Automatic)
                .not_stoppable(),
        ));
        let handle = handle_for(host.clone(), "beta");

        assert_eq!(handle.current_state().await.unwrap(), RunState::Running);
        assert_eq!(handle.startup_mode().await.unwrap(), StartupMode::Automatic);
        assert!(!handle.can_stop().await.unwrap());

        host.set_state("beta", RunState::Stopped);
        assert_eq!(handle.current_state().await.unwrap(), RunState::Stopped);
    }

    #[tokio::test]
    async fn test_identity_resolution_fails_for_unknown_service() {
        let host = Arc::new(FakeHost::new());
        let handle = handle_for(host, "ghost");

        assert!(handle.identity().await.unwrap_err().is_not_found());
    }
}
