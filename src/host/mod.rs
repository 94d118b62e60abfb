//! 主机服务控制模块
//!
//! 定义与操作系统服务控制机制交互的统一接口，以及运行状态、启动模式等基础类型

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod fake;
pub mod systemd;

pub use fake::{FakeHost, FakeService, HostCommand};
pub use systemd::SystemdHost;

/// 服务运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// 已停止
    Stopped,
    /// 正在启动
    StartPending,
    /// 运行中
    Running,
    /// 正在停止
    StopPending,
    /// 已暂停
    Paused,
    /// 正在暂停
    PausePending,
}

impl RunState {
    /// 所有状态，按声明顺序
    pub const ALL: [RunState; 6] = [
        RunState::Stopped,
        RunState::StartPending,
        RunState::Running,
        RunState::StopPending,
        RunState::Paused,
        RunState::PausePending,
    ];

    /// 是否处于过渡状态
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            RunState::StartPending | RunState::StopPending | RunState::PausePending
        )
    }

    /// 是否可以被停止（运行中或已暂停）
    pub fn is_stoppable(&self) -> bool {
        matches!(self, RunState::Running | RunState::Paused)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Stopped => write!(f, "已停止"),
            RunState::StartPending => write!(f, "启动中"),
            RunState::Running => write!(f, "运行中"),
            RunState::StopPending => write!(f, "停止中"),
            RunState::Paused => write!(f, "已暂停"),
            RunState::PausePending => write!(f, "暂停中"),
        }
    }
}

/// 服务启动模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartupMode {
    /// 开机自动启动
    Automatic,
    /// 仅手动启动
    Manual,
    /// 已禁用
    Disabled,
}

impl std::fmt::Display for StartupMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartupMode::Automatic => write!(f, "自动"),
            StartupMode::Manual => write!(f, "手动"),
            StartupMode::Disabled => write!(f, "禁用"),
        }
    }
}

/// 服务标识，构造时解析一次，之后不再改变
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceIdentity {
    /// 服务名称
    pub service_name: String,
    /// 显示名称
    pub display_name: String,
}

impl ServiceIdentity {
    /// 创建新的服务标识
    pub fn new(service_name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            display_name: display_name.into(),
        }
    }
}

impl std::fmt::Display for ServiceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.display_name.is_empty() || self.display_name == self.service_name {
            write!(f, "{}", self.service_name)
        } else {
            write!(f, "{} ({})", self.display_name, self.service_name)
        }
    }
}

/// 主机服务控制接口
///
/// 所有调用都直接访问主机，不做任何缓存
#[async_trait]
pub trait ServiceHost: Send + Sync {
    /// 解析服务标识
    ///
    /// # 参数
    /// * `service_name` - 服务名称
    ///
    /// # 返回
    /// * `Result<ServiceIdentity>` - 服务标识，服务不存在时返回 `ServiceNotFound`
    async fn describe(&self, service_name: &str) -> Result<ServiceIdentity>;

    /// 查询服务当前运行状态
    async fn query_state(&self, service_name: &str) -> Result<RunState>;

    /// 查询主机当前是否允许停止该服务
    async fn can_stop(&self, service_name: &str) -> Result<bool>;

    /// 查询服务启动模式
    async fn startup_mode(&self, service_name: &str) -> Result<StartupMode>;

    /// 发出启动命令，命令被接受后立即返回
    async fn start(&self, service_name: &str) -> Result<()>;

    /// 发出停止命令，命令被接受后立即返回
    async fn stop(&self, service_name: &str) -> Result<()>;
}
