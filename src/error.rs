//! 错误处理模块
//!
//! 定义应用程序的统一错误类型

use crate::host::RunState;
use std::time::Duration;
use thiserror::Error;

/// Service Warden 应用程序的主要错误类型
#[derive(Error, Debug)]
pub enum ServiceWardenError {
    /// 服务名称无法解析（服务不存在或已被卸载）
    #[error("服务不存在: {service}")]
    ServiceNotFound { service: String },

    /// 主机拒绝执行命令（权限不足或当前状态不允许）
    #[error("服务 {service} 拒绝执行 {command} 命令: {reason}")]
    CommandRejected {
        service: String,
        command: String,
        reason: String,
    },

    /// 等待状态超时，底层命令可能仍在执行
    #[error("等待服务 {service} 进入 {target} 状态超时 ({waited:?})")]
    Timeout {
        service: String,
        target: RunState,
        waited: Duration,
    },

    /// 级联启动/停止时某个依赖服务失败
    #[error("依赖服务 {dependent} 操作失败: {source}")]
    DependentOperationFailed {
        dependent: String,
        #[source]
        source: Box<ServiceWardenError>,
    },

    /// 依赖关系存在环
    #[error("检测到依赖环: {}", path.join(" -> "))]
    DependencyCycle { path: Vec<String> },

    /// 监控器构造参数非法
    #[error("服务 {service} 的监控参数无效: {reason}")]
    InvalidOptions { service: String, reason: String },

    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 通知相关错误
    #[error("通知错误: {0}")]
    Notification(#[from] NotificationError),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON序列化/反序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

impl ServiceWardenError {
    /// 构造命令被拒绝错误
    pub fn rejected(
        service: impl Into<String>,
        command: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::CommandRejected {
            service: service.into(),
            command: command.into(),
            reason: reason.into(),
        }
    }

    /// 构造服务不存在错误
    pub fn not_found(service: impl Into<String>) -> Self {
        Self::ServiceNotFound {
            service: service.into(),
        }
    }

    /// 是否为服务不存在错误（监控器应被丢弃）
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ServiceNotFound { .. })
    }

    /// 展开依赖包装，返回最底层的错误
    pub fn root_cause(&self) -> &ServiceWardenError {
        match self {
            Self::DependentOperationFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件解析错误
    #[error("配置文件解析失败: {0}")]
    ParseError(String),

    /// 配置验证错误
    #[error("配置验证失败: {0}")]
    ValidationError(String),

    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVarError { var: String },
}

/// 通知错误类型
#[derive(Error, Debug)]
pub enum NotificationError {
    /// 发送失败
    #[error("通知发送失败: {0}")]
    SendError(String),

    /// 模板渲染错误
    #[error("模板渲染失败: {0}")]
    TemplateError(String),

    /// 配置错误
    #[error("通知配置错误: {0}")]
    ConfigError(String),
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, ServiceWardenError>;
