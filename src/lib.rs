//! Service Warden - 服务生命周期监控工具
//!
//! 轮询主机上的服务状态，支持：
//! - 状态变化通知与降级提示
//! - 按依赖顺序启动/停止/重启服务
//! - 飞书通知集成
//! - 状态看板与颜色提示
//! - 结构化日志记录

pub mod cli;
pub mod config;
pub mod error;
pub mod host;
pub mod logging;
pub mod monitor;
pub mod notification;
pub mod presentation;
pub mod status;

// 重新导出主要类型
pub use config::{Config, GlobalConfig, MonitorConfig};
pub use error::{Result, ServiceWardenError};
pub use host::{RunState, ServiceHost, ServiceIdentity, StartupMode};
pub use monitor::{CommandOutcome, MonitorEvent, MonitorOptions, MonitorSet, ServiceMonitor};

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
