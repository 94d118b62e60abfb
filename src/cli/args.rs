//! 命令行参数定义
//!
//! 使用clap定义应用程序的命令行接口

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Service Warden - 服务生命周期监控工具
#[derive(Parser, Debug, Clone)]
#[command(
    name = "service-warden",
    version = crate::VERSION,
    about = crate::APP_DESCRIPTION,
    long_about = None
)]
pub struct Args {
    /// 配置文件路径
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "配置文件路径",
        env = "SERVICE_WARDEN_CONFIG",
        global = true
    )]
    pub config: Option<PathBuf>,

    /// 日志级别
    #[arg(
        short,
        long,
        value_enum,
        default_value = "info",
        help = "日志级别",
        env = "SERVICE_WARDEN_LOG_LEVEL",
        global = true
    )]
    pub log_level: LogLevel,

    /// 是否启用详细输出
    #[arg(
        short,
        long,
        help = "启用详细输出",
        env = "SERVICE_WARDEN_VERBOSE",
        global = true
    )]
    pub verbose: bool,

    /// 使用 systemd 用户实例
    #[arg(long, help = "使用 systemd --user 实例", global = true)]
    pub user: bool,

    /// 子命令
    #[command(subcommand)]
    pub command: Commands,
}

/// 日志级别枚举
#[derive(ValueEnum, Clone, Debug, PartialEq)]
pub enum LogLevel {
    /// 调试级别
    Debug,
    /// 信息级别
    Info,
    /// 警告级别
    Warn,
    /// 错误级别
    Error,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// 子命令定义
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// 持续监控配置中的服务，直到收到 Ctrl-C
    Watch {
        /// 状态文件路径，每次状态变化后写入
        #[arg(long, value_name = "FILE", help = "状态文件路径")]
        status_file: Option<PathBuf>,

        /// 不转发通知
        #[arg(long, help = "不转发通知")]
        no_notify: bool,
    },

    /// 查看服务当前状态
    Status {
        /// 服务名称（可选，不指定则显示所有配置的服务）
        #[arg(value_name = "SERVICE", help = "服务名称")]
        service: Option<String>,

        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },

    /// 启动服务及其依赖服务
    Start {
        /// 服务名称
        #[arg(value_name = "SERVICE", help = "服务名称")]
        service: String,

        /// 单次状态过渡的等待超时（秒）
        #[arg(
            short,
            long,
            value_name = "SECONDS",
            value_parser = clap::value_parser!(u64).range(1..=86_400),
            help = "等待超时时间（秒，1-86400）"
        )]
        timeout: Option<u64>,
    },

    /// 停止依赖服务及服务本身
    Stop {
        /// 服务名称
        #[arg(value_name = "SERVICE", help = "服务名称")]
        service: String,

        /// 单次状态过渡的等待超时（秒）
        #[arg(
            short,
            long,
            value_name = "SECONDS",
            value_parser = clap::value_parser!(u64).range(1..=86_400),
            help = "等待超时时间（秒，1-86400）"
        )]
        timeout: Option<u64>,
    },

    /// 重启服务及其依赖服务
    Restart {
        /// 服务名称
        #[arg(value_name = "SERVICE", help = "服务名称")]
        service: String,

        /// 单次状态过渡的等待超时（秒）
        #[arg(
            short,
            long,
            value_name = "SECONDS",
            value_parser = clap::value_parser!(u64).range(1..=86_400),
            help = "等待超时时间（秒，1-86400）"
        )]
        timeout: Option<u64>,
    },

    /// 初始化配置文件
    Init {
        /// 配置文件路径
        #[arg(
            value_name = "FILE",
            help = "配置文件路径",
            default_value = "warden.toml"
        )]
        config_path: PathBuf,

        /// 是否覆盖现有文件
        #[arg(short, long, help = "覆盖现有文件")]
        force: bool,
    },

    /// 验证配置文件
    Validate {
        /// 配置文件路径
        #[arg(value_name = "FILE", help = "配置文件路径")]
        config_path: Option<PathBuf>,
    },

    /// 显示版本信息
    Version {
        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },

    /// 测试通知功能
    TestNotification {
        /// 测试消息内容
        #[arg(short, long, default_value = "这是一条测试消息", help = "测试消息内容")]
        message: String,
    },
}

/// 输出格式枚举
#[derive(ValueEnum, Clone, Debug, PartialEq)]
pub enum OutputFormat {
    /// 文本格式
    Text,
    /// JSON格式
    Json,
}

/// 生命周期命令类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    /// 启动
    Start,
    /// 停止
    Stop,
    /// 重启
    Restart,
}

impl std::fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleAction::Start => write!(f, "start"),
            LifecycleAction::Stop => write!(f, "stop"),
            LifecycleAction::Restart => write!(f, "restart"),
        }
    }
}

impl Args {
    /// 解析命令行参数
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// 获取配置文件路径
    pub fn get_config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(crate::config::get_default_config_path)
    }

    /// 是否启用详细输出
    pub fn is_verbose(&self) -> bool {
        self.verbose || matches!(self.log_level, LogLevel::Debug)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lifecycle_command() {
        let args = Args::try_parse_from([
            "service-warden",
            "--config",
            "/etc/warden.toml",
            "restart",
            "postgresql",
            "--timeout",
            "60",
        ])
        .unwrap();

        assert_eq!(args.get_config_path(), PathBuf::from("/etc/warden.toml"));
        match args.command {
            Commands::Restart { service, timeout } => {
                assert_eq!(service, "postgresql");
                assert_eq!(timeout, Some(60));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_timeout_out_of_range_is_rejected() {
        for value in ["0", "86401", "18446744073709551615"] {
            let result =
                Args::try_parse_from(["service-warden", "start", "postgresql", "--timeout", value]);
            assert!(result.is_err(), "timeout {value} 应被拒绝");
        }

        let args =
            Args::try_parse_from(["service-warden", "stop", "postgresql", "-t", "86400"]).unwrap();
        assert!(matches!(
            args.command,
            Commands::Stop {
                timeout: Some(86_400),
                ..
            }
        ));
    }

    #[test]
    fn test_parse_status_json() {
        let args =
            Args::try_parse_from(["service-warden", "status", "--format", "json"]).unwrap();
        assert!(matches!(
            args.command,
            Commands::Status {
                service: None,
                format: OutputFormat::Json
            }
        ));
    }

    #[test]
    fn test_debug_level_is_verbose() {
        let args =
            Args::try_parse_from(["service-warden", "--log-level", "debug", "validate"]).unwrap();
        assert!(args.is_verbose());
    }
}
