//! 配置数据结构定义
//!
//! 定义应用程序的配置结构体和验证逻辑

use crate::monitor::{detect_cycle, DependencyGraph, MonitorOptions};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use uuid::Uuid;

/// 主配置结构，包含全局配置和监控列表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// 全局配置项
    pub global: GlobalConfig,
    /// 监控配置列表
    pub monitors: Vec<MonitorConfig>,
}

/// 全局配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 轮询间隔（毫秒）
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// 单次状态过渡超时（秒）
    #[serde(default = "default_transition_timeout")]
    pub transition_timeout_seconds: u64,
    /// 等待状态时的查询间隔（毫秒）
    #[serde(default = "default_wait_poll_interval_ms")]
    pub wait_poll_interval_ms: u64,
    /// 默认飞书webhook URL
    pub default_feishu_webhook_url: Option<String>,
    /// 飞书签名密钥
    pub feishu_secret: Option<String>,
    /// 消息模板
    pub message_template: Option<String>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            poll_interval_ms: default_poll_interval_ms(),
            transition_timeout_seconds: default_transition_timeout(),
            wait_poll_interval_ms: default_wait_poll_interval_ms(),
            default_feishu_webhook_url: None,
            feishu_secret: None,
            message_template: None,
        }
    }
}

/// 单个监控器配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitorConfig {
    /// 主服务名称
    pub service: String,
    /// 关联ID
    pub correlation_id: Option<Uuid>,
    /// 监控器特定的轮询间隔（毫秒）
    pub poll_interval_ms: Option<u64>,
    /// 依赖服务，按声明顺序启动/停止
    #[serde(default)]
    pub dependents: Vec<String>,
    /// 是否启用
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 是否转发通知
    #[serde(default = "default_enabled")]
    pub notify: bool,
    /// 监控器特定的飞书webhook URL
    pub feishu_webhook_url: Option<String>,
    /// 描述
    pub description: Option<String>,
}

impl MonitorConfig {
    /// 创建只包含服务名称的配置
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            correlation_id: None,
            poll_interval_ms: None,
            dependents: Vec::new(),
            enabled: true,
            notify: true,
            feishu_webhook_url: None,
            description: None,
        }
    }

    /// 合并全局配置，生成监控器构造参数
    pub fn to_options(&self, global: &GlobalConfig) -> MonitorOptions {
        let poll_interval_ms = self.poll_interval_ms.unwrap_or(global.poll_interval_ms);
        let mut options = MonitorOptions::new(self.service.clone())
            .with_poll_interval(Duration::from_millis(poll_interval_ms))
            .with_dependents(self.dependents.iter().cloned())
            .with_transition_timeout(Duration::from_secs(global.transition_timeout_seconds))
            .with_wait_poll_interval(Duration::from_millis(global.wait_poll_interval_ms));

        if let Some(id) = self.correlation_id {
            options = options.with_correlation_id(id);
        }
        options
    }

    /// 生效的webhook URL
    pub fn webhook_url<'a>(&'a self, global: &'a GlobalConfig) -> Option<&'a str> {
        self.feishu_webhook_url
            .as_deref()
            .or(global.default_feishu_webhook_url.as_deref())
    }
}

impl Config {
    /// 按服务名称查找监控配置
    pub fn find_monitor(&self, service: &str) -> Option<&MonitorConfig> {
        self.monitors.iter().find(|m| m.service == service)
    }

    /// 已启用的监控配置
    pub fn enabled_monitors(&self) -> impl Iterator<Item = &MonitorConfig> {
        self.monitors.iter().filter(|m| m.enabled)
    }

    /// 构建依赖图
    pub fn dependency_graph(&self) -> DependencyGraph {
        self.monitors
            .iter()
            .map(|m| (m.service.clone(), m.dependents.clone()))
            .collect()
    }
}

// 默认值函数
fn default_log_level() -> String {
    "info".to_string()
}
fn default_poll_interval_ms() -> u64 {
    500
}
fn default_transition_timeout() -> u64 {
    30
}
fn default_wait_poll_interval_ms() -> u64 {
    250
}
fn default_enabled() -> bool {
    true
}

/// 状态过渡超时的上限（秒），即一天
pub const MAX_TRANSITION_TIMEOUT_SECONDS: u64 = 86_400;

/// 服务名称是否只包含 systemd 单元允许的字符
fn is_valid_unit_name(name: &str) -> bool {
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, ':' | '-' | '_' | '.' | '\\' | '@'))
}

/// 配置验证函数
///
/// # 参数
/// * `config` - 要验证的配置
///
/// # 返回
/// * `Result<(), String>` - 验证结果，错误时返回错误信息
pub fn validate_config(config: &Config) -> Result<(), String> {
    // 验证全局配置
    if config.global.poll_interval_ms == 0 {
        return Err("轮询间隔不能为0".to_string());
    }

    if config.global.transition_timeout_seconds == 0 {
        return Err("状态过渡超时不能为0".to_string());
    }

    if config.global.transition_timeout_seconds > MAX_TRANSITION_TIMEOUT_SECONDS {
        return Err(format!(
            "状态过渡超时不能超过 {} 秒",
            MAX_TRANSITION_TIMEOUT_SECONDS
        ));
    }

    if config.global.wait_poll_interval_ms == 0 {
        return Err("等待查询间隔不能为0".to_string());
    }

    // 验证日志级别
    let valid_log_levels = ["debug", "info", "warn", "error"];
    if !valid_log_levels.contains(&config.global.log_level.as_str()) {
        return Err(format!(
            "无效的日志级别: {}，支持的级别: {:?}",
            config.global.log_level, valid_log_levels
        ));
    }

    // 验证监控配置
    if config.monitors.is_empty() {
        return Err("至少需要配置一个监控".to_string());
    }

    let mut names = HashSet::new();
    for monitor in &config.monitors {
        let service = monitor.service.trim();
        if service.is_empty() {
            return Err("服务名称不能为空".to_string());
        }

        if !is_valid_unit_name(service) {
            return Err(format!("服务名称 {} 包含非法字符", monitor.service));
        }

        if !names.insert(service) {
            return Err(format!("服务 {} 重复配置", monitor.service));
        }

        if let Some(interval) = monitor.poll_interval_ms {
            if interval == 0 {
                return Err(format!("服务 {} 的轮询间隔不能为0", monitor.service));
            }
        }

        let mut dependents = HashSet::new();
        for dependent in &monitor.dependents {
            if dependent.trim().is_empty() {
                return Err(format!("服务 {} 的依赖服务名称不能为空", monitor.service));
            }
            if !is_valid_unit_name(dependent) {
                return Err(format!("依赖服务名称 {} 包含非法字符", dependent));
            }
            if dependent == &monitor.service {
                return Err(format!("服务 {} 不能依赖自身", monitor.service));
            }
            if !dependents.insert(dependent.as_str()) {
                return Err(format!(
                    "服务 {} 的依赖服务 {} 重复",
                    monitor.service, dependent
                ));
            }
        }

        if let Some(url) = &monitor.feishu_webhook_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(format!("服务 {} 的webhook URL格式无效", monitor.service));
            }
        }
    }

    if let Some(path) = detect_cycle(&config.dependency_graph()) {
        return Err(format!("检测到依赖环: {}", path.join(" -> ")));
    }

    Ok(())
}
