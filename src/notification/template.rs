//! 消息模板模块
//!
//! 基于 handlebars 的消息模板渲染

use crate::monitor::ChangeCause;
use crate::notification::sender::MonitorNotice;
use anyhow::{Context, Result};
use handlebars::Handlebars;
use serde::Serialize;

const TEMPLATE_NAME: &str = "message";

/// 模板上下文数据
#[derive(Debug, Clone, Serialize)]
pub struct TemplateContext {
    /// 服务名称
    pub service_name: String,
    /// 显示名称
    pub display_name: String,
    /// 新状态
    pub state: Option<String>,
    /// 变化前的状态
    pub previous: Option<String>,
    /// 是否为依赖服务
    pub is_dependent: bool,
    /// 颜色提示
    pub color: String,
    /// 是否需要人工处理
    pub needs_attention: bool,
    /// 降级原因
    pub reason: Option<String>,
    /// 监控器关联ID
    pub monitor_id: String,
    /// 时间戳
    pub timestamp: String,
}

impl From<&MonitorNotice> for TemplateContext {
    fn from(notice: &MonitorNotice) -> Self {
        Self {
            service_name: notice.service_name.clone(),
            display_name: notice.display_name.clone(),
            state: notice.state.map(|s| s.to_string()),
            previous: notice.previous.map(|s| s.to_string()),
            is_dependent: notice.cause == Some(ChangeCause::DependentStateChanged),
            color: notice.color.to_string(),
            needs_attention: notice.needs_attention,
            reason: notice.reason.clone(),
            monitor_id: notice.monitor_id.to_string(),
            timestamp: notice
                .timestamp
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
        }
    }
}

/// 消息模板trait
pub trait MessageTemplate: Send + Sync {
    /// 渲染模板
    fn render(&self, context: &TemplateContext) -> Result<String>;
}

/// Handlebars模板
pub struct HandlebarsTemplate {
    registry: Handlebars<'static>,
}

impl HandlebarsTemplate {
    /// 创建新的Handlebars模板，模板语法错误时返回错误
    pub fn new(template: &str) -> Result<Self> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(false);
        // 飞书 lark_md 不需要 HTML 转义
        registry.register_escape_fn(handlebars::no_escape);
        registry
            .register_template_string(TEMPLATE_NAME, template)
            .context("消息模板语法错误")?;
        Ok(Self { registry })
    }

    /// 使用默认模板创建
    pub fn default_template() -> Result<Self> {
        Self::new(&default_state_change_template())
    }
}

impl MessageTemplate for HandlebarsTemplate {
    fn render(&self, context: &TemplateContext) -> Result<String> {
        self.registry
            .render(TEMPLATE_NAME, context)
            .context("渲染消息模板失败")
    }
}

/// 默认的状态变化消息模板
pub fn default_state_change_template() -> String {
    r#"- **服务名称**: {{display_name}} ({{service_name}})
{{#if state}}- **当前状态**: {{state}}
{{/if}}{{#if previous}}- **之前状态**: {{previous}}
{{/if}}{{#if is_dependent}}- **来源**: 级联操作
{{/if}}{{#if reason}}- **错误信息**: {{reason}}
{{/if}}{{#if needs_attention}}- **提示**: 需要人工处理
{{/if}}- **时间**: {{timestamp}}"#
        .to_string()
}
