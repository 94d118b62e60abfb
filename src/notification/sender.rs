//! 通知发送器模块
//!
//! 定义通知发送的trait、状态变化通知数据和基础实现

use crate::host::RunState;
use crate::monitor::{ChangeCause, MonitorEvent};
use crate::presentation::{needs_attention, status_color, StatusColor};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// 通知消息结构
#[derive(Debug, Clone)]
pub struct NotificationMessage {
    /// 消息标题
    pub title: String,
    /// 消息内容
    pub content: String,
    /// 服务名称
    pub service_name: String,
    /// 消息类型
    pub message_type: MessageType,
}

/// 消息类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// 告警消息
    Alert,
    /// 恢复消息
    Recovery,
    /// 过渡状态消息
    Transition,
    /// 信息消息
    Info,
}

impl MessageType {
    /// 状态对应的消息类型
    pub fn for_state(state: RunState) -> Self {
        match state {
            RunState::Stopped => MessageType::Alert,
            RunState::Running => MessageType::Recovery,
            _ => MessageType::Transition,
        }
    }
}

/// 单条监控事件对应的通知数据
#[derive(Debug, Clone, Serialize)]
pub struct MonitorNotice {
    /// 监控器关联ID
    pub monitor_id: Uuid,
    /// 服务名称
    pub service_name: String,
    /// 显示名称
    pub display_name: String,
    /// 新状态，降级事件为 None
    pub state: Option<RunState>,
    /// 变化前的状态
    pub previous: Option<RunState>,
    /// 变化来源
    pub cause: Option<ChangeCause>,
    /// 颜色提示
    pub color: StatusColor,
    /// 是否需要人工处理
    pub needs_attention: bool,
    /// 降级原因
    pub reason: Option<String>,
    /// 事件时间
    pub timestamp: DateTime<Utc>,
    /// 监控器特定的webhook URL
    pub webhook_url: Option<String>,
}

impl MonitorNotice {
    /// 从监控事件构建通知
    pub fn from_event(event: &MonitorEvent, webhook_url: Option<String>) -> Self {
        let service = event.service();
        match event {
            MonitorEvent::StateChanged(change) => Self {
                monitor_id: change.monitor_id,
                service_name: service.service_name.clone(),
                display_name: service.display_name.clone(),
                state: Some(change.state),
                previous: change.previous,
                cause: Some(change.cause),
                color: status_color(change.state),
                needs_attention: needs_attention(change.state),
                reason: None,
                timestamp: change.timestamp,
                webhook_url,
            },
            MonitorEvent::Degraded {
                monitor_id,
                reason,
                timestamp,
                ..
            } => Self {
                monitor_id: *monitor_id,
                service_name: service.service_name.clone(),
                display_name: service.display_name.clone(),
                state: None,
                previous: None,
                cause: None,
                color: StatusColor::Yellow,
                needs_attention: true,
                reason: Some(reason.clone()),
                timestamp: *timestamp,
                webhook_url,
            },
        }
    }

    /// 消息类型
    pub fn message_type(&self) -> MessageType {
        match self.state {
            Some(state) => MessageType::for_state(state),
            None => MessageType::Alert,
        }
    }

    /// 消息标题
    pub fn title(&self) -> String {
        match self.state {
            Some(RunState::Stopped) => format!("🚨 服务已停止 - {}", self.display_name),
            Some(RunState::Running) => format!("✅ 服务运行中 - {}", self.display_name),
            Some(state) => format!("⏳ 服务{} - {}", state, self.display_name),
            None => format!("⚠️ 无法获取服务状态 - {}", self.display_name),
        }
    }
}

/// 通知发送器trait
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// 发送服务状态变化通知
    ///
    /// # 参数
    /// * `notice` - 通知数据
    ///
    /// # 返回
    /// * `Result<()>` - 发送结果
    async fn send_state_change(&self, notice: &MonitorNotice) -> Result<()>;

    /// 发送自定义消息
    async fn send_message(&self, message: &NotificationMessage) -> Result<()>;

    /// 测试连接
    async fn test_connection(&self) -> Result<()>;
}

/// 空的通知发送器实现（用于测试或禁用通知）
pub struct NoOpSender;

#[async_trait]
impl NotificationSender for NoOpSender {
    async fn send_state_change(&self, _notice: &MonitorNotice) -> Result<()> {
        Ok(())
    }

    async fn send_message(&self, _message: &NotificationMessage) -> Result<()> {
        Ok(())
    }

    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ServiceIdentity;
    use crate::monitor::StateChange;

    #[test]
    fn test_notice_from_state_change() {
        let event = MonitorEvent::StateChanged(StateChange {
            monitor_id: Uuid::nil(),
            service: ServiceIdentity::new("alpha", "Alpha Service"),
            cause: ChangeCause::PrimaryStateChanged,
            state: RunState::Stopped,
            previous: Some(RunState::Running),
            timestamp: Utc::now(),
        });

        let notice = MonitorNotice::from_event(&event, None);
        assert_eq!(notice.color, StatusColor::Red);
        assert!(notice.needs_attention);
        assert_eq!(notice.message_type(), MessageType::Alert);
        assert!(notice.title().contains("Alpha Service"));
    }

    #[test]
    fn test_notice_from_degraded() {
        let event = MonitorEvent::Degraded {
            monitor_id: Uuid::nil(),
            service: ServiceIdentity::new("alpha", "Alpha"),
            reason: "服务不存在: alpha".to_string(),
            timestamp: Utc::now(),
        };

        let notice =
            MonitorNotice::from_event(&event, Some("https://example.com/hook".to_string()));
        assert!(notice.state.is_none());
        assert_eq!(notice.reason.as_deref(), Some("服务不存在: alpha"));
        assert_eq!(notice.webhook_url.as_deref(), Some("https://example.com/hook"));
    }

    #[test]
    fn test_message_type_for_state() {
        assert_eq!(MessageType::for_state(RunState::Running), MessageType::Recovery);
        assert_eq!(MessageType::for_state(RunState::StopPending), MessageType::Transition);
    }

    #[tokio::test]
    async fn test_noop_sender() {
        let sender = NoOpSender;
        tokio_test::assert_ok!(sender.test_connection().await);
    }
}
