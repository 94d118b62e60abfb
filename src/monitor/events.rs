//! 监控事件定义
//!
//! 监控器通过广播通道向订阅者发送的通知类型

use crate::host::{RunState, ServiceIdentity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 状态变化的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeCause {
    /// 主服务状态变化（轮询发现或命令引起）
    PrimaryStateChanged,
    /// 级联操作使依赖服务到达目标状态
    DependentStateChanged,
}

/// 状态变化通知
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    /// 监控器关联ID
    pub monitor_id: Uuid,
    /// 发生变化的服务（主服务或依赖服务）
    pub service: ServiceIdentity,
    /// 变化来源
    pub cause: ChangeCause,
    /// 新状态
    pub state: RunState,
    /// 变化前缓存的状态（依赖服务为 None）
    pub previous: Option<RunState>,
    /// 事件时间
    pub timestamp: DateTime<Utc>,
}

/// 监控事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// 服务状态变化
    StateChanged(StateChange),
    /// 轮询读取失败，监控器暂时无法获取状态
    Degraded {
        /// 监控器关联ID
        monitor_id: Uuid,
        /// 主服务
        service: ServiceIdentity,
        /// 失败原因
        reason: String,
        /// 事件时间
        timestamp: DateTime<Utc>,
    },
}

impl MonitorEvent {
    /// 事件所属的监控器ID
    pub fn monitor_id(&self) -> Uuid {
        match self {
            MonitorEvent::StateChanged(change) => change.monitor_id,
            MonitorEvent::Degraded { monitor_id, .. } => *monitor_id,
        }
    }

    /// 事件涉及的服务
    pub fn service(&self) -> &ServiceIdentity {
        match self {
            MonitorEvent::StateChanged(change) => &change.service,
            MonitorEvent::Degraded { service, .. } => service,
        }
    }

    /// 事件时间
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            MonitorEvent::StateChanged(change) => change.timestamp,
            MonitorEvent::Degraded { timestamp, .. } => *timestamp,
        }
    }

    /// 状态变化事件携带的新状态
    pub fn state(&self) -> Option<RunState> {
        match self {
            MonitorEvent::StateChanged(change) => Some(change.state),
            MonitorEvent::Degraded { .. } => None,
        }
    }

    /// 是否为主服务状态变化
    pub fn is_primary_change(&self) -> bool {
        matches!(
            self,
            MonitorEvent::StateChanged(StateChange {
                cause: ChangeCause::PrimaryStateChanged,
                ..
            })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_tagged() {
        let event = MonitorEvent::Degraded {
            monitor_id: Uuid::nil(),
            service: ServiceIdentity::new("alpha", "Alpha"),
            reason: "服务不存在: alpha".to_string(),
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "degraded");
        assert_eq!(json["service"]["service_name"], "alpha");
        assert!(event.state().is_none());
        assert!(!event.is_primary_change());
    }

    #[test]
    fn test_state_change_accessors() {
        let event = MonitorEvent::StateChanged(StateChange {
            monitor_id: Uuid::nil(),
            service: ServiceIdentity::new("alpha", "Alpha"),
            cause: ChangeCause::PrimaryStateChanged,
            state: RunState::Running,
            previous: Some(RunState::Stopped),
            timestamp: Utc::now(),
        });

        assert_eq!(event.state(), Some(RunState::Running));
        assert_eq!(event.service().service_name, "alpha");
        assert!(event.is_primary_change());
    }
}
