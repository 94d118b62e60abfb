//! 通知转发任务
//!
//! 订阅监控器事件并转发到通知发送器，发送失败只记录日志

use crate::logging::notification_log;
use crate::monitor::MonitorEvent;
use crate::notification::sender::{MonitorNotice, NotificationSender};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// 通知转发器
pub struct NotificationForwarder {
    /// 通知发送器
    sender: Arc<dyn NotificationSender>,
    /// 监控器特定的webhook URL
    webhook_url: Option<String>,
}

impl NotificationForwarder {
    /// 创建转发器
    pub fn new(sender: Arc<dyn NotificationSender>, webhook_url: Option<String>) -> Self {
        Self {
            sender,
            webhook_url,
        }
    }

    /// 转发单个事件
    pub async fn forward(&self, event: &MonitorEvent) {
        let notice = MonitorNotice::from_event(event, self.webhook_url.clone());
        let recipient = notice.webhook_url.as_deref().unwrap_or("default").to_string();

        match self.sender.send_state_change(&notice).await {
            Ok(()) => notification_log("state_change", &recipient, true, None),
            Err(e) => {
                notification_log("state_change", &recipient, false, Some(&e.to_string()))
            }
        }
    }

    /// 启动转发任务，事件通道关闭或收到关闭信号时退出
    pub fn spawn(
        self,
        mut events: broadcast::Receiver<MonitorEvent>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    received = events.recv() => match received {
                        Ok(event) => self.forward(&event).await,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("通知转发落后，丢弃了 {} 条事件", skipped);
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
            debug!("通知转发任务退出");
        })
    }
}
