//! 通知模块
//!
//! 提供飞书通知、消息模板和事件转发功能

pub mod feishu;
pub mod forwarder;
pub mod sender;
pub mod template;

// 重新导出主要类型
pub use feishu::FeishuSender;
pub use forwarder::NotificationForwarder;
pub use sender::{MessageType, MonitorNotice, NoOpSender, NotificationMessage, NotificationSender};
pub use template::{HandlebarsTemplate, MessageTemplate, TemplateContext};
