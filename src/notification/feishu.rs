//! 飞书通知发送器模块
//!
//! 实现飞书webhook通知功能，支持签名校验

use crate::notification::sender::{
    MessageType, MonitorNotice, NotificationMessage, NotificationSender,
};
use crate::notification::template::{HandlebarsTemplate, MessageTemplate, TemplateContext};
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde_json::{json, Value};
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, error, info};

type HmacSha256 = Hmac<Sha256>;

/// 飞书通知发送器
pub struct FeishuSender {
    /// HTTP客户端
    client: Client,
    /// 默认webhook URL
    default_webhook_url: Option<String>,
    /// 签名密钥
    secret: Option<String>,
    /// 消息模板
    template: HandlebarsTemplate,
}

impl FeishuSender {
    /// 创建新的飞书发送器
    ///
    /// # 参数
    /// * `default_webhook_url` - 默认webhook URL
    /// * `message_template` - 自定义消息模板，None 时使用默认模板
    pub fn new(default_webhook_url: Option<String>, message_template: Option<&str>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("创建HTTP客户端失败")?;

        let template = match message_template {
            Some(template) => HandlebarsTemplate::new(template)?,
            None => HandlebarsTemplate::default_template()?,
        };

        Ok(Self {
            client,
            default_webhook_url,
            secret: None,
            template,
        })
    }

    /// 设置签名密钥
    pub fn with_secret(mut self, secret: Option<String>) -> Self {
        self.secret = secret.filter(|s| !s.is_empty());
        self
    }

    /// 构建飞书消息体
    fn build_message_body(&self, message: &NotificationMessage, color: &str) -> Value {
        let mut body = json!({
            "msg_type": "interactive",
            "card": {
                "elements": [
                    {
                        "tag": "div",
                        "text": {
                            "content": message.content,
                            "tag": "lark_md"
                        }
                    }
                ],
                "header": {
                    "title": {
                        "content": message.title,
                        "tag": "plain_text"
                    },
                    "template": color
                }
            }
        });

        if let Some(secret) = &self.secret {
            let timestamp = chrono::Utc::now().timestamp();
            match sign(timestamp, secret) {
                Ok(signature) => {
                    body["timestamp"] = json!(timestamp.to_string());
                    body["sign"] = json!(signature);
                }
                Err(e) => error!("生成飞书签名失败: {}", e),
            }
        }

        body
    }

    /// 发送消息到飞书
    async fn send_to_webhook(&self, webhook_url: &str, body: &Value) -> Result<()> {
        debug!("发送消息到飞书webhook: {}", webhook_url);

        let response = self
            .client
            .post(webhook_url)
            .json(body)
            .send()
            .await
            .context("发送飞书消息失败")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!("飞书消息发送失败: {} - {}", status, text);
            return Err(anyhow::anyhow!("飞书消息发送失败: {}", status));
        }

        // 飞书在 HTTP 200 中通过 code 字段报告业务错误
        let payload: Value = response.json().await.unwrap_or(Value::Null);
        match payload.get("code").and_then(Value::as_i64) {
            Some(0) | None => {
                info!("飞书消息发送成功");
                Ok(())
            }
            Some(code) => {
                let msg = payload
                    .get("msg")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                error!("飞书返回错误: {} - {}", code, msg);
                Err(anyhow::anyhow!("飞书返回错误 {}: {}", code, msg))
            }
        }
    }

    fn default_url(&self) -> Result<&str> {
        self.default_webhook_url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("未配置默认飞书webhook URL"))
    }
}

/// 计算飞书机器人签名
///
/// 以 `timestamp + "\n" + secret` 为密钥对空消息做 HMAC-SHA256，再做 base64 编码
pub fn sign(timestamp: i64, secret: &str) -> Result<String> {
    let string_to_sign = format!("{}\n{}", timestamp, secret);
    let mac = HmacSha256::new_from_slice(string_to_sign.as_bytes())
        .map_err(|e| anyhow::anyhow!("无效的签名密钥: {}", e))?;
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

#[async_trait]
impl NotificationSender for FeishuSender {
    async fn send_state_change(&self, notice: &MonitorNotice) -> Result<()> {
        let webhook_url = match notice
            .webhook_url
            .as_deref()
            .or(self.default_webhook_url.as_deref())
        {
            Some(url) => url,
            None => {
                debug!("服务 {} 未配置飞书webhook URL，跳过通知", notice.service_name);
                return Ok(());
            }
        };

        let content = self.template.render(&TemplateContext::from(notice))?;
        let message = NotificationMessage {
            title: notice.title(),
            content,
            service_name: notice.service_name.clone(),
            message_type: notice.message_type(),
        };

        let body = self.build_message_body(&message, notice.color.card_template());
        self.send_to_webhook(webhook_url, &body).await
    }

    async fn send_message(&self, message: &NotificationMessage) -> Result<()> {
        let webhook_url = self.default_url()?;
        let color = match message.message_type {
            MessageType::Alert => "red",
            MessageType::Recovery => "green",
            MessageType::Transition => "yellow",
            MessageType::Info => "blue",
        };

        let body = self.build_message_body(message, color);
        self.send_to_webhook(webhook_url, &body).await
    }

    async fn test_connection(&self) -> Result<()> {
        let test_message = NotificationMessage {
            title: "连接测试".to_string(),
            content: "这是一条测试消息，用于验证飞书webhook连接是否正常。".to_string(),
            service_name: "test".to_string(),
            message_type: MessageType::Info,
        };

        self.send_message(&test_message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_is_deterministic() {
        let a = sign(1_700_000_000, "secret").unwrap();
        let b = sign(1_700_000_000, "secret").unwrap();
        let c = sign(1_700_000_001, "secret").unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        // SHA256 摘要 32 字节，base64 后 44 个字符
        assert_eq!(a.len(), 44);
    }

    #[test]
    fn test_body_contains_signature_when_secret_set() {
        let sender = FeishuSender::new(None, None)
            .unwrap()
            .with_secret(Some("secret".to_string()));
        let message = NotificationMessage {
            title: "t".to_string(),
            content: "c".to_string(),
            service_name: "alpha".to_string(),
            message_type: MessageType::Info,
        };

        let body = sender.build_message_body(&message, "red");
        assert!(body.get("sign").is_some());
        assert!(body.get("timestamp").is_some());
        assert_eq!(body["card"]["header"]["template"], "red");
    }

    #[test]
    fn test_body_without_secret() {
        let sender = FeishuSender::new(None, None)
            .unwrap()
            .with_secret(Some(String::new()));
        let message = NotificationMessage {
            title: "t".to_string(),
            content: "c".to_string(),
            service_name: "alpha".to_string(),
            message_type: MessageType::Info,
        };

        let body = sender.build_message_body(&message, "green");
        assert!(body.get("sign").is_none());
    }

    #[tokio::test]
    async fn test_send_message_requires_default_url() {
        let sender = FeishuSender::new(None, None).unwrap();
        assert!(sender.test_connection().await.is_err());
    }
}
