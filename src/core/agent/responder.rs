//! 自动回复器模块
//!
//! # 处理流程
//! ```text
//! 1. 正文为空 → 不处理
//! 2. 调用对话 Webhook，请求体 {msg, from, to, from_name}
//! 3. 响应中 output 非空 → 先登记到自发消息登记簿（bot-reply），再发送
//! ```
//!
//! 任何失败都只记录日志，不会影响后续事件的处理。

use std::sync::Arc;
use tracing::{debug, error, info, instrument};

use crate::core::ledger::SelfSendLedger;
use crate::core::message::sender::MessageSender;
use crate::core::message::types::{MessageEvent, Origin, OutboundMessage};
use crate::infra::error::Result;
use crate::infra::logging::truncate_for_log;
use crate::webhook::{ResponderReply, ResponderRequest, WebhookClient};

/// 自动回复结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponderOutcome {
    /// 正文为空，未处理
    EmptyBody,
    /// 未配置对话 Webhook
    NotConfigured,
    /// Webhook 没有给出回复
    NoReply,
    /// 已发送回复
    Replied {
        /// 传输层返回的消息 ID
        message_id: String,
    },
    /// Webhook 调用或发送失败（已记录日志）
    Failed(String),
}

/// 自动回复器
#[derive(Clone)]
pub struct AutoResponder {
    webhook: Arc<dyn WebhookClient>,
    responder_url: Option<String>,
    ledger: Arc<SelfSendLedger>,
    sender: Arc<dyn MessageSender>,
}

impl AutoResponder {
    /// 创建自动回复器
    ///
    /// # 参数说明
    /// * `webhook` - Webhook 客户端
    /// * `responder_url` - 对话 Webhook 地址，为 None 时不回复
    /// * `ledger` - 自发消息登记簿
    /// * `sender` - 传输层发送器
    pub fn new(
        webhook: Arc<dyn WebhookClient>,
        responder_url: Option<String>,
        ledger: Arc<SelfSendLedger>,
        sender: Arc<dyn MessageSender>,
    ) -> Self {
        Self {
            webhook,
            responder_url,
            ledger,
            sender,
        }
    }

    /// 对入站消息做自动回复
    #[instrument(skip(self, event), fields(sender = %event.sender))]
    pub async fn respond(&self, event: &MessageEvent) -> ResponderOutcome {
        if event.body.is_empty() {
            debug!("消息正文为空，不自动回复");
            return ResponderOutcome::EmptyBody;
        }
        let Some(url) = self.responder_url.as_deref() else {
            debug!("未配置对话 Webhook，不自动回复");
            return ResponderOutcome::NotConfigured;
        };

        match self.try_respond(url, event).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    error = %e,
                    recipient = %event.sender,
                    text = %truncate_for_log(&event.body, 50),
                    "自动回复失败"
                );
                ResponderOutcome::Failed(e.to_string())
            }
        }
    }

    async fn try_respond(&self, url: &str, event: &MessageEvent) -> Result<ResponderOutcome> {
        let request = serde_json::to_value(ResponderRequest::from_event(event))?;
        let response = self.webhook.post(url, &request).await?;

        let Some(reply) = ResponderReply::from_json(&response).output else {
            info!("对话 Webhook 没有返回回复内容");
            return Ok(ResponderOutcome::NoReply);
        };

        // 先登记再发送，回显不会被当作管理员消息
        let token = self.ledger.register(&event.sender, &reply, Origin::BotReply);
        debug!(token = %token, "自动回复已登记");

        let message_id = self
            .sender
            .send(OutboundMessage::new(event.sender.clone(), reply.clone()))
            .await?;

        info!(
            message_id = %message_id,
            text = %truncate_for_log(&reply, 50),
            "自动回复已发送"
        );
        Ok(ResponderOutcome::Replied { message_id })
    }
}
