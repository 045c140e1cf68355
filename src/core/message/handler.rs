//! 中继处理器模块
//!
//! 本模块是中继核心唯一的入口。
//!
//! # 处理流程
//! ```text
//! 1. 身份重映射
//! 2. 分类（查询并消费自发消息登记）
//! 3. 按分类分发（转发 / 自动回复 / 抑制）
//! ```
//!
//! # 关键设计
//! - 所有依赖通过 `HandlerContext` 注入，便于用假实现测试
//! - 外部调用的失败都在处理器内部消化，只记录日志

use std::sync::Arc;
use tracing::{debug, error, info, instrument};

use super::sender::MessageSender;
use super::types::{Classification, MessageEvent, Origin, OutboundMessage};
use crate::core::agent::AutoResponder;
use crate::core::ledger::SelfSendLedger;
use crate::core::routing::{IdentityRemap, MessageClassifier, RelayDispatcher, WebhookTargets};
use crate::infra::error::{Error, Result};
use crate::infra::logging::truncate_for_log;
use crate::webhook::WebhookClient;

/// 中继处理上下文
///
/// # 字段说明
/// * `ledger` - 自发消息登记簿（全进程唯一）
/// * `remap` - 身份重映射表
/// * `webhook` - Webhook 客户端
/// * `sender` - 传输层发送器
/// * `targets` - 转发地址
/// * `responder_url` - 对话 Webhook 地址
#[derive(Clone)]
pub struct HandlerContext {
    pub ledger: Arc<SelfSendLedger>,
    pub remap: IdentityRemap,
    pub webhook: Arc<dyn WebhookClient>,
    pub sender: Arc<dyn MessageSender>,
    pub targets: WebhookTargets,
    pub responder_url: Option<String>,
}

/// 中继处理器
#[derive(Clone)]
pub struct RelayHandler {
    remap: IdentityRemap,
    classifier: MessageClassifier,
    dispatcher: RelayDispatcher,
    ledger: Arc<SelfSendLedger>,
    sender: Arc<dyn MessageSender>,
}

impl RelayHandler {
    pub fn new(ctx: HandlerContext) -> Self {
        let responder = Arc::new(AutoResponder::new(
            ctx.webhook.clone(),
            ctx.responder_url,
            ctx.ledger.clone(),
            ctx.sender.clone(),
        ));
        let dispatcher = RelayDispatcher::new(ctx.webhook, ctx.targets, responder);

        Self {
            remap: ctx.remap,
            classifier: MessageClassifier::new(ctx.ledger.clone()),
            dispatcher,
            ledger: ctx.ledger,
            sender: ctx.sender,
        }
    }

    /// 处理传输层事件
    ///
    /// 所有效果都是副作用（转发、回复、日志），不返回结果
    pub async fn on_message_event(&self, event: MessageEvent) {
        self.handle(event).await;
    }

    /// 处理事件并返回分类结果
    #[instrument(skip(self, event), fields(event_id = %event.id, from_self = event.is_from_self))]
    pub async fn handle(&self, event: MessageEvent) -> Classification {
        let event = self.remap.apply(event);
        let class = self.classifier.classify(&event);
        debug!(
            class = %class,
            sender = %event.sender,
            recipient = %event.recipient,
            text = %truncate_for_log(&event.body, 50),
            "消息已分类"
        );

        self.dispatcher.dispatch(&event, class).await;
        class
    }

    /// 通过控制接口发送消息
    ///
    /// 先登记（api-send）再发送，回显会被识别并抑制
    ///
    /// # 返回值
    /// 传输层返回的消息 ID
    pub async fn send_via_api(&self, recipient: &str, text: &str) -> Result<String> {
        if recipient.trim().is_empty() {
            return Err(Error::Channel("接收方不能为空".to_string()));
        }

        let token = self.ledger.register(recipient, text, Origin::ApiSend);
        debug!(token = %token, "API 发送已登记");

        match self.sender.send(OutboundMessage::new(recipient.trim(), text)).await {
            Ok(message_id) => {
                info!(message_id = %message_id, recipient = %recipient, "API 消息已发送");
                Ok(message_id)
            }
            Err(e) => {
                error!(
                    error = %e,
                    recipient = %recipient,
                    text = %truncate_for_log(text, 50),
                    "API 消息发送失败"
                );
                Err(e)
            }
        }
    }
}
