//! 中继分发器模块
//!
//! 按分类结果执行外部动作，本身不做判断：
//!
//! | 分类 | 动作 |
//! |------|------|
//! | 回显 | 仅记录日志 |
//! | 管理员出站 | 转发到出站 Webhook |
//! | 群聊 | 无 |
//! | 私聊入站 | 转发到入站 Webhook，同时触发自动回复 |
//!
//! 所有转发都是尽力而为：失败只记录日志，不重试，也不向调用方抛出。

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::core::agent::AutoResponder;
use crate::core::message::types::{Classification, MessageEvent};
use crate::infra::config::WebhookConfig;
use crate::infra::error::Result;
use crate::infra::logging::truncate_for_log;
use crate::webhook::{Direction, ForwardPayload, WebhookClient};

/// 转发目标
#[derive(Debug, Clone, Default)]
pub struct WebhookTargets {
    /// 入站消息转发地址
    pub inbound_url: Option<String>,
    /// 管理员出站消息转发地址
    pub outbound_url: Option<String>,
}

impl WebhookTargets {
    pub fn from_config(config: &WebhookConfig) -> Self {
        Self {
            inbound_url: config.inbound_url.clone(),
            outbound_url: config.outbound_url.clone(),
        }
    }

    fn url_for(&self, direction: Direction) -> Option<&str> {
        match direction {
            Direction::Inbound => self.inbound_url.as_deref(),
            Direction::Outbound => self.outbound_url.as_deref(),
        }
    }
}

/// 中继分发器
#[derive(Clone)]
pub struct RelayDispatcher {
    webhook: Arc<dyn WebhookClient>,
    targets: WebhookTargets,
    responder: Arc<AutoResponder>,
}

impl RelayDispatcher {
    pub fn new(webhook: Arc<dyn WebhookClient>, targets: WebhookTargets, responder: Arc<AutoResponder>) -> Self {
        Self {
            webhook,
            targets,
            responder,
        }
    }

    /// 分发已分类的事件
    pub async fn dispatch(&self, event: &MessageEvent, class: Classification) {
        match class {
            Classification::SuppressedEcho(origin) => {
                debug!(
                    recipient = %event.recipient,
                    origin = %origin,
                    text = %truncate_for_log(&event.body, 50),
                    "识别为自发消息回显，已抑制"
                );
            }
            Classification::AdminOutbound => {
                info!(recipient = %event.recipient, "转发管理员出站消息");
                self.forward_logged(event, Direction::Outbound).await;
            }
            Classification::GroupIgnored => {
                debug!(sender = %event.sender, "群聊消息，忽略");
            }
            Classification::PersonalInbound => {
                info!(sender = %event.sender, "私聊消息，转发并触发自动回复");
                // 两个动作互不依赖，一个失败不影响另一个
                let (_, outcome) = tokio::join!(
                    self.forward_logged(event, Direction::Inbound),
                    self.responder.respond(event),
                );
                debug!(outcome = ?outcome, "自动回复处理完成");
            }
        }
    }

    async fn forward_logged(&self, event: &MessageEvent, direction: Direction) {
        if let Err(e) = self.forward(event, direction).await {
            error!(
                error = %e,
                direction = ?direction,
                sender = %event.sender,
                recipient = %event.recipient,
                text = %truncate_for_log(&event.body, 50),
                "转发消息失败"
            );
        }
    }

    /// 转发到对应方向的 Webhook
    ///
    /// # 返回值
    /// 已转发返回 `true`，未配置地址返回 `false`
    pub async fn forward(&self, event: &MessageEvent, direction: Direction) -> Result<bool> {
        let Some(url) = self.targets.url_for(direction) else {
            warn!(direction = ?direction, "未配置转发地址，跳过转发");
            return Ok(false);
        };

        let payload = serde_json::to_value(ForwardPayload::from_event(event, direction))?;
        self.webhook.post(url, &payload).await?;
        debug!(direction = ?direction, url = url, "消息已转发");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::agent::ResponderOutcome;
    use crate::core::ledger::{LedgerWindows, ManualClock, SelfSendLedger};
    use crate::core::message::sender::MessageSender;
    use crate::core::message::types::{Origin, OutboundMessage};
    use crate::core::routing::recipient::RecipientMatcher;
    use crate::infra::error::Error;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{json, Value};

    #[derive(Default)]
    struct FakeWebhook {
        calls: Mutex<Vec<(String, Value)>>,
        fail_urls: Vec<String>,
    }

    #[async_trait]
    impl WebhookClient for FakeWebhook {
        async fn post(&self, url: &str, payload: &Value) -> Result<Value> {
            self.calls.lock().push((url.to_string(), payload.clone()));
            if self.fail_urls.iter().any(|u| u == url) {
                return Err(Error::Webhook("boom".to_string()));
            }
            Ok(json!({"output": "auto"}))
        }
    }

    #[derive(Default)]
    struct FakeSender {
        sent: Mutex<Vec<OutboundMessage>>,
    }

    #[async_trait]
    impl MessageSender for FakeSender {
        async fn send(&self, message: OutboundMessage) -> Result<String> {
            self.sent.lock().push(message);
            Ok("wamid-1".to_string())
        }
    }

    struct Fixture {
        dispatcher: RelayDispatcher,
        webhook: Arc<FakeWebhook>,
        sender: Arc<FakeSender>,
    }

    fn fixture(fail_urls: Vec<String>) -> Fixture {
        let webhook = Arc::new(FakeWebhook {
            fail_urls,
            ..Default::default()
        });
        let sender = Arc::new(FakeSender::default());
        let ledger = Arc::new(SelfSendLedger::new(
            LedgerWindows::default(),
            RecipientMatcher::default(),
            Arc::new(ManualClock::at_epoch()),
        ));
        let responder = Arc::new(AutoResponder::new(
            webhook.clone(),
            Some("http://hooks/bot".to_string()),
            ledger,
            sender.clone(),
        ));
        let targets = WebhookTargets {
            inbound_url: Some("http://hooks/in".to_string()),
            outbound_url: Some("http://hooks/out".to_string()),
        };
        Fixture {
            dispatcher: RelayDispatcher::new(webhook.clone(), targets, responder),
            webhook,
            sender,
        }
    }

    fn event(body: &str) -> MessageEvent {
        MessageEvent {
            sender: "15551234@c.us".to_string(),
            recipient: "15550000@c.us".to_string(),
            body: body.to_string(),
            sender_display_name: Some("Alice".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_admin_outbound_is_forwarded() {
        let f = fixture(vec![]);
        f.dispatcher.dispatch(&event("note"), Classification::AdminOutbound).await;

        let calls = f.webhook.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "http://hooks/out");
        assert_eq!(calls[0].1["direction"], "outbound");
        assert_eq!(calls[0].1["msg"], "note");
        assert!(f.sender.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_echo_and_group_have_no_effects() {
        let f = fixture(vec![]);
        f.dispatcher
            .dispatch(&event("x"), Classification::SuppressedEcho(Origin::BotReply))
            .await;
        f.dispatcher.dispatch(&event("x"), Classification::GroupIgnored).await;

        assert!(f.webhook.calls.lock().is_empty());
        assert!(f.sender.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_inbound_forward_failure_does_not_block_reply() {
        let f = fixture(vec!["http://hooks/in".to_string()]);
        f.dispatcher.dispatch(&event("price?"), Classification::PersonalInbound).await;

        let urls: Vec<String> = f.webhook.calls.lock().iter().map(|(u, _)| u.clone()).collect();
        assert!(urls.contains(&"http://hooks/in".to_string()));
        assert!(urls.contains(&"http://hooks/bot".to_string()));
        assert_eq!(f.sender.sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_unconfigured_target_is_skipped() {
        let f = fixture(vec![]);
        let dispatcher = RelayDispatcher::new(
            f.webhook.clone(),
            WebhookTargets::default(),
            Arc::new(AutoResponder::new(
                f.webhook.clone(),
                None,
                Arc::new(SelfSendLedger::new(
                    LedgerWindows::default(),
                    RecipientMatcher::default(),
                    Arc::new(ManualClock::at_epoch()),
                )),
                f.sender.clone(),
            )),
        );

        assert!(!dispatcher.forward(&event("x"), Direction::Outbound).await.unwrap());
        dispatcher.dispatch(&event("x"), Classification::PersonalInbound).await;
        assert!(f.webhook.calls.lock().is_empty());
        assert_eq!(
            dispatcher.responder.respond(&event("x")).await,
            ResponderOutcome::NotConfigured
        );
    }
}
