//! 事件接收服务模块
//!
//! 网关把观察到的每条消息回调到本服务，本服务同时提供控制接口。
//!
//! # 路由
//! | 方法 | 路径 | 说明 |
//! |------|------|------|
//! | POST | `/events` | 网关事件回调，解析后提交到事件队列，返回 202 |
//! | POST | `/api/send` | 控制接口发送 `{to, text}`，回显会被抑制 |
//! | GET | `/health` | 健康检查 |

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use super::events::{parse_payload, ParsedPayload};
use crate::channels::traits::EventSink;
use crate::core::message::handler::RelayHandler;
use crate::infra::error::{Error, Result};

/// 接收服务状态
///
/// # 字段说明
/// * `sink` - 事件接收端（通常是事件队列）
/// * `relay` - 中继处理器，供控制接口发送使用
/// * `group_suffix` - 群聊后缀
#[derive(Clone)]
pub struct IngressState {
    pub sink: Arc<dyn EventSink>,
    pub relay: RelayHandler,
    pub group_suffix: String,
}

/// 控制接口发送请求
#[derive(Debug, Clone, Deserialize)]
pub struct SendRequest {
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub text: String,
}

/// 控制接口发送响应
#[derive(Debug, Clone, Serialize)]
pub struct SendResponse {
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

impl SendResponse {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error.into()),
        }
    }
}

// 网关事件回调
//
// 只有整批都未入队时才返回 503（网关可安全重试）；
// 部分入队时返回 202 并带上丢弃数量，避免重试导致重复转发和重复回复
async fn events_handler(
    State(state): State<IngressState>,
    Json(payload): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let events = match parse_payload(&payload, &state.group_suffix) {
        ParsedPayload::Messages(events) => events,
        ParsedPayload::Ignored(name) => {
            return (StatusCode::ACCEPTED, Json(json!({"accepted": 0, "ignored": name})));
        }
    };

    let total = events.len();
    let mut accepted = 0usize;
    let mut last_error = None;
    for event in events {
        let event_id = event.id.clone();
        match state.sink.submit(event).await {
            Ok(()) => accepted += 1,
            Err(e) => {
                error!(error = %e, event_id = %event_id, "提交消息事件失败，已丢弃");
                last_error = Some(e.to_string());
            }
        }
    }

    let dropped = total - accepted;
    match last_error {
        Some(error) if accepted == 0 => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"accepted": 0, "dropped": dropped, "error": error})),
        ),
        _ => {
            if dropped > 0 {
                warn!(accepted = accepted, dropped = dropped, "部分消息事件未能入队");
            }
            debug!(accepted = accepted, "网关事件已接收");
            (StatusCode::ACCEPTED, Json(json!({"accepted": accepted, "dropped": dropped})))
        }
    }
}

// 控制接口发送
async fn send_handler(
    State(state): State<IngressState>,
    Json(req): Json<SendRequest>,
) -> (StatusCode, Json<SendResponse>) {
    if req.to.trim().is_empty() {
        warn!("控制接口请求缺少接收方");
        return (StatusCode::BAD_REQUEST, Json(SendResponse::failed("缺少接收方 to")));
    }

    match state.relay.send_via_api(&req.to, &req.text).await {
        Ok(message_id) => (
            StatusCode::OK,
            Json(SendResponse {
                success: true,
                message_id: Some(message_id),
                error: None,
            }),
        ),
        Err(e) => (StatusCode::BAD_GATEWAY, Json(SendResponse::failed(e.to_string()))),
    }
}

async fn health_handler() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// 创建 Axum 路由
pub fn create_router(state: IngressState) -> Router {
    Router::new()
        .route("/events", post(events_handler))
        .route("/api/send", post(send_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// 事件接收服务
pub struct IngressServer {
    listener: TcpListener,
    state: IngressState,
}

impl IngressServer {
    /// 绑定监听地址
    pub async fn bind(addr: &str, state: IngressState) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Config(format!("监听地址 {} 绑定失败: {}", addr, e)))?;
        Ok(Self { listener, state })
    }

    /// 实际监听地址
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// 启动服务，直到 `shutdown` 完成
    pub async fn serve<S>(self, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let addr = self.local_addr()?;
        info!(addr = %addr, "事件接收服务已启动");

        axum::serve(self.listener, create_router(self.state))
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("事件接收服务已停止");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ledger::{LedgerWindows, ManualClock, SelfSendLedger};
    use crate::core::message::handler::HandlerContext;
    use crate::core::message::sender::MessageSender;
    use crate::core::message::types::{MessageEvent, OutboundMessage};
    use crate::core::routing::{IdentityRemap, RecipientMatcher, WebhookTargets};
    use crate::webhook::WebhookClient;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::sync::oneshot;

    /// 收集事件；设置 `capacity` 后超出部分被拒绝
    #[derive(Default)]
    struct CollectingSink {
        events: Mutex<Vec<MessageEvent>>,
        capacity: Option<usize>,
    }

    #[async_trait]
    impl EventSink for CollectingSink {
        async fn submit(&self, event: MessageEvent) -> Result<()> {
            let mut events = self.events.lock();
            if self.capacity.is_some_and(|cap| events.len() >= cap) {
                return Err(Error::Channel("队列已满".to_string()));
            }
            events.push(event);
            Ok(())
        }
    }

    struct SilentWebhook;

    #[async_trait]
    impl WebhookClient for SilentWebhook {
        async fn post(&self, _url: &str, _payload: &Value) -> Result<Value> {
            Ok(Value::Null)
        }
    }

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<OutboundMessage>>,
    }

    #[async_trait]
    impl MessageSender for RecordingSender {
        async fn send(&self, message: OutboundMessage) -> Result<String> {
            self.sent.lock().push(message);
            Ok("wamid-42".to_string())
        }
    }

    struct Running {
        base: String,
        sink: Arc<CollectingSink>,
        sender: Arc<RecordingSender>,
        ledger: Arc<SelfSendLedger>,
        stop: oneshot::Sender<()>,
    }

    async fn start(capacity: Option<usize>) -> Running {
        let sink = Arc::new(CollectingSink {
            capacity,
            ..Default::default()
        });
        let sender = Arc::new(RecordingSender::default());
        let ledger = Arc::new(SelfSendLedger::new(
            LedgerWindows::default(),
            RecipientMatcher::default(),
            Arc::new(ManualClock::at_epoch()),
        ));
        let relay = RelayHandler::new(HandlerContext {
            ledger: ledger.clone(),
            remap: IdentityRemap::default(),
            webhook: Arc::new(SilentWebhook),
            sender: sender.clone(),
            targets: WebhookTargets::default(),
            responder_url: None,
        });

        let server = IngressServer::bind(
            "127.0.0.1:0",
            IngressState {
                sink: sink.clone(),
                relay,
                group_suffix: "g.us".to_string(),
            },
        )
        .await
        .unwrap();
        let base = format!("http://{}", server.local_addr().unwrap());

        let (stop, stopped) = oneshot::channel::<()>();
        tokio::spawn(server.serve(async move {
            let _ = stopped.await;
        }));

        Running {
            base,
            sink,
            sender,
            ledger,
            stop,
        }
    }

    #[tokio::test]
    async fn test_events_are_submitted() {
        let running = start(None).await;
        let resp = reqwest::Client::new()
            .post(format!("{}/events", running.base))
            .json(&json!({
                "event": "message",
                "data": {"fromMe": false, "from": "1555@c.us", "to": "1000@c.us", "body": "hi"}
            }))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), reqwest::StatusCode::ACCEPTED);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["accepted"], 1);
        assert_eq!(running.sink.events.lock()[0].body, "hi");
        let _ = running.stop.send(());
    }

    #[tokio::test]
    async fn test_rejected_submit_returns_503() {
        let running = start(Some(0)).await;
        let resp = reqwest::Client::new()
            .post(format!("{}/events", running.base))
            .json(&json!({"from": "1555@c.us", "to": "1000@c.us", "body": "hi"}))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
        let _ = running.stop.send(());
    }

    #[tokio::test]
    async fn test_partially_queued_batch_is_not_retryable() {
        let running = start(Some(1)).await;
        let resp = reqwest::Client::new()
            .post(format!("{}/events", running.base))
            .json(&json!({
                "event": "messages.upsert",
                "data": [
                    {"key": {"remoteJid": "1555@s.whatsapp.net", "fromMe": false, "id": "A1"}, "message": {"conversation": "first"}},
                    {"key": {"remoteJid": "1666@s.whatsapp.net", "fromMe": false, "id": "A2"}, "message": {"conversation": "second"}}
                ]
            }))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), reqwest::StatusCode::ACCEPTED);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["accepted"], 1);
        assert_eq!(body["dropped"], 1);
        let events = running.sink.events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].body, "first");
        drop(events);
        let _ = running.stop.send(());
    }

    #[tokio::test]
    async fn test_api_send_registers_and_sends() {
        let running = start(None).await;
        let resp = reqwest::Client::new()
            .post(format!("{}/api/send", running.base))
            .json(&json!({"to": "15551234@c.us", "text": "hello"}))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["message_id"], "wamid-42");
        assert_eq!(running.ledger.len(), 1);
        assert_eq!(running.sender.sent.lock()[0].text, "hello");
        let _ = running.stop.send(());
    }

    #[tokio::test]
    async fn test_api_send_without_recipient_is_rejected() {
        let running = start(None).await;
        let resp = reqwest::Client::new()
            .post(format!("{}/api/send", running.base))
            .json(&json!({"text": "hello"}))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        assert!(running.ledger.is_empty());
        assert!(running.sender.sent.lock().is_empty());
        let _ = running.stop.send(());
    }

    #[tokio::test]
    async fn test_health() {
        let running = start(None).await;
        let body: Value = reqwest::get(format!("{}/health", running.base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body, json!({"status": "ok"}));
        let _ = running.stop.send(());
    }
}
