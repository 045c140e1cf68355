//! 事件报文解析模块
//!
//! 网关推送的报文有三种形态，均按尽力而为的方式提取字段：
//! 1. 扁平格式：`{fromMe, from, to, body, isGroup, notifyName}`
//! 2. 客户端原生格式：`{id: {fromMe, _serialized}, from, to, body, _data: {notifyName}}`
//! 3. 信封格式：`{event, data}`，`data` 为以上任一形态或其数组
//!
//! 缺失字段取空值，不会因此丢弃事件。

use serde_json::Value;
use tracing::debug;

use crate::core::message::types::MessageEvent;
use crate::core::routing::recipient;

/// 携带消息的信封事件名
const MESSAGE_EVENTS: [&str; 4] = ["message", "message_create", "messages.upsert", "messages.set"];

/// 解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedPayload {
    /// 消息事件
    Messages(Vec<MessageEvent>),
    /// 与消息无关的网关事件（如连接状态、二维码更新）
    Ignored(String),
}

/// 解析网关推送的报文
///
/// # 参数说明
/// * `payload` - 报文 JSON
/// * `group_suffix` - 群聊后缀，用于推断群聊标记
pub fn parse_payload(payload: &Value, group_suffix: &str) -> ParsedPayload {
    if let Some(event_name) = payload.get("event").and_then(Value::as_str) {
        if !MESSAGE_EVENTS.contains(&event_name) {
            debug!(event = event_name, "忽略非消息事件");
            return ParsedPayload::Ignored(event_name.to_string());
        }
        let data = payload.get("data").unwrap_or(&Value::Null);
        return ParsedPayload::Messages(parse_messages(data, group_suffix));
    }

    ParsedPayload::Messages(parse_messages(payload, group_suffix))
}

fn parse_messages(data: &Value, group_suffix: &str) -> Vec<MessageEvent> {
    match data {
        Value::Array(items) => items
            .iter()
            .filter(|item| item.is_object())
            .map(|item| parse_message(item, group_suffix))
            .collect(),
        Value::Object(_) => vec![parse_message(data, group_suffix)],
        _ => Vec::new(),
    }
}

/// 解析单条消息
pub fn parse_message(msg: &Value, group_suffix: &str) -> MessageEvent {
    let key = &msg["key"];

    let is_from_self = first_bool(&[&msg["fromMe"], &msg["id"]["fromMe"], &key["fromMe"]]);

    let remote_jid = key["remoteJid"].as_str().unwrap_or_default();
    let (sender, recipient_id) = match (msg["from"].as_str(), msg["to"].as_str()) {
        (Some(from), Some(to)) => (from.to_string(), to.to_string()),
        (from, to) if !remote_jid.is_empty() => {
            // 只有 remoteJid 时，它代表对方会话
            if is_from_self {
                (from.unwrap_or_default().to_string(), to.unwrap_or(remote_jid).to_string())
            } else {
                let participant = key["participant"].as_str().unwrap_or(remote_jid);
                (from.unwrap_or(participant).to_string(), to.unwrap_or_default().to_string())
            }
        }
        (from, to) => (
            from.unwrap_or_default().to_string(),
            to.unwrap_or_default().to_string(),
        ),
    };

    let body = first_str(&[
        &msg["body"],
        &msg["message"]["conversation"],
        &msg["message"]["extendedTextMessage"]["text"],
    ])
    .unwrap_or_default();

    let id = first_str(&[&msg["id"], &msg["id"]["_serialized"], &msg["id"]["id"], &key["id"]])
        .unwrap_or_default();

    let sender_display_name = first_str(&[&msg["notifyName"], &msg["_data"]["notifyName"], &msg["pushName"]]);

    let is_group = first_bool(&[&msg["isGroup"]])
        || recipient::has_suffix(&sender, group_suffix)
        || recipient::has_suffix(&recipient_id, group_suffix)
        || recipient::has_suffix(remote_jid, group_suffix);

    MessageEvent {
        id,
        is_from_self,
        sender,
        recipient: recipient_id,
        body,
        is_group,
        sender_display_name,
        observed_at: None,
    }
}

fn first_str(candidates: &[&Value]) -> Option<String> {
    candidates
        .iter()
        .find_map(|value| value.as_str())
        .map(str::to_string)
}

fn first_bool(candidates: &[&Value]) -> bool {
    candidates
        .iter()
        .find_map(|value| value.as_bool())
        .unwrap_or(false)
}
