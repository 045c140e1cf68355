//! Webhook 报文定义
//!
//! 字段名沿用工作流后端已有的约定（`msg`、`from_name`）

use serde::{Deserialize, Serialize};

use crate::core::message::types::MessageEvent;
use crate::core::routing::recipient;

/// 消息方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// 转发报文
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardPayload {
    /// 消息正文
    #[serde(rename = "msg")]
    pub text: String,
    /// 发送方（去掉路由后缀）
    pub from: String,
    /// 接收方（去掉路由后缀）
    pub to: String,
    /// 发送者显示名称
    #[serde(rename = "from_name")]
    pub from_display_name: Option<String>,
    /// 方向
    pub direction: Direction,
}

impl ForwardPayload {
    pub fn from_event(event: &MessageEvent, direction: Direction) -> Self {
        Self {
            text: event.body.clone(),
            from: recipient::strip_suffix(&event.sender).to_string(),
            to: recipient::strip_suffix(&event.recipient).to_string(),
            from_display_name: event.sender_display_name.clone(),
            direction,
        }
    }
}

/// 自动回复请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponderRequest {
    #[serde(rename = "msg")]
    pub text: String,
    pub from: String,
    pub to: String,
    #[serde(rename = "from_name")]
    pub from_display_name: Option<String>,
}

impl ResponderRequest {
    pub fn from_event(event: &MessageEvent) -> Self {
        Self {
            text: event.body.clone(),
            from: recipient::strip_suffix(&event.sender).to_string(),
            to: recipient::strip_suffix(&event.recipient).to_string(),
            from_display_name: event.sender_display_name.clone(),
        }
    }
}

/// 自动回复响应
///
/// 只关心 `output` 字段，非字符串或空白内容视为没有回复
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponderReply {
    pub output: Option<String>,
}

impl ResponderReply {
    pub fn from_json(value: &serde_json::Value) -> Self {
        let output = value
            .get("output")
            .and_then(serde_json::Value::as_str)
            .filter(|text| !text.trim().is_empty())
            .map(str::to_string);
        Self { output }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_forward_payload_wire_format() {
        let event = MessageEvent {
            sender: "15550000@c.us".to_string(),
            recipient: "15551234@c.us".to_string(),
            body: "manual note".to_string(),
            is_from_self: true,
            ..Default::default()
        };

        let value = serde_json::to_value(ForwardPayload::from_event(&event, Direction::Outbound)).unwrap();

        assert_eq!(
            value,
            json!({
                "msg": "manual note",
                "from": "15550000",
                "to": "15551234",
                "from_name": null,
                "direction": "outbound",
            })
        );
    }

    #[test]
    fn test_responder_reply_extraction() {
        assert_eq!(ResponderReply::from_json(&json!({"output": "$10"})).output.as_deref(), Some("$10"));
        assert_eq!(ResponderReply::from_json(&json!({"output": "  "})).output, None);
        assert_eq!(ResponderReply::from_json(&json!({"output": 10})).output, None);
        assert_eq!(ResponderReply::from_json(&json!(null)).output, None);
    }
}
