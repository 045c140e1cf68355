//! 消息类型定义模块
//!
//! 定义中继引擎处理的消息结构体，包括：
//! - 消息事件（传输层观察到的每一条消息，入站或自己发出的）
//! - 出站消息（交给传输层发送的消息）
//! - 分类结果与回显来源

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::routing::recipient;

/// 消息事件
///
/// 传输层每观察到一条消息（无论是收到的还是自己发出的）就产生一个事件。
/// 对中继核心来说是只读的。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEvent {
    /// 传输层消息 ID（可能为空）
    pub id: String,
    /// 是否由当前登录账号发出
    pub is_from_self: bool,
    /// 发送方会话 ID
    pub sender: String,
    /// 接收方会话 ID
    pub recipient: String,
    /// 消息正文
    pub body: String,
    /// 是否为群聊消息
    pub is_group: bool,
    /// 发送者显示名称
    pub sender_display_name: Option<String>,
    /// 事件进入队列的时间，回显识别按此时间计算窗口
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_at: Option<DateTime<Utc>>,
}

impl MessageEvent {
    /// 会话键
    ///
    /// 自己发出的消息以接收方为键，其余以发送方为键（规范化后）。
    /// 同一会话键的事件必须按顺序处理。
    pub fn conversation_key(&self) -> String {
        if self.is_from_self {
            recipient::normalize(&self.recipient)
        } else {
            recipient::normalize(&self.sender)
        }
    }
}

/// 出站消息
///
/// 交给传输层发送的纯文本消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// 目标会话 ID
    pub recipient: String,
    /// 消息正文
    pub text: String,
}

impl OutboundMessage {
    pub fn new(recipient: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            text: text.into(),
        }
    }
}

/// 自发消息来源
///
/// 决定登记条目的有效窗口长度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Origin {
    /// 由控制接口触发的发送
    ApiSend,
    /// 自动回复
    BotReply,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::ApiSend => write!(f, "api-send"),
            Origin::BotReply => write!(f, "bot-reply"),
        }
    }
}

/// 分类结果
///
/// 由事件和分类时刻的登记簿内容唯一决定，不做持久化
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// 本系统刚发出消息的回显
    SuppressedEcho(Origin),
    /// 管理员在聊天客户端中直接输入的消息
    AdminOutbound,
    /// 群聊消息（一律忽略）
    GroupIgnored,
    /// 私聊入站消息
    PersonalInbound,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::SuppressedEcho(origin) => write!(f, "suppressed-echo({})", origin),
            Classification::AdminOutbound => write!(f, "admin-outbound"),
            Classification::GroupIgnored => write!(f, "group-ignored"),
            Classification::PersonalInbound => write!(f, "personal-inbound"),
        }
    }
}
