//! Webhook 模块
//!
//! 与外部工作流自动化后端（如 n8n）通信：
//! - `client` - 通用 JSON POST 客户端
//! - `payload` - 转发与自动回复使用的报文结构

pub mod client;
pub mod payload;

pub use client::{HttpWebhookClient, WebhookClient};
pub use payload::{Direction, ForwardPayload, ResponderReply, ResponderRequest};
