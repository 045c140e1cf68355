//! wabridge 库入口
//!
//! WhatsApp 消息中继：把私聊消息转发到外部 Webhook，调用对话 Webhook 自动回复，
//! 并识别自己发出消息的回显，避免把机器人回复当作管理员消息转发。
//!
//! # 使用示例
//! ```no_run
//! use wabridge::service::{RelayService, ServiceConfig};
//!
//! # async fn run() -> wabridge::infra::error::Result<()> {
//! let mut service = RelayService::new(ServiceConfig::default());
//! service.initialize("wabridge.toml").await?;
//! service.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod channels;
pub mod infra;
pub mod webhook;
pub mod service;
