//! 渠道 Trait 定义模块
//!
//! 中继核心只通过两个能力与传输层交互：
//! - 发送：`MessageSender`
//! - 事件通知：`EventSink`（传输层每观察到一条消息调用一次）

use async_trait::async_trait;

use crate::core::message::queue::EventQueue;
use crate::core::message::types::MessageEvent;
use crate::infra::error::{Error, Result};

pub use crate::core::message::sender::MessageSender;

/// 事件接收 Trait
///
/// 由传输层在收到（或自己发出）每条消息时调用
#[async_trait]
pub trait EventSink: Send + Sync {
    /// 提交一个消息事件
    ///
    /// # 返回值
    /// 事件被接收返回 `Ok(())`；只有接收本身失败（如队列已满）才返回错误
    async fn submit(&self, event: MessageEvent) -> Result<()>;
}

#[async_trait]
impl EventSink for EventQueue {
    async fn submit(&self, event: MessageEvent) -> Result<()> {
        self.push(event)
            .await
            .map_err(|e| Error::Channel(e.to_string()))
    }
}
