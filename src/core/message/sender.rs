use async_trait::async_trait;
use crate::infra::error::Result;
use super::types::OutboundMessage;

/// 消息发送器 Trait
///
/// 传输层的发送能力：把文本消息发给指定会话
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// 发送消息
    ///
    /// # 参数说明
    /// * `message` - 出站消息
    ///
    /// # 返回值
    /// 发送成功返回消息 ID，失败时错误中包含原因
    async fn send(&self, message: OutboundMessage) -> Result<String>;
}
