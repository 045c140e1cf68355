//! 消息分类器模块
//!
//! 判断每个消息事件属于哪一类：
//! 1. 自己发出且命中登记簿 → 回显，抑制
//! 2. 自己发出但未命中 → 管理员直接输入的出站消息
//! 3. 群聊消息 → 忽略
//! 4. 其余 → 私聊入站消息
//!
//! 分类只依赖发送方/接收方元数据，空正文同样参与分类。

use std::sync::Arc;
use tracing::trace;

use crate::core::ledger::SelfSendLedger;
use crate::core::message::types::{Classification, MessageEvent};

/// 消息分类器
#[derive(Debug, Clone)]
pub struct MessageClassifier {
    ledger: Arc<SelfSendLedger>,
}

impl MessageClassifier {
    pub fn new(ledger: Arc<SelfSendLedger>) -> Self {
        Self { ledger }
    }

    /// 对事件分类
    ///
    /// 窗口按事件进入队列的时间计算，排队等待的时间不计入；
    /// 没有入队时间的事件按当前时间计算。
    /// 每次分类先清理一次登记簿中的过期条目
    pub fn classify(&self, event: &MessageEvent) -> Classification {
        let observed_at = event.observed_at.unwrap_or_else(|| self.ledger.now());
        self.ledger.sweep(observed_at);

        if event.is_from_self {
            return match self.ledger.try_consume(&event.recipient, &event.body, observed_at) {
                Some(origin) => Classification::SuppressedEcho(origin),
                None => Classification::AdminOutbound,
            };
        }

        if event.is_group {
            trace!(sender = %event.sender, "群聊消息");
            return Classification::GroupIgnored;
        }

        Classification::PersonalInbound
    }
}
