//! 身份重映射模块
//!
//! 某些部署中，个别会话 ID（例如历史遗留的群网关 ID）需要在分类前改写为
//! 某个真实用户的 ID。映射表在配置阶段提供。

use std::collections::HashMap;
use tracing::debug;

use super::recipient;
use crate::core::message::types::MessageEvent;

/// 身份重映射表
///
/// 键按规范化形式存储，`xxx@g.us` 与 `xxx` 命中同一条目
#[derive(Debug, Clone, Default)]
pub struct IdentityRemap {
    table: HashMap<String, String>,
    group_suffix: String,
}

impl IdentityRemap {
    /// 创建映射表
    ///
    /// # 参数说明
    /// * `entries` - 原始 ID → 目标 ID
    /// * `group_suffix` - 群聊后缀，用于改写后重新判断是否为群聊
    pub fn new(entries: &HashMap<String, String>, group_suffix: &str) -> Self {
        let table = entries
            .iter()
            .map(|(from, to)| (recipient::normalize(from), to.trim().to_string()))
            .filter(|(from, _)| !from.is_empty())
            .collect();
        Self {
            table,
            group_suffix: group_suffix.to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// 查找单个 ID 的映射目标
    pub fn lookup(&self, id: &str) -> Option<&str> {
        self.table.get(&recipient::normalize(id)).map(String::as_str)
    }

    /// 改写事件中的发送方和接收方
    ///
    /// 发生改写时按改写后的 ID 重新判断群聊标记
    pub fn apply(&self, mut event: MessageEvent) -> MessageEvent {
        if self.table.is_empty() {
            return event;
        }

        let mut rewritten = false;
        if let Some(to) = self.lookup(&event.sender) {
            debug!(from = %event.sender, to = %to, "改写发送方 ID");
            event.sender = to.to_string();
            rewritten = true;
        }
        if let Some(to) = self.lookup(&event.recipient) {
            debug!(from = %event.recipient, to = %to, "改写接收方 ID");
            event.recipient = to.to_string();
            rewritten = true;
        }

        if rewritten {
            event.is_group = recipient::has_suffix(&event.sender, &self.group_suffix)
                || recipient::has_suffix(&event.recipient, &self.group_suffix);
        }
        event
    }
}
