//! 登记簿存储模块
//!
//! 条目生命周期：
//! ```text
//! register（发送前） → try_consume 命中（一次性消费）
//!                    → 超出窗口后由 sweep 回收
//! ```

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

use super::clock::Clock;
use crate::core::message::types::Origin;
use crate::core::routing::recipient::{self, RecipientMatcher};
use crate::infra::config::RelayConfig;
use crate::infra::logging::truncate_for_log;

/// 登记令牌
///
/// 由接收方、时间戳和随机盐组成，同一接收方/文本的并发登记不会冲突
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LedgerToken(String);

impl LedgerToken {
    fn generate(recipient: &str, created_at: DateTime<Utc>) -> Self {
        Self(format!(
            "{}:{}:{}",
            recipient::normalize(recipient),
            created_at.timestamp_millis(),
            uuid::Uuid::new_v4().simple()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LedgerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 待回显的自发消息
#[derive(Debug, Clone)]
pub struct PendingSelfMessage {
    /// 登记令牌
    pub token: LedgerToken,
    /// 接收方 ID
    pub recipient: String,
    /// 原始正文
    pub text: String,
    /// 去除首尾空白后的正文（用于回退比较）
    pub text_trimmed: String,
    /// 登记时间
    pub created_at: DateTime<Utc>,
    /// 来源
    pub origin: Origin,
}

/// 各来源的有效窗口
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerWindows {
    pub api_send: Duration,
    pub bot_reply: Duration,
}

impl Default for LedgerWindows {
    fn default() -> Self {
        Self {
            api_send: Duration::seconds(30),
            bot_reply: Duration::seconds(10),
        }
    }
}

impl LedgerWindows {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            api_send: secs(config.api_send_window_secs),
            bot_reply: secs(config.bot_reply_window_secs),
        }
    }

    pub fn for_origin(&self, origin: Origin) -> Duration {
        match origin {
            Origin::ApiSend => self.api_send,
            Origin::BotReply => self.bot_reply,
        }
    }
}

fn secs(value: u64) -> Duration {
    let max = i64::MAX / 1_000;
    Duration::seconds(i64::try_from(value).map_or(max, |v| v.min(max)))
}

/// 自发消息登记簿
///
/// 所有操作都在同一把互斥锁内完成，登记与消费对同一接收方是线性化的。
/// 整个进程只应存在一个实例（通过 `Arc` 共享），否则回显抑制会失效。
pub struct SelfSendLedger {
    entries: Mutex<Vec<PendingSelfMessage>>,
    windows: LedgerWindows,
    matcher: RecipientMatcher,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for SelfSendLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelfSendLedger")
            .field("entries", &self.entries.lock().len())
            .field("windows", &self.windows)
            .finish()
    }
}

impl SelfSendLedger {
    /// 创建登记簿
    ///
    /// # 参数说明
    /// * `windows` - 各来源的有效窗口
    /// * `matcher` - 接收方等价判断器
    /// * `clock` - 时钟
    pub fn new(windows: LedgerWindows, matcher: RecipientMatcher, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            windows,
            matcher,
            clock,
        }
    }

    /// 当前时间
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn windows(&self) -> LedgerWindows {
        self.windows
    }

    /// 登记即将发出的消息
    ///
    /// 必须在调用传输层发送之前调用，否则回显可能先于登记到达
    pub fn register(&self, recipient: &str, text: &str, origin: Origin) -> LedgerToken {
        self.register_at(recipient, text, origin, self.clock.now())
    }

    /// 以指定时间登记
    pub fn register_at(
        &self,
        recipient: &str,
        text: &str,
        origin: Origin,
        created_at: DateTime<Utc>,
    ) -> LedgerToken {
        let token = LedgerToken::generate(recipient, created_at);
        let entry = PendingSelfMessage {
            token: token.clone(),
            recipient: recipient.trim().to_string(),
            text: text.to_string(),
            text_trimmed: text.trim().to_string(),
            created_at,
            origin,
        };

        let mut entries = self.entries.lock();
        entries.push(entry);
        debug!(
            token = %token,
            recipient = %recipient,
            origin = %origin,
            text = %truncate_for_log(text, 50),
            pending = entries.len(),
            "登记自发消息"
        );

        token
    }

    /// 尝试消费一条匹配的登记
    ///
    /// 接收方等价、正文相同（或去除首尾空白后相同）、且在窗口内的条目才算匹配。
    /// 多条匹配时取登记最早的一条。命中后条目被移除。
    ///
    /// # 返回值
    /// 命中返回该条目的来源，否则返回 None
    pub fn try_consume(&self, recipient: &str, text: &str, observed_at: DateTime<Utc>) -> Option<Origin> {
        if recipient::normalize(recipient).is_empty() {
            return None;
        }
        let text_trimmed = text.trim();

        let mut entries = self.entries.lock();
        let index = entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| {
                self.within_window(entry, observed_at)
                    && (entry.text == text || entry.text_trimmed == text_trimmed)
                    && self.matcher.same_recipient(&entry.recipient, recipient)
            })
            .min_by_key(|(index, entry)| (entry.created_at, *index))
            .map(|(index, _)| index)?;

        let entry = entries.remove(index);
        debug!(
            token = %entry.token,
            origin = %entry.origin,
            pending = entries.len(),
            "命中自发消息登记"
        );
        Some(entry.origin)
    }

    /// 清理过期条目
    ///
    /// # 返回值
    /// 被移除的条目数
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|entry| self.within_window(entry, now));
        let removed = before - entries.len();
        if removed > 0 {
            trace!(removed, pending = entries.len(), "清理过期的自发消息登记");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// 观察时间早于登记时间（时钟偏差）视为刚登记
    fn within_window(&self, entry: &PendingSelfMessage, at: DateTime<Utc>) -> bool {
        let elapsed = (at - entry.created_at).max(Duration::zero());
        elapsed <= self.windows.for_origin(entry.origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ledger::clock::ManualClock;

    fn ledger() -> (SelfSendLedger, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_epoch());
        let ledger = SelfSendLedger::new(LedgerWindows::default(), RecipientMatcher::default(), clock.clone());
        (ledger, clock)
    }

    #[test]
    fn test_consume_is_one_shot() {
        let (ledger, clock) = ledger();
        ledger.register("15551234@c.us", "hello", Origin::ApiSend);
        clock.advance(Duration::seconds(3));

        assert_eq!(ledger.try_consume("15551234@c.us", "hello", clock.now()), Some(Origin::ApiSend));
        assert_eq!(ledger.try_consume("15551234@c.us", "hello", clock.now()), None);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_trimmed_text_matches() {
        let (ledger, clock) = ledger();
        ledger.register("15551234@c.us", "  hello \n", Origin::BotReply);
        assert_eq!(ledger.try_consume("15551234@s.whatsapp.net", "hello", clock.now()), Some(Origin::BotReply));
    }

    #[test]
    fn test_window_depends_on_origin() {
        let (ledger, clock) = ledger();
        ledger.register("1555@c.us", "reply", Origin::BotReply);
        ledger.register("1555@c.us", "api", Origin::ApiSend);
        clock.advance(Duration::seconds(11));

        assert_eq!(ledger.try_consume("1555@c.us", "reply", clock.now()), None);
        assert_eq!(ledger.try_consume("1555@c.us", "api", clock.now()), Some(Origin::ApiSend));
    }

    #[test]
    fn test_earliest_matching_entry_wins() {
        let (ledger, clock) = ledger();
        ledger.register("1555@c.us", "same", Origin::ApiSend);
        clock.advance(Duration::seconds(1));
        ledger.register("1555@c.us", "same", Origin::BotReply);

        assert_eq!(ledger.try_consume("1555@c.us", "same", clock.now()), Some(Origin::ApiSend));
        assert_eq!(ledger.try_consume("1555@c.us", "same", clock.now()), Some(Origin::BotReply));
    }

    #[test]
    fn test_sweep_removes_expired_entries() {
        let (ledger, clock) = ledger();
        ledger.register("1555@c.us", "old", Origin::ApiSend);
        ledger.register("1666@c.us", "old", Origin::BotReply);
        clock.advance(Duration::seconds(31));

        assert_eq!(ledger.sweep(clock.now()), 2);
        assert!(ledger.is_empty());

        // 回到窗口内也无法再命中
        let earlier = clock.now() - Duration::seconds(30);
        assert_eq!(ledger.try_consume("1555@c.us", "old", earlier), None);
    }

    #[test]
    fn test_empty_text_is_keyed_by_recipient() {
        let (ledger, clock) = ledger();
        ledger.register("1555@c.us", "", Origin::BotReply);

        assert_eq!(ledger.try_consume("1666@c.us", "", clock.now()), None);
        assert_eq!(ledger.try_consume("", "", clock.now()), None);
        assert_eq!(ledger.try_consume("1555@c.us", "", clock.now()), Some(Origin::BotReply));
    }

    #[test]
    fn test_tokens_are_unique() {
        let (ledger, _clock) = ledger();
        let a = ledger.register("1555@c.us", "x", Origin::ApiSend);
        let b = ledger.register("1555@c.us", "x", Origin::ApiSend);
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("1555:"));
        assert_eq!(ledger.len(), 2);
    }
}
