//! 自发消息登记簿模块
//!
//! 记录本系统即将发出的消息（API 触发发送、自动回复），以便传输层把这些消息
//! 作为"自己发出的消息"回报时能够识别为回显，而不是管理员新输入的消息。
//!
//! # 模块结构
//! - `clock` - 可注入的时钟
//! - `store` - 登记簿实现
//!
//! 时间窗口匹配是尽力而为的启发式方法：时钟偏差或延迟过久的回显都可能导致误判。

pub mod clock;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use store::{LedgerToken, LedgerWindows, PendingSelfMessage, SelfSendLedger};
