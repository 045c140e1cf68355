//! 自动回复模块
//!
//! 调用对话 Webhook 生成回复，并通过传输层发回给用户。

pub mod responder;

pub use responder::{AutoResponder, ResponderOutcome};
