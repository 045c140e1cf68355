//! 消息路由模块
//!
//! 决定每个消息事件的去向。
//!
//! # 模块结构
//! - `recipient` - 会话 ID 规范化与等价判断
//! - `remap` - 身份重映射表
//! - `classifier` - 消息分类器
//! - `dispatcher` - 中继分发器

pub mod recipient;
pub mod remap;
pub mod classifier;
pub mod dispatcher;

pub use recipient::RecipientMatcher;
pub use remap::IdentityRemap;
pub use classifier::MessageClassifier;
pub use dispatcher::{RelayDispatcher, WebhookTargets};
