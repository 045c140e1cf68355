//! 消息处理模块
//!
//! 本模块负责：
//! 1. 定义消息类型（消息事件、出站消息、分类结果）
//! 2. 实现事件队列（同一会话顺序处理）
//! 3. 实现中继处理器（分类 → 分发）
//!
//! # 消息处理流程
//! ```text
//! 传输层事件 → 事件队列 → 身份重映射 → 分类（查询登记簿） → 分发
//!                                               ├→ Webhook 转发
//!                                               └→ 自动回复 → 登记 → 发送
//! ```

pub mod types;      // 消息类型定义
pub mod queue;      // 事件队列
pub mod handler;    // 中继处理器
pub mod sender;     // 消息发送器

// 重新导出常用类型
pub use types::{Classification, MessageEvent, Origin, OutboundMessage};
pub use queue::{EventQueue, QueueConfig, QueueDropPolicy, QueueError, QueueMode};
pub use handler::{HandlerContext, RelayHandler};
pub use sender::MessageSender;
