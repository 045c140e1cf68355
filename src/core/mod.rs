//! 核心运行时模块
//!
//! 中继的"大脑"，负责消息分类、回显抑制、转发和自动回复
//!
//! # 模块结构
//! - `message/` - 消息处理（类型、事件队列、中继处理器）
//! - `ledger/` - 自发消息登记簿（回显识别）
//! - `routing/` - 接收方规范化、身份重映射、分类和分发
//! - `agent/` - 自动回复

pub mod message;
pub mod ledger;
pub mod routing;
pub mod agent;
