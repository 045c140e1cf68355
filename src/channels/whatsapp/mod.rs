//! WhatsApp 网关渠道模块
//!
//! WhatsApp Web 会话（浏览器自动化、扫码配对、会话持久化）运行在独立的网关进程中，
//! 本模块只通过 HTTP 与网关交互。
//!
//! # 功能
//! - 发送消息（网关 REST 接口）
//! - 接收消息事件（网关回调本进程的 `/events`）
//! - 控制接口（`/api/send`）
//!
//! # 配置文件示例
//! ```toml
//! [gateway]
//! base_url = "http://127.0.0.1:8085"
//! instance = "wabridge"
//! api_key = "${WA_GATEWAY_API_KEY}"
//! listen_addr = "127.0.0.1:8086"
//! ```

pub mod client;     // 网关 HTTP 客户端
pub mod events;     // 事件报文解析
pub mod ingress;    // 事件接收服务

// 重新导出常用类型
pub use client::GatewayClient;
pub use events::{parse_payload, ParsedPayload};
pub use ingress::{IngressServer, IngressState};
