//! 渠道适配器模块
//!
//! 本模块定义了传输层的能力接口，并实现了 WhatsApp 网关适配器。

pub mod traits;
pub mod whatsapp;
