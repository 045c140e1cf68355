//! Webhook 客户端模块
//!
//! 通用的 JSON POST 客户端。超时由 HTTP 客户端负责，中继核心不额外设置。

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::infra::error::{Error, Result};

/// Webhook 客户端 Trait
#[async_trait]
pub trait WebhookClient: Send + Sync {
    /// 发送 JSON 请求
    ///
    /// # 参数说明
    /// * `url` - 目标地址
    /// * `payload` - JSON 请求体
    ///
    /// # 返回值
    /// 响应 JSON；响应体为空时返回 `Value::Null`
    async fn post(&self, url: &str, payload: &Value) -> Result<Value>;
}

/// 基于 reqwest 的 Webhook 客户端
#[derive(Clone, Debug)]
pub struct HttpWebhookClient {
    http_client: reqwest::Client,
}

impl HttpWebhookClient {
    /// 创建客户端
    ///
    /// # 参数说明
    /// * `timeout` - 单次请求超时
    pub fn new(timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Network(format!("创建 HTTP 客户端失败: {}", e)))?;
        Ok(Self { http_client })
    }
}

#[async_trait]
impl WebhookClient for HttpWebhookClient {
    async fn post(&self, url: &str, payload: &Value) -> Result<Value> {
        debug!(url = url, "发送 Webhook 请求");

        let response = self
            .http_client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::Webhook(format!("请求 {} 失败: {}", url, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Webhook(format!("读取 {} 响应失败: {}", url, e)))?;

        if !status.is_success() {
            return Err(Error::Webhook(format!(
                "{} 返回状态码 {}: {}",
                url,
                status,
                crate::infra::logging::truncate_for_log(&body, 200)
            )));
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body)
            .map_err(|e| Error::Serialization(format!("{} 响应不是有效的 JSON: {}", url, e)))
    }
}
