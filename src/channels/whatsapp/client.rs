//! 网关客户端模块
//!
//! 封装网关的发送接口：
//! ```text
//! POST {base_url}/message/sendText/{instance}
//! apikey: {api_key}
//! {"number": "<会话 ID>", "text": "<正文>"}
//! ```

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::core::message::sender::MessageSender;
use crate::core::message::types::OutboundMessage;
use crate::infra::config::GatewayConfig;
use crate::infra::error::{Error, Result};
use crate::infra::logging::truncate_for_log;

/// 网关客户端
#[derive(Clone)]
pub struct GatewayClient {
    /// HTTP 客户端
    http_client: reqwest::Client,
    /// 网关基础 URL
    base_url: String,
    /// 实例名
    instance: String,
    /// API Key
    api_key: Option<String>,
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("base_url", &self.base_url)
            .field("instance", &self.instance)
            .finish()
    }
}

impl GatewayClient {
    /// 创建网关客户端
    ///
    /// # 参数说明
    /// * `config` - 网关配置
    /// * `timeout` - 请求超时
    pub fn new(config: &GatewayConfig, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Network(format!("创建 HTTP 客户端失败: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            instance: config.instance.clone(),
            api_key: config.api_key.clone().filter(|key| !key.is_empty()),
        })
    }

    /// 发送文本消息
    pub async fn send_text(&self, number: &str, text: &str) -> Result<String> {
        #[derive(Serialize)]
        struct RequestBody<'a> {
            number: &'a str,
            text: &'a str,
        }

        let url = format!("{}/message/sendText/{}", self.base_url, self.instance);
        debug!(url = %url, number = number, "调用网关发送接口");

        let mut request = self.http_client.post(&url).json(&RequestBody { number, text });
        if let Some(api_key) = &self.api_key {
            request = request.header("apikey", api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Channel(format!("网关请求失败: {}", e)))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(Error::Channel(format!(
                "网关返回状态码 {}: {}",
                status,
                truncate_for_log(&body, 200)
            )));
        }

        let message_id = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|value| value["key"]["id"].as_str().map(str::to_string))
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        info!(message_id = %message_id, number = number, text = %truncate_for_log(text, 50), "消息发送成功");
        Ok(message_id)
    }
}

#[async_trait]
impl MessageSender for GatewayClient {
    async fn send(&self, message: OutboundMessage) -> Result<String> {
        self.send_text(&message.recipient, &message.text).await
    }
}
