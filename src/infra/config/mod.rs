//! 配置管理系统模块
//!
//! 本模块负责加载和管理系统配置。
//!
//! # 配置文件示例
//! ```toml
//! [gateway]
//! base_url = "http://127.0.0.1:8085"
//! instance = "wabridge"
//! api_key = "${WA_GATEWAY_API_KEY}"
//! listen_addr = "127.0.0.1:8086"
//!
//! [webhooks]
//! inbound_url = "https://n8n.example.com/webhook/inbound"
//! outbound_url = "https://n8n.example.com/webhook/outbound"
//! responder_url = "https://n8n.example.com/webhook/custom_wa_bot"
//!
//! [relay]
//! api_send_window_secs = 30
//! bot_reply_window_secs = 10
//! queue_mode = "per_sender"
//!
//! [relay.identity_remap]
//! "120363000000000000@g.us" = "15550001111@c.us"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::{env, fs};

use super::error::{Error, Result};
use crate::core::message::queue::QueueMode;

/// 主配置结构
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// WhatsApp 网关配置
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// 外部 Webhook 配置
    #[serde(default)]
    pub webhooks: WebhookConfig,
    /// 中继配置
    #[serde(default)]
    pub relay: RelayConfig,
    /// 日志配置
    #[serde(default)]
    pub logging: LoggingSection,
}

/// WhatsApp 网关配置
///
/// 浏览器自动化会话运行在独立的网关进程中，这里只描述如何与其通信
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// 网关 REST 基础 URL
    pub base_url: String,
    /// 网关实例名
    pub instance: String,
    /// 网关 API Key
    pub api_key: Option<String>,
    /// 事件接收服务监听地址
    pub listen_addr: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8085".to_string(),
            instance: "wabridge".to_string(),
            api_key: None,
            listen_addr: "127.0.0.1:8086".to_string(),
        }
    }
}

/// Webhook 配置
///
/// 未配置的 URL 对应的转发会被跳过
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// 入站消息转发地址
    pub inbound_url: Option<String>,
    /// 管理员出站消息转发地址
    pub outbound_url: Option<String>,
    /// 自动回复（对话）Webhook 地址
    pub responder_url: Option<String>,
    /// HTTP 请求超时（秒）
    pub timeout_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            inbound_url: None,
            outbound_url: None,
            responder_url: None,
            timeout_secs: 30,
        }
    }
}

/// 中继配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// API 触发发送的回显识别窗口（秒）
    pub api_send_window_secs: u64,
    /// 自动回复的回显识别窗口（秒）
    pub bot_reply_window_secs: u64,
    /// 同一用户的两种命名空间后缀
    pub namespace_suffixes: Vec<String>,
    /// 群聊后缀
    pub group_suffix: String,
    /// 身份重映射表（原始 ID → 实际用户 ID）
    pub identity_remap: HashMap<String, String>,
    /// 事件队列处理模式
    pub queue_mode: QueueMode,
    /// 事件队列容量
    pub queue_cap: usize,
    /// 会话通道空闲回收时间（秒）
    pub lane_idle_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            api_send_window_secs: 30,
            bot_reply_window_secs: 10,
            namespace_suffixes: vec!["c.us".to_string(), "s.whatsapp.net".to_string()],
            group_suffix: "g.us".to_string(),
            identity_remap: HashMap::new(),
            queue_mode: QueueMode::PerSender,
            queue_cap: 256,
            lane_idle_secs: 300,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingSection {
    /// 日志级别
    pub level: Option<String>,
    /// 日志格式（default / json）
    pub format: Option<String>,
}

impl Config {
    /// 校验配置
    ///
    /// # 返回值
    /// 配置有效返回 `Ok(())`，否则返回第一个发现的问题
    pub fn validate(&self) -> Result<()> {
        self.gateway
            .listen_addr
            .parse::<SocketAddr>()
            .map_err(|e| Error::Config(format!("listen_addr 无效 '{}': {}", self.gateway.listen_addr, e)))?;
        check_http_url("gateway.base_url", &self.gateway.base_url)?;

        let webhook_urls = [
            ("webhooks.inbound_url", &self.webhooks.inbound_url),
            ("webhooks.outbound_url", &self.webhooks.outbound_url),
            ("webhooks.responder_url", &self.webhooks.responder_url),
        ];
        for (name, url) in webhook_urls {
            if let Some(url) = url {
                check_http_url(name, url)?;
            }
        }

        if self.relay.api_send_window_secs == 0 || self.relay.bot_reply_window_secs == 0 {
            return Err(Error::Config("回显识别窗口必须大于 0".to_string()));
        }
        if self.relay.namespace_suffixes.len() != 2 {
            return Err(Error::Config(format!(
                "namespace_suffixes 必须恰好包含两个后缀，当前为 {}",
                self.relay.namespace_suffixes.len()
            )));
        }
        let suffixes = self
            .relay
            .namespace_suffixes
            .iter()
            .chain(std::iter::once(&self.relay.group_suffix));
        for suffix in suffixes {
            if suffix.is_empty() || suffix.contains('@') {
                return Err(Error::Config(format!("后缀无效: '{}'（不能为空且不含 '@'）", suffix)));
            }
        }
        if self.relay.queue_cap == 0 {
            return Err(Error::Config("queue_cap 必须大于 0".to_string()));
        }

        Ok(())
    }
}

fn check_http_url(name: &str, url: &str) -> Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(Error::Config(format!("{} 不是有效的 HTTP 地址: '{}'", name, url)))
    }
}

/// 配置加载器
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader;

impl ConfigLoader {
    /// 创建新的配置加载器
    pub fn new() -> Self {
        Self
    }

    /// 加载配置
    pub async fn load(&self, path: &str) -> Result<Config> {
        tracing::info!(path = path, "加载配置文件");

        // 检查文件是否存在
        if !PathBuf::from(path).exists() {
            tracing::warn!(path = path, "配置文件不存在，使用默认配置");
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("读取配置文件失败: {}", e)))?;

        let mut config = self.parse(&content)?;
        self.substitute_env_vars(&mut config)?;

        tracing::info!("配置加载成功");
        Ok(config)
    }

    /// 解析 TOML 配置内容
    pub fn parse(&self, content: &str) -> Result<Config> {
        toml::from_str(content).map_err(|e| Error::Config(format!("解析配置文件失败: {}", e)))
    }

    /// 替换环境变量
    ///
    /// 将 `${VAR_NAME}` 格式的字符串替换为对应的环境变量值
    fn substitute_env_vars(&self, config: &mut Config) -> Result<()> {
        let re = regex::Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| Error::Config(format!("环境变量模式无效: {}", e)))?;

        config.gateway.base_url = replace_env_vars(&re, &config.gateway.base_url);
        if let Some(api_key) = &config.gateway.api_key {
            config.gateway.api_key = Some(replace_env_vars(&re, api_key));
        }

        let webhooks = &mut config.webhooks;
        for url in [
            &mut webhooks.inbound_url,
            &mut webhooks.outbound_url,
            &mut webhooks.responder_url,
        ] {
            if let Some(value) = url.as_mut() {
                *value = replace_env_vars(&re, value);
            }
        }

        for value in config.relay.identity_remap.values_mut() {
            *value = replace_env_vars(&re, value);
        }

        Ok(())
    }
}

/// 替换字符串中的环境变量，未设置的变量保持原样
fn replace_env_vars(re: &regex::Regex, input: &str) -> String {
    re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    })
    .to_string()
}
