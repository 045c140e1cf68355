//! 服务模块
//!
//! 负责中继服务的完整生命周期管理：加载配置、组装组件、启动事件接收服务、等待关闭信号。

use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::{broadcast, RwLock};
use tracing::{error, info, warn};

use crate::channels::traits::EventSink;
use crate::channels::whatsapp::{GatewayClient, IngressServer, IngressState};
use crate::core::ledger::{Clock, LedgerWindows, SelfSendLedger, SystemClock};
use crate::core::message::handler::HandlerContext;
use crate::core::message::{EventQueue, QueueConfig, RelayHandler};
use crate::core::routing::{IdentityRemap, RecipientMatcher, WebhookTargets};
use crate::infra::config::{Config, ConfigLoader};
use crate::infra::error::{Error, Result};
use crate::webhook::HttpWebhookClient;

/// 服务状态
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceStatus {
    Initializing,
    Running,
    Stopping,
    Stopped,
    Error(String),
}

/// 服务配置
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub config_path: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            config_path: "wabridge.toml".to_string(),
        }
    }
}

/// 中继服务
#[derive(Clone)]
pub struct RelayService {
    config: ServiceConfig,
    status: Arc<RwLock<ServiceStatus>>,
    shutdown_tx: broadcast::Sender<()>,
    /// 加载的配置
    loaded_config: Arc<Option<Config>>,
}

impl RelayService {
    pub fn new(config: ServiceConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            status: Arc::new(RwLock::new(ServiceStatus::Initializing)),
            shutdown_tx,
            loaded_config: Arc::new(None),
        }
    }

    /// 加载并校验配置
    pub async fn initialize(&mut self, config_path: &str) -> Result<()> {
        info!(path = config_path, "初始化服务...");

        self.config.config_path = config_path.to_string();
        let config = ConfigLoader::new().load(config_path).await?;
        if let Err(e) = config.validate() {
            *self.status.write().await = ServiceStatus::Error(e.to_string());
            return Err(e);
        }
        self.loaded_config = Arc::new(Some(config));

        info!("服务初始化完成");
        Ok(())
    }

    /// 使用已加载的配置初始化，调用方负责校验
    pub fn with_config(mut self, config: Config) -> Self {
        self.loaded_config = Arc::new(Some(config));
        self
    }

    /// 启动服务，直到收到关闭信号
    pub async fn start(&mut self) -> Result<()> {
        info!(path = %self.config.config_path, "开始启动服务...");

        let config = self.loaded_config.as_ref().clone().unwrap_or_default();
        let timeout = Duration::from_secs(config.webhooks.timeout_secs);

        // 登记簿与事件队列共用同一时钟
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        // 自发消息登记簿，全进程唯一
        let ledger = Arc::new(SelfSendLedger::new(
            LedgerWindows::from_config(&config.relay),
            RecipientMatcher::from_suffixes(&config.relay.namespace_suffixes),
            clock.clone(),
        ));

        let webhook = Arc::new(HttpWebhookClient::new(timeout)?);
        let gateway = Arc::new(GatewayClient::new(&config.gateway, timeout)?);

        let relay = RelayHandler::new(HandlerContext {
            ledger,
            remap: IdentityRemap::new(&config.relay.identity_remap, &config.relay.group_suffix),
            webhook,
            sender: gateway,
            targets: WebhookTargets::from_config(&config.webhooks),
            responder_url: config.webhooks.responder_url.clone(),
        });

        // 启动事件处理循环
        let queue = EventQueue::with_clock(QueueConfig::from_relay(&config.relay), clock);
        let processor = relay.clone();
        queue.start_processing(move |event| {
            let relay = processor.clone();
            async move {
                relay.on_message_event(event).await;
            }
        });

        let sink: Arc<dyn EventSink> = Arc::new(queue);
        let server = match IngressServer::bind(
            &config.gateway.listen_addr,
            IngressState {
                sink,
                relay,
                group_suffix: config.relay.group_suffix.clone(),
            },
        )
        .await
        {
            Ok(server) => server,
            Err(e) => {
                *self.status.write().await = ServiceStatus::Error(e.to_string());
                return Err(e);
            }
        };

        let mut server_shutdown = self.shutdown_tx.subscribe();
        let server_task = tokio::spawn(server.serve(async move {
            let _ = server_shutdown.recv().await;
        }));

        *self.status.write().await = ServiceStatus::Running;

        // 启动关闭信号监听
        let mut rx = self.shutdown_tx.subscribe();
        let shutdown_tx = self.shutdown_tx.clone();
        tokio::spawn(async move {
            let _ = signal::ctrl_c().await;
            warn!("收到 Ctrl+C 信号，准备关闭服务...");
            let _ = shutdown_tx.send(());
        });

        // 等待关闭信号
        let _ = rx.recv().await;
        *self.status.write().await = ServiceStatus::Stopping;

        match server_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "事件接收服务异常退出"),
            Err(e) => error!(error = %e, "事件接收服务任务异常"),
        }

        *self.status.write().await = ServiceStatus::Stopped;
        info!("服务已停止");

        Ok(())
    }

    pub async fn stop(&mut self) {
        info!("正在停止服务...");

        *self.status.write().await = ServiceStatus::Stopping;

        if self.shutdown_tx.send(()).is_err() {
            warn!("服务未在运行");
        }

        info!("停止信号已发送");
    }

    pub async fn status(&self) -> ServiceStatus {
        self.status.read().await.clone()
    }

    /// 已加载的配置
    pub fn config(&self) -> Result<&Config> {
        self.loaded_config
            .as_ref()
            .as_ref()
            .ok_or_else(|| Error::Config("服务尚未初始化".to_string()))
    }
}

impl Default for RelayService {
    fn default() -> Self {
        Self::new(ServiceConfig::default())
    }
}
