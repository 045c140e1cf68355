//! 事件队列模块
//!
//! 本模块实现了一个有界的消息事件队列。
//!
//! # 功能特点
//! 1. **多种模式**：支持并行、顺序、每会话顺序三种处理模式
//! 2. **容量限制**：支持队列容量上限和溢出策略
//! 3. **错误隔离**：每个事件在独立任务中处理，任务异常只影响该事件
//!
//! # 处理模式说明
//! - `Parallel`: 所有事件并行处理
//! - `Sequential`: 所有事件顺序处理
//! - `PerSender`: 同一会话的事件顺序处理，不同会话并行

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use super::types::MessageEvent;
use crate::core::ledger::clock::{Clock, SystemClock};
use crate::infra::config::RelayConfig;

/// 队列处理模式
///
/// 决定事件的处理顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueMode {
    /// 并行处理：所有事件同时处理
    Parallel,
    /// 顺序处理：所有事件按接收顺序处理
    Sequential,
    /// 每会话顺序：同一会话的事件顺序处理，不同会话并行
    #[default]
    PerSender,
}

/// 队列溢出策略
///
/// 当队列满时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueDropPolicy {
    /// 丢弃新事件
    DropNew,
    /// 阻塞等待（直到有空间）
    Block,
}

/// 队列配置
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// 处理模式
    pub mode: QueueMode,
    /// 队列容量上限
    pub cap: usize,
    /// 满队列时的丢弃策略
    pub drop_policy: QueueDropPolicy,
    /// 会话通道空闲多久后回收（仅 PerSender 模式）
    pub lane_idle: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            mode: QueueMode::PerSender,
            cap: 256,
            drop_policy: QueueDropPolicy::DropNew,
            lane_idle: Duration::from_secs(300),
        }
    }
}

impl QueueConfig {
    pub fn from_relay(config: &RelayConfig) -> Self {
        Self {
            mode: config.queue_mode,
            cap: config.queue_cap.max(1),
            drop_policy: QueueDropPolicy::DropNew,
            lane_idle: Duration::from_secs(config.lane_idle_secs.max(1)),
        }
    }
}

/// 会话通道
struct Lane {
    id: u64,
    tx: mpsc::UnboundedSender<MessageEvent>,
}

type Lanes = Arc<DashMap<String, Lane>>;

/// 事件队列
///
/// # 字段说明
/// * `config` - 队列配置
/// * `sender` - 事件发送端
/// * `receiver` - 事件接收端（处理循环启动后被取走）
/// * `lanes` - 会话通道（PerSender 模式）
/// * `clock` - 入队时间戳来源，必须与登记簿使用同一时钟
#[derive(Clone)]
pub struct EventQueue {
    config: Arc<QueueConfig>,
    clock: Arc<dyn Clock>,
    sender: mpsc::Sender<MessageEvent>,
    receiver: Arc<Mutex<Option<mpsc::Receiver<MessageEvent>>>>,
    lanes: Lanes,
    next_lane_id: Arc<AtomicU64>,
}

impl EventQueue {
    /// 创建新的事件队列（入队时间取系统时钟）
    pub fn new(config: QueueConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// 使用指定时钟创建事件队列
    pub fn with_clock(config: QueueConfig, clock: Arc<dyn Clock>) -> Self {
        let (sender, receiver) = mpsc::channel(config.cap.max(1));

        let queue = Self {
            config: Arc::new(config),
            clock,
            sender,
            receiver: Arc::new(Mutex::new(Some(receiver))),
            lanes: Arc::new(DashMap::new()),
            next_lane_id: Arc::new(AtomicU64::new(0)),
        };

        info!(
            mode = ?queue.config.mode,
            cap = queue.config.cap,
            "事件队列创建成功"
        );

        queue
    }

    /// 启动事件处理循环
    ///
    /// # 参数说明
    /// * `processor` - 事件处理函数
    ///
    /// 只有第一次调用生效
    pub fn start_processing<F, Fut>(&self, processor: F)
    where
        F: Fn(MessageEvent) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let receiver_mutex = self.receiver.clone();
        let processor = Arc::new(processor);
        let config = self.config.clone();
        let lanes = self.lanes.clone();
        let next_lane_id = self.next_lane_id.clone();

        tokio::spawn(async move {
            let mut receiver_guard = receiver_mutex.lock().await;
            let Some(mut receiver) = receiver_guard.take() else {
                warn!("事件处理循环已在运行或接收端已失效");
                return;
            };
            drop(receiver_guard);
            info!("事件处理循环已启动");

            while let Some(event) = receiver.recv().await {
                match config.mode {
                    QueueMode::Parallel => {
                        let processor = processor.clone();
                        tokio::spawn(async move {
                            run_isolated(&processor, event).await;
                        });
                    }
                    QueueMode::Sequential => {
                        run_isolated(&processor, event).await;
                    }
                    QueueMode::PerSender => {
                        let key = event.conversation_key();
                        let mut lane = lanes.entry(key.clone()).or_insert_with(|| {
                            spawn_lane(&lanes, &next_lane_id, key.clone(), processor.clone(), config.lane_idle)
                        });
                        if let Err(mpsc::error::SendError(event)) = lane.tx.send(event) {
                            warn!(key = %key, "会话通道已失效，重新创建");
                            *lane = spawn_lane(&lanes, &next_lane_id, key.clone(), processor.clone(), config.lane_idle);
                            if lane.tx.send(event).is_err() {
                                error!(key = %key, "事件投递到新会话通道失败");
                            }
                        }
                    }
                }
            }
            warn!("事件队列接收端已关闭");
        });
    }

    /// 将事件推入队列
    ///
    /// 尚未带入队时间的事件在此打上时间戳
    ///
    /// # 错误
    /// - `Full`: 队列已满且丢弃策略为 DropNew
    /// - `Closed`: 通道已关闭
    pub async fn push(&self, mut event: MessageEvent) -> Result<(), QueueError> {
        if event.observed_at.is_none() {
            event.observed_at = Some(self.clock.now());
        }

        match self.config.drop_policy {
            QueueDropPolicy::DropNew => match self.sender.try_send(event) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(event)) => {
                    warn!(cap = self.config.cap, event_id = %event.id, "队列已满，丢弃新事件");
                    return Err(QueueError::Full { event_id: event.id });
                }
                Err(mpsc::error::TrySendError::Closed(event)) => {
                    return Err(QueueError::Closed {
                        event_id: event.id,
                        msg: "接收端已关闭".to_string(),
                    });
                }
            },
            QueueDropPolicy::Block => {
                if let Err(e) = self.sender.send(event).await {
                    return Err(QueueError::Closed {
                        event_id: e.0.id.clone(),
                        msg: e.to_string(),
                    });
                }
            }
        }

        debug!("事件已入队");
        Ok(())
    }

    /// 队列中待处理的事件数量
    pub fn pending(&self) -> usize {
        self.config.cap.saturating_sub(self.sender.capacity())
    }

    /// 当前活跃的会话通道数量
    pub fn active_lanes(&self) -> usize {
        self.lanes.len()
    }
}

/// 在独立任务中处理单个事件，任务 panic 只记录日志
async fn run_isolated<F, Fut>(processor: &Arc<F>, event: MessageEvent)
where
    F: Fn(MessageEvent) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let event_id = event.id.clone();
    let task = tokio::spawn((**processor)(event));
    if let Err(e) = task.await {
        error!(event_id = %event_id, error = %e, "事件处理任务异常退出");
    }
}

/// 创建会话通道及其处理任务
///
/// 通道空闲超过 `idle` 后，在持有 map 分片锁的情况下确认通道为空再移除，
/// 投递方同样在持锁时发送，因此移除后不会再有事件进入旧通道
fn spawn_lane<F, Fut>(
    lanes: &Lanes,
    next_lane_id: &Arc<AtomicU64>,
    key: String,
    processor: Arc<F>,
    idle: Duration,
) -> Lane
where
    F: Fn(MessageEvent) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let id = next_lane_id.fetch_add(1, Ordering::Relaxed);
    let (tx, mut rx) = mpsc::unbounded_channel::<MessageEvent>();
    let lanes = lanes.clone();

    tokio::spawn(async move {
        debug!(key = %key, lane_id = id, "会话通道已创建");
        loop {
            match tokio::time::timeout(idle, rx.recv()).await {
                Ok(Some(event)) => run_isolated(&processor, event).await,
                Ok(None) => break,
                Err(_) => {
                    let mut pending = None;
                    let removed = lanes
                        .remove_if(&key, |_, lane| {
                            if lane.id != id {
                                return false;
                            }
                            match rx.try_recv() {
                                Ok(event) => {
                                    pending = Some(event);
                                    false
                                }
                                Err(_) => true,
                            }
                        })
                        .is_some();

                    if let Some(event) = pending {
                        run_isolated(&processor, event).await;
                        continue;
                    }
                    if removed {
                        break;
                    }
                    // 通道已被替换，处理完剩余事件后退出
                    rx.close();
                    while let Ok(event) = rx.try_recv() {
                        run_isolated(&processor, event).await;
                    }
                    break;
                }
            }
        }
        debug!(key = %key, lane_id = id, "会话通道已回收");
    });

    Lane { id, tx }
}

/// 队列错误类型
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// 队列已满错误
    #[error("队列已满，无法添加事件: {event_id}")]
    Full {
        /// 事件 ID
        event_id: String,
    },

    /// 通道关闭错误
    #[error("事件通道已关闭: {event_id}, 原因: {msg}")]
    Closed {
        /// 事件 ID
        event_id: String,
        /// 错误原因
        msg: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str, sender: &str) -> MessageEvent {
        MessageEvent {
            id: id.to_string(),
            sender: sender.to_string(),
            body: id.to_string(),
            ..Default::default()
        }
    }

    fn config(mode: QueueMode) -> QueueConfig {
        QueueConfig {
            mode,
            cap: 16,
            drop_policy: QueueDropPolicy::DropNew,
            lane_idle: Duration::from_secs(60),
        }
    }

    async fn collect(rx: &mut mpsc::UnboundedReceiver<String>, n: usize) -> Vec<String> {
        let mut out = Vec::new();
        while out.len() < n {
            let id = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("处理超时")
                .expect("通道关闭");
            out.push(id);
        }
        out
    }

    #[tokio::test]
    async fn test_per_sender_orders_same_conversation() {
        let queue = EventQueue::new(config(QueueMode::PerSender));
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        queue.start_processing(move |event: MessageEvent| {
            let done_tx = done_tx.clone();
            async move {
                if event.id == "a1" {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
                let _ = done_tx.send(event.id);
            }
        });

        queue.push(event("a1", "1555@c.us")).await.unwrap();
        queue.push(event("a2", "+1555")).await.unwrap();
        queue.push(event("b1", "1666@c.us")).await.unwrap();

        let order = collect(&mut done_rx, 3).await;
        assert_eq!(order, vec!["b1", "a1", "a2"]);
        assert_eq!(queue.active_lanes(), 2);
    }

    #[tokio::test]
    async fn test_idle_lanes_are_reclaimed() {
        let mut cfg = config(QueueMode::PerSender);
        cfg.lane_idle = Duration::from_millis(50);
        let queue = EventQueue::new(cfg);
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        queue.start_processing(move |event: MessageEvent| {
            let done_tx = done_tx.clone();
            async move {
                let _ = done_tx.send(event.id);
            }
        });

        queue.push(event("first", "1555@c.us")).await.unwrap();
        collect(&mut done_rx, 1).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(queue.active_lanes(), 0);

        queue.push(event("second", "1555@c.us")).await.unwrap();
        assert_eq!(collect(&mut done_rx, 1).await, vec!["second"]);
    }

    #[tokio::test]
    async fn test_panicking_event_does_not_stop_processing() {
        let queue = EventQueue::new(config(QueueMode::Sequential));
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        queue.start_processing(move |event: MessageEvent| {
            let done_tx = done_tx.clone();
            async move {
                if event.id == "boom" {
                    panic!("处理失败");
                }
                let _ = done_tx.send(event.id);
            }
        });

        queue.push(event("boom", "1555@c.us")).await.unwrap();
        queue.push(event("after", "1555@c.us")).await.unwrap();

        assert_eq!(collect(&mut done_rx, 1).await, vec!["after"]);
    }

    #[tokio::test]
    async fn test_push_stamps_intake_time() {
        let clock = Arc::new(crate::core::ledger::clock::ManualClock::at_epoch());
        clock.advance(chrono::Duration::seconds(7));
        let queue = EventQueue::with_clock(config(QueueMode::Sequential), clock.clone());
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        queue.start_processing(move |event: MessageEvent| {
            let done_tx = done_tx.clone();
            async move {
                let _ = done_tx.send(event.observed_at);
            }
        });

        queue.push(event("stamped", "1555@c.us")).await.unwrap();
        let mut preset = event("preset", "1555@c.us");
        preset.observed_at = Some(chrono::DateTime::<chrono::Utc>::default());
        queue.push(preset).await.unwrap();

        let first = tokio::time::timeout(Duration::from_secs(2), done_rx.recv()).await.unwrap().unwrap();
        let second = tokio::time::timeout(Duration::from_secs(2), done_rx.recv()).await.unwrap().unwrap();
        assert_eq!(first, Some(clock.now()));
        assert_eq!(second, Some(chrono::DateTime::<chrono::Utc>::default()));
    }

    #[tokio::test]
    async fn test_drop_new_when_full() {
        let mut cfg = config(QueueMode::Parallel);
        cfg.cap = 1;
        let queue = EventQueue::new(cfg);

        queue.push(event("1", "a")).await.unwrap();
        let err = queue.push(event("2", "a")).await.unwrap_err();

        assert!(matches!(err, QueueError::Full { ref event_id } if event_id == "2"));
        assert_eq!(queue.pending(), 1);
    }
}
