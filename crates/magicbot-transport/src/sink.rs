//! 基于 Channel 的样本接收端
//!
//! 把投递线程上的回调转换为调用方线程上的消息接收：
//!
//! - **Bounded Queue**: 有界通道，防止慢消费者导致 OOM
//! - **非阻塞**: 使用 `try_send`，队列满时丢弃样本而非阻塞投递线程
//! - **丢弃监控**: 提供 `dropped_samples` 计数器
//!
//! # 使用示例
//!
//! ```rust
//! use magicbot_transport::{ChannelSink, Sample, SampleHandler};
//! use std::sync::Arc;
//!
//! let (sink, rx) = ChannelSink::new(64);
//! let dropped = sink.dropped_samples().clone();
//! let handler = Arc::new(sink) as Arc<dyn SampleHandler>;
//!
//! handler.on_sample(&Sample::Imu(Default::default()));
//! assert!(rx.try_recv().is_ok());
//! assert_eq!(dropped.load(std::sync::atomic::Ordering::Relaxed), 0);
//! ```

use crate::sample::{Sample, SampleHandler};
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// 默认队列容量
pub const DEFAULT_SINK_CAPACITY: usize = 1024;

/// Channel 接收端（实现 [`SampleHandler`]）
pub struct ChannelSink {
    tx: Sender<Sample>,
    /// 队列满时丢弃的样本数
    dropped_samples: Arc<AtomicU64>,
    /// 成功入队的样本数
    accepted_samples: Arc<AtomicU64>,
}

impl ChannelSink {
    /// 创建有界接收端
    ///
    /// # 返回
    ///
    /// - `(sink, rx)`: 回调实例和接收端
    #[must_use]
    pub fn new(capacity: usize) -> (Self, Receiver<Sample>) {
        let (tx, rx) = bounded(capacity.max(1));
        let sink = Self {
            tx,
            dropped_samples: Arc::new(AtomicU64::new(0)),
            accepted_samples: Arc::new(AtomicU64::new(0)),
        };
        (sink, rx)
    }

    /// 使用默认容量创建
    #[must_use]
    pub fn with_default_capacity() -> (Self, Receiver<Sample>) {
        Self::new(DEFAULT_SINK_CAPACITY)
    }

    pub fn dropped_samples(&self) -> &Arc<AtomicU64> {
        &self.dropped_samples
    }

    pub fn accepted_samples(&self) -> &Arc<AtomicU64> {
        &self.accepted_samples
    }
}

impl SampleHandler for ChannelSink {
    fn on_sample(&self, sample: &Sample) {
        match self.tx.try_send(sample.clone()) {
            Ok(()) => {
                self.accepted_samples.fetch_add(1, Ordering::Relaxed);
            },
            Err(TrySendError::Full(_)) => {
                self.dropped_samples.fetch_add(1, Ordering::Relaxed);
            },
            // 接收端已释放：调用方不再关心该通道
            Err(TrySendError::Disconnected(_)) => {
                self.dropped_samples.fetch_add(1, Ordering::Relaxed);
            },
        }
    }
}
