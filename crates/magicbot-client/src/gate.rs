//! 回调门控
//!
//! 传输层持有的是 [`GateForwarder`]，真正的调用方回调存放在 [`HandlerGate`] 中。
//! 投递时持读锁调用回调；解除订阅时取写锁清空回调，
//! 写锁返回即意味着不存在进行中的投递，之后也不会再有投递。
//!
//! 回调内不能对同一个门执行解除订阅（读锁内请求写锁会死锁）。

use crate::metrics::SessionMetrics;
use magicbot_transport::{Sample, SampleHandler};
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

pub(crate) struct HandlerGate {
    slot: RwLock<Option<Arc<dyn SampleHandler>>>,
    /// 本次订阅以来投递的样本数（仅用于节流日志）
    delivered: AtomicU64,
    label: &'static str,
    log_every: u64,
    metrics: Arc<SessionMetrics>,
}

impl HandlerGate {
    pub(crate) fn new(label: &'static str, log_every: u64, metrics: Arc<SessionMetrics>) -> Self {
        Self {
            slot: RwLock::new(None),
            delivered: AtomicU64::new(0),
            label,
            log_every: log_every.max(1),
            metrics,
        }
    }

    /// 挂载回调，计数器清零
    pub(crate) fn attach(&self, handler: Arc<dyn SampleHandler>) {
        let mut slot = self.slot.write();
        self.delivered.store(0, Ordering::Relaxed);
        *slot = Some(handler);
    }

    /// 卸载回调
    ///
    /// 返回时保证没有正在进行的投递。
    pub(crate) fn detach(&self) -> bool {
        self.slot.write().take().is_some()
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.slot.read().is_some()
    }

    pub(crate) fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    fn deliver(&self, sample: &Sample) {
        let slot = self.slot.read();
        let Some(handler) = slot.as_ref() else {
            return;
        };
        let n = self.delivered.fetch_add(1, Ordering::Relaxed) + 1;
        self.metrics.samples_delivered.fetch_add(1, Ordering::Relaxed);
        if n % self.log_every == 0 {
            debug!(
                "{}: {} samples received (last payload {} bytes)",
                self.label,
                n,
                sample.byte_len()
            );
        }
        handler.on_sample(sample);
    }
}

/// 注册到传输层的转发器
pub(crate) struct GateForwarder(pub(crate) Arc<HandlerGate>);

impl SampleHandler for GateForwarder {
    fn on_sample(&self, sample: &Sample) {
        self.0.deliver(sample);
    }
}
