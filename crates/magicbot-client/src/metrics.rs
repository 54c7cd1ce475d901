//! 会话运行指标
//!
//! 所有计数器都使用原子操作，可以在任何线程安全地读取，不会引入锁竞争。

use std::sync::atomic::{AtomicU64, Ordering};

/// 会话实时指标
///
/// # 使用示例
///
/// ```rust
/// use magicbot_client::SessionMetrics;
/// use std::sync::atomic::Ordering;
///
/// let metrics = SessionMetrics::default();
/// metrics.publish_ticks.fetch_add(1, Ordering::Relaxed);
/// assert_eq!(metrics.snapshot().publish_ticks, 1);
/// ```
#[derive(Debug, Default)]
pub struct SessionMetrics {
    /// 发布循环的 tick 总数
    pub publish_ticks: AtomicU64,
    /// 实际写出的关节指令帧数
    pub publish_writes: AtomicU64,
    /// 尚未提交任何指令而跳过的 tick 数
    pub publish_skipped: AtomicU64,
    /// 写出失败次数
    pub publish_errors: AtomicU64,
    /// tick 超出周期的次数
    ///
    /// 快速增长说明链路写出太慢或周期设置过小。
    pub tick_overruns: AtomicU64,
    /// 被新指令覆盖、从未写出的指令数
    pub command_overwrites: AtomicU64,

    /// 高层运动请求总数
    pub motion_requests: AtomicU64,
    /// 客户端侧超时次数
    pub motion_timeouts: AtomicU64,
    /// 超时后才到达、被丢弃的完成通知数
    pub late_completions: AtomicU64,

    /// 投递给调用方回调的样本数（传感器通道 + 状态流）
    pub samples_delivered: AtomicU64,
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取指标快照
    ///
    /// 使用 `Ordering::Relaxed`，不同计数器之间可能有微小的时间差。
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            publish_ticks: self.publish_ticks.load(Ordering::Relaxed),
            publish_writes: self.publish_writes.load(Ordering::Relaxed),
            publish_skipped: self.publish_skipped.load(Ordering::Relaxed),
            publish_errors: self.publish_errors.load(Ordering::Relaxed),
            tick_overruns: self.tick_overruns.load(Ordering::Relaxed),
            command_overwrites: self.command_overwrites.load(Ordering::Relaxed),
            motion_requests: self.motion_requests.load(Ordering::Relaxed),
            motion_timeouts: self.motion_timeouts.load(Ordering::Relaxed),
            late_completions: self.late_completions.load(Ordering::Relaxed),
            samples_delivered: self.samples_delivered.load(Ordering::Relaxed),
        }
    }

    /// 重置所有计数器
    pub fn reset(&self) {
        for counter in [
            &self.publish_ticks,
            &self.publish_writes,
            &self.publish_skipped,
            &self.publish_errors,
            &self.tick_overruns,
            &self.command_overwrites,
            &self.motion_requests,
            &self.motion_timeouts,
            &self.late_completions,
            &self.samples_delivered,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// 指标快照（不可变）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub publish_ticks: u64,
    pub publish_writes: u64,
    pub publish_skipped: u64,
    pub publish_errors: u64,
    pub tick_overruns: u64,
    pub command_overwrites: u64,
    pub motion_requests: u64,
    pub motion_timeouts: u64,
    pub late_completions: u64,
    pub samples_delivered: u64,
}

impl MetricsSnapshot {
    /// 超出周期的 tick 占比（百分比）
    pub fn overrun_rate(&self) -> f64 {
        if self.publish_ticks == 0 {
            return 0.0;
        }
        (self.tick_overruns as f64 / self.publish_ticks as f64) * 100.0
    }
}
