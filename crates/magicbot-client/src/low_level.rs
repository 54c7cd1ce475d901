//! 底层运动控制：固定周期发布器 + 状态回调
//!
//! 发布线程每个周期读取一次最新提交的 `JointCommand` 快照并写出：
//!
//! - **后写覆盖**: `publish_arm_command()` 只替换快照（`ArcSwapOption`），不排队
//! - **无指令不发**: 从未提交过指令时跳过该 tick
//! - **无锁快照**: tick 只做一次原子 load，写出期间不持有任何锁
//! - **超时不追赶**: tick 超出周期时记录一次 overrun，下一个截止时间从当前时刻重新计算
//!
//! 机身 IMU 与手臂状态回调运行在传输层的投递线程上，与发布线程相互独立。

use crate::error::{OperationReport, Result, RobotError, SubFailure, SubTarget};
use crate::gate::{GateForwarder, HandlerGate};
use crate::metrics::SessionMetrics;
use crate::session::SessionCore;
use crate::state::{AtomicSessionState, SessionState};
use arc_swap::ArcSwapOption;
use magicbot_protocol::{ControllerLevel, JointCommand, Status};
use magicbot_transport::{SampleHandler, StateStream, Transport, TransportError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// 单次睡眠的上限：保证停止信号和周期变更能被及时观察到
const MAX_SLEEP_SLICE: Duration = Duration::from_millis(5);

/// 状态流日志节流间隔
const STATE_LOG_EVERY: u64 = 1000;

/// 轮询线程是否退出的间隔
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// 带超时的线程 join
///
/// 超时时把句柄原样交还，调用方可以保留它稍后再次等待。
trait JoinTimeout: Sized {
    fn join_timeout(self, timeout: Duration) -> std::result::Result<std::thread::Result<()>, Self>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> std::result::Result<std::thread::Result<()>, Self> {
        let deadline = Instant::now() + timeout;
        while !self.is_finished() {
            if Instant::now() >= deadline {
                return Err(self);
            }
            std::thread::sleep(JOIN_POLL_INTERVAL);
        }
        Ok(self.join().map(|_| ()))
    }
}

// ==================== 发布器 ====================

/// 发布线程与调用方共享的状态
pub(crate) struct PublisherShared {
    /// 最新提交的指令快照
    pending: ArcSwapOption<JointCommand>,
    /// 当前快照是否还没有被写出过
    unpublished: AtomicBool,
    period_us: AtomicU64,
    period_changed: AtomicBool,
    is_running: AtomicBool,
}

impl PublisherShared {
    fn new(period: Duration) -> Self {
        Self {
            pending: ArcSwapOption::empty(),
            unpublished: AtomicBool::new(false),
            period_us: AtomicU64::new(period.as_micros() as u64),
            period_changed: AtomicBool::new(false),
            is_running: AtomicBool::new(false),
        }
    }

    fn period(&self) -> Duration {
        Duration::from_micros(self.period_us.load(Ordering::Acquire))
    }
}

pub(crate) struct Publisher {
    shared: Arc<PublisherShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Publisher {
    pub(crate) fn new(period: Duration) -> Self {
        Self {
            shared: Arc::new(PublisherShared::new(period)),
            thread: Mutex::new(None),
        }
    }

    /// 启动发布线程（已在运行时无操作）
    pub(crate) fn start(
        &self,
        transport: Arc<dyn Transport>,
        state: Arc<AtomicSessionState>,
        metrics: Arc<SessionMetrics>,
    ) -> Result<()> {
        let mut thread = self.thread.lock();
        if self.shared.is_running.load(Ordering::Acquire) {
            return Ok(());
        }
        // 上一个线程可能因致命错误自行退出，也可能是上次停止超时后仍在写出
        if let Some(old) = thread.take() {
            if let Err(old) = old.join_timeout(Duration::from_millis(100)) {
                *thread = Some(old);
                return Err(RobotError::invalid_state(
                    "initialize",
                    "previous publish thread is still writing",
                ));
            }
        }

        self.shared.is_running.store(true, Ordering::Release);
        let shared = self.shared.clone();
        let handle = std::thread::Builder::new()
            .name("magicbot-publish".into())
            .spawn(move || publish_loop(transport, shared, state, metrics))
            .map_err(|e| {
                self.shared.is_running.store(false, Ordering::Release);
                RobotError::Unknown(format!("failed to spawn publish thread: {e}"))
            })?;
        *thread = Some(handle);
        Ok(())
    }

    /// 停止发布线程并丢弃未写出的指令
    ///
    /// `Ok` 时发布线程已经退出，之后不会再有写出。
    ///
    /// # 错误
    ///
    /// 线程在 `join_timeout` 内没有退出（通常是卡在一次写出上）时返回
    /// `TransportError::Timeout`。句柄被保留，线程不会再开始新的 tick，
    /// 但正在进行的写出仍可能落地；调用方不得在此之后释放链路资源。
    pub(crate) fn stop(&self, join_timeout: Duration) -> std::result::Result<(), TransportError> {
        let mut thread = self.thread.lock();
        self.shared.is_running.store(false, Ordering::Release);
        self.shared.pending.store(None);
        self.shared.unpublished.store(false, Ordering::Release);
        let Some(handle) = thread.take() else {
            return Ok(());
        };
        match handle.join_timeout(join_timeout) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!("Publish thread panicked: {:?}", e);
                Ok(())
            },
            Err(handle) => {
                error!(
                    "Publish thread did not exit within {:?}, write still in flight",
                    join_timeout
                );
                *thread = Some(handle);
                Err(TransportError::Timeout)
            },
        }
    }

    /// 发布线程是否仍然存活（包括停止超时后仍在写出的线程）
    pub(crate) fn thread_alive(&self) -> bool {
        self.thread
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub(crate) fn submit(&self, command: JointCommand, metrics: &SessionMetrics) {
        self.shared.pending.store(Some(Arc::new(command)));
        if self.shared.unpublished.swap(true, Ordering::AcqRel) {
            metrics.command_overwrites.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn set_period(&self, period: Duration) {
        self.shared
            .period_us
            .store(period.as_micros() as u64, Ordering::Release);
        self.shared.period_changed.store(true, Ordering::Release);
    }

    pub(crate) fn period(&self) -> Duration {
        self.shared.period()
    }

    pub(crate) fn is_running(&self) -> bool {
        self.shared.is_running.load(Ordering::Acquire)
    }
}

/// 周期发布循环
///
/// # 退出条件
///
/// - `is_running` 被置为 false（shutdown / 层级切换 / 断开）
/// - 写出遇到致命链路错误：会话从 `Bound` 转为 `Failed`
fn publish_loop(
    transport: Arc<dyn Transport>,
    shared: Arc<PublisherShared>,
    state: Arc<AtomicSessionState>,
    metrics: Arc<SessionMetrics>,
) {
    #[cfg(feature = "realtime")]
    {
        use thread_priority::*;

        match set_current_thread_priority(ThreadPriority::Max) {
            Ok(_) => info!("Publish thread priority set to MAX (realtime)"),
            Err(e) => warn!(
                "Failed to set publish thread priority: {:?}. \
                On Linux, you may need to run with CAP_SYS_NICE or use rtkit.",
                e
            ),
        }
    }

    let sleeper = spin_sleep::SpinSleeper::default();
    let mut period = shared.period();
    let mut deadline = Instant::now() + period;
    debug!("Publish thread started, period {:?}", period);

    'outer: loop {
        // ==================== 等待截止时间 ====================
        loop {
            // Acquire: 看到 false 时必须能看到停止前的所有写入
            if !shared.is_running.load(Ordering::Acquire) {
                trace!("Publish thread: is_running flag is false, exiting");
                break 'outer;
            }
            if shared.period_changed.swap(false, Ordering::AcqRel) {
                period = shared.period();
                deadline = Instant::now() + period;
                debug!("Publish thread: period changed to {:?}, timer restarted", period);
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            sleeper.sleep((deadline - now).min(MAX_SLEEP_SLICE));
        }

        // ==================== tick ====================
        metrics.publish_ticks.fetch_add(1, Ordering::Relaxed);
        let tick_start = Instant::now();

        match shared.pending.load_full() {
            None => {
                metrics.publish_skipped.fetch_add(1, Ordering::Relaxed);
            },
            Some(command) => {
                shared.unpublished.store(false, Ordering::Release);
                match transport.publish_arm_command(&command) {
                    Ok(()) => {
                        metrics.publish_writes.fetch_add(1, Ordering::Relaxed);
                    },
                    Err(e) => {
                        metrics.publish_errors.fetch_add(1, Ordering::Relaxed);
                        if e.is_fatal() {
                            error!("Publish thread: fatal transport error, stopping: {}", e);
                            // Release: 所有之前的写入对看到 false 的线程可见
                            shared.is_running.store(false, Ordering::Release);
                            state.compare_exchange(
                                SessionState::Bound,
                                SessionState::Failed,
                                Ordering::AcqRel,
                                Ordering::Acquire,
                            );
                            break 'outer;
                        }
                        warn!("Publish thread: failed to write arm command: {}", e);
                    },
                }
            },
        }

        // ==================== 下一个截止时间 ====================
        deadline += period;
        let now = Instant::now();
        if now > deadline {
            metrics.tick_overruns.fetch_add(1, Ordering::Relaxed);
            warn!(
                "Publish tick overran its period: took {:?}, period {:?}",
                now - tick_start,
                period
            );
            // 相位滑移一次，不补发
            deadline = now + period;
        }
    }

    trace!("Publish thread: loop exited");
}

// ==================== 运行时 ====================

/// 底层控制器的运行时资源（每次绑定一个）
pub(crate) struct LowLevelRuntime {
    publisher: Publisher,
    body_imu: Arc<HandlerGate>,
    arm_state: Arc<HandlerGate>,
    initialized: AtomicBool,
    /// 串行化回调注册/注销
    registration: Mutex<()>,
}

impl LowLevelRuntime {
    pub(crate) fn new(period: Duration, metrics: Arc<SessionMetrics>) -> Self {
        Self {
            publisher: Publisher::new(period),
            body_imu: Arc::new(HandlerGate::new("body_imu", STATE_LOG_EVERY, metrics.clone())),
            arm_state: Arc::new(HandlerGate::new("arm_state", STATE_LOG_EVERY, metrics)),
            initialized: AtomicBool::new(false),
            registration: Mutex::new(()),
        }
    }

    /// 启动发布线程（重复调用无副作用）
    pub(crate) fn initialize(&self, core: &SessionCore) -> Result<()> {
        self.publisher.start(
            core.transport.clone(),
            core.state.clone(),
            core.metrics.clone(),
        )?;
        if !self.initialized.swap(true, Ordering::AcqRel) {
            info!(
                "low level controller initialized, publish period {:?}",
                self.publisher.period()
            );
        }
        Ok(())
    }

    /// 停止发布线程、注销两个状态回调、丢弃未写出的指令
    ///
    /// 注销失败会被收集到报告中；本地回调总是被卸载。
    /// 发布线程未能按时退出时报告中包含 `SubTarget::PublishLoop`，
    /// 此时 [`publish_thread_alive`](Self::publish_thread_alive) 为 true。
    pub(crate) fn shutdown(&self, core: &SessionCore) -> OperationReport {
        let mut report = OperationReport::ok();
        if let Err(e) = self.publisher.stop(core.config.join_timeout()) {
            report.push(SubFailure::new(SubTarget::PublishLoop, e));
        }
        for stream in [StateStream::BodyImu, StateStream::ArmState] {
            if let Err(e) = self.unsubscribe(core.transport.as_ref(), stream) {
                warn!("Failed to unregister {:?} handler: {}", stream, e);
                report.push(SubFailure::new(SubTarget::Controller, e));
            }
        }
        if self.initialized.swap(false, Ordering::AcqRel) {
            debug!("low level controller shut down");
        }
        report
    }

    pub(crate) fn publish_thread_alive(&self) -> bool {
        self.publisher.thread_alive()
    }

    fn gate(&self, stream: StateStream) -> &Arc<HandlerGate> {
        match stream {
            StateStream::BodyImu => &self.body_imu,
            StateStream::ArmState => &self.arm_state,
        }
    }

    fn subscribe(
        &self,
        transport: &dyn Transport,
        stream: StateStream,
        handler: Arc<dyn SampleHandler>,
    ) -> std::result::Result<(), TransportError> {
        let _registration = self.registration.lock();
        let gate = self.gate(stream);
        let was_attached = gate.is_attached();
        gate.attach(handler);
        if was_attached {
            // 已注册：只替换回调
            return Ok(());
        }
        let forwarder: Arc<dyn SampleHandler> = Arc::new(GateForwarder(gate.clone()));
        if let Err(e) = transport.register_state_handler(stream, forwarder) {
            gate.detach();
            return Err(e);
        }
        Ok(())
    }

    fn unsubscribe(
        &self,
        transport: &dyn Transport,
        stream: StateStream,
    ) -> std::result::Result<(), TransportError> {
        let _registration = self.registration.lock();
        if !self.gate(stream).detach() {
            return Ok(());
        }
        transport.unregister_state_handler(stream)
    }
}

// ==================== 控制器句柄 ====================

/// 底层运动控制器
///
/// 由 [`Session::get_low_level_motion_controller`](crate::Session::get_low_level_motion_controller)
/// 获取。绑定底层控制时发布线程已经启动，但在第一次
/// `publish_arm_command()` 之前不会写出任何指令。
///
/// # 示例
///
/// ```rust,no_run
/// # use magicbot_client::{Session, Result};
/// # use magicbot_protocol::*;
/// # fn demo(session: &Session) -> Result<()> {
/// session.set_motion_control_level(ControllerLevel::Low)?;
/// let controller = session.get_low_level_motion_controller()?;
/// controller.set_period_ms(2)?;
/// controller.subscribe_arm_state(|_sample: &magicbot_transport::Sample| {})?;
/// controller.publish_arm_command(JointCommand::uniform(
///     0,
///     ARM_JOINT_NUM,
///     SingleJointCommand::default(),
/// ))?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LowLevelMotionController {
    core: Arc<SessionCore>,
    runtime: Arc<LowLevelRuntime>,
    epoch: u64,
}

impl LowLevelMotionController {
    pub(crate) fn new(core: Arc<SessionCore>, runtime: Arc<LowLevelRuntime>, epoch: u64) -> Self {
        Self {
            core,
            runtime,
            epoch,
        }
    }

    /// 初始化（绑定时已自动调用；`shutdown()` 之后可再次调用以重新启动发布线程）
    pub fn initialize(&self) -> Result<Status> {
        let _lease = self.core.lease(ControllerLevel::Low, self.epoch, "initialize")?;
        self.runtime.initialize(&self.core)?;
        Ok(Status::ok())
    }

    /// 停止发布线程并注销状态回调
    ///
    /// 未写出的指令被丢弃。回调注销失败时本地回调仍会被卸载，失败记录在报告中。
    pub fn shutdown(&self) -> Result<OperationReport> {
        let _lease = self.core.lease(ControllerLevel::Low, self.epoch, "shutdown")?;
        Ok(self.runtime.shutdown(&self.core))
    }

    /// 发布线程是否在运行
    pub fn is_running(&self) -> bool {
        self.runtime.publisher.is_running()
    }

    /// 设置发布周期（毫秒，≥ 1）
    ///
    /// 可以在发布线程运行时调用：线程在下一次检查时以新周期重新开始计时。
    pub fn set_period_ms(&self, period_ms: u64) -> Result<Status> {
        let _lease = self.core.lease(ControllerLevel::Low, self.epoch, "set_period_ms")?;
        if period_ms == 0 {
            return Err(RobotError::invalid_state(
                "set_period_ms",
                "publish period must be at least 1ms",
            ));
        }
        self.runtime
            .publisher
            .set_period(Duration::from_millis(period_ms));
        debug!("publish period set to {}ms", period_ms);
        Ok(Status::ok())
    }

    pub fn period_ms(&self) -> u64 {
        self.runtime.publisher.period().as_millis() as u64
    }

    /// 提交手臂关节指令
    ///
    /// 只替换待发布的快照，下一个 tick 开始写出，之后每个 tick 重复写出同一快照，
    /// 直到再次提交。
    pub fn publish_arm_command(&self, command: JointCommand) -> Result<Status> {
        let _lease = self.ready("publish_arm_command")?;
        self.runtime
            .publisher
            .submit(command, &self.core.metrics);
        Ok(Status::ok())
    }

    /// 订阅机身 IMU
    ///
    /// 回调在传输层投递线程上执行，不得阻塞。重复订阅替换回调。
    pub fn subscribe_body_imu<H>(&self, handler: H) -> Result<Status>
    where
        H: SampleHandler + 'static,
    {
        self.subscribe(StateStream::BodyImu, Arc::new(handler), "subscribe_body_imu")
    }

    /// 订阅手臂关节状态
    pub fn subscribe_arm_state<H>(&self, handler: H) -> Result<Status>
    where
        H: SampleHandler + 'static,
    {
        self.subscribe(StateStream::ArmState, Arc::new(handler), "subscribe_arm_state")
    }

    /// 取消订阅机身 IMU
    ///
    /// 返回后回调不会再被调用，即使传输层注销失败。
    pub fn unsubscribe_body_imu(&self) -> Result<Status> {
        self.unsubscribe(StateStream::BodyImu, "unsubscribe_body_imu")
    }

    pub fn unsubscribe_arm_state(&self) -> Result<Status> {
        self.unsubscribe(StateStream::ArmState, "unsubscribe_arm_state")
    }

    /// 本次订阅以来收到的样本数
    pub fn received_samples(&self, stream: StateStream) -> u64 {
        self.runtime.gate(stream).delivered()
    }

    fn subscribe(
        &self,
        stream: StateStream,
        handler: Arc<dyn SampleHandler>,
        operation: &'static str,
    ) -> Result<Status> {
        let _lease = self.ready(operation)?;
        self.runtime
            .subscribe(self.core.transport.as_ref(), stream, handler)?;
        Ok(Status::ok())
    }

    fn unsubscribe(&self, stream: StateStream, operation: &'static str) -> Result<Status> {
        let _lease = self.core.lease(ControllerLevel::Low, self.epoch, operation)?;
        self.runtime
            .unsubscribe(self.core.transport.as_ref(), stream)?;
        Ok(Status::ok())
    }

    fn ready(&self, operation: &'static str) -> Result<crate::session::Lease<'_>> {
        let lease = self.core.lease(ControllerLevel::Low, self.epoch, operation)?;
        if !self.runtime.initialized.load(Ordering::Acquire) {
            return Err(RobotError::invalid_state(
                operation,
                "low level controller is shut down",
            ));
        }
        Ok(lease)
    }
}

impl std::fmt::Debug for LowLevelMotionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LowLevelMotionController")
            .field("epoch", &self.epoch)
            .field("period_ms", &self.period_ms())
            .field("running", &self.is_running())
            .finish()
    }
}
