//! 高层运动控制（步态 / 特技动作 / 头部 / 摇杆）
//!
//! 需要等待完成的请求通过 [`Dispatcher`] 发出：
//!
//! 1. 在挂起表中登记请求 ID 和一个容量为 1 的通道
//! 2. 把 [`MotionReply`] 交给传输层
//! 3. 在通道上 `recv_timeout`
//!
//! 超时后挂起表项被移除，此后到达的完成通知只会被记录并丢弃，
//! 不会回传给已经返回的调用方，也不会回执给传输层。

use crate::error::{Result, RobotError};
use crate::metrics::SessionMetrics;
use crate::session::SessionCore;
use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use magicbot_protocol::{ControllerLevel, GaitMode, JoystickCommand, Status, TrickAction};
use magicbot_transport::{MotionReply, MotionRequest, Transport, TransportError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

type PendingTable = Mutex<HashMap<u64, Sender<std::result::Result<(), TransportError>>>>;

/// 请求/完成关联器
pub(crate) struct Dispatcher {
    pending: Arc<PendingTable>,
    next_id: AtomicU64,
    metrics: Arc<SessionMetrics>,
}

impl Dispatcher {
    pub(crate) fn new(metrics: Arc<SessionMetrics>) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            metrics,
        }
    }

    /// 提交请求（调用方必须持有控制器租约）
    ///
    /// 返回等待句柄；等待本身不持有任何锁。
    fn submit(&self, transport: &dyn Transport, request: MotionRequest) -> Result<PendingMotion> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = bounded(1);
        self.pending.lock().insert(id, tx);

        let pending = self.pending.clone();
        let metrics = self.metrics.clone();
        let reply = MotionReply::new(id, move |id, result| {
            let waiter = pending.lock().remove(&id);
            match waiter {
                Some(tx) => {
                    let _ = tx.send(result);
                },
                None => {
                    metrics.late_completions.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "Discarding late completion for motion request #{}: {:?}",
                        id, result
                    );
                },
            }
        });

        self.metrics.motion_requests.fetch_add(1, Ordering::Relaxed);
        debug!("motion request #{} submitted: {}", id, request);
        if let Err(e) = transport.submit_motion(request, reply) {
            self.pending.lock().remove(&id);
            return Err(e.into());
        }
        Ok(PendingMotion { id, rx, request })
    }

    fn wait(&self, pending: PendingMotion, operation: &'static str, timeout: Duration) -> Result<Status> {
        let PendingMotion { id, rx, request } = pending;
        let outcome = match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                // 表项已被完成回调（或 cancel_all）取走：发送端要么即将发送，要么已被丢弃
                if self.pending.lock().remove(&id).is_none() {
                    return match rx.recv() {
                        Ok(result) => finish(request, result),
                        Err(_) => Err(RobotError::invalid_state(
                            operation,
                            "controller was shut down while waiting for completion",
                        )),
                    };
                }
                self.metrics.motion_timeouts.fetch_add(1, Ordering::Relaxed);
                warn!("{} (request #{}) timed out after {:?}", request, id, timeout);
                return Err(RobotError::Timeout {
                    operation,
                    timeout_ms: timeout.as_millis() as u64,
                });
            },
            // 挂起表被清空：控制器在等待期间被关闭
            Err(RecvTimeoutError::Disconnected) => {
                return Err(RobotError::invalid_state(
                    operation,
                    "controller was shut down while waiting for completion",
                ));
            },
        };
        finish(request, outcome)
    }

    /// 取消所有挂起请求，等待者得到 `InvalidState`
    pub(crate) fn cancel_all(&self) -> usize {
        let mut pending = self.pending.lock();
        let count = pending.len();
        pending.clear();
        count
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

fn finish(request: MotionRequest, result: std::result::Result<(), TransportError>) -> Result<Status> {
    match result {
        Ok(()) => {
            info!("{} completed", request);
            Ok(Status::ok())
        },
        Err(e) => Err(e.into()),
    }
}

struct PendingMotion {
    id: u64,
    rx: crossbeam_channel::Receiver<std::result::Result<(), TransportError>>,
    request: MotionRequest,
}

/// 高层控制器的运行时资源（每次绑定一个）
pub(crate) struct HighLevelRuntime {
    dispatcher: Dispatcher,
    initialized: AtomicBool,
}

impl HighLevelRuntime {
    pub(crate) fn new(metrics: Arc<SessionMetrics>) -> Self {
        Self {
            dispatcher: Dispatcher::new(metrics),
            initialized: AtomicBool::new(false),
        }
    }

    pub(crate) fn initialize(&self) {
        if !self.initialized.swap(true, Ordering::AcqRel) {
            debug!("high level controller initialized");
        }
    }

    pub(crate) fn shutdown(&self) {
        if self.initialized.swap(false, Ordering::AcqRel) {
            let cancelled = self.dispatcher.cancel_all();
            if cancelled > 0 {
                warn!("high level controller shut down with {} pending request(s)", cancelled);
            }
            debug!("high level controller shut down");
        }
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }
}

/// 高层运动控制器
///
/// 由 [`Session::get_high_level_motion_controller`](crate::Session::get_high_level_motion_controller)
/// 获取，只在签发它的那次绑定内有效；会话切换层级或断开后，
/// 所有方法返回 `InvalidState`。
///
/// # 示例
///
/// ```rust,no_run
/// # use magicbot_client::{Session, Result};
/// # use magicbot_protocol::{ControllerLevel, GaitMode};
/// # use std::time::Duration;
/// # fn demo(session: &Session) -> Result<()> {
/// session.set_motion_control_level(ControllerLevel::High)?;
/// let controller = session.get_high_level_motion_controller()?;
/// controller.set_gait(GaitMode::RecoveryStand, Some(Duration::from_secs(10)))?;
/// assert_eq!(controller.get_gait()?, GaitMode::RecoveryStand);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct HighLevelMotionController {
    core: Arc<SessionCore>,
    runtime: Arc<HighLevelRuntime>,
    epoch: u64,
}

impl HighLevelMotionController {
    pub(crate) fn new(core: Arc<SessionCore>, runtime: Arc<HighLevelRuntime>, epoch: u64) -> Self {
        Self {
            core,
            runtime,
            epoch,
        }
    }

    /// 初始化（绑定时已自动调用，重复调用无副作用）
    pub fn initialize(&self) -> Result<Status> {
        let _lease = self.core.lease(ControllerLevel::High, self.epoch, "initialize")?;
        self.runtime.initialize();
        Ok(Status::ok())
    }

    /// 释放控制器资源，挂起中的请求以 `InvalidState` 结束
    pub fn shutdown(&self) -> Result<Status> {
        let _lease = self.core.lease(ControllerLevel::High, self.epoch, "shutdown")?;
        self.runtime.shutdown();
        Ok(Status::ok())
    }

    pub fn is_initialized(&self) -> bool {
        self.runtime.is_initialized()
    }

    /// 挂起中（已提交、未完成、未超时）的请求数
    pub fn pending_requests(&self) -> usize {
        self.runtime.dispatcher.pending_count()
    }

    /// 切换步态，阻塞直到完成或超时
    ///
    /// # 参数
    ///
    /// - `timeout`: `None` 时使用配置中的 `motion_timeout_ms`
    ///
    /// # 错误
    ///
    /// - `Timeout`: 超时；之后到达的完成通知会被丢弃
    /// - `Transport`: 请求被拒绝或链路错误
    /// - `InvalidState`: 句柄已失效或正在切换控制层级
    pub fn set_gait(&self, mode: GaitMode, timeout: Option<Duration>) -> Result<Status> {
        self.run_motion("set_gait", MotionRequest::SetGait(mode), timeout)
    }

    /// 查询当前步态
    pub fn get_gait(&self) -> Result<GaitMode> {
        let _lease = self.ready("get_gait")?;
        Ok(self.core.transport.get_gait()?)
    }

    /// 执行特技动作，阻塞直到完成或超时
    ///
    /// `TrickAction::None`（包括从未知符号名解析得到的）直接成功返回，不发出任何请求。
    pub fn execute_trick(&self, action: TrickAction, timeout: Option<Duration>) -> Result<Status> {
        if action.is_none() {
            let _lease = self.ready("execute_trick")?;
            debug!("execute_trick: no action requested");
            return Ok(Status::ok_with("no action"));
        }
        self.run_motion("execute_trick", MotionRequest::ExecuteTrick(action), timeout)
    }

    /// 头部运动
    ///
    /// # 参数
    ///
    /// - `shake`: 水平角（弧度，正值向右）
    /// - `nod`: 俯仰角（弧度，正值向上）
    ///
    /// 超出配置限制的角度会被钳位。
    pub fn head_move(&self, shake: f64, nod: f64, timeout: Option<Duration>) -> Result<Status> {
        let (s, n, clamped) = self.core.config.head_limits.clamp(shake, nod);
        if clamped {
            warn!(
                "head_move({}, {}) exceeds head limits, clamped to ({}, {})",
                shake, nod, s, n
            );
        }
        self.run_motion("head_move", MotionRequest::HeadMove { shake: s, nod: n }, timeout)
    }

    /// 发送摇杆指令（不等待完成）
    ///
    /// 越界的轴被钳位到 [-1.0, 1.0]，NaN 置 0。
    pub fn send_joystick_command(&self, command: JoystickCommand) -> Result<Status> {
        let _lease = self.ready("send_joystick_command")?;
        let (command, clamped) = command.clamped();
        if clamped {
            warn!("joystick command out of range, clamped to {:?}", command);
        }
        self.core.transport.send_joystick(&command)?;
        Ok(Status::ok())
    }

    fn run_motion(
        &self,
        operation: &'static str,
        request: MotionRequest,
        timeout: Option<Duration>,
    ) -> Result<Status> {
        let timeout = timeout.unwrap_or_else(|| self.core.config.motion_timeout());
        // 租约只覆盖提交，等待期间允许层级切换（切换会取消挂起请求）
        let pending = {
            let _lease = self.ready(operation)?;
            self.runtime
                .dispatcher
                .submit(self.core.transport.as_ref(), request)?
        };
        self.runtime.dispatcher.wait(pending, operation, timeout)
    }

    fn ready(&self, operation: &'static str) -> Result<crate::session::Lease<'_>> {
        let lease = self.core.lease(ControllerLevel::High, self.epoch, operation)?;
        if !self.runtime.is_initialized() {
            return Err(RobotError::invalid_state(
                operation,
                "high level controller is shut down",
            ));
        }
        Ok(lease)
    }
}

impl std::fmt::Debug for HighLevelMotionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HighLevelMotionController")
            .field("epoch", &self.epoch)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
