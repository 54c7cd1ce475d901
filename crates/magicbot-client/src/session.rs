//! 会话：连接生命周期 + 控制层级仲裁
//!
//! # 锁顺序
//!
//! `transition` → `binding` → `active` / `sensors`
//!
//! - `transition`: 串行化所有状态转换（初始化、连接、层级切换、断开、关闭）
//! - `binding`: 控制器句柄在每次调用期间持有读锁（租约），
//!   层级切换先取写锁置位 `switching`，写锁返回即意味着没有进行中的调用
//! - 周期发布线程不持有任何会话锁，只通过原子状态报告致命错误

use crate::config::SessionConfig;
use crate::error::{OperationReport, Result, RobotError, SubFailure, SubTarget};
use crate::high_level::{HighLevelMotionController, HighLevelRuntime};
use crate::low_level::{LowLevelMotionController, LowLevelRuntime};
use crate::metrics::{MetricsSnapshot, SessionMetrics};
use crate::sensor::{SensorController, SensorRuntime};
use crate::state::{AtomicSessionState, SessionState};
use magicbot_protocol::{ControllerLevel, Status};
use magicbot_transport::Transport;
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// 当前绑定
#[derive(Debug, Default)]
pub(crate) struct Binding {
    level: Option<ControllerLevel>,
    /// 每次绑定或解绑递增，旧句柄据此失效
    epoch: u64,
    switching: bool,
}

/// 控制器调用期间持有的租约
pub(crate) type Lease<'a> = RwLockReadGuard<'a, Binding>;

/// 当前绑定层级的运行时
enum ActiveController {
    None,
    High(Arc<HighLevelRuntime>),
    Low(Arc<LowLevelRuntime>),
}

impl ActiveController {
    fn level(&self) -> Option<ControllerLevel> {
        match self {
            Self::None => None,
            Self::High(_) => Some(ControllerLevel::High),
            Self::Low(_) => Some(ControllerLevel::Low),
        }
    }
}

/// 会话内部状态，被会话与所有控制器句柄共享
pub(crate) struct SessionCore {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) state: Arc<AtomicSessionState>,
    pub(crate) config: SessionConfig,
    pub(crate) metrics: Arc<SessionMetrics>,
    transition: Mutex<()>,
    binding: RwLock<Binding>,
    active: Mutex<ActiveController>,
    sensors: Mutex<Option<Arc<SensorRuntime>>>,
    endpoint: Mutex<Option<String>>,
    rpc_timeout_ms: AtomicU64,
}

impl SessionCore {
    pub(crate) fn state(&self) -> SessionState {
        self.state.get(Ordering::Acquire)
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state();
        self.state.set(state, Ordering::Release);
        if previous != state {
            debug!("session state: {} -> {}", previous, state);
        }
    }

    /// 要求链路可用
    ///
    /// - `Connected` / `Bound`: Ok
    /// - `Uninitialized` / `Shutdown`: `InvalidState`
    /// - 其他: `NotConnected`
    pub(crate) fn require_connected(&self, operation: &'static str) -> Result<()> {
        match self.state() {
            SessionState::Connected | SessionState::Bound => Ok(()),
            state @ (SessionState::Uninitialized | SessionState::Shutdown) => Err(
                RobotError::invalid_state(operation, format!("session is {state}")),
            ),
            _ => Err(RobotError::NotConnected { operation }),
        }
    }

    /// 取得控制器租约
    ///
    /// 只有会话仍绑定在 `level` 且绑定纪元等于 `epoch` 时成功。
    pub(crate) fn lease(
        &self,
        level: ControllerLevel,
        epoch: u64,
        operation: &'static str,
    ) -> Result<Lease<'_>> {
        let binding = self.binding.read();
        self.require_connected(operation)?;
        if binding.switching {
            return Err(RobotError::invalid_state(
                operation,
                "motion control level switch in progress",
            ));
        }
        if self.state() != SessionState::Bound || binding.level != Some(level) || binding.epoch != epoch
        {
            return Err(RobotError::invalid_state(
                operation,
                format!("{level} level controller handle is no longer bound"),
            ));
        }
        Ok(binding)
    }

    /// 关闭当前控制器运行时并释放层级
    ///
    /// 调用方必须持有 `transition`。运行时关闭中的次要失败收集到 `report`。
    ///
    /// # 错误
    ///
    /// - `Timeout`: 底层发布线程没有在 `join_timeout_ms` 内退出。运行时被保留
    ///   （层级不释放），旧句柄失效，调用方不得继续拆除链路
    /// - `Transport`: 释放层级失败，此时绑定已经清空
    fn unbind(&self, report: &mut OperationReport) -> Result<()> {
        {
            // 写锁返回时没有进行中的控制器调用
            let mut binding = self.binding.write();
            binding.switching = true;
        }

        let previous = std::mem::replace(&mut *self.active.lock(), ActiveController::None);
        let level = previous.level();
        let stalled = match &previous {
            ActiveController::None => false,
            ActiveController::High(runtime) => {
                runtime.shutdown();
                false
            },
            ActiveController::Low(runtime) => {
                let shutdown = runtime.shutdown(self);
                for failure in &shutdown.failures {
                    warn!("low level shutdown: {}", failure);
                }
                report.extend(shutdown.failures);
                runtime.publish_thread_alive()
            },
        };
        if stalled {
            // 写出仍在进行：保留运行时和层级，之后重试停止
            *self.active.lock() = previous;
            let mut binding = self.binding.write();
            binding.epoch += 1;
            binding.switching = false;
            return Err(RobotError::Timeout {
                operation: "stop_publish_loop",
                timeout_ms: self.config.join_timeout_ms,
            });
        }

        let released = match level {
            Some(level) => self.transport.release_controller(level).map_err(|e| {
                warn!("Failed to release {} level controller: {}", level, e);
                RobotError::from(e)
            }),
            None => Ok(()),
        };

        let mut binding = self.binding.write();
        if binding.level.is_some() {
            binding.epoch += 1;
        }
        binding.level = None;
        binding.switching = false;
        released
    }

    /// 新运行时初始化失败后释放刚获取的层级
    ///
    /// 释放成功时返回 `cause`，会话保持未绑定的 `Connected`；
    /// 释放失败时会话进入 `Failed` 并返回释放错误。
    fn abandon_acquired(&self, level: ControllerLevel, cause: RobotError) -> RobotError {
        warn!("Failed to initialize {} level controller: {}", level, cause);
        match self.transport.release_controller(level) {
            Ok(()) => cause,
            Err(e) => {
                warn!("Failed to release {} level controller: {}", level, e);
                self.set_state(SessionState::Failed);
                e.into()
            },
        }
    }
}

// ==================== Session ====================

/// 机器人会话
///
/// 拥有一条链路的全部状态：生命周期、当前绑定的控制层级、传感器订阅表。
/// 控制器句柄与传感器句柄共享会话内部状态，可以被克隆并跨线程使用，
/// 但会话本身不可克隆；`Session` 被 drop 时执行一次尽力而为的关闭。
///
/// # 示例
///
/// ```rust
/// use magicbot_client::Session;
/// use magicbot_protocol::ControllerLevel;
/// use magicbot_transport::MockTransport;
///
/// # fn main() -> magicbot_client::Result<()> {
/// let session = Session::new(MockTransport::new());
/// session.initialize("127.0.0.1")?;
/// session.connect()?;
/// session.set_motion_control_level(ControllerLevel::High)?;
/// let controller = session.get_high_level_motion_controller()?;
/// assert!(controller.is_initialized());
/// session.shutdown()?;
/// # Ok(())
/// # }
/// ```
pub struct Session {
    core: Arc<SessionCore>,
}

impl Session {
    /// 使用默认配置创建会话
    pub fn new<T>(transport: T) -> Self
    where
        T: Transport + 'static,
    {
        Self::from_parts(Arc::new(transport), SessionConfig::default())
    }

    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    fn from_parts(transport: Arc<dyn Transport>, config: SessionConfig) -> Self {
        let rpc_timeout_ms = config.rpc_timeout_ms;
        Self {
            core: Arc::new(SessionCore {
                transport,
                state: Arc::new(AtomicSessionState::new(SessionState::Uninitialized)),
                config,
                metrics: Arc::new(SessionMetrics::new()),
                transition: Mutex::new(()),
                binding: RwLock::new(Binding::default()),
                active: Mutex::new(ActiveController::None),
                sensors: Mutex::new(None),
                endpoint: Mutex::new(None),
                rpc_timeout_ms: AtomicU64::new(rpc_timeout_ms),
            }),
        }
    }

    /// SDK 版本号
    pub fn sdk_version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    pub fn state(&self) -> SessionState {
        self.core.state()
    }

    /// `initialize()` 使用的本地地址
    pub fn endpoint(&self) -> Option<String> {
        self.core.endpoint.lock().clone()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.core.config
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.core.metrics.snapshot()
    }

    /// 共享的指标计数器（可在其他线程上持续观察）
    pub fn metrics_handle(&self) -> Arc<SessionMetrics> {
        self.core.metrics.clone()
    }

    /// 当前 RPC 超时
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.core.rpc_timeout_ms.load(Ordering::Acquire))
    }

    // ==================== 生命周期 ====================

    /// 初始化本地链路
    ///
    /// # 错误
    ///
    /// - `InvalidState`: 不处于 `Uninitialized`（包括重复初始化）
    /// - `Transport`: 链路初始化失败，会话保持 `Uninitialized`
    pub fn initialize(&self, endpoint: &str) -> Result<Status> {
        let _transition = self.core.transition.lock();
        let state = self.core.state();
        if state != SessionState::Uninitialized {
            return Err(RobotError::invalid_state(
                "initialize",
                format!("session is already {state}"),
            ));
        }
        if endpoint.is_empty() {
            return Err(RobotError::invalid_state("initialize", "endpoint is empty"));
        }

        self.core.transport.set_rpc_timeout(self.timeout());
        self.core.transport.initialize(endpoint).inspect_err(|e| {
            error!("Failed to initialize link on {}: {}", endpoint, e);
        })?;
        *self.core.endpoint.lock() = Some(endpoint.to_string());
        self.core.set_state(SessionState::Initialized);
        info!("session initialized on {} (SDK {})", endpoint, Self::sdk_version());
        Ok(Status::ok())
    }

    /// 使用配置中的 `endpoint` 初始化
    pub fn initialize_from_config(&self) -> Result<Status> {
        let endpoint = self
            .core
            .config
            .endpoint
            .clone()
            .ok_or_else(|| RobotError::Config("no endpoint configured".into()))?;
        self.initialize(&endpoint)
    }

    /// 设置 RPC 超时（毫秒，≥ 1）
    pub fn set_timeout(&self, timeout_ms: u64) -> Result<Status> {
        let _transition = self.core.transition.lock();
        if self.core.state() == SessionState::Shutdown {
            return Err(RobotError::invalid_state("set_timeout", "session is Shutdown"));
        }
        if timeout_ms == 0 {
            return Err(RobotError::invalid_state(
                "set_timeout",
                "timeout must be at least 1ms",
            ));
        }
        self.core.rpc_timeout_ms.store(timeout_ms, Ordering::Release);
        self.core
            .transport
            .set_rpc_timeout(Duration::from_millis(timeout_ms));
        debug!("RPC timeout set to {}ms", timeout_ms);
        Ok(Status::ok())
    }

    /// 建立连接
    ///
    /// 失败时会话保持 `Initialized`，可以重试。
    pub fn connect(&self) -> Result<Status> {
        let _transition = self.core.transition.lock();
        let state = self.core.state();
        if state != SessionState::Initialized {
            return Err(RobotError::invalid_state(
                "connect",
                format!("session is {state}, expected Initialized"),
            ));
        }
        self.core.transport.connect().inspect_err(|e| {
            warn!("Failed to connect: {}", e);
        })?;
        self.core.set_state(SessionState::Connected);
        info!("session connected");
        Ok(Status::ok())
    }

    /// 当前绑定的控制层级
    pub fn motion_control_level(&self) -> Option<ControllerLevel> {
        self.core.binding.read().level
    }

    /// 切换控制层级
    ///
    /// 已经绑定在 `level` 时直接返回。否则依次：关闭当前控制器运行时，
    /// 释放旧层级，获取新层级，初始化新运行时。切换期间控制器调用返回 `InvalidState`。
    ///
    /// # 错误
    ///
    /// - `NotConnected` / `InvalidState`: 会话不处于 `Connected` / `Bound`
    /// - `Transport`: 释放旧层级失败（会话进入 `Failed`），
    ///   或获取新层级失败（会话回到未绑定的 `Connected`）
    /// - `Timeout`: 旧的底层发布线程没有按时退出（会话进入 `Failed`）
    pub fn set_motion_control_level(&self, level: ControllerLevel) -> Result<Status> {
        let _transition = self.core.transition.lock();
        self.core.require_connected("set_motion_control_level")?;
        if self.core.state() == SessionState::Bound && self.core.binding.read().level == Some(level)
        {
            debug!("already bound to {} level", level);
            return Ok(Status::ok_with(format!("already bound to {level} level")));
        }

        let mut report = OperationReport::ok();
        if let Err(e) = self.core.unbind(&mut report) {
            self.core.set_state(SessionState::Failed);
            error!("Motion control level switch aborted, session failed: {}", e);
            return Err(e);
        }
        // 发布线程可能在解绑期间报告了致命错误
        if self.core.state() == SessionState::Failed {
            return Err(RobotError::NotConnected {
                operation: "set_motion_control_level",
            });
        }
        self.core.set_state(SessionState::Connected);

        self.core.transport.acquire_controller(level).inspect_err(|e| {
            warn!("Failed to acquire {} level controller: {}", level, e);
        })?;

        let active = match level {
            ControllerLevel::High => {
                let runtime = Arc::new(HighLevelRuntime::new(self.core.metrics.clone()));
                runtime.initialize();
                ActiveController::High(runtime)
            },
            ControllerLevel::Low => {
                let runtime = Arc::new(LowLevelRuntime::new(
                    Duration::from_millis(self.core.config.publish_period_ms),
                    self.core.metrics.clone(),
                ));
                if let Err(e) = runtime.initialize(&self.core) {
                    return Err(self.core.abandon_acquired(level, e));
                }
                ActiveController::Low(runtime)
            },
        };
        *self.core.active.lock() = active;

        {
            let mut binding = self.core.binding.write();
            binding.level = Some(level);
            binding.epoch += 1;
        }
        self.core.set_state(SessionState::Bound);
        info!("motion control level set to {}", level);
        Ok(Status::ok())
    }

    /// 获取高层运动控制器
    ///
    /// # 错误
    ///
    /// 未绑定到高层控制时返回 `InvalidState`。
    pub fn get_high_level_motion_controller(&self) -> Result<HighLevelMotionController> {
        let operation = "get_high_level_motion_controller";
        let binding = self.bound(ControllerLevel::High, operation)?;
        match &*self.core.active.lock() {
            ActiveController::High(runtime) => Ok(HighLevelMotionController::new(
                self.core.clone(),
                runtime.clone(),
                binding.epoch,
            )),
            _ => Err(RobotError::invalid_state(operation, "high level runtime missing")),
        }
    }

    /// 获取底层运动控制器
    pub fn get_low_level_motion_controller(&self) -> Result<LowLevelMotionController> {
        let operation = "get_low_level_motion_controller";
        let binding = self.bound(ControllerLevel::Low, operation)?;
        match &*self.core.active.lock() {
            ActiveController::Low(runtime) => Ok(LowLevelMotionController::new(
                self.core.clone(),
                runtime.clone(),
                binding.epoch,
            )),
            _ => Err(RobotError::invalid_state(operation, "low level runtime missing")),
        }
    }

    fn bound(&self, level: ControllerLevel, operation: &'static str) -> Result<Lease<'_>> {
        let binding = self.core.binding.read();
        self.core.require_connected(operation)?;
        if binding.switching || binding.level != Some(level) {
            let reason = match binding.level {
                Some(bound) => format!("session is bound to {bound} level, not {level}"),
                None => format!("session is not bound to {level} level"),
            };
            return Err(RobotError::invalid_state(operation, reason));
        }
        Ok(binding)
    }

    /// 获取传感器控制器
    ///
    /// 第一次调用时初始化链路的传感器子系统。
    pub fn sensor_controller(&self) -> Result<SensorController> {
        let _transition = self.core.transition.lock();
        self.core.require_connected("sensor_controller")?;
        let mut sensors = self.core.sensors.lock();
        if let Some(runtime) = sensors.as_ref().filter(|r| r.is_active()) {
            return Ok(SensorController::new(self.core.clone(), runtime.clone()));
        }
        self.core.transport.initialize_sensors().inspect_err(|e| {
            warn!("Failed to initialize sensors: {}", e);
        })?;
        let runtime = Arc::new(SensorRuntime::new(self.core.metrics.clone()));
        *sensors = Some(runtime.clone());
        info!("sensor subsystem initialized");
        Ok(SensorController::new(self.core.clone(), runtime))
    }

    /// 断开连接
    ///
    /// 依次：关闭所有打开的传感器设备（级联退订），关闭控制器运行时，释放控制层级，
    /// 断开链路。前三步的失败被收集到返回的报告中；链路断开失败作为错误返回，
    /// 会话进入 `Failed`。
    ///
    /// 底层发布线程没有在 `join_timeout_ms` 内退出时返回 `Timeout`，会话进入 `Failed`，
    /// 层级不释放、链路不断开；之后可以再次调用 `disconnect()` 重试。
    pub fn disconnect(&self) -> Result<OperationReport> {
        let _transition = self.core.transition.lock();
        self.disconnect_locked("disconnect")
    }

    fn disconnect_locked(&self, operation: &'static str) -> Result<OperationReport> {
        match self.core.state() {
            SessionState::Connected | SessionState::Bound | SessionState::Failed => {},
            SessionState::Disconnected => {
                debug!("{}: already disconnected", operation);
                return Ok(OperationReport::new(Status::already_closed("already disconnected")));
            },
            state => {
                return Err(RobotError::invalid_state(
                    operation,
                    format!("session is {state}"),
                ));
            },
        }

        let mut report = OperationReport::ok();

        if let Some(sensors) = self.core.sensors.lock().clone() {
            report.extend(sensors.close_all(self.core.transport.as_ref()));
        }

        match self.core.unbind(&mut report) {
            Ok(()) => {},
            Err(RobotError::Transport(e)) => {
                report.push(SubFailure::new(SubTarget::Controller, e));
            },
            Err(e) => {
                // 发布线程仍在写出：不能断开链路
                for failure in &report.failures {
                    warn!("{}: {}", operation, failure);
                }
                error!("{} aborted, session failed: {}", operation, e);
                self.core.set_state(SessionState::Failed);
                return Err(e);
            },
        }

        for failure in &report.failures {
            warn!("{}: {}", operation, failure);
        }

        if let Err(e) = self.core.transport.disconnect() {
            error!("Transport disconnect failed: {}", e);
            self.core.set_state(SessionState::Failed);
            return Err(e.into());
        }
        self.core.set_state(SessionState::Disconnected);
        info!(
            "session disconnected ({} secondary failure(s))",
            report.failures.len()
        );
        Ok(report)
    }

    /// 关闭会话并释放链路
    ///
    /// 之后除状态查询外的所有方法返回 `InvalidState`。
    pub fn shutdown(&self) -> Result<OperationReport> {
        let _transition = self.core.transition.lock();
        let mut report = match self.core.state() {
            SessionState::Uninitialized => {
                return Err(RobotError::invalid_state("shutdown", "session was never initialized"));
            },
            SessionState::Shutdown => {
                return Ok(OperationReport::new(Status::already_closed("already shut down")));
            },
            SessionState::Initialized | SessionState::Disconnected => OperationReport::ok(),
            SessionState::Connected | SessionState::Bound | SessionState::Failed => {
                match self.disconnect_locked("shutdown") {
                    Ok(report) => report,
                    Err(RobotError::Transport(e)) => {
                        let mut report = OperationReport::ok();
                        report.push(SubFailure::new(SubTarget::Link, e));
                        report
                    },
                    // 链路仍被发布线程使用，会话保持 Failed，可以稍后重试
                    Err(e) => return Err(e),
                }
            },
        };

        if self.core.sensors.lock().take().is_some() {
            if let Err(e) = self.core.transport.shutdown_sensors() {
                warn!("Failed to shut down sensors: {}", e);
                report.push(SubFailure::new(SubTarget::Sensors, e));
            }
        }

        let result = self.core.transport.shutdown();
        self.core.set_state(SessionState::Shutdown);
        *self.core.endpoint.lock() = None;
        match result {
            Ok(()) => {
                info!("session shut down");
                Ok(report)
            },
            Err(e) => {
                error!("Transport shutdown failed: {}", e);
                Err(e.into())
            },
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        match self.core.state() {
            SessionState::Uninitialized | SessionState::Shutdown => {},
            state => {
                debug!("dropping session in state {}, shutting down", state);
                if let Err(e) = self.shutdown() {
                    warn!("Best-effort shutdown on drop failed: {}", e);
                }
            },
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .field("level", &self.motion_control_level())
            .field("endpoint", &self.endpoint())
            .finish()
    }
}

// ==================== Builder ====================

/// 会话构建器
///
/// # 示例
///
/// ```rust
/// use magicbot_client::{Session, SessionConfig};
/// use magicbot_transport::MockTransport;
///
/// let session = Session::builder()
///     .transport(MockTransport::new())
///     .config(SessionConfig {
///         publish_period_ms: 4,
///         ..Default::default()
///     })
///     .build()
///     .unwrap();
/// assert_eq!(session.config().publish_period_ms, 4);
/// ```
#[derive(Default)]
pub struct SessionBuilder {
    transport: Option<Arc<dyn Transport>>,
    config: Option<SessionConfig>,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transport<T>(mut self, transport: T) -> Self
    where
        T: Transport + 'static,
    {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// 使用已共享的链路
    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// 构建会话
    ///
    /// # 错误
    ///
    /// - `Config`: 未提供链路或配置校验失败
    pub fn build(self) -> Result<Session> {
        let transport = self
            .transport
            .ok_or_else(|| RobotError::Config("no transport provided".into()))?;
        let config = self.config.unwrap_or_default();
        config.validate()?;
        Ok(Session::from_parts(transport, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use magicbot_protocol::StatusCode;
    use magicbot_transport::{MockCall, MockOp, MockTransport, TransportError};

    fn connected() -> (Session, MockTransport) {
        let mock = MockTransport::new();
        let session = Session::new(mock.clone());
        session.initialize("127.0.0.1").unwrap();
        session.connect().unwrap();
        (session, mock)
    }

    #[test]
    fn test_initialize_twice_is_invalid_state() {
        let session = Session::new(MockTransport::new());
        session.initialize("127.0.0.1").unwrap();
        let err = session.initialize("127.0.0.1").unwrap_err();
        assert_eq!(err.code(), StatusCode::InvalidState);
        assert_eq!(session.state(), SessionState::Initialized);
    }

    #[test]
    fn test_initialize_failure_stays_uninitialized() {
        let mock = MockTransport::new();
        mock.inject_failure(MockOp::Initialize, TransportError::Device("no nic".into()));
        let session = Session::new(mock);
        assert!(session.initialize("127.0.0.1").is_err());
        assert_eq!(session.state(), SessionState::Uninitialized);
    }

    #[test]
    fn test_connect_failure_allows_retry() {
        let mock = MockTransport::new();
        let session = Session::new(mock.clone());
        session.initialize("127.0.0.1").unwrap();
        mock.inject_failure(MockOp::Connect, TransportError::Timeout);
        let err = session.connect().unwrap_err();
        assert_eq!(err.code(), StatusCode::Timeout);
        assert_eq!(session.state(), SessionState::Initialized);

        mock.clear_failure(MockOp::Connect);
        session.connect().unwrap();
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[test]
    fn test_set_timeout_forwarded() {
        let (session, mock) = connected();
        session.set_timeout(250).unwrap();
        assert_eq!(session.timeout(), Duration::from_millis(250));
        assert_eq!(mock.rpc_timeout(), Duration::from_millis(250));
        assert!(session.set_timeout(0).is_err());
    }

    #[test]
    fn test_level_switch_releases_previous() {
        let (session, mock) = connected();
        session.set_motion_control_level(ControllerLevel::High).unwrap();
        let high = session.get_high_level_motion_controller().unwrap();

        session.set_motion_control_level(ControllerLevel::Low).unwrap();
        assert_eq!(mock.acquired_level(), Some(ControllerLevel::Low));
        assert_eq!(session.motion_control_level(), Some(ControllerLevel::Low));

        let calls = mock.calls();
        let release = calls
            .iter()
            .position(|c| *c == MockCall::Release(ControllerLevel::High))
            .unwrap();
        let acquire = calls
            .iter()
            .position(|c| *c == MockCall::Acquire(ControllerLevel::Low))
            .unwrap();
        assert!(release < acquire);

        // 旧句柄失效
        let err = high.get_gait().unwrap_err();
        assert_eq!(err.code(), StatusCode::InvalidState);
        assert!(session.get_high_level_motion_controller().is_err());
    }

    #[test]
    fn test_level_switch_idempotent() {
        let (session, mock) = connected();
        session.set_motion_control_level(ControllerLevel::High).unwrap();
        let controller = session.get_high_level_motion_controller().unwrap();
        mock.clear_calls();

        session.set_motion_control_level(ControllerLevel::High).unwrap();
        assert!(mock.calls().is_empty());
        // 同一次绑定，句柄仍然有效
        controller.get_gait().unwrap();
    }

    #[test]
    fn test_release_failure_fails_session() {
        let (session, mock) = connected();
        session.set_motion_control_level(ControllerLevel::High).unwrap();
        mock.inject_failure(
            MockOp::Release(ControllerLevel::High),
            TransportError::Device("stuck".into()),
        );
        assert!(session.set_motion_control_level(ControllerLevel::Low).is_err());
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(session.motion_control_level(), None);
    }

    #[test]
    fn test_failed_runtime_init_releases_level() {
        let (session, mock) = connected();
        mock.acquire_controller(ControllerLevel::Low).unwrap();

        let err = session
            .core
            .abandon_acquired(ControllerLevel::Low, RobotError::Unknown("spawn failed".into()));
        assert_eq!(err, RobotError::Unknown("spawn failed".into()));
        assert_eq!(mock.acquired_level(), None);
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[test]
    fn test_failed_runtime_init_with_release_failure_fails_session() {
        let (session, mock) = connected();
        mock.acquire_controller(ControllerLevel::Low).unwrap();
        mock.inject_failure(
            MockOp::Release(ControllerLevel::Low),
            TransportError::Device("stuck".into()),
        );

        let err = session
            .core
            .abandon_acquired(ControllerLevel::Low, RobotError::Unknown("spawn failed".into()));
        assert_eq!(
            err,
            RobotError::Transport(TransportError::Device("stuck".into()))
        );
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(mock.acquired_level(), Some(ControllerLevel::Low));
    }

    #[test]
    fn test_acquire_failure_leaves_connected_unbound() {
        let (session, mock) = connected();
        mock.inject_failure(
            MockOp::Acquire(ControllerLevel::Low),
            TransportError::rejected(3, "busy"),
        );
        assert!(session.set_motion_control_level(ControllerLevel::Low).is_err());
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(session.motion_control_level(), None);
    }

    #[test]
    fn test_level_switch_requires_connection() {
        let session = Session::new(MockTransport::new());
        session.initialize("127.0.0.1").unwrap();
        let err = session
            .set_motion_control_level(ControllerLevel::High)
            .unwrap_err();
        assert_eq!(err.code(), StatusCode::NotConnected);
    }

    #[test]
    fn test_disconnect_idempotent_and_from_initialized_invalid() {
        let session = Session::new(MockTransport::new());
        session.initialize("127.0.0.1").unwrap();
        assert_eq!(
            session.disconnect().unwrap_err().code(),
            StatusCode::InvalidState
        );
        session.connect().unwrap();
        assert!(session.disconnect().unwrap().is_clean());
        let again = session.disconnect().unwrap();
        assert_eq!(again.status.code(), StatusCode::AlreadyClosed);
    }

    #[test]
    fn test_shutdown_lifecycle() {
        let session = Session::new(MockTransport::new());
        assert_eq!(
            session.shutdown().unwrap_err().code(),
            StatusCode::InvalidState
        );
        session.initialize("127.0.0.1").unwrap();
        session.shutdown().unwrap();
        assert_eq!(session.state(), SessionState::Shutdown);
        assert_eq!(
            session.shutdown().unwrap().status.code(),
            StatusCode::AlreadyClosed
        );
        assert_eq!(
            session.set_timeout(100).unwrap_err().code(),
            StatusCode::InvalidState
        );
        assert_eq!(session.connect().unwrap_err().code(), StatusCode::InvalidState);
    }

    #[test]
    fn test_drop_shuts_down_transport() {
        let mock = MockTransport::new();
        {
            let session = Session::new(mock.clone());
            session.initialize("127.0.0.1").unwrap();
            session.connect().unwrap();
            session.set_motion_control_level(ControllerLevel::Low).unwrap();
        }
        assert!(!mock.is_connected());
        assert_eq!(mock.acquired_level(), None);
        assert!(mock.calls().contains(&MockCall::Shutdown));
    }

    #[test]
    fn test_builder_requires_transport() {
        assert!(matches!(
            SessionBuilder::new().build(),
            Err(RobotError::Config(_))
        ));
        let session = Session::builder()
            .transport(MockTransport::new())
            .config(SessionConfig {
                endpoint: Some("10.0.0.1".into()),
                ..Default::default()
            })
            .build()
            .unwrap();
        session.initialize_from_config().unwrap();
        assert_eq!(session.endpoint().as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn test_sdk_version() {
        assert_eq!(Session::sdk_version(), env!("CARGO_PKG_VERSION"));
    }
}
