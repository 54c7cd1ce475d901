//! 进程内模拟机器人（用于测试和演示，无网络依赖）
//!
//! `MockTransport` 记录所有调用，支持按操作注入错误、
//! 控制高层运动请求的完成时机，以及在后台线程上持续产生传感器样本。

use crate::error::TransportError;
use crate::motion::{MotionReply, MotionRequest};
use crate::sample::{Sample, SampleHandler, StateStream};
use crate::Transport;
use magicbot_protocol::{
    CameraInfo, ControllerLevel, GaitMode, Header, Image, Imu, JointCommand, JointState,
    JoystickCommand, PayloadKind, PointCloud2, SensorChannel, SensorDevice, SingleJointState,
    TrinocularCameraFrame, ARM_JOINT_NUM,
};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, trace};

/// 可注入错误的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Initialize,
    Connect,
    Disconnect,
    Shutdown,
    Acquire(ControllerLevel),
    Release(ControllerLevel),
    SubmitMotion,
    GetGait,
    Joystick,
    Publish,
    RegisterState(StateStream),
    UnregisterState(StateStream),
    InitializeSensors,
    ShutdownSensors,
    OpenDevice(SensorDevice),
    CloseDevice(SensorDevice),
    Subscribe(SensorChannel),
    Unsubscribe(SensorChannel),
}

/// 调用记录（不包含高频的 `publish_arm_command`）
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Initialize(String),
    SetRpcTimeout(Duration),
    Connect,
    Disconnect,
    Shutdown,
    Acquire(ControllerLevel),
    Release(ControllerLevel),
    SubmitMotion(MotionRequest),
    GetGait,
    Joystick(JoystickCommand),
    RegisterState(StateStream),
    UnregisterState(StateStream),
    InitializeSensors,
    ShutdownSensors,
    OpenDevice(SensorDevice),
    CloseDevice(SensorDevice),
    Subscribe(SensorChannel),
    Unsubscribe(SensorChannel),
}

/// 高层运动请求的完成方式
#[derive(Debug, Clone, PartialEq)]
pub enum MotionBehavior {
    /// 在 `submit_motion` 内同步完成
    Immediate,
    /// 在后台线程延迟后完成
    Delayed(Duration),
    /// 挂起，直到调用 [`MockTransport::release_held`]
    Hold,
    /// 完成但携带错误
    Fail(TransportError),
}

struct MockState {
    endpoint: Option<String>,
    connected: bool,
    rpc_timeout: Duration,
    acquired: Option<ControllerLevel>,
    gait: GaitMode,
    motion_behavior: MotionBehavior,
    held: Vec<(MotionRequest, MotionReply)>,
    failures: HashMap<MockOp, TransportError>,
    calls: Vec<MockCall>,
    joystick: Vec<JoystickCommand>,
    state_handlers: HashMap<StateStream, Arc<dyn SampleHandler>>,
    sensors_initialized: bool,
    open_devices: BTreeSet<SensorDevice>,
    sensor_handlers: HashMap<SensorChannel, Arc<dyn SampleHandler>>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            endpoint: None,
            connected: false,
            rpc_timeout: Duration::from_millis(5000),
            acquired: None,
            gait: GaitMode::Passive,
            motion_behavior: MotionBehavior::Immediate,
            held: Vec::new(),
            failures: HashMap::new(),
            calls: Vec::new(),
            joystick: Vec::new(),
            state_handlers: HashMap::new(),
            sensors_initialized: false,
            open_devices: BTreeSet::new(),
            sensor_handlers: HashMap::new(),
        }
    }
}

impl MockState {
    fn check(&self, op: MockOp) -> Result<(), TransportError> {
        match self.failures.get(&op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn require_connected(&self) -> Result<(), TransportError> {
        if self.connected {
            Ok(())
        } else {
            Err(TransportError::Disconnected)
        }
    }

    fn require_level(&self, level: ControllerLevel) -> Result<(), TransportError> {
        self.require_connected()?;
        if self.acquired == Some(level) {
            Ok(())
        } else {
            Err(TransportError::rejected(
                -1,
                format!("{level} level controller not acquired"),
            ))
        }
    }
}

struct MockInner {
    state: Mutex<MockState>,
    published: Mutex<Vec<JointCommand>>,
    publish_count: AtomicU64,
    publish_delay_us: AtomicU64,
}

/// 模拟机器人链路
///
/// 克隆得到的是同一个模拟机器人的另一个句柄。
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<MockInner>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MockInner {
                state: Mutex::new(MockState::default()),
                published: Mutex::new(Vec::new()),
                publish_count: AtomicU64::new(0),
                publish_delay_us: AtomicU64::new(0),
            }),
        }
    }

    // ==================== 行为控制 ====================

    /// 为某个操作注入错误（持续生效，直到清除）
    pub fn inject_failure(&self, op: MockOp, error: TransportError) {
        self.inner.state.lock().failures.insert(op, error);
    }

    pub fn clear_failure(&self, op: MockOp) {
        self.inner.state.lock().failures.remove(&op);
    }

    pub fn clear_failures(&self) {
        self.inner.state.lock().failures.clear();
    }

    pub fn set_motion_behavior(&self, behavior: MotionBehavior) {
        self.inner.state.lock().motion_behavior = behavior;
    }

    /// 每次 `publish_arm_command` 的模拟耗时
    pub fn set_publish_delay(&self, delay: Duration) {
        self.inner
            .publish_delay_us
            .store(delay.as_micros() as u64, Ordering::Relaxed);
    }

    /// 直接设置机器人当前步态
    pub fn set_gait_state(&self, gait: GaitMode) {
        self.inner.state.lock().gait = gait;
    }

    /// 完成所有挂起的运动请求
    ///
    /// # 返回
    ///
    /// 完成的请求数量
    pub fn release_held(&self, result: Result<(), TransportError>) -> usize {
        let held = std::mem::take(&mut self.inner.state.lock().held);
        let count = held.len();
        for (request, reply) in held {
            if result.is_ok() {
                apply_motion(&self.inner, request);
            }
            reply.complete(result.clone());
        }
        count
    }

    // ==================== 数据注入 ====================

    /// 向已订阅的传感器通道投递一条样本
    ///
    /// # 返回
    ///
    /// 通道当前有回调时返回 `true`
    pub fn emit(&self, channel: SensorChannel, sample: &Sample) -> bool {
        let handler = self.inner.state.lock().sensor_handlers.get(&channel).cloned();
        match handler {
            Some(handler) => {
                handler.on_sample(sample);
                true
            },
            None => false,
        }
    }

    /// 向已注册的状态流投递一条样本
    pub fn emit_state(&self, stream: StateStream, sample: &Sample) -> bool {
        let handler = self.inner.state.lock().state_handlers.get(&stream).cloned();
        match handler {
            Some(handler) => {
                handler.on_sample(sample);
                true
            },
            None => false,
        }
    }

    /// 启动后台投递线程：每个周期向所有已订阅的通道和已注册的状态流各投递一条合成样本
    pub fn spawn_sensor_feed(&self, period: Duration) -> SensorFeed {
        let inner = self.inner.clone();
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = running.clone();

        let handle = thread::Builder::new()
            .name("mock-sensor-feed".into())
            .spawn(move || {
                let mut seq: u64 = 0;
                while running_clone.load(Ordering::Acquire) {
                    // 先复制回调列表再投递，投递期间不持锁
                    let (channels, streams): (Vec<_>, Vec<_>) = {
                        let state = inner.state.lock();
                        (
                            state
                                .sensor_handlers
                                .iter()
                                .map(|(ch, h)| (*ch, h.clone()))
                                .collect(),
                            state
                                .state_handlers
                                .iter()
                                .map(|(s, h)| (*s, h.clone()))
                                .collect(),
                        )
                    };
                    for (channel, handler) in channels {
                        handler.on_sample(&synthetic_sample(channel, seq));
                    }
                    for (stream, handler) in streams {
                        handler.on_sample(&synthetic_state(stream, seq));
                    }
                    seq += 1;
                    thread::sleep(period);
                }
                trace!("mock sensor feed exited after {} rounds", seq);
            })
            .ok();

        SensorFeed { running, handle }
    }

    // ==================== 观测 ====================

    pub fn calls(&self) -> Vec<MockCall> {
        self.inner.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.inner.state.lock().calls.clear();
    }

    /// 已写出的全部手臂指令（按写出顺序）
    pub fn published(&self) -> Vec<JointCommand> {
        self.inner.published.lock().clone()
    }

    pub fn publish_count(&self) -> u64 {
        self.inner.publish_count.load(Ordering::Acquire)
    }

    pub fn joystick_commands(&self) -> Vec<JoystickCommand> {
        self.inner.state.lock().joystick.clone()
    }

    pub fn endpoint(&self) -> Option<String> {
        self.inner.state.lock().endpoint.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state.lock().connected
    }

    pub fn acquired_level(&self) -> Option<ControllerLevel> {
        self.inner.state.lock().acquired
    }

    pub fn gait(&self) -> GaitMode {
        self.inner.state.lock().gait
    }

    pub fn rpc_timeout(&self) -> Duration {
        self.inner.state.lock().rpc_timeout
    }

    pub fn held_count(&self) -> usize {
        self.inner.state.lock().held.len()
    }

    pub fn open_devices(&self) -> Vec<SensorDevice> {
        self.inner.state.lock().open_devices.iter().copied().collect()
    }

    pub fn subscribed_channels(&self) -> Vec<SensorChannel> {
        let mut channels: Vec<_> = self.inner.state.lock().sensor_handlers.keys().copied().collect();
        channels.sort();
        channels
    }

    pub fn has_state_handler(&self, stream: StateStream) -> bool {
        self.inner.state.lock().state_handlers.contains_key(&stream)
    }
}

fn apply_motion(inner: &MockInner, request: MotionRequest) {
    if let MotionRequest::SetGait(mode) = request {
        inner.state.lock().gait = mode;
    }
}

/// 后台传感器投递线程句柄（Drop 时停止）
pub struct SensorFeed {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SensorFeed {
    pub fn stop(mut self) {
        self.stop_inner();
    }

    fn stop_inner(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SensorFeed {
    fn drop(&mut self) {
        self.stop_inner();
    }
}

/// 为通道生成一条形状合理的合成样本
pub fn synthetic_sample(channel: SensorChannel, seq: u64) -> Sample {
    let header = Header {
        stamp_ns: seq * 1_000_000,
        frame_id: channel.name().to_string(),
    };
    match channel.payload_kind() {
        PayloadKind::Imu => Sample::Imu(Imu {
            timestamp_ns: header.stamp_ns,
            orientation: [1.0, 0.0, 0.0, 0.0],
            linear_acceleration: [0.0, 0.0, 9.81],
            ..Default::default()
        }),
        PayloadKind::PointCloud => Sample::PointCloud(PointCloud2 {
            header,
            height: 1,
            width: 16,
            point_step: 16,
            row_step: 256,
            data: vec![0u8; 256].into(),
            is_dense: true,
            ..Default::default()
        }),
        PayloadKind::Image => Sample::Image(Image {
            header,
            height: 4,
            width: 8,
            encoding: "rgb8".into(),
            step: 24,
            data: vec![(seq % 256) as u8; 96].into(),
            ..Default::default()
        }),
        PayloadKind::CameraInfo => Sample::CameraInfo(CameraInfo {
            header,
            height: 480,
            width: 640,
            distortion_model: "plumb_bob".into(),
            d: vec![0.0; 5],
            ..Default::default()
        }),
        PayloadKind::Trinocular => Sample::Trinocular(TrinocularCameraFrame {
            header,
            vin_time: seq as i64,
            decode_time: seq as i64,
            left: vec![0u8; 32].into(),
            center: vec![0u8; 32].into(),
            right: vec![0u8; 32].into(),
        }),
    }
}

fn synthetic_state(stream: StateStream, seq: u64) -> Sample {
    match stream {
        StateStream::BodyImu => Sample::Imu(Imu {
            timestamp_ns: seq * 1_000_000,
            orientation: [1.0, 0.0, 0.0, 0.0],
            ..Default::default()
        }),
        StateStream::ArmState => Sample::ArmState(JointState {
            timestamp_ns: seq * 1_000_000,
            joints: vec![SingleJointState::default(); ARM_JOINT_NUM],
        }),
    }
}

impl Transport for MockTransport {
    fn initialize(&self, endpoint: &str) -> Result<(), TransportError> {
        let mut state = self.inner.state.lock();
        state.calls.push(MockCall::Initialize(endpoint.to_string()));
        state.check(MockOp::Initialize)?;
        state.endpoint = Some(endpoint.to_string());
        Ok(())
    }

    fn set_rpc_timeout(&self, timeout: Duration) {
        let mut state = self.inner.state.lock();
        state.calls.push(MockCall::SetRpcTimeout(timeout));
        state.rpc_timeout = timeout;
    }

    fn connect(&self) -> Result<(), TransportError> {
        let mut state = self.inner.state.lock();
        state.calls.push(MockCall::Connect);
        state.check(MockOp::Connect)?;
        if state.endpoint.is_none() {
            return Err(TransportError::NotInitialized);
        }
        state.connected = true;
        Ok(())
    }

    fn disconnect(&self) -> Result<(), TransportError> {
        let mut state = self.inner.state.lock();
        state.calls.push(MockCall::Disconnect);
        state.check(MockOp::Disconnect)?;
        state.connected = false;
        state.acquired = None;
        Ok(())
    }

    fn shutdown(&self) -> Result<(), TransportError> {
        let mut state = self.inner.state.lock();
        state.calls.push(MockCall::Shutdown);
        state.check(MockOp::Shutdown)?;
        state.connected = false;
        state.endpoint = None;
        state.state_handlers.clear();
        state.sensor_handlers.clear();
        Ok(())
    }

    fn acquire_controller(&self, level: ControllerLevel) -> Result<(), TransportError> {
        let mut state = self.inner.state.lock();
        state.calls.push(MockCall::Acquire(level));
        state.check(MockOp::Acquire(level))?;
        state.require_connected()?;
        if let Some(current) = state.acquired {
            if current != level {
                return Err(TransportError::rejected(
                    -2,
                    format!("{current} level controller still held"),
                ));
            }
        }
        state.acquired = Some(level);
        Ok(())
    }

    fn release_controller(&self, level: ControllerLevel) -> Result<(), TransportError> {
        let mut state = self.inner.state.lock();
        state.calls.push(MockCall::Release(level));
        state.check(MockOp::Release(level))?;
        if state.acquired == Some(level) {
            state.acquired = None;
        }
        Ok(())
    }

    fn submit_motion(&self, request: MotionRequest, reply: MotionReply) -> Result<(), TransportError> {
        let behavior = {
            let mut state = self.inner.state.lock();
            state.calls.push(MockCall::SubmitMotion(request));
            state.check(MockOp::SubmitMotion)?;
            state.require_level(ControllerLevel::High)?;
            state.motion_behavior.clone()
        };
        debug!("mock: motion request #{} {}", reply.id(), request);

        match behavior {
            MotionBehavior::Immediate => {
                apply_motion(&self.inner, request);
                reply.complete(Ok(()));
            },
            MotionBehavior::Delayed(delay) => {
                let inner = self.inner.clone();
                thread::spawn(move || {
                    thread::sleep(delay);
                    apply_motion(&inner, request);
                    reply.complete(Ok(()));
                });
            },
            MotionBehavior::Hold => {
                self.inner.state.lock().held.push((request, reply));
            },
            MotionBehavior::Fail(err) => reply.complete(Err(err)),
        }
        Ok(())
    }

    fn get_gait(&self) -> Result<GaitMode, TransportError> {
        let mut state = self.inner.state.lock();
        state.calls.push(MockCall::GetGait);
        state.check(MockOp::GetGait)?;
        state.require_level(ControllerLevel::High)?;
        Ok(state.gait)
    }

    fn send_joystick(&self, command: &JoystickCommand) -> Result<(), TransportError> {
        let mut state = self.inner.state.lock();
        state.calls.push(MockCall::Joystick(*command));
        state.check(MockOp::Joystick)?;
        state.require_level(ControllerLevel::High)?;
        state.joystick.push(*command);
        Ok(())
    }

    fn publish_arm_command(&self, command: &JointCommand) -> Result<(), TransportError> {
        {
            let state = self.inner.state.lock();
            state.check(MockOp::Publish)?;
            state.require_level(ControllerLevel::Low)?;
        }
        let delay_us = self.inner.publish_delay_us.load(Ordering::Relaxed);
        if delay_us > 0 {
            thread::sleep(Duration::from_micros(delay_us));
        }
        self.inner.published.lock().push(command.clone());
        self.inner.publish_count.fetch_add(1, Ordering::Release);
        Ok(())
    }

    fn register_state_handler(
        &self,
        stream: StateStream,
        handler: Arc<dyn SampleHandler>,
    ) -> Result<(), TransportError> {
        let mut state = self.inner.state.lock();
        state.calls.push(MockCall::RegisterState(stream));
        state.check(MockOp::RegisterState(stream))?;
        state.require_connected()?;
        state.state_handlers.insert(stream, handler);
        Ok(())
    }

    fn unregister_state_handler(&self, stream: StateStream) -> Result<(), TransportError> {
        let mut state = self.inner.state.lock();
        state.calls.push(MockCall::UnregisterState(stream));
        state.check(MockOp::UnregisterState(stream))?;
        state.state_handlers.remove(&stream);
        Ok(())
    }

    fn initialize_sensors(&self) -> Result<(), TransportError> {
        let mut state = self.inner.state.lock();
        state.calls.push(MockCall::InitializeSensors);
        state.check(MockOp::InitializeSensors)?;
        state.require_connected()?;
        state.sensors_initialized = true;
        Ok(())
    }

    fn shutdown_sensors(&self) -> Result<(), TransportError> {
        let mut state = self.inner.state.lock();
        state.calls.push(MockCall::ShutdownSensors);
        state.check(MockOp::ShutdownSensors)?;
        state.sensors_initialized = false;
        state.sensor_handlers.clear();
        state.open_devices.clear();
        Ok(())
    }

    fn open_device(&self, device: SensorDevice) -> Result<(), TransportError> {
        let mut state = self.inner.state.lock();
        state.calls.push(MockCall::OpenDevice(device));
        state.check(MockOp::OpenDevice(device))?;
        if !state.sensors_initialized {
            return Err(TransportError::NotInitialized);
        }
        state.open_devices.insert(device);
        Ok(())
    }

    fn close_device(&self, device: SensorDevice) -> Result<(), TransportError> {
        let mut state = self.inner.state.lock();
        state.calls.push(MockCall::CloseDevice(device));
        state.check(MockOp::CloseDevice(device))?;
        state.open_devices.remove(&device);
        Ok(())
    }

    fn subscribe(
        &self,
        channel: SensorChannel,
        handler: Arc<dyn SampleHandler>,
    ) -> Result<(), TransportError> {
        let mut state = self.inner.state.lock();
        state.calls.push(MockCall::Subscribe(channel));
        state.check(MockOp::Subscribe(channel))?;
        if !state.open_devices.contains(&channel.device()) {
            return Err(TransportError::rejected(
                -3,
                format!("{} is not open", channel.device()),
            ));
        }
        state.sensor_handlers.insert(channel, handler);
        Ok(())
    }

    fn unsubscribe(&self, channel: SensorChannel) -> Result<(), TransportError> {
        let mut state = self.inner.state.lock();
        state.calls.push(MockCall::Unsubscribe(channel));
        state.check(MockOp::Unsubscribe(channel))?;
        state.sensor_handlers.remove(&channel);
        Ok(())
    }
}
