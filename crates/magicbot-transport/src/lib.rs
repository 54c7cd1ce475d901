//! # MagicBot Transport
//!
//! 机器人通信链路的抽象层。
//!
//! 会话核心只通过 [`Transport`] Trait 与机器人交互，
//! 具体的网络实现（RPC、状态流、传感器数据投递）由 Trait 实现者提供。
//!
//! ## 模块
//!
//! - `error`: 传输层错误
//! - `sample`: 数据样本与 [`SampleHandler`] 回调
//! - `sink`: 基于 Channel 的 [`ChannelSink`]
//! - `motion`: 高层运动请求与完成通知句柄
//! - `mock`: 进程内模拟机器人（`mock` feature）

pub mod error;
pub mod motion;
pub mod sample;
pub mod sink;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use error::TransportError;
pub use motion::{MotionReply, MotionRequest};
pub use sample::{Sample, SampleHandler, StateStream};
pub use sink::{ChannelSink, DEFAULT_SINK_CAPACITY};

#[cfg(any(test, feature = "mock"))]
pub use mock::{MockCall, MockOp, MockTransport, MotionBehavior, SensorFeed, synthetic_sample};

use magicbot_protocol::{
    ControllerLevel, GaitMode, JointCommand, JoystickCommand, SensorChannel, SensorDevice,
};
use std::sync::Arc;
use std::time::Duration;

/// 机器人通信链路 Trait
///
/// 所有方法都可能被多个线程并发调用（调用方线程、周期发布线程），
/// 实现者负责内部同步。
///
/// # 回调投递
///
/// 通过 `register_state_handler` / `subscribe` 注册的回调在实现者自己的
/// 投递线程上调用。注销返回后，实现者**可以**仍有正在进行中的投递；
/// 会话核心在上层做了门控，保证注销返回后不再有样本到达调用方。
pub trait Transport: Send + Sync {
    // ==================== 会话 ====================

    /// 初始化本地链路（绑定本地地址）
    fn initialize(&self, endpoint: &str) -> Result<(), TransportError>;

    /// 设置 RPC 超时
    fn set_rpc_timeout(&self, timeout: Duration);

    fn connect(&self) -> Result<(), TransportError>;

    fn disconnect(&self) -> Result<(), TransportError>;

    /// 释放全部链路资源
    fn shutdown(&self) -> Result<(), TransportError>;

    // ==================== 控制层级 ====================

    fn acquire_controller(&self, level: ControllerLevel) -> Result<(), TransportError>;

    fn release_controller(&self, level: ControllerLevel) -> Result<(), TransportError>;

    // ==================== 高层控制 ====================

    /// 提交需要等待完成的运动请求
    ///
    /// 返回 `Ok` 只表示请求已被接收；完成结果通过 `reply` 异步通知。
    /// 返回 `Err` 时 `reply` 已被丢弃，调用方不应再等待。
    fn submit_motion(&self, request: MotionRequest, reply: MotionReply) -> Result<(), TransportError>;

    fn get_gait(&self) -> Result<GaitMode, TransportError>;

    /// 发送摇杆指令（无需等待完成）
    fn send_joystick(&self, command: &JoystickCommand) -> Result<(), TransportError>;

    // ==================== 底层控制 ====================

    /// 写出一帧手臂关节指令
    ///
    /// 由周期发布线程调用，实现必须是非阻塞的。
    fn publish_arm_command(&self, command: &JointCommand) -> Result<(), TransportError>;

    fn register_state_handler(
        &self,
        stream: StateStream,
        handler: Arc<dyn SampleHandler>,
    ) -> Result<(), TransportError>;

    fn unregister_state_handler(&self, stream: StateStream) -> Result<(), TransportError>;

    // ==================== 传感器 ====================

    fn initialize_sensors(&self) -> Result<(), TransportError>;

    fn shutdown_sensors(&self) -> Result<(), TransportError>;

    fn open_device(&self, device: SensorDevice) -> Result<(), TransportError>;

    fn close_device(&self, device: SensorDevice) -> Result<(), TransportError>;

    fn subscribe(
        &self,
        channel: SensorChannel,
        handler: Arc<dyn SampleHandler>,
    ) -> Result<(), TransportError>;

    fn unsubscribe(&self, channel: SensorChannel) -> Result<(), TransportError>;
}
