//! # MagicBot Client
//!
//! MagicBot Gen1 的会话与流控制核心：
//!
//! - [`Session`]: 连接生命周期（初始化 → 连接 → 绑定 → 断开 → 关闭）
//! - 控制层级仲裁：同一时刻只绑定高层或底层控制之一，切换时旧句柄失效
//! - [`LowLevelMotionController`]: 固定周期发布手臂关节指令（后写覆盖，不排队）
//! - [`SensorController`]: 传感器设备打开/关闭与通道订阅
//! - [`HighLevelMotionController`]: 步态 / 特技动作 / 头部运动，带超时等待完成
//!
//! 所有与机器人的交互都经过 [`magicbot_transport::Transport`]。
//!
//! # 线程模型
//!
//! - 调用方线程：会话、控制器的所有方法
//! - 发布线程：绑定底层控制期间按周期写出最新指令快照
//! - 传输层投递线程：调用传感器与状态流回调
//!
//! # 快速开始
//!
//! ```rust
//! use magicbot_client::Session;
//! use magicbot_protocol::{ControllerLevel, GaitMode};
//! use magicbot_transport::MockTransport;
//!
//! # fn main() -> magicbot_client::Result<()> {
//! let session = Session::new(MockTransport::new());
//! session.initialize("10.0.0.2")?;
//! session.connect()?;
//! session.set_motion_control_level(ControllerLevel::High)?;
//!
//! let controller = session.get_high_level_motion_controller()?;
//! controller.set_gait(GaitMode::RecoveryStand, None)?;
//! assert_eq!(controller.get_gait()?, GaitMode::RecoveryStand);
//!
//! session.disconnect()?;
//! session.shutdown()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
mod gate;
pub mod high_level;
pub mod low_level;
pub mod metrics;
pub mod sensor;
pub mod session;
pub mod state;

pub use config::{
    DEFAULT_MOTION_TIMEOUT_MS, DEFAULT_PUBLISH_PERIOD_MS, DEFAULT_RPC_TIMEOUT_MS, HeadLimits,
    SessionConfig,
};
pub use error::{OperationReport, Result, RobotError, SubFailure, SubFailures, SubTarget};
pub use high_level::HighLevelMotionController;
pub use low_level::LowLevelMotionController;
pub use metrics::{MetricsSnapshot, SessionMetrics};
pub use sensor::{ChannelStatus, DeviceStatus, SensorController, SensorStatus, SubscriptionState};
pub use session::{Session, SessionBuilder};
pub use state::{AtomicSessionState, SessionState};
