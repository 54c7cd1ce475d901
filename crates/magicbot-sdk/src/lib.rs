//! MagicBot SDK - MagicBot Gen1 人形机器人 Rust SDK
//!
//! # 架构设计
//!
//! 本 SDK 采用分层架构，从底层到高层：
//!
//! - **协议层** (`protocol`): 步态、动作、关节指令、传感器数据等领域类型
//! - **传输层** (`transport`): 机器人链路抽象（[`Transport`] Trait）与模拟实现
//! - **客户端层** (`client`): 会话生命周期、控制层级仲裁、周期发布、传感器订阅
//!
//! # 快速开始
//!
//! ```rust
//! use magicbot_sdk::prelude::*;
//! # #[cfg(feature = "mock")]
//! # fn main() -> magicbot_sdk::Result<()> {
//! let session = Session::new(MockTransport::new());
//! session.initialize("10.0.0.2")?;
//! session.connect()?;
//! session.set_motion_control_level(ControllerLevel::High)?;
//!
//! let controller = session.get_high_level_motion_controller()?;
//! controller.set_gait(GaitMode::RecoveryStand, None)?;
//! session.shutdown()?;
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "mock"))]
//! # fn main() {}
//! ```

pub use magicbot_client as client;
pub use magicbot_protocol as protocol;
pub use magicbot_transport as transport;

pub mod logging;
pub mod prelude;

// --- 用户以此为界 ---

// 客户端层（推荐入口）
pub use client::{
    HighLevelMotionController, LowLevelMotionController, MetricsSnapshot, OperationReport,
    Result, RobotError, SensorController, SensorStatus, Session, SessionBuilder, SessionConfig,
    SessionState, SubscriptionState,
};

// 传输层
pub use transport::{ChannelSink, Sample, SampleHandler, Transport, TransportError};

// 协议层错误
pub use protocol::{ProtocolError, Status, StatusCode};

pub use logging::{LoggingError, init_logging};
