//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use magicbot_sdk::prelude::*;
//! ```

// 客户端层
pub use crate::client::{
    HighLevelMotionController, LowLevelMotionController, SensorController, Session,
    SessionBuilder, SessionConfig, SessionState, SubscriptionState,
};

// 领域类型
pub use crate::protocol::{
    ARM_JOINT_NUM, ControllerLevel, GaitMode, JointCommand, JoystickCommand, SensorChannel,
    SensorDevice, SingleJointCommand, Status, StatusCode, TrickAction,
};

// 传输层（常用 Trait）
pub use crate::transport::{ChannelSink, Sample, SampleHandler, StateStream, Transport};

#[cfg(feature = "mock")]
pub use crate::transport::MockTransport;

// 错误类型
pub use crate::client::RobotError;
pub use crate::transport::TransportError;
