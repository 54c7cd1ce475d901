//! # MagicBot Protocol
//!
//! MagicBot Gen1 会话核心使用的值类型定义（无网络依赖）
//!
//! ## 模块
//!
//! - `status`: 统一的状态码与 `Status` 载体
//! - `motion`: 控制层级、步态、特技动作、摇杆指令
//! - `joint`: 关节指令与关节状态
//! - `sensor`: 传感器设备/通道标识与数据负载
//!
//! 步态与特技动作的数值编码与机器人固件保持一致，
//! 但本 crate 只把它们当作不透明的枚举使用。

pub mod joint;
pub mod motion;
pub mod sensor;
pub mod status;

// 重新导出常用类型
pub use joint::*;
pub use motion::*;
pub use sensor::*;
pub use status::*;

use thiserror::Error;

/// 协议层错误类型
///
/// 仅用于符号名/数值编码解析失败的场景。
/// 特技动作解析永远不会失败（未知输入映射为 [`TrickAction::None`]）。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Unknown gait mode: {0}")]
    UnknownGait(String),

    #[error("Unknown controller level: {0}")]
    UnknownControllerLevel(String),

    #[error("Unknown sensor device: {0}")]
    UnknownDevice(String),

    #[error("Unknown sensor channel: {0}")]
    UnknownChannel(String),
}
