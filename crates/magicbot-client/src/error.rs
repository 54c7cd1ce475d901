//! 客户端错误类型
//!
//! 所有可失败操作返回 `Result<T, RobotError>`；
//! `RobotError::code()` 把错误映射到稳定的 [`StatusCode`]。
//! 幂等空操作（`AlreadyOpen` / `AlreadyClosed`）不是错误，以 `Ok(Status)` 返回。

use magicbot_protocol::{SensorChannel, SensorDevice, Status, StatusCode};
use magicbot_transport::TransportError;
use smallvec::SmallVec;
use std::fmt;
use thiserror::Error;

/// 客户端错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RobotError {
    /// 调用顺序不合法
    #[error("Invalid state for {operation}: {reason}")]
    InvalidState {
        operation: &'static str,
        reason: String,
    },

    /// 操作需要已连接的会话
    #[error("Not connected: {operation} requires an established connection")]
    NotConnected { operation: &'static str },

    /// 客户端侧等待超时
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    /// 链路错误
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// 级联关闭失败：设备级关闭失败，设备仍处于打开状态
    ///
    /// `failures` 记录了级联过程中失败的通道退订（通道均已在本地解除订阅）。
    #[error("Failed to close {device}: {source} ({} channel failure(s))", failures.len())]
    CascadeClose {
        device: SensorDevice,
        source: TransportError,
        failures: SubFailures,
    },

    /// 配置错误
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// 未分类错误（如内部线程启动失败）
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl RobotError {
    pub(crate) fn invalid_state(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidState {
            operation,
            reason: reason.into(),
        }
    }

    /// 映射到稳定状态码
    pub fn code(&self) -> StatusCode {
        match self {
            Self::InvalidState { .. } | Self::Config(_) => StatusCode::InvalidState,
            Self::NotConnected { .. } => StatusCode::NotConnected,
            Self::Timeout { .. } => StatusCode::Timeout,
            Self::Transport(TransportError::Timeout) => StatusCode::Timeout,
            Self::Transport(_) | Self::CascadeClose { .. } => StatusCode::TransportError,
            Self::Unknown(_) => StatusCode::Unknown,
        }
    }

    pub fn status(&self) -> Status {
        Status::new(self.code(), self.to_string())
    }

    /// 调用方是否可以在不改变会话状态的前提下重试
    ///
    /// 核心本身从不自动重试。
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Transport(TransportError::Timeout)
        ) || matches!(self, Self::Transport(e) if !e.is_fatal())
    }
}

impl From<RobotError> for Status {
    fn from(e: RobotError) -> Self {
        e.status()
    }
}

/// 客户端 Result 别名
pub type Result<T> = std::result::Result<T, RobotError>;

// ==================== 子操作失败报告 ====================

/// 子操作目标
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubTarget {
    Channel(SensorChannel),
    Device(SensorDevice),
    /// 控制器释放
    Controller,
    /// 底层发布线程
    PublishLoop,
    /// 传感器子系统
    Sensors,
    /// 链路
    Link,
}

impl fmt::Display for SubTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Channel(ch) => write!(f, "channel {ch}"),
            Self::Device(d) => write!(f, "device {d}"),
            Self::Controller => f.write_str("controller"),
            Self::PublishLoop => f.write_str("publish loop"),
            Self::Sensors => f.write_str("sensors"),
            Self::Link => f.write_str("link"),
        }
    }
}

/// 单个子操作的失败
#[derive(Debug, Clone, PartialEq)]
pub struct SubFailure {
    pub target: SubTarget,
    pub error: TransportError,
}

impl SubFailure {
    pub fn new(target: SubTarget, error: TransportError) -> Self {
        Self { target, error }
    }
}

impl fmt::Display for SubFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.target, self.error)
    }
}

pub type SubFailures = SmallVec<[SubFailure; 4]>;

/// 带子操作失败明细的操作结果
///
/// 用于级联关闭和断开连接：主操作成功，但部分次要步骤失败。
/// 失败不会被吞掉，而是逐条记录在 `failures` 中。
#[derive(Debug, Clone, PartialEq)]
pub struct OperationReport {
    pub status: Status,
    pub failures: SubFailures,
}

impl OperationReport {
    pub fn new(status: Status) -> Self {
        Self {
            status,
            failures: SubFailures::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(Status::ok())
    }

    /// 没有任何子操作失败
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn push(&mut self, failure: SubFailure) {
        self.failures.push(failure);
    }

    pub fn extend(&mut self, failures: impl IntoIterator<Item = SubFailure>) {
        self.failures.extend(failures);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            RobotError::invalid_state("connect", "not initialized").code(),
            StatusCode::InvalidState
        );
        assert_eq!(
            RobotError::NotConnected { operation: "open_lidar" }.code(),
            StatusCode::NotConnected
        );
        assert_eq!(
            RobotError::Timeout {
                operation: "set_gait",
                timeout_ms: 10
            }
            .code(),
            StatusCode::Timeout
        );
        assert_eq!(
            RobotError::Transport(TransportError::Timeout).code(),
            StatusCode::Timeout
        );
        assert_eq!(
            RobotError::Transport(TransportError::Disconnected).code(),
            StatusCode::TransportError
        );
        assert_eq!(RobotError::Unknown("x".into()).code(), StatusCode::Unknown);
    }

    #[test]
    fn test_cascade_close_display_counts_failures() {
        let mut failures = SubFailures::new();
        failures.push(SubFailure::new(
            SubTarget::Channel(SensorChannel::LidarImu),
            TransportError::Timeout,
        ));
        let err = RobotError::CascadeClose {
            device: SensorDevice::Lidar,
            source: TransportError::Device("stuck".into()),
            failures,
        };
        let msg = err.to_string();
        assert!(msg.contains("Lidar"), "{msg}");
        assert!(msg.contains("1 channel failure"), "{msg}");
        assert_eq!(err.code(), StatusCode::TransportError);
    }

    #[test]
    fn test_status_from_error() {
        let status = Status::from(RobotError::NotConnected { operation: "open" });
        assert_eq!(status.code(), StatusCode::NotConnected);
        assert!(status.message().contains("open"));

        let folded = Status::from_result(Err::<Status, _>(RobotError::Timeout {
            operation: "execute_trick",
            timeout_ms: 5,
        }));
        assert_eq!(folded.code(), StatusCode::Timeout);
    }

    #[test]
    fn test_retryable() {
        assert!(RobotError::Transport(TransportError::Timeout).is_retryable());
        assert!(RobotError::Transport(TransportError::rejected(1, "busy")).is_retryable());
        assert!(!RobotError::Transport(TransportError::Disconnected).is_retryable());
        assert!(!RobotError::invalid_state("x", "y").is_retryable());
    }

    #[test]
    fn test_report() {
        let mut report = OperationReport::ok();
        assert!(report.is_clean());
        report.push(SubFailure::new(SubTarget::Controller, TransportError::Timeout));
        assert!(!report.is_clean());
        assert_eq!(report.failures[0].to_string(), "controller: RPC timeout");
    }
}
