//! 传输层错误类型定义

use thiserror::Error;

/// 传输层错误
///
/// 实现 `Clone`，便于模拟传输层重复注入同一个错误。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// 底层 IO 错误
    #[error("IO error ({kind:?}): {message}")]
    Io {
        kind: std::io::ErrorKind,
        message: String,
    },

    /// RPC 在超时时间内没有响应
    #[error("RPC timeout")]
    Timeout,

    /// 链路已断开
    #[error("Transport disconnected")]
    Disconnected,

    /// 机器人拒绝了请求（携带固件返回的错误码）
    #[error("Request rejected by robot (code {code}): {message}")]
    Rejected { code: i32, message: String },

    /// 设备错误（如设备不存在、驱动异常）
    #[error("Device error: {0}")]
    Device(String),

    /// 传输层未初始化
    #[error("Transport not initialized")]
    NotInitialized,
}

impl TransportError {
    /// 是否为致命错误
    ///
    /// 致命错误意味着链路不可继续使用，周期发布循环遇到时会退出。
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Device(_) | Self::NotInitialized)
    }

    /// 便捷构造：拒绝
    pub fn rejected(code: i32, message: impl Into<String>) -> Self {
        Self::Rejected {
            code,
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => Self::Timeout,
            std::io::ErrorKind::NotConnected
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe => Self::Disconnected,
            kind => Self::Io {
                kind,
                message: e.to_string(),
            },
        }
    }
}
