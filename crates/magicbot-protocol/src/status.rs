//! 状态码与状态载体
//!
//! 所有可失败操作的结果最终都可以折叠为一个 [`Status`]。
//! `Status` 构造后不可变。

use std::fmt;

/// 操作状态码（稳定契约）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, num_enum::IntoPrimitive, num_enum::TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum StatusCode {
    /// 成功
    Ok = 0,
    /// 在超时时间内未收到响应
    Timeout = 1,
    /// 会话未连接
    NotConnected = 2,
    /// 调用顺序不合法（生命周期错误）
    InvalidState = 3,
    /// 设备已打开（信息性成功）
    AlreadyOpen = 4,
    /// 设备已关闭（信息性成功）
    AlreadyClosed = 5,
    /// 底层链路错误
    TransportError = 6,
    /// 未分类错误
    Unknown = 7,
}

impl StatusCode {
    /// 是否表示成功
    ///
    /// `AlreadyOpen` / `AlreadyClosed` 是幂等的空操作，按成功处理。
    pub fn is_success(self) -> bool {
        matches!(self, Self::Ok | Self::AlreadyOpen | Self::AlreadyClosed)
    }

    /// 状态码的稳定字符串表示
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Timeout => "TIMEOUT",
            Self::NotConnected => "NOT_CONNECTED",
            Self::InvalidState => "INVALID_STATE",
            Self::AlreadyOpen => "ALREADY_OPEN",
            Self::AlreadyClosed => "ALREADY_CLOSED",
            Self::TransportError => "TRANSPORT_ERROR",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 操作状态：状态码 + 自由文本消息
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Status {
    code: StatusCode,
    message: String,
}

impl Status {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// 成功，无附加消息
    pub fn ok() -> Self {
        Self::new(StatusCode::Ok, "")
    }

    /// 成功，附带说明
    pub fn ok_with(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Ok, message)
    }

    pub fn already_open(message: impl Into<String>) -> Self {
        Self::new(StatusCode::AlreadyOpen, message)
    }

    pub fn already_closed(message: impl Into<String>) -> Self {
        Self::new(StatusCode::AlreadyClosed, message)
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }

    /// 将任意结果折叠为单一 `Status`
    ///
    /// 成功分支原样返回；失败分支通过 `From<E>` 转换。
    ///
    /// # 示例
    ///
    /// ```rust
    /// use magicbot_protocol::{Status, StatusCode};
    ///
    /// let ok: Result<Status, Status> = Ok(Status::ok());
    /// assert_eq!(Status::from_result(ok).code(), StatusCode::Ok);
    ///
    /// let failed: Result<Status, Status> = Err(Status::new(StatusCode::Timeout, "gait"));
    /// assert_eq!(Status::from_result(failed).code(), StatusCode::Timeout);
    /// ```
    pub fn from_result<E>(result: Result<Status, E>) -> Status
    where
        Status: From<E>,
    {
        match result {
            Ok(status) => status,
            Err(e) => Status::from(e),
        }
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::ok()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_success_classes() {
        assert!(StatusCode::Ok.is_success());
        assert!(StatusCode::AlreadyOpen.is_success());
        assert!(StatusCode::AlreadyClosed.is_success());

        assert!(!StatusCode::Timeout.is_success());
        assert!(!StatusCode::NotConnected.is_success());
        assert!(!StatusCode::InvalidState.is_success());
        assert!(!StatusCode::TransportError.is_success());
        assert!(!StatusCode::Unknown.is_success());
    }

    #[test]
    fn test_status_code_numeric_roundtrip() {
        let raw: u8 = StatusCode::TransportError.into();
        assert_eq!(raw, 6);
        assert_eq!(StatusCode::try_from(4u8).unwrap(), StatusCode::AlreadyOpen);
        assert!(StatusCode::try_from(42u8).is_err());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(Status::ok().to_string(), "OK");
        let status = Status::new(StatusCode::InvalidState, "connect() requires Initialized");
        assert_eq!(status.to_string(), "INVALID_STATE: connect() requires Initialized");
    }

    #[test]
    fn test_status_accessors() {
        let status = Status::already_open("lidar");
        assert_eq!(status.code(), StatusCode::AlreadyOpen);
        assert_eq!(status.message(), "lidar");
        assert!(status.is_success());
        assert_eq!(Status::default(), Status::ok());
    }
}
