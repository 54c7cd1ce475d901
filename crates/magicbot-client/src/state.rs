//! 会话生命周期状态
//!
//! ```text
//! Uninitialized → Initialized → Connected ⇄ Bound → Disconnected → Shutdown
//!                                   └──────┴──────→ Failed → Disconnected
//! ```
//!
//! 状态只向前推进，`Shutdown` 之后不能复用。

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum SessionState {
    #[default]
    Uninitialized = 0,
    Initialized = 1,
    Connected = 2,
    /// 已绑定某个控制层级
    Bound = 3,
    Disconnected = 4,
    Shutdown = 5,
    /// 链路出现致命错误，只能断开或关闭
    Failed = 6,
}

impl SessionState {
    /// 从 u8 转换
    ///
    /// 无效值视为 `Failed`。
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Uninitialized,
            1 => Self::Initialized,
            2 => Self::Connected,
            3 => Self::Bound,
            4 => Self::Disconnected,
            5 => Self::Shutdown,
            _ => Self::Failed,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// 链路是否可用（`Connected` 或 `Bound`）
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected | Self::Bound)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "Uninitialized",
            Self::Initialized => "Initialized",
            Self::Connected => "Connected",
            Self::Bound => "Bound",
            Self::Disconnected => "Disconnected",
            Self::Shutdown => "Shutdown",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 会话状态（原子版本，用于线程间共享）
///
/// - 调用方线程在持有转换锁时通过 `set()` 推进状态
/// - 周期发布线程遇到致命错误时通过 `compare_exchange()` 把 `Bound` 置为 `Failed`
#[derive(Debug, Default)]
pub struct AtomicSessionState {
    inner: AtomicU8,
}

impl AtomicSessionState {
    pub fn new(state: SessionState) -> Self {
        Self {
            inner: AtomicU8::new(state.as_u8()),
        }
    }

    pub fn get(&self, ordering: Ordering) -> SessionState {
        SessionState::from_u8(self.inner.load(ordering))
    }

    pub fn set(&self, state: SessionState, ordering: Ordering) {
        self.inner.store(state.as_u8(), ordering);
    }

    /// 比较并交换
    ///
    /// # 返回
    ///
    /// 当前值等于 `current` 时设置为 `new` 并返回 true
    pub fn compare_exchange(
        &self,
        current: SessionState,
        new: SessionState,
        success: Ordering,
        failure: Ordering,
    ) -> bool {
        self.inner
            .compare_exchange(current.as_u8(), new.as_u8(), success, failure)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_u8_roundtrip() {
        for state in [
            SessionState::Uninitialized,
            SessionState::Initialized,
            SessionState::Connected,
            SessionState::Bound,
            SessionState::Disconnected,
            SessionState::Shutdown,
            SessionState::Failed,
        ] {
            assert_eq!(SessionState::from_u8(state.as_u8()), state);
        }
        assert_eq!(SessionState::from_u8(200), SessionState::Failed);
    }

    #[test]
    fn test_is_connected() {
        assert!(SessionState::Connected.is_connected());
        assert!(SessionState::Bound.is_connected());
        assert!(!SessionState::Initialized.is_connected());
        assert!(!SessionState::Failed.is_connected());
    }

    #[test]
    fn test_atomic_compare_exchange() {
        let state = AtomicSessionState::new(SessionState::Bound);
        assert!(state.compare_exchange(
            SessionState::Bound,
            SessionState::Failed,
            Ordering::AcqRel,
            Ordering::Acquire
        ));
        // 已经不是 Bound，再次交换失败
        assert!(!state.compare_exchange(
            SessionState::Bound,
            SessionState::Failed,
            Ordering::AcqRel,
            Ordering::Acquire
        ));
        assert_eq!(state.get(Ordering::Acquire), SessionState::Failed);
    }
}
