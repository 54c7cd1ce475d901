//! 高层运动请求与完成通知

use crate::error::TransportError;
use magicbot_protocol::{GaitMode, TrickAction};
use std::fmt;

/// 需要等待完成通知的高层运动请求
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionRequest {
    SetGait(GaitMode),
    ExecuteTrick(TrickAction),
    /// 头部运动（弧度；正 shake 向右，正 nod 向上）
    HeadMove { shake: f64, nod: f64 },
}

impl fmt::Display for MotionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetGait(mode) => write!(f, "set_gait({mode})"),
            Self::ExecuteTrick(action) => write!(f, "execute_trick({action})"),
            Self::HeadMove { shake, nod } => write!(f, "head_move(shake={shake:.3}, nod={nod:.3})"),
        }
    }
}

type Completion = Box<dyn FnOnce(u64, Result<(), TransportError>) + Send>;

/// 完成通知句柄
///
/// 传输层在请求完成（成功或失败）时调用 [`MotionReply::complete`]，
/// 可以在任意线程、任意时刻调用，包括调用方已经超时返回之后。
/// 句柄被丢弃而未完成时，视为链路断开。
pub struct MotionReply {
    id: u64,
    completion: Option<Completion>,
}

impl MotionReply {
    pub fn new<F>(id: u64, completion: F) -> Self
    where
        F: FnOnce(u64, Result<(), TransportError>) + Send + 'static,
    {
        Self {
            id,
            completion: Some(Box::new(completion)),
        }
    }

    /// 请求 ID（会话内单调递增）
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn complete(mut self, result: Result<(), TransportError>) {
        if let Some(completion) = self.completion.take() {
            completion(self.id, result);
        }
    }
}

impl fmt::Debug for MotionReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MotionReply")
            .field("id", &self.id)
            .field("pending", &self.completion.is_some())
            .finish()
    }
}

impl Drop for MotionReply {
    fn drop(&mut self) {
        if let Some(completion) = self.completion.take() {
            completion(self.id, Err(TransportError::Disconnected));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn test_complete_invokes_callback_once() {
        let (tx, rx) = unbounded();
        let reply = MotionReply::new(7, move |id, result| {
            let _ = tx.send((id, result));
        });
        assert_eq!(reply.id(), 7);
        reply.complete(Ok(()));

        assert_eq!(rx.try_recv().unwrap(), (7, Ok(())));
        // complete 消耗句柄，Drop 不会再次回调
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_reply_reports_disconnected() {
        let (tx, rx) = unbounded();
        let reply = MotionReply::new(3, move |id, result| {
            let _ = tx.send((id, result));
        });
        drop(reply);
        assert_eq!(rx.try_recv().unwrap(), (3, Err(TransportError::Disconnected)));
    }

    #[test]
    fn test_request_display() {
        assert_eq!(
            MotionRequest::SetGait(GaitMode::BalanceStand).to_string(),
            "set_gait(GAIT_BALANCE_STAND)"
        );
        assert_eq!(
            MotionRequest::HeadMove { shake: 0.1, nod: -0.2 }.to_string(),
            "head_move(shake=0.100, nod=-0.200)"
        );
    }
}
