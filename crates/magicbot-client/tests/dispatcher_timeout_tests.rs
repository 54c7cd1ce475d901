//! 高层运动请求：完成、超时与迟到通知

use magicbot_client::{HighLevelMotionController, RobotError, Session, SessionConfig};
use magicbot_protocol::{
    ControllerLevel, GaitMode, JoystickCommand, StatusCode, TrickAction,
};
use magicbot_transport::{MockCall, MockTransport, MotionBehavior, MotionRequest, TransportError};
use std::str::FromStr;
use std::time::{Duration, Instant};

fn bound_high(config: SessionConfig) -> (Session, HighLevelMotionController, MockTransport) {
    let mock = MockTransport::new();
    let session = Session::builder()
        .transport(mock.clone())
        .config(config)
        .build()
        .unwrap();
    session.initialize("10.0.0.2").unwrap();
    session.connect().unwrap();
    session.set_motion_control_level(ControllerLevel::High).unwrap();
    let controller = session.get_high_level_motion_controller().unwrap();
    (session, controller, mock)
}

#[test]
fn test_set_gait_then_get_gait() {
    let (_session, controller, mock) = bound_high(SessionConfig::default());
    mock.set_motion_behavior(MotionBehavior::Delayed(Duration::from_millis(20)));

    let status = controller
        .set_gait(GaitMode::RecoveryStand, Some(Duration::from_secs(10)))
        .unwrap();
    assert_eq!(status.code(), StatusCode::Ok);
    assert_eq!(controller.get_gait().unwrap(), GaitMode::RecoveryStand);
}

#[test]
fn test_timeout_then_late_completion_does_not_change_result() {
    let (session, controller, mock) = bound_high(SessionConfig::default());
    mock.set_motion_behavior(MotionBehavior::Hold);

    let start = Instant::now();
    let err = controller
        .set_gait(GaitMode::BalanceStand, Some(Duration::from_millis(50)))
        .unwrap_err();
    assert!(start.elapsed() >= Duration::from_millis(50));
    assert_eq!(err.code(), StatusCode::Timeout);
    assert_eq!(controller.pending_requests(), 0);

    // 模拟机器人在超时后才完成
    assert_eq!(mock.release_held(Ok(())), 1);

    let metrics = session.metrics();
    assert_eq!(metrics.motion_timeouts, 1);
    assert_eq!(metrics.late_completions, 1);
    // 错误已经返回给调用方，不会被改写；会话仍然可用
    assert_eq!(err.code(), StatusCode::Timeout);
    mock.set_motion_behavior(MotionBehavior::Immediate);
    controller
        .execute_trick(TrickAction::Celebrate, Some(Duration::from_secs(1)))
        .unwrap();
}

#[test]
fn test_default_timeout_from_config() {
    let (_session, controller, mock) = bound_high(SessionConfig {
        motion_timeout_ms: 30,
        ..Default::default()
    });
    mock.set_motion_behavior(MotionBehavior::Hold);
    let err = controller
        .execute_trick(TrickAction::Greeting, None)
        .unwrap_err();
    assert!(matches!(err, RobotError::Timeout { timeout_ms: 30, .. }));
}

#[test]
fn test_rejected_completion() {
    let (_session, controller, mock) = bound_high(SessionConfig::default());
    mock.set_motion_behavior(MotionBehavior::Fail(TransportError::rejected(
        12,
        "robot is lying down",
    )));
    let err = controller
        .set_gait(GaitMode::ArmSwingWalk, Some(Duration::from_secs(1)))
        .unwrap_err();
    assert_eq!(err.code(), StatusCode::TransportError);
    assert!(err.to_string().contains("robot is lying down"));
}

#[test]
fn test_unknown_action_is_no_op() {
    let (_session, controller, mock) = bound_high(SessionConfig::default());
    let action = TrickAction::from_str("ACTION_DOES_NOT_EXIST").unwrap();
    assert_eq!(action, TrickAction::None);
    assert_eq!(TrickAction::from_code(99_999), TrickAction::None);

    mock.clear_calls();
    let status = controller.execute_trick(action, None).unwrap();
    assert_eq!(status.code(), StatusCode::Ok);
    assert!(mock.calls().is_empty());
}

#[test]
fn test_head_move_is_clamped() {
    let (_session, controller, mock) = bound_high(SessionConfig::default());
    controller
        .head_move(1.2, -0.1, Some(Duration::from_secs(1)))
        .unwrap();
    let submitted: Vec<_> = mock
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            MockCall::SubmitMotion(MotionRequest::HeadMove { shake, nod }) => Some((shake, nod)),
            _ => None,
        })
        .collect();
    assert_eq!(submitted, vec![(0.5, -0.1)]);
}

#[test]
fn test_joystick_is_clamped_and_fire_and_forget() {
    let (_session, controller, mock) = bound_high(SessionConfig::default());
    mock.set_motion_behavior(MotionBehavior::Hold);
    controller
        .send_joystick_command(JoystickCommand::new(2.0, -3.0, 0.5, f64::NAN))
        .unwrap();
    assert_eq!(
        mock.joystick_commands(),
        vec![JoystickCommand::new(1.0, -1.0, 0.5, 0.0)]
    );
    assert_eq!(mock.held_count(), 0);
}

#[test]
fn test_level_switch_cancels_waiting_request() {
    let (session, controller, mock) = bound_high(SessionConfig::default());
    mock.set_motion_behavior(MotionBehavior::Hold);

    let waiter = {
        let controller = controller.clone();
        std::thread::spawn(move || {
            controller.set_gait(GaitMode::PureDamper, Some(Duration::from_secs(5)))
        })
    };
    let start = Instant::now();
    while controller.pending_requests() == 0 {
        assert!(start.elapsed() < Duration::from_secs(1));
        std::thread::sleep(Duration::from_millis(1));
    }

    session.set_motion_control_level(ControllerLevel::Low).unwrap();
    let err = waiter.join().unwrap().unwrap_err();
    assert_eq!(err.code(), StatusCode::InvalidState);
    assert!(start.elapsed() < Duration::from_secs(2));

    // 迟到的完成通知被丢弃
    assert_eq!(mock.release_held(Ok(())), 1);
    assert_eq!(session.metrics().late_completions, 1);
}

#[test]
fn test_controller_shutdown_rejects_further_requests() {
    let (_session, controller, _mock) = bound_high(SessionConfig::default());
    controller.shutdown().unwrap();
    assert!(!controller.is_initialized());
    assert_eq!(
        controller.get_gait().unwrap_err().code(),
        StatusCode::InvalidState
    );
    controller.initialize().unwrap();
    controller.get_gait().unwrap();
}
