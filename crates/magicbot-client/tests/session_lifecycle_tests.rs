//! 会话生命周期与控制层级仲裁集成测试
//!
//! 全部使用 `MockTransport`，不需要真实机器人。

use magicbot_client::{RobotError, Session, SessionState, SubTarget};
use magicbot_protocol::{ControllerLevel, JoystickCommand, StatusCode};
use magicbot_transport::{MockCall, MockOp, MockTransport, TransportError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

fn connected() -> (Session, MockTransport) {
    let mock = MockTransport::new();
    let session = Session::new(mock.clone());
    session.initialize("10.0.0.2").unwrap();
    session.connect().unwrap();
    (session, mock)
}

#[test]
fn test_full_lifecycle() {
    let mock = MockTransport::new();
    let session = Session::new(mock.clone());
    assert_eq!(session.state(), SessionState::Uninitialized);

    session.initialize("10.0.0.2").unwrap();
    assert_eq!(session.state(), SessionState::Initialized);
    assert_eq!(mock.endpoint().as_deref(), Some("10.0.0.2"));

    session.connect().unwrap();
    assert_eq!(session.state(), SessionState::Connected);

    session.set_motion_control_level(ControllerLevel::High).unwrap();
    assert_eq!(session.state(), SessionState::Bound);

    let report = session.disconnect().unwrap();
    assert!(report.is_clean());
    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(mock.acquired_level(), None);

    session.shutdown().unwrap();
    assert_eq!(session.state(), SessionState::Shutdown);
}

#[test]
fn test_operations_out_of_order() {
    let session = Session::new(MockTransport::new());

    assert_eq!(session.connect().unwrap_err().code(), StatusCode::InvalidState);
    assert_eq!(
        session.disconnect().unwrap_err().code(),
        StatusCode::InvalidState
    );
    assert_eq!(
        session.sensor_controller().unwrap_err().code(),
        StatusCode::InvalidState
    );

    session.initialize("10.0.0.2").unwrap();
    assert_eq!(
        session
            .set_motion_control_level(ControllerLevel::Low)
            .unwrap_err()
            .code(),
        StatusCode::NotConnected
    );
    assert_eq!(
        session.sensor_controller().unwrap_err().code(),
        StatusCode::NotConnected
    );
}

#[test]
fn test_everything_after_shutdown_is_invalid_state() {
    let (session, _mock) = connected();
    session.shutdown().unwrap();

    let errors = [
        session.initialize("10.0.0.2").unwrap_err(),
        session.connect().unwrap_err(),
        session.set_timeout(10).unwrap_err(),
        session
            .set_motion_control_level(ControllerLevel::High)
            .unwrap_err(),
        session.get_high_level_motion_controller().unwrap_err(),
        session.get_low_level_motion_controller().unwrap_err(),
        session.sensor_controller().unwrap_err(),
        session.disconnect().unwrap_err(),
    ];
    for err in errors {
        assert_eq!(err.code(), StatusCode::InvalidState, "{err}");
    }
}

#[test]
fn test_at_most_one_level_bound() {
    let (session, mock) = connected();

    for level in [
        ControllerLevel::Low,
        ControllerLevel::High,
        ControllerLevel::Low,
    ] {
        session.set_motion_control_level(level).unwrap();
        assert_eq!(mock.acquired_level(), Some(level));

        let high = session.get_high_level_motion_controller();
        let low = session.get_low_level_motion_controller();
        assert!(high.is_ok() != low.is_ok());
        match level {
            ControllerLevel::High => assert!(high.is_ok()),
            ControllerLevel::Low => assert!(low.is_ok()),
        }
    }

    // 每次切换都先释放再获取
    let calls: Vec<_> = mock
        .calls()
        .into_iter()
        .filter(|c| matches!(c, MockCall::Acquire(_) | MockCall::Release(_)))
        .collect();
    assert_eq!(
        calls,
        vec![
            MockCall::Acquire(ControllerLevel::Low),
            MockCall::Release(ControllerLevel::Low),
            MockCall::Acquire(ControllerLevel::High),
            MockCall::Release(ControllerLevel::High),
            MockCall::Acquire(ControllerLevel::Low),
        ]
    );
}

#[test]
fn test_stale_handles_are_rejected() {
    let (session, _mock) = connected();
    session.set_motion_control_level(ControllerLevel::Low).unwrap();
    let first_low = session.get_low_level_motion_controller().unwrap();

    session.set_motion_control_level(ControllerLevel::High).unwrap();
    session.set_motion_control_level(ControllerLevel::Low).unwrap();

    // 同一层级的新绑定也会使旧句柄失效
    let err = first_low.set_period_ms(4).unwrap_err();
    assert_eq!(err.code(), StatusCode::InvalidState);

    let second_low = session.get_low_level_motion_controller().unwrap();
    second_low.set_period_ms(4).unwrap();
    assert_eq!(second_low.period_ms(), 4);
}

#[test]
fn test_concurrent_commands_during_switch_never_race() {
    let (session, mock) = connected();
    session.set_motion_control_level(ControllerLevel::High).unwrap();
    let controller = session.get_high_level_motion_controller().unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let transport_errors = Arc::new(AtomicU64::new(0));
    let invalid_state = Arc::new(AtomicU64::new(0));

    let worker = {
        let stop = stop.clone();
        let transport_errors = transport_errors.clone();
        let invalid_state = invalid_state.clone();
        thread::spawn(move || {
            while !stop.load(Ordering::Acquire) {
                match controller.send_joystick_command(JoystickCommand::new(0.1, 0.0, 0.0, 0.0)) {
                    Ok(_) => {},
                    Err(RobotError::InvalidState { .. }) => {
                        invalid_state.fetch_add(1, Ordering::Relaxed);
                    },
                    Err(_) => {
                        transport_errors.fetch_add(1, Ordering::Relaxed);
                    },
                }
            }
        })
    };

    thread::sleep(Duration::from_millis(10));
    session.set_motion_control_level(ControllerLevel::Low).unwrap();
    thread::sleep(Duration::from_millis(10));
    stop.store(true, Ordering::Release);
    worker.join().unwrap();

    // 切换后旧句柄只会看到 InvalidState，不会把摇杆指令打到底层控制上
    assert_eq!(transport_errors.load(Ordering::Relaxed), 0);
    assert!(invalid_state.load(Ordering::Relaxed) > 0);
    assert!(!mock.joystick_commands().is_empty());
}

#[test]
fn test_disconnect_collects_secondary_failures() {
    let (session, mock) = connected();
    session.set_motion_control_level(ControllerLevel::High).unwrap();
    let sensors = session.sensor_controller().unwrap();
    sensors.open_lidar().unwrap();

    mock.inject_failure(
        MockOp::CloseDevice(magicbot_protocol::SensorDevice::Lidar),
        TransportError::Device("lidar busy".into()),
    );
    mock.inject_failure(
        MockOp::Release(ControllerLevel::High),
        TransportError::Timeout,
    );

    let report = session.disconnect().unwrap();
    assert_eq!(session.state(), SessionState::Disconnected);
    let targets: Vec<_> = report.failures.iter().map(|f| f.target).collect();
    assert_eq!(
        targets,
        vec![
            SubTarget::Device(magicbot_protocol::SensorDevice::Lidar),
            SubTarget::Controller,
        ]
    );
}

#[test]
fn test_transport_disconnect_failure_is_terminal() {
    let (session, mock) = connected();
    mock.inject_failure(MockOp::Disconnect, TransportError::Disconnected);
    let err = session.disconnect().unwrap_err();
    assert!(matches!(
        err,
        RobotError::Transport(TransportError::Disconnected)
    ));
    assert_eq!(session.state(), SessionState::Failed);

    // Failed 状态下可以再次断开
    mock.clear_failures();
    session.disconnect().unwrap();
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[test]
fn test_shutdown_from_bound_releases_everything() {
    let (session, mock) = connected();
    session.set_motion_control_level(ControllerLevel::Low).unwrap();
    let low = session.get_low_level_motion_controller().unwrap();
    assert!(low.is_running());

    session.shutdown().unwrap();
    assert!(!low.is_running());
    assert_eq!(mock.acquired_level(), None);
    assert!(!mock.is_connected());
    assert!(mock.calls().contains(&MockCall::Shutdown));
}

#[test]
fn test_config_from_toml() {
    let config = magicbot_client::SessionConfig::from_toml_str(
        r#"
        endpoint = "192.168.54.111"
        rpc_timeout_ms = 800
        "#,
    )
    .unwrap();
    let mock = MockTransport::new();
    let session = Session::builder()
        .transport(mock.clone())
        .config(config)
        .build()
        .unwrap();
    session.initialize_from_config().unwrap();
    assert_eq!(mock.rpc_timeout(), Duration::from_millis(800));
    assert_eq!(mock.endpoint().as_deref(), Some("192.168.54.111"));
}
