//! 传感器订阅不变量的属性测试
//!
//! 对任意 open / close / toggle 序列（可以夹带链路故障）验证：
//!
//! - 任何时刻：通道已订阅 ⇒ 所属设备已打开
//! - 每次 close 之后：该设备的所有通道都未订阅（无论设备级关闭是否成功）
//! - toggle 连续调用两次恢复原状态

use magicbot_client::{RobotError, SensorController, Session, SubscriptionState};
use magicbot_protocol::{SensorChannel, SensorDevice, StatusCode};
use magicbot_transport::{ChannelSink, MockOp, MockTransport, Sample, SampleHandler, TransportError};
use proptest::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
enum Op {
    Open(SensorDevice),
    Close(SensorDevice),
    Toggle(SensorChannel),
    /// 下一次该设备的设备级关闭失败
    FailClose(SensorDevice),
    /// 下一次该通道的退订失败
    FailUnsubscribe(SensorChannel),
    ClearFailures,
}

fn device() -> impl Strategy<Value = SensorDevice> {
    prop::sample::select(SensorDevice::ALL.to_vec())
}

fn channel() -> impl Strategy<Value = SensorChannel> {
    prop::sample::select(SensorChannel::ALL.to_vec())
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => device().prop_map(Op::Open),
        3 => device().prop_map(Op::Close),
        6 => channel().prop_map(Op::Toggle),
        1 => device().prop_map(Op::FailClose),
        1 => channel().prop_map(Op::FailUnsubscribe),
        1 => Just(Op::ClearFailures),
    ]
}

fn setup() -> (Session, SensorController, MockTransport) {
    let mock = MockTransport::new();
    let session = Session::new(mock.clone());
    session.initialize("127.0.0.1").unwrap();
    session.connect().unwrap();
    let sensors = session.sensor_controller().unwrap();
    (session, sensors, mock)
}

fn noop() -> Arc<dyn SampleHandler> {
    Arc::new(|_: &Sample| {})
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn subscription_invariants_hold(ops in prop::collection::vec(op(), 1..60)) {
        let (_session, sensors, mock) = setup();

        for op in ops {
            match op {
                Op::Open(d) => {
                    let _ = sensors.open(d);
                },
                Op::Close(d) => {
                    let was_open = sensors.is_open(d);
                    match sensors.close(d) {
                        Ok(_) => prop_assert!(!sensors.is_open(d)),
                        Err(RobotError::CascadeClose { device, .. }) => {
                            prop_assert_eq!(device, d);
                            prop_assert!(was_open);
                            prop_assert!(sensors.is_open(d));
                        },
                        Err(e) => prop_assert!(false, "unexpected close error: {}", e),
                    }
                    for &ch in d.channels() {
                        prop_assert!(!sensors.is_subscribed(ch));
                    }
                },
                Op::Toggle(ch) => {
                    let before = sensors.is_subscribed(ch);
                    match sensors.toggle(ch, noop()) {
                        Ok(state) => prop_assert_eq!(state.is_subscribed(), !before),
                        Err(e) if !sensors.is_open(ch.device()) => {
                            prop_assert_eq!(e.code(), StatusCode::InvalidState);
                        },
                        // 退订失败：本地仍然视为已退订
                        Err(_) => prop_assert!(!sensors.is_subscribed(ch)),
                    }
                },
                Op::FailClose(d) => mock.inject_failure(
                    MockOp::CloseDevice(d),
                    TransportError::Device("injected".into()),
                ),
                Op::FailUnsubscribe(ch) => {
                    mock.inject_failure(MockOp::Unsubscribe(ch), TransportError::Timeout)
                },
                Op::ClearFailures => mock.clear_failures(),
            }

            let status = sensors.show_status().unwrap();
            prop_assert!(status.is_consistent(), "{}", status);
        }
    }

    #[test]
    fn toggle_is_its_own_inverse(
        open in prop::collection::vec(device(), 0..4),
        ch in channel(),
    ) {
        let (_session, sensors, _mock) = setup();
        for d in open {
            sensors.open(d).unwrap();
        }
        let before = sensors.is_subscribed(ch);

        let first = sensors.toggle(ch, noop());
        let second = sensors.toggle(ch, noop());
        if sensors.is_open(ch.device()) {
            prop_assert_eq!(first.unwrap(), SubscriptionState::Subscribed);
            prop_assert_eq!(second.unwrap(), SubscriptionState::Unsubscribed);
        } else {
            prop_assert!(first.is_err());
            prop_assert!(second.is_err());
        }
        prop_assert_eq!(sensors.is_subscribed(ch), before);
    }
}

#[test]
fn test_no_samples_after_close_returns() {
    let (_session, sensors, mock) = setup();
    sensors.open_head_rgbd_camera().unwrap();

    let (sink, rx) = ChannelSink::new(4096);
    let accepted_samples = sink.accepted_samples().clone();
    assert_eq!(
        sensors
            .toggle_head_rgbd_color_image_subscription(sink)
            .unwrap(),
        SubscriptionState::Subscribed
    );

    let feed = mock.spawn_sensor_feed(Duration::from_millis(1));
    let first = rx.recv_timeout(Duration::from_secs(1)).expect("no sample delivered");
    match first {
        Sample::Image(image) => {
            assert!(image.width > 0 && image.height > 0);
            assert_eq!(image.byte_len(), image.data.len());
        },
        other => panic!("unexpected sample {other:?}"),
    }

    sensors.close_head_rgbd_camera().unwrap();
    let accepted = accepted_samples.load(Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(accepted_samples.load(Ordering::SeqCst), accepted);
    feed.stop();
}

#[test]
fn test_sample_counter_resets_on_resubscribe() {
    let (_session, sensors, mock) = setup();
    sensors.open_lidar().unwrap();
    let hits = Arc::new(AtomicU64::new(0));
    let hits_clone = hits.clone();
    sensors
        .toggle_lidar_point_cloud_subscription(move |_: &Sample| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    for seq in 0..5 {
        mock.emit(
            SensorChannel::LidarPointCloud,
            &magicbot_transport::synthetic_sample(SensorChannel::LidarPointCloud, seq),
        );
    }
    assert_eq!(sensors.sample_count(SensorChannel::LidarPointCloud), 5);

    sensors
        .toggle_lidar_point_cloud_subscription(|_: &Sample| {})
        .unwrap();
    sensors
        .toggle_lidar_point_cloud_subscription(|_: &Sample| {})
        .unwrap();
    assert_eq!(sensors.sample_count(SensorChannel::LidarPointCloud), 0);
    assert_eq!(hits.load(Ordering::SeqCst), 5);
}

#[test]
fn test_handlers_run_on_delivery_thread() {
    let (_session, sensors, mock) = setup();
    sensors.open_trinocular_camera().unwrap();
    let caller = std::thread::current().id();
    let (tx, rx) = crossbeam_channel::unbounded();
    sensors
        .toggle_trinocular_image_subscription(move |_: &Sample| {
            let _ = tx.send(std::thread::current().id());
        })
        .unwrap();

    let feed = mock.spawn_sensor_feed(Duration::from_millis(1));
    let delivered_on = rx
        .recv_timeout(Duration::from_secs(1))
        .expect("no trinocular sample delivered");
    assert_ne!(delivered_on, caller);
    feed.stop();
}
