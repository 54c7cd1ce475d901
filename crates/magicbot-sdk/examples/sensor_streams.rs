//! 传感器流订阅演示
//!
//! 这个示例展示了传感器控制器的使用方式：
//! 1. 初始化并连接会话（传感器不需要绑定运动控制层级）
//! 2. 打开激光雷达和头部 RGBD 相机
//! 3. 订阅 IMU（闭包回调）和彩色图像（Channel 模式，在主线程消费）
//! 4. 打印订阅状态表
//! 5. 取消订阅、关闭设备
//!
//! # 运行
//!
//! ```bash
//! cargo run -p magicbot-sdk --features mock --example sensor_streams -- --duration-secs 2
//! ```

use clap::Parser;
use magicbot_sdk::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "sensor_streams")]
#[command(about = "传感器流订阅演示 - 设备开关与通道订阅")]
struct Args {
    /// 机器人地址
    #[arg(long, default_value = "192.168.54.111")]
    endpoint: String,

    /// 采集时长（秒）
    #[arg(long, default_value = "2")]
    duration_secs: u64,

    /// 模拟投递周期（毫秒）
    #[arg(long, default_value = "10")]
    feed_period_ms: u64,

    /// 图像队列容量（队列满时丢弃新样本）
    #[arg(long, default_value = "16")]
    queue_capacity: usize,
}

fn main() -> anyhow::Result<()> {
    magicbot_sdk::init_logger!("magicbot_client=info");
    let args = Args::parse();

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            println!("\n🛑 收到 Ctrl+C，准备退出...");
            running.store(false, Ordering::SeqCst);
        })?;
    }

    println!("🤖 MagicBot SDK - 传感器流订阅演示");
    println!("==================================\n");

    // ==================== 步骤 1: 初始化并连接 ====================
    println!("📡 步骤 1: 初始化并连接 {} ...", args.endpoint);
    let mock = MockTransport::new();
    let session = Session::new(mock.clone());
    session.initialize(&args.endpoint)?;
    session.connect()?;
    let sensors = session.sensor_controller()?;
    println!("   ✅ 连接成功\n");

    // ==================== 步骤 2: 打开设备 ====================
    println!("📷 步骤 2: 打开激光雷达和头部 RGBD 相机...");
    sensors.open_lidar()?;
    sensors.open_head_rgbd_camera()?;
    println!("   ✅ 已打开\n");

    // ==================== 步骤 3: 订阅 ====================
    println!("📥 步骤 3: 订阅 IMU 与头部彩色图像...");
    let imu_count = Arc::new(AtomicU64::new(0));
    {
        let imu_count = imu_count.clone();
        sensors.toggle_lidar_imu_subscription(move |sample: &Sample| {
            if let Sample::Imu(_) = sample {
                imu_count.fetch_add(1, Ordering::Relaxed);
            }
        })?;
    }
    let (sink, images) = ChannelSink::new(args.queue_capacity);
    let dropped = sink.dropped_samples().clone();
    sensors.toggle_head_rgbd_color_image_subscription(sink)?;
    let feed = mock.spawn_sensor_feed(Duration::from_millis(args.feed_period_ms));
    println!("   ✅ 订阅完成\n");

    // ==================== 步骤 4: 采集并打印状态 ====================
    println!("⏳ 步骤 4: 采集 {} 秒...", args.duration_secs);
    let start = Instant::now();
    let mut frames = 0u64;
    let mut bytes = 0usize;
    while running.load(Ordering::SeqCst) && start.elapsed() < Duration::from_secs(args.duration_secs) {
        match images.recv_timeout(Duration::from_millis(100)) {
            Ok(Sample::Image(image)) => {
                frames += 1;
                bytes += image.byte_len();
            },
            Ok(_) => {},
            Err(_) => continue,
        }
    }
    println!(
        "   ✅ 图像 {} 帧（{} 字节，丢弃 {}），IMU {} 条\n",
        frames,
        bytes,
        dropped.load(Ordering::Relaxed),
        imu_count.load(Ordering::Relaxed)
    );
    println!("{}\n", sensors.show_status()?);

    // ==================== 步骤 5: 取消订阅并关闭 ====================
    println!("🔌 步骤 5: 取消订阅并关闭设备...");
    let state = sensors.toggle_head_rgbd_color_image_subscription(|_: &Sample| {})?;
    println!("   彩色图像订阅: {}", state);
    let report = sensors.close_all()?;
    for failure in &report.failures {
        println!("   ⚠️  {}", failure);
    }
    feed.stop();
    session.shutdown()?;
    println!("   ✅ 会话状态: {}", session.state());

    Ok(())
}
