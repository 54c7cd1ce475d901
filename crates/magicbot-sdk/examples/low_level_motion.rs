//! 底层关节控制演示
//!
//! 这个示例展示了底层控制的完整流程：
//! 1. 初始化并连接会话
//! 2. 切换到底层控制（发布线程随之启动）
//! 3. 订阅机身 IMU 和手臂关节状态
//! 4. 按正弦轨迹提交手臂指令，发布线程以固定周期下发最近一次指令
//! 5. 打印发布统计并关闭会话
//!
//! # 运行
//!
//! ```bash
//! cargo run -p magicbot-sdk --features mock --example low_level_motion -- --period-ms 2 --duration-secs 3
//! ```

use clap::Parser;
use magicbot_sdk::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "low_level_motion")]
#[command(about = "底层关节控制演示 - 周期发布手臂关节指令")]
struct Args {
    /// 机器人地址
    #[arg(long, default_value = "192.168.54.111")]
    endpoint: String,

    /// 发布周期（毫秒）
    #[arg(long, default_value = "2")]
    period_ms: u64,

    /// 运行时长（秒）
    #[arg(long, default_value = "3")]
    duration_secs: u64,

    /// 正弦轨迹幅值（rad）
    #[arg(long, default_value = "0.3")]
    amplitude: f64,
}

/// 以 f64 位模式保存的最近一次数值（投递线程写，主线程读）
#[derive(Default)]
struct LastValue(AtomicU64);

impl LastValue {
    fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }
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

    println!("🤖 MagicBot SDK - 底层关节控制演示");
    println!("==================================\n");

    // ==================== 步骤 1: 初始化并连接 ====================
    println!("📡 步骤 1: 初始化并连接 {} ...", args.endpoint);
    let mock = MockTransport::new();
    let session = Session::new(mock.clone());
    session.initialize(&args.endpoint)?;
    session.connect()?;
    println!("   ✅ 连接成功\n");

    // ==================== 步骤 2: 切换到底层控制 ====================
    println!("🎛️  步骤 2: 切换到底层控制...");
    session.set_motion_control_level(ControllerLevel::Low)?;
    let controller = session.get_low_level_motion_controller()?;
    controller.set_period_ms(args.period_ms)?;
    println!(
        "   ✅ 发布线程运行中: {}，周期 {} ms\n",
        controller.is_running(),
        controller.period_ms()
    );

    // ==================== 步骤 3: 订阅状态流 ====================
    println!("📥 步骤 3: 订阅机身 IMU 和手臂关节状态...");
    let imu_count = Arc::new(AtomicU64::new(0));
    let last_arm_pos = Arc::new(LastValue::default());
    {
        let imu_count = imu_count.clone();
        controller.subscribe_body_imu(move |sample: &Sample| {
            if let Sample::Imu(_) = sample {
                imu_count.fetch_add(1, Ordering::Relaxed);
            }
        })?;
    }
    {
        let last_arm_pos = last_arm_pos.clone();
        controller.subscribe_arm_state(move |sample: &Sample| {
            if let Sample::ArmState(state) = sample
                && let Some(joint) = state.joints.first()
            {
                last_arm_pos.store(joint.pos_l);
            }
        })?;
    }
    let feed = mock.spawn_sensor_feed(Duration::from_millis(10));
    println!("   ✅ 订阅完成\n");

    // ==================== 步骤 4: 提交正弦轨迹 ====================
    println!("🎯 步骤 4: 提交正弦轨迹 ({} 秒)...", args.duration_secs);
    let start = Instant::now();
    let mut submitted = 0u64;
    while running.load(Ordering::SeqCst) && start.elapsed() < Duration::from_secs(args.duration_secs) {
        let t = start.elapsed().as_secs_f64();
        let pos = args.amplitude * (2.0 * std::f64::consts::PI * 0.5 * t).sin();
        let command = JointCommand::uniform(
            start.elapsed().as_nanos() as u64,
            ARM_JOINT_NUM,
            SingleJointCommand::position(pos, 20.0, 2.0),
        );
        controller.publish_arm_command(command)?;
        submitted += 1;
        std::thread::sleep(Duration::from_millis(5));
    }
    feed.stop();
    println!("   ✅ 已提交 {} 条指令\n", submitted);

    // ==================== 步骤 5: 统计并关闭 ====================
    let metrics = session.metrics();
    println!("📊 步骤 5: 发布统计");
    println!("   tick: {}", metrics.publish_ticks);
    println!("   下发: {}", metrics.publish_writes);
    println!("   跳过（无指令）: {}", metrics.publish_skipped);
    println!("   被覆盖的指令: {}", metrics.command_overwrites);
    println!("   超时 tick: {} ({:.2}%)", metrics.tick_overruns, metrics.overrun_rate());
    println!("   机身 IMU 样本: {}", imu_count.load(Ordering::Relaxed));
    println!("   最近一次手臂关节 1 位置: {:.4} rad\n", last_arm_pos.load());

    println!("🔌 关闭会话...");
    let report = session.shutdown()?;
    for failure in &report.failures {
        println!("   ⚠️  {}", failure);
    }
    println!("   ✅ 会话状态: {}", session.state());

    Ok(())
}

