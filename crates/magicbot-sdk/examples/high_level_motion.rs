//! 高层运动控制演示
//!
//! 这个示例展示了高层运动控制的完整流程：
//! 1. 初始化并连接会话
//! 2. 切换到高层控制
//! 3. 恢复站立并读取当前步态
//! 4. 切换到平衡站立，持续发送摇杆指令
//! 5. 执行特技动作与头部运动
//! 6. 关闭会话
//!
//! 链路使用模拟传输层，无需真实机器人。
//!
//! # 运行
//!
//! ```bash
//! cargo run -p magicbot-sdk --features mock --example high_level_motion -- --trick CELEBRATE
//! ```

use clap::Parser;
use magicbot_sdk::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "high_level_motion")]
#[command(about = "高层运动控制演示 - 步态、摇杆、特技动作")]
struct Args {
    /// 机器人地址
    #[arg(long, default_value = "192.168.54.111")]
    endpoint: String,

    /// 特技动作名称（如 CELEBRATE、NOD_HEAD；未知名称不执行任何动作）
    #[arg(long, default_value = "CELEBRATE")]
    trick: String,

    /// 摇杆指令持续时间（秒）
    #[arg(long, default_value = "2")]
    walk_secs: u64,

    /// 单个运动请求超时（毫秒）
    #[arg(long, default_value = "10000")]
    timeout_ms: u64,
}

fn main() -> anyhow::Result<()> {
    magicbot_sdk::init_logger!("magicbot_client=info,magicbot_transport=info");
    let args = Args::parse();
    let timeout = Some(Duration::from_millis(args.timeout_ms));

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            println!("\n🛑 收到 Ctrl+C，准备退出...");
            running.store(false, Ordering::SeqCst);
        })?;
    }

    println!("🤖 MagicBot SDK {} - 高层运动控制演示", Session::sdk_version());
    println!("==========================================\n");

    // ==================== 步骤 1: 初始化并连接 ====================
    println!("📡 步骤 1: 初始化并连接 {} ...", args.endpoint);
    let session = Session::new(MockTransport::new());
    session.initialize(&args.endpoint)?;
    session.connect()?;
    println!("   ✅ 会话状态: {}\n", session.state());

    // ==================== 步骤 2: 切换到高层控制 ====================
    println!("🎛️  步骤 2: 切换到高层控制...");
    let status = session.set_motion_control_level(ControllerLevel::High)?;
    let controller = session.get_high_level_motion_controller()?;
    println!("   ✅ {}\n", status);

    // ==================== 步骤 3: 恢复站立 ====================
    println!("🧍 步骤 3: 恢复站立...");
    controller.set_gait(GaitMode::RecoveryStand, timeout)?;
    println!("   ✅ 当前步态: {}\n", controller.get_gait()?);

    // ==================== 步骤 4: 平衡站立 + 摇杆 ====================
    println!("🚶 步骤 4: 平衡站立并发送摇杆指令 ({} 秒)...", args.walk_secs);
    controller.set_gait(GaitMode::BalanceStand, timeout)?;
    let start = Instant::now();
    let mut sent = 0u32;
    while running.load(Ordering::SeqCst) && start.elapsed() < Duration::from_secs(args.walk_secs) {
        // 前进并缓慢左转
        controller.send_joystick_command(JoystickCommand::new(0.0, 0.5, -0.2, 0.0))?;
        sent += 1;
        std::thread::sleep(Duration::from_millis(20));
    }
    controller.send_joystick_command(JoystickCommand::default())?;
    println!("   ✅ 已发送 {} 条摇杆指令\n", sent);

    // ==================== 步骤 5: 特技动作与头部运动 ====================
    let action: TrickAction = args.trick.parse()?;
    println!("🎉 步骤 5: 执行特技动作 {} ...", action);
    let status = controller.execute_trick(action, timeout)?;
    println!("   ✅ {}", status);
    controller.head_move(0.3, -0.2, timeout)?;
    println!("   ✅ 头部运动完成\n");

    // ==================== 步骤 6: 关闭 ====================
    println!("🔌 步骤 6: 关闭会话...");
    let report = session.shutdown()?;
    for failure in &report.failures {
        println!("   ⚠️  {}", failure);
    }
    let metrics = session.metrics();
    println!(
        "   📊 运动请求 {} 次，超时 {} 次",
        metrics.motion_requests, metrics.motion_timeouts
    );
    println!("   ✅ 会话状态: {}", session.state());

    Ok(())
}
