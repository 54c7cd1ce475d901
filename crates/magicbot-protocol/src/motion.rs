//! 运动控制相关的值类型
//!
//! 包含控制层级、步态模式、特技动作以及摇杆指令。

use crate::ProtocolError;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

// ==================== 控制层级 ====================

/// 运动控制层级
///
/// 同一时刻一个会话最多绑定一个层级。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, num_enum::IntoPrimitive, num_enum::TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ControllerLevel {
    /// 高层控制：步态、特技动作、摇杆
    High = 1,
    /// 底层控制：固定周期的逐关节指令流
    Low = 2,
}

impl ControllerLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for ControllerLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControllerLevel {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).trim_end_matches("_LEVEL") {
            "HIGH" => Ok(Self::High),
            "LOW" => Ok(Self::Low),
            _ => Err(ProtocolError::UnknownControllerLevel(s.to_string())),
        }
    }
}

// ==================== 步态 ====================

/// 步态模式
///
/// 数值编码与机器人固件一致，本 crate 只做相等比较。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, num_enum::IntoPrimitive, num_enum::TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i32)]
pub enum GaitMode {
    /// 空闲
    Passive = 0,
    /// 恢复站立
    RecoveryStand = 1,
    /// 纯阻尼
    PureDamper = 10,
    /// 平衡站立（支持移动）
    BalanceStand = 46,
    /// 摆臂行走
    ArmSwingWalk = 47,
    /// 底层 SDK 控制模式
    LowLevelSdk = 200,
}

const GAIT_NAMES: &[(&str, GaitMode)] = &[
    ("PASSIVE", GaitMode::Passive),
    ("RECOVERY_STAND", GaitMode::RecoveryStand),
    ("PURE_DAMPER", GaitMode::PureDamper),
    ("BALANCE_STAND", GaitMode::BalanceStand),
    ("ARM_SWING_WALK", GaitMode::ArmSwingWalk),
    ("LOWLEVEL_SDK", GaitMode::LowLevelSdk),
    // 固件头文件中的拼写
    ("LOWLEVL_SDK", GaitMode::LowLevelSdk),
];

impl GaitMode {
    /// 从固件数值编码解析，未知编码返回 `None`
    pub fn from_code(code: i32) -> Option<Self> {
        Self::try_from(code).ok()
    }

    pub fn code(self) -> i32 {
        self.into()
    }

    /// 规范符号名（不含 `GAIT_` 前缀）
    pub fn name(self) -> &'static str {
        GAIT_NAMES
            .iter()
            .find(|(_, mode)| *mode == self)
            .map(|(name, _)| *name)
            .unwrap_or("UNKNOWN")
    }
}

impl fmt::Display for GaitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GAIT_{}", self.name())
    }
}

impl FromStr for GaitMode {
    type Err = ProtocolError;

    /// 接受 `GAIT_BALANCE_STAND`、`balance_stand`、`balance-stand` 等写法
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = normalize(s);
        let key = key.strip_prefix("GAIT_").unwrap_or(&key);
        GAIT_NAMES
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, mode)| *mode)
            .ok_or_else(|| ProtocolError::UnknownGait(s.to_string()))
    }
}

// ==================== 特技动作 ====================

/// 特技动作（一次性脚本动作）
///
/// 未知的数值编码或符号名都会解析为 [`TrickAction::None`]，
/// 即"无动作"哨兵值，解析本身永远不会失败。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, num_enum::IntoPrimitive, num_enum::FromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i32)]
pub enum TrickAction {
    /// 无动作（默认）
    #[default]
    None = 0,
    RecoveryStand = 103,
    Celebrate = 201,
    /// 握手 - 伸手
    ShakeHandReachOut = 217,
    /// 握手 - 收回
    ShakeHandWithdraw = 218,
    NodHead = 219,
    ShakeHead = 220,
    CircleHead = 221,
    Greeting = 301,
    /// 指地 - 伸手
    PointGround = 302,
    /// 指地 - 收回
    PointGroundWithdraw = 303,
    /// 摊手 - 伸手
    SpreadHand = 304,
    /// 摊手 - 收回
    SpreadHandWithdraw = 305,
    TurnAwayLeftIntroduce = 306,
    TurnBackLeftIntroduce = 307,
}

const TRICK_NAMES: &[(&str, TrickAction)] = &[
    ("NONE", TrickAction::None),
    ("RECOVERY_STAND", TrickAction::RecoveryStand),
    ("CELEBRATE", TrickAction::Celebrate),
    ("SHAKE_HAND_REACHOUT", TrickAction::ShakeHandReachOut),
    ("SHAKE_HAND_WITHDRAW", TrickAction::ShakeHandWithdraw),
    ("NOD_HEAD", TrickAction::NodHead),
    ("SHAKE_HEAD", TrickAction::ShakeHead),
    ("CIRCLE_HEAD", TrickAction::CircleHead),
    ("GREETING", TrickAction::Greeting),
    ("POINT_GROUND", TrickAction::PointGround),
    ("POINT_GROUND_WITH_DRAW", TrickAction::PointGroundWithdraw),
    ("SPREAD_HAND", TrickAction::SpreadHand),
    ("SPREAD_HAND_WITH_DRAW", TrickAction::SpreadHandWithdraw),
    ("TURN_AWAY_LEFT_INTRODUCE", TrickAction::TurnAwayLeftIntroduce),
    ("TURN_BACK_LEFT_INTRODUCE", TrickAction::TurnBackLeftIntroduce),
    // 固件头文件中的拼写
    ("GTEETING", TrickAction::Greeting),
    ("TRUN_AWAY_LEFT_INTRODUCE", TrickAction::TurnAwayLeftIntroduce),
    ("TRUN_BACK_LEFT_INTRODUCE", TrickAction::TurnBackLeftIntroduce),
    ("POINT_GROUND_WITHDRAW", TrickAction::PointGroundWithdraw),
    ("SPREAD_HAND_WITHDRAW", TrickAction::SpreadHandWithdraw),
];

impl TrickAction {
    /// 从固件数值编码解析，未知编码返回 [`TrickAction::None`]
    pub fn from_code(code: i32) -> Self {
        Self::from(code)
    }

    pub fn code(self) -> i32 {
        self.into()
    }

    pub fn is_none(self) -> bool {
        self == Self::None
    }

    /// 规范符号名（不含 `ACTION_` 前缀）
    pub fn name(self) -> &'static str {
        TRICK_NAMES
            .iter()
            .find(|(_, action)| *action == self)
            .map(|(name, _)| *name)
            .unwrap_or("NONE")
    }
}

impl fmt::Display for TrickAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ACTION_{}", self.name())
    }
}

impl FromStr for TrickAction {
    type Err = Infallible;

    /// 接受 `ACTION_CELEBRATE`、`celebrate`、`shake-hand-reachout`，
    /// 也接受纯数字编码；其余输入得到 [`TrickAction::None`]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(code) = s.trim().parse::<i32>() {
            return Ok(Self::from_code(code));
        }
        let key = normalize(s);
        let key = key.strip_prefix("ACTION_").unwrap_or(&key);
        Ok(TRICK_NAMES
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, action)| *action)
            .unwrap_or_default())
    }
}

// ==================== 摇杆 ====================

/// 摇杆指令
///
/// 四个轴的取值范围均为 [-1.0, 1.0]，0 为中位。
/// 左摇杆 X：-1 左移 / 1 右移；左摇杆 Y：-1 后退 / 1 前进。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JoystickCommand {
    pub left_x: f64,
    pub left_y: f64,
    pub right_x: f64,
    pub right_y: f64,
}

impl JoystickCommand {
    pub fn new(left_x: f64, left_y: f64, right_x: f64, right_y: f64) -> Self {
        Self {
            left_x,
            left_y,
            right_x,
            right_y,
        }
    }

    /// 所有轴都在合法范围内（NaN 视为越界）
    pub fn is_within_bounds(&self) -> bool {
        self.axes().iter().all(|v| (-1.0..=1.0).contains(v))
    }

    /// 将各轴钳位到 [-1.0, 1.0]，NaN 置 0
    ///
    /// # 返回
    ///
    /// `(钳位后的指令, 是否发生了钳位)`
    pub fn clamped(self) -> (Self, bool) {
        let clamp = |v: f64| if v.is_nan() { 0.0 } else { v.clamp(-1.0, 1.0) };
        let out = Self {
            left_x: clamp(self.left_x),
            left_y: clamp(self.left_y),
            right_x: clamp(self.right_x),
            right_y: clamp(self.right_y),
        };
        (out, !self.is_within_bounds())
    }

    fn axes(&self) -> [f64; 4] {
        [self.left_x, self.left_y, self.right_x, self.right_y]
    }
}

/// 符号名归一化：去空白、转大写、`-`/空格替换为 `_`
fn normalize(s: &str) -> String {
    s.trim()
        .chars()
        .map(|c| match c {
            '-' | ' ' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gait_codes_match_firmware() {
        assert_eq!(GaitMode::Passive.code(), 0);
        assert_eq!(GaitMode::RecoveryStand.code(), 1);
        assert_eq!(GaitMode::BalanceStand.code(), 46);
        assert_eq!(GaitMode::LowLevelSdk.code(), 200);
        assert_eq!(GaitMode::from_code(47), Some(GaitMode::ArmSwingWalk));
        assert_eq!(GaitMode::from_code(2), None);
    }

    #[test]
    fn test_gait_from_str() {
        assert_eq!("GAIT_BALANCE_STAND".parse::<GaitMode>().unwrap(), GaitMode::BalanceStand);
        assert_eq!("recovery-stand".parse::<GaitMode>().unwrap(), GaitMode::RecoveryStand);
        assert_eq!("GAIT_LOWLEVL_SDK".parse::<GaitMode>().unwrap(), GaitMode::LowLevelSdk);
        assert!("moonwalk".parse::<GaitMode>().is_err());
        assert_eq!(GaitMode::PureDamper.to_string(), "GAIT_PURE_DAMPER");
    }

    #[test]
    fn test_trick_unknown_code_is_none() {
        assert_eq!(TrickAction::from_code(201), TrickAction::Celebrate);
        assert_eq!(TrickAction::from_code(9999), TrickAction::None);
        assert_eq!(TrickAction::from_code(-1), TrickAction::None);
        assert!(TrickAction::from_code(12).is_none());
    }

    #[test]
    fn test_trick_from_str_never_fails() {
        let parse = |s: &str| s.parse::<TrickAction>().unwrap();
        assert_eq!(parse("ACTION_CELEBRATE"), TrickAction::Celebrate);
        assert_eq!(parse("celebrate"), TrickAction::Celebrate);
        assert_eq!(parse("shake-hand-reachout"), TrickAction::ShakeHandReachOut);
        assert_eq!(parse("ACTION_GTEETING"), TrickAction::Greeting);
        assert_eq!(parse("219"), TrickAction::NodHead);
        assert_eq!(parse("backflip"), TrickAction::None);
        assert_eq!(parse(""), TrickAction::None);
        assert_eq!(parse("77"), TrickAction::None);
    }

    #[test]
    fn test_trick_display_uses_canonical_name() {
        assert_eq!(TrickAction::Greeting.to_string(), "ACTION_GREETING");
        assert_eq!(TrickAction::None.to_string(), "ACTION_NONE");
    }

    #[test]
    fn test_controller_level_parse() {
        assert_eq!("high".parse::<ControllerLevel>().unwrap(), ControllerLevel::High);
        assert_eq!("LOW_LEVEL".parse::<ControllerLevel>().unwrap(), ControllerLevel::Low);
        assert!("medium".parse::<ControllerLevel>().is_err());
        assert_eq!(u8::from(ControllerLevel::Low), 2);
    }

    #[test]
    fn test_joystick_clamp() {
        let (cmd, clamped) = JoystickCommand::new(0.5, -0.2, 0.0, 1.0).clamped();
        assert!(!clamped);
        assert_eq!(cmd, JoystickCommand::new(0.5, -0.2, 0.0, 1.0));

        let (cmd, clamped) = JoystickCommand::new(1.7, -3.0, f64::NAN, 0.3).clamped();
        assert!(clamped);
        assert_eq!(cmd, JoystickCommand::new(1.0, -1.0, 0.0, 0.3));
        assert!(cmd.is_within_bounds());
    }
}
