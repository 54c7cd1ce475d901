//! 关节指令与关节状态
//!
//! `JointCommand` 中关节的下标即关节身份（按位置区分，不是键）。

// ==================== 关节数量常量 ====================

/// 手臂关节数（双臂）
pub const ARM_JOINT_NUM: usize = 14;
/// 腿部关节数
pub const LEG_JOINT_NUM: usize = 12;
/// 头部关节数
pub const HEAD_JOINT_NUM: usize = 2;
/// 腰部关节数
pub const WAIST_JOINT_NUM: usize = 2;
/// 单手关节数
pub const HAND_JOINT_NUM: usize = 6;
/// 手的数量
pub const HAND_NUM: usize = 2;

/// 默认工作模式：准备模式
pub const OPERATION_MODE_PREPARE: i16 = 200;

/// 单关节控制指令
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SingleJointCommand {
    /// 工作模式（位置/力矩/阻抗等，编码由固件定义）
    pub operation_mode: i16,
    /// 目标位置（rad）
    pub pos: f64,
    /// 目标速度（rad/s）
    pub vel: f64,
    /// 前馈力矩（N·m）
    pub toq: f64,
    pub kp: f64,
    pub kd: f64,
}

impl Default for SingleJointCommand {
    fn default() -> Self {
        Self {
            operation_mode: OPERATION_MODE_PREPARE,
            pos: 0.0,
            vel: 0.0,
            toq: 0.0,
            kp: 0.0,
            kd: 0.0,
        }
    }
}

impl SingleJointCommand {
    /// 位置阻抗控制指令
    pub fn position(pos: f64, kp: f64, kd: f64) -> Self {
        Self {
            pos,
            kp,
            kd,
            ..Self::default()
        }
    }
}

/// 整组关节指令
///
/// 周期发布器只保留最近一次提交的指令（后写覆盖），不排队。
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JointCommand {
    /// 时间戳（纳秒）
    pub timestamp_ns: u64,
    pub joints: Vec<SingleJointCommand>,
}

impl JointCommand {
    pub fn new(timestamp_ns: u64, joints: Vec<SingleJointCommand>) -> Self {
        Self {
            timestamp_ns,
            joints,
        }
    }

    /// `count` 个相同的单关节指令
    pub fn uniform(timestamp_ns: u64, count: usize, joint: SingleJointCommand) -> Self {
        Self::new(timestamp_ns, vec![joint; count])
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }
}

/// 单关节状态反馈
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SingleJointState {
    pub status_word: i16,
    /// 高速端位置（电机侧）
    pub pos_h: f64,
    /// 低速端位置（输出侧）
    pub pos_l: f64,
    pub vel: f64,
    pub toq: f64,
    pub current: f64,
    pub err_code: i16,
}

/// 整组关节状态
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JointState {
    pub timestamp_ns: u64,
    pub joints: Vec<SingleJointState>,
}
