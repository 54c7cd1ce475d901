//! 数据样本与投递回调
//!
//! 传输层在自己的投递线程上调用 [`SampleHandler::on_sample`]。
//! 同一通道内的样本按发布顺序投递，跨通道不保证顺序。

use magicbot_protocol::{
    CameraInfo, Image, Imu, JointState, PayloadKind, PointCloud2, TrinocularCameraFrame,
};

/// 一条数据样本
#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    Imu(Imu),
    PointCloud(PointCloud2),
    Image(Image),
    CameraInfo(CameraInfo),
    Trinocular(TrinocularCameraFrame),
    /// 手臂关节状态（底层控制状态流）
    ArmState(JointState),
}

impl Sample {
    /// 传感器负载类别；关节状态不属于传感器通道，返回 `None`
    pub fn payload_kind(&self) -> Option<PayloadKind> {
        match self {
            Self::Imu(_) => Some(PayloadKind::Imu),
            Self::PointCloud(_) => Some(PayloadKind::PointCloud),
            Self::Image(_) => Some(PayloadKind::Image),
            Self::CameraInfo(_) => Some(PayloadKind::CameraInfo),
            Self::Trinocular(_) => Some(PayloadKind::Trinocular),
            Self::ArmState(_) => None,
        }
    }

    /// 负载字节数（用于日志）
    pub fn byte_len(&self) -> usize {
        match self {
            Self::Image(img) => img.byte_len(),
            Self::PointCloud(pc) => pc.byte_len(),
            Self::Trinocular(frame) => frame.left.len() + frame.center.len() + frame.right.len(),
            Self::Imu(_) | Self::CameraInfo(_) | Self::ArmState(_) => 0,
        }
    }
}

/// 底层控制的状态流
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateStream {
    /// 机身 IMU
    BodyImu,
    /// 手臂关节状态
    ArmState,
}

/// 样本回调 Trait
///
/// # 性能要求
///
/// - **非阻塞**: 回调运行在传输层投递线程上，阻塞会拖慢同一通道的后续样本
/// - **Channel 模式**: 重负载处理推荐使用 [`crate::ChannelSink`] 转交到自己的线程
///
/// 闭包 `Fn(&Sample) + Send + Sync` 自动实现本 Trait。
pub trait SampleHandler: Send + Sync {
    fn on_sample(&self, sample: &Sample);
}

impl<F> SampleHandler for F
where
    F: Fn(&Sample) + Send + Sync,
{
    fn on_sample(&self, sample: &Sample) {
        self(sample)
    }
}
