//! 传感器设备、数据通道与数据负载
//!
//! 设备（`SensorDevice`）是可以打开/关闭的硬件组，
//! 通道（`SensorChannel`）是隶属于某个设备、可独立订阅的数据流。
//! 负载类型只描述数据形状，会话核心不解释其内容。

use crate::ProtocolError;
use bytes::Bytes;
use std::fmt;
use std::str::FromStr;

// ==================== 设备与通道 ====================

/// 传感器设备
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SensorDevice {
    Lidar,
    HeadRgbdCamera,
    WaistRgbdCamera,
    TrinocularCamera,
}

impl SensorDevice {
    pub const ALL: [SensorDevice; 4] = [
        Self::Lidar,
        Self::HeadRgbdCamera,
        Self::WaistRgbdCamera,
        Self::TrinocularCamera,
    ];

    /// 设备拥有的全部通道
    pub fn channels(self) -> &'static [SensorChannel] {
        use SensorChannel::*;
        match self {
            Self::Lidar => &[LidarImu, LidarPointCloud],
            Self::HeadRgbdCamera => &[
                HeadRgbdColorImage,
                HeadRgbdDepthImage,
                HeadRgbdColorCameraInfo,
                HeadRgbdDepthCameraInfo,
            ],
            Self::WaistRgbdCamera => &[
                WaistRgbdColorImage,
                WaistRgbdDepthImage,
                WaistRgbdColorCameraInfo,
                WaistRgbdDepthCameraInfo,
            ],
            Self::TrinocularCamera => &[TrinocularImage],
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Lidar => "Lidar",
            Self::HeadRgbdCamera => "Head RGBD Camera",
            Self::WaistRgbdCamera => "Waist RGBD Camera",
            Self::TrinocularCamera => "Trinocular Camera",
        }
    }
}

impl fmt::Display for SensorDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SensorDevice {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match key.as_str() {
            "lidar" => Ok(Self::Lidar),
            "headrgbd" | "headrgbdcamera" => Ok(Self::HeadRgbdCamera),
            "waistrgbd" | "waistrgbdcamera" => Ok(Self::WaistRgbdCamera),
            "trinocular" | "trinocularcamera" => Ok(Self::TrinocularCamera),
            _ => Err(ProtocolError::UnknownDevice(s.to_string())),
        }
    }
}

/// 数据负载类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PayloadKind {
    Imu,
    PointCloud,
    Image,
    CameraInfo,
    Trinocular,
}

/// 传感器数据通道
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SensorChannel {
    LidarImu,
    LidarPointCloud,
    HeadRgbdColorImage,
    HeadRgbdDepthImage,
    HeadRgbdColorCameraInfo,
    HeadRgbdDepthCameraInfo,
    WaistRgbdColorImage,
    WaistRgbdDepthImage,
    WaistRgbdColorCameraInfo,
    WaistRgbdDepthCameraInfo,
    TrinocularImage,
}

impl SensorChannel {
    pub const COUNT: usize = 11;

    pub const ALL: [SensorChannel; Self::COUNT] = [
        Self::LidarImu,
        Self::LidarPointCloud,
        Self::HeadRgbdColorImage,
        Self::HeadRgbdDepthImage,
        Self::HeadRgbdColorCameraInfo,
        Self::HeadRgbdDepthCameraInfo,
        Self::WaistRgbdColorImage,
        Self::WaistRgbdDepthImage,
        Self::WaistRgbdColorCameraInfo,
        Self::WaistRgbdDepthCameraInfo,
        Self::TrinocularImage,
    ];

    /// 所属设备
    pub fn device(self) -> SensorDevice {
        use SensorChannel::*;
        match self {
            LidarImu | LidarPointCloud => SensorDevice::Lidar,
            HeadRgbdColorImage
            | HeadRgbdDepthImage
            | HeadRgbdColorCameraInfo
            | HeadRgbdDepthCameraInfo => SensorDevice::HeadRgbdCamera,
            WaistRgbdColorImage
            | WaistRgbdDepthImage
            | WaistRgbdColorCameraInfo
            | WaistRgbdDepthCameraInfo => SensorDevice::WaistRgbdCamera,
            TrinocularImage => SensorDevice::TrinocularCamera,
        }
    }

    pub fn payload_kind(self) -> PayloadKind {
        use SensorChannel::*;
        match self {
            LidarImu => PayloadKind::Imu,
            LidarPointCloud => PayloadKind::PointCloud,
            HeadRgbdColorImage | HeadRgbdDepthImage | WaistRgbdColorImage | WaistRgbdDepthImage => {
                PayloadKind::Image
            },
            HeadRgbdColorCameraInfo
            | HeadRgbdDepthCameraInfo
            | WaistRgbdColorCameraInfo
            | WaistRgbdDepthCameraInfo => PayloadKind::CameraInfo,
            TrinocularImage => PayloadKind::Trinocular,
        }
    }

    /// 通道表中的下标（与 `ALL` 顺序一致）
    pub fn index(self) -> usize {
        self as usize
    }

    /// 稳定的 snake_case 名称
    pub fn name(self) -> &'static str {
        use SensorChannel::*;
        match self {
            LidarImu => "lidar_imu",
            LidarPointCloud => "lidar_point_cloud",
            HeadRgbdColorImage => "head_rgbd_color_image",
            HeadRgbdDepthImage => "head_rgbd_depth_image",
            HeadRgbdColorCameraInfo => "head_rgbd_color_camera_info",
            HeadRgbdDepthCameraInfo => "head_rgbd_depth_camera_info",
            WaistRgbdColorImage => "waist_rgbd_color_image",
            WaistRgbdDepthImage => "waist_rgbd_depth_image",
            WaistRgbdColorCameraInfo => "waist_rgbd_color_camera_info",
            WaistRgbdDepthCameraInfo => "waist_rgbd_depth_camera_info",
            TrinocularImage => "trinocular_image",
        }
    }
}

impl fmt::Display for SensorChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SensorChannel {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .iter()
            .copied()
            .find(|ch| ch.name() == key)
            .ok_or_else(|| ProtocolError::UnknownChannel(s.to_string()))
    }
}

// ==================== 数据负载 ====================

/// 消息头
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Header {
    /// 时间戳（纳秒）
    pub stamp_ns: u64,
    pub frame_id: String,
}

/// IMU 采样
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Imu {
    pub timestamp_ns: u64,
    /// 姿态四元数 (w, x, y, z)
    pub orientation: [f64; 4],
    /// 角速度（rad/s）
    pub angular_velocity: [f64; 3],
    /// 线加速度（m/s²）
    pub linear_acceleration: [f64; 3],
    /// 温度（℃）
    pub temperature: f32,
}

/// 点云字段描述
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PointField {
    pub name: String,
    pub offset: u32,
    pub datatype: u8,
    pub count: u32,
}

/// 点云
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PointCloud2 {
    pub header: Header,
    pub height: u32,
    pub width: u32,
    pub fields: Vec<PointField>,
    pub is_bigendian: bool,
    pub point_step: u32,
    pub row_step: u32,
    pub data: Bytes,
    pub is_dense: bool,
}

impl PointCloud2 {
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

/// 图像
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Image {
    pub header: Header,
    pub height: u32,
    pub width: u32,
    /// 像素编码（如 `rgb8`、`16UC1`）
    pub encoding: String,
    pub is_bigendian: bool,
    /// 每行字节数
    pub step: u32,
    pub data: Bytes,
}

impl Image {
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

/// 相机内参
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CameraInfo {
    pub header: Header,
    pub height: u32,
    pub width: u32,
    pub distortion_model: String,
    /// 畸变参数
    pub d: Vec<f64>,
    /// 内参矩阵（3x3，行优先）
    pub k: [f64; 9],
    /// 校正矩阵（3x3）
    pub r: [f64; 9],
    /// 投影矩阵（3x4）
    pub p: [f64; 12],
    pub binning_x: u32,
    pub binning_y: u32,
}

/// 三目相机帧
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrinocularCameraFrame {
    pub header: Header,
    /// 采集时间（纳秒）
    pub vin_time: i64,
    /// 解码时间（纳秒）
    pub decode_time: i64,
    pub left: Bytes,
    pub center: Bytes,
    pub right: Bytes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_channel_belongs_to_exactly_one_device() {
        for channel in SensorChannel::ALL {
            let owners: Vec<_> = SensorDevice::ALL
                .iter()
                .filter(|d| d.channels().contains(&channel))
                .collect();
            assert_eq!(owners.len(), 1, "channel {channel} owners: {owners:?}");
            assert_eq!(*owners[0], channel.device());
        }
    }

    #[test]
    fn test_channel_index_matches_all_order() {
        for (i, channel) in SensorChannel::ALL.iter().enumerate() {
            assert_eq!(channel.index(), i);
        }
        let total: usize = SensorDevice::ALL.iter().map(|d| d.channels().len()).sum();
        assert_eq!(total, SensorChannel::COUNT);
    }

    #[test]
    fn test_channel_name_roundtrip() {
        for channel in SensorChannel::ALL {
            assert_eq!(channel.name().parse::<SensorChannel>().unwrap(), channel);
        }
        assert!("head_rgbd_ir_image".parse::<SensorChannel>().is_err());
    }

    #[test]
    fn test_device_parse() {
        assert_eq!("lidar".parse::<SensorDevice>().unwrap(), SensorDevice::Lidar);
        assert_eq!("head-rgbd".parse::<SensorDevice>().unwrap(), SensorDevice::HeadRgbdCamera);
        assert_eq!(
            "Waist RGBD Camera".parse::<SensorDevice>().unwrap(),
            SensorDevice::WaistRgbdCamera
        );
        assert!("radar".parse::<SensorDevice>().is_err());
    }

    #[test]
    fn test_payload_kinds() {
        assert_eq!(SensorChannel::LidarImu.payload_kind(), PayloadKind::Imu);
        assert_eq!(SensorChannel::WaistRgbdDepthImage.payload_kind(), PayloadKind::Image);
        assert_eq!(
            SensorChannel::HeadRgbdColorCameraInfo.payload_kind(),
            PayloadKind::CameraInfo
        );
        assert_eq!(SensorChannel::TrinocularImage.payload_kind(), PayloadKind::Trinocular);
    }

    #[test]
    fn test_image_byte_len() {
        let image = Image {
            width: 4,
            height: 2,
            step: 12,
            encoding: "rgb8".into(),
            data: Bytes::from(vec![0u8; 24]),
            ..Default::default()
        };
        assert_eq!(image.byte_len(), 24);
    }
}
