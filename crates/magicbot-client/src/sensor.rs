//! 传感器订阅管理
//!
//! 两级模型：设备（打开/关闭）+ 通道（订阅/退订）。
//!
//! - 通道已订阅 ⇒ 所属设备已打开
//! - 关闭设备时，先退订该设备的全部通道，再执行设备级关闭
//!
//! 设备/通道状态保存在一张互斥表中，所有修改在表锁内完成，
//! [`SensorController::show_status`] 在同一把锁下取快照，不会观察到中间状态。
//! 每个通道一个回调门（[`HandlerGate`]），退订返回后不会再有样本到达回调。
//!
//! 回调运行在传输层的投递线程上，**不得**在回调内调用 `SensorController` 的方法。

use crate::error::{OperationReport, Result, RobotError, SubFailure, SubFailures, SubTarget};
use crate::gate::{GateForwarder, HandlerGate};
use crate::metrics::SessionMetrics;
use crate::session::SessionCore;
use magicbot_protocol::{PayloadKind, SensorChannel, SensorDevice, Status};
use magicbot_transport::{SampleHandler, Transport, TransportError};
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

const DEVICE_COUNT: usize = SensorDevice::ALL.len();

/// 每收到 N 个样本打印一次 debug 日志
fn log_every(channel: SensorChannel) -> u64 {
    match channel.payload_kind() {
        PayloadKind::Imu => 100,
        PayloadKind::PointCloud => 10,
        PayloadKind::Image | PayloadKind::CameraInfo | PayloadKind::Trinocular => 15,
    }
}

/// 设备/通道状态表
#[derive(Debug, Default)]
struct SensorTable {
    open: [bool; DEVICE_COUNT],
    subscribed: [bool; SensorChannel::COUNT],
    /// 会话断开后置为 false，之后不再接受任何操作
    active: bool,
}

/// 传感器运行时（每个连接一个）
pub(crate) struct SensorRuntime {
    table: Mutex<SensorTable>,
    gates: [Arc<HandlerGate>; SensorChannel::COUNT],
}

impl SensorRuntime {
    pub(crate) fn new(metrics: Arc<SessionMetrics>) -> Self {
        let gates = std::array::from_fn(|i| {
            let channel = SensorChannel::ALL[i];
            Arc::new(HandlerGate::new(
                channel.name(),
                log_every(channel),
                metrics.clone(),
            ))
        });
        Self {
            table: Mutex::new(SensorTable {
                active: true,
                ..Default::default()
            }),
            gates,
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.table.lock().active
    }

    fn gate(&self, channel: SensorChannel) -> &Arc<HandlerGate> {
        &self.gates[channel.index()]
    }

    /// 退订一个通道
    ///
    /// 本地回调总是先被卸载，通道总是被标记为未订阅；链路退订失败作为错误返回。
    fn unsubscribe_locked(
        &self,
        table: &mut SensorTable,
        transport: &dyn Transport,
        channel: SensorChannel,
    ) -> std::result::Result<(), TransportError> {
        self.gate(channel).detach();
        table.subscribed[channel.index()] = false;
        transport.unsubscribe(channel).inspect_err(|e| {
            warn!("Failed to unsubscribe {}: {}", channel, e);
        })
    }

    /// 级联关闭一个已打开的设备
    ///
    /// # 返回
    ///
    /// - `Ok(failures)`: 设备已关闭，`failures` 为退订失败的通道
    /// - `Err(CascadeClose)`: 设备级关闭失败，设备保持打开，通道均已退订
    fn close_locked(
        &self,
        table: &mut SensorTable,
        transport: &dyn Transport,
        device: SensorDevice,
    ) -> Result<SubFailures> {
        let mut failures = SubFailures::new();
        for &channel in device.channels() {
            if !table.subscribed[channel.index()] {
                continue;
            }
            if let Err(e) = self.unsubscribe_locked(table, transport, channel) {
                failures.push(SubFailure::new(SubTarget::Channel(channel), e));
            }
        }

        match transport.close_device(device) {
            Ok(()) => {
                table.open[device.index()] = false;
                info!("{} closed", device);
                Ok(failures)
            },
            Err(source) => {
                warn!("Failed to close {}: {}", device, source);
                Err(RobotError::CascadeClose {
                    device,
                    source,
                    failures,
                })
            },
        }
    }

    /// 关闭所有打开的设备，失败逐条收集
    fn close_all_locked(&self, table: &mut SensorTable, transport: &dyn Transport) -> SubFailures {
        let mut failures = SubFailures::new();
        for device in SensorDevice::ALL {
            if !table.open[device.index()] {
                continue;
            }
            match self.close_locked(table, transport, device) {
                Ok(channel_failures) => failures.extend(channel_failures),
                Err(RobotError::CascadeClose {
                    device,
                    source,
                    failures: channel_failures,
                }) => {
                    failures.extend(channel_failures);
                    failures.push(SubFailure::new(SubTarget::Device(device), source));
                },
                Err(e) => warn!("Unexpected error while closing {}: {}", device, e),
            }
        }
        failures
    }

    /// 断开连接时调用：关闭全部设备并停用运行时
    pub(crate) fn close_all(&self, transport: &dyn Transport) -> SubFailures {
        let mut table = self.table.lock();
        let failures = self.close_all_locked(&mut table, transport);
        // 设备关闭失败时通道也已全部卸载
        for gate in &self.gates {
            gate.detach();
        }
        table.subscribed = [false; SensorChannel::COUNT];
        table.active = false;
        failures
    }
}

// ==================== 状态快照 ====================

/// 通道订阅状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Subscribed,
    Unsubscribed,
}

impl SubscriptionState {
    pub fn is_subscribed(self) -> bool {
        self == Self::Subscribed
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subscribed => f.write_str("SUBSCRIBED"),
            Self::Unsubscribed => f.write_str("UNSUBSCRIBED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStatus {
    pub device: SensorDevice,
    pub open: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelStatus {
    pub channel: SensorChannel,
    pub subscribed: bool,
    /// 本次订阅以来收到的样本数
    pub samples: u64,
}

/// 传感器状态快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorStatus {
    pub devices: Vec<DeviceStatus>,
    pub channels: Vec<ChannelStatus>,
}

impl SensorStatus {
    pub fn is_open(&self, device: SensorDevice) -> bool {
        self.devices[device.index()].open
    }

    pub fn is_subscribed(&self, channel: SensorChannel) -> bool {
        self.channels[channel.index()].subscribed
    }

    /// 已订阅的通道都属于已打开的设备
    pub fn is_consistent(&self) -> bool {
        self.channels
            .iter()
            .all(|c| !c.subscribed || self.is_open(c.channel.device()))
    }
}

impl fmt::Display for SensorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "========== Sensor Status ==========")?;
        for device in &self.devices {
            writeln!(
                f,
                "{:<20} {}",
                device.device.name(),
                if device.open { "OPEN" } else { "CLOSED" }
            )?;
            for &channel in device.device.channels() {
                let status = &self.channels[channel.index()];
                if status.subscribed {
                    writeln!(
                        f,
                        "  {:<30} ✓ SUBSCRIBED ({} samples)",
                        channel.name(),
                        status.samples
                    )?;
                } else {
                    writeln!(f, "  {:<30} ✗ UNSUBSCRIBED", channel.name())?;
                }
            }
        }
        write!(f, "===================================")
    }
}

// ==================== 控制器句柄 ====================

/// 传感器控制器
///
/// 由 [`Session::sensor_controller`](crate::Session::sensor_controller) 获取，可克隆。
///
/// # 示例
///
/// ```rust
/// use magicbot_client::Session;
/// use magicbot_transport::{ChannelSink, MockTransport};
///
/// # fn main() -> magicbot_client::Result<()> {
/// let session = Session::new(MockTransport::new());
/// session.initialize("127.0.0.1")?;
/// session.connect()?;
///
/// let sensors = session.sensor_controller()?;
/// sensors.open_head_rgbd_camera()?;
/// let (sink, _rx) = ChannelSink::new(64);
/// sensors.toggle_head_rgbd_color_image_subscription(sink)?;
/// println!("{}", sensors.show_status()?);
/// sensors.close_head_rgbd_camera()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SensorController {
    core: Arc<SessionCore>,
    runtime: Arc<SensorRuntime>,
}

impl SensorController {
    pub(crate) fn new(core: Arc<SessionCore>, runtime: Arc<SensorRuntime>) -> Self {
        Self { core, runtime }
    }

    /// 取表锁并检查会话可用
    fn table(&self, operation: &'static str) -> Result<MutexGuard<'_, SensorTable>> {
        let table = self.runtime.table.lock();
        self.core.require_connected(operation)?;
        if !table.active {
            return Err(RobotError::invalid_state(
                operation,
                "sensor controller belongs to a closed connection",
            ));
        }
        Ok(table)
    }

    fn transport(&self) -> &dyn Transport {
        self.core.transport.as_ref()
    }

    // ==================== 设备 ====================

    /// 打开设备
    ///
    /// 已打开时返回 `AlreadyOpen` 状态（不是错误）。
    pub fn open(&self, device: SensorDevice) -> Result<Status> {
        let mut table = self.table("open")?;
        if table.open[device.index()] {
            debug!("{} already open", device);
            return Ok(Status::already_open(format!("{device} already open")));
        }
        self.transport().open_device(device).inspect_err(|e| {
            warn!("Failed to open {}: {}", device, e);
        })?;
        table.open[device.index()] = true;
        info!("{} opened", device);
        Ok(Status::ok())
    }

    /// 关闭设备（级联退订）
    ///
    /// # 返回
    ///
    /// - `Ok(report)`: 设备已关闭；`report.failures` 列出退订失败的通道，
    ///   已关闭时 `report.status` 为 `AlreadyClosed`
    ///
    /// # 错误
    ///
    /// - `CascadeClose`: 设备级关闭失败，设备保持打开，但所有通道均已退订
    pub fn close(&self, device: SensorDevice) -> Result<OperationReport> {
        let mut table = self.table("close")?;
        if !table.open[device.index()] {
            debug!("{} already closed", device);
            return Ok(OperationReport::new(Status::already_closed(format!(
                "{device} already closed"
            ))));
        }
        let failures = self
            .runtime
            .close_locked(&mut table, self.transport(), device)?;
        let mut report = OperationReport::ok();
        report.extend(failures);
        Ok(report)
    }

    /// 关闭所有打开的设备
    ///
    /// 所有失败（通道退订和设备关闭）都收集到报告中；关闭失败的设备保持打开。
    pub fn close_all(&self) -> Result<OperationReport> {
        let mut table = self.table("close_all")?;
        let failures = self.runtime.close_all_locked(&mut table, self.transport());
        let mut report = OperationReport::ok();
        report.extend(failures);
        Ok(report)
    }

    pub fn is_open(&self, device: SensorDevice) -> bool {
        self.runtime.table.lock().open[device.index()]
    }

    // ==================== 通道 ====================

    /// 订阅通道
    ///
    /// 已订阅时只替换回调，计数器清零。
    ///
    /// # 错误
    ///
    /// - `InvalidState`: 所属设备未打开
    /// - `Transport`: 链路订阅失败，通道保持未订阅
    pub fn subscribe(&self, channel: SensorChannel, handler: Arc<dyn SampleHandler>) -> Result<Status> {
        let mut table = self.table("subscribe")?;
        self.subscribe_locked(&mut table, channel, handler, "subscribe")
    }

    fn subscribe_locked(
        &self,
        table: &mut SensorTable,
        channel: SensorChannel,
        handler: Arc<dyn SampleHandler>,
        operation: &'static str,
    ) -> Result<Status> {
        let device = channel.device();
        if !table.open[device.index()] {
            return Err(RobotError::invalid_state(
                operation,
                format!("{device} must be opened before subscribing to {channel}"),
            ));
        }

        let gate = self.runtime.gate(channel);
        gate.attach(handler);
        if table.subscribed[channel.index()] {
            debug!("{} handler replaced", channel);
            return Ok(Status::ok_with("handler replaced"));
        }

        let forwarder: Arc<dyn SampleHandler> = Arc::new(GateForwarder(gate.clone()));
        if let Err(e) = self.transport().subscribe(channel, forwarder) {
            gate.detach();
            warn!("Failed to subscribe {}: {}", channel, e);
            return Err(e.into());
        }
        table.subscribed[channel.index()] = true;
        info!("{} subscribed", channel);
        Ok(Status::ok())
    }

    /// 退订通道
    ///
    /// 未订阅时返回 `AlreadyClosed` 状态。链路退订失败时，
    /// 回调仍被卸载、通道仍被标记为未订阅，错误照常返回。
    pub fn unsubscribe(&self, channel: SensorChannel) -> Result<Status> {
        let mut table = self.table("unsubscribe")?;
        self.unsubscribe_checked(&mut table, channel)
    }

    fn unsubscribe_checked(&self, table: &mut SensorTable, channel: SensorChannel) -> Result<Status> {
        if !table.subscribed[channel.index()] {
            return Ok(Status::already_closed(format!("{channel} not subscribed")));
        }
        self.runtime
            .unsubscribe_locked(table, self.transport(), channel)?;
        info!("{} unsubscribed", channel);
        Ok(Status::ok())
    }

    /// 切换通道订阅
    ///
    /// 已订阅则退订；否则在所属设备已打开时用 `handler` 订阅。
    /// 连续两次调用（期间设备未关闭）恢复原状态。
    ///
    /// # 返回
    ///
    /// 切换后的订阅状态
    pub fn toggle(&self, channel: SensorChannel, handler: Arc<dyn SampleHandler>) -> Result<SubscriptionState> {
        let mut table = self.table("toggle")?;
        if table.subscribed[channel.index()] {
            self.unsubscribe_checked(&mut table, channel)?;
            Ok(SubscriptionState::Unsubscribed)
        } else {
            self.subscribe_locked(&mut table, channel, handler, "toggle")?;
            Ok(SubscriptionState::Subscribed)
        }
    }

    pub fn is_subscribed(&self, channel: SensorChannel) -> bool {
        self.runtime.table.lock().subscribed[channel.index()]
    }

    /// 本次订阅以来收到的样本数
    pub fn sample_count(&self, channel: SensorChannel) -> u64 {
        self.runtime.gate(channel).delivered()
    }

    /// 状态快照
    pub fn show_status(&self) -> Result<SensorStatus> {
        let table = self.table("show_status")?;
        Ok(SensorStatus {
            devices: SensorDevice::ALL
                .iter()
                .map(|&device| DeviceStatus {
                    device,
                    open: table.open[device.index()],
                })
                .collect(),
            channels: SensorChannel::ALL
                .iter()
                .map(|&channel| ChannelStatus {
                    channel,
                    subscribed: table.subscribed[channel.index()],
                    samples: self.runtime.gate(channel).delivered(),
                })
                .collect(),
        })
    }
}

macro_rules! device_functions {
    ($($device:ident => $open:ident, $close:ident;)*) => {
        impl SensorController {
            $(
                #[doc = concat!("打开 `", stringify!($device), "`，见 [`SensorController::open`]")]
                pub fn $open(&self) -> Result<Status> {
                    self.open(SensorDevice::$device)
                }

                #[doc = concat!("关闭 `", stringify!($device), "`，见 [`SensorController::close`]")]
                pub fn $close(&self) -> Result<OperationReport> {
                    self.close(SensorDevice::$device)
                }
            )*
        }
    };
}

macro_rules! channel_toggles {
    ($($channel:ident => $toggle:ident;)*) => {
        impl SensorController {
            $(
                #[doc = concat!("切换 `", stringify!($channel), "` 订阅，见 [`SensorController::toggle`]")]
                pub fn $toggle<H>(&self, handler: H) -> Result<SubscriptionState>
                where
                    H: SampleHandler + 'static,
                {
                    self.toggle(SensorChannel::$channel, Arc::new(handler))
                }
            )*
        }
    };
}

device_functions! {
    Lidar => open_lidar, close_lidar;
    HeadRgbdCamera => open_head_rgbd_camera, close_head_rgbd_camera;
    WaistRgbdCamera => open_waist_rgbd_camera, close_waist_rgbd_camera;
    TrinocularCamera => open_trinocular_camera, close_trinocular_camera;
}

channel_toggles! {
    LidarImu => toggle_lidar_imu_subscription;
    LidarPointCloud => toggle_lidar_point_cloud_subscription;
    HeadRgbdColorImage => toggle_head_rgbd_color_image_subscription;
    HeadRgbdDepthImage => toggle_head_rgbd_depth_image_subscription;
    HeadRgbdColorCameraInfo => toggle_head_rgbd_color_camera_info_subscription;
    HeadRgbdDepthCameraInfo => toggle_head_rgbd_depth_camera_info_subscription;
    WaistRgbdColorImage => toggle_waist_rgbd_color_image_subscription;
    WaistRgbdDepthImage => toggle_waist_rgbd_depth_image_subscription;
    WaistRgbdColorCameraInfo => toggle_waist_rgbd_color_camera_info_subscription;
    WaistRgbdDepthCameraInfo => toggle_waist_rgbd_depth_camera_info_subscription;
    TrinocularImage => toggle_trinocular_image_subscription;
}

impl fmt::Debug for SensorController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.runtime.table.lock();
        f.debug_struct("SensorController")
            .field("open", &table.open)
            .field("subscribed", &table.subscribed)
            .field("active", &table.active)
            .finish()
    }
}
