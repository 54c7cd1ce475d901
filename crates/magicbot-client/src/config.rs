//! 会话配置
//!
//! 支持代码构造，也支持从 TOML 加载：
//!
//! ```toml
//! endpoint = "192.168.54.111"
//! rpc_timeout_ms = 5000
//! publish_period_ms = 2
//! motion_timeout_ms = 10000
//!
//! [head_limits]
//! max_shake_rad = 0.5
//! max_nod_rad = 0.5
//! ```

use crate::error::{Result, RobotError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 默认 RPC 超时（毫秒）
pub const DEFAULT_RPC_TIMEOUT_MS: u64 = 5000;
/// 默认底层发布周期（毫秒，500Hz）
pub const DEFAULT_PUBLISH_PERIOD_MS: u64 = 2;
/// 高层运动请求的默认超时（毫秒）
pub const DEFAULT_MOTION_TIMEOUT_MS: u64 = 10_000;

/// 头部运动角度限制（弧度）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadLimits {
    pub max_shake_rad: f64,
    pub max_nod_rad: f64,
}

impl Default for HeadLimits {
    fn default() -> Self {
        Self {
            max_shake_rad: 0.5,
            max_nod_rad: 0.5,
        }
    }
}

impl HeadLimits {
    /// 钳位到限制范围内
    ///
    /// # 返回
    ///
    /// `(shake, nod, 是否发生了钳位)`
    pub fn clamp(&self, shake: f64, nod: f64) -> (f64, f64, bool) {
        let clamp = |v: f64, limit: f64| if v.is_nan() { 0.0 } else { v.clamp(-limit, limit) };
        let (s, n) = (clamp(shake, self.max_shake_rad), clamp(nod, self.max_nod_rad));
        (s, n, s != shake || n != nod)
    }
}

/// 会话配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// 本地绑定地址（`initialize()` 未显式传入时使用）
    pub endpoint: Option<String>,
    pub rpc_timeout_ms: u64,
    /// 底层周期发布器的初始周期
    pub publish_period_ms: u64,
    /// `set_gait` / `execute_trick` / `head_move` 未指定超时时使用
    pub motion_timeout_ms: u64,
    /// 关闭发布线程时等待其退出的上限
    pub join_timeout_ms: u64,
    pub head_limits: HeadLimits,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            rpc_timeout_ms: DEFAULT_RPC_TIMEOUT_MS,
            publish_period_ms: DEFAULT_PUBLISH_PERIOD_MS,
            motion_timeout_ms: DEFAULT_MOTION_TIMEOUT_MS,
            join_timeout_ms: 1000,
            head_limits: HeadLimits::default(),
        }
    }
}

impl SessionConfig {
    /// 从 TOML 文本解析并校验
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| RobotError::Config(e.message().to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件加载
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| RobotError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rpc_timeout_ms == 0 {
            return Err(RobotError::Config("rpc_timeout_ms must be >= 1".into()));
        }
        if self.publish_period_ms == 0 {
            return Err(RobotError::Config("publish_period_ms must be >= 1".into()));
        }
        if self.motion_timeout_ms == 0 {
            return Err(RobotError::Config("motion_timeout_ms must be >= 1".into()));
        }
        let limits = [self.head_limits.max_shake_rad, self.head_limits.max_nod_rad];
        if limits.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(RobotError::Config(
                "head limits must be finite and non-negative".into(),
            ));
        }
        Ok(())
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn motion_timeout(&self) -> Duration {
        Duration::from_millis(self.motion_timeout_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| RobotError::Config(e.to_string()))
    }
}
