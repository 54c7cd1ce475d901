//! 日志初始化
//!
//! SDK 内部统一使用 `tracing` 输出日志。应用程序可以自行安装 subscriber，
//! 也可以调用 [`init_logging`] / [`init_logger!`](crate::init_logger) 使用默认配置：
//!
//! - `RUST_LOG` 环境变量优先，未设置时使用传入的默认指令
//! - 依赖 `log` crate 的第三方库日志经 `tracing-log` 桥接到同一个 subscriber

use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log directive {directive:?}: {message}")]
    InvalidDirective { directive: String, message: String },

    /// 已经安装过全局 logger / subscriber
    #[error("Global logger already installed: {0}")]
    AlreadyInstalled(String),
}

/// 安装默认的日志 subscriber
///
/// # 参数
///
/// - `default_directive`: `RUST_LOG` 未设置时使用的过滤指令，例如 `"magicbot_client=info"`
///
/// # 错误
///
/// - `InvalidDirective`: 生效的指令（`RUST_LOG` 或默认指令）无法解析，错误中携带该指令
/// - `AlreadyInstalled`: 进程内已经安装过全局 subscriber
pub fn init_logging(default_directive: &str) -> Result<(), LoggingError> {
    let directive = select_directive(std::env::var(EnvFilter::DEFAULT_ENV).ok(), default_directive);
    let filter = parse_filter(&directive)?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| LoggingError::AlreadyInstalled(e.to_string()))?;

    tracing_log::LogTracer::builder()
        .with_max_level(log::LevelFilter::Trace)
        .init()
        .map_err(|e| LoggingError::AlreadyInstalled(e.to_string()))
}

/// 非空的 `RUST_LOG` 优先于默认指令
fn select_directive(env_value: Option<String>, default_directive: &str) -> String {
    env_value
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default_directive.to_string())
}

fn parse_filter(directive: &str) -> Result<EnvFilter, LoggingError> {
    EnvFilter::try_new(directive).map_err(|e| LoggingError::InvalidDirective {
        directive: directive.to_string(),
        message: e.to_string(),
    })
}

/// 以 `info` 级别初始化 SDK 日志（失败时打印到 stderr，不 panic）
///
/// ```rust,no_run
/// magicbot_sdk::init_logger!();
/// // 或指定过滤指令
/// magicbot_sdk::init_logger!("magicbot_client=debug");
/// ```
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger!("magicbot_client=info,magicbot_transport=info")
    };
    ($directive:expr) => {
        if let Err(e) = $crate::logging::init_logging($directive) {
            eprintln!("⚠️  Failed to initialize logging: {}", e);
        }
    };
}
