//! Service Lifecycle - 云原生服务运行器
//!
//! 按固定顺序启动一组长期运行的服务，等待第一个关闭触发，
//! 然后协调关闭所有服务并汇总错误：
//! - 服务契约与监督器（启动、回滚、等待、停止）
//! - 操作系统信号监听
//! - HTTP 探针服务与按行 JSON-RPC 服务
//! - TOML 配置与命令行覆盖
//! - 结构化日志与 OpenTelemetry 链路导出

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod rpc;
pub mod signal;
pub mod telemetry;
pub mod web;

// 重新导出主要类型
pub use config::Config;
pub use crate::core::{Notification, NotificationSink, Service, Supervisor, SupervisorConfig};
pub use error::{FailureKind, LifecycleError, ServiceError};

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
