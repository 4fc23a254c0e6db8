//! 核心模块
//!
//! 服务契约、通知通道、监督器以及应用程序编排

pub mod app;
pub mod notification;
pub mod service;
pub mod supervisor;

// 重新导出主要类型
pub use app::{execute_command, exit_code, serve};
pub use notification::{Notification, NotificationQueue, NotificationSink};
pub use service::Service;
pub use supervisor::{LifecycleState, Supervisor, SupervisorConfig};
