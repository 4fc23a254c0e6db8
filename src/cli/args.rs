//! 命令行参数定义
//!
//! 使用clap定义应用程序的命令行接口

use crate::config::ServeOverrides;
use clap::{Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Service Lifecycle - 云原生服务运行器
#[derive(Parser, Debug, Clone)]
#[command(
    name = "service-lifecycle",
    version = crate::VERSION,
    about = crate::APP_DESCRIPTION,
    long_about = None
)]
pub struct Args {
    /// 配置文件路径
    #[arg(
        short,
        long,
        global = true,
        value_name = "FILE",
        help = "配置文件路径",
        env = "SERVICE_LIFECYCLE_CONFIG"
    )]
    pub config: Option<PathBuf>,

    /// 日志级别，不指定时使用配置文件中的级别
    #[arg(
        short,
        long,
        global = true,
        value_enum,
        help = "日志级别",
        env = "SERVICE_LIFECYCLE_LOG_LEVEL"
    )]
    pub log_level: Option<LogLevel>,

    /// 子命令
    #[command(subcommand)]
    pub command: Commands,
}

/// 日志级别枚举
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum LogLevel {
    /// 调试级别
    Debug,
    /// 信息级别
    Info,
    /// 警告级别
    Warn,
    /// 错误级别
    Error,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// 子命令定义
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// 启动所有服务，直到收到信号或服务异常
    Serve {
        /// 开发模式
        #[arg(short, long, help = "开发模式：彩色日志、调试路由")]
        dev: bool,

        /// OpenTelemetry 导出地址
        #[arg(
            long,
            value_name = "URL",
            help = "OTLP/HTTP 导出地址",
            env = "SERVICE_LIFECYCLE_OTEL_ADDR"
        )]
        otel_addr: Option<String>,

        /// HTTP 监听地址
        #[arg(long, value_name = "ADDR", help = "HTTP 监听地址，例如 0.0.0.0:8080")]
        http_addr: Option<SocketAddr>,

        /// RPC 监听地址
        #[arg(long, value_name = "ADDR", help = "RPC 监听地址，例如 0.0.0.0:50051")]
        rpc_addr: Option<SocketAddr>,

        /// 不启动 RPC 服务
        #[arg(long, help = "不启动 RPC 服务")]
        no_rpc: bool,

        /// 优雅关闭宽限期（秒）
        #[arg(long, value_name = "SECONDS", help = "优雅关闭宽限期（秒）")]
        grace_period: Option<u64>,

        /// 关闭阶段等待通知的期限（秒）
        #[arg(long, value_name = "SECONDS", help = "关闭阶段等待服务通知的期限（秒）")]
        shutdown_timeout: Option<u64>,
    },

    /// 验证配置文件
    Validate {
        /// 配置文件路径
        #[arg(value_name = "FILE", help = "配置文件路径")]
        config_path: Option<PathBuf>,

        /// 是否显示详细信息
        #[arg(short, long, help = "显示详细信息")]
        verbose: bool,
    },

    /// 显示版本信息
    Version {
        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },
}

/// 输出格式枚举
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum OutputFormat {
    /// 文本格式
    Text,
    /// JSON格式
    Json,
}

impl Args {
    /// `serve` 命令的配置覆盖项，其它命令返回 `None`
    pub fn serve_overrides(&self) -> Option<ServeOverrides> {
        match &self.command {
            Commands::Serve {
                dev,
                otel_addr,
                http_addr,
                rpc_addr,
                no_rpc,
                grace_period,
                shutdown_timeout,
            } => Some(ServeOverrides {
                log_level: self.log_level.map(|level| level.to_string()),
                dev_mode: *dev,
                otel_addr: otel_addr.clone(),
                http_addr: *http_addr,
                rpc_addr: *rpc_addr,
                no_rpc: *no_rpc,
                grace_period: *grace_period,
                shutdown_timeout: *shutdown_timeout,
            }),
            _ => None,
        }
    }
}
