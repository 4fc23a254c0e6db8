//! 错误处理模块
//!
//! 定义应用程序的统一错误类型，以及服务生命周期中产生的三类失败

use std::time::Duration;
use thiserror::Error;

/// Service Lifecycle 应用程序的主要错误类型
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON序列化/反序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件解析错误
    #[error("配置文件解析失败: {0}")]
    ParseError(String),

    /// 配置验证错误
    #[error("配置验证失败: {0}")]
    ValidationError(String),

    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVarError { var: String },
}

/// 失败类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// 服务无法启动
    Start,
    /// 服务主任务异常结束
    Runtime,
    /// 服务停止流程失败
    Shutdown,
    /// 等待通知超时
    Unresponsive,
    /// 通知通道提前关闭
    Disconnected,
}

/// 服务生命周期错误
///
/// 服务通过通知通道上报的错误值。`service` 字段由服务自己填写，
/// 监督器不追踪通知来源。
#[derive(Error, Debug)]
pub enum ServiceError {
    /// 服务启动失败，未产生任何并发任务
    #[error("{service} 启动失败: {source}")]
    Start {
        service: String,
        #[source]
        source: anyhow::Error,
    },

    /// 服务主任务异常结束
    #[error("{service} 运行失败: {source}")]
    Runtime {
        service: String,
        #[source]
        source: anyhow::Error,
    },

    /// 服务停止流程失败
    #[error("{service} 停止失败: {source}")]
    Shutdown {
        service: String,
        #[source]
        source: anyhow::Error,
    },

    /// 在关闭期限内没有收齐通知
    #[error("等待 {waited:?} 后仍缺少 {missing} 个服务通知")]
    Unresponsive { missing: usize, waited: Duration },

    /// 所有通知发送端已释放，但仍有通知未到达
    #[error("通知通道已关闭，仍缺少 {missing} 个服务通知")]
    Disconnected { missing: usize },
}

impl ServiceError {
    /// 创建启动失败错误
    pub fn start(service: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Start {
            service: service.into(),
            source: source.into(),
        }
    }

    /// 创建运行失败错误
    pub fn runtime(service: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Runtime {
            service: service.into(),
            source: source.into(),
        }
    }

    /// 创建停止失败错误
    pub fn shutdown(service: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Shutdown {
            service: service.into(),
            source: source.into(),
        }
    }

    /// 获取失败类别
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Start { .. } => FailureKind::Start,
            Self::Runtime { .. } => FailureKind::Runtime,
            Self::Shutdown { .. } => FailureKind::Shutdown,
            Self::Unresponsive { .. } => FailureKind::Unresponsive,
            Self::Disconnected { .. } => FailureKind::Disconnected,
        }
    }

    /// 获取上报错误的服务名称
    pub fn service(&self) -> Option<&str> {
        match self {
            Self::Start { service, .. }
            | Self::Runtime { service, .. }
            | Self::Shutdown { service, .. } => Some(service),
            Self::Unresponsive { .. } | Self::Disconnected { .. } => None,
        }
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, LifecycleError>;
