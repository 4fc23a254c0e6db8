//! 配置数据结构定义
//!
//! 定义应用程序的配置结构体和验证逻辑

use crate::core::supervisor::SupervisorConfig;
use crate::signal::SUPPORTED_SIGNALS;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

/// 主配置结构
///
/// 所有配置段都有默认值，空文件也是合法配置。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// 全局配置项
    #[serde(default)]
    pub global: GlobalConfig,
    /// HTTP 监听服务配置
    #[serde(default)]
    pub http: HttpConfig,
    /// RPC 监听服务配置
    #[serde(default)]
    pub rpc: RpcConfig,
    /// 遥测配置
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// 全局配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 开发模式：彩色日志、调试路由
    #[serde(default)]
    pub dev_mode: bool,
    /// 是否输出 JSON 格式日志
    #[serde(default = "default_json_logs")]
    pub json_logs: bool,
    /// 关闭阶段收集通知的期限（秒），不设置时无限等待
    #[serde(default)]
    pub shutdown_timeout_seconds: Option<u64>,
    /// 触发关闭的信号
    #[serde(default = "crate::signal::default_signals")]
    pub signals: Vec<String>,
    /// 按模块覆盖日志级别，例如 `hyper = "warn"`
    #[serde(default)]
    pub module_levels: BTreeMap<String, String>,
}

/// HTTP 监听服务配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpConfig {
    /// 是否启用
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 绑定地址
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// 监听端口
    #[serde(default = "default_http_port")]
    pub port: u16,
    /// 优雅关闭宽限期（秒）
    #[serde(default = "default_grace_period")]
    pub grace_period_seconds: u64,
}

/// RPC 监听服务配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcConfig {
    /// 是否启用
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 绑定地址
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// 监听端口
    #[serde(default = "default_rpc_port")]
    pub port: u16,
    /// 优雅关闭宽限期（秒）
    #[serde(default = "default_grace_period")]
    pub grace_period_seconds: u64,
}

/// 遥测配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryConfig {
    /// OTLP/HTTP 导出地址，不设置时不导出
    #[serde(default)]
    pub endpoint: Option<String>,
    /// 上报的服务名称
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

/// 命令行覆盖项
///
/// `serve` 命令的参数，合并进配置文件后配置即冻结。
#[derive(Debug, Clone, Default)]
pub struct ServeOverrides {
    pub log_level: Option<String>,
    pub dev_mode: bool,
    pub otel_addr: Option<String>,
    pub http_addr: Option<SocketAddr>,
    pub rpc_addr: Option<SocketAddr>,
    pub no_rpc: bool,
    pub grace_period: Option<u64>,
    pub shutdown_timeout: Option<u64>,
}

// 默认值函数
fn default_log_level() -> String {
    "info".to_string()
}
fn default_json_logs() -> bool {
    true
}
fn default_enabled() -> bool {
    true
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_rpc_port() -> u16 {
    50051
}
fn default_grace_period() -> u64 {
    5
}
fn default_service_name() -> String {
    "cloudnative".to_string()
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            dev_mode: false,
            json_logs: default_json_logs(),
            shutdown_timeout_seconds: None,
            signals: crate::signal::default_signals(),
            module_levels: BTreeMap::new(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            bind_address: default_bind_address(),
            port: default_http_port(),
            grace_period_seconds: default_grace_period(),
        }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            bind_address: default_bind_address(),
            port: default_rpc_port(),
            grace_period_seconds: default_grace_period(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            service_name: default_service_name(),
        }
    }
}

impl HttpConfig {
    /// 监听地址
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    /// 宽限期
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_seconds)
    }
}

impl RpcConfig {
    /// 监听地址
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    /// 宽限期
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_seconds)
    }
}

impl Config {
    /// 合并命令行覆盖项
    pub fn apply_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(level) = &overrides.log_level {
            self.global.log_level = level.clone();
        }
        if overrides.dev_mode {
            self.global.dev_mode = true;
            self.global.json_logs = false;
        }
        if let Some(endpoint) = &overrides.otel_addr {
            self.telemetry.endpoint = Some(endpoint.clone());
        }
        if let Some(addr) = overrides.http_addr {
            self.http.bind_address = addr.ip().to_string();
            self.http.port = addr.port();
        }
        if let Some(addr) = overrides.rpc_addr {
            self.rpc.bind_address = addr.ip().to_string();
            self.rpc.port = addr.port();
        }
        if overrides.no_rpc {
            self.rpc.enabled = false;
        }
        if let Some(seconds) = overrides.grace_period {
            self.http.grace_period_seconds = seconds;
            self.rpc.grace_period_seconds = seconds;
        }
        if let Some(seconds) = overrides.shutdown_timeout {
            self.global.shutdown_timeout_seconds = Some(seconds);
        }
    }

    /// 监督器配置
    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            shutdown_timeout: self.global.shutdown_timeout_seconds.map(Duration::from_secs),
        }
    }
}

/// 配置验证函数
///
/// # 参数
/// * `config` - 要验证的配置
///
/// # 返回
/// * `Result<(), String>` - 验证结果，错误时返回错误信息
pub fn validate_config(config: &Config) -> Result<(), String> {
    // 验证日志级别
    let valid_log_levels = ["debug", "info", "warn", "error"];
    if !valid_log_levels.contains(&config.global.log_level.as_str()) {
        return Err(format!(
            "无效的日志级别: {}，支持的级别: {:?}",
            config.global.log_level, valid_log_levels
        ));
    }

    for (module, level) in &config.global.module_levels {
        if module.trim().is_empty() {
            return Err("模块日志级别的模块名不能为空".to_string());
        }
        if !valid_log_levels.contains(&level.as_str()) {
            return Err(format!(
                "模块 {module} 的日志级别无效: {level}，支持的级别: {valid_log_levels:?}"
            ));
        }
    }

    if config.global.shutdown_timeout_seconds == Some(0) {
        return Err("关闭期限不能为0".to_string());
    }

    // 验证信号
    if config.global.signals.is_empty() {
        return Err("至少需要配置一个信号".to_string());
    }
    for signal in &config.global.signals {
        if !SUPPORTED_SIGNALS.contains(&signal.to_ascii_uppercase().as_str()) {
            return Err(format!(
                "不支持的信号: {signal}，支持的信号: {SUPPORTED_SIGNALS:?}"
            ));
        }
    }

    if !config.http.enabled && !config.rpc.enabled {
        return Err("HTTP 与 RPC 服务至少启用一个".to_string());
    }

    if config.http.enabled {
        validate_listener("HTTP", &config.http.bind_address, config.http.port, config.http.grace_period_seconds)?;
    }
    if config.rpc.enabled {
        validate_listener("RPC", &config.rpc.bind_address, config.rpc.port, config.rpc.grace_period_seconds)?;
    }

    // 验证遥测地址
    if let Some(endpoint) = &config.telemetry.endpoint {
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(format!("遥测导出地址格式无效: {endpoint}"));
        }
    }
    if config.telemetry.service_name.trim().is_empty() {
        return Err("遥测服务名称不能为空".to_string());
    }

    Ok(())
}

fn validate_listener(name: &str, bind_address: &str, port: u16, grace_period: u64) -> Result<(), String> {
    if bind_address.trim().is_empty() {
        return Err(format!("{name} 服务绑定地址不能为空"));
    }
    if port == 0 {
        return Err(format!("无效的 {name} 服务端口: {port}，端口不能为0"));
    }
    if grace_period == 0 {
        return Err(format!("{name} 服务宽限期不能为0秒"));
    }
    Ok(())
}
