//! 命令处理逻辑
//!
//! 实现各种CLI命令的处理逻辑

use crate::cli::args::{Args, Commands, OutputFormat};
use crate::config::{self, Config, ConfigLoader, ServeOverrides, TomlConfigLoader};
use crate::core::app;
use crate::error::{ConfigError, Result};
use crate::logging::{LogConfig, LoggingSystem};
use crate::telemetry::Telemetry;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

/// 命令处理器trait
#[async_trait]
pub trait Command: Send + Sync {
    /// 执行命令，返回进程退出码
    async fn execute(&self, args: &Args) -> Result<i32>;
}

/// 版本命令
pub struct VersionCommand;

#[async_trait]
impl Command for VersionCommand {
    async fn execute(&self, args: &Args) -> Result<i32> {
        if let Commands::Version { format } = &args.command {
            println!("{}", render_version(*format)?);
        }
        Ok(0)
    }
}

/// 渲染版本信息
fn render_version(format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Json => {
            let version_info = serde_json::json!({
                "name": crate::APP_NAME,
                "version": crate::VERSION,
                "description": crate::APP_DESCRIPTION
            });
            serde_json::to_string_pretty(&version_info)?
        }
        OutputFormat::Text => format!(
            "{} v{}\n{}",
            crate::APP_NAME,
            crate::VERSION,
            crate::APP_DESCRIPTION
        ),
    })
}

/// 验证配置命令
pub struct ValidateCommand;

#[async_trait]
impl Command for ValidateCommand {
    async fn execute(&self, args: &Args) -> Result<i32> {
        if let Commands::Validate {
            config_path,
            verbose,
        } = &args.command
        {
            let config_file = config_path
                .clone()
                .or_else(|| args.config.clone())
                .unwrap_or_else(config::get_default_config_path);

            self.validate_config_file(&config_file, *verbose).await?;
        }
        Ok(0)
    }
}

impl ValidateCommand {
    /// 验证配置文件
    async fn validate_config_file(&self, config_path: &Path, verbose: bool) -> Result<()> {
        println!("验证配置文件: {}", config_path.display());

        let loader = TomlConfigLoader::new(true);
        let config = loader.load_from_file(config_path).await?;

        if verbose {
            println!("配置验证通过！");
            println!("{}", describe_config(&config));
        } else {
            println!("✓ 配置文件验证通过");
            println!("✓ 启用 {} 个服务", enabled_services(&config).len());
        }

        Ok(())
    }
}

/// 按启动顺序列出启用的服务
fn enabled_services(config: &Config) -> Vec<&'static str> {
    let mut services = vec![crate::signal::SERVICE_NAME];
    if config.http.enabled {
        services.push(crate::web::SERVICE_NAME);
    }
    if config.rpc.enabled {
        services.push(crate::rpc::SERVICE_NAME);
    }
    services
}

/// 生成配置摘要
fn describe_config(config: &Config) -> String {
    let mut lines = vec![
        "全局配置:".to_string(),
        format!("  日志级别: {}", config.global.log_level),
        format!("  开发模式: {}", if config.global.dev_mode { "是" } else { "否" }),
        format!("  监听信号: {}", config.global.signals.join(", ")),
        match config.global.shutdown_timeout_seconds {
            Some(seconds) => format!("  关闭期限: {seconds}秒"),
            None => "  关闭期限: 无限等待".to_string(),
        },
        "服务配置:".to_string(),
    ];

    for (i, name) in enabled_services(config).iter().enumerate() {
        let detail = match *name {
            crate::web::SERVICE_NAME => format!(
                "{} (宽限期 {}秒)",
                config.http.listen_addr(),
                config.http.grace_period_seconds
            ),
            crate::rpc::SERVICE_NAME => format!(
                "{} (宽限期 {}秒)",
                config.rpc.listen_addr(),
                config.rpc.grace_period_seconds
            ),
            _ => "操作系统信号".to_string(),
        };
        lines.push(format!("  {}. {name}: {detail}", i + 1));
    }

    lines.push(format!(
        "遥测: {}",
        config.telemetry.endpoint.as_deref().unwrap_or("未启用")
    ));
    lines.join("\n")
}

/// 加载配置文件并合并命令行覆盖项
///
/// 覆盖后的配置需要重新验证，文件本身合法不代表合并结果合法。
async fn load_serve_config(args: &Args, overrides: &ServeOverrides) -> Result<Config> {
    let mut config = config::load_config(args.config.as_deref()).await?;
    config.apply_overrides(overrides);
    config::validate_config(&config).map_err(ConfigError::ValidationError)?;
    Ok(config)
}

/// 启动服务命令
pub struct ServeCommand;

#[async_trait]
impl Command for ServeCommand {
    async fn execute(&self, args: &Args) -> Result<i32> {
        let Some(overrides) = args.serve_overrides() else {
            return Ok(0);
        };

        let config = Arc::new(load_serve_config(args, &overrides).await?);

        // 遥测失败要等日志就绪后再报告
        let telemetry = Telemetry::init(&config.telemetry);
        let tracer = telemetry.as_ref().ok().and_then(Telemetry::tracer);
        LoggingSystem::setup_logging_with_tracer(LogConfig::from_config(&config), tracer)?;

        let telemetry = match telemetry {
            Ok(telemetry) => telemetry,
            Err(e) => {
                error!("初始化遥测失败: {e:#}");
                return Ok(1);
            }
        };

        info!(
            "{} v{} 启动 (开发模式: {})",
            crate::APP_NAME,
            crate::VERSION,
            config.global.dev_mode
        );

        let errors = app::serve(config).await;
        telemetry.shutdown();

        Ok(app::exit_code(errors))
    }
}
