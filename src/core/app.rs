//! 应用程序核心逻辑
//!
//! 包含命令分发，以及 `serve` 的服务编排与退出码约定

use crate::cli::args::{Args, Commands};
use crate::cli::commands::{Command, ServeCommand, ValidateCommand, VersionCommand};
use crate::config::Config;
use crate::core::service::Service;
use crate::core::supervisor::Supervisor;
use crate::logging::{LogConfig, LoggingSystem};
use crate::rpc::{RpcService, RpcServiceConfig};
use crate::signal::SignalService;
use crate::web::{HttpService, HttpServiceConfig};
use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

/// 应用程序主函数，返回进程退出码
pub async fn main() -> Result<i32> {
    let args = Args::parse();

    // serve 根据配置文件自行初始化日志
    if !matches!(args.command, Commands::Serve { .. }) {
        let log_config = LogConfig {
            level: args.log_level.map(Into::into).unwrap_or(log::LevelFilter::Warn),
            ..Default::default()
        };
        LoggingSystem::setup_logging(log_config).context("初始化日志系统失败")?;
    }

    execute_command(&args).await
}

/// 执行CLI命令
pub async fn execute_command(args: &Args) -> Result<i32> {
    let result = match &args.command {
        Commands::Serve { .. } => ServeCommand.execute(args).await,
        Commands::Validate { .. } => ValidateCommand.execute(args).await,
        Commands::Version { .. } => VersionCommand.execute(args).await,
    };
    result.map_err(|e| anyhow::anyhow!(e))
}

/// 按启动顺序构建服务：信号监听、HTTP、RPC
pub fn build_services(config: &Config) -> Vec<Arc<dyn Service>> {
    let mut services: Vec<Arc<dyn Service>> =
        vec![Arc::new(SignalService::new(config.global.signals.clone()))];

    if config.http.enabled {
        services.push(Arc::new(HttpService::new(HttpServiceConfig::from_config(config))));
    }
    if config.rpc.enabled {
        services.push(Arc::new(RpcService::new(RpcServiceConfig::from_config(config))));
    }
    services
}

/// 启动所有服务并等待关闭，返回累计的错误数
pub async fn serve(config: Arc<Config>) -> usize {
    run_services(build_services(&config), &config).await
}

/// 监督给定服务的完整生命周期，返回累计的错误数
///
/// 启动失败时只报告启动与回滚阶段的错误；否则等待关闭触发并收齐所有通知。
pub async fn run_services(services: Vec<Arc<dyn Service>>, config: &Config) -> usize {
    let names: Vec<String> = services.iter().map(|s| s.name().to_string()).collect();
    info!(services = ?names, "启动服务...");

    let mut supervisor = Supervisor::with_config(services, config.supervisor_config());

    let mut errors = supervisor.run().await;
    if errors.is_empty() {
        errors = supervisor.wait().await;
    }

    for err in &errors {
        error!(kind = ?err.kind(), "{err}");
    }
    if errors.is_empty() {
        info!("所有服务已正常退出");
    } else {
        error!(count = errors.len(), "服务退出时发生错误");
    }
    errors.len()
}

/// 错误数转换为进程退出码
pub fn exit_code(errors: usize) -> i32 {
    errors.min(255) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_saturates() {
        assert_eq!(exit_code(0), 0);
        assert_eq!(exit_code(3), 3);
        assert_eq!(exit_code(255), 255);
        assert_eq!(exit_code(1000), 255);
    }

    #[test]
    fn test_build_services_order() {
        let mut config = Config::default();
        let names: Vec<String> = build_services(&config)
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(names, vec!["signal", "http", "rpc"]);

        config.rpc.enabled = false;
        assert_eq!(build_services(&config).len(), 2);
    }
}
