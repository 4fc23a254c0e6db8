//! 日志系统模块
//!
//! 提供结构化日志配置和初始化，可选接入 OpenTelemetry 链路导出

use crate::config::Config;
use log::LevelFilter;
use opentelemetry_sdk::trace::Tracer;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, OnceLock};
use tracing_subscriber::{filter::Directive, fmt, prelude::*, registry, EnvFilter, Layer};

/// 全局日志初始化状态
#[derive(Debug, Default)]
struct GlobalLoggingState {
    /// 是否已初始化
    initialized: bool,
    /// 初始化失败时的错误信息
    init_error: Option<String>,
    /// 当前配置
    current_config: Option<LogConfig>,
}

/// 全局日志状态管理器
static GLOBAL_LOGGING_STATE: OnceLock<Mutex<GlobalLoggingState>> = OnceLock::new();

fn global_state() -> MutexGuard<'static, GlobalLoggingState> {
    GLOBAL_LOGGING_STATE
        .get_or_init(|| Mutex::new(GlobalLoggingState::default()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 日志配置结构
#[derive(Debug, Clone, PartialEq)]
pub struct LogConfig {
    /// 日志级别
    pub level: LevelFilter,
    /// 是否使用JSON格式
    pub json_format: bool,
    /// 模块级别日志控制
    pub module_levels: HashMap<String, LevelFilter>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::Info,
            json_format: false,
            module_levels: HashMap::new(),
        }
    }
}

impl LogConfig {
    /// 从应用配置构建
    ///
    /// 无法识别的日志级别回退为 info，无法识别的模块级别被忽略；
    /// 配置文件加载时已经验证过级别。
    pub fn from_config(config: &Config) -> Self {
        let module_levels = config
            .global
            .module_levels
            .iter()
            .filter_map(|(module, level)| {
                LevelFilter::from_str(level)
                    .ok()
                    .map(|level| (module.clone(), level))
            })
            .collect();

        Self {
            level: LevelFilter::from_str(&config.global.log_level).unwrap_or(LevelFilter::Info),
            json_format: config.global.json_logs && !config.global.dev_mode,
            module_levels,
        }
    }
}

/// 日志系统管理器
#[derive(Debug)]
pub struct LoggingSystem {
    config: LogConfig,
}

impl LoggingSystem {
    /// 初始化日志系统
    ///
    /// 进程内只初始化一次，后续调用直接返回新的句柄。
    pub fn setup_logging(config: LogConfig) -> anyhow::Result<Self> {
        Self::setup_logging_with_tracer(config, None)
    }

    /// 初始化日志系统，并把 span 导出到给定的 OpenTelemetry tracer
    pub fn setup_logging_with_tracer(
        config: LogConfig,
        tracer: Option<Tracer>,
    ) -> anyhow::Result<Self> {
        let mut state = global_state();
        if state.initialized {
            return match &state.init_error {
                None => Ok(Self { config }),
                Some(e) => Err(anyhow::anyhow!("日志系统之前初始化失败: {e}")),
            };
        }

        let result = Self::perform_initialization(&config, tracer);

        state.initialized = true;
        state.current_config = Some(config.clone());
        state.init_error = result.as_ref().err().map(|e| e.to_string());

        result.map(|()| Self { config })
    }

    /// 当前句柄持有的配置
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// 执行实际的日志系统初始化
    fn perform_initialization(config: &LogConfig, tracer: Option<Tracer>) -> anyhow::Result<()> {
        // log crate 到 tracing 的桥接
        Self::init_log_tracer()?;
        Self::init_tracing_subscriber(config, tracer)
    }

    /// 初始化 LogTracer
    fn init_log_tracer() -> anyhow::Result<()> {
        use tracing_log::LogTracer;

        static LOG_TRACER_INIT: OnceLock<Result<(), String>> = OnceLock::new();

        let result = LOG_TRACER_INIT.get_or_init(|| LogTracer::init().map_err(|e| e.to_string()));

        result
            .as_ref()
            .map_err(|e| anyhow::anyhow!("LogTracer初始化失败: {e}"))?;
        Ok(())
    }

    /// 初始化 tracing subscriber
    fn init_tracing_subscriber(config: &LogConfig, tracer: Option<Tracer>) -> anyhow::Result<()> {
        let mut env_filter = EnvFilter::from_default_env()
            .add_directive(Self::convert_level_to_directive(config.level));

        for (module, level) in &config.module_levels {
            match format!("{module}={}", Self::level_to_string(*level)).parse::<Directive>() {
                Ok(directive) => env_filter = env_filter.add_directive(directive),
                Err(e) => eprintln!("忽略无效的模块日志级别 {module}: {e}"),
            }
        }

        let otel_layer = tracer.map(|tracer| tracing_opentelemetry::layer().with_tracer(tracer));

        let fmt_layer = if config.json_format {
            fmt::layer()
                .json()
                .with_timer(fmt::time::ChronoUtc::rfc_3339())
                .with_current_span(true)
                .with_span_list(false)
                .boxed()
        } else {
            fmt::layer()
                .with_timer(fmt::time::ChronoUtc::rfc_3339())
                .with_ansi(true)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .boxed()
        };

        let result = registry()
            .with(env_filter)
            .with(otel_layer)
            .with(fmt_layer)
            .try_init();

        match result {
            Ok(()) => {
                tracing::debug!("日志系统初始化完成: {config:?}");
                Ok(())
            }
            Err(e) => {
                let error_msg = e.to_string();
                if error_msg.contains(
                    "attempted to set a logger after the logging system was already initialized",
                ) || error_msg.contains("a global default trace dispatcher has already been set")
                {
                    // LogTracer 已单独初始化，或测试进程中已设置过 subscriber
                    tracing::debug!("日志系统已经初始化过了");
                    Ok(())
                } else {
                    Err(anyhow::anyhow!("tracing subscriber初始化失败: {error_msg}"))
                }
            }
        }
    }

    /// 将 log::LevelFilter 转换为 tracing 的指令
    fn convert_level_to_directive(level: LevelFilter) -> Directive {
        use tracing_subscriber::filter::LevelFilter as TracingLevel;
        let level = match level {
            LevelFilter::Off => TracingLevel::OFF,
            LevelFilter::Error => TracingLevel::ERROR,
            LevelFilter::Warn => TracingLevel::WARN,
            LevelFilter::Info => TracingLevel::INFO,
            LevelFilter::Debug => TracingLevel::DEBUG,
            LevelFilter::Trace => TracingLevel::TRACE,
        };
        Directive::from(level)
    }

    /// 将 log::LevelFilter 转换为字符串
    fn level_to_string(level: LevelFilter) -> &'static str {
        match level {
            LevelFilter::Off => "off",
            LevelFilter::Error => "error",
            LevelFilter::Warn => "warn",
            LevelFilter::Info => "info",
            LevelFilter::Debug => "debug",
            LevelFilter::Trace => "trace",
        }
    }

    /// 检查日志系统是否已初始化
    pub fn is_initialized() -> bool {
        global_state().initialized
    }

    /// 获取当前日志配置（如果已初始化）
    pub fn current_config() -> Option<LogConfig> {
        global_state().current_config.clone()
    }

    /// 重置日志系统状态（主要用于测试）
    #[cfg(test)]
    pub fn reset_for_testing() {
        let mut state = global_state();
        state.initialized = false;
        state.init_error = None;
        state.current_config = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_log_config_from_config() {
        let mut config = Config::default();
        config.global.log_level = "debug".to_string();

        let log_config = LogConfig::from_config(&config);
        assert_eq!(log_config.level, LevelFilter::Debug);
        assert!(log_config.json_format);

        config.global.dev_mode = true;
        assert!(!LogConfig::from_config(&config).json_format);
    }

    #[test]
    fn test_log_config_module_levels_from_config() {
        let mut config = Config::default();
        config
            .global
            .module_levels
            .insert("hyper".to_string(), "warn".to_string());

        let log_config = LogConfig::from_config(&config);
        assert_eq!(log_config.module_levels.len(), 1);
        assert_eq!(log_config.module_levels["hyper"], LevelFilter::Warn);
    }

    #[test]
    fn test_level_directives() {
        assert_eq!(
            LoggingSystem::convert_level_to_directive(LevelFilter::Warn).to_string(),
            "warn"
        );
        assert_eq!(LoggingSystem::level_to_string(LevelFilter::Trace), "trace");
    }

    #[test]
    #[serial]
    fn test_logging_system_single_initialization() {
        LoggingSystem::reset_for_testing();

        let config = LogConfig::default();
        assert!(LoggingSystem::setup_logging(config.clone()).is_ok());
        assert!(LoggingSystem::is_initialized());

        // 第二次调用不会重复初始化
        let mut other = config.clone();
        other.json_format = true;
        let system = LoggingSystem::setup_logging(other.clone()).unwrap();
        assert_eq!(system.config(), &other);
        assert_eq!(LoggingSystem::current_config(), Some(config));
    }

    #[test]
    #[serial]
    fn test_module_level_filtering() {
        LoggingSystem::reset_for_testing();

        let mut config = LogConfig::default();
        config
            .module_levels
            .insert("service_lifecycle::rpc".to_string(), LevelFilter::Debug);
        config.module_levels.insert("hyper".to_string(), LevelFilter::Warn);

        assert!(LoggingSystem::setup_logging(config).is_ok());
    }
}
