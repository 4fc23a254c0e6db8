//! 遥测模块
//!
//! 配置了导出地址时，通过 OTLP/HTTP 批量导出 span，全部采样。

use crate::config::TelemetryConfig;
use anyhow::Context;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::trace::{Sampler, Tracer, TracerProvider};
use opentelemetry_sdk::{runtime, Resource};
use tracing::{debug, warn};

/// 遥测句柄
///
/// 持有 tracer provider，进程退出前调用 [`Telemetry::shutdown`] 刷新未导出的 span。
#[derive(Debug, Default)]
pub struct Telemetry {
    provider: Option<TracerProvider>,
    tracer: Option<Tracer>,
}

impl Telemetry {
    /// 初始化遥测
    ///
    /// 未配置导出地址时返回未启用的句柄。必须在 tokio 运行时内调用。
    pub fn init(config: &TelemetryConfig) -> anyhow::Result<Self> {
        let Some(endpoint) = &config.endpoint else {
            return Ok(Self::disabled());
        };

        let exporter = SpanExporter::builder()
            .with_http()
            .with_endpoint(endpoint.clone())
            .build()
            .with_context(|| format!("创建 OTLP 导出器失败: {endpoint}"))?;

        let resource = Resource::new(vec![KeyValue::new(
            "service.name",
            config.service_name.clone(),
        )]);

        #[allow(deprecated)]
        let provider = TracerProvider::builder()
            .with_batch_exporter(exporter, runtime::Tokio)
            .with_config(
                opentelemetry_sdk::trace::Config::default()
                    .with_sampler(Sampler::AlwaysOn)
                    .with_resource(resource),
            )
            .build();

        let tracer = provider.tracer(config.service_name.clone());
        global::set_tracer_provider(provider.clone());

        Ok(Self {
            provider: Some(provider),
            tracer: Some(tracer),
        })
    }

    /// 未启用的遥测
    pub fn disabled() -> Self {
        Self::default()
    }

    /// 是否启用
    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    /// 供日志系统使用的 tracer
    pub fn tracer(&self) -> Option<Tracer> {
        self.tracer.clone()
    }

    /// 刷新并关闭导出器
    pub fn shutdown(self) {
        if let Some(provider) = self.provider {
            match provider.shutdown() {
                Ok(()) => debug!("遥测导出器已关闭"),
                Err(e) => warn!("关闭遥测导出器失败: {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_without_endpoint() {
        let telemetry = Telemetry::init(&TelemetryConfig::default()).unwrap();
        assert!(!telemetry.is_enabled());
        assert!(telemetry.tracer().is_none());
        telemetry.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_enabled_with_endpoint() {
        let config = TelemetryConfig {
            endpoint: Some("http://127.0.0.1:4318/v1/traces".to_string()),
            service_name: "test".to_string(),
        };

        let telemetry = Telemetry::init(&config).unwrap();
        assert!(telemetry.is_enabled());
        assert!(telemetry.tracer().is_some());
    }
}
