//! HTTP 路由处理函数
//!
//! 探针、示例页面与链路追踪演示

use axum::response::Json;
use serde::Serialize;
use tracing::{debug, error, info, info_span, Instrument};

/// 探针响应
#[derive(Debug, Serialize)]
pub struct ProbeResponse {
    pub status: &'static str,
}

/// 欢迎信息响应
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// 链路追踪演示响应
#[derive(Debug, Serialize)]
pub struct TraceResponse {
    /// 本次请求创建的 span 名称，按嵌套顺序排列
    pub spans: Vec<&'static str>,
    /// 事件时间（RFC 3339）
    pub timestamp: String,
}

/// 就绪探针
pub async fn ready() -> Json<ProbeResponse> {
    Json(ProbeResponse { status: "ready" })
}

/// 存活探针
pub async fn alive() -> Json<ProbeResponse> {
    Json(ProbeResponse { status: "alive" })
}

/// 首页
pub async fn root() -> Json<MessageResponse> {
    info!("Foobar here");
    Json(MessageResponse {
        message: "Hello World".to_string(),
    })
}

/// 生成嵌套 span 并在其中记录事件
///
/// 配置了遥测导出地址时，这些 span 会被导出到 OTLP 收集器。
pub async fn trace() -> Json<TraceResponse> {
    let foo = info_span!("foo");
    async {
        info!(event = "custom event", "Something happening right now");

        let bar = info_span!("bar", custom_attribute = "foobar");
        async {
            error!(error = "example error", "Bar eats foo");
        }
        .instrument(bar)
        .await;
    }
    .instrument(foo)
    .await;

    Json(TraceResponse {
        spans: vec!["foo", "bar"],
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// 主动触发 panic，仅在开发模式下注册
pub async fn debug_panic() -> Json<ProbeResponse> {
    debug!("Let's panic");
    panic!("I have been asked to panic");
}
