//! HTTP 服务模块
//!
//! 提供探针路由、示例路由和请求日志

use axum::{middleware::from_fn, routing::get, Router};
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};

pub mod handlers;
pub mod middleware;
pub mod server;

pub use server::{HttpService, HttpServiceConfig, SERVICE_NAME};

/// 构建路由
///
/// 开发模式额外注册 `/debug/panic` 并放开跨域限制。
/// panic 由 [`CatchPanicLayer`] 转换为 500 响应，请求日志位于最外层。
pub fn build_router(dev_mode: bool) -> Router {
    let mut router = Router::new()
        .route("/ready", get(handlers::ready))
        .route("/alive", get(handlers::alive))
        .route("/", get(handlers::root))
        .route("/trace", get(handlers::trace));

    if dev_mode {
        router = router
            .route("/debug/panic", get(handlers::debug_panic))
            .layer(CorsLayer::permissive());
    }

    router
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(middleware::request_log))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn get_status(router: Router, uri: &str) -> StatusCode {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        router.oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_routes() {
        for uri in ["/ready", "/alive", "/", "/trace"] {
            assert_eq!(get_status(build_router(false), uri).await, StatusCode::OK, "{uri}");
        }
        assert_eq!(
            get_status(build_router(false), "/missing").await,
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_panic_route_only_in_dev_mode() {
        assert_eq!(
            get_status(build_router(false), "/debug/panic").await,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(build_router(true), "/debug/panic").await,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_request_id_header() {
        let request = Request::builder().uri("/alive").body(Body::empty()).unwrap();
        let response = build_router(false).oneshot(request).await.unwrap();

        let id = response
            .headers()
            .get(middleware::REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap();
        assert!(uuid::Uuid::parse_str(id).is_ok());
    }
}
