//! HTTP 监听服务
//!
//! 启动时绑定端口，主任务接受连接并为每个连接派生受跟踪的任务，
//! 停止任务在取消后等待连接在宽限期内排空，超时则强制断开所有连接。

use super::build_router;
use crate::config::Config;
use crate::core::notification::NotificationSink;
use crate::core::service::Service;
use crate::error::ServiceError;
use anyhow::Context;
use async_trait::async_trait;
use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use hyper_util::service::TowerToHyperService;
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

/// 服务名称
pub const SERVICE_NAME: &str = "http";

/// HTTP 服务配置
#[derive(Debug, Clone)]
pub struct HttpServiceConfig {
    /// 监听地址，`host:port`
    pub listen_addr: String,
    /// 优雅关闭宽限期
    pub grace_period: Duration,
    /// 开发模式
    pub dev_mode: bool,
}

impl HttpServiceConfig {
    /// 从应用配置构建
    pub fn from_config(config: &Config) -> Self {
        Self {
            listen_addr: config.http.listen_addr(),
            grace_period: config.http.grace_period(),
            dev_mode: config.global.dev_mode,
        }
    }
}

/// HTTP 监听服务
#[derive(Debug)]
pub struct HttpService {
    config: HttpServiceConfig,
    local_addr: OnceLock<SocketAddr>,
}

impl HttpService {
    /// 创建新的 HTTP 服务
    pub fn new(config: HttpServiceConfig) -> Self {
        Self {
            config,
            local_addr: OnceLock::new(),
        }
    }

    /// 实际监听地址，启动成功后可用
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }
}

#[async_trait]
impl Service for HttpService {
    fn name(&self) -> &str {
        SERVICE_NAME
    }

    async fn start(
        &self,
        token: CancellationToken,
        span: Span,
        sink: NotificationSink,
    ) -> Result<(), ServiceError> {
        let listener = TcpListener::bind(&self.config.listen_addr)
            .await
            .with_context(|| format!("绑定 {} 失败", self.config.listen_addr))
            .map_err(|e| ServiceError::start(SERVICE_NAME, e))?;
        let addr = listener
            .local_addr()
            .map_err(|e| ServiceError::start(SERVICE_NAME, e))?;
        let _ = self.local_addr.set(addr);

        info!(parent: &span, address = %addr, dev_mode = self.config.dev_mode, "HTTP 服务开始监听");

        let router = build_router(self.config.dev_mode);
        let tracker = TaskTracker::new();
        let force = CancellationToken::new();
        let grace_period = self.config.grace_period;

        let accept_token = token.clone();
        let accept_tracker = tracker.clone();
        let accept_force = force.clone();
        let accept_sink = sink.clone();
        tokio::spawn(
            async move {
                let result =
                    accept_loop(listener, router, &accept_token, &accept_tracker, &accept_force).await;
                accept_tracker.close();

                match &result {
                    Ok(()) => info!("HTTP 服务停止接受连接"),
                    Err(e) => error!("HTTP 服务异常结束: {e}"),
                }
                accept_sink.send(result.into());
            }
            .instrument(span.clone()),
        );

        tokio::spawn(
            async move {
                token.cancelled().await;
                info!(connections = tracker.len(), "正在关闭 HTTP 服务...");

                match tokio::time::timeout(grace_period, tracker.wait()).await {
                    Ok(()) => {
                        info!("HTTP 服务关闭完成");
                        sink.done();
                    }
                    Err(_) => {
                        warn!(connections = tracker.len(), "宽限期已过，强制断开剩余连接");
                        force.cancel();
                        tracker.wait().await;
                        sink.fail(ServiceError::shutdown(
                            SERVICE_NAME,
                            anyhow::anyhow!("grace period elapsed ({grace_period:?})"),
                        ));
                    }
                }
            }
            .instrument(span),
        );

        Ok(())
    }
}

/// 接受连接直到取消；接受失败即结束
async fn accept_loop(
    listener: TcpListener,
    router: Router,
    token: &CancellationToken,
    tracker: &TaskTracker,
    force: &CancellationToken,
) -> Result<(), ServiceError> {
    loop {
        tokio::select! {
            _ = token.cancelled() => return Ok(()),
            accepted = listener.accept() => {
                let (stream, peer) = accepted.map_err(|e| ServiceError::runtime(SERVICE_NAME, e))?;
                debug!(peer = %peer, "接受新连接");
                tracker.spawn(
                    serve_connection(stream, router.clone(), token.clone(), force.clone())
                        .instrument(info_span!("connection", peer = %peer)),
                );
            }
        }
    }
}

/// 在单个连接上提供服务
///
/// 取消后通知连接优雅关闭：空闲连接立即断开，进行中的请求继续完成。
/// 强制关闭时直接丢弃连接。
async fn serve_connection(
    stream: TcpStream,
    router: Router,
    token: CancellationToken,
    force: CancellationToken,
) {
    let builder = Builder::new(TokioExecutor::new());
    let connection = builder.serve_connection(
        TokioIo::new(stream),
        TowerToHyperService::new(router),
    );
    tokio::pin!(connection);

    let result = tokio::select! {
        result = connection.as_mut() => result,
        _ = token.cancelled() => {
            connection.as_mut().graceful_shutdown();
            tokio::select! {
                result = connection.as_mut() => result,
                _ = force.cancelled() => {
                    debug!("连接被强制断开");
                    return;
                }
            }
        }
    };

    if let Err(e) = result {
        debug!("连接异常结束: {e}");
    }
    debug!("连接已关闭");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::notification::{self, Notification};
    use crate::error::FailureKind;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::time::{sleep, timeout};

    fn test_config(listen_addr: &str) -> HttpServiceConfig {
        HttpServiceConfig {
            listen_addr: listen_addr.to_string(),
            grace_period: Duration::from_secs(1),
            dev_mode: false,
        }
    }

    #[tokio::test]
    async fn test_bind_failure_is_start_error() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = occupied.local_addr().unwrap();
        let service = HttpService::new(test_config(&addr.to_string()));
        let (sink, mut queue) = notification::channel();

        let err = service
            .start(CancellationToken::new(), Span::none(), sink)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::Start);
        assert!(service.local_addr().is_none());
        assert!(queue.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_emits_two_notifications() {
        let service = HttpService::new(test_config("127.0.0.1:0"));
        let (sink, mut queue) = notification::channel();
        let token = CancellationToken::new();

        service.start(token.clone(), Span::none(), sink).await.unwrap();
        assert!(service.local_addr().is_some());

        token.cancel();
        for _ in 0..2 {
            let n = timeout(Duration::from_secs(2), queue.recv())
                .await
                .unwrap()
                .unwrap();
            assert!(!n.is_failure());
        }
        assert!(queue.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_serves_probes_until_cancelled() {
        let service = HttpService::new(test_config("127.0.0.1:0"));
        let (sink, _queue) = notification::channel();
        let token = CancellationToken::new();

        service.start(token.clone(), Span::none(), sink).await.unwrap();
        let addr = service.local_addr().unwrap();

        let body: serde_json::Value = reqwest::get(format!("http://{addr}/ready"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ready");

        token.cancel();
    }

    #[tokio::test]
    async fn test_grace_period_elapsed_closes_inflight_connection() {
        let service = HttpService::new(HttpServiceConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            grace_period: Duration::from_millis(200),
            dev_mode: false,
        });
        let (sink, mut queue) = notification::channel();
        let token = CancellationToken::new();

        service.start(token.clone(), Span::none(), sink).await.unwrap();
        let mut stream = TcpStream::connect(service.local_addr().unwrap()).await.unwrap();

        // 请求头未发送完，连接无法优雅结束
        stream
            .write_all(b"GET /alive HTTP/1.1\r\nHost: x\r\n")
            .await
            .unwrap();
        sleep(Duration::from_millis(100)).await;
        token.cancel();

        let mut failures = Vec::new();
        for _ in 0..2 {
            let n = timeout(Duration::from_secs(2), queue.recv())
                .await
                .unwrap()
                .unwrap();
            if let Notification::Failed(err) = n {
                failures.push(err);
            }
        }
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind(), FailureKind::Shutdown);
        assert!(failures[0].to_string().contains("grace period elapsed"));

        // 报告停止后连接已断开，补全的请求不会得到响应
        let _ = stream.write_all(b"\r\n").await;
        let mut buf = [0u8; 256];
        let read = timeout(Duration::from_secs(2), stream.read(&mut buf))
            .await
            .unwrap();
        assert!(matches!(read, Ok(0) | Err(_)), "{read:?}");
    }
}
