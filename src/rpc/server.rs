//! RPC 监听服务
//!
//! 主任务接受连接并为每个连接派生受跟踪的任务，停止任务在取消后
//! 等待所有连接在宽限期内结束。

use super::protocol::handle_line;
use crate::config::Config;
use crate::core::notification::NotificationSink;
use crate::core::service::Service;
use crate::error::ServiceError;
use anyhow::Context;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LinesCodec};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

/// 服务名称
pub const SERVICE_NAME: &str = "rpc";

/// 单行请求的最大长度
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// RPC 服务配置
#[derive(Debug, Clone)]
pub struct RpcServiceConfig {
    /// 监听地址，`host:port`
    pub listen_addr: String,
    /// 优雅关闭宽限期
    pub grace_period: Duration,
}

impl RpcServiceConfig {
    /// 从应用配置构建
    pub fn from_config(config: &Config) -> Self {
        Self {
            listen_addr: config.rpc.listen_addr(),
            grace_period: config.rpc.grace_period(),
        }
    }
}

/// RPC 监听服务
#[derive(Debug)]
pub struct RpcService {
    config: RpcServiceConfig,
    local_addr: OnceLock<SocketAddr>,
}

impl RpcService {
    /// 创建新的 RPC 服务
    pub fn new(config: RpcServiceConfig) -> Self {
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
impl Service for RpcService {
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

        info!(parent: &span, address = %addr, "RPC 服务开始监听");

        let tracker = TaskTracker::new();
        let force = CancellationToken::new();
        let grace_period = self.config.grace_period;

        let accept_token = token.clone();
        let accept_tracker = tracker.clone();
        let accept_force = force.clone();
        let accept_sink = sink.clone();
        tokio::spawn(
            async move {
                let result = accept_loop(listener, &accept_token, &accept_tracker, &accept_force).await;
                accept_tracker.close();

                match &result {
                    Ok(()) => info!("RPC 服务停止接受连接"),
                    Err(e) => error!("RPC 服务异常结束: {e}"),
                }
                accept_sink.send(result.into());
            }
            .instrument(span.clone()),
        );

        tokio::spawn(
            async move {
                token.cancelled().await;
                info!(connections = tracker.len(), "正在关闭 RPC 服务...");

                match tokio::time::timeout(grace_period, tracker.wait()).await {
                    Ok(()) => {
                        info!("RPC 服务关闭完成");
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
                    handle_connection(stream, token.clone(), force.clone())
                        .instrument(info_span!("connection", peer = %peer)),
                );
            }
        }
    }
}

/// 逐行处理请求；取消后不再读取新请求，强制关闭时放弃正在写出的响应
async fn handle_connection(stream: TcpStream, token: CancellationToken, force: CancellationToken) {
    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));

    loop {
        let line = tokio::select! {
            _ = token.cancelled() => break,
            line = framed.next() => line,
        };

        let line = match line {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                warn!("读取请求失败: {e}");
                break;
            }
            None => break,
        };

        let response = handle_line(&line);
        let encoded = match serde_json::to_string(&response) {
            Ok(encoded) => encoded,
            Err(e) => {
                error!("响应序列化失败: {e}");
                break;
            }
        };

        tokio::select! {
            _ = force.cancelled() => break,
            sent = framed.send(encoded) => {
                if let Err(e) = sent {
                    warn!("发送响应失败: {e}");
                    break;
                }
            }
        }
    }

    debug!("连接已关闭");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::notification;
    use crate::error::FailureKind;
    use crate::core::notification::Notification;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::time::{sleep, timeout};

    fn test_config(listen_addr: &str) -> RpcServiceConfig {
        RpcServiceConfig {
            listen_addr: listen_addr.to_string(),
            grace_period: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_bind_failure_is_start_error() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let service = RpcService::new(test_config(&occupied.local_addr().unwrap().to_string()));
        let (sink, mut queue) = notification::channel();

        let err = service
            .start(CancellationToken::new(), Span::none(), sink)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::Start);
        assert_eq!(err.service(), Some(SERVICE_NAME));
        assert!(queue.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_trace_over_tcp_and_shutdown() {
        let service = RpcService::new(test_config("127.0.0.1:0"));
        let (sink, mut queue) = notification::channel();
        let token = CancellationToken::new();

        service.start(token.clone(), Span::none(), sink).await.unwrap();
        let addr = service.local_addr().unwrap();

        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        writer
            .write_all(b"{\"jsonrpc\":\"2.0\",\"method\":\"trace\",\"params\":{\"bar\":\"a\",\"baz\":\"b\"},\"id\":7}\n")
            .await
            .unwrap();

        let mut lines = BufReader::new(reader).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        let response: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(response["result"]["msg"], "ab");
        assert_eq!(response["id"], 7);

        // 空闲连接在取消后关闭，两条通知均正常
        token.cancel();
        for _ in 0..2 {
            let n = timeout(Duration::from_secs(2), queue.recv())
                .await
                .unwrap()
                .unwrap();
            assert!(!n.is_failure());
        }
        assert!(lines.next_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_grace_period_elapsed_closes_blocked_connection() {
        let service = RpcService::new(RpcServiceConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            grace_period: Duration::from_millis(200),
        });
        let (sink, mut queue) = notification::channel();
        let token = CancellationToken::new();

        service.start(token.clone(), Span::none(), sink).await.unwrap();
        let stream = TcpStream::connect(service.local_addr().unwrap()).await.unwrap();
        let (mut reader, mut writer) = stream.into_split();

        // 只写不读，服务端写响应时阻塞在发送缓冲区上
        let payload = "x".repeat(30_000);
        let request = format!(
            "{{\"jsonrpc\":\"2.0\",\"method\":\"trace\",\"params\":{{\"bar\":\"{payload}\",\"baz\":\"{payload}\"}},\"id\":1}}\n"
        );
        let flood = tokio::spawn(async move {
            for _ in 0..400 {
                if writer.write_all(request.as_bytes()).await.is_err() {
                    break;
                }
            }
        });
        sleep(Duration::from_secs(1)).await;
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

        // 连接已被服务端关闭，读取很快结束
        let drained = timeout(
            Duration::from_secs(5),
            tokio::io::copy(&mut reader, &mut tokio::io::sink()),
        )
        .await;
        assert!(drained.is_ok());
        flood.abort();
    }
}
