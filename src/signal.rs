//! 信号监听服务
//!
//! 订阅配置的操作系统信号，收到信号时上报第一条通知作为关闭触发，
//! 收到取消请求后注销监听并上报第二条通知。

use crate::core::notification::NotificationSink;
use crate::core::service::Service;
use crate::error::ServiceError;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Instrument, Span};

#[cfg(unix)]
use signal_hook::consts::{SIGHUP, SIGINT, SIGQUIT, SIGTERM, SIGUSR1, SIGUSR2};
#[cfg(unix)]
use signal_hook_tokio::Signals;

/// 服务名称
pub const SERVICE_NAME: &str = "signal";

/// 可订阅的信号名称
pub const SUPPORTED_SIGNALS: &[&str] = &["SIGINT", "SIGTERM", "SIGHUP", "SIGQUIT", "SIGUSR1", "SIGUSR2"];

/// 默认订阅的信号
pub fn default_signals() -> Vec<String> {
    vec!["SIGINT".to_string(), "SIGTERM".to_string()]
}

/// 信号名称转换为信号值
#[cfg(unix)]
pub fn signal_number(name: &str) -> Option<i32> {
    match name.to_ascii_uppercase().as_str() {
        "SIGINT" => Some(SIGINT),
        "SIGTERM" => Some(SIGTERM),
        "SIGHUP" => Some(SIGHUP),
        "SIGQUIT" => Some(SIGQUIT),
        "SIGUSR1" => Some(SIGUSR1),
        "SIGUSR2" => Some(SIGUSR2),
        _ => None,
    }
}

#[cfg(unix)]
fn signal_name(signal: i32) -> &'static str {
    match signal {
        SIGINT => "SIGINT",
        SIGTERM => "SIGTERM",
        SIGHUP => "SIGHUP",
        SIGQUIT => "SIGQUIT",
        SIGUSR1 => "SIGUSR1",
        SIGUSR2 => "SIGUSR2",
        _ => "UNKNOWN",
    }
}

/// 信号监听服务
#[derive(Debug, Clone)]
pub struct SignalService {
    signals: Vec<String>,
}

impl SignalService {
    /// 创建新的信号监听服务
    pub fn new(signals: Vec<String>) -> Self {
        Self { signals }
    }

    /// 订阅的信号名称
    pub fn signals(&self) -> &[String] {
        &self.signals
    }
}

impl Default for SignalService {
    fn default() -> Self {
        Self::new(default_signals())
    }
}

#[async_trait]
impl Service for SignalService {
    fn name(&self) -> &str {
        SERVICE_NAME
    }

    #[cfg(unix)]
    async fn start(
        &self,
        token: CancellationToken,
        span: Span,
        sink: NotificationSink,
    ) -> Result<(), ServiceError> {
        use futures::stream::StreamExt;

        let mut numbers = Vec::with_capacity(self.signals.len());
        for name in &self.signals {
            let number = signal_number(name).ok_or_else(|| {
                ServiceError::start(SERVICE_NAME, anyhow::anyhow!("不支持的信号: {name}"))
            })?;
            numbers.push(number);
        }

        let mut signals =
            Signals::new(&numbers).map_err(|e| ServiceError::start(SERVICE_NAME, e))?;
        let handle = signals.handle();
        info!(parent: &span, signals = ?self.signals, "开始监听系统信号");

        tokio::spawn(
            async move {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("收到取消请求，停止监听信号");
                        sink.done();
                    }
                    received = signals.next() => {
                        match received {
                            Some(signal) => {
                                info!(signal = signal_name(signal), "接收到信号，开始优雅关闭...")
                            }
                            None => debug!("信号流已结束"),
                        }
                        sink.done();
                        token.cancelled().await;
                    }
                }

                handle.close();
                debug!("信号监听已注销");
                sink.done();
            }
            .instrument(span),
        );

        Ok(())
    }

    #[cfg(not(unix))]
    async fn start(
        &self,
        token: CancellationToken,
        span: Span,
        sink: NotificationSink,
    ) -> Result<(), ServiceError> {
        if let Some(name) = self
            .signals
            .iter()
            .find(|name| !SUPPORTED_SIGNALS.contains(&name.to_ascii_uppercase().as_str()))
        {
            return Err(ServiceError::start(
                SERVICE_NAME,
                anyhow::anyhow!("不支持的信号: {name}"),
            ));
        }
        info!(parent: &span, "非Unix系统，仅监听 Ctrl+C");

        tokio::spawn(
            async move {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("收到取消请求，停止监听信号");
                        sink.done();
                    }
                    received = tokio::signal::ctrl_c() => {
                        match received {
                            Ok(()) => info!("接收到 Ctrl+C，开始优雅关闭..."),
                            Err(e) => tracing::warn!("监听 Ctrl+C 失败: {e}"),
                        }
                        sink.done();
                        token.cancelled().await;
                    }
                }
                sink.done();
            }
            .instrument(span),
        );

        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::notification;
    use crate::error::FailureKind;
    use serial_test::serial;
    use std::time::Duration;
    use tokio::time::timeout;

    #[test]
    fn test_signal_names() {
        for name in SUPPORTED_SIGNALS {
            let number = signal_number(name).expect("known signal");
            assert_eq!(signal_name(number), *name);
        }
        assert_eq!(signal_number("sigterm"), Some(SIGTERM));
        assert_eq!(signal_number("SIGKILL"), None);
    }

    #[tokio::test]
    async fn test_unknown_signal_fails_to_start() {
        let service = SignalService::new(vec!["SIGBOGUS".to_string()]);
        let (sink, mut queue) = notification::channel();

        let err = service
            .start(CancellationToken::new(), Span::none(), sink)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::Start);
        assert_eq!(err.service(), Some(SERVICE_NAME));
        // 启动失败不得产生任何通知
        assert!(queue.recv().await.is_none());
    }

    #[tokio::test]
    #[serial]
    async fn test_cancel_emits_two_notifications() {
        let service = SignalService::new(vec!["SIGUSR2".to_string()]);
        let (sink, mut queue) = notification::channel();
        let token = CancellationToken::new();

        service.start(token.clone(), Span::none(), sink).await.unwrap();
        token.cancel();

        for _ in 0..2 {
            let n = timeout(Duration::from_secs(1), queue.recv()).await.unwrap();
            assert!(!n.unwrap().is_failure());
        }
        assert!(queue.recv().await.is_none());
    }

    #[tokio::test]
    #[serial]
    async fn test_signal_triggers_before_cancel() {
        let service = SignalService::new(vec!["SIGUSR2".to_string()]);
        let (sink, mut queue) = notification::channel();
        let token = CancellationToken::new();

        service.start(token.clone(), Span::none(), sink).await.unwrap();
        signal_hook::low_level::raise(SIGUSR2).unwrap();

        let trigger = timeout(Duration::from_secs(2), queue.recv()).await.unwrap();
        assert!(!trigger.unwrap().is_failure());

        // 第二条通知要等到取消后才发送
        assert!(timeout(Duration::from_millis(50), queue.recv()).await.is_err());

        token.cancel();
        let second = timeout(Duration::from_secs(1), queue.recv()).await.unwrap();
        assert!(!second.unwrap().is_failure());
    }
}
