//! 服务监督器
//!
//! 按固定顺序启动一组服务，等待第一个关闭触发（操作系统信号或服务异常），
//! 然后统一取消所有服务，并按数量收集剩余通知。
//!
//! 通知计数约定：每个已启动服务在整个生命周期内恰好发送两条通知，
//! 因此 N 个服务共 2N 条。监督器只依赖这个总数，不追踪通知来源。

use crate::core::notification::{self, NotificationQueue, NotificationSink};
use crate::core::service::Service;
use crate::error::ServiceError;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn};

/// 监督器生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// 尚未启动
    NotStarted,
    /// 所有服务已启动
    Running,
    /// 所有服务已停止，通知已收齐
    Stopped,
    /// 启动失败，已启动的服务已回滚
    RolledBack,
}

/// 监督器配置
#[derive(Debug, Clone, Default)]
pub struct SupervisorConfig {
    /// 每个收集阶段的期限；`None` 表示无限等待
    pub shutdown_timeout: Option<Duration>,
}

/// 服务监督器
pub struct Supervisor {
    /// 按启动顺序排列的服务
    services: Vec<Arc<dyn Service>>,
    /// 每个已成功启动服务对应一个取消令牌
    tokens: Vec<CancellationToken>,
    /// 通知发送端，仅在启动阶段持有
    sink: Option<NotificationSink>,
    /// 通知接收端
    queue: NotificationQueue,
    /// 已接收的通知数
    received: usize,
    /// 当前状态
    state: LifecycleState,
    /// 配置
    config: SupervisorConfig,
}

impl Supervisor {
    /// 创建新的监督器
    ///
    /// # Panics
    ///
    /// 服务列表为空时 panic，这是配置错误而非运行时错误。
    pub fn new(services: Vec<Arc<dyn Service>>) -> Self {
        Self::with_config(services, SupervisorConfig::default())
    }

    /// 使用指定配置创建监督器
    ///
    /// # Panics
    ///
    /// 服务列表为空时 panic。
    pub fn with_config(services: Vec<Arc<dyn Service>>, config: SupervisorConfig) -> Self {
        assert!(!services.is_empty(), "至少需要一个服务");

        let (sink, queue) = notification::channel();
        Self {
            tokens: Vec::with_capacity(services.len()),
            services,
            sink: Some(sink),
            queue,
            received: 0,
            state: LifecycleState::NotStarted,
            config,
        }
    }

    /// 当前状态
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// 已成功启动（持有取消令牌）的服务数量
    pub fn started_count(&self) -> usize {
        self.tokens.len()
    }

    /// 至今接收到的通知总数
    pub fn notifications_received(&self) -> usize {
        self.received
    }

    /// 按顺序启动所有服务
    ///
    /// 全部启动成功时返回空列表。某个服务启动失败时，取消其刚创建的令牌，
    /// 回滚所有已启动的服务并收齐它们的通知后返回错误列表。
    /// 每个监督器只会执行一次，重复调用直接返回空列表。
    pub async fn run(&mut self) -> Vec<ServiceError> {
        if self.state != LifecycleState::NotStarted {
            debug!(state = ?self.state, "监督器已运行过，忽略重复启动");
            return Vec::new();
        }
        let Some(sink) = self.sink.take() else {
            return Vec::new();
        };

        let mut failure = None;
        for service in &self.services {
            let token = CancellationToken::new();
            let span = info_span!("server", service = service.name());

            match service.start(token.clone(), span, sink.clone()).await {
                Ok(()) => {
                    info!(service = service.name(), "服务已启动");
                    self.tokens.push(token);
                }
                Err(err) => {
                    error!(service = service.name(), error = %err, "服务启动失败，开始回滚");
                    token.cancel();
                    failure = Some(err);
                    break;
                }
            }
        }

        // 启动阶段结束后不再持有发送端，服务全部退出时通道随之关闭
        drop(sink);

        match failure {
            None => {
                self.state = LifecycleState::Running;
                info!(count = self.tokens.len(), "所有服务已启动");
                Vec::new()
            }
            Some(err) => {
                let mut errors = vec![err];
                let expected = self.tokens.len() * 2;
                errors.extend(self.shutdown(expected).await);
                self.state = LifecycleState::RolledBack;
                errors
            }
        }
    }

    /// 等待关闭触发并停止所有服务
    ///
    /// 阻塞直到任意服务发送第一条通知，然后取消所有服务并再收集 2N-1 条通知。
    ///
    /// # Panics
    ///
    /// 在 [`run`](Self::run) 成功之前调用会 panic。
    pub async fn wait(&mut self) -> Vec<ServiceError> {
        if !self.ensure_running("wait") {
            return Vec::new();
        }

        let expected = self.tokens.len() * 2;
        let mut errors = Vec::new();

        info!("等待关闭触发...");
        match self.queue.recv().await {
            Some(trigger) => {
                self.received += 1;
                match trigger.into_error() {
                    Some(err) => {
                        warn!(error = %err, "服务异常结束，开始关闭所有服务");
                        errors.push(err);
                    }
                    None => info!("收到关闭触发，开始关闭所有服务"),
                }
                errors.extend(self.shutdown(expected - 1).await);
            }
            None => {
                error!(missing = expected, "通知通道已关闭，未收到任何通知");
                self.cancel_all();
                errors.push(ServiceError::Disconnected { missing: expected });
            }
        }

        self.state = LifecycleState::Stopped;
        info!(errors = errors.len(), "所有服务已停止");
        errors
    }

    /// 立即停止所有服务
    ///
    /// 不等待触发，直接取消所有服务并收集 2N 条通知。
    ///
    /// # Panics
    ///
    /// 在 [`run`](Self::run) 成功之前调用会 panic。
    pub async fn stop(&mut self) -> Vec<ServiceError> {
        if !self.ensure_running("stop") {
            return Vec::new();
        }

        info!("主动停止所有服务");
        let errors = self.shutdown(self.tokens.len() * 2).await;
        self.state = LifecycleState::Stopped;
        info!(errors = errors.len(), "所有服务已停止");
        errors
    }

    /// 检查 wait/stop 的调用前提
    fn ensure_running(&self, operation: &str) -> bool {
        match self.state {
            LifecycleState::Running => true,
            LifecycleState::Stopped => {
                debug!(operation, "服务已停止，忽略重复调用");
                false
            }
            LifecycleState::NotStarted | LifecycleState::RolledBack => panic!(
                "{operation} 只能在服务成功启动后调用，当前状态: {:?}",
                self.state
            ),
        }
    }

    /// 取消所有服务并收集指定数量的通知
    async fn shutdown(&mut self, expected: usize) -> Vec<ServiceError> {
        self.cancel_all();
        self.drain(expected).await
    }

    /// 触发所有取消令牌，重复取消是安全的
    fn cancel_all(&self) {
        for token in &self.tokens {
            token.cancel();
        }
    }

    /// 收集恰好 `expected` 条通知，返回其中的错误
    async fn drain(&mut self, expected: usize) -> Vec<ServiceError> {
        let mut errors = Vec::new();
        let deadline = self
            .config
            .shutdown_timeout
            .map(|timeout| (Instant::now() + timeout, timeout));

        let mut received = 0;
        while received < expected {
            let next = match deadline {
                Some((at, waited)) => match tokio::time::timeout_at(at, self.queue.recv()).await {
                    Ok(next) => next,
                    Err(_) => {
                        let missing = expected - received;
                        error!(missing, ?waited, "等待服务停止超时");
                        errors.push(ServiceError::Unresponsive { missing, waited });
                        break;
                    }
                },
                None => self.queue.recv().await,
            };

            match next {
                Some(notification) => {
                    received += 1;
                    if let Some(err) = notification.into_error() {
                        warn!(error = %err, "服务上报错误");
                        errors.push(err);
                    }
                }
                None => {
                    let missing = expected - received;
                    error!(missing, "通知通道已关闭，通知未收齐");
                    errors.push(ServiceError::Disconnected { missing });
                    break;
                }
            }
        }

        self.received += received;
        debug!(received, expected, "通知收集完成");
        errors
    }
}
