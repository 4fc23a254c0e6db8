//! 服务能力定义
//!
//! 任何可启动、可协作停止的长期运行单元都实现 [`Service`]。

use crate::core::notification::NotificationSink;
use crate::error::ServiceError;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::Span;

/// 受监督的长期运行服务
///
/// `start` 只在服务根本无法启动时返回错误（端口绑定失败、资源不可用等），
/// 此时不得产生任何并发任务，也不得发送通知。
///
/// 启动成功后立即返回，并保证最终通过 `sink` 恰好发送两条通知：
/// - 主任务的结果（正常结束为 `Done`，异常结束为 `Failed`）
/// - 停止流程的结果（由 `token` 取消触发）
///
/// 两条通知之间、以及不同服务之间的先后顺序不作保证。
/// `span` 是该服务的日志上下文，服务应使用它装饰自己派生的任务。
#[async_trait]
pub trait Service: Send + Sync {
    /// 服务名称，用于日志和错误归属
    fn name(&self) -> &str;

    /// 启动服务
    async fn start(
        &self,
        token: CancellationToken,
        span: Span,
        sink: NotificationSink,
    ) -> Result<(), ServiceError>;
}
