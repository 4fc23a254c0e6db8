//! 通知通道
//!
//! 服务通过 [`NotificationSink`] 上报生命周期节点（主任务结束、停止流程结束），
//! 监督器通过 [`NotificationQueue`] 按数量接收。通道无界，发送端永不阻塞。

use crate::error::ServiceError;
use tokio::sync::mpsc;

/// 单条生命周期通知
#[derive(Debug)]
pub enum Notification {
    /// 正常结束，不携带错误
    Done,
    /// 异常结束
    Failed(ServiceError),
}

impl Notification {
    /// 取出携带的错误
    pub fn into_error(self) -> Option<ServiceError> {
        match self {
            Notification::Done => None,
            Notification::Failed(err) => Some(err),
        }
    }

    /// 是否携带错误
    pub fn is_failure(&self) -> bool {
        matches!(self, Notification::Failed(_))
    }
}

impl From<Result<(), ServiceError>> for Notification {
    fn from(result: Result<(), ServiceError>) -> Self {
        match result {
            Ok(()) => Notification::Done,
            Err(err) => Notification::Failed(err),
        }
    }
}

/// 通知发送端，可在任意任务间克隆共享
#[derive(Debug, Clone)]
pub struct NotificationSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl NotificationSink {
    /// 发送一条通知
    ///
    /// 接收端已释放时通知被丢弃，此时监督器已不再等待。
    pub fn send(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            tracing::debug!("通知接收端已关闭，丢弃通知");
        }
    }

    /// 上报正常结束
    pub fn done(&self) {
        self.send(Notification::Done);
    }

    /// 上报错误
    pub fn fail(&self, err: ServiceError) {
        self.send(Notification::Failed(err));
    }
}

/// 通知接收端，仅由监督器持有
#[derive(Debug)]
pub struct NotificationQueue {
    rx: mpsc::UnboundedReceiver<Notification>,
}

impl NotificationQueue {
    /// 接收下一条通知；所有发送端释放且队列为空时返回 `None`
    pub async fn recv(&mut self) -> Option<Notification> {
        self.rx.recv().await
    }
}

/// 创建一对通知发送端与接收端
pub fn channel() -> (NotificationSink, NotificationQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (NotificationSink { tx }, NotificationQueue { rx })
}
