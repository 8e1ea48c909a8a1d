// 用户通知 / User notifications
use async_trait::async_trait;
use tracing::info;

use super::types::Notification;

/// 通知投递，发出即忘：失败只记录日志，不影响跟踪状态
/// Fire-and-forget delivery: failures are logged and never touch tracker state
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_id: &str, notification: Notification);
}

/// 通过 tracing 输出通知 / Emits notifications through tracing
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, user_id: &str, notification: Notification) {
        info!(
            "📣 通知用户 / Notify user {} [{:?}]: {}",
            user_id, notification.kind, notification.message
        );
    }
}
