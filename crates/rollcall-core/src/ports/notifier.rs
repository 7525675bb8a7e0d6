//! Notifier port - 通知コラボレータ
//!
//! 本文の整形（HTML など）はこのクレートの外側。ここではイベントを渡すだけ。

use async_trait::async_trait;
use tracing::warn;

use crate::domain::{Member, Notification, RollcallError};

/// Notifier はメンバーにイベントを届ける
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, member: &Member, event: &Notification) -> Result<(), RollcallError>;
}

/// Fire-and-forget: deliver `event` and log (never return) a failure.
pub async fn notify_quietly(notifier: &dyn Notifier, member: &Member, event: &Notification) {
    if let Err(e) = notifier.notify(member, event).await {
        warn!(member = %member.key, ?event, error = %e, "notification failed");
    }
}
