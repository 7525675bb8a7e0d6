//! LogNotifier - 何も送らず、ログに 1 行残すだけの通知実装
//!
//! 外部の通知コラボレータ（メールなど）が繋がっていないときのデフォルト。

use async_trait::async_trait;
use tracing::{error, info};

use crate::domain::{Member, Notification, RollcallError};
use crate::ports::Notifier;

#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, member: &Member, event: &Notification) -> Result<(), RollcallError> {
        match event {
            Notification::Changed(notice) => info!(
                member = %member.key,
                email = %member.email,
                change = notice.kind.label(),
                details = %notice.details,
                "member changed"
            ),
            e if e.is_failure() => {
                error!(member = %member.key, email = %member.email, event = ?e, "action failed")
            }
            e => info!(member = %member.key, email = %member.email, event = ?e, "action succeeded"),
        }
        Ok(())
    }
}
