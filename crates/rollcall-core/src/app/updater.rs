//! MemberUpdater - MemberPatch をロック付きで適用し、変更を通知する

use std::sync::Arc;

use tracing::info;

use crate::app::locks::MemberLocks;
use crate::app::verifier::DeferredVerifier;
use crate::domain::{ChangeNotice, MemberKey, MemberPatch, Notification, RollcallError};
use crate::ports::{MemberStore, Notifier, notify_quietly};

pub struct MemberUpdater {
    store: Arc<dyn MemberStore>,
    notifier: Arc<dyn Notifier>,
    verifier: Arc<DeferredVerifier>,
    locks: Arc<MemberLocks>,
}

impl MemberUpdater {
    pub fn new(
        store: Arc<dyn MemberStore>,
        notifier: Arc<dyn Notifier>,
        verifier: Arc<DeferredVerifier>,
        locks: Arc<MemberLocks>,
    ) -> Self {
        Self {
            store,
            notifier,
            verifier,
            locks,
        }
    }

    /// Load, patch, save and notify under the member's lock.
    ///
    /// `Ok(None)` when the member does not exist. A rejected patch leaves the
    /// stored member untouched.
    pub async fn apply(
        &self,
        key: &MemberKey,
        patch: &MemberPatch,
    ) -> Result<Option<Vec<ChangeNotice>>, RollcallError> {
        let guard = self.locks.lock(key).await;
        let Some(mut member) = self.store.find_by_key(key).await? else {
            return Ok(None);
        };
        if patch.is_empty() {
            return Ok(Some(Vec::new()));
        }

        let notices = patch.apply(&mut member)?;
        self.store.save(member.clone()).await?;
        drop(guard);

        // a member no longer marked today has nothing left to verify
        if !member.is_taken && self.verifier.cancel(key) {
            info!(member = %key, "pending verification dropped by update");
        }

        for notice in &notices {
            info!(member = %key, change = notice.kind.label(), details = %notice.details, "member updated");
            notify_quietly(
                self.notifier.as_ref(),
                &member,
                &Notification::Changed(notice.clone()),
            )
            .await;
        }
        Ok(Some(notices))
    }
}
