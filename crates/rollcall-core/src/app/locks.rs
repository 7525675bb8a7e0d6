//! MemberLocks - メンバー単位の排他
//!
//! orchestrator・verifier・reset sweep が同じメンバーに対して
//! 「読む → 外部呼び出し → 書く」を重ねないようにするためのロック表。
//!
//! # 設計原則
//! - ストアは丸ごと上書きなので、読み書きの間はキー単位で直列化する
//! - ロック取得後は必ずストアから読み直す（古いスナップショットで上書きしない）
//! - 異なるメンバー同士は並行に進める

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::MemberKey;

#[derive(Debug, Default)]
pub struct MemberLocks {
    slots: Mutex<HashMap<MemberKey, Arc<AsyncMutex<()>>>>,
}

impl MemberLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`. Released when the guard drops.
    pub async fn lock(&self, key: &MemberKey) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(key.clone()).or_default())
        };
        slot.lock_owned().await
    }

    /// Drop slots nobody holds or waits on.
    pub fn prune(&self) -> usize {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let before = slots.len();
        slots.retain(|_, slot| Arc::strong_count(slot) > 1);
        before - slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
