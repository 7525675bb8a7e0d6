//! OneTimeCodeStore - 短命なワンタイムコードの発行と照合
//!
//! # 仕様
//! - `issue(key)`: 6 桁コードを発行し、`now + ttl` を期限として保存（既存は置き換え）
//! - `verify(key, code)`:
//!   - エントリなし → false
//!   - 期限切れ（`now > expires_at`）→ エントリを消して false
//!   - 一致 → エントリを消して true（使い捨て）
//!   - 不一致 → false（エントリは残る）
//!
//! # 実装
//! - キーのハッシュで選ぶシャード（`Mutex<HashMap>`）に分割し、無関係なキー同士を直列化しない
//! - 同じキーへの操作は同じシャードのロックで線形化される
//! - 期限切れは verify 時に遅延判定。`purge_expired` はメモリを抑えるための掃除

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{NaiveDateTime, TimeDelta};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::generator::{CodeGenerator, OsRngCodeGenerator};
use crate::ports::Clock;

/// Reference lifetime of an issued code, in minutes.
pub const DEFAULT_TTL_MINUTES: i64 = 10;

const SHARDS: usize = 16;

#[derive(Debug, Clone)]
struct Entry {
    code: String,
    expires_at: NaiveDateTime,
}

pub struct OneTimeCodeStore {
    shards: Vec<Mutex<HashMap<String, Entry>>>,
    ttl: TimeDelta,
    clock: Arc<dyn Clock>,
    generator: Box<dyn CodeGenerator>,
}

impl OneTimeCodeStore {
    pub fn new(ttl: TimeDelta, clock: Arc<dyn Clock>) -> Self {
        Self::with_generator(ttl, clock, Box::new(OsRngCodeGenerator))
    }

    pub fn with_generator(
        ttl: TimeDelta,
        clock: Arc<dyn Clock>,
        generator: Box<dyn CodeGenerator>,
    ) -> Self {
        Self {
            shards: (0..SHARDS).map(|_| Mutex::new(HashMap::new())).collect(),
            ttl,
            clock,
            generator,
        }
    }

    pub fn ttl(&self) -> TimeDelta {
        self.ttl
    }

    fn shard(&self, key: &str) -> MutexGuard<'_, HashMap<String, Entry>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let idx = (hasher.finish() as usize) % self.shards.len();
        self.shards[idx]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Issue a fresh code for `key`, replacing any live one.
    pub fn issue(&self, key: &str) -> String {
        let code = self.generator.generate();
        let expires_at = self.clock.now() + self.ttl;
        self.shard(key).insert(
            key.to_string(),
            Entry {
                code: code.clone(),
                expires_at,
            },
        );
        debug!(key, %expires_at, "one-time code issued");
        code
    }

    /// Check `code` for `key`. Success and expiry both consume the entry.
    pub fn verify(&self, key: &str, code: &str) -> bool {
        let now = self.clock.now();
        let mut shard = self.shard(key);
        let Some(entry) = shard.get(key) else {
            return false;
        };

        if now > entry.expires_at {
            shard.remove(key);
            debug!(key, "one-time code expired");
            return false;
        }
        if entry.code == code {
            shard.remove(key);
            return true;
        }
        false
    }

    /// Drop every expired entry; returns how many went.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut purged = 0;
        for shard in &self.shards {
            let mut map = shard.lock().unwrap_or_else(PoisonError::into_inner);
            let before = map.len();
            map.retain(|_, entry| now <= entry.expires_at);
            purged += before - map.len();
        }
        purged
    }

    /// Live and not-yet-purged entries.
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.lock().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Periodic `purge_expired` until shutdown.
    pub fn spawn_cleanup(
        self: Arc<Self>,
        every: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                if *shutdown.borrow() {
                    break;
                }
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let purged = self.purge_expired();
                        if purged > 0 {
                            info!(purged, "expired one-time codes purged");
                        }
                    }
                }
            }
        })
    }
}
