//! CronLoop - cron 式で駆動される周期タスク
//!
//! 毎分 tick・深夜リセット・ウィンドウ前リセットはそれぞれ独立した CronLoop で動く。
//!
//! # 実装
//! - cron 式は 6 フィールド（秒が先頭）、`cron` クレートで解釈
//! - 時刻は Clock が返すローカルの壁時計（NaiveDateTime）で評価する
//! - 発火ごとに本体を `tokio::spawn` するので、遅い tick が他のトリガーを止めない
//! - 本体には予定の発火時刻を渡す（起床時の壁時計は数 ms ずれることがある）
//! - shutdown は watch channel（WorkerGroup と同じ作法）

use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDateTime, TimeZone, Utc};
use cron::Schedule;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::ConfigError;
use crate::ports::Clock;

/// Parse a six-field cron expression; `name` only labels the error.
pub fn parse_schedule(name: &str, expr: &str) -> Result<Schedule, ConfigError> {
    Schedule::from_str(expr).map_err(|e| ConfigError::InvalidCron {
        name: name.to_string(),
        expr: expr.to_string(),
        reason: e.to_string(),
    })
}

pub struct CronLoop {
    name: String,
    schedule: Schedule,
    clock: Arc<dyn Clock>,
}

impl CronLoop {
    pub fn new(
        name: impl Into<String>,
        expr: &str,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        let schedule = parse_schedule(&name, expr)?;
        Ok(Self {
            name,
            schedule,
            clock,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// First fire time strictly after `after` (wall-clock, no zone).
    pub fn next_fire(&self, after: NaiveDateTime) -> Option<NaiveDateTime> {
        // naive wall time evaluated as if it were UTC: no DST shifts, no offsets
        let anchor = Utc.from_utc_datetime(&after);
        self.schedule
            .after(&anchor)
            .next()
            .map(|fire| fire.naive_utc())
    }

    /// Run `job(fire_time)` at every fire time until shutdown.
    pub fn spawn<F, Fut>(self, mut shutdown: watch::Receiver<bool>, job: F) -> JoinHandle<()>
    where
        F: Fn(NaiveDateTime) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(async move {
            let mut last: Option<NaiveDateTime> = None;
            loop {
                if *shutdown.borrow() {
                    break;
                }

                let now = self.clock.now();
                let from = last.map_or(now, |l| l.max(now));
                let Some(next) = self.next_fire(from) else {
                    warn!(trigger = %self.name, "schedule has no further fire times");
                    break;
                };
                let wait = (next - now).to_std().unwrap_or(Duration::ZERO);

                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(wait) => {
                        debug!(trigger = %self.name, %next, "firing");
                        last = Some(next);
                        tokio::spawn(job(next));
                    }
                }
            }
            debug!(trigger = %self.name, "cron loop stopped");
        })
    }
}
