//! EngineBuilder - エンジンの構築とワイヤリング
//!
//! # Fail-fast 設計
//! - build() 時に Config を検証し、ウィンドウ・遅延・cron 式をすべて解釈する
//! - 不正があれば BuildError を返し、ループは 1 本も起動しない
//!
//! # デフォルト
//! - Clock: SystemClock（ローカルの壁時計）
//! - MemberStore: 空の InMemoryMemberStore
//! - ActionClient: config の base_url / timeout で作る HttpActionClient
//! - Notifier: LogNotifier

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::config::Config;
use crate::app::locks::MemberLocks;
use crate::app::orchestrator::MarkingOrchestrator;
use crate::app::reset::ResetSweep;
use crate::app::schedule::CronLoop;
use crate::app::trigger::AttendanceTrigger;
use crate::app::updater::MemberUpdater;
use crate::app::verifier::{DeferredVerifier, VerifyDelay};
use crate::domain::{ConfigError, RollcallError};
use crate::impls::{HttpActionClient, InMemoryMemberStore, LogNotifier};
use crate::otp::OneTimeCodeStore;
use crate::ports::{ActionClient, Clock, MemberStore, Notifier, SystemClock};

/// EngineBuilder はエンジンを構築
///
/// # 使用例
/// ```ignore
/// let engine = EngineBuilder::new(config)
///     .store(store)
///     .notifier(Arc::new(LogNotifier))
///     .build()?;
/// let handle = engine.start().await?;
/// ```
pub struct EngineBuilder {
    config: Config,
    store: Option<Arc<dyn MemberStore>>,
    client: Option<Arc<dyn ActionClient>>,
    notifier: Option<Arc<dyn Notifier>>,
    clock: Option<Arc<dyn Clock>>,
}

/// BuildError はエンジン構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to build action client: {0}")]
    Client(#[from] RollcallError),
}

impl EngineBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            store: None,
            client: None,
            notifier: None,
            clock: None,
        }
    }

    pub fn store(mut self, store: Arc<dyn MemberStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn client(mut self, client: Arc<dyn ActionClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<Engine, BuildError> {
        let config = self.config;
        config.validate()?;
        let window = config.action_window()?;
        let delay = VerifyDelay::new(
            config.verification.delay_min_minutes,
            config.verification.delay_max_minutes,
        )?;

        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let store: Arc<dyn MemberStore> = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryMemberStore::new()));
        let notifier: Arc<dyn Notifier> = self.notifier.unwrap_or_else(|| Arc::new(LogNotifier));
        let client: Arc<dyn ActionClient> = match self.client {
            Some(client) => client,
            None => Arc::new(HttpActionClient::new(
                config.action.base_url.clone(),
                config.action_timeout(),
            )?),
        };

        let locks = Arc::new(MemberLocks::new());
        let verifier = Arc::new(DeferredVerifier::new(
            Arc::clone(&store),
            Arc::clone(&client),
            Arc::clone(&notifier),
            Arc::clone(&locks),
            Arc::clone(&clock),
            delay,
            config.workers.verify_concurrency,
        ));
        let orchestrator = Arc::new(MarkingOrchestrator::new(
            Arc::clone(&store),
            client,
            Arc::clone(&notifier),
            Arc::clone(&verifier),
            Arc::clone(&locks),
            Arc::clone(&clock),
            config.workers.mark_concurrency,
        ));
        let trigger = Arc::new(AttendanceTrigger::new(
            window,
            orchestrator,
            Arc::clone(&clock),
        ));
        let reset = Arc::new(ResetSweep::new(Arc::clone(&store), Arc::clone(&locks)));
        let updater = Arc::new(MemberUpdater::new(
            Arc::clone(&store),
            notifier,
            Arc::clone(&verifier),
            locks,
        ));
        let otp = Arc::new(OneTimeCodeStore::new(config.otp_ttl(), Arc::clone(&clock)));

        Ok(Engine {
            config,
            clock,
            store,
            verifier,
            trigger,
            reset,
            updater,
            otp,
        })
    }
}

/// Engine はワイヤリング済みのコンポーネント一式
///
/// `start()` までは何も動かない。テストは各コンポーネントを直接叩ける。
pub struct Engine {
    config: Config,
    clock: Arc<dyn Clock>,
    store: Arc<dyn MemberStore>,
    verifier: Arc<DeferredVerifier>,
    trigger: Arc<AttendanceTrigger>,
    reset: Arc<ResetSweep>,
    updater: Arc<MemberUpdater>,
    otp: Arc<OneTimeCodeStore>,
}

impl Engine {
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn MemberStore> {
        &self.store
    }

    pub fn verifier(&self) -> &Arc<DeferredVerifier> {
        &self.verifier
    }

    pub fn trigger(&self) -> &Arc<AttendanceTrigger> {
        &self.trigger
    }

    pub fn reset(&self) -> &Arc<ResetSweep> {
        &self.reset
    }

    pub fn updater(&self) -> &Arc<MemberUpdater> {
        &self.updater
    }

    pub fn otp(&self) -> &Arc<OneTimeCodeStore> {
        &self.otp
    }

    /// Catch up on today's state, then spawn every loop.
    ///
    /// 1. reset sweep (so yesterday's flags are not revived)
    /// 2. revive unverified marks into the verifier
    /// 3. tick / midnight / pre-window cron loops, verifier driver, OTP cleanup
    pub async fn start(&self) -> Result<EngineHandle, BuildError> {
        let today = self.clock.today();
        self.reset.run(today).await;
        if let Err(e) = self.verifier.revive(today).await {
            error!(error = %e, "could not revive pending verifications");
        }

        let schedule = &self.config.schedule;
        let tick = CronLoop::new("tick", &schedule.tick, Arc::clone(&self.clock))?;
        let midnight = CronLoop::new("midnight", &schedule.midnight, Arc::clone(&self.clock))?;
        let pre_window =
            CronLoop::new("pre-window", &schedule.pre_window, Arc::clone(&self.clock))?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut joins = Vec::with_capacity(5);

        let trigger = Arc::clone(&self.trigger);
        joins.push(tick.spawn(shutdown_rx.clone(), move |_| {
            let trigger = Arc::clone(&trigger);
            async move {
                trigger.tick().await;
            }
        }));

        for sweep_loop in [midnight, pre_window] {
            let reset = Arc::clone(&self.reset);
            joins.push(sweep_loop.spawn(shutdown_rx.clone(), move |fire_time| {
                let reset = Arc::clone(&reset);
                async move {
                    reset.run(fire_time.date()).await;
                }
            }));
        }

        joins.push(tokio::spawn(
            Arc::clone(&self.verifier).run(shutdown_rx.clone()),
        ));
        joins.push(
            Arc::clone(&self.otp).spawn_cleanup(self.config.otp_cleanup_interval(), shutdown_rx),
        );

        info!(
            window = %self.trigger.window(),
            tick = %schedule.tick,
            midnight = %schedule.midnight,
            pre_window = %schedule.pre_window,
            "engine started"
        );
        Ok(EngineHandle { shutdown_tx, joins })
    }
}

/// Running engine handle.
/// - `request_shutdown()` で全ループに停止を伝える
/// - 実行中の tick 本体は最後まで走る（新しい発火だけが止まる）
pub struct EngineHandle {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl EngineHandle {
    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for every loop.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for j in self.joins {
            let _ = j.await;
        }
        info!("engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ActionPhase, Member};
    use crate::impls::{RecordingNotifier, ScriptedActionClient};
    use crate::ports::ManualClock;
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

    const CONFIG: &str = r#"
[action]
base_url = "http://127.0.0.1:9/attendance/"

[window]
start = "20:00"
end = "22:00"

[verification]
delay_min_minutes = 5
delay_max_minutes = 15
"#;

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, d)
            .unwrap()
            .and_time(NaiveTime::from_hms_opt(h, m, 0).unwrap())
    }

    #[test]
    fn build_with_defaults() {
        let config = Config::from_toml_str(CONFIG).unwrap();
        let engine = EngineBuilder::new(config).build().unwrap();
        assert_eq!(engine.trigger().window().to_string(), "20:00:00 - 22:00:00");
    }

    #[test]
    fn build_rejects_invalid_config() {
        let mut config = Config::from_toml_str(CONFIG).unwrap();
        config.window.end = "19:00".into();

        let err = EngineBuilder::new(config).build().err().unwrap();

        assert!(matches!(
            err,
            BuildError::Config(ConfigError::InvertedWindow { .. })
        ));
    }

    #[tokio::test]
    async fn start_clears_stale_flags_and_revives_today() {
        let mut stale = Member::new("stale", "");
        stale.record_mark(at(9, 20, 5));
        let mut pending = Member::new("pending", "");
        pending.record_mark(at(10, 20, 5));

        let store = Arc::new(InMemoryMemberStore::with_members([stale, pending]));
        let client = Arc::new(ScriptedActionClient::succeeding());
        let engine = EngineBuilder::new(Config::from_toml_str(CONFIG).unwrap())
            .store(store.clone())
            .client(client.clone())
            .notifier(Arc::new(RecordingNotifier::new()))
            .clock(Arc::new(ManualClock::new(at(10, 20, 30))))
            .build()
            .unwrap();

        let handle = engine.start().await.unwrap();
        handle.shutdown_and_join().await;

        let stale = store.find_by_key(&"stale".into()).await.unwrap().unwrap();
        assert!(!stale.is_taken);
        assert!(engine.verifier().pending_for(&"pending".into()).is_some());
        assert!(engine.verifier().pending_for(&"stale".into()).is_none());
        assert_eq!(client.call_count(ActionPhase::Verify, &"pending".into()), 0);
    }
}
