//! Config - TOML 設定の読み込みと起動時検証
//!
//! ```toml
//! [action]
//! base_url = "https://attendance.example.edu/mark?sic="
//! timeout_secs = 30
//!
//! [window]
//! start = "19:35"
//! end = "21:00"
//!
//! [verification]
//! delay_min_minutes = 5
//! delay_max_minutes = 15
//!
//! [schedule]
//! tick = "0 * * * * *"
//! midnight = "0 0 0 * * *"
//! pre_window = "0 30 19 * * *"
//! ```
//!
//! # Fail-fast 設計
//! - `validate()` は起動時に一度だけ呼ぶ
//! - 不正な値はすべて `ConfigError`（致命的、tick ごとには扱わない）

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::schedule::parse_schedule;
use crate::domain::{ActionWindow, ConfigError};

pub const BASE_URL_ENV: &str = "ROLLCALL_ACTION_BASE_URL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub action: ActionConfig,
    pub window: WindowConfig,
    pub verification: VerificationConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub otp: OtpConfig,
    #[serde(default)]
    pub workers: WorkerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionConfig {
    /// The member key is appended verbatim.
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationConfig {
    pub delay_min_minutes: u32,
    pub delay_max_minutes: u32,
}

/// Six-field cron expressions (seconds first).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_tick")]
    pub tick: String,
    #[serde(default = "default_midnight")]
    pub midnight: String,
    #[serde(default = "default_pre_window")]
    pub pre_window: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpConfig {
    #[serde(default = "default_otp_ttl")]
    pub ttl_minutes: u32,
    #[serde(default = "default_cleanup_secs")]
    pub cleanup_interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_mark_concurrency")]
    pub mark_concurrency: usize,
    #[serde(default = "default_verify_concurrency")]
    pub verify_concurrency: usize,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_tick() -> String {
    "0 * * * * *".to_string()
}

fn default_midnight() -> String {
    "0 0 0 * * *".to_string()
}

fn default_pre_window() -> String {
    "0 30 19 * * *".to_string()
}

fn default_otp_ttl() -> u32 {
    10
}

fn default_cleanup_secs() -> u64 {
    300
}

fn default_mark_concurrency() -> usize {
    4
}

fn default_verify_concurrency() -> usize {
    4
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            tick: default_tick(),
            midnight: default_midnight(),
            pre_window: default_pre_window(),
        }
    }
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: default_otp_ttl(),
            cleanup_interval_secs: default_cleanup_secs(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            mark_concurrency: default_mark_concurrency(),
            verify_concurrency: default_verify_concurrency(),
        }
    }
}

impl Config {
    /// Parse and validate.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, apply the environment override, and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Config = toml::from_str(&raw)?;
        if let Ok(base_url) = std::env::var(BASE_URL_ENV)
            && !base_url.is_empty()
        {
            config.action.base_url = base_url;
        }
        config.validate()?;
        Ok(config)
    }

    /// Every check that must pass before the engine starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        reqwest::Url::parse(&self.action.base_url)
            .map_err(|_| ConfigError::InvalidBaseUrl(self.action.base_url.clone()))?;
        if self.action.timeout_secs == 0 {
            return Err(ConfigError::Zero("action.timeout_secs"));
        }

        self.action_window()?;

        let v = &self.verification;
        if v.delay_min_minutes > v.delay_max_minutes {
            return Err(ConfigError::InvertedDelay {
                min: v.delay_min_minutes,
                max: v.delay_max_minutes,
            });
        }

        parse_schedule("schedule.tick", &self.schedule.tick)?;
        parse_schedule("schedule.midnight", &self.schedule.midnight)?;
        parse_schedule("schedule.pre_window", &self.schedule.pre_window)?;

        if self.otp.ttl_minutes == 0 {
            return Err(ConfigError::Zero("otp.ttl_minutes"));
        }
        if self.otp.cleanup_interval_secs == 0 {
            return Err(ConfigError::Zero("otp.cleanup_interval_secs"));
        }
        if self.workers.mark_concurrency == 0 {
            return Err(ConfigError::Zero("workers.mark_concurrency"));
        }
        if self.workers.verify_concurrency == 0 {
            return Err(ConfigError::Zero("workers.verify_concurrency"));
        }
        Ok(())
    }

    pub fn action_window(&self) -> Result<ActionWindow, ConfigError> {
        ActionWindow::parse(&self.window.start, &self.window.end)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action.timeout_secs)
    }

    pub fn otp_ttl(&self) -> chrono::TimeDelta {
        chrono::TimeDelta::minutes(i64::from(self.otp.ttl_minutes))
    }

    pub fn otp_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.otp.cleanup_interval_secs)
    }
}
