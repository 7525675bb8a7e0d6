//! Errors - エラー型と分類
//!
//! - `RollcallError`: 実行時のエラー（ストア・外部呼び出し・通知）
//! - `ConfigError`: 起動時の設定エラー（すべて致命的）
//! - `PatchError`: MemberPatch の不正な組み合わせ
//!
//! 「見つからない」はエラーではなく no-op として扱うので、ここには含めない。

use std::path::PathBuf;

use chrono::NaiveTime;

use super::ids::MemberKey;

/// ErrorKind は実行エラーの分類
///
/// - Transient: 一時的なエラー（次の tick で暗黙にリトライされる）
/// - Permanent: 恒久的なエラー（入力が不正）
/// - Infrastructure: インフラエラー（ストアの障害）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}

#[derive(Debug, thiserror::Error)]
pub enum RollcallError {
    #[error("member store failure: {0}")]
    Store(String),

    #[error("action client failure: {0}")]
    Action(String),

    #[error("notification failure: {0}")]
    Notify(String),

    #[error(transparent)]
    Patch(#[from] PatchError),
}

impl RollcallError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RollcallError::Store(_) => ErrorKind::Infrastructure,
            RollcallError::Action(_) | RollcallError::Notify(_) => ErrorKind::Transient,
            RollcallError::Patch(_) => ErrorKind::Permanent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    #[error("member {0} cannot be verified without being taken")]
    VerifiedWithoutTaken(MemberKey),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid time of day '{0}', expected HH:MM or HH:MM:SS")]
    InvalidTime(String),

    #[error("action window start {start} must be before end {end}")]
    InvertedWindow { start: NaiveTime, end: NaiveTime },

    #[error("verification delay min {min} exceeds max {max} (minutes)")]
    InvertedDelay { min: u32, max: u32 },

    #[error("invalid cron expression for {name} '{expr}': {reason}")]
    InvalidCron {
        name: String,
        expr: String,
        reason: String,
    },

    #[error("invalid action base url '{0}'")]
    InvalidBaseUrl(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
