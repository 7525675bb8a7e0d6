//! Domain identifiers (strongly-typed keys).
//!
//! # MemberKey
//! メンバーを一意に識別する不透明な文字列キー。
//! - 外部アクションの URL 末尾にそのまま連結される
//! - ロック・遅延検証・リポジトリすべてこのキーで引く
//!
//! `String` をそのまま引き回すと OTP のキー（email など）と混同しやすいので、
//! newtype で型を分けています。

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable unique identifier of a member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberKey(String);

impl MemberKey {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for MemberKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for MemberKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for MemberKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
