//! HttpActionClient - 外部アクションの HTTP 実装
//!
//! mark も verify も同じ `GET {base_url}{key}` を 1 回投げるだけ。
//! 2xx を成功とし、それ以外（非 2xx・transport error・timeout）はすべて失敗。

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::domain::{ActionOutcome, ActionPhase, MemberKey, RollcallError};
use crate::ports::ActionClient;

/// Reference request timeout (connect and whole request).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpActionClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpActionClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RollcallError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| RollcallError::Action(format!("failed to build http client: {e}")))?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The key is appended verbatim; `base_url` carries any path or query prefix.
    fn url_for(&self, key: &MemberKey) -> String {
        format!("{}{}", self.base_url, key)
    }

    async fn call(&self, phase: ActionPhase, key: &MemberKey) -> ActionOutcome {
        let url = self.url_for(key);
        info!(member = %key, %phase, %url, "calling action endpoint");

        match self.client.get(&url).send().await {
            Ok(resp) => {
                let status = resp.status().as_u16();
                if resp.status().is_success() {
                    let body = resp.text().await.unwrap_or_default();
                    debug!(member = %key, %phase, status, body = %body, "action endpoint response");
                    ActionOutcome::Succeeded { status }
                } else {
                    error!(member = %key, %phase, status, "action endpoint rejected call");
                    ActionOutcome::Rejected { status }
                }
            }
            Err(e) => {
                let reason = if e.is_timeout() {
                    format!("timed out: {e}")
                } else {
                    e.to_string()
                };
                error!(member = %key, %phase, error = %reason, "action endpoint unreachable");
                ActionOutcome::Unreachable { reason }
            }
        }
    }
}

#[async_trait]
impl ActionClient for HttpActionClient {
    async fn mark(&self, key: &MemberKey) -> ActionOutcome {
        self.call(ActionPhase::Mark, key).await
    }

    async fn verify(&self, key: &MemberKey) -> ActionOutcome {
        self.call(ActionPhase::Verify, key).await
    }
}
