//! ActionClient port - 外部システムへの 2 種類の副作用呼び出し
//!
//! # 実装
//! - **HttpActionClient**: `GET base_url + key`（本番用）
//! - **ScriptedActionClient**: 結果を事前に決めておく（テスト・dry-run 用）

use async_trait::async_trait;

use crate::domain::{ActionOutcome, MemberKey};

/// ActionClient は mark / verify を外部に対して実行
///
/// # 設計原則
/// - エラーを返さない。transport error・timeout・非 2xx はすべて `ActionOutcome` に畳む
/// - リトライしない（次の tick が暗黙のリトライ）
#[async_trait]
pub trait ActionClient: Send + Sync {
    async fn mark(&self, key: &MemberKey) -> ActionOutcome;

    async fn verify(&self, key: &MemberKey) -> ActionOutcome;
}
