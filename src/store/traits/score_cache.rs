//! ScoreCache trait - per-user ordered (post, score) store

use async_trait::async_trait;

use crate::store::error::StoreError;
use crate::store::models::{PostId, UserId};

/// ScoreCache - ユーザーごとのスコア付きフィードキャッシュ
///
/// Upserts are last-write-wins per (user, post); there is no multi-key transaction.
#[async_trait]
pub trait ScoreCache: Send + Sync {
    async fn upsert(&self, user_id: UserId, post_id: PostId, score: f64) -> Result<(), StoreError>;

    /// スコアの降順で上位 `n` 件の投稿IDを返す。
    /// 同点の投稿は ID の降順（Redis `ZREVRANGE` と同じ）。
    async fn top_n(&self, user_id: UserId, n: usize) -> Result<Vec<PostId>, StoreError>;

    async fn score(&self, user_id: UserId, post_id: PostId) -> Result<Option<f64>, StoreError>;

    /// 疎通確認
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
