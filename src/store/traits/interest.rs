//! InterestStore trait - per-user tag affinity weights

use async_trait::async_trait;

use crate::store::error::StoreError;
use crate::store::models::UserId;

/// InterestStore - ユーザーごとのタグ重みを順序付き集合として保持する
#[async_trait]
pub trait InterestStore: Send + Sync {
    /// 重みの大きい順に上位 `n` 件のタグを返す。
    /// 同じ重みのタグは辞書順の降順（Redis `ZREVRANGE` と同じ）。
    async fn top_tags(&self, user_id: UserId, n: usize) -> Result<Vec<String>, StoreError>;

    /// タグの重みを返す。未登録のタグは 0
    async fn weight(&self, user_id: UserId, tag: &str) -> Result<f64, StoreError>;

    /// タグの重みに `delta` を加算し、加算後の値を返す
    async fn increment(&self, user_id: UserId, tag: &str, delta: f64) -> Result<f64, StoreError>;
}
