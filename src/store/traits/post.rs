//! PostRepository trait - store of record for posts

use async_trait::async_trait;

use crate::store::error::StoreError;
use crate::store::models::{Post, PostCandidate, PostId};

/// PostRepository - 投稿の正本となるリポジトリ
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// いずれかのタグを含む投稿を新しい順に最大 `limit` 件返す
    async fn by_tags_recent(
        &self,
        tags: &[String],
        limit: usize,
    ) -> Result<Vec<PostCandidate>, StoreError>;

    /// 順序を問わないサンプルとして最大 `limit` 件の投稿IDを返す
    async fn random(&self, limit: usize) -> Result<Vec<PostId>, StoreError>;

    /// IDのリストから投稿を取得する。返却順はリポジトリ依存
    async fn by_ids(&self, ids: &[PostId]) -> Result<Vec<Post>, StoreError>;

    /// 疎通確認
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
