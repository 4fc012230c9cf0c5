use std::time::Duration;

use thiserror::Error;

use crate::store::StoreError;

/// フィード構築のエラー。候補ソースの失敗は縮退扱いでここには現れない。
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("failed to hydrate feed posts: {0}")]
    Hydration(#[source] StoreError),
    #[error("failed to read cached feed: {0}")]
    CachedRead(#[source] StoreError),
    #[error("feed build cancelled")]
    Cancelled,
    #[error("feed build exceeded deadline of {0:?}")]
    DeadlineExceeded(Duration),
}
