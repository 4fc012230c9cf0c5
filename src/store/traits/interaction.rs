//! InteractionStore trait - engagement history

use async_trait::async_trait;

use crate::store::error::StoreError;
use crate::store::models::{PostId, UserId};

/// InteractionStore - 「ユーザーが投稿に反応した」記録の存在確認
#[async_trait]
pub trait InteractionStore: Send + Sync {
    async fn has_interaction(&self, user_id: UserId, post_id: PostId) -> Result<bool, StoreError>;
}
