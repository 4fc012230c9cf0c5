use serde::{Deserialize, Serialize};

use crate::pipeline::Feed;
use crate::store::{Post, PostId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateKind {
    Update,
}

/// 定期リフレッシュで配信するメッセージ。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedUpdate {
    #[serde(rename = "type")]
    pub kind: UpdateKind,
    pub user_id: UserId,
    pub post_ids: Vec<PostId>,
    pub posts: Vec<Post>,
}

impl FeedUpdate {
    #[must_use]
    pub fn new(user_id: UserId, feed: Feed) -> Self {
        Self {
            kind: UpdateKind::Update,
            user_id,
            post_ids: feed.post_ids,
            posts: feed.posts,
        }
    }

    /// # Errors
    /// シリアライズに失敗した場合は `serde_json::Error` を返す。
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
