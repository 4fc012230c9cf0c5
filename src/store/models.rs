use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type UserId = Uuid;
pub type PostId = Uuid;

/// 投稿の完全なレコード。エンジンからは読み取り専用。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub user_id: UserId,
    pub content: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Post {
    #[must_use]
    pub fn new(user_id: UserId, content: impl Into<String>, tags: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            content: content.into(),
            tags,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: PostId) -> Self {
        self.id = id;
        self
    }

    #[must_use]
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    #[must_use]
    pub fn candidate(&self) -> PostCandidate {
        PostCandidate {
            id: self.id,
            tags: self.tags.clone(),
        }
    }
}

/// スコアリングに必要な最小限の投稿情報（ID とタグ）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostCandidate {
    pub id: PostId,
    pub tags: Vec<String>,
}

impl PostCandidate {
    #[must_use]
    pub fn new(id: PostId, tags: Vec<String>) -> Self {
        Self { id, tags }
    }
}
