//! Postgres storage driver (posts and likes).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Executor, PgPool, Row};
use uuid::Uuid;

use super::error::StoreError;
use super::models::{Post, PostCandidate, PostId, UserId};
use super::traits::{InteractionStore, PostRepository};

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS posts (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    user_id UUID NOT NULL,
    content TEXT NOT NULL,
    tags TEXT[] NOT NULL DEFAULT '{}',
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS idx_posts_user_id ON posts (user_id);
CREATE INDEX IF NOT EXISTS idx_posts_tags ON posts USING GIN (tags);
CREATE INDEX IF NOT EXISTS idx_posts_created_at ON posts (created_at DESC);

CREATE TABLE IF NOT EXISTS likes (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    user_id UUID NOT NULL,
    post_id UUID NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS idx_likes_user_post ON likes (user_id, post_id);
";

/// 投稿といいねを Postgres から読み出すストア。
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// エンジンが読むテーブルを冪等に作成する。
    ///
    /// # Errors
    /// DDL の実行に失敗した場合は [`StoreError::Postgres`] を返す。
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.pool.execute(SCHEMA).await?;
        Ok(())
    }

    /// 投稿を1件挿入する。既存IDの場合は何もしない。
    ///
    /// # Errors
    /// INSERT に失敗した場合は [`StoreError::Postgres`] を返す。
    pub async fn insert_post(&self, post: &Post) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO posts (id, user_id, content, tags, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO NOTHING
            ",
        )
        .bind(post.id)
        .bind(post.user_id)
        .bind(&post.content)
        .bind(&post.tags)
        .bind(post.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// いいねを記録する。
    ///
    /// # Errors
    /// INSERT に失敗した場合は [`StoreError::Postgres`] を返す。
    pub async fn insert_like(&self, user_id: UserId, post_id: PostId) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO likes (user_id, post_id) VALUES ($1, $2)")
            .bind(user_id)
            .bind(post_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[async_trait]
impl PostRepository for PgStore {
    async fn by_tags_recent(
        &self,
        tags: &[String],
        limit: usize,
    ) -> Result<Vec<PostCandidate>, StoreError> {
        if tags.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r"
            SELECT id, tags
            FROM posts
            WHERE tags && $1
            ORDER BY created_at DESC
            LIMIT $2
            ",
        )
        .bind(tags)
        .bind(limit_param(limit))
        .fetch_all(&self.pool)
        .await?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in rows {
            let id: Uuid = row.try_get("id")?;
            let tags: Option<Vec<String>> = row.try_get("tags")?;
            candidates.push(PostCandidate::new(id, tags.unwrap_or_default()));
        }

        Ok(candidates)
    }

    async fn random(&self, limit: usize) -> Result<Vec<PostId>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query("SELECT id FROM posts ORDER BY RANDOM() LIMIT $1")
            .bind(limit_param(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| row.try_get::<Uuid, _>("id").map_err(StoreError::from))
            .collect()
    }

    async fn by_ids(&self, ids: &[PostId]) -> Result<Vec<Post>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r"
            SELECT id, user_id, content, tags, created_at
            FROM posts
            WHERE id = ANY($1)
            ",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut posts = Vec::with_capacity(rows.len());
        for row in rows {
            let tags: Option<Vec<String>> = row.try_get("tags")?;
            let created_at: DateTime<Utc> = row.try_get("created_at")?;
            posts.push(Post {
                id: row.try_get("id")?,
                user_id: row.try_get("user_id")?,
                content: row.try_get("content")?,
                tags: tags.unwrap_or_default(),
                created_at,
            });
        }

        Ok(posts)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl InteractionStore for PgStore {
    async fn has_interaction(&self, user_id: UserId, post_id: PostId) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM likes WHERE user_id = $1 AND post_id = $2)",
        )
        .bind(user_id)
        .bind(post_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}
