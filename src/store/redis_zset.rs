//! # Redis
//!
//! Sorted-set storage for the two per-user ordered collections the engine needs.
//!
//! ## Keys
//!
//! - `user:{id}:tag_scores`: interest weights, member = tag, score = weight
//! - `user:{id}:feed`: score cache, member = post id, score = affinity score
//!
//! ZADD overwrites the score of an existing member, which gives the cache its
//! last-write-wins upsert. ZREVRANGE serves both "top tags" and "top N posts".

use std::time::Duration;

use async_trait::async_trait;
use redis::{
    AsyncCommands, Client,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use tracing::warn;
use uuid::Uuid;

use super::error::StoreError;
use super::models::{PostId, UserId};
use super::traits::{InterestStore, ScoreCache};

fn tag_scores_key(user_id: UserId) -> String {
    format!("user:{user_id}:tag_scores")
}

fn feed_key(user_id: UserId) -> String {
    format!("user:{user_id}:feed")
}

/// `ZREVRANGE key 0 stop` の stop。`n == 0` の場合は呼び出し側で空を返すこと。
fn range_stop(n: usize) -> isize {
    isize::try_from(n).map_or(isize::MAX, |n| n - 1)
}

#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    #[must_use]
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }

    /// Redis に接続し、再接続を管理するコネクションマネージャを作成する。
    ///
    /// # Errors
    /// URL が不正な場合や初回接続に失敗した場合は [`StoreError::Redis`] を返す。
    pub async fn connect(
        redis_url: &str,
        retries: usize,
        connect_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(retries)
            .set_connection_timeout(connect_timeout);

        let client = Client::open(redis_url)?;
        let connection = client.get_connection_manager_with_config(config).await?;
        Ok(Self::new(connection))
    }
}

#[async_trait]
impl InterestStore for RedisStore {
    async fn top_tags(&self, user_id: UserId, n: usize) -> Result<Vec<String>, StoreError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.connection.clone();
        let tags: Vec<String> = conn
            .zrevrange(tag_scores_key(user_id), 0, range_stop(n))
            .await?;
        Ok(tags)
    }

    async fn weight(&self, user_id: UserId, tag: &str) -> Result<f64, StoreError> {
        let mut conn = self.connection.clone();
        let weight: Option<f64> = conn.zscore(tag_scores_key(user_id), tag).await?;
        Ok(weight.unwrap_or(0.0))
    }

    async fn increment(&self, user_id: UserId, tag: &str, delta: f64) -> Result<f64, StoreError> {
        let mut conn = self.connection.clone();
        let weight: f64 = conn.zincr(tag_scores_key(user_id), tag, delta).await?;
        Ok(weight)
    }
}

#[async_trait]
impl ScoreCache for RedisStore {
    async fn upsert(&self, user_id: UserId, post_id: PostId, score: f64) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let () = conn
            .zadd(feed_key(user_id), post_id.to_string(), score)
            .await?;
        Ok(())
    }

    async fn top_n(&self, user_id: UserId, n: usize) -> Result<Vec<PostId>, StoreError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.connection.clone();
        let members: Vec<String> = conn.zrevrange(feed_key(user_id), 0, range_stop(n)).await?;

        let mut post_ids = Vec::with_capacity(members.len());
        for member in members {
            match Uuid::parse_str(&member) {
                Ok(post_id) => post_ids.push(post_id),
                Err(error) => {
                    warn!(%user_id, %member, %error, "skipping malformed feed cache member");
                }
            }
        }
        Ok(post_ids)
    }

    async fn score(&self, user_id: UserId, post_id: PostId) -> Result<Option<f64>, StoreError> {
        let mut conn = self.connection.clone();
        let score: Option<f64> = conn.zscore(feed_key(user_id), post_id.to_string()).await?;
        Ok(score)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let reply: String = redis::cmd("PING").query_async(&mut conn).await?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(StoreError::Malformed {
                what: "PING reply",
                detail: reply,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn connect() -> Option<RedisStore> {
        let url = std::env::var("REDIS_URL").ok()?;
        Some(
            RedisStore::connect(&url, 1, Duration::from_millis(500))
                .await
                .expect("redis connection"),
        )
    }

    #[test]
    fn keys_follow_user_layout() {
        let user = Uuid::nil();
        assert_eq!(
            tag_scores_key(user),
            "user:00000000-0000-0000-0000-000000000000:tag_scores"
        );
        assert_eq!(
            feed_key(user),
            "user:00000000-0000-0000-0000-000000000000:feed"
        );
    }

    #[test]
    fn range_stop_is_inclusive() {
        assert_eq!(range_stop(5), 4);
        assert_eq!(range_stop(1), 0);
    }

    #[tokio::test]
    #[ignore] // REDIS_URL が必要
    async fn feed_cache_is_last_write_wins() {
        let Some(store) = connect().await else {
            return;
        };
        let user = Uuid::new_v4();
        let post = Uuid::new_v4();
        let rival = Uuid::new_v4();

        store.upsert(user, post, 5.0).await.expect("first write");
        store.upsert(user, rival, 7.0).await.expect("rival write");
        store.upsert(user, post, 9.0).await.expect("overwrite");

        assert_eq!(store.top_n(user, 1).await.expect("top"), vec![post]);
        assert_eq!(store.score(user, post).await.expect("score"), Some(9.0));
        assert_eq!(
            store.top_n(user, 10).await.expect("top"),
            vec![post, rival]
        );
    }

    #[tokio::test]
    #[ignore] // REDIS_URL が必要
    async fn interest_weights_round_trip() {
        let Some(store) = connect().await else {
            return;
        };
        let user = Uuid::new_v4();

        store.increment(user, "cats", 3.0).await.expect("cats");
        store.increment(user, "dogs", 1.0).await.expect("dogs");

        assert_eq!(
            store.top_tags(user, 5).await.expect("top tags"),
            vec!["cats".to_string(), "dogs".to_string()]
        );
        assert_eq!(store.weight(user, "cats").await.expect("weight"), 3.0);
        assert_eq!(store.weight(user, "fish").await.expect("weight"), 0.0);
        store.ping().await.expect("ping");
    }
}
