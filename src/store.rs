pub mod error;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod redis_zset;
pub mod traits;

use std::sync::Arc;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use models::{Post, PostCandidate, PostId, UserId};
pub use postgres::PgStore;
pub use redis_zset::RedisStore;
pub use traits::{InteractionStore, InterestStore, PostRepository, ScoreCache};

/// エンジンに注入するストア一式。
#[derive(Clone)]
pub struct StoreBundle {
    pub interests: Arc<dyn InterestStore>,
    pub interactions: Arc<dyn InteractionStore>,
    pub posts: Arc<dyn PostRepository>,
    pub score_cache: Arc<dyn ScoreCache>,
}

impl StoreBundle {
    /// 1つの [`MemoryStore`] ですべての役割を担うバンドルを作る。
    #[must_use]
    pub fn in_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            interests: store.clone(),
            interactions: store.clone(),
            posts: store.clone(),
            score_cache: store,
        }
    }

    /// 投稿といいねは Postgres、興味とスコアキャッシュは Redis。
    #[must_use]
    pub fn postgres_redis(pg: Arc<PgStore>, redis: Arc<RedisStore>) -> Self {
        Self {
            interests: redis.clone(),
            interactions: pg.clone(),
            posts: pg,
            score_cache: redis,
        }
    }
}
