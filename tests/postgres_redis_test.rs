/// Postgres と Redis を使ったエンドツーエンドテスト。
///
/// `DATABASE_URL` と `REDIS_URL` が必要なため、デフォルトではスキップする。
use std::sync::Arc;
use std::time::Duration;

use clawmark_feed::observability::metrics::Metrics;
use clawmark_feed::pipeline::FeedEngine;
use clawmark_feed::store::{
    InterestStore, PgStore, Post, RedisStore, ScoreCache, StoreBundle,
};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

async fn stores() -> Option<(Arc<PgStore>, Arc<RedisStore>)> {
    let database_url = std::env::var("DATABASE_URL").ok()?;
    let redis_url = std::env::var("REDIS_URL").ok()?;

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .expect("database connection");
    let pg = PgStore::new(pool);
    pg.ensure_schema().await.expect("schema");
    let redis = RedisStore::connect(&redis_url, 1, Duration::from_millis(500))
        .await
        .expect("redis connection");
    Some((Arc::new(pg), Arc::new(redis)))
}

#[tokio::test]
#[ignore] // DATABASE_URL と REDIS_URL が必要
async fn engine_blends_over_postgres_and_redis() {
    let Some((pg, redis)) = stores().await else {
        return;
    };
    let user = Uuid::new_v4();
    let tag = format!("tag-{}", Uuid::new_v4());
    let liked = Post::new(Uuid::new_v4(), "liked", vec![tag.clone()]);
    let plain = Post::new(Uuid::new_v4(), "plain", vec![tag.clone()]);
    pg.insert_post(&liked).await.expect("liked");
    pg.insert_post(&plain).await.expect("plain");
    pg.insert_like(user, liked.id).await.expect("like");
    redis.increment(user, &tag, 2.0).await.expect("interest");

    let engine = FeedEngine::new(
        StoreBundle::postgres_redis(pg, redis.clone()),
        Arc::new(Metrics::detached().expect("metrics")),
    );
    let feed = engine.build_feed(user, 10).await.expect("feed");

    assert!(feed.post_ids.contains(&liked.id));
    assert!(feed.post_ids.contains(&plain.id));
    assert_eq!(redis.score(user, liked.id).await.expect("score"), Some(7.0));
    assert_eq!(redis.score(user, plain.id).await.expect("score"), Some(2.0));
    assert_eq!(
        engine.cached_feed(user, 1).await.expect("cached"),
        vec![liked.id]
    );
}
