/// インメモリストアを使ったフィードエンジンの結合テスト。
use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use clawmark_feed::observability::metrics::Metrics;
use clawmark_feed::pipeline::{FeedEngine, FeedError};
use clawmark_feed::store::{InterestStore, MemoryStore, Post, ScoreCache, StoreBundle};
use rstest::rstest;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn engine(store: &Arc<MemoryStore>) -> FeedEngine {
    FeedEngine::new(
        StoreBundle::in_memory(store.clone()),
        Arc::new(Metrics::detached().expect("metrics")),
    )
}

/// 新しい順に `count` 件の投稿を入れ、挿入した投稿を返す。
async fn seed_posts(store: &MemoryStore, tag: &str, count: usize) -> Vec<Post> {
    let author = Uuid::new_v4();
    let now = Utc::now();
    let mut posts = Vec::with_capacity(count);
    for i in 0..count {
        let minutes = i64::try_from(i).expect("small index");
        let post = Post::new(author, format!("{tag} #{i}"), vec![tag.to_string()])
            .with_created_at(now - ChronoDuration::minutes(minutes));
        store.insert_post(post.clone()).await;
        posts.push(post);
    }
    posts
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(2)]
#[case(7)]
#[case(10)]
#[case(40)]
#[tokio::test]
async fn merged_feed_respects_budget_and_uniqueness(#[case] limit: usize) {
    let store = Arc::new(MemoryStore::with_seed(42));
    let user = Uuid::new_v4();
    store.set_interest(user, "rust", 4.0).await;
    seed_posts(&store, "rust", 12).await;
    seed_posts(&store, "gardening", 12).await;

    let feed = engine(&store).build_feed(user, limit).await.expect("feed");

    assert!(feed.post_ids.len() <= limit);
    let unique: HashSet<_> = feed.post_ids.iter().collect();
    assert_eq!(unique.len(), feed.post_ids.len());
    assert!(store.cached_entries(user).await <= limit / 2);
}

#[tokio::test]
async fn personalized_candidates_lead_in_recency_order() {
    let store = Arc::new(MemoryStore::with_seed(1));
    let user = Uuid::new_v4();
    store.set_interest(user, "rust", 4.0).await;
    let rust = seed_posts(&store, "rust", 6).await;
    seed_posts(&store, "gardening", 6).await;

    let feed = engine(&store).build_feed(user, 6).await.expect("feed");

    let expected: Vec<_> = rust.iter().take(3).map(|post| post.id).collect();
    assert_eq!(&feed.post_ids[..3], expected.as_slice());
    let hydrated: Vec<_> = feed.posts.iter().map(|post| post.id).collect();
    assert_eq!(hydrated, feed.post_ids);
}

#[tokio::test]
async fn cached_feed_ranks_by_score_not_recency() {
    let store = Arc::new(MemoryStore::new());
    let user = Uuid::new_v4();
    store.set_interest(user, "rust", 1.0).await;
    let posts = seed_posts(&store, "rust", 3).await;
    // 一番古い投稿にだけいいねがある
    let oldest = posts[2].id;
    store.record_interaction(user, oldest).await;

    let engine = engine(&store);
    engine.build_feed(user, 6).await.expect("feed");

    let cached = engine.cached_feed(user, 3).await.expect("cached");
    assert_eq!(cached.first(), Some(&oldest));
    assert_eq!(store.score(user, oldest).await.expect("score"), Some(6.0));
}

#[tokio::test]
async fn rebuilding_overwrites_cached_scores() {
    let store = Arc::new(MemoryStore::new());
    let user = Uuid::new_v4();
    store.set_interest(user, "rust", 1.0).await;
    let post = seed_posts(&store, "rust", 1).await.remove(0);
    let engine = engine(&store);

    engine.build_feed(user, 2).await.expect("first build");
    assert_eq!(store.score(user, post.id).await.expect("score"), Some(1.0));

    store.increment(user, "rust", 2.0).await.expect("increment");
    engine.build_feed(user, 2).await.expect("second build");

    assert_eq!(store.score(user, post.id).await.expect("score"), Some(3.0));
    assert_eq!(store.cached_entries(user).await, 1);
}

#[tokio::test]
async fn top_tag_window_is_five() {
    let store = Arc::new(MemoryStore::new());
    let user = Uuid::new_v4();
    for (i, tag) in ["a", "b", "c", "d", "e", "f"].iter().enumerate() {
        let weight = 10.0 - f64::from(u32::try_from(i).expect("small index"));
        store.set_interest(user, *tag, weight).await;
    }
    let outside = seed_posts(&store, "f", 1).await.remove(0);

    let feed = engine(&store).build_feed(user, 2).await.expect("feed");

    // 6 番目のタグの投稿は発見枠からしか入らないので、スコアは書かれない
    assert!(feed.post_ids.len() <= 1);
    assert_eq!(store.score(user, outside.id).await.expect("score"), None);
}

#[tokio::test]
async fn concurrent_builds_share_one_cache() {
    let store = Arc::new(MemoryStore::with_seed(3));
    let user = Uuid::new_v4();
    store.set_interest(user, "rust", 2.0).await;
    seed_posts(&store, "rust", 4).await;
    let engine = Arc::new(engine(&store));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.build_feed(user, 8).await })
        })
        .collect();
    for handle in handles {
        handle.await.expect("join").expect("feed");
    }

    assert_eq!(store.cached_entries(user).await, 4);
}

#[tokio::test]
async fn cancellation_is_reported_to_the_caller() {
    let store = Arc::new(MemoryStore::new());
    let token = CancellationToken::new();
    token.cancel();

    let result = engine(&store)
        .build_feed_with_cancel(Uuid::new_v4(), 10, &token)
        .await;

    assert!(matches!(result, Err(FeedError::Cancelled)));
}
