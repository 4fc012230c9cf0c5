//! In-memory storage driver.
//!
//! Implements every store trait on a single [`MemoryStore`]. Used by `FEED_STORAGE_BACKEND=memory`
//! and by the test suite. Locks are only held for in-memory work, never across an await on
//! another store.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use tokio::sync::RwLock;

use super::error::StoreError;
use super::models::{Post, PostCandidate, PostId, UserId};
use super::traits::{InteractionStore, InterestStore, PostRepository, ScoreCache};

/// スコア降順、同点は投稿ID降順で並ぶキャッシュエントリ（ZREVRANGE と同じ順）。
#[derive(Debug, Clone, Copy)]
struct RankedEntry {
    score: f64,
    post_id: PostId,
}

impl PartialEq for RankedEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RankedEntry {}

impl PartialOrd for RankedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RankedEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| other.post_id.cmp(&self.post_id))
    }
}

#[derive(Debug, Default)]
struct UserFeed {
    scores: HashMap<PostId, f64>,
    ranked: BTreeSet<RankedEntry>,
}

impl UserFeed {
    fn upsert(&mut self, post_id: PostId, score: f64) {
        if let Some(previous) = self.scores.insert(post_id, score) {
            self.ranked.remove(&RankedEntry {
                score: previous,
                post_id,
            });
        }
        self.ranked.insert(RankedEntry { score, post_id });
    }

    fn top_n(&self, n: usize) -> Vec<PostId> {
        self.ranked.iter().take(n).map(|entry| entry.post_id).collect()
    }
}

pub struct MemoryStore {
    posts: RwLock<HashMap<PostId, Post>>,
    interests: RwLock<HashMap<UserId, HashMap<String, f64>>>,
    interactions: RwLock<HashSet<(UserId, PostId)>>,
    feeds: RwLock<HashMap<UserId, UserFeed>>,
    rng: Mutex<StdRng>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// ランダムサンプリングを再現可能にしたストアを作成する。
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            posts: RwLock::new(HashMap::new()),
            interests: RwLock::new(HashMap::new()),
            interactions: RwLock::new(HashSet::new()),
            feeds: RwLock::new(HashMap::new()),
            rng: Mutex::new(rng),
        }
    }

    pub async fn insert_post(&self, post: Post) {
        self.posts.write().await.insert(post.id, post);
    }

    pub async fn set_interest(&self, user_id: UserId, tag: impl Into<String>, weight: f64) {
        self.interests
            .write()
            .await
            .entry(user_id)
            .or_default()
            .insert(tag.into(), weight);
    }

    pub async fn record_interaction(&self, user_id: UserId, post_id: PostId) {
        self.interactions.write().await.insert((user_id, post_id));
    }

    pub async fn cached_entries(&self, user_id: UserId) -> usize {
        self.feeds
            .read()
            .await
            .get(&user_id)
            .map_or(0, |feed| feed.scores.len())
    }

    fn sample(&self, ids: &[PostId], limit: usize) -> Vec<PostId> {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        ids.choose_multiple(&mut *rng, limit).copied().collect()
    }
}

#[async_trait]
impl InterestStore for MemoryStore {
    async fn top_tags(&self, user_id: UserId, n: usize) -> Result<Vec<String>, StoreError> {
        let guard = self.interests.read().await;
        let Some(weights) = guard.get(&user_id) else {
            return Ok(Vec::new());
        };

        let mut ranked: Vec<(&String, f64)> =
            weights.iter().map(|(tag, weight)| (tag, *weight)).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| b.0.cmp(a.0)));

        Ok(ranked
            .into_iter()
            .take(n)
            .map(|(tag, _)| tag.clone())
            .collect())
    }

    async fn weight(&self, user_id: UserId, tag: &str) -> Result<f64, StoreError> {
        Ok(self
            .interests
            .read()
            .await
            .get(&user_id)
            .and_then(|weights| weights.get(tag).copied())
            .unwrap_or(0.0))
    }

    async fn increment(&self, user_id: UserId, tag: &str, delta: f64) -> Result<f64, StoreError> {
        let mut guard = self.interests.write().await;
        let weight = guard
            .entry(user_id)
            .or_default()
            .entry(tag.to_string())
            .or_insert(0.0);
        *weight += delta;
        Ok(*weight)
    }
}

#[async_trait]
impl InteractionStore for MemoryStore {
    async fn has_interaction(&self, user_id: UserId, post_id: PostId) -> Result<bool, StoreError> {
        Ok(self.interactions.read().await.contains(&(user_id, post_id)))
    }
}

#[async_trait]
impl PostRepository for MemoryStore {
    async fn by_tags_recent(
        &self,
        tags: &[String],
        limit: usize,
    ) -> Result<Vec<PostCandidate>, StoreError> {
        if tags.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let guard = self.posts.read().await;
        let mut matching: Vec<&Post> = guard
            .values()
            .filter(|post| post.tags.iter().any(|tag| tags.contains(tag)))
            .collect();
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        Ok(matching
            .into_iter()
            .take(limit)
            .map(Post::candidate)
            .collect())
    }

    async fn random(&self, limit: usize) -> Result<Vec<PostId>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let ids: Vec<PostId> = self.posts.read().await.keys().copied().collect();
        Ok(self.sample(&ids, limit))
    }

    async fn by_ids(&self, ids: &[PostId]) -> Result<Vec<Post>, StoreError> {
        let guard = self.posts.read().await;
        Ok(ids.iter().filter_map(|id| guard.get(id).cloned()).collect())
    }
}

#[async_trait]
impl ScoreCache for MemoryStore {
    async fn upsert(&self, user_id: UserId, post_id: PostId, score: f64) -> Result<(), StoreError> {
        self.feeds
            .write()
            .await
            .entry(user_id)
            .or_default()
            .upsert(post_id, score);
        Ok(())
    }

    async fn top_n(&self, user_id: UserId, n: usize) -> Result<Vec<PostId>, StoreError> {
        Ok(self
            .feeds
            .read()
            .await
            .get(&user_id)
            .map(|feed| feed.top_n(n))
            .unwrap_or_default())
    }

    async fn score(&self, user_id: UserId, post_id: PostId) -> Result<Option<f64>, StoreError> {
        Ok(self
            .feeds
            .read()
            .await
            .get(&user_id)
            .and_then(|feed| feed.scores.get(&post_id).copied()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::*;

    fn tags(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| (*value).to_string()).collect()
    }

    #[tokio::test]
    async fn upsert_twice_with_same_score_is_idempotent() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let post = Uuid::new_v4();

        store.upsert(user, post, 4.0).await.unwrap();
        let once = store.top_n(user, 10).await.unwrap();
        store.upsert(user, post, 4.0).await.unwrap();
        let twice = store.top_n(user, 10).await.unwrap();

        assert_eq!(once, twice);
        assert_eq!(store.cached_entries(user).await, 1);
    }

    #[tokio::test]
    async fn last_write_wins() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let post = Uuid::new_v4();
        let rival = Uuid::new_v4();

        store.upsert(user, post, 5.0).await.unwrap();
        store.upsert(user, rival, 7.0).await.unwrap();
        store.upsert(user, post, 9.0).await.unwrap();

        assert_eq!(store.top_n(user, 1).await.unwrap(), vec![post]);
        assert_eq!(store.score(user, post).await.unwrap(), Some(9.0));
        assert_eq!(store.top_n(user, 5).await.unwrap(), vec![post, rival]);
    }

    #[tokio::test]
    async fn top_n_is_scoped_per_user() {
        let store = MemoryStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let post = Uuid::new_v4();

        store.upsert(alice, post, 1.0).await.unwrap();

        assert_eq!(store.top_n(alice, 3).await.unwrap(), vec![post]);
        assert!(store.top_n(bob, 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn tied_scores_break_by_descending_member() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let low = Uuid::from_u128(1);
        let high = Uuid::from_u128(2);
        for tag in ["a", "b", "c", "d", "e", "f"] {
            store.set_interest(user, tag, 1.0).await;
        }
        store.upsert(user, low, 3.0).await.unwrap();
        store.upsert(user, high, 3.0).await.unwrap();

        assert_eq!(
            store.top_tags(user, 5).await.unwrap(),
            tags(&["f", "e", "d", "c", "b"])
        );
        assert_eq!(store.top_n(user, 2).await.unwrap(), vec![high, low]);
    }

    #[tokio::test]
    async fn top_tags_orders_by_weight() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store.set_interest(user, "dogs", 1.0).await;
        store.set_interest(user, "cats", 3.0).await;
        store.set_interest(user, "birds", 2.0).await;

        assert_eq!(
            store.top_tags(user, 2).await.unwrap(),
            tags(&["cats", "birds"])
        );
        assert_eq!(store.weight(user, "fish").await.unwrap(), 0.0);
        assert_eq!(store.increment(user, "dogs", 2.5).await.unwrap(), 3.5);
    }

    #[tokio::test]
    async fn by_tags_recent_returns_newest_matching_first() {
        let store = MemoryStore::new();
        let author = Uuid::new_v4();
        let now = Utc::now();
        let old = Post::new(author, "old", tags(&["cats"])).with_created_at(now - Duration::hours(2));
        let new = Post::new(author, "new", tags(&["dogs"])).with_created_at(now);
        let other = Post::new(author, "other", tags(&["fish"])).with_created_at(now);
        for post in [old.clone(), new.clone(), other] {
            store.insert_post(post).await;
        }

        let candidates = store
            .by_tags_recent(&tags(&["cats", "dogs"]), 10)
            .await
            .unwrap();

        assert_eq!(candidates, vec![new.candidate(), old.candidate()]);
        assert!(store.by_tags_recent(&[], 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn random_never_exceeds_limit_or_repeats() {
        let store = MemoryStore::with_seed(7);
        let author = Uuid::new_v4();
        for i in 0..10 {
            store
                .insert_post(Post::new(author, format!("post {i}"), Vec::new()))
                .await;
        }

        let sample = store.random(4).await.unwrap();
        let unique: HashSet<_> = sample.iter().collect();

        assert_eq!(sample.len(), 4);
        assert_eq!(unique.len(), 4);
        assert_eq!(store.random(50).await.unwrap().len(), 10);
        assert!(store.random(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn by_ids_skips_unknown_ids() {
        let store = MemoryStore::new();
        let post = Post::new(Uuid::new_v4(), "hello", Vec::new());
        store.insert_post(post.clone()).await;

        let posts = store.by_ids(&[Uuid::new_v4(), post.id]).await.unwrap();

        assert_eq!(posts, vec![post]);
    }
}
