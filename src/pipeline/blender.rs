//! 個人化候補と発見候補をブレンドしてフィードを組み立てる。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::error::FeedError;
use super::merge::{CandidateBudget, merge_candidates};
use super::scorer::Scorer;
use crate::observability::metrics::Metrics;
use crate::store::{Post, PostCandidate, PostId, StoreBundle, StoreError, UserId};

/// 個人化候補の検索に使う上位タグ数（固定）。
pub const TOP_TAG_WINDOW: usize = 5;

/// 組み立て済みのフィード。
///
/// `post_ids` is the merged candidate order. `posts` holds the hydrated records in the same
/// order, minus any id the repository no longer knows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Feed {
    pub post_ids: Vec<PostId>,
    pub posts: Vec<Post>,
}

impl Feed {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.post_ids.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.post_ids.len()
    }
}

#[derive(Clone, Copy)]
enum Source {
    Personalized,
    Discovery,
}

impl Source {
    fn as_str(self) -> &'static str {
        match self {
            Self::Personalized => "personalized",
            Self::Discovery => "discovery",
        }
    }
}

/// フィード構築エンジン。ストアはすべて注入されたトレイトオブジェクト。
#[derive(Clone)]
pub struct FeedEngine {
    stores: StoreBundle,
    scorer: Scorer,
    metrics: Arc<Metrics>,
}

impl FeedEngine {
    #[must_use]
    pub fn new(stores: StoreBundle, metrics: Arc<Metrics>) -> Self {
        let scorer = Scorer::new(stores.interests.clone(), stores.interactions.clone());
        Self {
            stores,
            scorer,
            metrics,
        }
    }

    #[must_use]
    pub fn stores(&self) -> &StoreBundle {
        &self.stores
    }

    #[must_use]
    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    /// ユーザーのフィードを組み立てる。戻り値が現在のフィードの正とする。
    ///
    /// # Errors
    /// 投稿のハイドレーションに失敗した場合のみ [`FeedError::Hydration`] を返す。
    pub async fn build_feed(&self, user_id: UserId, limit: usize) -> Result<Feed, FeedError> {
        let started = Instant::now();
        let result = self.assemble(user_id, limit).await;
        self.record_outcome(user_id, started, &result);
        result
    }

    /// キャンセルトークンが発火した時点で未完了のストア呼び出しを破棄する。
    ///
    /// # Errors
    /// キャンセル時は [`FeedError::Cancelled`]、それ以外は [`Self::build_feed`] と同じ。
    pub async fn build_feed_with_cancel(
        &self,
        user_id: UserId,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Feed, FeedError> {
        let started = Instant::now();
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(FeedError::Cancelled),
            result = self.assemble(user_id, limit) => result,
        };
        self.record_outcome(user_id, started, &result);
        result
    }

    /// # Errors
    /// 期限切れの場合は [`FeedError::DeadlineExceeded`]、それ以外は [`Self::build_feed`] と同じ。
    pub async fn build_feed_with_deadline(
        &self,
        user_id: UserId,
        limit: usize,
        deadline: Duration,
    ) -> Result<Feed, FeedError> {
        let started = Instant::now();
        let result = tokio::time::timeout(deadline, self.assemble(user_id, limit))
            .await
            .unwrap_or(Err(FeedError::DeadlineExceeded(deadline)));
        self.record_outcome(user_id, started, &result);
        result
    }

    /// スコアキャッシュ上のスコア上位 `n` 件。
    ///
    /// This is a separate ranked view of scored personalized candidates, not the feed that
    /// [`Self::build_feed`] returned.
    ///
    /// # Errors
    /// キャッシュの読み取りに失敗した場合は [`FeedError::CachedRead`] を返す。
    pub async fn cached_feed(&self, user_id: UserId, n: usize) -> Result<Vec<PostId>, FeedError> {
        self.stores
            .score_cache
            .top_n(user_id, n)
            .await
            .map_err(FeedError::CachedRead)
    }

    #[instrument(skip_all, fields(user_id = %user_id, limit = limit))]
    async fn assemble(&self, user_id: UserId, limit: usize) -> Result<Feed, FeedError> {
        let budget = CandidateBudget::split(limit);
        if budget.total() == 0 {
            return Ok(Feed::default());
        }

        let (personalized, discovery) = tokio::join!(
            self.personalized(user_id, budget.personalized),
            self.discovery(budget.discovery),
        );
        let personalized = self.degrade(user_id, Source::Personalized, personalized);
        let discovery = self.degrade(user_id, Source::Discovery, discovery);

        let post_ids = merge_candidates(personalized, discovery);
        debug!(candidates = post_ids.len(), "merged feed candidates");

        let posts = self.hydrate(&post_ids).await?;
        Ok(Feed { post_ids, posts })
    }

    async fn personalized(&self, user_id: UserId, budget: usize) -> Result<Vec<PostId>, StoreError> {
        if budget == 0 {
            return Ok(Vec::new());
        }

        let tags = self.stores.interests.top_tags(user_id, TOP_TAG_WINDOW).await?;
        if tags.is_empty() {
            return Ok(Vec::new());
        }

        let candidates = self.stores.posts.by_tags_recent(&tags, budget).await?;
        let ids = join_all(
            candidates
                .into_iter()
                .take(budget)
                .map(|candidate| self.score_and_cache(user_id, candidate)),
        )
        .await;
        Ok(ids)
    }

    /// 候補をスコアリングしてキャッシュへ書き込む。失敗しても候補自体は残す。
    async fn score_and_cache(&self, user_id: UserId, candidate: PostCandidate) -> PostId {
        let post_id = candidate.id;
        let score = match self.scorer.score(user_id, post_id, &candidate.tags).await {
            Ok(score) => score,
            Err(error) => {
                self.metrics.scoring_failures.inc();
                warn!(%user_id, %post_id, %error, "scoring failed; skipping cache write");
                return post_id;
            }
        };

        match self.stores.score_cache.upsert(user_id, post_id, score).await {
            Ok(()) => self.metrics.cache_writes.inc(),
            Err(error) => {
                self.metrics.cache_write_failures.inc();
                warn!(%user_id, %post_id, score, %error, "score cache write failed");
            }
        }
        post_id
    }

    async fn discovery(&self, budget: usize) -> Result<Vec<PostId>, StoreError> {
        if budget == 0 {
            return Ok(Vec::new());
        }
        let mut ids = self.stores.posts.random(budget).await?;
        ids.truncate(budget);
        Ok(ids)
    }

    fn degrade(
        &self,
        user_id: UserId,
        source: Source,
        result: Result<Vec<PostId>, StoreError>,
    ) -> Vec<PostId> {
        result.unwrap_or_else(|error| {
            self.metrics.record_degraded(source.as_str());
            warn!(
                %user_id,
                source = source.as_str(),
                %error,
                "candidate source failed; continuing without it"
            );
            Vec::new()
        })
    }

    /// マージ順に並べ替えてハイドレートする。リポジトリに無い ID は落とす。
    async fn hydrate(&self, post_ids: &[PostId]) -> Result<Vec<Post>, FeedError> {
        if post_ids.is_empty() {
            return Ok(Vec::new());
        }

        let fetched = self
            .stores
            .posts
            .by_ids(post_ids)
            .await
            .map_err(FeedError::Hydration)?;

        let mut by_id: HashMap<PostId, Post> =
            fetched.into_iter().map(|post| (post.id, post)).collect();
        Ok(post_ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    fn record_outcome(&self, user_id: UserId, started: Instant, result: &Result<Feed, FeedError>) {
        self.metrics
            .feed_build_duration
            .observe(started.elapsed().as_secs_f64());
        match result {
            Ok(feed) => {
                self.metrics.feed_builds.inc();
                #[allow(clippy::cast_precision_loss)]
                let size = feed.len() as f64;
                self.metrics.feed_size.observe(size);
            }
            Err(FeedError::Cancelled) => {
                self.metrics.feed_build_failures.inc();
                debug!(%user_id, "feed build cancelled");
            }
            Err(error) => {
                self.metrics.feed_build_failures.inc();
                warn!(%user_id, %error, "feed build failed");
            }
        }
    }
}
