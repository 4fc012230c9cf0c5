use std::sync::Arc;

use futures::future::try_join_all;

use crate::store::{InteractionStore, InterestStore, PostId, StoreError, UserId};

/// 過去にエンゲージした投稿に加算する固定ボーナス。
pub const INTERACTION_BOOST: f64 = 5.0;

/// スコアの内訳。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffinityScore {
    pub tag_match: f64,
    pub interaction_boost: f64,
}

impl AffinityScore {
    #[must_use]
    pub fn total(self) -> f64 {
        self.tag_match + self.interaction_boost
    }
}

/// 興味タグの重みとインタラクションの有無から親和度スコアを計算する。
///
/// Scoring only reads the stores. A tag without a stored weight contributes 0, so an empty tag
/// set or a user with no interests never fails on its own; store errors are returned as-is.
#[derive(Clone)]
pub struct Scorer {
    interests: Arc<dyn InterestStore>,
    interactions: Arc<dyn InteractionStore>,
}

impl Scorer {
    #[must_use]
    pub fn new(interests: Arc<dyn InterestStore>, interactions: Arc<dyn InteractionStore>) -> Self {
        Self {
            interests,
            interactions,
        }
    }

    /// # Errors
    /// いずれかのストア読み取りが失敗した場合は [`StoreError`] を返す。
    pub async fn score(
        &self,
        user_id: UserId,
        post_id: PostId,
        tags: &[String],
    ) -> Result<f64, StoreError> {
        Ok(self.breakdown(user_id, post_id, tags).await?.total())
    }

    /// # Errors
    /// いずれかのストア読み取りが失敗した場合は [`StoreError`] を返す。
    pub async fn breakdown(
        &self,
        user_id: UserId,
        post_id: PostId,
        tags: &[String],
    ) -> Result<AffinityScore, StoreError> {
        let weights = try_join_all(
            tags.iter()
                .map(|tag| self.interests.weight(user_id, tag.as_str())),
        );
        let interacted = self.interactions.has_interaction(user_id, post_id);
        let (weights, interacted) = futures::try_join!(weights, interacted)?;

        Ok(AffinityScore {
            tag_match: weights.iter().sum(),
            interaction_boost: if interacted { INTERACTION_BOOST } else { 0.0 },
        })
    }
}
