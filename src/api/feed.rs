use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error_response;
use crate::app::AppState;
use crate::pipeline::FeedError;
use crate::store::{Post, PostId, UserId};

#[derive(Debug, Deserialize)]
pub(crate) struct FeedQuery {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CachedQuery {
    n: Option<usize>,
}

#[derive(Debug, Serialize)]
pub(crate) struct FeedResponse {
    user_id: UserId,
    post_ids: Vec<PostId>,
    posts: Vec<Post>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CachedFeedResponse {
    user_id: UserId,
    post_ids: Vec<PostId>,
}

/// GET /v1/feed/{user_id}?limit=
pub(crate) async fn build(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Query(query): Query<FeedQuery>,
) -> Response {
    let limit = match resolve_limit(&state, "limit", query.limit) {
        Ok(limit) => limit,
        Err(response) => return response,
    };

    match state
        .engine()
        .build_feed_with_deadline(user_id, limit, state.config().request_timeout())
        .await
    {
        Ok(feed) => Json(FeedResponse {
            user_id,
            post_ids: feed.post_ids,
            posts: feed.posts,
        })
        .into_response(),
        Err(error) => feed_error_response(user_id, &error),
    }
}

/// GET /v1/feed/{user_id}/cached?n=
pub(crate) async fn cached(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Query(query): Query<CachedQuery>,
) -> Response {
    let n = match resolve_limit(&state, "n", query.n) {
        Ok(n) => n,
        Err(response) => return response,
    };

    match state.engine().cached_feed(user_id, n).await {
        Ok(post_ids) => Json(CachedFeedResponse { user_id, post_ids }).into_response(),
        Err(error) => feed_error_response(user_id, &error),
    }
}

fn resolve_limit(
    state: &AppState,
    name: &'static str,
    requested: Option<usize>,
) -> Result<usize, Response> {
    let max = state.config().max_limit().get();
    let limit = requested.unwrap_or_else(|| state.config().default_limit());
    if limit > max {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            format!("{name} must be at most {max}"),
        ));
    }
    Ok(limit)
}

fn feed_error_response(user_id: UserId, error: &FeedError) -> Response {
    // ビルド失敗はエンジン側で記録済み
    if matches!(error, FeedError::CachedRead(_)) {
        warn!(%user_id, %error, "cached feed request failed");
    } else {
        debug!(%user_id, %error, "feed request failed");
    }
    let status = match error {
        FeedError::DeadlineExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
        FeedError::Hydration(_) | FeedError::CachedRead(_) | FeedError::Cancelled => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    };
    error_response(status, error.to_string())
}
