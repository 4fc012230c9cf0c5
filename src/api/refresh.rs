use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use super::error_response;
use crate::app::AppState;
use crate::store::UserId;

#[derive(Debug, Serialize)]
pub(crate) struct RefreshStatus {
    user_id: UserId,
    tracking: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct ActiveRefreshes {
    users: Vec<UserId>,
    interval_secs: u64,
    limit: usize,
}

/// PUT /v1/feed/{user_id}/refresh
pub(crate) async fn start(State(state): State<AppState>, Path(user_id): Path<UserId>) -> Response {
    let created = state.scheduler().start(user_id);
    let tracking = state.scheduler().is_tracking(user_id);
    if !tracking {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "refresh scheduler is shutting down",
        );
    }

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    (status, Json(RefreshStatus { user_id, tracking })).into_response()
}

/// DELETE /v1/feed/{user_id}/refresh
pub(crate) async fn stop(State(state): State<AppState>, Path(user_id): Path<UserId>) -> Response {
    if state.scheduler().stop(user_id) {
        StatusCode::NO_CONTENT.into_response()
    } else {
        error_response(
            StatusCode::NOT_FOUND,
            format!("no refresh running for {user_id}"),
        )
    }
}

/// GET /v1/refresh
pub(crate) async fn list(State(state): State<AppState>) -> Json<ActiveRefreshes> {
    let scheduler = state.scheduler();
    let settings = scheduler.settings();
    Json(ActiveRefreshes {
        users: scheduler.active_users(),
        interval_secs: settings.interval.as_secs(),
        limit: settings.limit,
    })
}
