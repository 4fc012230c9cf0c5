pub(crate) mod feed;
pub(crate) mod health;
pub(crate) mod metrics;
pub(crate) mod refresh;

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::app::AppState;

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/health/ready", get(health::ready))
        .route("/health/live", get(health::live))
        .route("/metrics", get(metrics::exporter))
        .route("/v1/feed/{user_id}", get(feed::build))
        .route("/v1/feed/{user_id}/cached", get(feed::cached))
        .route(
            "/v1/feed/{user_id}/refresh",
            put(refresh::start).delete(refresh::stop),
        )
        .route("/v1/refresh", get(refresh::list))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    error: String,
}

pub(crate) fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}
