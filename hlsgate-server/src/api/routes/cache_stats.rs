//! Cache statistics route.

use axum::extract::State;
use axum::http::header::CACHE_CONTROL;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tracing::debug;

use crate::api::server::AppState;

/// Create the cache stats router.
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(cache_stats_get))
}

/// Sweep expired entries, then report occupancy.
async fn cache_stats_get(State(state): State<AppState>) -> impl IntoResponse {
    let removed = state.cache.cleanup();
    if removed > 0 {
        debug!(removed, "dropped expired segments before stats snapshot");
    }

    let mut headers = HeaderMap::new();
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );

    (StatusCode::OK, headers, Json(state.cache.stats()))
}
