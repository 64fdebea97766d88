//! Playlist proxy route.
//!
//! Fetches an upstream manifest, rewrites every embedded URL to route back
//! through the relay, and (for media playlists) kicks off the segment
//! prefetch fan-out before the response is returned.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use url::Url;

use hlsgate::config::env_flag;
use hlsgate::headers::build_outbound_headers;
use hlsgate::hls::{
    MANIFEST_CONTENT_TYPE, RewriteContext, fetch_manifest, rewrite_manifest, spawn_prefetch,
};

use crate::api::error::{ApiError, ApiResult};
use crate::api::routes::{
    ProxyQuery, apply_cors, decode_header_json, overlay_client_headers, proxy_base,
};
use crate::api::server::AppState;

/// Environment switch that turns this whole route off.
pub const DISABLE_M3U8_ENV: &str = "DISABLE_M3U8";

/// Create the playlist proxy router.
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(m3u8_proxy_get).options(preflight))
}

async fn preflight() -> impl IntoResponse {
    let mut headers = HeaderMap::new();
    apply_cors(&mut headers);
    (StatusCode::NO_CONTENT, headers)
}

async fn m3u8_proxy_get(
    State(state): State<AppState>,
    Query(query): Query<ProxyQuery>,
    request_headers: HeaderMap,
) -> ApiResult<Response> {
    if env_flag(DISABLE_M3U8_ENV) {
        return Err(ApiError::not_found("M3U8 proxying is disabled"));
    }

    let raw_url = query
        .url
        .ok_or_else(|| ApiError::bad_request("Missing url query parameter"))?;
    let manifest_url = Url::parse(&raw_url)
        .map_err(|e| ApiError::bad_request(format!("Invalid url: {e}")))?;

    let (headers_json, json_headers) = decode_header_json(query.headers)?;
    let client_headers = overlay_client_headers(&request_headers, &json_headers);
    let outbound = build_outbound_headers(&client_headers);

    let text = fetch_manifest(
        &state.pools,
        &manifest_url,
        outbound.clone(),
        state.config.fetch.manifest_fetch_timeout,
    )
    .await?;

    let base = proxy_base(&request_headers);
    let rewritten = rewrite_manifest(
        &text,
        &RewriteContext {
            manifest_url: &manifest_url,
            headers_json: &headers_json,
            proxy_base: &base,
        },
    );

    // Media playlists warm the cache in the background; the client gets the
    // rewritten text without waiting on any of it.
    if !rewritten.is_master {
        spawn_prefetch(
            rewritten.prefetch_urls,
            outbound,
            Arc::clone(&state.pools),
            Arc::clone(&state.cache),
            state.config.fetch.segment_fetch_timeout,
        );
    }

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(MANIFEST_CONTENT_TYPE));
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    apply_cors(&mut headers);

    Ok((StatusCode::OK, headers, rewritten.body).into_response())
}
