//! Route modules and request plumbing shared between them.

pub mod cache_stats;
pub mod health;
pub mod m3u8_proxy;
pub mod stream;
pub mod ts_proxy;

use axum::Router;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, HOST,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;

use hlsgate::headers::merge_headers;

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;

/// Query contract shared by the playlist and segment proxies.
#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    pub url: Option<String>,
    pub headers: Option<String>,
}

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/m3u8-proxy", m3u8_proxy::router())
        .nest("/ts-proxy", ts_proxy::router())
        .nest("/cache-stats", cache_stats::router())
        .nest("/stream", stream::router())
        .nest("/healthz", health::router())
        .with_state(state)
}

/// The relay's externally visible base URL, derived per request: forwarded
/// proto when a fronting proxy set one, the Host header for the authority.
pub fn proxy_base(headers: &HeaderMap) -> String {
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("{scheme}://{host}")
}

/// Decode the `headers=` query value (JSON object of name -> value) into a
/// header map. Absent means empty. Returns the verbatim JSON string
/// alongside, for re-embedding into rewritten URLs.
pub fn decode_header_json(raw: Option<String>) -> ApiResult<(String, HeaderMap)> {
    let raw = raw.unwrap_or_else(|| "{}".to_string());

    let decoded: std::collections::BTreeMap<String, String> = serde_json::from_str(&raw)
        .map_err(|_| ApiError::bad_request("Invalid headers JSON"))?;

    let mut headers = HeaderMap::new();
    for (name, value) in decoded {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ApiError::bad_request("Invalid header name"))?;
        let value = HeaderValue::from_str(&value)
            .map_err(|_| ApiError::bad_request("Invalid header value"))?;
        headers.insert(name, value);
    }

    Ok((raw, headers))
}

/// Escape hatches may arrive as real request headers or inside the
/// `headers=` JSON; the JSON wins on collision.
pub fn overlay_client_headers(request_headers: &HeaderMap, json_headers: &HeaderMap) -> HeaderMap {
    merge_headers(&[request_headers, json_headers])
}

/// Wildcard CORS set every proxy response carries.
pub fn apply_cors(headers: &mut HeaderMap) {
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("*"));
}
