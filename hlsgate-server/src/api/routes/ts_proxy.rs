//! Segment proxy route.
//!
//! Serves transport-stream segments (and key bodies) from the in-memory
//! cache when possible, falling back to a pooled origin fetch. Fetched
//! bytes are cached opportunistically; with the cache switched off the
//! upstream body streams straight through instead.

use std::collections::HashMap;

use axum::Router;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use futures::TryStreamExt;
use reqwest::Method;
use tracing::debug;
use url::Url;

use hlsgate::ProxyError;
use hlsgate::cache::cache_disabled;
use hlsgate::headers::build_outbound_headers;
use hlsgate::hls::snapshot_headers;

use crate::api::error::{ApiError, ApiResult};
use crate::api::routes::{ProxyQuery, apply_cors, decode_header_json, overlay_client_headers};
use crate::api::server::AppState;

/// Connection-scoped headers that must not be replayed from a stored
/// snapshot. Content length is recomputed from the body we actually send.
const HOP_BY_HOP: [&str; 4] = [
    "connection",
    "keep-alive",
    "transfer-encoding",
    "content-length",
];

/// Create the segment proxy router.
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(ts_proxy_get).options(preflight))
}

async fn preflight() -> impl IntoResponse {
    let mut headers = HeaderMap::new();
    apply_cors(&mut headers);
    (StatusCode::NO_CONTENT, headers)
}

async fn ts_proxy_get(
    State(state): State<AppState>,
    Query(query): Query<ProxyQuery>,
    request_headers: HeaderMap,
) -> ApiResult<Response> {
    let raw_url = query
        .url
        .ok_or_else(|| ApiError::bad_request("Missing url query parameter"))?;
    let segment_url = Url::parse(&raw_url)
        .map_err(|e| ApiError::bad_request(format!("Invalid url: {e}")))?;

    let (_, json_headers) = decode_header_json(query.headers)?;

    if let Some(entry) = state.cache.get(segment_url.as_str()) {
        debug!(url = %segment_url, size = entry.size_bytes, "segment served from cache");
        return Ok(segment_response(
            StatusCode::OK,
            &entry.headers,
            Body::from(entry.bytes.clone()),
        ));
    }

    let client_headers = overlay_client_headers(&request_headers, &json_headers);
    let outbound = build_outbound_headers(&client_headers);

    let upstream = state
        .pools
        .request(
            &segment_url,
            Method::GET,
            outbound,
            None,
            Some(state.config.fetch.segment_fetch_timeout),
        )
        .await?;

    let status = upstream.status();
    let upstream_headers = snapshot_headers(upstream.headers());

    if cache_disabled() {
        let stream = upstream.bytes_stream().map_err(std::io::Error::other);
        return Ok(segment_response(
            status,
            &upstream_headers,
            Body::from_stream(stream),
        ));
    }

    let bytes = upstream.bytes().await.map_err(ProxyError::from)?;
    if status.is_success() {
        state
            .cache
            .set(segment_url.as_str(), bytes.clone(), upstream_headers.clone());
    }

    Ok(segment_response(status, &upstream_headers, Body::from(bytes)))
}

fn segment_response(
    status: StatusCode,
    stored: &HashMap<String, String>,
    body: Body,
) -> Response {
    let mut headers = HeaderMap::new();
    for (name, value) in stored {
        if HOP_BY_HOP.contains(&name.as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }
    apply_cors(&mut headers);

    let mut response = (status, body).into_response();
    *response.headers_mut() = headers;
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::http::{Request as HttpRequest, header};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;
    use tower::ServiceExt;

    use crate::api::routes::create_router;

    async fn spawn_counting_upstream() -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);

        let app = Router::new().route(
            "/seg0.ts",
            get(move || {
                let hits = Arc::clone(&hits_clone);
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    ([(header::CONTENT_TYPE, "video/mp2t")], "segment-bytes")
                }
            }),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{addr}"), hits)
    }

    fn segment_request(target: &str) -> HttpRequest<Body> {
        let mut ser = url::form_urlencoded::Serializer::new(String::new());
        ser.append_pair("url", target);
        ser.append_pair("headers", "{}");
        HttpRequest::builder()
            .uri(format!("/ts-proxy?{}", ser.finish()))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn miss_fetches_and_caches_then_hit_skips_the_origin() {
        let (upstream, hits) = spawn_counting_upstream().await;
        let state = AppState::default();
        let target = format!("{upstream}/seg0.ts");

        let response = create_router(state.clone())
            .oneshot(segment_request(&target))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), "video/mp2t");
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "*"
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(body.as_ref(), b"segment-bytes");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(state.cache.len(), 1);

        let response = create_router(state.clone())
            .oneshot(segment_request(&target))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(body.as_ref(), b"segment-bytes");
        // second request was answered from cache
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn upstream_error_status_passes_through_uncached() {
        let (upstream, _) = spawn_counting_upstream().await;
        let state = AppState::default();
        let target = format!("{upstream}/missing.ts");

        let response = create_router(state.clone())
            .oneshot(segment_request(&target))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(state.cache.len(), 0);
    }

    #[tokio::test]
    async fn missing_url_is_a_bad_request() {
        let response = create_router(AppState::default())
            .oneshot(
                HttpRequest::builder()
                    .uri("/ts-proxy")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
