//! Generic pass-through proxy route.
//!
//! Forwards a request to an arbitrary destination and streams the response
//! back, with the relay's header policy applied. No caching, no rewriting;
//! this is the escape hatch for non-HLS media the relay fronts.

use axum::Router;
use axum::body::Body;
use axum::extract::{Query, Request, State};
use axum::http::header::{HOST, USER_AGENT};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use futures::TryStreamExt;
use serde::Deserialize;
use tracing::info;
use url::Url;

use hlsgate::config::env_flag;
use hlsgate::headers::{DEFAULT_USER_AGENT, merge_headers, scrub};

use crate::api::error::{ApiError, ApiResult};
use crate::api::routes::apply_cors;
use crate::api::server::AppState;

/// Environment switch that logs the outbound request line.
pub const REQ_DEBUG_ENV: &str = "REQ_DEBUG";

/// Request bodies are buffered so a pool fallback can replay them.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Headers that belong to our connection, not the forwarded response.
const HOP_BY_HOP: [&str; 3] = ["connection", "keep-alive", "transfer-encoding"];

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub destination: Option<String>,
}

/// Create the pass-through router.
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(stream_passthrough).post(stream_passthrough))
}

async fn stream_passthrough(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
    request: Request,
) -> ApiResult<Response> {
    let raw = query
        .destination
        .ok_or_else(|| ApiError::bad_request("Missing destination query parameter"))?;
    let destination = Url::parse(&raw)
        .map_err(|e| ApiError::bad_request(format!("Invalid destination: {e}")))?;

    let method = request.method().clone();

    // Defaults first, caller headers over them, then the scrub pass; the
    // Host header always belongs to the destination.
    let mut defaults = HeaderMap::new();
    defaults.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
    let mut outbound = scrub(&merge_headers(&[&defaults, request.headers()]));
    outbound.remove(HOST);

    if env_flag(REQ_DEBUG_ENV) {
        info!(method = %method, url = %destination, headers = ?outbound, "outbound request");
    }

    let body = axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES)
        .await
        .map_err(|e| ApiError::bad_request(format!("Unreadable request body: {e}")))?;
    let body = (!body.is_empty()).then_some(body);

    let upstream = state
        .pools
        .request(&destination, method, outbound, body, None)
        .await?;

    let status = upstream.status();
    let mut headers = HeaderMap::new();
    for (name, value) in upstream.headers() {
        if HOP_BY_HOP.contains(&name.as_str()) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    apply_cors(&mut headers);

    let stream = upstream.bytes_stream().map_err(std::io::Error::other);
    let mut response = (status, Body::from_stream(stream)).into_response();
    *response.headers_mut() = headers;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::http::{Request as HttpRequest, StatusCode, header};
    use tokio::net::TcpListener;
    use tower::ServiceExt;

    use crate::api::routes::create_router;

    async fn upstream_echo(req: HttpRequest<Body>) -> impl IntoResponse {
        // Reflect the forwarding headers so the scrub pass is observable.
        let forwarded_for = req.headers().contains_key("x-forwarded-for");
        let ua = req
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        (
            [(header::CONTENT_TYPE, "video/mp2t")],
            format!("forwarded-for={forwarded_for};ua={ua}"),
        )
    }

    #[tokio::test]
    async fn passthrough_streams_and_scrubs_transport_headers() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/media", get(upstream_echo));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let mut ser = url::form_urlencoded::Serializer::new(String::new());
        ser.append_pair("destination", &format!("http://{addr}/media"));

        let request = HttpRequest::builder()
            .uri(format!("/stream?{}", ser.finish()))
            .header("x-forwarded-for", "1.2.3.4")
            .body(Body::empty())
            .unwrap();

        let response = create_router(AppState::default())
            .oneshot(request)
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
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("forwarded-for=false"));
        assert!(body.contains(&format!("ua={DEFAULT_USER_AGENT}")));
    }

    #[tokio::test]
    async fn missing_destination_is_a_bad_request() {
        let response = create_router(AppState::default())
            .oneshot(
                HttpRequest::builder()
                    .uri("/stream")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
