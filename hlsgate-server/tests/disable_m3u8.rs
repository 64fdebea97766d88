//! The playlist proxy honors the `DISABLE_M3U8` kill switch.
//!
//! Lives in its own test binary so the environment mutation cannot race
//! other tests.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use hlsgate_server::api::routes::create_router;
use hlsgate_server::api::server::AppState;

#[tokio::test]
async fn m3u8_proxy_returns_404_when_disabled() {
    // SAFETY: this binary's only test; no concurrent env readers.
    unsafe {
        std::env::set_var("DISABLE_M3U8", "true");
    }

    let response = create_router(AppState::default())
        .oneshot(
            Request::builder()
                .uri("/m3u8-proxy?url=https%3A%2F%2Fo.test%2Fa.m3u8")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = String::from_utf8(body.to_vec()).unwrap();
    assert!(body.contains("M3U8 proxying is disabled"));
}
