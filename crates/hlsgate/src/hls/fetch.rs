//! Manifest fetch and response-header snapshotting.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Method;
use reqwest::header::HeaderMap;
use url::Url;

use crate::error::{ProxyError, Result};
use crate::pool::PoolManager;

/// Fetch a playlist through the pool and return its text. Non-2xx upstream
/// responses abort with the status embedded in the error.
pub async fn fetch_manifest(
    pool: &PoolManager,
    url: &Url,
    headers: HeaderMap,
    timeout: Duration,
) -> Result<String> {
    let response = pool
        .request(url, Method::GET, headers, None, Some(timeout))
        .await?;

    if !response.status().is_success() {
        return Err(ProxyError::upstream_status(
            response.status(),
            url.as_str(),
            "manifest fetch",
        ));
    }

    let bytes = response.bytes().await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Snapshot response headers into a plain lowercased-name map. Values that
/// are not valid UTF-8 are dropped; duplicate names keep the first value.
pub fn snapshot_headers(headers: &HeaderMap) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            out.entry(name.as_str().to_string())
                .or_insert_with(|| value.to_string());
        }
    }
    out
}
