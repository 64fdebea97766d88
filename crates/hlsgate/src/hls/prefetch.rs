//! Segment prefetch fan-out.
//!
//! After a media playlist is rewritten, every segment and key URL it
//! references is fetched in the background so the client's follow-up
//! requests hit the cache. Tasks are detached: the manifest response never
//! waits on them, client disconnects don't cancel them, and their failures
//! are logged only.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use reqwest::header::HeaderMap;
use tracing::{debug, trace};
use url::Url;

use crate::cache::{SegmentCache, cache_disabled};
use crate::error::{ProxyError, Result};
use crate::hls::fetch::snapshot_headers;
use crate::pool::PoolManager;

/// Launch one detached prefetch task per URL. No concurrency cap is
/// applied; a long VOD playlist fans out all at once. No-op when the cache
/// switch is off.
pub fn spawn_prefetch(
    urls: Vec<Url>,
    outbound_headers: HeaderMap,
    pool: Arc<PoolManager>,
    cache: Arc<SegmentCache>,
    timeout: Duration,
) {
    if urls.is_empty() || cache_disabled() {
        return;
    }

    let removed = cache.cleanup();
    if removed > 0 {
        debug!(removed, "dropped expired segments before prefetch");
    }

    debug!(segments = urls.len(), "warming cache");
    for url in urls {
        let pool = Arc::clone(&pool);
        let cache = Arc::clone(&cache);
        let headers = outbound_headers.clone();

        tokio::spawn(async move {
            if let Err(err) = prefetch_one(&url, headers, &pool, &cache, timeout).await {
                debug!(url = %url, error = %err, "segment prefetch failed");
            }
        });
    }
}

async fn prefetch_one(
    url: &Url,
    headers: HeaderMap,
    pool: &PoolManager,
    cache: &SegmentCache,
    timeout: Duration,
) -> Result<()> {
    if cache.get(url.as_str()).is_some() {
        trace!(url = %url, "segment already cached; skipping prefetch");
        return Ok(());
    }

    let response = pool
        .request(url, Method::GET, headers, None, Some(timeout))
        .await?;

    if !response.status().is_success() {
        return Err(ProxyError::upstream_status(
            response.status(),
            url.as_str(),
            "segment prefetch",
        ));
    }

    let header_snapshot = snapshot_headers(response.headers());
    let bytes = response.bytes().await?;
    trace!(url = %url, size = bytes.len(), "prefetched segment");
    cache.set(url.as_str(), bytes, header_snapshot);
    Ok(())
}
