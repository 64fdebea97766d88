//! Line-oriented playlist rewriter.
//!
//! Every URL embedded in a playlist is rewritten to route back through the
//! relay, so variant playlists, encryption keys, alternative media, and
//! segments all stay behind the same host. The transform is textual and
//! order-preserving: the output has exactly the input's lines, with only
//! URI material replaced.
//!
//! Key and media URIs are located by the first `https?://` run on the
//! directive line. That heuristic misses protocol-relative URIs and quoted
//! URIs containing whitespace; such lines pass through untouched.

use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;
use url::Url;

use crate::hls::resolve::resolve;

static HTTP_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^"\s]+"#).unwrap());

/// A master playlist is recognized by the presence of a stream-inf
/// resolution attribute anywhere in the text.
const MASTER_MARKER: &str = "RESOLUTION=";

const KEY_TAG: &str = "#EXT-X-KEY";
const MEDIA_TAG: &str = "#EXT-X-MEDIA";

/// Per-request rewrite inputs.
pub struct RewriteContext<'a> {
    /// Absolute URL the manifest was fetched from; base for resolution.
    pub manifest_url: &'a Url,
    /// Client-supplied header JSON, re-embedded verbatim into every
    /// rewritten URL.
    pub headers_json: &'a str,
    /// Externally visible base of the relay (`scheme://host`).
    pub proxy_base: &'a str,
}

/// Rewriter output: the transformed text plus the absolute URLs a media
/// playlist references (segments and keys), in playlist order.
pub struct RewrittenManifest {
    pub body: String,
    pub prefetch_urls: Vec<Url>,
    pub is_master: bool,
}

/// Rewrite a playlist fetched from `ctx.manifest_url`.
pub fn rewrite_manifest(text: &str, ctx: &RewriteContext<'_>) -> RewrittenManifest {
    let is_master = text.contains(MASTER_MARKER);
    let encoded_headers = urlencoding::encode(ctx.headers_json).into_owned();
    let mut prefetch_urls = Vec::new();

    let lines: Vec<String> = text
        .split('\n')
        .map(|line| {
            if is_master {
                rewrite_master_line(line, ctx, &encoded_headers)
            } else {
                rewrite_media_line(line, ctx, &encoded_headers, &mut prefetch_urls)
            }
        })
        .collect();

    trace!(
        manifest = %ctx.manifest_url,
        master = is_master,
        prefetch = prefetch_urls.len(),
        "rewrote playlist"
    );

    RewrittenManifest {
        body: lines.join("\n"),
        prefetch_urls,
        is_master,
    }
}

fn rewrite_master_line(line: &str, ctx: &RewriteContext<'_>, encoded_headers: &str) -> String {
    if line.starts_with(KEY_TAG) {
        return swap_embedded_url(line, ctx, "ts-proxy", encoded_headers);
    }
    if line.starts_with(MEDIA_TAG) {
        // Media alternates are playlists themselves, not segments.
        return swap_embedded_url(line, ctx, "m3u8-proxy", encoded_headers);
    }

    let candidate = line.trim();
    if candidate.is_empty() || candidate.starts_with('#') {
        return line.to_string();
    }

    match resolve(candidate, Some(ctx.manifest_url)) {
        Ok(variant) => proxy_url(ctx.proxy_base, "m3u8-proxy", variant.as_str(), encoded_headers),
        Err(_) => line.to_string(),
    }
}

fn rewrite_media_line(
    line: &str,
    ctx: &RewriteContext<'_>,
    encoded_headers: &str,
    prefetch_urls: &mut Vec<Url>,
) -> String {
    if line.starts_with(KEY_TAG) {
        // Keys are fetched like segments: rewrite the URI in place and warm
        // the cache with the original URL.
        if let Some(m) = HTTP_URL_RE.find(line)
            && let Ok(key_url) = Url::parse(m.as_str())
        {
            prefetch_urls.push(key_url);
        }
        return swap_embedded_url(line, ctx, "ts-proxy", encoded_headers);
    }

    let candidate = line.trim();
    if candidate.is_empty() || candidate.starts_with('#') {
        return line.to_string();
    }

    match resolve(candidate, Some(ctx.manifest_url)) {
        Ok(segment) => {
            let rewritten =
                proxy_url(ctx.proxy_base, "ts-proxy", segment.as_str(), encoded_headers);
            prefetch_urls.push(segment);
            rewritten
        }
        Err(_) => line.to_string(),
    }
}

/// Replace the first absolute URL on a directive line with its proxied
/// form, leaving the rest of the attribute list untouched. Lines without a
/// recognizable URL pass through unchanged.
fn swap_embedded_url(
    line: &str,
    ctx: &RewriteContext<'_>,
    route: &str,
    encoded_headers: &str,
) -> String {
    match HTTP_URL_RE.find(line) {
        Some(m) => {
            let proxied = proxy_url(ctx.proxy_base, route, m.as_str(), encoded_headers);
            format!("{}{}{}", &line[..m.start()], proxied, &line[m.end()..])
        }
        None => line.to_string(),
    }
}

fn proxy_url(base: &str, route: &str, target: &str, encoded_headers: &str) -> String {
    format!(
        "{base}/{route}?url={}&headers={encoded_headers}",
        urlencoding::encode(target)
    )
}
