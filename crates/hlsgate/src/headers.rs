//! Outbound header policy.
//!
//! Two concerns: building the canonical outbound header set for proxied
//! fetches (default User-Agent plus the `X-*` escape hatches players use to
//! smuggle origin-required headers past CORS), and scrubbing transport /
//! forwarding headers so the upstream never learns it is talking to a relay.

use reqwest::header::{ACCEPT_ENCODING, HeaderMap, HeaderName, HeaderValue, USER_AGENT};

/// Default User-Agent presented to origins unless the client overrides it
/// via `X-User-Agent`.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:93.0) Gecko/20100101 Firefox/93.0";

/// Escape-hatch translation table: inbound name -> canonical outbound name.
/// The table is exhaustive; no other client header is forwarded by this path.
const ESCAPE_HATCHES: [(&str, &str); 5] = [
    ("x-cookie", "cookie"),
    ("x-referer", "referer"),
    ("x-origin", "origin"),
    ("x-user-agent", "user-agent"),
    ("x-x-real-ip", "x-real-ip"),
];

/// Headers that identify the relay or its transport and must never reach an
/// origin. Matched case-insensitively (header names are lowercase on the
/// wire here).
const SCRUB_BLACKLIST: [&str; 14] = [
    "cf-connecting-ip",
    "cf-worker",
    "cf-ray",
    "cf-visitor",
    "cf-ew-via",
    "cdn-loop",
    "x-amzn-trace-id",
    "cf-ipcountry",
    "x-forwarded-for",
    "x-forwarded-host",
    "x-forwarded-proto",
    "forwarded",
    "x-real-ip",
    "content-length",
];

/// Build the canonical outbound header set for a proxied manifest or
/// segment fetch. Starts from the default User-Agent, then applies each
/// recognized escape hatch the client supplied (`X-User-Agent` overrides
/// the default).
pub fn build_outbound_headers(client: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    out.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));

    for (inbound, outbound) in ESCAPE_HATCHES {
        if let Some(value) = client.get(inbound) {
            out.insert(HeaderName::from_static(outbound), value.clone());
        }
    }

    out
}

/// Return a copy of `headers` with every blacklisted name removed. The
/// escape-hatch inbound names are dropped as well, so an `X-Cookie` is never
/// forwarded in its raw form. `zstd` is stripped from `accept-encoding`
/// token lists; remaining tokens keep their order.
pub fn scrub(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();

    for (name, value) in headers {
        let lower = name.as_str();
        if SCRUB_BLACKLIST.contains(&lower)
            || ESCAPE_HATCHES.iter().any(|(inbound, _)| *inbound == lower)
        {
            continue;
        }

        if lower == "accept-encoding" {
            if let Ok(tokens) = value.to_str() {
                let filtered = strip_zstd(tokens);
                if !filtered.is_empty()
                    && let Ok(filtered) = HeaderValue::from_str(&filtered)
                {
                    out.append(ACCEPT_ENCODING, filtered);
                }
                continue;
            }
        }

        out.append(name.clone(), value.clone());
    }

    out
}

/// Merge header layers left to right; a later layer wins on name collision.
/// Used by the generic pass-through path where defaults, fetch options, and
/// caller headers stack.
pub fn merge_headers(layers: &[&HeaderMap]) -> HeaderMap {
    let mut out = HeaderMap::new();
    for layer in layers {
        for name in layer.keys() {
            out.remove(name);
            for value in layer.get_all(name) {
                out.append(name.clone(), value.clone());
            }
        }
    }
    out
}

fn strip_zstd(tokens: &str) -> String {
    tokens
        .split(',')
        .map(str::trim)
        .filter(|token| {
            let name = token.split(';').next().unwrap_or(token).trim();
            !name.eq_ignore_ascii_case("zstd") && !token.is_empty()
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_map(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                HeaderName::from_static(name),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn default_user_agent_is_always_present() {
        let out = build_outbound_headers(&HeaderMap::new());
        assert_eq!(out.get(USER_AGENT).unwrap(), DEFAULT_USER_AGENT);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn escape_hatches_translate_to_canonical_names() {
        let client = header_map(&[
            ("x-cookie", "c=1"),
            ("x-referer", "https://site.example/"),
            ("x-origin", "https://site.example"),
            ("x-x-real-ip", "1.2.3.4"),
        ]);

        let out = build_outbound_headers(&client);
        assert_eq!(out.get("cookie").unwrap(), "c=1");
        assert_eq!(out.get("referer").unwrap(), "https://site.example/");
        assert_eq!(out.get("origin").unwrap(), "https://site.example");
        assert_eq!(out.get("x-real-ip").unwrap(), "1.2.3.4");
        assert!(out.get("x-cookie").is_none());
    }

    #[test]
    fn x_user_agent_overrides_default() {
        let client = header_map(&[("x-user-agent", "VLC/3.0.18")]);
        let out = build_outbound_headers(&client);
        assert_eq!(out.get(USER_AGENT).unwrap(), "VLC/3.0.18");
    }

    #[test]
    fn unrelated_client_headers_are_not_forwarded() {
        let client = header_map(&[("authorization", "Bearer tok"), ("range", "bytes=0-1")]);
        let out = build_outbound_headers(&client);
        assert_eq!(out.len(), 1);
        assert!(out.get("authorization").is_none());
    }

    #[test]
    fn scrub_removes_forwarding_headers_and_translates_nothing() {
        // Mirrors the documented scenario: forwarding header dropped, zstd
        // stripped from the encoding list, raw escape hatch dropped.
        let headers = header_map(&[
            ("x-forwarded-for", "1.2.3.4"),
            ("accept-encoding", "gzip, zstd, br"),
            ("x-cookie", "c=1"),
            ("accept", "*/*"),
        ]);

        let out = scrub(&headers);
        assert!(out.get("x-forwarded-for").is_none());
        assert!(out.get("x-cookie").is_none());
        assert_eq!(out.get(ACCEPT_ENCODING).unwrap(), "gzip, br");
        assert_eq!(out.get("accept").unwrap(), "*/*");
    }

    #[test]
    fn scrub_drops_every_blacklisted_name() {
        let mut headers = HeaderMap::new();
        for name in SCRUB_BLACKLIST {
            headers.insert(
                HeaderName::from_static(name),
                HeaderValue::from_static("x"),
            );
        }
        headers.insert(
            HeaderName::from_static("x-keepme"),
            HeaderValue::from_static("1"),
        );

        let out = scrub(&headers);
        assert_eq!(out.len(), 1);
        assert_eq!(out.get("x-keepme").unwrap(), "1");
    }

    #[test]
    fn zstd_token_is_removed_wherever_it_sits() {
        assert_eq!(strip_zstd("zstd"), "");
        assert_eq!(strip_zstd("zstd, gzip"), "gzip");
        assert_eq!(strip_zstd("gzip,zstd,br"), "gzip, br");
        assert_eq!(strip_zstd("gzip, zstd;q=0.5, br"), "gzip, br");
        assert_eq!(strip_zstd("gzip, br"), "gzip, br");
    }

    #[test]
    fn merge_later_layers_win() {
        let base = header_map(&[("accept", "*/*"), ("user-agent", "base")]);
        let over = header_map(&[("user-agent", "override")]);

        let merged = merge_headers(&[&base, &over]);
        assert_eq!(merged.get("accept").unwrap(), "*/*");
        assert_eq!(merged.get("user-agent").unwrap(), "override");
    }
}
