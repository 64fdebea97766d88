//! Playlist URI resolution.
//!
//! With a base URL this is plain RFC 3986 resolution. Without one, bare
//! hosts like `example.com/path` and protocol-relative `//host/path` forms
//! are normalized to an absolute URL, defaulting the scheme from the port
//! (`443` means https, anything else http).

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::error::{ProxyError, Result};

// host, optional port, optional path-or-query remainder; the leading
// scheme+slashes group is optional so bare hosts match too.
static STANDALONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(https?:)?//)?([^/?]+?)(?::(\d{0,5}))?([/?].*)?$").unwrap()
});

/// Resolve `candidate` against `base` when one is supplied, or interpret it
/// standalone otherwise. Absolute well-formed candidates resolve to
/// themselves.
pub fn resolve(candidate: &str, base: Option<&Url>) -> Result<Url> {
    if let Some(base) = base {
        return base
            .join(candidate)
            .map_err(|e| ProxyError::invalid_url(candidate, e.to_string()));
    }
    resolve_standalone(candidate)
}

fn resolve_standalone(candidate: &str) -> Result<Url> {
    let caps = STANDALONE_RE
        .captures(candidate)
        .ok_or_else(|| ProxyError::invalid_url(candidate, "unrecognized URL shape"))?;

    let has_scheme = caps.get(1).is_some();
    if !has_scheme && (candidate.starts_with("http:") || candidate.starts_with("https:")) {
        // `http:/one-slash` and friends: a scheme with mangled slashes.
        return Err(ProxyError::invalid_url(candidate, "malformed scheme"));
    }

    let normalized = if has_scheme {
        candidate.to_string()
    } else {
        let with_slashes = if candidate.starts_with("//") {
            candidate.to_string()
        } else {
            format!("//{candidate}")
        };
        if caps.get(3).is_some_and(|port| port.as_str() == "443") {
            format!("https:{with_slashes}")
        } else {
            format!("http:{with_slashes}")
        }
    };

    let url = Url::parse(&normalized)
        .map_err(|e| ProxyError::invalid_url(candidate, e.to_string()))?;
    if url.host_str().is_none_or(str::is_empty) {
        return Err(ProxyError::invalid_url(candidate, "empty host"));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://o.test/a/b.m3u8").unwrap()
    }

    #[test]
    fn relative_paths_join_against_the_base() {
        let url = resolve("variant.m3u8", Some(&base())).unwrap();
        assert_eq!(url.as_str(), "https://o.test/a/variant.m3u8");

        let url = resolve("../other/seg.ts", Some(&base())).unwrap();
        assert_eq!(url.as_str(), "https://o.test/other/seg.ts");
    }

    #[test]
    fn absolute_candidates_resolve_to_themselves() {
        let absolute = "https://cdn.test/x/y.ts";
        assert_eq!(resolve(absolute, Some(&base())).unwrap().as_str(), absolute);
        assert_eq!(resolve(absolute, None).unwrap().as_str(), absolute);
    }

    #[test]
    fn bare_host_defaults_scheme_from_port() {
        assert_eq!(
            resolve("example.com/path", None).unwrap().as_str(),
            "http://example.com/path"
        );
        assert_eq!(
            resolve("example.com:443/path", None).unwrap().as_str(),
            "https://example.com/path"
        );
        assert_eq!(
            resolve("example.com:8080/path", None).unwrap().as_str(),
            "http://example.com:8080/path"
        );
    }

    #[test]
    fn protocol_relative_form_is_accepted() {
        assert_eq!(
            resolve("//example.com/path", None).unwrap().as_str(),
            "http://example.com/path"
        );
    }

    #[test]
    fn malformed_scheme_is_rejected() {
        assert!(resolve("http:/notenoughslashes", None).is_err());
    }

    #[test]
    fn empty_host_is_rejected() {
        assert!(resolve("http://:1/", None).is_err());
    }
}
