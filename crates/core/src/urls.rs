use url::Url;

use crate::error::CrawlError;

/// Deterministic blob-store key for a URL: scheme stripped, directory-ish
/// paths pointed at their index.html. Idempotent, so a key can be re-derived
/// from either side of the fetcher/parser handoff.
pub fn canonical_key(url: &str) -> String {
    let stripped = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .unwrap_or(url);

    let mut key = stripped.to_string();
    if key.ends_with('/') {
        key.push_str("index.html");
    } else {
        let extensionless = key
            .rsplit('/')
            .next()
            .map(|segment| !segment.contains('.'))
            .unwrap_or(false);
        if extensionless {
            key.push_str("/index.html");
        }
    }
    key
}

/// RFC 3986 reference resolution of `link` against `parent`, with the
/// fragment cleared. `None` for anything malformed; such links are dropped.
pub fn resolve_link(parent: &str, link: &str) -> Option<String> {
    let base = Url::parse(parent).ok()?;
    let mut resolved = base.join(link).ok()?;
    resolved.set_fragment(None);
    Some(resolved.into())
}

/// The shared notion of "host" across the crawler: host plus any explicit,
/// non-default port. Rate-limit keys, the robots cache, and cross-domain
/// comparison all key on this, so two ports on one machine are two hosts
/// everywhere or nowhere.
pub fn host_key(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

pub fn host_of(url: &str) -> Result<String, CrawlError> {
    let parsed = Url::parse(url).map_err(|e| CrawlError::InvalidUrl(format!("{url}: {e}")))?;
    host_key(&parsed).ok_or_else(|| CrawlError::InvalidUrl(format!("{url}: missing host")))
}

pub fn same_host(a: &str, b: &str) -> bool {
    match (Url::parse(a), Url::parse(b)) {
        (Ok(a), Ok(b)) => match (host_key(&a), host_key(&b)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_key_cases() {
        assert_eq!(
            canonical_key("https://example.com/"),
            "example.com/index.html"
        );
        assert_eq!(
            canonical_key("http://example.com/blog"),
            "example.com/blog/index.html"
        );
        assert_eq!(
            canonical_key("https://example.com/a/page.html"),
            "example.com/a/page.html"
        );
        // host-only, no trailing slash: the "segment" is the host itself
        assert_eq!(canonical_key("https://example.com"), "example.com");
    }

    #[test]
    fn test_canonical_key_idempotent() {
        for url in [
            "https://example.com/",
            "https://example.com/blog",
            "https://example.com/a/b.css",
            "example.com/already/stripped",
        ] {
            let once = canonical_key(url);
            assert_eq!(canonical_key(&once), once, "not idempotent for {url}");
        }
    }

    #[test]
    fn test_resolve_relative_link() {
        assert_eq!(
            resolve_link("https://example.com/a/b.html", "../c").as_deref(),
            Some("https://example.com/c")
        );
        assert_eq!(
            resolve_link("https://example.com/", "/y").as_deref(),
            Some("https://example.com/y")
        );
    }

    #[test]
    fn test_resolve_absolute_link_is_identity() {
        assert_eq!(
            resolve_link("https://a.com/", "https://b.com/x").as_deref(),
            Some("https://b.com/x")
        );
    }

    #[test]
    fn test_resolve_fragment_only_link() {
        assert_eq!(
            resolve_link("https://example.com/page", "#section").as_deref(),
            Some("https://example.com/page")
        );
    }

    #[test]
    fn test_resolve_malformed_parent() {
        assert_eq!(resolve_link("not a url", "/x"), None);
    }

    #[test]
    fn test_same_host() {
        assert!(same_host("https://a.com/x", "http://a.com/y"));
        assert!(!same_host("https://a.com/", "https://b.com/"));
        assert!(!same_host("garbage", "https://b.com/"));
    }

    #[test]
    fn test_same_host_distinguishes_ports() {
        assert!(!same_host("https://a.com:8080/", "https://a.com:9090/"));
        assert!(same_host("https://a.com:8080/", "https://a.com:8080/x"));
        // explicit default port normalizes away
        assert!(same_host("http://a.com:80/", "http://a.com/x"));
    }

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("https://example.com/x").unwrap(), "example.com");
        assert_eq!(
            host_of("https://example.com:8080/x").unwrap(),
            "example.com:8080"
        );
        assert!(host_of(":::").is_err());
    }
}
