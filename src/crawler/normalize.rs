use once_cell::sync::Lazy;
use regex::Regex;
use url::form_urlencoded;
use url::Url;

/// Query parameters stripped during normalization. These carry campaign
/// attribution, never content, and would otherwise split queue identities.
const TRACKING_PARAMS: [&str; 7] = [
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "gclid",
    "fbclid",
];

/// Multi-part public suffixes the small embedded list knows about. For full
/// correctness swap in a complete PSL dataset behind the same function.
const MULTIPART_SUFFIXES: [(&str, &str); 8] = [
    ("co", "uk"),
    ("org", "uk"),
    ("ac", "uk"),
    ("gov", "uk"),
    ("com", "au"),
    ("net", "au"),
    ("org", "au"),
    ("co", "jp"),
];

static SLASH_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/+").expect("slash regex"));

fn parse_lenient(raw: &str) -> Option<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match Url::parse(trimmed) {
        Ok(u) if u.has_host() => Some(u),
        // Scheme-less input ("example.com/path"): treat the first segment as
        // the host and default the scheme to https.
        _ => Url::parse(&format!("https://{}", trimmed.trim_start_matches('/'))).ok(),
    }
}

/// Canonicalize a URL: lowercase scheme and host (https default), collapse
/// duplicate slashes, drop blank and tracking query parameters, drop the
/// fragment. The normalized form is the identity of queue and document rows,
/// so this must be idempotent.
pub fn normalize_url(raw: &str) -> String {
    let Some(mut url) = parse_lenient(raw) else {
        return raw.trim().to_ascii_lowercase();
    };

    let path = if url.path().is_empty() {
        "/".to_string()
    } else {
        SLASH_RUN_RE.replace_all(url.path(), "/").into_owned()
    };
    url.set_path(&path);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, v)| !v.is_empty() && !TRACKING_PARAMS.contains(&k.to_ascii_lowercase().as_str()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        let encoded = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(kept)
            .finish();
        url.set_query(Some(&encoded));
    }

    url.set_fragment(None);
    url.to_string()
}

/// Derive the registrable domain (public suffix + one label) for per-domain
/// queue fairness and rate limiting. Hosts with two or fewer labels are
/// returned as-is.
pub fn registrable_domain(raw: &str) -> String {
    let host = parse_lenient(raw)
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_default();
    let host = host.to_ascii_lowercase();
    let host = host.trim_matches('.');
    if host.is_empty() {
        return String::new();
    }

    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    if labels.len() <= 2 {
        return host.to_string();
    }

    let tail2 = (labels[labels.len() - 2], labels[labels.len() - 1]);
    if MULTIPART_SUFFIXES.contains(&tail2) {
        return labels[labels.len() - 3..].join(".");
    }
    labels[labels.len() - 2..].join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_fragments_and_tracking_params() {
        let url = "HTTPS://Example.com/path///to?p=1&utm_source=x#section";
        assert_eq!(normalize_url(url), "https://example.com/path/to?p=1");
    }

    #[test]
    fn defaults_scheme_and_root_path() {
        assert_eq!(normalize_url("example.com"), "https://example.com/");
        assert_eq!(normalize_url("  http://EXAMPLE.com  "), "http://example.com/");
    }

    #[test]
    fn drops_blank_query_values() {
        assert_eq!(
            normalize_url("https://example.com/a?q=&p=2"),
            "https://example.com/a?p=2"
        );
    }

    #[test]
    fn normalization_is_idempotent() {
        let inputs = [
            "HTTPS://Example.com/path///to?p=1&utm_source=x#section",
            "example.com/news",
            "https://a.bbc.co.uk/news?fbclid=abc",
            "https://example.com/a?q=hello+world&p=1",
        ];
        for raw in inputs {
            let once = normalize_url(raw);
            assert_eq!(normalize_url(&once), once, "not idempotent for {raw}");
        }
    }

    #[test]
    fn no_tracking_key_survives() {
        let url = "https://example.com/?utm_source=a&utm_medium=b&utm_campaign=c&utm_term=d&utm_content=e&gclid=f&fbclid=g&keep=1";
        let normalized = normalize_url(url);
        for key in TRACKING_PARAMS {
            assert!(!normalized.contains(key), "{key} leaked into {normalized}");
        }
        assert!(normalized.contains("keep=1"));
    }

    #[test]
    fn registrable_domain_collapses_subdomains() {
        assert_eq!(
            registrable_domain("https://staff.blog.tumblr.com/post/123"),
            "tumblr.com"
        );
        assert_eq!(registrable_domain("https://www.tumblr.com/explore"), "tumblr.com");
    }

    #[test]
    fn registrable_domain_handles_multipart_suffix() {
        assert_eq!(registrable_domain("https://a.bbc.co.uk/news"), "bbc.co.uk");
        assert_eq!(registrable_domain("https://shop.example.com.au/"), "example.com.au");
    }

    #[test]
    fn registrable_domain_keeps_short_hosts() {
        assert_eq!(registrable_domain("https://localhost/x"), "localhost");
        assert_eq!(registrable_domain("https://example.com"), "example.com");
    }
}
