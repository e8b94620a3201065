//! URL canonicalization scenarios from the crawler's identity rules.

use scour::crawler::normalize::{normalize_url, registrable_domain};

#[test]
fn canonical_form_strips_noise() {
    assert_eq!(
        normalize_url("HTTPS://Example.com/path///to?p=1&utm_source=x#section"),
        "https://example.com/path/to?p=1"
    );
}

#[test]
fn canonical_form_is_stable_under_repetition() {
    for raw in [
        "HTTPS://Example.com/path///to?p=1&utm_source=x#section",
        "bbc.co.uk/news//uk",
        "https://example.com/?gclid=1&q=rust",
    ] {
        let once = normalize_url(raw);
        assert_eq!(normalize_url(&once), once);
    }
}

#[test]
fn registrable_domains_collapse_to_the_owner() {
    assert_eq!(registrable_domain("https://staff.blog.tumblr.com/post/123"), "tumblr.com");
    assert_eq!(registrable_domain("https://a.bbc.co.uk/news"), "bbc.co.uk");
    assert_eq!(registrable_domain("https://www.tumblr.com/explore"), "tumblr.com");
}

#[test]
fn multipart_suffix_results_have_three_labels() {
    for url in [
        "https://a.b.example.co.uk/",
        "https://deep.sub.site.gov.uk/page",
        "https://www.shop.co.jp/",
    ] {
        let domain = registrable_domain(url);
        assert_eq!(domain.split('.').count(), 3, "{url} -> {domain}");
    }
}
