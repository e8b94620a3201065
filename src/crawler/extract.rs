use chrono::{DateTime, NaiveDate, Utc};
use scraper::{Html, Selector};
use url::Url;

use crate::crawler::normalize::normalize_url;

/// Minimum main-content length for a page to be indexed.
const MIN_CONTENT_CHARS: usize = 120;

#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    pub title: String,
    pub description: String,
    pub content: String,
    pub links: Vec<String>,
    pub feed_links: Vec<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ParsedPage {
    /// Acceptance policy for the crawl worker: title, description and content
    /// all present, content long enough to be worth indexing.
    pub fn is_valid(&self) -> bool {
        !self.title.is_empty()
            && !self.description.is_empty()
            && self.content.len() >= MIN_CONTENT_CHARS
    }

    pub fn word_count(&self) -> usize {
        self.content.split_whitespace().count()
    }
}

/// Parse an HTML page into its indexable parts: title, meta description,
/// readability main content (text only), normalized outlinks, discovered
/// feed URLs and article timestamps.
pub fn parse_html(url: &str, html: &str) -> ParsedPage {
    let document = Html::parse_document(html);
    let base_url = Url::parse(url).ok();

    let title = select_text(&document, "title");
    let description = select_attr(&document, "meta[name=\"description\"]", "content");
    let content = extract_main_content(html, base_url.as_ref());
    let links = extract_outlinks(&document, base_url.as_ref());
    let feed_links = extract_feed_links(&document, base_url.as_ref());
    let published_at = extract_timestamp(&document, "article:published_time");
    let updated_at = extract_timestamp(&document, "article:modified_time");

    ParsedPage {
        title,
        description,
        content,
        links,
        feed_links,
        published_at,
        updated_at,
    }
}

fn select_text(document: &Html, selector: &str) -> String {
    if let Ok(sel) = Selector::parse(selector) {
        if let Some(el) = document.select(&sel).next() {
            return el.text().collect::<String>().trim().to_string();
        }
    }
    String::new()
}

fn select_attr(document: &Html, selector: &str, attr: &str) -> String {
    if let Ok(sel) = Selector::parse(selector) {
        if let Some(el) = document.select(&sel).next() {
            if let Some(value) = el.value().attr(attr) {
                return value.trim().to_string();
            }
        }
    }
    String::new()
}

/// Density-based readable content, text only. Falls back to whole-document
/// text when readability cannot find a main block.
fn extract_main_content(html: &str, base_url: Option<&Url>) -> String {
    if let Some(base) = base_url {
        if let Ok(product) = readability::extractor::extract(&mut html.as_bytes(), base) {
            let text = product.text.split_whitespace().collect::<Vec<_>>().join(" ");
            if !text.is_empty() {
                return text;
            }
        }
    }

    let document = Html::parse_document(html);
    if let Ok(sel) = Selector::parse("body") {
        if let Some(body) = document.select(&sel).next() {
            return body
                .text()
                .collect::<Vec<_>>()
                .join(" ")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
        }
    }
    String::new()
}

/// Every `<a href>` joined against the document URL, normalized, deduplicated
/// preserving insertion order. Non-navigable schemes are skipped.
fn extract_outlinks(document: &Html, base_url: Option<&Url>) -> Vec<String> {
    let Some(base) = base_url else {
        return Vec::new();
    };
    let Ok(sel) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut links = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for element in document.select(&sel) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if href.starts_with('#')
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
            || href.starts_with("tel:")
            || href.starts_with("data:")
        {
            continue;
        }
        let Ok(resolved) = base.join(href) else {
            continue;
        };
        if resolved.scheme() != "http" && resolved.scheme() != "https" {
            continue;
        }
        let normalized = normalize_url(resolved.as_str());
        if seen.insert(normalized.clone()) {
            links.push(normalized);
        }
    }
    links
}

/// RSS/Atom feeds advertised by the page: `<link>` elements whose rel or
/// type hints at a feed, plus `<meta>` names carrying feed URLs.
fn extract_feed_links(document: &Html, base_url: Option<&Url>) -> Vec<String> {
    let Some(base) = base_url else {
        return Vec::new();
    };

    let mut feeds = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut push = |href: &str| {
        if let Ok(resolved) = base.join(href) {
            let normalized = normalize_url(resolved.as_str());
            if seen.insert(normalized.clone()) {
                feeds.push(normalized);
            }
        }
    };

    if let Ok(sel) = Selector::parse("link[href]") {
        for element in document.select(&sel) {
            let rel = element.value().attr("rel").unwrap_or("").to_ascii_lowercase();
            let link_type = element.value().attr("type").unwrap_or("").to_ascii_lowercase();
            if hints_feed(&rel) || hints_feed(&link_type) {
                if let Some(href) = element.value().attr("href") {
                    push(href);
                }
            }
        }
    }

    if let Ok(sel) = Selector::parse("meta[content]") {
        for element in document.select(&sel) {
            let name = element.value().attr("name").unwrap_or("").to_ascii_lowercase();
            if hints_feed(&name) {
                if let Some(content) = element.value().attr("content") {
                    push(content);
                }
            }
        }
    }

    feeds
}

fn hints_feed(value: &str) -> bool {
    value.contains("rss") || value.contains("atom") || value.contains("feed")
}

/// `article:published_time` / `article:modified_time` parsed to UTC. Future
/// timestamps are treated as absent.
fn extract_timestamp(document: &Html, property: &str) -> Option<DateTime<Utc>> {
    let selector = format!("meta[property=\"{property}\"]");
    let sel = Selector::parse(&selector).ok()?;
    let content = document
        .select(&sel)
        .next()
        .and_then(|el| el.value().attr("content"))?
        .trim();
    let parsed = parse_datetime(content)?;
    if parsed > Utc::now() {
        return None;
    }
    Some(parsed)
}

pub(crate) fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(DateTime::from_naive_utc_and_offset(
            date.and_hms_opt(0, 0, 0)?,
            Utc,
        ));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html lang="en">
          <head>
            <title> Release Notes </title>
            <meta name="description" content="What changed in this release">
            <meta property="article:published_time" content="2024-03-01T10:00:00Z">
            <link rel="alternate" type="application/rss+xml" href="/feed.xml">
            <meta name="rss-feed" content="https://example.com/alt.rss">
          </head>
          <body>
            <article>
              <p>This release brings a faster crawler scheduler, a reworked token
              pipeline and several fixes to the ranking layer. Upgrading is
              recommended for anyone running the indexer in production.</p>
              <a href="/docs///quickstart?utm_source=page#install">Quickstart</a>
              <a href="https://example.com/docs/quickstart">Quickstart again</a>
              <a href="mailto:team@example.com">Mail us</a>
            </article>
          </body>
        </html>"#;

    #[test]
    fn extracts_title_description_and_dates() {
        let page = parse_html("https://example.com/notes", PAGE);
        assert_eq!(page.title, "Release Notes");
        assert_eq!(page.description, "What changed in this release");
        assert!(page.published_at.is_some());
        assert!(page.updated_at.is_none());
    }

    #[test]
    fn outlinks_are_normalized_and_deduplicated() {
        let page = parse_html("https://example.com/notes", PAGE);
        assert_eq!(page.links, vec!["https://example.com/docs/quickstart".to_string()]);
    }

    #[test]
    fn discovers_feed_links_from_link_and_meta() {
        let page = parse_html("https://example.com/notes", PAGE);
        assert_eq!(
            page.feed_links,
            vec![
                "https://example.com/feed.xml".to_string(),
                "https://example.com/alt.rss".to_string(),
            ]
        );
    }

    #[test]
    fn future_published_time_is_discarded() {
        let html = r#"<html><head><title>t</title>
            <meta property="article:published_time" content="2999-01-01T00:00:00Z">
            </head><body><p>body</p></body></html>"#;
        let page = parse_html("https://example.com/", html);
        assert!(page.published_at.is_none());
    }

    #[test]
    fn validation_requires_all_fields_and_length() {
        let mut page = ParsedPage {
            title: "t".into(),
            description: "d".into(),
            content: "c".repeat(MIN_CONTENT_CHARS),
            ..Default::default()
        };
        assert!(page.is_valid());
        page.content = "too short".into();
        assert!(!page.is_valid());
        page.content = "c".repeat(MIN_CONTENT_CHARS);
        page.description.clear();
        assert!(!page.is_valid());
    }

    #[test]
    fn parse_datetime_accepts_common_formats() {
        assert!(parse_datetime("2024-03-01T10:00:00Z").is_some());
        assert!(parse_datetime("Wed, 01 May 2024 10:00:00 GMT").is_some());
        assert!(parse_datetime("2024-05-01").is_some());
        assert!(parse_datetime("not a date").is_none());
    }
}
