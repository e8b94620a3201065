use anyhow::{bail, Context, Result};
use base64::Engine;
use chrono::{DateTime, Utc};
use feed_rs::model::{Entry, Feed};
use scraper::Html;
use tracing::{info, warn};
use url::Url;

use crate::core::AppState;
use crate::crawler::normalize::normalize_url;
use crate::crawler::tokenizer::tokenize;
use crate::storage::news::{due_feeds, persist_feed_batch, ArticleUpsert, FeedUpdate};

const MAX_FEEDS_PER_RUN: i64 = 100;
const MAX_ITEMS_PER_FEED: usize = 50;

/// Poll every feed due on this node. Feed failures are logged and isolated;
/// one broken feed never stops the rest of the batch.
pub async fn run(state: &AppState) -> Result<()> {
    let feeds = due_feeds(
        &state.db,
        state.settings.batch_total_nodes,
        state.settings.batch_node_index,
        MAX_FEEDS_PER_RUN,
    )
    .await?;
    if feeds.is_empty() {
        return Ok(());
    }
    info!(feeds = feeds.len(), "polling due news feeds");

    for feed_url in feeds {
        if let Err(err) = poll_feed(state, &feed_url).await {
            warn!(feed_url = %feed_url, %err, "failed processing feed");
        }
    }
    Ok(())
}

async fn poll_feed(state: &AppState, feed_url: &str) -> Result<()> {
    let response = state.http_client.get(feed_url).send().await?;
    let status = response.status().as_u16();
    if status >= 400 {
        bail!("status={status}");
    }
    let body = response.bytes().await?;
    let feed = feed_rs::parser::parse(&body[..]).context("feed parse failed")?;

    let update = feed_update(&feed);
    let mut items = Vec::new();
    for entry in feed.entries.iter().take(MAX_ITEMS_PER_FEED) {
        let Some(item) = article_from_entry(state, feed_url, entry).await else {
            continue;
        };
        items.push(item);
    }

    persist_feed_batch(&state.db, feed_url, &update, &items).await?;
    Ok(())
}

fn feed_update(feed: &Feed) -> FeedUpdate {
    let mut published: Vec<DateTime<Utc>> = feed
        .entries
        .iter()
        .filter_map(|e| e.published.or(e.updated))
        .collect();
    published.sort();

    FeedUpdate {
        name: feed.title.as_ref().map(|t| t.content.trim().to_string()),
        link: feed.links.first().map(|l| l.href.clone()),
        image: feed
            .logo
            .as_ref()
            .or(feed.icon.as_ref())
            .map(|img| img.uri.clone()),
        last_published: published.last().copied(),
        publish_rate_per_hour: publish_rate_per_hour(&published),
    }
}

/// Rough items-per-hour estimate over the window the feed exposes. Needs at
/// least two dated items and a non-zero span.
fn publish_rate_per_hour(published: &[DateTime<Utc>]) -> Option<f32> {
    let (first, last) = (published.first()?, published.last()?);
    let span_hours = (*last - *first).num_seconds() as f32 / 3600.0;
    if published.len() < 2 || span_hours <= 0.0 {
        return None;
    }
    Some((published.len() - 1) as f32 / span_hours)
}

/// Flatten an HTML fragment (feed summaries and bodies routinely carry
/// markup) into whitespace-normalized text.
fn html_to_text(fragment: &str) -> String {
    if fragment.is_empty() {
        return String::new();
    }
    let parsed = Html::parse_fragment(fragment);
    parsed
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn entry_url(feed_url: &str, entry: &Entry) -> Option<String> {
    let href = entry.links.first().map(|l| l.href.as_str())?;
    let absolute = match Url::parse(feed_url) {
        Ok(base) => base.join(href).ok()?.to_string(),
        Err(_) => href.to_string(),
    };
    Some(normalize_url(&absolute))
}

fn entry_image_url(entry: &Entry) -> Option<String> {
    for media in &entry.media {
        if let Some(thumbnail) = media.thumbnails.first() {
            return Some(thumbnail.image.uri.clone());
        }
        for content in &media.content {
            if let Some(url) = &content.url {
                return Some(url.to_string());
            }
        }
    }
    None
}

/// Fetch the item image and base64-encode it for inline storage. Strictly
/// best-effort: any failure stores no image.
async fn fetch_image_base64(state: &AppState, image_url: &str) -> Option<String> {
    let response = state.http_client.get(image_url).send().await.ok()?;
    if response.status().as_u16() >= 400 {
        return None;
    }
    let bytes = response.bytes().await.ok()?;
    Some(base64::engine::general_purpose::STANDARD.encode(&bytes))
}

async fn article_from_entry(
    state: &AppState,
    feed_url: &str,
    entry: &Entry,
) -> Option<ArticleUpsert> {
    let url = entry_url(feed_url, entry)?;

    let title = entry
        .title
        .as_ref()
        .map(|t| html_to_text(&t.content))
        .unwrap_or_default();
    let description = entry
        .summary
        .as_ref()
        .map(|t| html_to_text(&t.content))
        .unwrap_or_default();
    let content = entry
        .content
        .as_ref()
        .and_then(|c| c.body.as_deref())
        .map(html_to_text)
        .unwrap_or_default();
    let author = entry
        .authors
        .first()
        .map(|p| p.name.trim().to_string())
        .unwrap_or_default();
    let published_at: Option<DateTime<Utc>> = entry.published.or(entry.updated);

    let image = match entry_image_url(entry) {
        Some(image_url) => fetch_image_base64(state, &image_url).await,
        None => None,
    };

    let text = format!("{title} {description} {content}");
    let terms = tokenize(&text);

    Some(ArticleUpsert {
        url,
        title,
        description,
        content,
        author,
        image,
        published_at,
        terms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example Wire</title>
    <link>https://example.com/</link>
    <item>
      <title>Breaking market update</title>
      <link>/news/a?utm_source=rss</link>
      <description><![CDATA[<p>Stocks rally <b>strongly</b></p>]]></description>
      <pubDate>Wed, 01 May 2024 10:00:00 GMT</pubDate>
      <author>reporter@example.com</author>
    </item>
    <item>
      <title>Tech earnings surge</title>
      <link>https://example.com/news/b</link>
      <description>Revenue growth outlook</description>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn parses_feed_metadata_and_entries() {
        let feed = feed_rs::parser::parse(RSS.as_bytes()).unwrap();
        let update = feed_update(&feed);
        assert_eq!(update.name.as_deref(), Some("Example Wire"));
        assert!(update.last_published.is_some());
        // only one dated item, so no rate estimate yet
        assert!(update.publish_rate_per_hour.is_none());
        assert_eq!(feed.entries.len(), 2);
    }

    #[test]
    fn publish_rate_needs_two_dated_items() {
        let base = Utc::now();
        assert_eq!(publish_rate_per_hour(&[]), None);
        assert_eq!(publish_rate_per_hour(&[base]), None);

        let spaced = [base, base + chrono::Duration::hours(2)];
        let rate = publish_rate_per_hour(&spaced).unwrap();
        assert!((rate - 0.5).abs() < 1e-6);
    }

    #[test]
    fn entry_urls_are_joined_and_normalized() {
        let feed = feed_rs::parser::parse(RSS.as_bytes()).unwrap();
        let url = entry_url("https://example.com/feed.xml", &feed.entries[0]).unwrap();
        assert_eq!(url, "https://example.com/news/a");
    }

    #[test]
    fn html_fragments_flatten_to_text() {
        assert_eq!(
            html_to_text("<p>Stocks rally <b>strongly</b></p>"),
            "Stocks rally strongly"
        );
        assert_eq!(html_to_text(""), "");
        assert_eq!(html_to_text("plain words"), "plain words");
    }
}
