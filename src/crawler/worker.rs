use std::sync::Arc;
use std::time::Duration;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tracing::{error, info, warn};
use url::Url;

use crate::core::types::{FIELD_BODY, FIELD_DESCRIPTION, FIELD_TITLE};
use crate::core::AppState;
use crate::crawler::extract::{parse_html, ParsedPage};
use crate::crawler::fetch::{fetch_page, BodyKind};
use crate::crawler::tokenizer::tokenize;
use crate::storage::documents::{persist_document, NewDocument};
use crate::storage::news::{backfill_article_content, register_feed};
use crate::storage::queue::{self, CrawlStatus, QueueItem};

/// Why an item did not reach `done`. Each variant maps onto a terminal
/// queue status; none of them abort the worker.
#[derive(Debug, thiserror::Error)]
enum CrawlFailure {
    #[error("fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("non-success status {status}")]
    NonSuccessStatus { status: u16 },
    #[error("unsupported content type {0:?}")]
    UnsupportedContentType(String),
    #[error("page failed validation")]
    Validation,
    #[error("storage fault: {0}")]
    Storage(#[from] sqlx::Error),
}

impl CrawlFailure {
    fn terminal_status(&self) -> CrawlStatus {
        match self {
            CrawlFailure::NonSuccessStatus { .. } => CrawlStatus::NonSuccessStatusError,
            CrawlFailure::Validation => CrawlStatus::ValidationError,
            CrawlFailure::Fetch(_)
            | CrawlFailure::UnsupportedContentType(_)
            | CrawlFailure::Storage(_) => CrawlStatus::ProcessingError,
        }
    }
}

/// `max(0, min(1, wc/300) − min(0.4, outlinks/wc))`; a contentless page
/// scores zero before the ratio is ever formed.
pub fn compute_quality(content: &str, outbound_link_count: usize) -> f64 {
    let wc = content.split_whitespace().count();
    if wc == 0 {
        return 0.0;
    }
    let density = (wc as f64 / 300.0).min(1.0);
    let link_penalty = (outbound_link_count as f64 / wc as f64).min(0.4);
    (density - link_penalty).max(0.0)
}

/// Linear decay over a year from the most recent known timestamp; pages with
/// no date at all settle at 0.1.
pub fn compute_freshness(
    updated_at: Option<chrono::DateTime<chrono::Utc>>,
    published_at: Option<chrono::DateTime<chrono::Utc>>,
) -> f64 {
    let Some(ts) = updated_at.or(published_at) else {
        return 0.1;
    };
    let days = (chrono::Utc::now() - ts).num_days().max(0);
    (1.0 - days.min(365) as f64 / 365.0).max(0.0)
}

async fn persist_page(state: &AppState, url: &str, parsed: &ParsedPage) -> Result<(), CrawlFailure> {
    let quality = compute_quality(&parsed.content, parsed.links.len());
    let freshness = compute_freshness(parsed.updated_at, parsed.published_at);

    let title_tokens = tokenize(&parsed.title);
    let description_tokens = tokenize(&parsed.description);
    let body_tokens = tokenize(&parsed.content);

    let doc = NewDocument {
        url,
        title: &parsed.title,
        description: &parsed.description,
        content: &parsed.content,
        published_at: parsed.published_at,
        updated_at: parsed.updated_at,
        word_count: parsed.word_count() as i32,
        quality_score: quality,
        freshness_score: freshness,
    };
    persist_document(
        &state.db,
        &doc,
        &[
            (FIELD_TITLE, &title_tokens),
            (FIELD_DESCRIPTION, &description_tokens),
            (FIELD_BODY, &body_tokens),
        ],
        &parsed.links,
    )
    .await?;

    info!(
        url,
        word_count = doc.word_count,
        links = parsed.links.len(),
        quality,
        freshness,
        "processed"
    );
    Ok(())
}

/// Fetch → classify → extract → persist → discover for one claimed item.
async fn crawl_one(state: &AppState, item: &QueueItem) -> Result<(), CrawlFailure> {
    let page = fetch_page(&state.http_client, &item.url).await?;
    info!(url = %item.url, status_code = page.status, "fetched");

    if page.status >= 400 {
        return Err(CrawlFailure::NonSuccessStatus { status: page.status });
    }

    match page.kind() {
        BodyKind::Feed => {
            // The queue handed us a feed URL directly; register it for the
            // news fetcher instead of indexing it as a page.
            register_feed(&state.db, &item.url, &item.url, &item.url).await?;
            info!(url = %item.url, "registered feed");
            Ok(())
        }
        BodyKind::Other => Err(CrawlFailure::UnsupportedContentType(page.content_type.clone())),
        BodyKind::Html => {
            let parsed = parse_html(&item.url, &page.text());
            if !parsed.is_valid() {
                return Err(CrawlFailure::Validation);
            }

            persist_page(state, &item.url, &parsed).await?;

            for feed_url in &parsed.feed_links {
                if let Err(err) = register_feed(&state.db, feed_url, &item.url, &item.url).await {
                    warn!(feed_url = %feed_url, %err, "feed registration failed");
                }
            }

            // A crawled article URL may already exist from a feed with no
            // body; the full extraction fills it in.
            match backfill_article_content(&state.db, &item.url, &parsed.content).await {
                Ok(true) => info!(url = %item.url, "backfilled news article content"),
                Ok(false) => {}
                Err(err) => warn!(url = %item.url, %err, "news backfill failed"),
            }

            Ok(())
        }
    }
}

/// Process one claimed queue item end to end and record its terminal status.
pub async fn process_item(state: &AppState, item: &QueueItem) {
    info!(url = %item.url, domain = %item.domain, "processing");
    let status = match crawl_one(state, item).await {
        Ok(()) => CrawlStatus::Done,
        Err(failure) => {
            warn!(url = %item.url, %failure, "crawl failed");
            failure.terminal_status()
        }
    };
    if let Err(err) = queue::mark(&state.db, &item.url, status).await {
        error!(url = %item.url, %err, "failed to record terminal status");
    }
}

fn domain_for(item: &QueueItem) -> String {
    if !item.domain.is_empty() {
        return item.domain.clone();
    }
    Url::parse(&item.url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_default()
}

fn min_domain_wait(state: &AppState, pending: &[QueueItem]) -> Duration {
    pending
        .iter()
        .map(|item| state.rate_limiter.seconds_until_ready(&domain_for(item)))
        .min()
        .unwrap_or(Duration::ZERO)
}

/// The scheduler loop: keep a pending buffer topped up from the queue, keep
/// up to `crawler_concurrency` items in flight, and only admit an item once
/// its domain has a rate-limit slot. When nothing is admissible the loop
/// waits on the first completion (or a short timeout) rather than spinning.
pub async fn run(state: Arc<AppState>) -> anyhow::Result<()> {
    let concurrency = state.settings.crawler_concurrency.max(1);
    let dequeue_size = state.settings.queue_batch_size.max(concurrency * 4);
    info!(
        batch_size = state.settings.queue_batch_size,
        concurrency, dequeue_size, "crawler worker started"
    );

    let mut pending: Vec<QueueItem> = Vec::new();
    let mut in_flight: FuturesUnordered<tokio::task::JoinHandle<()>> = FuturesUnordered::new();

    loop {
        if pending.len() < dequeue_size {
            match queue::claim(&state.db, (dequeue_size - pending.len()) as i64).await {
                Ok(items) if !items.is_empty() => {
                    pending.extend(items);
                    info!(pending = pending.len(), "dequeued items");
                }
                Ok(_) => {}
                Err(err) => {
                    error!(%err, "claim failed, backing off");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            }
        }

        let mut submitted = 0;
        while in_flight.len() < concurrency {
            let Some(idx) = pending
                .iter()
                .position(|item| state.rate_limiter.try_reserve(&domain_for(item)))
            else {
                break;
            };
            let item = pending.remove(idx);
            let task_state = state.clone();
            in_flight.push(tokio::spawn(async move {
                process_item(&task_state, &item).await;
            }));
            submitted += 1;
        }

        if submitted > 0 {
            info!(submitted, in_flight = in_flight.len(), pending = pending.len(), "submitted");
            continue;
        }

        if !in_flight.is_empty() {
            let wait = if pending.is_empty() {
                Duration::from_millis(200)
            } else {
                min_domain_wait(&state, &pending).min(Duration::from_millis(200))
            };
            if let Ok(Some(Err(err))) = tokio::time::timeout(wait, in_flight.next()).await {
                error!(%err, "crawl task panicked");
            }
            continue;
        }

        if !pending.is_empty() {
            let wait = min_domain_wait(&state, &pending)
                .clamp(Duration::from_millis(10), Duration::from_millis(200));
            tokio::time::sleep(wait).await;
            continue;
        }

        info!("queue empty, sleeping for 0.5s");
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};

    #[test]
    fn quality_is_zero_for_empty_content() {
        assert_eq!(compute_quality("", 10), 0.0);
    }

    #[test]
    fn quality_rewards_density_and_penalizes_link_farms() {
        let content = "word ".repeat(300);
        let clean = compute_quality(&content, 0);
        let linky = compute_quality(&content, 300);
        assert_eq!(clean, 1.0);
        // 300 links over 300 words hits the 0.4 penalty cap.
        assert!((clean - linky - 0.4).abs() < 1e-9);
    }

    #[test]
    fn quality_stays_within_unit_interval() {
        for (words, links) in [(1usize, 0usize), (10, 1000), (500, 3), (299, 299)] {
            let content = "word ".repeat(words);
            let q = compute_quality(&content, links);
            assert!((0.0..=1.0).contains(&q), "quality {q} out of range");
        }
    }

    #[test]
    fn freshness_defaults_when_no_timestamps() {
        assert_eq!(compute_freshness(None, None), 0.1);
    }

    #[test]
    fn freshness_decays_with_age() {
        let recent = Some(Utc::now() - ChronoDuration::days(30));
        let stale = Some(Utc::now() - ChronoDuration::days(400));
        let fresh_score = compute_freshness(recent, None);
        assert!(fresh_score > 0.85 && fresh_score < 0.95);
        assert_eq!(compute_freshness(stale, None), 0.0);
    }

    #[test]
    fn freshness_prefers_updated_over_published() {
        let updated = Some(Utc::now() - ChronoDuration::days(10));
        let published = Some(Utc::now() - ChronoDuration::days(300));
        let score = compute_freshness(updated, published);
        assert!(score > compute_freshness(None, published));
    }
}
