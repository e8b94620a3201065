use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use tracing::info;

use crate::core::types::{FIELD_BODY, SOURCE_NEWS};
use crate::crawler::normalize::registrable_domain;

/// Minimum backfill length, matching the extractor's validation threshold.
const MIN_BACKFILL_CHARS: usize = 120;

/// How long a feed rests after a poll.
const FEED_REFETCH_MINUTES: i64 = 20;

/// Register a feed discovered by the crawler. First discovery wins; an
/// already-known feed keeps its metadata and schedule.
pub async fn register_feed(
    pool: &PgPool,
    feed_url: &str,
    home_url: &str,
    discovered_by_url: &str,
) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO news_feeds(feed_url, home_url, discovered_by_url)
         VALUES ($1, $2, $3)
         ON CONFLICT (feed_url) DO NOTHING",
    )
    .bind(feed_url)
    .bind(home_url)
    .bind(discovered_by_url)
    .execute(pool)
    .await?;
    Ok(())
}

/// Feeds due for polling on this node: `next_fetch_at` in the past or never
/// set, sharded by a stable hash of the feed URL.
pub async fn due_feeds(
    pool: &PgPool,
    total_nodes: i32,
    node_index: i32,
    limit: i64,
) -> sqlx::Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT feed_url
         FROM news_feeds
         WHERE COALESCE(next_fetch_at, now() - interval '1 second') <= now()
           AND mod(abs(hashtext(feed_url)), $1) = $2
         ORDER BY next_fetch_at NULLS FIRST, last_fetched NULLS FIRST
         LIMIT $3",
    )
    .bind(total_nodes)
    .bind(node_index)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(url,)| url).collect())
}

#[derive(Debug, Default)]
pub struct FeedUpdate {
    pub name: Option<String>,
    pub link: Option<String>,
    pub image: Option<String>,
    pub last_published: Option<DateTime<Utc>>,
    pub publish_rate_per_hour: Option<f32>,
}

#[derive(Debug)]
pub struct ArticleUpsert {
    pub url: String,
    pub title: String,
    pub description: String,
    pub content: String,
    pub author: String,
    pub image: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub terms: HashMap<String, i32>,
}

/// Persist one polled feed in a single transaction: stamp the feed schedule
/// and metadata, merge the articles (present values are never overwritten by
/// blanks), replace each article's news tokens, and enqueue the article URLs
/// for deeper extraction by the crawler.
pub async fn persist_feed_batch(
    pool: &PgPool,
    feed_url: &str,
    update: &FeedUpdate,
    items: &[ArticleUpsert],
) -> sqlx::Result<()> {
    let now = Utc::now();
    let next_fetch_at = now + Duration::minutes(FEED_REFETCH_MINUTES);

    let mut tx = pool.begin().await?;

    sqlx::query(
        "UPDATE news_feeds
         SET last_fetched = $1,
             next_fetch_at = $2,
             name = COALESCE(NULLIF($3, ''), name),
             link = COALESCE(NULLIF($4, ''), link),
             image = COALESCE(NULLIF($5, ''), image),
             last_published = COALESCE($6, last_published),
             publish_rate_per_hour = COALESCE($7, publish_rate_per_hour)
         WHERE feed_url = $8",
    )
    .bind(now)
    .bind(next_fetch_at)
    .bind(update.name.as_deref().unwrap_or(""))
    .bind(update.link.as_deref().unwrap_or(""))
    .bind(update.image.as_deref().unwrap_or(""))
    .bind(update.last_published)
    .bind(update.publish_rate_per_hour)
    .bind(feed_url)
    .execute(&mut *tx)
    .await?;

    let mut discovered: Vec<String> = Vec::new();
    for item in items {
        sqlx::query(
            "INSERT INTO news_articles(url, feed_url, title, description, image, content, author, published_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now())
             ON CONFLICT (url) DO UPDATE SET
               title = COALESCE(NULLIF(EXCLUDED.title, ''), news_articles.title),
               description = COALESCE(NULLIF(EXCLUDED.description, ''), news_articles.description),
               image = COALESCE(NULLIF(EXCLUDED.image, ''), news_articles.image),
               content = CASE
                   WHEN COALESCE(news_articles.content, '') = '' THEN EXCLUDED.content
                   WHEN COALESCE(EXCLUDED.content, '') = '' THEN news_articles.content
                   ELSE EXCLUDED.content
               END,
               author = COALESCE(NULLIF(EXCLUDED.author, ''), news_articles.author),
               published_at = COALESCE(EXCLUDED.published_at, news_articles.published_at),
               updated_at = now()",
        )
        .bind(&item.url)
        .bind(feed_url)
        .bind(&item.title)
        .bind(&item.description)
        .bind(item.image.as_deref().unwrap_or(""))
        .bind(&item.content)
        .bind(&item.author)
        .bind(item.published_at)
        .execute(&mut *tx)
        .await?;

        discovered.push(item.url.clone());

        if item.terms.is_empty() {
            continue;
        }
        sqlx::query("DELETE FROM tokens WHERE source_type = $1 AND article_url = $2")
            .bind(SOURCE_NEWS)
            .bind(&item.url)
            .execute(&mut *tx)
            .await?;

        let terms: Vec<String> = item.terms.keys().cloned().collect();
        let frequencies: Vec<i32> = terms.iter().map(|t| item.terms[t]).collect();
        sqlx::query(
            "INSERT INTO tokens(doc_id, article_url, source_type, term, field, frequency)
             SELECT NULL, $1, $2, t.term, $3, t.frequency
             FROM UNNEST($4::text[], $5::int[]) AS t(term, frequency)",
        )
        .bind(&item.url)
        .bind(SOURCE_NEWS)
        .bind(FIELD_BODY)
        .bind(&terms)
        .bind(&frequencies)
        .execute(&mut *tx)
        .await?;
    }

    if !discovered.is_empty() {
        let domains: Vec<String> = discovered.iter().map(|u| registrable_domain(u)).collect();
        sqlx::query(
            "INSERT INTO crawl_queue(url, status, domain, attempt_count)
             SELECT u.url, 'queued', u.domain, 0
             FROM UNNEST($1::text[], $2::text[]) AS u(url, domain)
             ON CONFLICT (url) DO NOTHING",
        )
        .bind(&discovered)
        .bind(&domains)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    info!(feed_url, items = items.len(), "persisted feed batch");
    Ok(())
}

/// Fill in a news article's content from a full crawl of its URL. Only fires
/// when the stored content is empty and the crawled content is substantial.
pub async fn backfill_article_content(
    pool: &PgPool,
    url: &str,
    content: &str,
) -> sqlx::Result<bool> {
    if content.len() < MIN_BACKFILL_CHARS {
        return Ok(false);
    }
    let result = sqlx::query(
        "UPDATE news_articles
         SET content = $1, updated_at = now()
         WHERE url = $2 AND COALESCE(content, '') = ''",
    )
    .bind(content)
    .bind(url)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}
