use sqlx::PgPool;
use tracing::info;

use crate::crawler::normalize::{normalize_url, registrable_domain};

/// Queue entry lifecycle. `queued → in_progress` happens exactly once per
/// cycle via [`claim`]; everything after that is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "crawl_status", rename_all = "snake_case")]
pub enum CrawlStatus {
    Queued,
    InProgress,
    Done,
    ValidationError,
    NonSuccessStatusError,
    ProcessingError,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct QueueItem {
    pub url: String,
    pub domain: String,
}

/// Normalize and insert a URL as `queued`. Idempotent: an already-known URL
/// is left untouched. Returns whether a row was inserted.
pub async fn enqueue(pool: &PgPool, raw_url: &str) -> sqlx::Result<bool> {
    let url = normalize_url(raw_url);
    let domain = registrable_domain(&url);
    let result = sqlx::query(
        "INSERT INTO crawl_queue(url, status, domain, attempt_count)
         VALUES ($1, 'queued', $2, 0)
         ON CONFLICT (url) DO NOTHING",
    )
    .bind(&url)
    .bind(&domain)
    .execute(pool)
    .await?;
    let inserted = result.rows_affected() > 0;
    info!(url = %url, inserted, "enqueue");
    Ok(inserted)
}

/// Atomically claim up to `limit` queued entries: select with
/// `FOR UPDATE SKIP LOCKED` so concurrent claimers get disjoint sets, flip
/// them to `in_progress`, bump the attempt counter and stamp the attempt
/// time. Ordering is fair across domains rather than strictly FIFO.
pub async fn claim(pool: &PgPool, limit: i64) -> sqlx::Result<Vec<QueueItem>> {
    let items: Vec<QueueItem> = sqlx::query_as(
        "WITH next_urls AS (
           SELECT q.url, q.domain
           FROM crawl_queue q
           WHERE q.status = 'queued'
           ORDER BY q.domain, q.last_attempt NULLS FIRST, q.attempt_count
           LIMIT $1
           FOR UPDATE OF q SKIP LOCKED
         )
         UPDATE crawl_queue q
         SET status = 'in_progress',
             last_attempt = now(),
             attempt_count = q.attempt_count + 1
         FROM next_urls
         WHERE q.url = next_urls.url
         RETURNING q.url, q.domain",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    info!(requested = limit, returned = items.len(), "claim");
    Ok(items)
}

/// Transition an entry to a terminal status and stamp the attempt time.
pub async fn mark(pool: &PgPool, url: &str, status: CrawlStatus) -> sqlx::Result<()> {
    let result = sqlx::query("UPDATE crawl_queue SET status = $1, last_attempt = now() WHERE url = $2")
        .bind(status)
        .bind(url)
        .execute(pool)
        .await?;
    info!(url, ?status, updated = result.rows_affected(), "mark_status");
    Ok(())
}
