use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::core::types::SOURCE_WEB;
use crate::crawler::normalize::registrable_domain;

pub struct NewDocument<'a> {
    pub url: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub content: &'a str,
    pub published_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub word_count: i32,
    pub quality_score: f64,
    pub freshness_score: f64,
}

/// Persist one crawled page in a single transaction: upsert the document
/// row, replace its tokens and outlinks wholesale, and enqueue the
/// discovered outlinks. Either everything lands or nothing does.
pub async fn persist_document(
    pool: &PgPool,
    doc: &NewDocument<'_>,
    field_tokens: &[(i16, &HashMap<String, i32>)],
    outlinks: &[String],
) -> sqlx::Result<i64> {
    let mut tx = pool.begin().await?;

    let doc_id: i64 = sqlx::query(
        "INSERT INTO documents(
            url, canonical_url, title, description, content,
            published_at, updated_at, word_count, quality_score, freshness_score, status
         ) VALUES ($1, $1, $2, $3, $4, $5, $6, $7, $8, $9, 'done')
         ON CONFLICT (url) DO UPDATE SET
           title = EXCLUDED.title,
           description = EXCLUDED.description,
           content = EXCLUDED.content,
           published_at = EXCLUDED.published_at,
           updated_at = EXCLUDED.updated_at,
           word_count = EXCLUDED.word_count,
           quality_score = EXCLUDED.quality_score,
           freshness_score = EXCLUDED.freshness_score,
           status = 'done'
         RETURNING id",
    )
    .bind(doc.url)
    .bind(doc.title)
    .bind(doc.description)
    .bind(doc.content)
    .bind(doc.published_at)
    .bind(doc.updated_at)
    .bind(doc.word_count)
    .bind(doc.quality_score)
    .bind(doc.freshness_score)
    .fetch_one(&mut *tx)
    .await?
    .try_get("id")?;

    // Replace, never merge: stale tokens from a previous crawl must not
    // survive a re-index.
    sqlx::query("DELETE FROM tokens WHERE doc_id = $1")
        .bind(doc_id)
        .execute(&mut *tx)
        .await?;

    let mut terms: Vec<String> = Vec::new();
    let mut fields: Vec<i16> = Vec::new();
    let mut frequencies: Vec<i32> = Vec::new();
    for (field, counts) in field_tokens {
        for (term, frequency) in counts.iter() {
            terms.push(term.clone());
            fields.push(*field);
            frequencies.push(*frequency);
        }
    }
    if !terms.is_empty() {
        sqlx::query(
            "INSERT INTO tokens(doc_id, source_type, term, field, frequency)
             SELECT $1, $2, t.term, t.field, t.frequency
             FROM UNNEST($3::text[], $4::smallint[], $5::int[]) AS t(term, field, frequency)",
        )
        .bind(doc_id)
        .bind(SOURCE_WEB)
        .bind(&terms)
        .bind(&fields)
        .bind(&frequencies)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query("DELETE FROM links_outgoing WHERE source_doc_id = $1")
        .bind(doc_id)
        .execute(&mut *tx)
        .await?;
    if !outlinks.is_empty() {
        sqlx::query(
            "INSERT INTO links_outgoing(source_doc_id, target_url)
             SELECT $1, u FROM UNNEST($2::text[]) AS u",
        )
        .bind(doc_id)
        .bind(outlinks)
        .execute(&mut *tx)
        .await?;

        // Discovered links enter the queue in the same transaction; the
        // conflict clause makes rediscovery a no-op.
        let domains: Vec<String> = outlinks.iter().map(|u| registrable_domain(u)).collect();
        sqlx::query(
            "INSERT INTO crawl_queue(url, status, domain, attempt_count)
             SELECT u.url, 'queued', u.domain, 0
             FROM UNNEST($1::text[], $2::text[]) AS u(url, domain)
             ON CONFLICT (url) DO NOTHING",
        )
        .bind(outlinks)
        .bind(&domains)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(doc_id)
}
