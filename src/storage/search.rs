use chrono::{DateTime, Utc};
use sqlx::PgPool;

/// Field weighting of token hits, applied in SQL: title 3.2,
/// description 1.7, body 1.0.
const WEB_SEARCH_SQL: &str = "
WITH scored AS (
  SELECT d.id,
         d.title,
         d.description,
         d.url,
         SUM(
           t.frequency
           * COALESCE(ts.idf, 1.0)
           * CASE t.field
               WHEN 1 THEN 3.2
               WHEN 2 THEN 1.7
               ELSE 1.0
             END
         ) AS token_score,
         COUNT(DISTINCT t.term) AS matched_terms
  FROM tokens t
  JOIN documents d ON d.id = t.doc_id
  LEFT JOIN term_statistics ts ON ts.term = t.term
  WHERE d.status = 'done'
    AND t.term = ANY($1)
  GROUP BY d.id, d.title, d.description, d.url
)
SELECT COALESCE(title, '') AS title,
       COALESCE(description, '') AS description,
       url,
       token_score,
       matched_terms
FROM scored
ORDER BY token_score DESC, url ASC
LIMIT $2";

/// Numeric-only projection used when legacy rows hold non-UTF-8 bytes: no
/// text columns cross the wire, so the retry cannot trip over them again.
const FALLBACK_WEB_SEARCH_SQL: &str = "
WITH scored AS (
  SELECT d.id,
         SUM(
           t.frequency
           * COALESCE(ts.idf, 1.0)
           * CASE t.field
               WHEN 1 THEN 3.2
               WHEN 2 THEN 1.7
               ELSE 1.0
             END
         ) AS token_score,
         COUNT(DISTINCT t.term) AS matched_terms
  FROM tokens t
  JOIN documents d ON d.id = t.doc_id
  LEFT JOIN term_statistics ts ON ts.term = t.term
  WHERE d.status = 'done'
    AND t.term = ANY($1)
  GROUP BY d.id
)
SELECT token_score, matched_terms
FROM scored
ORDER BY token_score DESC
LIMIT $2";

const NEWS_SEARCH_SQL: &str = "
SELECT COALESCE(na.title, '') AS title,
       COALESCE(na.description, '') AS description,
       na.url,
       nf.name AS feed_name,
       na.author,
       na.published_at,
       SUM(
         t.frequency
         * COALESCE(ts.idf, 1.0)
       ) AS token_score,
       COUNT(DISTINCT t.term) AS matched_terms
FROM tokens t
JOIN news_articles na ON na.url = t.article_url
LEFT JOIN news_feeds nf ON nf.feed_url = na.feed_url
LEFT JOIN term_statistics ts ON ts.term = t.term
WHERE t.source_type = 2
  AND t.term = ANY($1)
GROUP BY na.title, na.description, na.url, nf.name, na.author, na.published_at
ORDER BY token_score DESC, na.url ASC
LIMIT $2";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WebCandidate {
    pub title: String,
    pub description: String,
    pub url: String,
    pub token_score: Option<f64>,
    pub matched_terms: Option<i64>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NewsCandidate {
    pub title: String,
    pub description: String,
    pub url: String,
    pub feed_name: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub token_score: Option<f64>,
    pub matched_terms: Option<i64>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DegradedCandidate {
    pub token_score: Option<f64>,
    pub matched_terms: Option<i64>,
}

/// Candidate retrieval for the web list; `Degraded` is returned after an
/// encoding-fault retry where only numeric columns were projected.
pub enum WebCandidates {
    Full(Vec<WebCandidate>),
    Degraded(Vec<DegradedCandidate>),
}

fn is_encoding_fault(err: &sqlx::Error) -> bool {
    // 22021 = character_not_in_repertoire: legacy rows with non-UTF-8 bytes.
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("22021"))
}

pub async fn web_candidates(
    pool: &PgPool,
    query_terms: &[String],
    candidate_limit: i64,
) -> sqlx::Result<WebCandidates> {
    match sqlx::query_as::<_, WebCandidate>(WEB_SEARCH_SQL)
        .bind(query_terms)
        .bind(candidate_limit)
        .fetch_all(pool)
        .await
    {
        Ok(rows) => Ok(WebCandidates::Full(rows)),
        Err(err) if is_encoding_fault(&err) => {
            let mut conn = pool.acquire().await?;
            sqlx::query("SET client_encoding TO 'SQL_ASCII'")
                .execute(&mut *conn)
                .await?;
            let rows = sqlx::query_as::<_, DegradedCandidate>(FALLBACK_WEB_SEARCH_SQL)
                .bind(query_terms)
                .bind(candidate_limit)
                .fetch_all(&mut *conn)
                .await?;
            Ok(WebCandidates::Degraded(rows))
        }
        Err(err) => Err(err),
    }
}

pub async fn news_candidates(
    pool: &PgPool,
    query_terms: &[String],
    candidate_limit: i64,
) -> sqlx::Result<Vec<NewsCandidate>> {
    sqlx::query_as::<_, NewsCandidate>(NEWS_SEARCH_SQL)
        .bind(query_terms)
        .bind(candidate_limit)
        .fetch_all(pool)
        .await
}
