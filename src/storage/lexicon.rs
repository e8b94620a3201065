use sqlx::PgPool;
use tracing::warn;

use crate::spellcheck::engine::LexiconEntry;

/// Cap on candidates returned per suspect word.
pub const CANDIDATE_LIMIT: i64 = 120;

/// Minimum popularity for a word to be offered as a correction candidate.
const CANDIDATE_MIN_POPULARITY: f64 = 2.0;

/// Refresh the raw corpus word table: one aggregation over document and
/// article text, counting `[a-z]{2,32}` matches.
pub async fn refresh_words(pool: &PgPool) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO words(word, total_frequency)
         SELECT word, SUM(freq) AS total_frequency
         FROM (
             SELECT m.word AS word, COUNT(*)::bigint AS freq
             FROM documents d
             JOIN LATERAL regexp_matches(lower(
                 concat_ws(' ', d.title, d.description, d.content)
             ), '[a-z]{2,32}', 'g') AS m(word) ON TRUE
             WHERE d.status = 'done'
             GROUP BY m.word

             UNION ALL

             SELECT m.word AS word, COUNT(*)::bigint AS freq
             FROM news_articles na
             JOIN LATERAL regexp_matches(lower(
                 concat_ws(' ', na.title, na.description, na.content)
             ), '[a-z]{2,32}', 'g') AS m(word) ON TRUE
             GROUP BY m.word
         ) all_words
         GROUP BY word
         ON CONFLICT (word) DO UPDATE
         SET total_frequency = EXCLUDED.total_frequency",
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn corpus_word_totals(pool: &PgPool) -> sqlx::Result<Vec<(String, i64)>> {
    sqlx::query_as("SELECT word, total_frequency FROM words")
        .fetch_all(pool)
        .await
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TokenTermStat {
    pub term: String,
    pub doc_freq: i64,
    pub total_freq: i64,
}

/// Per-term document and total frequency from the token index, restricted to
/// alphabetic dictionary-shaped terms.
pub async fn token_term_stats(pool: &PgPool) -> sqlx::Result<Vec<TokenTermStat>> {
    sqlx::query_as(
        "SELECT term,
                COUNT(DISTINCT doc_id) AS doc_freq,
                COALESCE(SUM(frequency), 0)::bigint AS total_freq
         FROM tokens
         WHERE term ~ '^[a-z]{2,32}$'
         GROUP BY term",
    )
    .fetch_all(pool)
    .await
}

#[derive(Debug, Clone)]
pub struct LexiconRow {
    pub word: String,
    pub doc_frequency: i64,
    pub total_frequency: i64,
    pub external_frequency: i64,
    pub popularity_score: f64,
}

/// Stage-and-merge the rebuilt dictionary, then prune rows missing from the
/// staged set. Returns `(changed, removed)` row counts.
pub async fn sync_lexicon(pool: &PgPool, rows: &[LexiconRow]) -> sqlx::Result<(u64, u64)> {
    if rows.is_empty() {
        return Ok((0, 0));
    }

    let words: Vec<String> = rows.iter().map(|r| r.word.clone()).collect();
    let doc_frequencies: Vec<i64> = rows.iter().map(|r| r.doc_frequency).collect();
    let total_frequencies: Vec<i64> = rows.iter().map(|r| r.total_frequency).collect();
    let external_frequencies: Vec<i64> = rows.iter().map(|r| r.external_frequency).collect();
    let popularity_scores: Vec<f64> = rows.iter().map(|r| r.popularity_score).collect();

    let mut tx = pool.begin().await?;
    sqlx::query(
        "CREATE TEMP TABLE tmp_spellcheck_dictionary (
           word TEXT PRIMARY KEY,
           doc_frequency BIGINT NOT NULL,
           total_frequency BIGINT NOT NULL,
           external_frequency BIGINT NOT NULL,
           popularity_score DOUBLE PRECISION NOT NULL
         ) ON COMMIT DROP",
    )
    .execute(&mut *tx)
    .await?;
    sqlx::query(
        "INSERT INTO tmp_spellcheck_dictionary(word, doc_frequency, total_frequency, external_frequency, popularity_score)
         SELECT t.word, t.doc_frequency, t.total_frequency, t.external_frequency, t.popularity_score
         FROM UNNEST($1::text[], $2::bigint[], $3::bigint[], $4::bigint[], $5::double precision[])
           AS t(word, doc_frequency, total_frequency, external_frequency, popularity_score)",
    )
    .bind(&words)
    .bind(&doc_frequencies)
    .bind(&total_frequencies)
    .bind(&external_frequencies)
    .bind(&popularity_scores)
    .execute(&mut *tx)
    .await?;

    let upserted = sqlx::query(
        "INSERT INTO spellcheck_dictionary(word, doc_frequency, total_frequency, external_frequency, popularity_score)
         SELECT word, doc_frequency, total_frequency, external_frequency, popularity_score
         FROM tmp_spellcheck_dictionary
         ON CONFLICT (word) DO UPDATE
         SET doc_frequency = EXCLUDED.doc_frequency,
             total_frequency = EXCLUDED.total_frequency,
             external_frequency = EXCLUDED.external_frequency,
             popularity_score = EXCLUDED.popularity_score
         WHERE spellcheck_dictionary.doc_frequency IS DISTINCT FROM EXCLUDED.doc_frequency
            OR spellcheck_dictionary.total_frequency IS DISTINCT FROM EXCLUDED.total_frequency
            OR spellcheck_dictionary.external_frequency IS DISTINCT FROM EXCLUDED.external_frequency
            OR spellcheck_dictionary.popularity_score IS DISTINCT FROM EXCLUDED.popularity_score",
    )
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let deleted = sqlx::query(
        "DELETE FROM spellcheck_dictionary s
         WHERE NOT EXISTS (
             SELECT 1
             FROM tmp_spellcheck_dictionary t
             WHERE t.word = s.word
         )",
    )
    .execute(&mut *tx)
    .await?
    .rows_affected();

    tx.commit().await?;
    Ok((upserted, deleted))
}

/// Exact lookups for a set of query words.
pub async fn lookup_entries(pool: &PgPool, words: &[String]) -> sqlx::Result<Vec<LexiconEntry>> {
    if words.is_empty() {
        return Ok(Vec::new());
    }
    sqlx::query_as(
        "SELECT word, doc_frequency, total_frequency, external_frequency, popularity_score
         FROM spellcheck_dictionary
         WHERE word = ANY($1)",
    )
    .bind(words)
    .fetch_all(pool)
    .await
}

/// Correction candidates near `word`: same length neighborhood, popular
/// enough to suggest, ranked by trigram similarity. Falls back to a
/// first-letter scan when the trigram operator is unavailable.
pub async fn candidates_for(
    pool: &PgPool,
    word: &str,
    min_len: i64,
    max_len: i64,
) -> sqlx::Result<Vec<LexiconEntry>> {
    let trigram = sqlx::query_as::<_, LexiconEntry>(
        "SELECT word, doc_frequency, total_frequency, external_frequency, popularity_score
         FROM spellcheck_dictionary
         WHERE length(word) BETWEEN $2 AND $3
           AND popularity_score >= $4
           AND word % $1
         ORDER BY similarity(word, $1) DESC, popularity_score DESC
         LIMIT $5",
    )
    .bind(word)
    .bind(min_len)
    .bind(max_len)
    .bind(CANDIDATE_MIN_POPULARITY)
    .bind(CANDIDATE_LIMIT)
    .fetch_all(pool)
    .await;

    match trigram {
        Ok(rows) => Ok(rows),
        Err(err) => {
            warn!(%err, "trigram candidate lookup unavailable, using first-letter fallback");
            first_letter_candidates(pool, word, min_len, max_len).await
        }
    }
}

async fn first_letter_candidates(
    pool: &PgPool,
    word: &str,
    min_len: i64,
    max_len: i64,
) -> sqlx::Result<Vec<LexiconEntry>> {
    let prefix: String = word.chars().take(1).collect();
    sqlx::query_as(
        "SELECT word, doc_frequency, total_frequency, external_frequency, popularity_score
         FROM spellcheck_dictionary
         WHERE length(word) BETWEEN $2 AND $3
           AND popularity_score >= $4
           AND left(word, 1) = $1
         ORDER BY popularity_score DESC
         LIMIT $5",
    )
    .bind(&prefix)
    .bind(min_len)
    .bind(max_len)
    .bind(CANDIDATE_MIN_POPULARITY)
    .bind(CANDIDATE_LIMIT)
    .fetch_all(pool)
    .await
}
