use futures::TryStreamExt;
use sqlx::{PgPool, Row};

/// Stage-and-merge upsert of document fingerprints. The temp table lives for
/// the transaction only; the merge touches one round-trip regardless of row
/// count.
pub async fn upsert_fingerprints(pool: &PgPool, rows: &[(i64, i64)]) -> sqlx::Result<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let doc_ids: Vec<i64> = rows.iter().map(|(id, _)| *id).collect();
    let fingerprints: Vec<i64> = rows.iter().map(|(_, fp)| *fp).collect();

    let mut tx = pool.begin().await?;
    sqlx::query(
        "CREATE TEMP TABLE tmp_document_fingerprints (
           doc_id BIGINT PRIMARY KEY,
           fingerprint BIGINT NOT NULL
         ) ON COMMIT DROP",
    )
    .execute(&mut *tx)
    .await?;
    sqlx::query(
        "INSERT INTO tmp_document_fingerprints(doc_id, fingerprint)
         SELECT t.doc_id, t.fingerprint
         FROM UNNEST($1::bigint[], $2::bigint[]) AS t(doc_id, fingerprint)",
    )
    .bind(&doc_ids)
    .bind(&fingerprints)
    .execute(&mut *tx)
    .await?;
    sqlx::query(
        "INSERT INTO document_fingerprints(doc_id, fingerprint)
         SELECT doc_id, fingerprint
         FROM tmp_document_fingerprints
         ON CONFLICT (doc_id) DO UPDATE
         SET fingerprint = EXCLUDED.fingerprint",
    )
    .execute(&mut *tx)
    .await?;
    tx.commit().await
}

/// Load `(id, content)` for every done document on this shard.
pub async fn fingerprint_sources(
    pool: &PgPool,
    total_nodes: i32,
    node_index: i32,
) -> sqlx::Result<Vec<(i64, String)>> {
    let mut rows = sqlx::query(
        "SELECT id, content
         FROM documents
         WHERE status = 'done'
           AND mod(id, $1) = $2",
    )
    .bind(total_nodes as i64)
    .bind(node_index as i64)
    .fetch(pool);

    let mut out = Vec::new();
    while let Some(row) = rows.try_next().await? {
        let id: i64 = row.try_get("id")?;
        let content: Option<String> = row.try_get("content")?;
        out.push((id, content.unwrap_or_default()));
    }
    Ok(out)
}

/// Rebuild the resolved link graph from raw outlinks: edges exist only where
/// the target URL is a known document.
pub async fn rebuild_link_graph(pool: &PgPool) -> sqlx::Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("TRUNCATE links_resolved").execute(&mut *tx).await?;
    sqlx::query(
        "INSERT INTO links_resolved(source_doc_id, target_doc_id)
         SELECT DISTINCT lo.source_doc_id, d.id
         FROM links_outgoing lo
         JOIN documents d ON d.url = lo.target_url
         ON CONFLICT (source_doc_id, target_doc_id) DO NOTHING",
    )
    .execute(&mut *tx)
    .await?;
    tx.commit().await
}

pub async fn done_document_ids(pool: &PgPool) -> sqlx::Result<Vec<i64>> {
    let rows: Vec<(i64,)> = sqlx::query_as("SELECT id FROM documents WHERE status = 'done'")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

pub async fn resolved_edges(pool: &PgPool) -> sqlx::Result<Vec<(i64, i64)>> {
    sqlx::query_as("SELECT source_doc_id, target_doc_id FROM links_resolved")
        .fetch_all(pool)
        .await
}

/// Stage-and-merge upsert of PageRank and indegree per document.
pub async fn upsert_authority(pool: &PgPool, rows: &[(i64, f64, i32)]) -> sqlx::Result<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let doc_ids: Vec<i64> = rows.iter().map(|r| r.0).collect();
    let pageranks: Vec<f64> = rows.iter().map(|r| r.1).collect();
    let inlink_counts: Vec<i32> = rows.iter().map(|r| r.2).collect();

    let mut tx = pool.begin().await?;
    sqlx::query(
        "CREATE TEMP TABLE tmp_document_authority (
           doc_id BIGINT PRIMARY KEY,
           pagerank DOUBLE PRECISION NOT NULL,
           inlink_count INT NOT NULL
         ) ON COMMIT DROP",
    )
    .execute(&mut *tx)
    .await?;
    sqlx::query(
        "INSERT INTO tmp_document_authority(doc_id, pagerank, inlink_count)
         SELECT t.doc_id, t.pagerank, t.inlink_count
         FROM UNNEST($1::bigint[], $2::double precision[], $3::int[]) AS t(doc_id, pagerank, inlink_count)",
    )
    .bind(&doc_ids)
    .bind(&pageranks)
    .bind(&inlink_counts)
    .execute(&mut *tx)
    .await?;
    sqlx::query(
        "INSERT INTO document_authority(doc_id, pagerank, inlink_count)
         SELECT doc_id, pagerank, inlink_count
         FROM tmp_document_authority
         ON CONFLICT (doc_id) DO UPDATE
         SET pagerank = EXCLUDED.pagerank,
             inlink_count = EXCLUDED.inlink_count",
    )
    .execute(&mut *tx)
    .await?;
    tx.commit().await
}

/// Replace the BM25 term statistics wholesale: corpus averages plus the
/// smoothed idf `ln((N − df + 0.5)/(df + 0.5) + 1)` per term.
pub async fn replace_term_statistics(pool: &PgPool) -> sqlx::Result<()> {
    let mut tx = pool.begin().await?;

    let avg_doc_len: f64 = sqlx::query(
        "SELECT AVG(word_count)::float AS avg FROM documents WHERE status = 'done'",
    )
    .fetch_one(&mut *tx)
    .await?
    .try_get::<Option<f64>, _>("avg")?
    .unwrap_or(0.0);

    let doc_total: i64 = sqlx::query("SELECT COUNT(*) AS total FROM documents WHERE status = 'done'")
        .fetch_one(&mut *tx)
        .await?
        .try_get::<i64, _>("total")?
        .max(1);

    sqlx::query("TRUNCATE term_statistics").execute(&mut *tx).await?;
    sqlx::query(
        "INSERT INTO term_statistics(term, doc_frequency, idf, avg_doc_len)
         SELECT t.term,
                COUNT(DISTINCT t.doc_id) AS df,
                LN(($1 - COUNT(DISTINCT t.doc_id) + 0.5) / (COUNT(DISTINCT t.doc_id) + 0.5) + 1),
                $2
         FROM tokens t
         GROUP BY t.term",
    )
    .bind(doc_total as f64)
    .bind(avg_doc_len)
    .execute(&mut *tx)
    .await?;

    tx.commit().await
}
