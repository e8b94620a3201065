use anyhow::Result;
use tracing::info;
use xxhash_rust::xxh3::xxh3_64;

use crate::core::AppState;
use crate::storage::analytics::{fingerprint_sources, upsert_fingerprints};

const FLUSH_BATCH_SIZE: usize = 2000;

/// 64-bit SimHash over a token stream: each token hashes to 64 bits, set
/// bits vote +1 and unset bits −1 per column, and the fingerprint keeps the
/// columns with a positive sum. Near-duplicate content lands at a small
/// Hamming distance.
pub fn simhash<I, S>(tokens: I) -> u64
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut weights = [0i64; 64];
    for token in tokens {
        let hash = xxh3_64(token.as_ref().as_bytes());
        for (bit, weight) in weights.iter_mut().enumerate() {
            if (hash >> bit) & 1 == 1 {
                *weight += 1;
            } else {
                *weight -= 1;
            }
        }
    }

    let mut fingerprint = 0u64;
    for (bit, weight) in weights.iter().enumerate() {
        if *weight > 0 {
            fingerprint |= 1 << bit;
        }
    }
    fingerprint
}

/// Map the unsigned fingerprint onto Postgres BIGINT: values at or above
/// 2^63 wrap to `value − 2^64`, preserving the bit pattern.
pub fn to_signed_i64(value: u64) -> i64 {
    i64::from_le_bytes(value.to_le_bytes())
}

/// Fingerprint every done document on this shard and bulk-upsert the
/// results in batches.
pub async fn run(state: &AppState) -> Result<()> {
    let sources = fingerprint_sources(
        &state.db,
        state.settings.batch_total_nodes,
        state.settings.batch_node_index,
    )
    .await?;

    let mut batch: Vec<(i64, i64)> = Vec::with_capacity(FLUSH_BATCH_SIZE);
    let mut total = 0usize;
    for (doc_id, content) in sources {
        let fingerprint = to_signed_i64(simhash(content.split_whitespace()));
        batch.push((doc_id, fingerprint));
        if batch.len() >= FLUSH_BATCH_SIZE {
            upsert_fingerprints(&state.db, &batch).await?;
            total += batch.len();
            batch.clear();
        }
    }
    if !batch.is_empty() {
        total += batch.len();
        upsert_fingerprints(&state.db, &batch).await?;
    }

    info!(documents = total, "refreshed document fingerprints");
    Ok(())
}
