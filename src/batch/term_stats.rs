use anyhow::Result;
use tracing::info;

use crate::core::AppState;
use crate::storage::analytics::replace_term_statistics;

/// Recompute corpus averages and per-term BM25 idf, replacing the statistics
/// table wholesale. The query layer treats a missing row as idf = 1.
pub async fn run(state: &AppState) -> Result<()> {
    replace_term_statistics(&state.db).await?;
    info!("replaced term statistics");
    Ok(())
}
