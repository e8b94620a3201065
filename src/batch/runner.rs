use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{error, info};

use crate::batch::{fingerprints, lexicon, link_graph, news, term_stats};
use crate::core::AppState;

const ERROR_BACKOFF: Duration = Duration::from_secs(15);

/// One batch cycle. The sharded jobs run on every node; the coordinator
/// additionally rebuilds the link graph and then runs the three expensive
/// global jobs concurrently.
pub async fn run_once(state: &AppState) -> Result<()> {
    news::run(state).await?;
    fingerprints::run(state).await?;

    if !state.settings.runs_global_jobs() {
        info!(
            node_index = state.settings.batch_node_index,
            total_nodes = state.settings.batch_total_nodes,
            "skipping global jobs on worker node"
        );
        return Ok(());
    }

    link_graph::rebuild_links(state).await?;

    let (pagerank, bm25, lexicon) = tokio::join!(
        link_graph::run_pagerank(state),
        term_stats::run(state),
        lexicon::run(state),
    );
    pagerank?;
    bm25?;
    lexicon?;
    Ok(())
}

/// The periodic loop: run a cycle, then sleep out the remainder of the
/// configured interval. A failed cycle backs off briefly and tries again.
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let interval = Duration::from_secs(state.settings.batch_interval_s);
    info!(interval_s = state.settings.batch_interval_s, "starting batch runner");

    loop {
        let started = Instant::now();
        match run_once(&state).await {
            Ok(()) => {
                let elapsed = started.elapsed();
                let sleep_for = interval.saturating_sub(elapsed).max(Duration::from_secs(1));
                info!(
                    elapsed_s = elapsed.as_secs_f64(),
                    sleep_s = sleep_for.as_secs(),
                    "batch cycle complete"
                );
                tokio::time::sleep(sleep_for).await;
            }
            Err(err) => {
                error!(%err, "batch cycle failed, retrying in 15s");
                tokio::time::sleep(ERROR_BACKOFF).await;
            }
        }
    }
}
