use std::collections::HashMap;

use anyhow::Result;
use tracing::info;

use crate::core::AppState;
use crate::storage::analytics::{
    done_document_ids, rebuild_link_graph, resolved_edges, upsert_authority,
};

const DAMPING: f64 = 0.85;
const ITERATIONS: usize = 20;

/// Rebuild the resolved edge set from raw outlinks. Runs before the jobs
/// that consume the graph.
pub async fn rebuild_links(state: &AppState) -> Result<()> {
    rebuild_link_graph(&state.db).await?;
    info!("rebuilt resolved link graph");
    Ok(())
}

/// Iterative power-method PageRank. Each iteration reads a snapshot of the
/// previous one; dangling nodes simply contribute nothing, so the total mass
/// can dip below one by the dangling share. Returns per-node rank and
/// indegree, aligned with `nodes`.
pub fn pagerank(nodes: &[i64], edges: &[(i64, i64)]) -> (Vec<f64>, Vec<i32>) {
    let n = nodes.len();
    if n == 0 {
        return (Vec::new(), Vec::new());
    }

    let index: HashMap<i64, usize> = nodes.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut inlinks = vec![0i32; n];
    for (source, target) in edges {
        let (Some(&s), Some(&t)) = (index.get(source), index.get(target)) else {
            continue;
        };
        outgoing[s].push(t);
        inlinks[t] += 1;
    }

    let mut pr = vec![1.0 / n as f64; n];
    for _ in 0..ITERATIONS {
        let mut next = vec![(1.0 - DAMPING) / n as f64; n];
        for (node, targets) in outgoing.iter().enumerate() {
            if targets.is_empty() {
                continue;
            }
            let share = DAMPING * pr[node] / targets.len() as f64;
            for &target in targets {
                next[target] += share;
            }
        }
        pr = next;
    }

    (pr, inlinks)
}

/// Compute and persist PageRank plus indegree for every done document.
pub async fn run_pagerank(state: &AppState) -> Result<()> {
    let nodes = done_document_ids(&state.db).await?;
    if nodes.is_empty() {
        return Ok(());
    }
    let edges = resolved_edges(&state.db).await?;
    let (pr, inlinks) = pagerank(&nodes, &edges);

    let rows: Vec<(i64, f64, i32)> = nodes
        .iter()
        .zip(pr.iter().zip(inlinks.iter()))
        .map(|(id, (rank, indegree))| (*id, *rank, *indegree))
        .collect();
    upsert_authority(&state.db, &rows).await?;
    info!(nodes = nodes.len(), edges = edges.len(), "updated document authority");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_graph_yields_nothing() {
        let (pr, inlinks) = pagerank(&[], &[]);
        assert!(pr.is_empty());
        assert!(inlinks.is_empty());
    }

    #[test]
    fn cycle_spreads_rank_evenly_and_sums_to_one() {
        let nodes = [1, 2, 3];
        let edges = [(1, 2), (2, 3), (3, 1)];
        let (pr, inlinks) = pagerank(&nodes, &edges);
        let sum: f64 = pr.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9, "mass {sum} should be conserved with no dangling nodes");
        for rank in &pr {
            assert!((rank - 1.0 / 3.0).abs() < 1e-9);
        }
        assert_eq!(inlinks, vec![1, 1, 1]);
    }

    #[test]
    fn link_target_outranks_isolated_peer() {
        // 1 and 2 both point at 3; 4 is isolated.
        let nodes = [1, 2, 3, 4];
        let edges = [(1, 3), (2, 3)];
        let (pr, inlinks) = pagerank(&nodes, &edges);
        assert!(pr[2] > pr[0]);
        assert!(pr[2] > pr[3]);
        assert_eq!(inlinks, vec![0, 0, 2, 0]);
    }

    #[test]
    fn edges_to_unknown_documents_are_ignored() {
        let nodes = [1, 2];
        let edges = [(1, 2), (1, 99), (99, 2)];
        let (pr, inlinks) = pagerank(&nodes, &edges);
        assert_eq!(pr.len(), 2);
        assert_eq!(inlinks, vec![0, 1]);
    }

    #[test]
    fn dangling_mass_leaks_but_ranks_stay_positive() {
        // 2 has no outlinks: its damped share leaves the system.
        let nodes = [1, 2];
        let edges = [(1, 2)];
        let (pr, _) = pagerank(&nodes, &edges);
        let sum: f64 = pr.iter().sum();
        assert!(sum <= 1.0 + 1e-9);
        assert!(pr.iter().all(|rank| *rank > 0.0));
        assert!(pr[1] > pr[0]);
    }
}
