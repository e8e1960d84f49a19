//! Clusterer contract consumed by the multilevel driver, plus a baseline
//! implementation.
//!
//! The engine accepts any clustering that maps owned vertices to global
//! cluster IDs; quality heuristics are pluggable and out of scope here. The
//! baseline merges each vertex into the heaviest-connected neighboring
//! cluster under the weight cap, considering local edges only, which is
//! enough to drive V-cycles in tests and benchmarks.

use crate::comm::Communicator;
use crate::error::Result;
use crate::graph::DistributedGraph;
use crate::types::{GlobalNodeId, NodeWeight};

/// A clustering algorithm usable by the coarsening driver.
pub trait Clusterer<C: Communicator> {
    /// Compute a clustering of the owned vertices of `graph`. Each entry is
    /// the global ID of the cluster representative; no cluster may exceed
    /// `max_cluster_weight`. Returned length is `graph.n()`.
    fn cluster(
        &mut self,
        graph: &DistributedGraph<C>,
        max_cluster_weight: NodeWeight,
    ) -> Result<Vec<GlobalNodeId>>;
}

/// Deterministic greedy clusterer over local edges.
///
/// Scans owned vertices in order; an unassigned vertex opens a cluster and
/// absorbs unassigned owned neighbors, heaviest connection first, while the
/// cap allows. Ghost neighbors are never merged, so every cluster is local
/// and the subsequent contraction migrates nothing; cross-rank clustering
/// comes from the label-propagation family, not from this baseline.
#[derive(Debug, Default)]
pub struct GreedyClusterer;

impl<C: Communicator> Clusterer<C> for GreedyClusterer {
    fn cluster(
        &mut self,
        graph: &DistributedGraph<C>,
        max_cluster_weight: NodeWeight,
    ) -> Result<Vec<GlobalNodeId>> {
        let n = graph.n() as usize;
        let offset = graph.offset_n();
        let unassigned = u64::MAX;
        let mut clustering = vec![unassigned; n];

        for u in 0..graph.n() {
            if clustering[u as usize] != unassigned {
                continue;
            }
            clustering[u as usize] = offset + u as u64;
            let mut weight = graph.node_weight(u);

            let mut candidates: Vec<(i64, u32)> = graph
                .neighbors(u)
                .filter(|&(_, v)| v < graph.n() && clustering[v as usize] == unassigned)
                .map(|(e, v)| (graph.edge_weight(e), v))
                .collect();
            // Heaviest connection first; vertex ID breaks ties.
            candidates.sort_unstable_by_key(|&(w, v)| (std::cmp::Reverse(w), v));

            for (_, v) in candidates {
                if clustering[v as usize] != unassigned {
                    continue;
                }
                let v_weight = graph.node_weight(v);
                if weight + v_weight > max_cluster_weight {
                    continue;
                }
                clustering[v as usize] = offset + u as u64;
                weight += v_weight;
            }
        }

        Ok(clustering)
    }
}
