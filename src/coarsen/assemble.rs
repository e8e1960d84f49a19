//! Coarse adjacency assembly: bucket contributors by coarse vertex, then
//! aggregate edge weights through per-thread rating maps.

use rayon::prelude::*;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use crate::coarsen::mapping::Resolution;
use crate::coarsen::records::ClusterEdge;
use crate::graph::DistributedGraph;
use crate::comm::Communicator;
use crate::parallel::{prefix_sum, split_lengths_mut};
use crate::types::{EdgeId, EdgeWeight, GlobalNodeId, NodeId, NodeWeight};

/// Rewrite the source of every received edge record from a cluster global
/// ID to the dense local coarse ID. Record blocks stay contiguous because
/// the dense numbering is monotone in the cluster ID.
pub(crate) fn localize_edge_sources(
    edges: &mut [ClusterEdge],
    offset: GlobalNodeId,
    lnode_to_lcnode: &[NodeId],
) {
    edges.par_iter_mut().for_each(|edge| {
        edge.src = lnode_to_lcnode[(edge.src - offset) as usize] as u64;
    });
}

/// Contributors of each coarse vertex: home fine vertices (entries below
/// `n`) and received edge-record blocks (entry `n + i` marks the block
/// starting at record `i`).
pub(crate) struct Buckets {
    /// `positions[c_u]..positions[c_u + 1]` indexes `entries`.
    pub positions: Vec<usize>,
    pub entries: Vec<usize>,
}

/// Group contributors by coarse vertex without sorting: count, prefix-sum,
/// then place with an atomic decrement per contributor.
pub(crate) fn build_buckets<C: Communicator>(
    graph: &DistributedGraph<C>,
    clustering: &[GlobalNodeId],
    lnode_to_lcnode: &[NodeId],
    c_n: NodeId,
    local_edges: &[ClusterEdge],
) -> Buckets {
    let n = graph.n() as usize;
    let offset = graph.offset_n();

    let counts: Vec<AtomicUsize> = (0..c_n as usize + 1).map(|_| AtomicUsize::new(0)).collect();
    let count_home = || {
        (0..n).into_par_iter().for_each(|u| {
            let cluster = clustering[u];
            if graph.is_owned_global_node(cluster) {
                let c_u = lnode_to_lcnode[(cluster - offset) as usize];
                counts[c_u as usize].fetch_add(1, Ordering::Relaxed);
            }
        });
    };
    let count_blocks = || {
        (0..local_edges.len()).into_par_iter().for_each(|i| {
            if i == 0 || local_edges[i].src != local_edges[i - 1].src {
                counts[local_edges[i].src as usize].fetch_add(1, Ordering::Relaxed);
            }
        });
    };
    rayon::join(count_home, count_blocks);

    let mut positions: Vec<usize> = counts.into_iter().map(AtomicUsize::into_inner).collect();
    prefix_sum(&mut positions);
    let total = positions[c_n as usize];

    // The decrement pass turns `positions` into start offsets in place.
    let positions: Vec<AtomicUsize> = positions.into_iter().map(AtomicUsize::new).collect();
    let entries: Vec<AtomicUsize> = (0..total).map(|_| AtomicUsize::new(0)).collect();

    let place_home = || {
        (0..n).into_par_iter().for_each(|u| {
            let cluster = clustering[u];
            if graph.is_owned_global_node(cluster) {
                let c_u = lnode_to_lcnode[(cluster - offset) as usize];
                let pos = positions[c_u as usize].fetch_sub(1, Ordering::Relaxed);
                entries[pos - 1].store(u, Ordering::Relaxed);
            }
        });
    };
    let place_blocks = || {
        (0..local_edges.len()).into_par_iter().for_each(|i| {
            if i == 0 || local_edges[i].src != local_edges[i - 1].src {
                let c_u = local_edges[i].src as usize;
                let pos = positions[c_u].fetch_sub(1, Ordering::Relaxed);
                entries[pos - 1].store(n + i, Ordering::Relaxed);
            }
        });
    };
    rayon::join(place_home, place_blocks);

    Buckets {
        positions: positions.into_iter().map(AtomicUsize::into_inner).collect(),
        entries: entries.into_iter().map(AtomicUsize::into_inner).collect(),
    }
}

pub(crate) struct CoarseCsr {
    pub c_nodes: Vec<EdgeId>,
    pub c_edges: Vec<NodeId>,
    pub c_edge_weights: Vec<EdgeWeight>,
    /// Owned coarse vertex weights; ghost weights are synchronized later.
    pub c_node_weights: Vec<AtomicI64>,
}

/// Phase G: aggregate the coarse adjacency.
///
/// Chunks of the coarse vertex range are processed independently; each
/// worker reuses one rating map and appends its rows to a thread-local
/// buffer whose per-vertex sizes later become the CSR offsets.
#[allow(clippy::too_many_arguments)]
pub(crate) fn build_coarse_csr<C: Communicator>(
    graph: &DistributedGraph<C>,
    clustering: &[GlobalNodeId],
    lnode_to_lcnode: &[NodeId],
    c_n: NodeId,
    resolution: &Resolution,
    local_edges: &[ClusterEdge],
    buckets: &Buckets,
) -> CoarseCsr {
    let n = graph.n() as usize;

    struct ChunkOut {
        degrees: Vec<u32>,
        weights: Vec<NodeWeight>,
        rows: Vec<(NodeId, EdgeWeight)>,
    }

    let chunk_len = (c_n as usize / (rayon::current_num_threads() * 8).max(1)).max(64);
    let ranges: Vec<(usize, usize)> = (0..c_n as usize)
        .step_by(chunk_len)
        .map(|lo| (lo, (lo + chunk_len).min(c_n as usize)))
        .collect();

    let outs: Vec<ChunkOut> = ranges
        .par_iter()
        .map(|&(lo, hi)| {
            let mut rating: hashbrown::HashMap<NodeId, EdgeWeight> = hashbrown::HashMap::new();
            let mut out = ChunkOut {
                degrees: Vec::with_capacity(hi - lo),
                weights: Vec::with_capacity(hi - lo),
                rows: Vec::new(),
            };

            for c_u in lo..hi {
                let mut c_u_weight: NodeWeight = 0;

                let mut accumulate = |cluster: GlobalNodeId, weight: EdgeWeight| {
                    let c_v = resolution.coarse_local(graph, lnode_to_lcnode, c_n, cluster);
                    if c_v != c_u as NodeId {
                        *rating.entry(c_v).or_insert(0) += weight;
                    }
                };

                for &entry in
                    &buckets.entries[buckets.positions[c_u]..buckets.positions[c_u + 1]]
                {
                    if entry < n {
                        let u = entry as NodeId;
                        c_u_weight += graph.node_weight(u);
                        for (e, v) in graph.neighbors(u) {
                            accumulate(clustering[v as usize], graph.edge_weight(e));
                        }
                    } else {
                        // Weights of migrated vertices are integrated from
                        // the node records afterwards.
                        let mut i = entry - n;
                        while i < local_edges.len() && local_edges[i].src == c_u as u64 {
                            accumulate(local_edges[i].dst, local_edges[i].weight);
                            i += 1;
                        }
                    }
                }

                out.degrees.push(rating.len() as u32);
                out.weights.push(c_u_weight);
                out.rows.extend(rating.drain());
            }
            out
        })
        .collect();

    // Flatten per-chunk degrees into CSR offsets.
    let mut c_nodes: Vec<EdgeId> = Vec::with_capacity(c_n as usize + 1);
    c_nodes.push(0);
    c_nodes.extend(outs.iter().flat_map(|o| o.degrees.iter().map(|&d| d as EdgeId)));
    prefix_sum(&mut c_nodes[..]);
    let c_m = *c_nodes.last().unwrap() as usize;

    let c_node_weights: Vec<AtomicI64> = outs
        .iter()
        .flat_map(|o| o.weights.iter().map(|&w| AtomicI64::new(w)))
        .collect();

    // Copy each chunk's rows into its disjoint slice of the edge arrays.
    let mut c_edges: Vec<NodeId> = vec![0; c_m];
    let mut c_edge_weights: Vec<EdgeWeight> = vec![0; c_m];
    let row_lengths: Vec<usize> = outs.iter().map(|o| o.rows.len()).collect();
    let edge_slices = split_lengths_mut(&mut c_edges, &row_lengths);
    let weight_slices = split_lengths_mut(&mut c_edge_weights, &row_lengths);
    outs.par_iter()
        .zip(edge_slices.into_par_iter().zip(weight_slices))
        .for_each(|(out, (edges, weights))| {
            for (k, &(c_v, w)) in out.rows.iter().enumerate() {
                edges[k] = c_v;
                weights[k] = w;
            }
        });

    CoarseCsr {
        c_nodes,
        c_edges,
        c_edge_weights,
        c_node_weights,
    }
}
