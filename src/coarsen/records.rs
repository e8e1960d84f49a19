//! Wire records exchanged during contraction, and their local
//! deduplication.
//!
//! Records are `#[repr(C)]` Pod structs of 64-bit words so migration can
//! cast slices straight to bytes. Deduplication is a parallel sort followed
//! by a parallel reduction over equal-key runs; the sort order (by source,
//! then target) doubles as the migration order, since cluster IDs owned by
//! the same rank are contiguous.

use bytemuck::{Pod, Zeroable};
use rayon::prelude::*;

/// A fine vertex assigned to a cluster owned by another rank.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub(crate) struct ClusterNode {
    /// Global ID of the cluster representative.
    pub cluster: u64,
    /// Fine vertex weight, aggregated across duplicates.
    pub weight: i64,
}

/// A fine edge whose source vertex is assigned to a cluster owned by
/// another rank. Both endpoints are expressed as cluster IDs.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub(crate) struct ClusterEdge {
    pub src: u64,
    pub dst: u64,
    /// Fine edge weight, aggregated across duplicates.
    pub weight: i64,
}

/// Answer to a migrated node record: the coarse global ID its cluster was
/// assigned by the owning rank.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub(crate) struct ClusterMapping {
    pub cluster: u64,
    pub coarse: u64,
}

const _: () = {
    assert!(std::mem::size_of::<ClusterNode>() == 16);
    assert!(std::mem::size_of::<ClusterEdge>() == 24);
    assert!(std::mem::size_of::<ClusterMapping>() == 16);
};

/// Indices of the first element of every equal-key run of a sorted slice.
/// Order-preserving, so the result is itself sorted.
fn run_starts<T, K, F>(sorted: &[T], key: F) -> Vec<usize>
where
    T: Sync,
    K: PartialEq + Send,
    F: Fn(&T) -> K + Sync + Send,
{
    (0..sorted.len())
        .into_par_iter()
        .filter(|&i| i == 0 || key(&sorted[i]) != key(&sorted[i - 1]))
        .collect()
}

/// Sort edge records by `(src, dst)` and coalesce duplicates by summing
/// their weights.
pub(crate) fn dedup_cluster_edges(mut edges: Vec<ClusterEdge>) -> Vec<ClusterEdge> {
    edges.par_sort_unstable_by_key(|e| (e.src, e.dst));
    let starts = run_starts(&edges, |e| (e.src, e.dst));
    starts
        .par_iter()
        .map(|&s| {
            let mut weight = 0;
            let mut i = s;
            while i < edges.len() && edges[i].src == edges[s].src && edges[i].dst == edges[s].dst {
                weight += edges[i].weight;
                i += 1;
            }
            ClusterEdge {
                src: edges[s].src,
                dst: edges[s].dst,
                weight,
            }
        })
        .collect()
}

/// Sort node records by cluster and coalesce duplicates by summing their
/// weights.
pub(crate) fn dedup_cluster_nodes(mut nodes: Vec<ClusterNode>) -> Vec<ClusterNode> {
    nodes.par_sort_unstable_by_key(|rec| rec.cluster);
    let starts = run_starts(&nodes, |rec| rec.cluster);
    starts
        .par_iter()
        .map(|&s| {
            let mut weight = 0;
            let mut i = s;
            while i < nodes.len() && nodes[i].cluster == nodes[s].cluster {
                weight += nodes[i].weight;
                i += 1;
            }
            ClusterNode {
                cluster: nodes[s].cluster,
                weight,
            }
        })
        .collect()
}

#[cfg(test)]
mod layout_tests {
    use super::*;
    use static_assertions::assert_eq_align;

    // Word-aligned and padding-free, or the byte casts would be UB.
    assert_eq_align!(ClusterNode, u64);
    assert_eq_align!(ClusterEdge, u64);
    assert_eq_align!(ClusterMapping, u64);
}
