//! Coarse numbering and cross-rank cluster resolution.
//!
//! Phase D numbers the non-empty locally owned clusters densely. Phase E
//! resolves every off-rank cluster this rank can see to its coarse global
//! ID, via two exchanges: an echo along the reversed node-migration layout,
//! and a request/response round for clusters referenced by edges. Phase F
//! freezes the responses into the coarse ghost directory.

use dashmap::DashMap;
use rayon::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::coarsen::records::{ClusterEdge, ClusterMapping, ClusterNode};
use crate::comm::collective::sparse_alltoall;
use crate::comm::{CommTag, Communicator};
use crate::error::Result;
use crate::graph::distribution::find_owner;
use crate::graph::DistributedGraph;
use crate::parallel::{exclusive_prefix_sum, prefix_sum};
use crate::types::{GlobalNodeId, NodeId, Rank};

/// Phase D: mark every locally owned cluster that is non-empty (because a
/// home vertex belongs to it, or because a node record for it arrived) and
/// number the marked ones densely.
///
/// Returns `(lnode_to_lcnode, c_n)`. Entries for empty clusters hold
/// garbage and must not be read.
pub(crate) fn build_lcnode_mapping<C: Communicator>(
    graph: &DistributedGraph<C>,
    clustering: &[GlobalNodeId],
    migrated_nodes: &[ClusterNode],
) -> (Vec<NodeId>, NodeId) {
    let n = graph.n() as usize;
    let offset = graph.offset_n();

    let marks: Vec<AtomicU32> = (0..n).map(|_| AtomicU32::new(0)).collect();
    rayon::join(
        || {
            (0..n).into_par_iter().for_each(|u| {
                let cluster = clustering[u];
                if graph.is_owned_global_node(cluster) {
                    marks[(cluster - offset) as usize].store(1, Ordering::Relaxed);
                }
            });
        },
        || {
            migrated_nodes.par_iter().for_each(|rec| {
                debug_assert!(graph.is_owned_global_node(rec.cluster));
                marks[(rec.cluster - offset) as usize].store(1, Ordering::Relaxed);
            });
        },
    );

    let mut mapping: Vec<NodeId> = marks.into_iter().map(AtomicU32::into_inner).collect();
    prefix_sum(&mut mapping);
    let c_n = mapping.last().copied().unwrap_or(0);
    mapping.par_iter_mut().for_each(|v| *v = v.wrapping_sub(1));

    (mapping, c_n)
}

/// Dedup index over off-rank clusters (Phase E).
///
/// One slot per cluster encodes two cases by magnitude: values below
/// `sentinel` (the global fine vertex count) are indices into the request
/// list of the cluster's owner; values at or above it are
/// `sentinel + coarse_global` for clusters already resolved by the mapping
/// echo. Request slots are assigned first and never overwritten, so every
/// edge-referenced cluster keeps its request index.
pub(crate) struct ClusterResolver {
    map: DashMap<GlobalNodeId, u64>,
    next_index: Vec<AtomicU32>,
    sentinel: u64,
}

impl ClusterResolver {
    pub(crate) fn new(size: Rank, sentinel: u64) -> Self {
        Self {
            map: DashMap::new(),
            next_index: (0..size).map(|_| AtomicU32::new(0)).collect(),
            sentinel,
        }
    }

    /// Register an off-rank cluster, assigning it the next request slot of
    /// its owner on first sight.
    fn request(&self, dist: &[u64], cluster: GlobalNodeId) {
        use dashmap::mapref::entry::Entry;
        if let Entry::Vacant(slot) = self.map.entry(cluster) {
            let owner = find_owner(dist, cluster);
            let index = self.next_index[owner].fetch_add(1, Ordering::Relaxed);
            slot.insert(index as u64);
        }
    }

    /// Record an echoed `(cluster, coarse)` pair. Keeps an existing request
    /// slot so edge resolution still goes through the response tables.
    pub(crate) fn record_echo(&self, cluster: GlobalNodeId, coarse: GlobalNodeId) {
        self.map.entry(cluster).or_insert(self.sentinel + coarse);
    }

    /// Resolve an off-rank cluster for the fine→coarse mapping.
    pub(crate) fn coarse_global(
        &self,
        dist: &[u64],
        responses: &[Vec<u64>],
        cluster: GlobalNodeId,
    ) -> GlobalNodeId {
        let value = *self
            .map
            .get(&cluster)
            .expect("cluster missing from dedup index; clustering is inconsistent");
        if value >= self.sentinel {
            value - self.sentinel
        } else {
            responses[find_owner(dist, cluster)][value as usize]
        }
    }

    /// Request index of an edge-referenced cluster; only valid for clusters
    /// seen by [`request`](Self::request).
    pub(crate) fn request_index(&self, cluster: GlobalNodeId) -> usize {
        let value = *self
            .map
            .get(&cluster)
            .expect("cluster missing from dedup index; clustering is inconsistent");
        debug_assert!(
            value < self.sentinel,
            "edge-referenced cluster was never requested"
        );
        value as usize
    }
}

/// Resolution tables for everything this rank sees but does not own.
pub(crate) struct Resolution {
    pub resolver: ClusterResolver,
    /// Per-owner coarse global IDs, aligned with the request lists.
    pub responses: Vec<Vec<u64>>,
    /// Exclusive prefix sums of per-owner request counts: the coarse ghost
    /// index of owner `p`'s request `i` is `c_n + ghost_offsets[p] + i`.
    pub ghost_offsets: Vec<usize>,
    pub c_ghost_n: NodeId,
}

/// Phase E.2/F: collect every off-rank cluster referenced by an edge,
/// exchange request lists, and answer with coarse global IDs.
pub(crate) fn resolve_nonlocal_clusters<C: Communicator>(
    graph: &DistributedGraph<C>,
    tag: CommTag,
    clustering: &[GlobalNodeId],
    migrated_edges: &[ClusterEdge],
    lnode_to_lcnode: &[NodeId],
    c_node_dist: &[u64],
) -> Result<Resolution> {
    let comm = &**graph.communicator();
    let size = graph.size();
    let rank = graph.rank();
    let dist = graph.node_dist();
    let n = graph.n() as usize;

    let resolver = ClusterResolver::new(size, graph.global_n());

    // Every off-rank cluster reachable from a home vertex or a received
    // edge record will be needed when the coarse adjacency is built.
    rayon::join(
        || {
            (0..n).into_par_iter().for_each(|u| {
                if !graph.is_owned_global_node(clustering[u]) {
                    return;
                }
                for (_, v) in graph.neighbors(u as NodeId) {
                    let cluster = clustering[v as usize];
                    if !graph.is_owned_global_node(cluster) {
                        resolver.request(dist, cluster);
                    }
                }
            });
        },
        || {
            migrated_edges.par_iter().for_each(|edge| {
                if !graph.is_owned_global_node(edge.dst) {
                    resolver.request(dist, edge.dst);
                }
            });
        },
    );

    // Flatten the dedup index into per-owner request lists; the stamped
    // slot index fixes each cluster's position.
    let mut requests: Vec<Vec<u64>> = resolver
        .next_index
        .iter()
        .map(|c| vec![0u64; c.load(Ordering::Relaxed) as usize])
        .collect();
    for item in resolver.map.iter() {
        let (&cluster, &index) = item.pair();
        let owner = find_owner(dist, cluster);
        requests[owner][index as usize] = cluster;
    }

    let their_requests = sparse_alltoall(comm, tag, &requests)?;

    let offset = graph.offset_n();
    let my_responses: Vec<Vec<u64>> = their_requests
        .par_iter()
        .map(|reqs| {
            reqs.iter()
                .map(|&cluster| {
                    debug_assert!(graph.is_owned_global_node(cluster));
                    lnode_to_lcnode[(cluster - offset) as usize] as u64 + c_node_dist[rank]
                })
                .collect()
        })
        .collect();

    let responses = sparse_alltoall(comm, tag.offset(2), &my_responses)?;

    let request_counts: Vec<usize> = requests.iter().map(Vec::len).collect();
    let ghost_offsets = exclusive_prefix_sum(&request_counts);
    let c_ghost_n = ghost_offsets[size] as NodeId;

    Ok(Resolution {
        resolver,
        responses,
        ghost_offsets,
        c_ghost_n,
    })
}

impl Resolution {
    /// Phase F: materialize the coarse ghost directory from the response
    /// tables.
    pub(crate) fn build_ghost_directory(
        &self,
        c_n: NodeId,
    ) -> (Vec<Rank>, Vec<GlobalNodeId>, hashbrown::HashMap<GlobalNodeId, NodeId>) {
        let c_ghost_n = self.c_ghost_n as usize;
        let mut ghost_owner = vec![0; c_ghost_n];
        let mut ghost_to_global = vec![0; c_ghost_n];
        let mut global_to_ghost = hashbrown::HashMap::with_capacity(c_ghost_n);

        for (pe, block) in self.responses.iter().enumerate() {
            for (i, &coarse) in block.iter().enumerate() {
                let k = self.ghost_offsets[pe] + i;
                ghost_owner[k] = pe;
                ghost_to_global[k] = coarse;
                global_to_ghost.insert(coarse, c_n + k as NodeId);
            }
        }

        (ghost_owner, ghost_to_global, global_to_ghost)
    }

    /// Coarse local ID (owned or ghost) of a cluster, for the adjacency
    /// pass.
    #[inline]
    pub(crate) fn coarse_local<C: Communicator>(
        &self,
        graph: &DistributedGraph<C>,
        lnode_to_lcnode: &[NodeId],
        c_n: NodeId,
        cluster: GlobalNodeId,
    ) -> NodeId {
        if graph.is_owned_global_node(cluster) {
            lnode_to_lcnode[(cluster - graph.offset_n()) as usize]
        } else {
            let owner = graph.find_owner_of_global_node(cluster);
            let index = self.resolver.request_index(cluster);
            c_n + (self.ghost_offsets[owner] + index) as NodeId
        }
    }
}

/// Phase E.1: answer each received node record with the coarse global ID of
/// its cluster, reusing the node-migration layout in reverse, and fold the
/// responses into the dedup index.
pub(crate) fn echo_migrated_mappings<C: Communicator>(
    graph: &DistributedGraph<C>,
    tag: CommTag,
    migrated_nodes: &[ClusterNode],
    node_sendcounts: &[usize],
    node_recvcounts: &[usize],
    lnode_to_lcnode: &[NodeId],
    c_node_dist: &[u64],
    resolver: &ClusterResolver,
) -> Result<()> {
    let comm = &**graph.communicator();
    let rank = graph.rank();
    let offset = graph.offset_n();

    let echo: Vec<ClusterMapping> = migrated_nodes
        .par_iter()
        .map(|rec| ClusterMapping {
            cluster: rec.cluster,
            coarse: lnode_to_lcnode[(rec.cluster - offset) as usize] as u64 + c_node_dist[rank],
        })
        .collect();

    let responses = crate::comm::collective::alltoallv(
        comm,
        tag,
        &echo,
        node_recvcounts,
        node_sendcounts,
    )?;

    for rsp in &responses {
        resolver.record_echo(rsp.cluster, rsp.coarse);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolver_assigns_request_slots_once() {
        let dist = vec![0u64, 4, 8];
        let resolver = ClusterResolver::new(2, 8);
        resolver.request(&dist, 5);
        resolver.request(&dist, 6);
        resolver.request(&dist, 5);
        assert_eq!(resolver.next_index[1].load(Ordering::Relaxed), 2);
        assert_eq!(resolver.next_index[0].load(Ordering::Relaxed), 0);

        let i5 = resolver.request_index(5);
        let i6 = resolver.request_index(6);
        assert_ne!(i5, i6);
        assert!(i5 < 2 && i6 < 2);
    }

    #[test]
    fn echo_does_not_clobber_request_slots() {
        let dist = vec![0u64, 4, 8];
        let resolver = ClusterResolver::new(2, 8);
        resolver.request(&dist, 5);
        resolver.record_echo(5, 3);
        resolver.record_echo(7, 2);

        // 5 keeps its request slot; 7 resolves through the echo.
        let responses = vec![vec![], vec![30u64]];
        assert_eq!(resolver.coarse_global(&dist, &responses, 5), 30);
        assert_eq!(resolver.coarse_global(&dist, &responses, 7), 2);
    }
}
