//! Static distributed graph: owned CSR plus ghost directory.
//!
//! Each process stores the adjacency of its owned vertex range `[offset_n,
//! offset_n + n)` in CSR form. Edge endpoints are local IDs: values below
//! `n` are owned neighbors, values in `[n, total_n)` index the ghost
//! directory. The graph is immutable after construction except for
//! [`DistributedGraph::set_ghost_node_weight`], which the contraction
//! engine uses during its final ghost-weight synchronization.

use hashbrown::HashMap;
use rayon::prelude::*;
use std::sync::Arc;

use crate::comm::{CommTag, Communicator};
use crate::error::{DistPartError, Result};
use crate::graph::distribution::{self, find_owner};
use crate::types::{
    EdgeId, EdgeWeight, GlobalEdgeId, GlobalNodeId, NodeId, NodeWeight, Rank,
};

/// Construction-time collective tags.
const TAG_NODE_DIST_CHECK: CommTag = CommTag::new(0x10);
const TAG_EDGE_DIST_CHECK: CommTag = CommTag::new(0x12);
const TAG_WEIGHT_SUM: CommTag = CommTag::new(0x14);

#[derive(Debug)]
pub struct DistributedGraph<C: Communicator> {
    comm: Arc<C>,

    node_dist: Vec<GlobalNodeId>,
    edge_dist: Vec<GlobalEdgeId>,

    nodes: Vec<EdgeId>,
    edges: Vec<NodeId>,
    /// Empty means uniform weight 1; otherwise one entry per local vertex
    /// including ghosts.
    node_weights: Vec<NodeWeight>,
    /// Empty means uniform weight 1; otherwise one entry per local edge.
    edge_weights: Vec<EdgeWeight>,

    ghost_owner: Vec<Rank>,
    ghost_to_global: Vec<GlobalNodeId>,
    global_to_ghost: HashMap<GlobalNodeId, NodeId>,

    n: NodeId,
    ghost_n: NodeId,
    m: EdgeId,
    offset_n: GlobalNodeId,
    offset_m: GlobalEdgeId,
    global_n: GlobalNodeId,
    global_m: GlobalEdgeId,

    total_node_weight: NodeWeight,
    global_total_node_weight: NodeWeight,

    /// Sum of weights of local edges whose head is a ghost owned by `p`.
    edge_cut_to_pe: Vec<EdgeWeight>,
    /// Number of distinct owned vertices with at least one neighbor owned
    /// by `p`.
    comm_vol_to_pe: Vec<usize>,
}

impl<C: Communicator> DistributedGraph<C> {
    /// Assemble a distributed graph from its raw parts and compute the
    /// cached totals and inter-process metrics.
    ///
    /// Collective: all ranks of `comm` must call this together. Fails with
    /// [`DistPartError::InconsistentDistribution`] if any rank disagrees on
    /// the distribution vectors.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        node_dist: Vec<GlobalNodeId>,
        edge_dist: Vec<GlobalEdgeId>,
        nodes: Vec<EdgeId>,
        edges: Vec<NodeId>,
        node_weights: Vec<NodeWeight>,
        edge_weights: Vec<EdgeWeight>,
        ghost_owner: Vec<Rank>,
        ghost_to_global: Vec<GlobalNodeId>,
        global_to_ghost: HashMap<GlobalNodeId, NodeId>,
        comm: Arc<C>,
    ) -> Result<Self> {
        distribution::check_consistent(&*comm, TAG_NODE_DIST_CHECK, &node_dist)?;
        distribution::check_consistent(&*comm, TAG_EDGE_DIST_CHECK, &edge_dist)?;

        let rank = comm.rank();
        let n = (nodes.len() - 1) as NodeId;
        let m = edges.len() as EdgeId;
        let ghost_n = ghost_to_global.len() as NodeId;

        let mut graph = Self {
            comm,
            offset_n: node_dist[rank],
            offset_m: edge_dist[rank],
            global_n: *node_dist.last().unwrap(),
            global_m: *edge_dist.last().unwrap(),
            node_dist,
            edge_dist,
            nodes,
            edges,
            node_weights,
            edge_weights,
            ghost_owner,
            ghost_to_global,
            global_to_ghost,
            n,
            ghost_n,
            m,
            total_node_weight: 0,
            global_total_node_weight: 0,
            edge_cut_to_pe: Vec::new(),
            comm_vol_to_pe: Vec::new(),
        };

        graph.init_total_weights()?;
        graph.init_communication_metrics();

        #[cfg(any(debug_assertions, feature = "strict-invariants"))]
        graph.validate().map_err(|e| {
            log::error!("graph construction produced an invalid graph: {e}");
            e
        })?;

        Ok(graph)
    }

    fn init_total_weights(&mut self) -> Result<()> {
        self.total_node_weight = if self.node_weights.is_empty() {
            self.n as NodeWeight
        } else {
            self.node_weights[..self.n as usize].iter().sum()
        };
        self.global_total_node_weight =
            crate::comm::collective::allreduce_sum(&*self.comm, TAG_WEIGHT_SUM, self.total_node_weight)?;
        Ok(())
    }

    /// One pass over all local edges fills both per-rank caches. The
    /// per-thread `last_node` marker ensures each owned vertex counts at
    /// most once per peer for the communication volume.
    fn init_communication_metrics(&mut self) {
        let size = self.comm.size();

        let (cut, vol) = (0..self.n)
            .into_par_iter()
            .fold(
                || (vec![0 as EdgeWeight; size], vec![0usize; size], vec![NodeId::MAX; size]),
                |(mut cut, mut vol, mut last_node), u| {
                    for (e, v) in self.neighbors(u) {
                        if v >= self.n {
                            let p = self.ghost_owner[(v - self.n) as usize];
                            cut[p] += self.edge_weight(e);
                            if last_node[p] != u {
                                last_node[p] = u;
                                vol[p] += 1;
                            }
                        }
                    }
                    (cut, vol, last_node)
                },
            )
            .map(|(cut, vol, _)| (cut, vol))
            .reduce(
                || (vec![0 as EdgeWeight; size], vec![0usize; size]),
                |(mut ca, mut va), (cb, vb)| {
                    for p in 0..size {
                        ca[p] += cb[p];
                        va[p] += vb[p];
                    }
                    (ca, va)
                },
            );

        self.edge_cut_to_pe = cut;
        self.comm_vol_to_pe = vol;
    }

    //
    // Sizes and offsets
    //

    #[inline]
    pub fn n(&self) -> NodeId {
        self.n
    }

    #[inline]
    pub fn n_of(&self, pe: Rank) -> NodeId {
        (self.node_dist[pe + 1] - self.node_dist[pe]) as NodeId
    }

    #[inline]
    pub fn ghost_n(&self) -> NodeId {
        self.ghost_n
    }

    #[inline]
    pub fn total_n(&self) -> NodeId {
        self.n + self.ghost_n
    }

    #[inline]
    pub fn m(&self) -> EdgeId {
        self.m
    }

    #[inline]
    pub fn global_n(&self) -> GlobalNodeId {
        self.global_n
    }

    #[inline]
    pub fn global_m(&self) -> GlobalEdgeId {
        self.global_m
    }

    #[inline]
    pub fn offset_n(&self) -> GlobalNodeId {
        self.offset_n
    }

    #[inline]
    pub fn offset_n_of(&self, pe: Rank) -> GlobalNodeId {
        self.node_dist[pe]
    }

    #[inline]
    pub fn offset_m(&self) -> GlobalEdgeId {
        self.offset_m
    }

    #[inline]
    pub fn node_dist(&self) -> &[GlobalNodeId] {
        &self.node_dist
    }

    #[inline]
    pub fn edge_dist(&self) -> &[GlobalEdgeId] {
        &self.edge_dist
    }

    //
    // Topology
    //

    #[inline]
    pub fn degree(&self, u: NodeId) -> EdgeId {
        self.nodes[u as usize + 1] - self.nodes[u as usize]
    }

    /// Iterate `(edge, head)` pairs of the owned vertex `u`.
    #[inline]
    pub fn neighbors(&self, u: NodeId) -> impl Iterator<Item = (EdgeId, NodeId)> + '_ {
        (self.nodes[u as usize]..self.nodes[u as usize + 1]).map(|e| (e, self.edges[e as usize]))
    }

    #[inline]
    pub fn raw_nodes(&self) -> &[EdgeId] {
        &self.nodes
    }

    #[inline]
    pub fn raw_edges(&self) -> &[NodeId] {
        &self.edges
    }

    //
    // Weights
    //

    #[inline]
    pub fn is_node_weighted(&self) -> bool {
        !self.node_weights.is_empty()
    }

    #[inline]
    pub fn is_edge_weighted(&self) -> bool {
        !self.edge_weights.is_empty()
    }

    /// Weight of a local vertex, owned or ghost.
    #[inline]
    pub fn node_weight(&self, u: NodeId) -> NodeWeight {
        if self.node_weights.is_empty() {
            1
        } else {
            self.node_weights[u as usize]
        }
    }

    #[inline]
    pub fn edge_weight(&self, e: EdgeId) -> EdgeWeight {
        if self.edge_weights.is_empty() {
            1
        } else {
            self.edge_weights[e as usize]
        }
    }

    /// Sum of owned vertex weights on this process.
    #[inline]
    pub fn total_node_weight(&self) -> NodeWeight {
        self.total_node_weight
    }

    #[inline]
    pub fn global_total_node_weight(&self) -> NodeWeight {
        self.global_total_node_weight
    }

    /// Overwrite the weight of the ghost vertex `u`. Only the contraction
    /// engine's ghost-weight synchronization may call this, before the
    /// graph is handed to refinement.
    pub fn set_ghost_node_weight(&mut self, u: NodeId, weight: NodeWeight) {
        debug_assert!(self.is_ghost_node(u));
        if self.node_weights.is_empty() {
            self.node_weights = vec![1; self.total_n() as usize];
        }
        self.node_weights[u as usize] = weight;
    }

    //
    // Ownership and ID translation
    //

    #[inline]
    pub fn is_owned_global_node(&self, global: GlobalNodeId) -> bool {
        self.offset_n <= global && global < self.offset_n + self.n as GlobalNodeId
    }

    #[inline]
    pub fn is_owned_node(&self, u: NodeId) -> bool {
        u < self.n
    }

    #[inline]
    pub fn is_ghost_node(&self, u: NodeId) -> bool {
        self.n <= u && u < self.total_n()
    }

    /// Rank owning the ghost vertex `u`.
    #[inline]
    pub fn ghost_owner(&self, u: NodeId) -> Rank {
        debug_assert!(self.is_ghost_node(u));
        self.ghost_owner[(u - self.n) as usize]
    }

    #[inline]
    pub fn find_owner_of_global_node(&self, global: GlobalNodeId) -> Rank {
        find_owner(&self.node_dist, global)
    }

    /// Translate a global vertex ID to this process's local ID.
    pub fn global_to_local_node(&self, global: GlobalNodeId) -> Result<NodeId> {
        if self.is_owned_global_node(global) {
            Ok((global - self.offset_n) as NodeId)
        } else {
            self.global_to_ghost
                .get(&global)
                .copied()
                .ok_or(DistPartError::UnknownGlobal { global })
        }
    }

    /// Translate a local vertex ID (owned or ghost) to its global ID.
    #[inline]
    pub fn local_to_global_node(&self, u: NodeId) -> GlobalNodeId {
        if u < self.n {
            self.offset_n + u as GlobalNodeId
        } else {
            self.ghost_to_global[(u - self.n) as usize]
        }
    }

    #[inline]
    pub fn ghost_to_global(&self) -> &[GlobalNodeId] {
        &self.ghost_to_global
    }

    #[inline]
    pub fn contains_global_node(&self, global: GlobalNodeId) -> bool {
        self.is_owned_global_node(global) || self.global_to_ghost.contains_key(&global)
    }

    //
    // Cached inter-process metrics
    //

    /// Sum of weights of local edges to ghosts owned by `pe`.
    #[inline]
    pub fn edge_cut_to(&self, pe: Rank) -> EdgeWeight {
        self.edge_cut_to_pe[pe]
    }

    /// Number of distinct owned vertices adjacent to vertices owned by `pe`.
    #[inline]
    pub fn comm_vol_to(&self, pe: Rank) -> usize {
        self.comm_vol_to_pe[pe]
    }

    //
    // Communicator
    //

    #[inline]
    pub fn communicator(&self) -> &Arc<C> {
        &self.comm
    }

    #[inline]
    pub fn rank(&self) -> Rank {
        self.comm.rank()
    }

    #[inline]
    pub fn size(&self) -> Rank {
        self.comm.size()
    }

    //
    // Validation
    //

    /// Check the structural invariants of this graph and return the first
    /// violation. Used by tests and by checked builds at construction.
    pub fn validate(&self) -> Result<()> {
        let fail = |what: String| Err(DistPartError::InvariantViolated(what));

        if self.nodes.len() != self.n as usize + 1 {
            return fail("nodes array must have n + 1 entries".into());
        }
        if self.nodes[0] != 0 || *self.nodes.last().unwrap() != self.m {
            return fail("CSR offsets must start at 0 and end at m".into());
        }
        if self.nodes.windows(2).any(|w| w[0] > w[1]) {
            return fail("CSR offsets must be weakly increasing".into());
        }
        if self.ghost_owner.len() != self.ghost_n as usize
            || self.global_to_ghost.len() != self.ghost_n as usize
        {
            return fail("ghost directory arrays must all have ghost_n entries".into());
        }

        let rank = self.rank();
        for (k, &g) in self.ghost_to_global.iter().enumerate() {
            let local = self.n + k as NodeId;
            if self.find_owner_of_global_node(g) == rank {
                return fail(format!("ghost {local} maps to owned global {g}"));
            }
            if self.ghost_owner[k] != self.find_owner_of_global_node(g) {
                return fail(format!("ghost {local} has wrong owner cache"));
            }
            if self.global_to_ghost.get(&g) != Some(&local) {
                return fail(format!("global_to_ghost is not inverse at ghost {local}"));
            }
        }

        let mut referenced = vec![false; self.ghost_n as usize];
        for &v in &self.edges {
            if v >= self.total_n() {
                return fail(format!("edge head {v} out of range"));
            }
            if v >= self.n {
                referenced[(v - self.n) as usize] = true;
            }
        }
        if let Some(k) = referenced.iter().position(|&r| !r) {
            return fail(format!("ghost {} is referenced by no local edge", self.n + k as NodeId));
        }

        if !self.node_weights.is_empty() && self.node_weights.len() != self.total_n() as usize {
            return fail("node weights must cover owned and ghost vertices".into());
        }
        if !self.edge_weights.is_empty() && self.edge_weights.len() != self.m as usize {
            return fail("edge weights must have one entry per edge".into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::NoComm;

    fn path_graph() -> DistributedGraph<NoComm> {
        // 0 - 1 - 2 on a single rank.
        DistributedGraph::new(
            vec![0, 3],
            vec![0, 4],
            vec![0, 1, 3, 4],
            vec![1, 0, 2, 1],
            vec![],
            vec![],
            vec![],
            vec![],
            HashMap::new(),
            Arc::new(NoComm),
        )
        .unwrap()
    }

    #[test]
    fn sizes_and_degrees() {
        let g = path_graph();
        assert_eq!(g.n(), 3);
        assert_eq!(g.m(), 4);
        assert_eq!(g.total_n(), 3);
        assert_eq!(g.global_n(), 3);
        assert_eq!(g.degree(0), 1);
        assert_eq!(g.degree(1), 2);
        assert_eq!(g.total_node_weight(), 3);
        assert_eq!(g.global_total_node_weight(), 3);
    }

    #[test]
    fn id_translation_single_rank() {
        let g = path_graph();
        assert!(g.is_owned_global_node(2));
        assert_eq!(g.global_to_local_node(2).unwrap(), 2);
        assert_eq!(g.local_to_global_node(1), 1);
        assert!(matches!(
            g.global_to_local_node(17),
            Err(DistPartError::UnknownGlobal { global: 17 })
        ));
    }

    #[test]
    fn unweighted_accessors_default_to_one() {
        let g = path_graph();
        assert!(!g.is_node_weighted());
        assert_eq!(g.node_weight(2), 1);
        assert_eq!(g.edge_weight(3), 1);
    }

    #[test]
    fn no_cut_without_ghosts() {
        let g = path_graph();
        assert_eq!(g.edge_cut_to(0), 0);
        assert_eq!(g.comm_vol_to(0), 0);
    }

    #[test]
    fn valid_graph_passes_validation() {
        path_graph().validate().unwrap();
    }
}
