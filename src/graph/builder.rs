//! Construction of a [`DistributedGraph`] from per-vertex adjacency lists
//! that reference global neighbor IDs.
//!
//! The builder collects the owned vertex range row by row, then translates
//! global endpoints to local IDs through a [`GhostNodeMapper`] and runs the
//! construction-time consistency checks. If vertex weights were supplied,
//! ghost weights are fetched from their owners with a halo exchange before
//! the graph is returned.

use rayon::prelude::*;
use std::sync::Arc;

use crate::comm::{CommTag, Communicator};
use crate::error::{DistPartError, Result};
use crate::graph::distribution;
use crate::graph::ghost::GhostNodeMapper;
use crate::graph::halo;
use crate::graph::DistributedGraph;
use crate::types::{EdgeId, EdgeWeight, GlobalNodeId, NodeId, NodeWeight};

const TAG_EDGE_DIST: CommTag = CommTag::new(0x20);
const TAG_WEIGHT_FLAG: CommTag = CommTag::new(0x21);
const TAG_GHOST_WEIGHTS: CommTag = CommTag::new(0x22);

pub struct GraphBuilder<C: Communicator> {
    comm: Arc<C>,
    node_dist: Vec<u64>,
    edge_dist: Option<Vec<u64>>,
    nodes: Vec<EdgeId>,
    edges_global: Vec<GlobalNodeId>,
    node_weights: Vec<NodeWeight>,
    edge_weights: Vec<EdgeWeight>,
    node_weighted: bool,
    edge_weighted: bool,
}

impl<C: Communicator> GraphBuilder<C> {
    /// Start a builder for this rank's range of `node_dist`. Pass the edge
    /// distribution if the caller knows it; otherwise it is derived from
    /// the local edge counts on `build`.
    pub fn new(node_dist: Vec<u64>, edge_dist: Option<Vec<u64>>, comm: Arc<C>) -> Self {
        Self {
            comm,
            node_dist,
            edge_dist,
            nodes: vec![0],
            edges_global: Vec::new(),
            node_weights: Vec::new(),
            edge_weights: Vec::new(),
            node_weighted: false,
            edge_weighted: false,
        }
    }

    /// Append the next owned vertex with unit weights.
    pub fn add_node(&mut self, neighbors: &[GlobalNodeId]) -> &mut Self {
        self.node_weights.push(1);
        self.edges_global.extend_from_slice(neighbors);
        self.edge_weights.extend(std::iter::repeat(1).take(neighbors.len()));
        self.nodes.push(self.edges_global.len() as EdgeId);
        self
    }

    /// Append the next owned vertex with explicit weights.
    pub fn add_weighted_node(
        &mut self,
        weight: NodeWeight,
        neighbors: &[(GlobalNodeId, EdgeWeight)],
    ) -> &mut Self {
        self.node_weighted = true;
        self.edge_weighted = true;
        self.node_weights.push(weight);
        for &(v, w) in neighbors {
            self.edges_global.push(v);
            self.edge_weights.push(w);
        }
        self.nodes.push(self.edges_global.len() as EdgeId);
        self
    }

    /// Translate, check, and assemble. Collective across all ranks.
    pub fn build(self) -> Result<DistributedGraph<C>> {
        let Self {
            comm,
            node_dist,
            edge_dist,
            nodes,
            edges_global,
            mut node_weights,
            edge_weights,
            node_weighted,
            edge_weighted,
        } = self;

        let rank = comm.rank();
        let n = (nodes.len() - 1) as NodeId;
        let expected = node_dist
            .get(rank + 1)
            .zip(node_dist.get(rank))
            .map(|(hi, lo)| hi - lo);
        if expected != Some(n as u64) {
            return Err(DistPartError::InvariantViolated(format!(
                "builder got {n} vertices but the distribution assigns {expected:?} to rank {rank}"
            )));
        }
        let offset_n = node_dist[rank];

        // Global-to-local endpoint translation; the mapper hands out ghost
        // indices concurrently.
        let mapper = GhostNodeMapper::new(&node_dist, n);
        let edges: Vec<NodeId> = edges_global
            .par_iter()
            .map(|&g| {
                if offset_n <= g && g < offset_n + n as u64 {
                    (g - offset_n) as NodeId
                } else {
                    mapper.lookup(g)
                }
            })
            .collect();
        let directory = mapper.finalize();

        let edge_dist = match edge_dist {
            Some(dist) => dist,
            None => distribution::from_local_count(&*comm, TAG_EDGE_DIST, edges.len() as u64)?,
        };

        // Ghost weights start at 1 and are fetched from their owners below.
        if node_weighted {
            node_weights.resize(n as usize + directory.ghost_to_global.len(), 1);
        } else {
            node_weights.clear();
        }

        let mut graph = DistributedGraph::new(
            node_dist,
            edge_dist,
            nodes,
            edges,
            node_weights,
            if edge_weighted { edge_weights } else { Vec::new() },
            directory.ghost_owner,
            directory.ghost_to_global,
            directory.global_to_ghost,
            comm,
        )?;

        // The sync is a collective, so the decision to run it must be
        // global even if only some ranks supplied weights.
        let weighted_anywhere = !crate::comm::collective::allreduce_and(
            &**graph.communicator(),
            TAG_WEIGHT_FLAG,
            !node_weighted,
        )?;
        if weighted_anywhere {
            halo::sync_ghost_node_weights(&mut graph, TAG_GHOST_WEIGHTS)?;
        }

        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::NoComm;

    #[test]
    fn builds_triangle() {
        let mut b = GraphBuilder::new(vec![0, 3], None, Arc::new(NoComm));
        b.add_node(&[1, 2]);
        b.add_node(&[0, 2]);
        b.add_node(&[0, 1]);
        let g = b.build().unwrap();

        assert_eq!(g.n(), 3);
        assert_eq!(g.m(), 6);
        assert_eq!(g.ghost_n(), 0);
        assert_eq!(g.global_m(), 6);
        g.validate().unwrap();
    }

    #[test]
    fn weighted_rows() {
        let mut b = GraphBuilder::new(vec![0, 2], None, Arc::new(NoComm));
        b.add_weighted_node(5, &[(1, 3)]);
        b.add_weighted_node(7, &[(0, 3)]);
        let g = b.build().unwrap();

        assert!(g.is_node_weighted());
        assert_eq!(g.node_weight(0), 5);
        assert_eq!(g.node_weight(1), 7);
        assert_eq!(g.edge_weight(0), 3);
        assert_eq!(g.total_node_weight(), 12);
    }

    #[test]
    fn rejects_wrong_row_count() {
        let mut b = GraphBuilder::new(vec![0, 2], None, Arc::new(NoComm));
        b.add_node(&[]);
        assert!(b.build().is_err());
    }
}
