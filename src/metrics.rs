//! Global quality metrics of a block assignment.
//!
//! These are the quantities a driver reports after refinement: the total
//! weight of edges crossing blocks, the block weights, and the imbalance
//! against the balanced block weight. All of them are collectives.

use rayon::prelude::*;

use crate::comm::collective::{allgather_slice, allreduce_sum};
use crate::comm::{CommTag, Communicator};
use crate::error::Result;
use crate::graph::{halo, DistributedGraph};
use crate::types::{BlockId, NodeWeight};

const TAG_PARTITION_HALO: CommTag = CommTag::new(0x50);
const TAG_CUT: CommTag = CommTag::new(0x52);
const TAG_BLOCK_WEIGHTS: CommTag = CommTag::new(0x54);

/// Extend a block assignment over the owned vertices to the ghosts.
pub fn extend_partition_to_ghosts<C: Communicator>(
    graph: &DistributedGraph<C>,
    partition: &[BlockId],
) -> Result<Vec<BlockId>> {
    let ghost = halo::ghost_values(graph, TAG_PARTITION_HALO, partition)?;
    let mut full = Vec::with_capacity(graph.total_n() as usize);
    full.extend_from_slice(partition);
    full.extend(ghost);
    Ok(full)
}

/// Total weight of edges whose endpoints lie in different blocks.
///
/// `partition` covers the owned vertices; ghost blocks are fetched from
/// the owners. Each undirected edge is stored twice (or seen once from
/// each side of a rank boundary), so the summed local cuts halve exactly.
pub fn edge_cut<C: Communicator>(
    graph: &DistributedGraph<C>,
    partition: &[BlockId],
) -> Result<i64> {
    let full = extend_partition_to_ghosts(graph, partition)?;

    let local: i64 = (0..graph.n())
        .into_par_iter()
        .map(|u| {
            graph
                .neighbors(u)
                .filter(|&(_, v)| full[u as usize] != full[v as usize])
                .map(|(e, _)| graph.edge_weight(e))
                .sum::<i64>()
        })
        .sum();

    let doubled = allreduce_sum(&**graph.communicator(), TAG_CUT, local)?;
    debug_assert_eq!(doubled % 2, 0, "asymmetric input graph");
    Ok(doubled / 2)
}

/// Global weight of every block.
pub fn block_weights<C: Communicator>(
    graph: &DistributedGraph<C>,
    partition: &[BlockId],
    k: usize,
) -> Result<Vec<NodeWeight>> {
    let mut local = vec![0 as NodeWeight; k];
    for u in 0..graph.n() {
        local[partition[u as usize] as usize] += graph.node_weight(u);
    }

    let per_rank = allgather_slice(&**graph.communicator(), TAG_BLOCK_WEIGHTS, &local)?;
    let mut out = vec![0 as NodeWeight; k];
    for contribution in per_rank {
        for (acc, w) in out.iter_mut().zip(contribution) {
            *acc += w;
        }
    }
    Ok(out)
}

/// Maximum block weight relative to the perfectly balanced weight, minus
/// one. Zero means perfectly balanced; `eps` means the heaviest block
/// exceeds the average by a factor of `1 + eps`.
pub fn imbalance<C: Communicator>(
    graph: &DistributedGraph<C>,
    partition: &[BlockId],
    k: usize,
) -> Result<f64> {
    let weights = block_weights(graph, partition, k)?;
    let total = graph.global_total_node_weight();
    if total == 0 {
        return Ok(0.0);
    }
    let balanced = (total as f64 / k as f64).ceil();
    let max = weights.iter().copied().max().unwrap_or(0);
    Ok(max as f64 / balanced - 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::NoComm;
    use crate::graph::GraphBuilder;
    use std::sync::Arc;

    fn square() -> DistributedGraph<NoComm> {
        // 4-cycle: 0-1-2-3-0.
        let mut b = GraphBuilder::new(vec![0, 4], None, Arc::new(NoComm));
        b.add_node(&[1, 3]);
        b.add_node(&[0, 2]);
        b.add_node(&[1, 3]);
        b.add_node(&[2, 0]);
        b.build().unwrap()
    }

    #[test]
    fn cut_of_uniform_partition_is_zero() {
        let g = square();
        assert_eq!(edge_cut(&g, &[0, 0, 0, 0]).unwrap(), 0);
    }

    #[test]
    fn cut_counts_each_edge_once() {
        let g = square();
        assert_eq!(edge_cut(&g, &[0, 0, 1, 1]).unwrap(), 2);
        assert_eq!(edge_cut(&g, &[0, 1, 0, 1]).unwrap(), 4);
    }

    #[test]
    fn balanced_bisection_has_zero_imbalance() {
        let g = square();
        assert_eq!(block_weights(&g, &[0, 0, 1, 1], 2).unwrap(), vec![2, 2]);
        assert!(imbalance(&g, &[0, 0, 1, 1], 2).unwrap().abs() < 1e-9);
    }

    #[test]
    fn skewed_partition_reports_imbalance() {
        let g = square();
        let eps = imbalance(&g, &[0, 0, 0, 1], 2).unwrap();
        assert!((eps - 0.5).abs() < 1e-9);
    }
}
