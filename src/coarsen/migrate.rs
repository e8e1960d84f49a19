//! Migration of nonlocal records to the ranks that own their clusters.

use rayon::prelude::*;

use crate::coarsen::records::{ClusterEdge, ClusterNode};
use crate::comm::collective::{alltoall, alltoallv};
use crate::comm::{CommTag, Communicator};
use crate::error::Result;
use crate::graph::distribution::find_owner;
use crate::graph::DistributedGraph;

pub(crate) struct MigrationResult {
    /// Node records now owned by this rank, in arrival (rank) order.
    pub nodes: Vec<ClusterNode>,
    /// Edge records now owned by this rank, in arrival (rank) order.
    pub edges: Vec<ClusterEdge>,
    /// Send/receive layout of the node exchange; reused in reverse by the
    /// mapping echo.
    pub node_sendcounts: Vec<usize>,
    pub node_recvcounts: Vec<usize>,
}

/// Per-destination send counts for a buffer sorted by key. Each chunk walks
/// its records with a running destination rank instead of a binary search
/// per record.
fn destination_counts<T, F>(sorted: &[T], dist: &[u64], size: usize, key: F) -> Vec<usize>
where
    T: Sync,
    F: Fn(&T) -> u64 + Sync + Send,
{
    sorted
        .par_chunks(1 << 12)
        .map(|chunk| {
            let mut counts = vec![0usize; size];
            let mut pe = find_owner(dist, key(&chunk[0]));
            for item in chunk {
                let k = key(item);
                while k >= dist[pe + 1] {
                    pe += 1;
                }
                counts[pe] += 1;
            }
            counts
        })
        .reduce(
            || vec![0usize; size],
            |mut a, b| {
                for (x, y) in a.iter_mut().zip(b) {
                    *x += y;
                }
                a
            },
        )
}

fn exchange_counts<C: Communicator>(
    comm: &C,
    tag: CommTag,
    sendcounts: &[usize],
) -> Result<Vec<usize>> {
    let send: Vec<u64> = sendcounts.iter().map(|&c| c as u64).collect();
    Ok(alltoall(comm, tag, &send)?
        .into_iter()
        .map(|c| c as usize)
        .collect())
}

/// Phase C: ship deduplicated nonlocal records to the owners of their
/// source clusters. Both buffers must be sorted by source cluster, which
/// the deduplication pass guarantees.
pub(crate) fn exchange_nonlocal<C: Communicator>(
    graph: &DistributedGraph<C>,
    tag: CommTag,
    nonlocal_nodes: Vec<ClusterNode>,
    nonlocal_edges: Vec<ClusterEdge>,
) -> Result<MigrationResult> {
    let comm = &**graph.communicator();
    let size = graph.size();
    let dist = graph.node_dist();

    let edge_sendcounts = destination_counts(&nonlocal_edges, dist, size, |e| e.src);
    let edge_recvcounts = exchange_counts(comm, tag, &edge_sendcounts)?;
    let edges = alltoallv(
        comm,
        tag.offset(1),
        &nonlocal_edges,
        &edge_sendcounts,
        &edge_recvcounts,
    )?;

    let node_sendcounts = destination_counts(&nonlocal_nodes, dist, size, |rec| rec.cluster);
    let node_recvcounts = exchange_counts(comm, tag.offset(2), &node_sendcounts)?;
    let nodes = alltoallv(
        comm,
        tag.offset(3),
        &nonlocal_nodes,
        &node_sendcounts,
        &node_recvcounts,
    )?;

    Ok(MigrationResult {
        nodes,
        edges,
        node_sendcounts,
        node_recvcounts,
    })
}
