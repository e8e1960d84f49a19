//! Shared helpers for multi-rank integration tests: a thread-per-rank world
//! runner and the scenario graph factories.

use std::sync::Arc;

use distpart::comm::{Communicator, ThreadComm};
use distpart::graph::{DistributedGraph, GraphBuilder};
use distpart::types::{GlobalNodeId, NodeId};

/// Run `f` once per rank of a fresh in-process world and collect the
/// results in rank order.
pub fn run_world<R, F>(size: usize, f: F) -> Vec<R>
where
    R: Send + 'static,
    F: Fn(ThreadComm) -> R + Send + Sync + Clone + 'static,
{
    let _ = env_logger::builder().is_test(true).try_init();
    let handles: Vec<_> = ThreadComm::world(size)
        .into_iter()
        .map(|comm| {
            let f = f.clone();
            std::thread::spawn(move || f(comm))
        })
        .collect();
    handles
        .into_iter()
        .map(|h| h.join().expect("rank thread panicked"))
        .collect()
}

/// A graph with no vertices anywhere.
pub fn empty_graph(comm: ThreadComm) -> DistributedGraph<ThreadComm> {
    let size = comm.size() as u64;
    let node_dist: Vec<u64> = vec![0; size as usize + 1];
    GraphBuilder::new(node_dist, None, Arc::new(comm))
        .build()
        .unwrap()
}

/// Each rank owns two vertices joined by one local edge of weight 1.
pub fn isolated_edges_graph(comm: ThreadComm) -> DistributedGraph<ThreadComm> {
    let size = comm.size() as u64;
    let rank = comm.rank() as u64;
    let node_dist: Vec<u64> = (0..=size).map(|r| 2 * r).collect();
    let offset = 2 * rank;

    let mut b = GraphBuilder::new(node_dist, None, Arc::new(comm));
    b.add_node(&[offset + 1]);
    b.add_node(&[offset]);
    b.build().unwrap()
}

/// A complete graph on `k` vertices per rank, with no cross-rank edges.
pub fn local_complete_graph(comm: ThreadComm, k: u64) -> DistributedGraph<ThreadComm> {
    let size = comm.size() as u64;
    let rank = comm.rank() as u64;
    let node_dist: Vec<u64> = (0..=size).map(|r| k * r).collect();
    let offset = k * rank;

    let mut b = GraphBuilder::new(node_dist, None, Arc::new(comm));
    for u in 0..k {
        let neighbors: Vec<GlobalNodeId> =
            (0..k).filter(|&v| v != u).map(|v| offset + v).collect();
        b.add_node(&neighbors);
    }
    b.build().unwrap()
}

/// A complete bipartite graph `K_{k,k}` per rank: vertices `0..k` form one
/// side, `k..2k` the other.
pub fn local_complete_bipartite_graph(comm: ThreadComm, k: u64) -> DistributedGraph<ThreadComm> {
    let size = comm.size() as u64;
    let rank = comm.rank() as u64;
    let node_dist: Vec<u64> = (0..=size).map(|r| 2 * k * r).collect();
    let offset = 2 * k * rank;

    let mut b = GraphBuilder::new(node_dist, None, Arc::new(comm));
    for _u in 0..k {
        let neighbors: Vec<GlobalNodeId> = (k..2 * k).map(|v| offset + v).collect();
        b.add_node(&neighbors);
    }
    for _u in k..2 * k {
        let neighbors: Vec<GlobalNodeId> = (0..k).map(|v| offset + v).collect();
        b.add_node(&neighbors);
    }
    b.build().unwrap()
}

/// A global ring with one vertex per rank. Needs at least three ranks to
/// stay simple (two would produce a double edge).
pub fn global_ring_graph(comm: ThreadComm) -> DistributedGraph<ThreadComm> {
    let size = comm.size() as u64;
    let rank = comm.rank() as u64;
    assert!(size >= 3);
    let node_dist: Vec<u64> = (0..=size).collect();

    let mut b = GraphBuilder::new(node_dist, None, Arc::new(comm));
    b.add_node(&[(rank + size - 1) % size, (rank + 1) % size]);
    b.build().unwrap()
}

/// Two local triangles (one per rank) bridged by a single cross-rank edge
/// between global vertices 2 and 3. Requires exactly two ranks.
pub fn bridged_triangles_graph(comm: ThreadComm) -> DistributedGraph<ThreadComm> {
    assert_eq!(comm.size(), 2);
    let rank = comm.rank();
    let node_dist = vec![0u64, 3, 6];

    let mut b = GraphBuilder::new(node_dist, None, Arc::new(comm));
    if rank == 0 {
        b.add_node(&[1, 2]);
        b.add_node(&[0, 2]);
        b.add_node(&[0, 1, 3]);
    } else {
        b.add_node(&[4, 5, 2]);
        b.add_node(&[3, 5]);
        b.add_node(&[3, 4]);
    }
    b.build().unwrap()
}

/// Every local edge as a globally addressed `(tail, head, weight)` triple,
/// sorted. Rows of two graphs compare equal under this view regardless of
/// ghost numbering or row order.
pub fn edge_snapshot(graph: &DistributedGraph<ThreadComm>) -> Vec<(u64, u64, i64)> {
    let mut out = Vec::new();
    for u in 0..graph.n() {
        for (e, v) in graph.neighbors(u) {
            out.push((
                graph.local_to_global_node(u),
                graph.local_to_global_node(v),
                graph.edge_weight(e),
            ));
        }
    }
    out.sort_unstable();
    out
}

/// Owned vertex weights by global ID.
pub fn weight_snapshot(graph: &DistributedGraph<ThreadComm>) -> Vec<(u64, i64)> {
    (0..graph.n())
        .map(|u| (graph.local_to_global_node(u), graph.node_weight(u)))
        .collect()
}

/// Per-row neighbor sets must be duplicate-free.
pub fn assert_rows_deduplicated(graph: &DistributedGraph<ThreadComm>) {
    for u in 0..graph.n() {
        let mut heads: Vec<NodeId> = graph.neighbors(u).map(|(_, v)| v).collect();
        let len = heads.len();
        heads.sort_unstable();
        heads.dedup();
        assert_eq!(heads.len(), len, "row of vertex {u} contains duplicates");
    }
}
