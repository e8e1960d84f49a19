use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

use distpart::cluster::{Clusterer, GreedyClusterer};
use distpart::coarsen::contract_clustering;
use distpart::comm::NoComm;
use distpart::graph::{DistributedGraph, GraphBuilder};

/// Square grid graph on one rank: the usual mesh-like workload for
/// coarsening.
fn grid_graph(side: u64) -> DistributedGraph<NoComm> {
    let n = side * side;
    let mut b = GraphBuilder::new(vec![0, n], None, Arc::new(NoComm));
    for u in 0..n {
        let (x, y) = (u % side, u / side);
        let mut neighbors = Vec::with_capacity(4);
        if x > 0 {
            neighbors.push(u - 1);
        }
        if x + 1 < side {
            neighbors.push(u + 1);
        }
        if y > 0 {
            neighbors.push(u - side);
        }
        if y + 1 < side {
            neighbors.push(u + side);
        }
        b.add_node(&neighbors);
    }
    b.build().unwrap()
}

fn bench_contraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("contract_clustering");

    for &side in &[32u64, 64, 128] {
        let graph = grid_graph(side);
        let clustering = GreedyClusterer.cluster(&graph, 8).unwrap();

        group.bench_with_input(BenchmarkId::new("grid", side), &side, |b, _| {
            b.iter(|| contract_clustering(&graph, &clustering).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_contraction);
criterion_main!(benches);
