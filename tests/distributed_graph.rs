//! Multi-rank construction, ID translation, metric caches, and halo
//! exchange.

mod common;

use common::*;
use distpart::error::DistPartError;
use distpart::graph::halo;
use distpart::comm::{CommTag, Communicator};
use distpart::metrics;

#[test]
fn builder_wires_up_ghosts_across_ranks() {
    let results = run_world(2, |comm| {
        let graph = bridged_triangles_graph(comm);
        graph.validate().unwrap();

        assert_eq!(graph.n(), 3);
        assert_eq!(graph.ghost_n(), 1);
        assert_eq!(graph.total_n(), 4);
        assert_eq!(graph.global_n(), 6);
        assert_eq!(graph.global_m(), 14);

        let rank = graph.rank();
        let ghost = graph.n();
        let ghost_global = graph.local_to_global_node(ghost);
        assert_eq!(ghost_global, if rank == 0 { 3 } else { 2 });
        assert_eq!(graph.ghost_owner(ghost), 1 - rank);
        assert_eq!(graph.global_to_local_node(ghost_global).unwrap(), ghost);

        // A global ID nobody told this rank about.
        assert!(matches!(
            graph.global_to_local_node(if rank == 0 { 5 } else { 0 }),
            Err(DistPartError::UnknownGlobal { .. })
        ));
    });
    assert_eq!(results.len(), 2);
}

#[test]
fn metric_caches_count_interface_edges_and_vertices() {
    run_world(2, |comm| {
        let graph = bridged_triangles_graph(comm);
        let rank = graph.rank();
        let peer = 1 - rank;

        // One bridge edge of weight 1 crosses to the peer, from exactly
        // one interface vertex.
        assert_eq!(graph.edge_cut_to(peer), 1);
        assert_eq!(graph.comm_vol_to(peer), 1);
        assert_eq!(graph.edge_cut_to(rank), 0);
        assert_eq!(graph.comm_vol_to(rank), 0);
    });
}

#[test]
fn ring_neighbors_are_ghosts_of_adjacent_ranks() {
    run_world(4, |comm| {
        let graph = global_ring_graph(comm);
        graph.validate().unwrap();
        let rank = graph.rank();

        assert_eq!(graph.n(), 1);
        assert_eq!(graph.ghost_n(), 2);
        assert_eq!(graph.degree(0), 2);

        let mut owners: Vec<usize> = (0..2).map(|k| graph.ghost_owner(graph.n() + k)).collect();
        owners.sort_unstable();
        let mut expected = vec![(rank + 3) % 4, (rank + 1) % 4];
        expected.sort_unstable();
        assert_eq!(owners, expected);
    });
}

#[test]
fn halo_fetches_owner_values_for_every_ghost() {
    run_world(4, |comm| {
        let graph = global_ring_graph(comm);
        // Each rank publishes a value derived from its global vertex ID.
        let values: Vec<u64> = (0..graph.n())
            .map(|u| 1000 + graph.local_to_global_node(u))
            .collect();
        let ghost = halo::ghost_values(&graph, CommTag::new(0x70), &values).unwrap();

        assert_eq!(ghost.len(), graph.ghost_n() as usize);
        for (k, &value) in ghost.iter().enumerate() {
            let global = graph.local_to_global_node(graph.n() + k as u32);
            assert_eq!(value, 1000 + global);
        }
    });
}

#[test]
fn edge_cut_and_balance_across_ranks() {
    let results = run_world(2, |comm| {
        let graph = bridged_triangles_graph(comm);
        // One block per rank: the only cut edge is the bridge.
        let partition = vec![graph.rank() as u32; 3];
        let cut = metrics::edge_cut(&graph, &partition).unwrap();
        let weights = metrics::block_weights(&graph, &partition, 2).unwrap();
        let imbalance = metrics::imbalance(&graph, &partition, 2).unwrap();
        (cut, weights, imbalance)
    });
    for (cut, weights, imbalance) in results {
        assert_eq!(cut, 1);
        assert_eq!(weights, vec![3, 3]);
        assert!(imbalance.abs() < 1e-9);
    }
}

#[test]
fn distribution_mismatch_is_rejected() {
    use distpart::graph::GraphBuilder;
    use std::sync::Arc;

    let results = run_world(2, |comm| {
        // The ranks disagree on the ownership split. Both still reach the
        // collective consistency check, which must fail on both.
        let node_dist = if comm.rank() == 0 {
            vec![0u64, 1, 2]
        } else {
            vec![0u64, 2, 3]
        };
        let mut b = GraphBuilder::new(node_dist, None, Arc::new(comm));
        b.add_node(&[]);
        b.build().is_err()
    });
    assert!(results.into_iter().all(|rejected| rejected));
}
