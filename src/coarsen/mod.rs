//! Distributed cluster contraction.
//!
//! Given a clustering that maps each owned fine vertex to a global cluster
//! ID (possibly owned by another rank), build the coarse distributed graph
//! and the fine→coarse vertex mapping. The engine runs in phases; every
//! phase is data-parallel within the rank and phase boundaries are
//! collectives, so all ranks must call [`contract_clustering`] together.
//!
//! Phase walk-through, per rank:
//! 1. Partition owned vertices into *home* (cluster owned here) and *away*
//!    (cluster owned elsewhere); away vertices emit node and edge records
//!    keyed by cluster IDs.
//! 2. Deduplicate the records locally to cut the exchange volume.
//! 3. Migrate them to the owners of their clusters.
//! 4. Number the non-empty owned clusters densely and allgather the counts
//!    into the coarse node distribution.
//! 5. Resolve every off-rank cluster to its coarse global ID: an echo along
//!    the reversed node migration, plus a request/response round for
//!    clusters referenced by edges.
//! 6. Freeze the responses into the coarse ghost directory.
//! 7. Bucket contributors per coarse vertex and aggregate the coarse
//!    adjacency through rating maps.
//! 8. Synchronize ghost copies of the coarse vertex weights.

mod assemble;
mod mapping;
mod migrate;
mod records;

use rayon::prelude::*;
use std::borrow::Cow;
use std::sync::atomic::Ordering;

use crate::comm::{CommTag, Communicator};
use crate::error::{DistPartError, Result};
use crate::graph::{distribution, halo, DistributedGraph};
use crate::types::{GlobalNodeId, NodeId};

use self::assemble::{build_buckets, build_coarse_csr, localize_edge_sources};
use self::mapping::{build_lcnode_mapping, echo_migrated_mappings, resolve_nonlocal_clusters};
use self::records::{dedup_cluster_edges, dedup_cluster_nodes, ClusterEdge, ClusterNode};

const TAG_CONVENTION: CommTag = CommTag::new(0x2e);
const TAG_CLUSTER_HALO: CommTag = CommTag::new(0x30);
const TAG_MIGRATE: CommTag = CommTag::new(0x32);
const TAG_C_NODE_DIST: CommTag = CommTag::new(0x36);
const TAG_REQUESTS: CommTag = CommTag::new(0x38);
const TAG_ECHO: CommTag = CommTag::new(0x3c);
const TAG_C_EDGE_DIST: CommTag = CommTag::new(0x3d);
const TAG_C_GHOST_WEIGHTS: CommTag = CommTag::new(0x3e);

/// Coarse graph plus the fine→coarse mapping.
pub struct ContractionResult<C: Communicator> {
    pub graph: DistributedGraph<C>,
    /// For each owned fine vertex, the global ID of its coarse vertex.
    pub mapping: Vec<GlobalNodeId>,
}

/// Contract `graph` by `clustering`.
///
/// The clustering covers either the owned vertices (`n` entries; ghost
/// assignments are then fetched from the owners with a halo exchange) or
/// all local vertices (`total_n` entries, ghosts included, as produced by
/// clusterers that label their halo). Every entry must be a vertex of the
/// global graph.
pub fn contract_clustering<C: Communicator>(
    graph: &DistributedGraph<C>,
    clustering: &[GlobalNodeId],
) -> Result<ContractionResult<C>> {
    let n = graph.n() as usize;
    let total_n = graph.total_n() as usize;
    let rank = graph.rank();

    // Agree on the clustering convention before any other collective runs.
    // A rank with no ghosts cannot tell `n` entries from `total_n` entries
    // locally, and the halo exchange below involves every rank, so the
    // decision must be global: 1 = ghosts included, 2 = owned only,
    // 3 = locally ambiguous, 0 = unusable length.
    let flag: u8 = if clustering.len() == n && n == total_n {
        3
    } else if clustering.len() == total_n {
        1
    } else if clustering.len() == n {
        2
    } else {
        0
    };
    let flags =
        crate::comm::collective::allgather(&**graph.communicator(), TAG_CONVENTION, flag)?;
    let any_full = flags.iter().any(|&f| f == 1);
    let any_owned = flags.iter().any(|&f| f == 2);
    if flags.iter().any(|&f| f == 0) || (any_full && any_owned) {
        return Err(DistPartError::InvalidClustering {
            len: clustering.len(),
            expected_n: n,
            expected_total: total_n,
        });
    }

    // Extend the clustering to ghosts if the callers did not.
    let clustering: Cow<[GlobalNodeId]> = if any_owned {
        let ghost = halo::ghost_values(graph, TAG_CLUSTER_HALO, &clustering[..n])?;
        let mut full = Vec::with_capacity(total_n);
        full.extend_from_slice(clustering);
        full.extend(ghost);
        Cow::Owned(full)
    } else {
        Cow::Borrowed(clustering)
    };
    let clustering = &clustering[..];

    // Phase A: away vertices emit one node record and one edge record per
    // incident edge, all keyed by cluster IDs.
    log::debug!("contraction: collecting nonlocal records");
    let away: Vec<NodeId> = (0..graph.n())
        .into_par_iter()
        .filter(|&u| !graph.is_owned_global_node(clustering[u as usize]))
        .collect();
    let nonlocal_nodes: Vec<ClusterNode> = away
        .par_iter()
        .map(|&u| ClusterNode {
            cluster: clustering[u as usize],
            weight: graph.node_weight(u),
        })
        .collect();
    let nonlocal_edges: Vec<ClusterEdge> = away
        .par_iter()
        .flat_map_iter(|&u| {
            graph.neighbors(u).map(move |(e, v)| ClusterEdge {
                src: clustering[u as usize],
                dst: clustering[v as usize],
                weight: graph.edge_weight(e),
            })
        })
        .collect();
    drop(away);

    // Phase B: local deduplication, which also sorts both buffers by
    // destination rank.
    let nonlocal_nodes = dedup_cluster_nodes(nonlocal_nodes);
    let nonlocal_edges = dedup_cluster_edges(nonlocal_edges);

    // Phase C: migration.
    log::debug!(
        "contraction: migrating {} node and {} edge records",
        nonlocal_nodes.len(),
        nonlocal_edges.len()
    );
    let mut migration =
        migrate::exchange_nonlocal(graph, TAG_MIGRATE, nonlocal_nodes, nonlocal_edges)?;
    migration.edges.par_sort_unstable_by_key(|e| e.src);

    // Phase D: dense numbering of the non-empty owned clusters.
    let (lnode_to_lcnode, c_n) = build_lcnode_mapping(graph, clustering, &migration.nodes);
    let c_node_dist = distribution::from_local_count(
        &**graph.communicator(),
        TAG_C_NODE_DIST,
        c_n as u64,
    )?;
    log::debug!("contraction: {c_n} coarse nodes on rank {rank}");

    // Phase E: resolve off-rank clusters. Request slots must all be
    // assigned before the echo responses are folded in, so that
    // edge-referenced clusters keep their slots.
    let resolution = resolve_nonlocal_clusters(
        graph,
        TAG_REQUESTS,
        clustering,
        &migration.edges,
        &lnode_to_lcnode,
        &c_node_dist,
    )?;
    echo_migrated_mappings(
        graph,
        TAG_ECHO,
        &migration.nodes,
        &migration.node_sendcounts,
        &migration.node_recvcounts,
        &lnode_to_lcnode,
        &c_node_dist,
        &resolution.resolver,
    )?;

    // Fine→coarse mapping.
    let offset = graph.offset_n();
    let node_dist = graph.node_dist();
    let mapping: Vec<GlobalNodeId> = (0..n)
        .into_par_iter()
        .map(|u| {
            let cluster = clustering[u];
            let coarse = if graph.is_owned_global_node(cluster) {
                lnode_to_lcnode[(cluster - offset) as usize] as u64 + c_node_dist[rank]
            } else {
                resolution
                    .resolver
                    .coarse_global(node_dist, &resolution.responses, cluster)
            };
            debug_assert!(coarse < *c_node_dist.last().unwrap());
            coarse
        })
        .collect();

    // Phase F/G: coarse ghost directory and adjacency.
    localize_edge_sources(&mut migration.edges, offset, &lnode_to_lcnode);
    let buckets = build_buckets(graph, clustering, &lnode_to_lcnode, c_n, &migration.edges);
    let csr = build_coarse_csr(
        graph,
        clustering,
        &lnode_to_lcnode,
        c_n,
        &resolution,
        &migration.edges,
        &buckets,
    );

    // Weights of vertices that migrated here arrive through the node
    // records rather than the bucket pass.
    migration.nodes.par_iter().for_each(|rec| {
        let c_u = lnode_to_lcnode[(rec.cluster - offset) as usize];
        csr.c_node_weights[c_u as usize].fetch_add(rec.weight, Ordering::Relaxed);
    });

    let c_m = *csr.c_nodes.last().unwrap();
    let c_edge_dist =
        distribution::from_local_count(&**graph.communicator(), TAG_C_EDGE_DIST, c_m)?;

    let (c_ghost_owner, c_ghost_to_global, c_global_to_ghost) =
        resolution.build_ghost_directory(c_n);

    // Ghost weights start at zero and are fetched from the owners below.
    let mut c_node_weights: Vec<i64> = csr
        .c_node_weights
        .into_iter()
        .map(std::sync::atomic::AtomicI64::into_inner)
        .collect();
    c_node_weights.resize(c_n as usize + resolution.c_ghost_n as usize, 0);

    let mut c_graph = DistributedGraph::new(
        c_node_dist,
        c_edge_dist,
        csr.c_nodes,
        csr.c_edges,
        c_node_weights,
        csr.c_edge_weights,
        c_ghost_owner,
        c_ghost_to_global,
        c_global_to_ghost,
        graph.communicator().clone(),
    )?;

    // Phase H: ghost copies of the coarse vertex weights.
    halo::sync_ghost_node_weights(&mut c_graph, TAG_C_GHOST_WEIGHTS)?;

    Ok(ContractionResult {
        graph: c_graph,
        mapping,
    })
}
