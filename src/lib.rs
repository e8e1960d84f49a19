//! # distpart
//!
//! Core of a distributed multilevel graph partitioner: a distributed CSR
//! graph with ghost-node bookkeeping, and a parallel cluster-contraction
//! engine that drives the multilevel V-cycle.
//!
//! The graph is partitioned across `P` ranks by contiguous global vertex
//! ranges. Each rank stores its owned adjacency plus a directory of *ghost*
//! vertices (off-rank endpoints of local edges). Coarsening contracts the
//! graph by an arbitrary clustering — clusters may span ranks — and returns
//! the coarse graph together with the fine→coarse mapping used to project
//! refined partitions back down.
//!
//! Within a rank all phases are data-parallel (`rayon`); across ranks the
//! engine only communicates through the [`comm::Communicator`] abstraction,
//! which ships with a serial backend, an in-process thread backend for
//! tests and hybrid runs, and an MPI backend behind the `mpi-support`
//! feature.
//!
//! ```
//! use distpart::comm::NoComm;
//! use distpart::graph::GraphBuilder;
//! use distpart::coarsen::contract_clustering;
//! use std::sync::Arc;
//!
//! # fn main() -> distpart::error::Result<()> {
//! // A triangle on one rank, contracted to a single vertex.
//! let mut builder = GraphBuilder::new(vec![0, 3], None, Arc::new(NoComm));
//! builder.add_node(&[1, 2]);
//! builder.add_node(&[0, 2]);
//! builder.add_node(&[0, 1]);
//! let graph = builder.build()?;
//!
//! let result = contract_clustering(&graph, &[0, 0, 0])?;
//! assert_eq!(result.graph.global_n(), 1);
//! assert_eq!(result.graph.global_m(), 0);
//! # Ok(())
//! # }
//! ```

pub mod cluster;
pub mod coarsen;
pub mod comm;
pub mod error;
pub mod graph;
pub mod io;
pub mod metrics;
pub mod parallel;
pub mod types;

/// The most-used types and entry points.
pub mod prelude {
    pub use crate::cluster::{Clusterer, GreedyClusterer};
    pub use crate::coarsen::{contract_clustering, ContractionResult};
    #[cfg(feature = "mpi-support")]
    pub use crate::comm::MpiComm;
    pub use crate::comm::{CommTag, Communicator, NoComm, ThreadComm};
    pub use crate::error::{DistPartError, Result};
    pub use crate::graph::{DistributedGraph, GraphBuilder};
    pub use crate::io::read_metis;
    pub use crate::types::*;
}
