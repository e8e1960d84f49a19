//! Halo exchange: owners push per-vertex values to every process that holds
//! the vertex as a ghost.
//!
//! The sender side walks its owned interface vertices (owned vertices with
//! at least one ghost neighbor) and ships `(local_index, value)` records to
//! each adjacent rank; the receiver translates `owner_offset + local_index`
//! through its ghost directory. This covers every ghost exactly when the
//! graph is symmetric, which all graphs handled by this crate are.

use bytemuck::{Pod, Zeroable};
use rayon::prelude::*;

use crate::comm::collective::sparse_alltoall;
use crate::comm::{CommTag, Communicator};
use crate::error::Result;
use crate::graph::DistributedGraph;
use crate::types::{NodeId, Rank, WireValue};

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct InterfaceRecord {
    /// Sender-local vertex index.
    node: u32,
    _pad: u32,
    /// Value, as little-endian wire bits.
    value: u64,
}

/// For every ghost vertex, fetch the owner's entry of `values` (one entry
/// per owned vertex on each rank). Returns the ghost slice, indexed by
/// `u - n`.
///
/// Collective: all ranks must call with the same tag.
pub fn ghost_values<T, C>(
    graph: &DistributedGraph<C>,
    tag: CommTag,
    values: &[T],
) -> Result<Vec<T>>
where
    T: WireValue,
    C: Communicator,
{
    assert_eq!(values.len(), graph.n() as usize, "one value per owned vertex");
    let size = graph.size();
    let n = graph.n();

    // Sender side: one record per (interface vertex, adjacent rank) pair.
    let sends: Vec<Vec<InterfaceRecord>> = (0..n)
        .into_par_iter()
        .fold(
            || vec![Vec::new(); size],
            |mut acc, u| {
                let mut pes: Vec<Rank> = graph
                    .neighbors(u)
                    .filter_map(|(_, v)| (v >= n).then(|| graph.ghost_owner(v)))
                    .collect();
                pes.sort_unstable();
                pes.dedup();
                for pe in pes {
                    acc[pe].push(InterfaceRecord {
                        node: u,
                        _pad: 0,
                        value: values[u as usize].to_wire(),
                    });
                }
                acc
            },
        )
        .reduce(
            || vec![Vec::new(); size],
            |mut a, b| {
                for (dst, mut src) in a.iter_mut().zip(b) {
                    dst.append(&mut src);
                }
                a
            },
        );

    let received = sparse_alltoall(&**graph.communicator(), tag, &sends)?;

    let mut out = vec![T::from_wire(0); graph.ghost_n() as usize];
    #[cfg(debug_assertions)]
    let mut covered = vec![false; graph.ghost_n() as usize];

    for (pe, records) in received.iter().enumerate() {
        let offset = graph.offset_n_of(pe);
        for rec in records {
            let local = graph.global_to_local_node(offset + rec.node as u64)?;
            debug_assert!(graph.is_ghost_node(local));
            out[(local - n) as usize] = T::from_wire(rec.value);
            #[cfg(debug_assertions)]
            {
                covered[(local - n) as usize] = true;
            }
        }
    }

    #[cfg(debug_assertions)]
    debug_assert!(
        covered.iter().all(|&c| c),
        "halo exchange left a ghost uncovered; graph is not symmetric"
    );

    Ok(out)
}

/// Refresh the weights of all ghost vertices from their owners.
pub fn sync_ghost_node_weights<C: Communicator>(
    graph: &mut DistributedGraph<C>,
    tag: CommTag,
) -> Result<()> {
    let owned: Vec<i64> = (0..graph.n()).map(|u| graph.node_weight(u)).collect();
    let ghost = ghost_values(graph, tag, &owned)?;
    let n = graph.n();
    for (k, w) in ghost.into_iter().enumerate() {
        graph.set_ghost_node_weight(n + k as NodeId, w);
    }
    Ok(())
}
