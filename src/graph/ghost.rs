//! Ghost-node mapper: assigns local indices to non-owned global vertices
//! encountered as edge endpoints during graph construction.
//!
//! Ghost indices are handed out from `n` upwards in first-come order. The
//! mapper is safe for concurrent use: the underlying map provides
//! insert-or-get with a single winner, so every global ID gets exactly one
//! ghost index no matter how many threads race on it.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::graph::distribution::find_owner;
use crate::types::{GlobalNodeId, NodeId, Rank};

/// Builder-side ghost directory. `finalize` freezes it into the three
/// arrays carried by the distributed graph.
pub struct GhostNodeMapper<'a> {
    node_dist: &'a [u64],
    n: NodeId,
    map: DashMap<GlobalNodeId, NodeId>,
    next: AtomicU32,
}

/// Frozen ghost directory produced by [`GhostNodeMapper::finalize`].
pub struct GhostDirectory {
    pub ghost_owner: Vec<Rank>,
    pub ghost_to_global: Vec<GlobalNodeId>,
    pub global_to_ghost: hashbrown::HashMap<GlobalNodeId, NodeId>,
}

impl<'a> GhostNodeMapper<'a> {
    pub fn new(node_dist: &'a [u64], n: NodeId) -> Self {
        Self {
            node_dist,
            n,
            map: DashMap::new(),
            next: AtomicU32::new(0),
        }
    }

    /// Local index for the non-owned global vertex `global`, assigning the
    /// next free ghost index on first sight. Callers route owned IDs
    /// elsewhere; handing one in here corrupts the directory.
    pub fn lookup(&self, global: GlobalNodeId) -> NodeId {
        use dashmap::mapref::entry::Entry;
        match self.map.entry(global) {
            Entry::Occupied(e) => *e.get(),
            Entry::Vacant(slot) => {
                let local = self.n + self.next.fetch_add(1, Ordering::Relaxed);
                slot.insert(local);
                local
            }
        }
    }

    /// Number of distinct ghosts seen so far.
    pub fn ghost_n(&self) -> NodeId {
        self.next.load(Ordering::Relaxed)
    }

    pub fn finalize(self) -> GhostDirectory {
        let ghost_n = self.next.into_inner() as usize;
        let mut ghost_owner = vec![0; ghost_n];
        let mut ghost_to_global = vec![0; ghost_n];
        let mut global_to_ghost =
            hashbrown::HashMap::with_capacity(ghost_n);

        for (global, local) in self.map.into_iter() {
            let k = (local - self.n) as usize;
            ghost_owner[k] = find_owner(self.node_dist, global);
            ghost_to_global[k] = global;
            global_to_ghost.insert(global, local);
        }

        GhostDirectory {
            ghost_owner,
            ghost_to_global,
            global_to_ghost,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assigns_contiguous_indices_once() {
        // Two ranks, this one owns [0, 4).
        let dist = vec![0u64, 4, 8];
        let mapper = GhostNodeMapper::new(&dist, 4);

        let a = mapper.lookup(6);
        let b = mapper.lookup(5);
        let a2 = mapper.lookup(6);

        assert_eq!(a, a2);
        assert_ne!(a, b);
        assert!(a >= 4 && a < 6);
        assert!(b >= 4 && b < 6);
        assert_eq!(mapper.ghost_n(), 2);

        let dir = mapper.finalize();
        assert_eq!(dir.ghost_to_global.len(), 2);
        assert_eq!(dir.ghost_owner, vec![1, 1]);
        assert_eq!(dir.global_to_ghost[&6], a);
        assert_eq!(dir.global_to_ghost[&5], b);
        assert_eq!(dir.ghost_to_global[(a - 4) as usize], 6);
    }

    #[test]
    fn concurrent_lookups_have_single_winner() {
        use rayon::prelude::*;

        let dist = vec![0u64, 100, 200];
        let mapper = GhostNodeMapper::new(&dist, 100);

        // Hammer a small set of globals from many threads.
        let locals: Vec<NodeId> = (0..10_000usize)
            .into_par_iter()
            .map(|i| mapper.lookup(100 + (i % 16) as u64))
            .collect();

        assert_eq!(mapper.ghost_n(), 16);
        for (i, &l) in locals.iter().enumerate() {
            // locals[i % 16] looked up the same global ID.
            assert_eq!(l, locals[i % 16]);
            assert!(l >= 100 && l < 116);
        }

        // Same global always resolved to the same index.
        let dir = mapper.finalize();
        for g in 100..116u64 {
            let l = dir.global_to_ghost[&g];
            assert_eq!(dir.ghost_to_global[(l - 100) as usize], g);
        }
    }
}
