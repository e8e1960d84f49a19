//! Distribution vectors: prefix-sum arrays mapping global IDs to the rank
//! that owns them.
//!
//! A distribution over `P` ranks is a vector `D[0..=P]` of monotonically
//! non-decreasing global IDs with `D[0] = 0`; rank `r` owns `[D[r], D[r+1])`
//! and `D[P]` is the global entity count. The same vector must be held by
//! every rank of the communicator.

use crate::comm::collective::{allgather, allreduce_and};
use crate::comm::{CommTag, Communicator};
use crate::error::{DistPartError, Result};
use crate::types::Rank;

/// Rank owning global ID `global` under distribution `dist`.
///
/// Binary search over the `P+1` fence posts; `global` must be below
/// `dist[P]`.
#[inline]
pub fn find_owner(dist: &[u64], global: u64) -> Rank {
    debug_assert!(!dist.is_empty() && global < *dist.last().unwrap());
    // partition_point returns the first rank whose range starts above
    // `global`; its predecessor owns it.
    dist.partition_point(|&start| start <= global) - 1
}

/// Build a distribution from this rank's local entity count: an allgather
/// followed by an exclusive scan. Identical on all ranks by construction.
pub fn from_local_count<C: Communicator>(comm: &C, tag: CommTag, count: u64) -> Result<Vec<u64>> {
    let counts = allgather(comm, tag, count)?;
    let mut dist = Vec::with_capacity(counts.len() + 1);
    let mut acc = 0u64;
    dist.push(0);
    for c in counts {
        acc += c;
        dist.push(acc);
    }
    Ok(dist)
}

/// Verify that `dist` is well-formed locally and identical on all ranks.
///
/// The cross-rank comparison reduces a fingerprint rather than shipping the
/// whole vector; a fingerprint collision across ranks is not a failure mode
/// worth the bandwidth of the exact check.
pub fn check_consistent<C: Communicator>(comm: &C, tag: CommTag, dist: &[u64]) -> Result<()> {
    let well_formed = dist.len() == comm.size() + 1
        && dist.first() == Some(&0)
        && dist.windows(2).all(|w| w[0] <= w[1]);

    let fingerprint = if well_formed { fingerprint(dist) } else { 0 };
    let reference = allgather(comm, tag, fingerprint)?[0];
    let ok = allreduce_and(comm, tag.offset(1), well_formed && fingerprint == reference)?;
    if ok {
        Ok(())
    } else {
        Err(DistPartError::InconsistentDistribution)
    }
}

fn fingerprint(dist: &[u64]) -> u64 {
    // FNV-1a over the raw entries; stable across ranks and runs.
    let mut h = 0xcbf2_9ce4_8422_2325u64;
    for &x in dist {
        for b in x.to_le_bytes() {
            h ^= b as u64;
            h = h.wrapping_mul(0x0000_0100_0000_01b3);
        }
    }
    // Reserve 0 for "locally malformed".
    h.max(1)
}
