//! Communication abstraction for in-process (thread) and inter-process (MPI)
//! message passing.
//!
//! Wire conventions for the layers above:
//! - All integers are little-endian fixed width (u64 counts/IDs).
//! - Payload records are `#[repr(C)]` and `bytemuck::Pod`-safe.
//! - Counts are exchanged before payloads whenever lengths are not implied
//!   by the protocol, so receivers always post exact-length buffers.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Barrier, Condvar, Mutex};

use crate::types::Rank;

pub mod collective;
#[cfg(feature = "mpi-support")]
pub mod mpi;

#[cfg(feature = "mpi-support")]
pub use self::mpi::MpiComm;

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received bytes (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

/// Nonblocking communication interface (minimal by design).
///
/// Implementors provide asynchronous byte-level send/receive plus a barrier;
/// everything else (collectives, sparse exchanges) is layered on top in
/// [`collective`].
pub trait Communicator: Send + Sync + 'static {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    /// Post a nonblocking send of `buf` to `peer`. Never called with
    /// `peer == rank()`; self-exchanges are short-circuited by the
    /// collective layer.
    fn isend(&self, peer: Rank, tag: CommTag, buf: &[u8]) -> Self::SendHandle;

    /// Post a nonblocking receive of exactly `len` bytes from `peer`.
    fn irecv(&self, peer: Rank, tag: CommTag, len: usize) -> Self::RecvHandle;

    /// Rank of this process, `0..size()`.
    fn rank(&self) -> Rank;

    /// Total number of ranks.
    fn size(&self) -> Rank;

    /// Synchronization barrier across all ranks.
    fn barrier(&self);
}

/// Tag newtype for safer tag arithmetic.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct CommTag(u16);

impl CommTag {
    #[inline]
    pub const fn new(tag: u16) -> Self {
        Self(tag)
    }

    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Offset the tag by `dx`, wrapping on overflow.
    #[inline]
    pub const fn offset(self, dx: u16) -> Self {
        Self(self.0.wrapping_add(dx))
    }
}

impl From<u16> for CommTag {
    #[inline]
    fn from(x: u16) -> Self {
        CommTag::new(x)
    }
}

// --- NoComm: single-rank world for serial runs and unit tests ---

/// Compile-time no-op comm for pure serial use. All collectives degenerate
/// to local copies; the point-to-point hooks are never exercised because a
/// one-rank world has no peers.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn isend(&self, _peer: Rank, _tag: CommTag, _buf: &[u8]) {}

    fn irecv(&self, _peer: Rank, _tag: CommTag, _len: usize) {}

    fn rank(&self) -> Rank {
        0
    }

    fn size(&self) -> Rank {
        1
    }

    fn barrier(&self) {}
}

// --- ThreadComm: one rank per thread within a single process ---

type Key = (Rank, Rank, u16); // (src, dst, tag)

#[derive(Default)]
struct Slot {
    q: VecDeque<Vec<u8>>,
}

type Channel = (Mutex<Slot>, Condvar);

/// Shared state of an in-process world: one mailbox keyed by
/// `(src, dst, tag)` plus a barrier sized to the rank count. Each world is
/// independent, so concurrently running worlds (e.g. parallel tests) cannot
/// observe each other's messages.
struct ThreadWorld {
    mailbox: Mutex<HashMap<Key, Arc<Channel>>>,
    barrier: Barrier,
}

impl ThreadWorld {
    fn channel(&self, key: Key) -> Arc<Channel> {
        let mut map = self.mailbox.lock().expect("mailbox poisoned");
        map.entry(key)
            .or_insert_with(|| Arc::new((Mutex::new(Slot::default()), Condvar::new())))
            .clone()
    }
}

/// Communicator for hybrid and test runs where every rank is a thread of
/// the current process. Construct one world with [`ThreadComm::world`] and
/// hand one handle to each rank thread.
#[derive(Clone)]
pub struct ThreadComm {
    world: Arc<ThreadWorld>,
    rank: Rank,
    size: Rank,
}

impl ThreadComm {
    /// Create a world of `size` ranks and return one communicator per rank,
    /// ordered by rank.
    pub fn world(size: usize) -> Vec<ThreadComm> {
        assert!(size > 0, "world must have at least one rank");
        let world = Arc::new(ThreadWorld {
            mailbox: Mutex::new(HashMap::new()),
            barrier: Barrier::new(size),
        });
        (0..size)
            .map(|rank| ThreadComm {
                world: world.clone(),
                rank,
                size,
            })
            .collect()
    }
}

pub struct ThreadSendHandle;

impl Wait for ThreadSendHandle {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

pub struct ThreadRecvHandle {
    chan: Arc<Channel>,
    want_len: usize,
}

impl Wait for ThreadRecvHandle {
    fn wait(self) -> Option<Vec<u8>> {
        let (lock, cv) = &*self.chan;
        let mut slot = lock.lock().expect("channel poisoned");
        while slot.q.is_empty() {
            slot = cv.wait(slot).expect("condvar poisoned");
        }
        let msg = slot.q.pop_front().expect("queue non-empty");
        debug_assert_eq!(msg.len(), self.want_len, "message length mismatch");
        Some(msg)
    }
}

impl Communicator for ThreadComm {
    type SendHandle = ThreadSendHandle;
    type RecvHandle = ThreadRecvHandle;

    fn isend(&self, peer: Rank, tag: CommTag, buf: &[u8]) -> Self::SendHandle {
        let chan = self.world.channel((self.rank, peer, tag.as_u16()));
        let (lock, cv) = &*chan;
        {
            let mut slot = lock.lock().expect("channel poisoned");
            slot.q.push_back(buf.to_vec());
        }
        cv.notify_all();
        ThreadSendHandle
    }

    fn irecv(&self, peer: Rank, tag: CommTag, len: usize) -> Self::RecvHandle {
        ThreadRecvHandle {
            chan: self.world.channel((peer, self.rank, tag.as_u16())),
            want_len: len,
        }
    }

    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> Rank {
        self.size
    }

    fn barrier(&self) {
        self.world.barrier.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_world_point_to_point() {
        let comms = ThreadComm::world(2);
        let [c0, c1]: [ThreadComm; 2] = comms.try_into().ok().unwrap();
        let tag = CommTag::new(7);

        let t0 = std::thread::spawn(move || {
            c0.isend(1, tag, &[1, 2, 3]);
            c0.irecv(1, tag, 2).wait().unwrap()
        });
        let t1 = std::thread::spawn(move || {
            let got = c1.irecv(0, tag, 3).wait().unwrap();
            c1.isend(0, tag, &[9, 9]);
            got
        });

        assert_eq!(t0.join().unwrap(), vec![9, 9]);
        assert_eq!(t1.join().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn messages_on_one_channel_stay_fifo() {
        let comms = ThreadComm::world(2);
        let [c0, c1]: [ThreadComm; 2] = comms.try_into().ok().unwrap();
        let tag = CommTag::new(3);

        let t0 = std::thread::spawn(move || {
            for i in 0..10u8 {
                c0.isend(1, tag, &[i]);
            }
        });
        let t1 = std::thread::spawn(move || {
            (0..10u8)
                .map(|_| c1.irecv(0, tag, 1).wait().unwrap()[0])
                .collect::<Vec<_>>()
        });

        t0.join().unwrap();
        assert_eq!(t1.join().unwrap(), (0..10).collect::<Vec<u8>>());
    }

    #[test]
    fn distinct_worlds_are_isolated() {
        let a = ThreadComm::world(1).pop().unwrap();
        let b = ThreadComm::world(1).pop().unwrap();
        assert_eq!(a.rank(), 0);
        assert_eq!(b.size(), 1);
        // No shared mailbox: nothing to assert beyond construction, but a
        // shared global would deadlock the barrier below.
        a.barrier();
        b.barrier();
    }
}
