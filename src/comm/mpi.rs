//! MPI backend: one rank per process via `rsmpi`.
//!
//! Send buffers are boxed and leaked for the lifetime of the request so the
//! nonblocking call can outlive the caller's slice; `wait`/`drop` reclaim
//! them. The native barrier is used; collectives still run over the
//! point-to-point layer of [`crate::comm::collective`].

use core::ptr::NonNull;

use mpi::collective::CommunicatorCollectives;
use mpi::environment::Universe;
use mpi::point_to_point::{Destination, Source};
use mpi::request::StaticScope;
use mpi::topology::{Communicator as _, SimpleCommunicator};

use crate::comm::{CommTag, Communicator, Wait};
use crate::types::Rank;

pub struct MpiComm {
    _universe: Universe,
    world: SimpleCommunicator,
    rank: Rank,
    size: Rank,
}

unsafe impl Send for MpiComm {}
unsafe impl Sync for MpiComm {}

impl MpiComm {
    /// Initialize MPI and wrap the world communicator. Must be called at
    /// most once per process.
    pub fn init() -> Self {
        let universe = mpi::initialize().expect("MPI already initialized");
        let world = universe.world();
        let rank = world.rank() as Rank;
        let size = world.size() as Rank;
        Self {
            _universe: universe,
            world,
            rank,
            size,
        }
    }
}

impl Communicator for MpiComm {
    type SendHandle = MpiSendHandle;
    type RecvHandle = MpiRecvHandle;

    fn isend(&self, peer: Rank, tag: CommTag, buf: &[u8]) -> Self::SendHandle {
        let boxed = buf.to_vec().into_boxed_slice();
        let raw: *mut [u8] = Box::into_raw(boxed);
        let slice: &[u8] = unsafe { &*raw };
        let req = self
            .world
            .process_at_rank(peer as i32)
            .immediate_send_with_tag(StaticScope, slice, tag.as_u16() as i32);
        MpiSendHandle {
            req: Some(req),
            buf: Some(unsafe { NonNull::new_unchecked(raw) }),
        }
    }

    fn irecv(&self, peer: Rank, tag: CommTag, len: usize) -> Self::RecvHandle {
        let boxed = vec![0u8; len].into_boxed_slice();
        let raw: *mut [u8] = Box::into_raw(boxed);
        let slice_mut: &mut [u8] = unsafe { &mut *raw };
        let req = self
            .world
            .process_at_rank(peer as i32)
            .immediate_receive_into_with_tag(StaticScope, slice_mut, tag.as_u16() as i32);
        MpiRecvHandle {
            req: Some(req),
            buf: Some(unsafe { NonNull::new_unchecked(raw) }),
        }
    }

    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> Rank {
        self.size
    }

    fn barrier(&self) {
        self.world.barrier();
    }
}

pub struct MpiSendHandle {
    req: Option<mpi::request::Request<'static, [u8], StaticScope>>,
    buf: Option<NonNull<[u8]>>,
}

impl Wait for MpiSendHandle {
    fn wait(mut self) -> Option<Vec<u8>> {
        if let Some(r) = self.req.take() {
            let _ = r.wait();
        }
        if let Some(ptr) = self.buf.take() {
            unsafe { drop(Box::from_raw(ptr.as_ptr())) };
        }
        None
    }
}

impl Drop for MpiSendHandle {
    fn drop(&mut self) {
        if let Some(r) = self.req.take() {
            let _ = r.wait();
        }
        if let Some(ptr) = self.buf.take() {
            unsafe { drop(Box::from_raw(ptr.as_ptr())) };
        }
    }
}

pub struct MpiRecvHandle {
    req: Option<mpi::request::Request<'static, [u8], StaticScope>>,
    buf: Option<NonNull<[u8]>>,
}

impl Wait for MpiRecvHandle {
    fn wait(mut self) -> Option<Vec<u8>> {
        if let Some(r) = self.req.take() {
            let _ = r.wait();
        }
        let ptr = self.buf.take()?;
        let boxed: Box<[u8]> = unsafe { Box::from_raw(ptr.as_ptr()) };
        Some(Vec::from(boxed))
    }
}

impl Drop for MpiRecvHandle {
    fn drop(&mut self) {
        if let Some(r) = self.req.take() {
            let _ = r.wait();
        }
        if let Some(ptr) = self.buf.take() {
            unsafe { drop(Box::from_raw(ptr.as_ptr())) };
        }
    }
}
