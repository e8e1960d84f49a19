//! Collective operations layered on the point-to-point primitives.
//!
//! Every collective posts all receives first, then all sends, then drains in
//! rank order; the self-exchange is a local copy. Message ordering per
//! `(src, dst, tag)` channel is FIFO in all backends, so consecutive
//! collectives may reuse a tag without interference — distinct tags are
//! still used per protocol phase for debuggability.

use bytemuck::{Pod, Zeroable};

use crate::comm::{CommTag, Communicator, Wait};
use crate::error::{DistPartError, Result};
use crate::parallel::exclusive_prefix_sum;
use crate::types::Rank;

fn comm_error(peer: Rank, what: &str) -> DistPartError {
    DistPartError::Communication {
        peer,
        what: what.to_string(),
    }
}

fn wait_exact(peer: Rank, handle: impl Wait, expected: usize) -> Result<Vec<u8>> {
    let data = handle
        .wait()
        .ok_or_else(|| comm_error(peer, "receive returned no data"))?;
    if data.len() != expected {
        return Err(comm_error(peer, "received message of unexpected length"));
    }
    Ok(data)
}

/// Gather one value from every rank; the result is indexed by rank and
/// identical on all ranks.
pub fn allgather<T, C>(comm: &C, tag: CommTag, value: T) -> Result<Vec<T>>
where
    T: Pod,
    C: Communicator,
{
    let size = comm.size();
    let rank = comm.rank();
    let bytes = bytemuck::bytes_of(&value);

    let mut recvs = Vec::with_capacity(size.saturating_sub(1));
    for peer in 0..size {
        if peer != rank {
            recvs.push((peer, comm.irecv(peer, tag, bytes.len())));
        }
    }
    let mut sends = Vec::with_capacity(size.saturating_sub(1));
    for peer in 0..size {
        if peer != rank {
            sends.push(comm.isend(peer, tag, bytes));
        }
    }

    let mut out = vec![value; size];
    for (peer, h) in recvs {
        let data = wait_exact(peer, h, bytes.len())?;
        // Received byte buffers carry no alignment guarantee.
        out[peer] = bytemuck::pod_read_unaligned(&data);
    }
    for s in sends {
        let _ = s.wait();
    }
    Ok(out)
}

/// Gather a same-typed slice from every rank; result `out[p]` is rank `p`'s
/// contribution. Slices may differ in length (lengths are exchanged first).
pub fn allgather_slice<T, C>(comm: &C, tag: CommTag, local: &[T]) -> Result<Vec<Vec<T>>>
where
    T: Pod,
    C: Communicator,
{
    let counts = allgather(comm, tag, local.len() as u64)?;
    let size = comm.size();
    let rank = comm.rank();
    let bytes = bytemuck::cast_slice(local);
    let elem = std::mem::size_of::<T>();

    let mut recvs = Vec::new();
    for peer in 0..size {
        if peer != rank && counts[peer] > 0 {
            recvs.push((peer, comm.irecv(peer, tag.offset(1), counts[peer] as usize * elem)));
        }
    }
    let mut sends = Vec::new();
    for peer in 0..size {
        if peer != rank && !local.is_empty() {
            sends.push(comm.isend(peer, tag.offset(1), bytes));
        }
    }

    let mut out: Vec<Vec<T>> = (0..size)
        .map(|p| vec![T::zeroed(); counts[p] as usize])
        .collect();
    out[rank].copy_from_slice(local);
    for (peer, h) in recvs {
        let data = wait_exact(peer, h, counts[peer] as usize * elem)?;
        bytemuck::cast_slice_mut(&mut out[peer]).copy_from_slice(&data);
    }
    for s in sends {
        let _ = s.wait();
    }
    Ok(out)
}

/// Personalized exchange of one value per rank pair: rank `r` sends
/// `send[p]` to rank `p` and receives into slot `p` of the result.
pub fn alltoall<T, C>(comm: &C, tag: CommTag, send: &[T]) -> Result<Vec<T>>
where
    T: Pod,
    C: Communicator,
{
    let size = comm.size();
    let rank = comm.rank();
    assert_eq!(send.len(), size, "alltoall send buffer must have one entry per rank");
    let elem = std::mem::size_of::<T>();

    let mut recvs = Vec::with_capacity(size.saturating_sub(1));
    for peer in 0..size {
        if peer != rank {
            recvs.push((peer, comm.irecv(peer, tag, elem)));
        }
    }
    let mut sends = Vec::with_capacity(size.saturating_sub(1));
    for peer in 0..size {
        if peer != rank {
            sends.push(comm.isend(peer, tag, bytemuck::bytes_of(&send[peer])));
        }
    }

    let mut out = vec![send[rank]; size];
    for (peer, h) in recvs {
        let data = wait_exact(peer, h, elem)?;
        out[peer] = bytemuck::pod_read_unaligned(&data);
    }
    for s in sends {
        let _ = s.wait();
    }
    Ok(out)
}

/// Personalized variable-length exchange. `send` is the concatenation of
/// per-rank blocks of `sendcounts[p]` records; the result concatenates the
/// received blocks of `recvcounts[p]` records in rank order. Zero-count
/// pairs exchange nothing.
pub fn alltoallv<T, C>(
    comm: &C,
    tag: CommTag,
    send: &[T],
    sendcounts: &[usize],
    recvcounts: &[usize],
) -> Result<Vec<T>>
where
    T: Pod,
    C: Communicator,
{
    let size = comm.size();
    let rank = comm.rank();
    assert_eq!(sendcounts.len(), size);
    assert_eq!(recvcounts.len(), size);
    let sdispls = exclusive_prefix_sum(sendcounts);
    let rdispls = exclusive_prefix_sum(recvcounts);
    debug_assert_eq!(sdispls[size], send.len());
    let elem = std::mem::size_of::<T>();

    let mut recvs = Vec::new();
    for peer in 0..size {
        if peer != rank && recvcounts[peer] > 0 {
            recvs.push((peer, comm.irecv(peer, tag, recvcounts[peer] * elem)));
        }
    }
    let mut sends = Vec::new();
    for peer in 0..size {
        if peer != rank && sendcounts[peer] > 0 {
            let block = &send[sdispls[peer]..sdispls[peer + 1]];
            sends.push(comm.isend(peer, tag, bytemuck::cast_slice(block)));
        }
    }

    let mut out = vec![T::zeroed(); rdispls[size]];
    debug_assert_eq!(sendcounts[rank], recvcounts[rank], "self block size mismatch");
    if sendcounts[rank] > 0 {
        out[rdispls[rank]..rdispls[rank + 1]]
            .copy_from_slice(&send[sdispls[rank]..sdispls[rank + 1]]);
    }
    for (peer, h) in recvs {
        let data = wait_exact(peer, h, recvcounts[peer] * elem)?;
        bytemuck::cast_slice_mut(&mut out[rdispls[peer]..rdispls[peer + 1]])
            .copy_from_slice(&data);
    }
    for s in sends {
        let _ = s.wait();
    }
    Ok(out)
}

/// Sparse personalized exchange over per-rank vectors: counts first, then
/// payloads. Returns the received vector per source rank.
pub fn sparse_alltoall<T, C>(comm: &C, tag: CommTag, sends: &[Vec<T>]) -> Result<Vec<Vec<T>>>
where
    T: Pod,
    C: Communicator,
{
    let size = comm.size();
    assert_eq!(sends.len(), size);
    let sendcounts: Vec<u64> = sends.iter().map(|v| v.len() as u64).collect();
    let recvcounts = alltoall(comm, tag, &sendcounts)?;

    let flat: Vec<T> = sends.iter().flat_map(|v| v.iter().copied()).collect();
    let sendcounts: Vec<usize> = sendcounts.iter().map(|&c| c as usize).collect();
    let recvcounts: Vec<usize> = recvcounts.iter().map(|&c| c as usize).collect();
    let recv = alltoallv(comm, tag.offset(1), &flat, &sendcounts, &recvcounts)?;

    let rdispls = exclusive_prefix_sum(&recvcounts);
    Ok((0..size)
        .map(|p| recv[rdispls[p]..rdispls[p + 1]].to_vec())
        .collect())
}

/// Reduce one value per rank with a commutative, associative operator.
pub fn allreduce<T, C, F>(comm: &C, tag: CommTag, value: T, op: F) -> Result<T>
where
    T: Pod,
    C: Communicator,
    F: Fn(T, T) -> T,
{
    let gathered = allgather(comm, tag, value)?;
    let mut it = gathered.into_iter();
    let first = it.next().expect("world has at least one rank");
    Ok(it.fold(first, op))
}

/// Global sum of a per-rank `i64`.
pub fn allreduce_sum<C: Communicator>(comm: &C, tag: CommTag, value: i64) -> Result<i64> {
    allreduce(comm, tag, value, |a, b| a + b)
}

/// Global conjunction of a per-rank flag.
pub fn allreduce_and<C: Communicator>(comm: &C, tag: CommTag, value: bool) -> Result<bool> {
    Ok(allreduce(comm, tag, value as u8, |a, b| a & b)? != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{NoComm, ThreadComm};

    /// Run `f` once per rank of a fresh world, one thread per rank.
    fn run_world<R, F>(size: usize, f: F) -> Vec<R>
    where
        R: Send + 'static,
        F: Fn(ThreadComm) -> R + Send + Sync + Clone + 'static,
    {
        let handles: Vec<_> = ThreadComm::world(size)
            .into_iter()
            .map(|comm| {
                let f = f.clone();
                std::thread::spawn(move || f(comm))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    }

    #[test]
    fn allgather_single_rank() {
        let out = allgather(&NoComm, CommTag::new(1), 5u64).unwrap();
        assert_eq!(out, vec![5]);
    }

    #[test]
    fn allgather_three_ranks() {
        let results = run_world(3, |comm| {
            allgather(&comm, CommTag::new(1), comm.rank() as u64 * 10).unwrap()
        });
        for out in results {
            assert_eq!(out, vec![0, 10, 20]);
        }
    }

    #[test]
    fn alltoall_two_ranks() {
        let results = run_world(2, |comm| {
            let send: Vec<u64> = (0..2).map(|p| (comm.rank() * 10 + p) as u64).collect();
            alltoall(&comm, CommTag::new(2), &send).unwrap()
        });
        assert_eq!(results[0], vec![0, 10]);
        assert_eq!(results[1], vec![1, 11]);
    }

    #[test]
    fn alltoallv_asymmetric() {
        // Rank 0 sends [1,2] to rank 1 and nothing to itself; rank 1 sends
        // [7] to rank 0 and [8,9] to itself.
        let results = run_world(2, |comm| {
            let (send, counts): (Vec<u64>, Vec<usize>) = if comm.rank() == 0 {
                (vec![1, 2], vec![0, 2])
            } else {
                (vec![7, 8, 9], vec![1, 2])
            };
            let recvcounts = alltoall(
                &comm,
                CommTag::new(3),
                &counts.iter().map(|&c| c as u64).collect::<Vec<_>>(),
            )
            .unwrap()
            .iter()
            .map(|&c| c as usize)
            .collect::<Vec<_>>();
            alltoallv(&comm, CommTag::new(4), &send, &counts, &recvcounts).unwrap()
        });
        assert_eq!(results[0], vec![7]);
        assert_eq!(results[1], vec![1, 2, 8, 9]);
    }

    #[test]
    fn sparse_exchange() {
        let results = run_world(3, |comm| {
            let r = comm.rank() as u64;
            let sends: Vec<Vec<u64>> = (0..3).map(|p| vec![r * 100 + p as u64]).collect();
            sparse_alltoall(&comm, CommTag::new(5), &sends).unwrap()
        });
        for (r, out) in results.iter().enumerate() {
            for (p, block) in out.iter().enumerate() {
                assert_eq!(block, &vec![p as u64 * 100 + r as u64]);
            }
        }
    }

    #[test]
    fn reductions() {
        let results = run_world(4, |comm| {
            let sum = allreduce_sum(&comm, CommTag::new(6), comm.rank() as i64 + 1).unwrap();
            let all = allreduce_and(&comm, CommTag::new(7), comm.rank() != 3).unwrap();
            (sum, all)
        });
        for (sum, all) in results {
            assert_eq!(sum, 10);
            assert!(!all);
        }
    }

    #[test]
    fn allgather_slice_variable_lengths() {
        let results = run_world(2, |comm| {
            let local: Vec<u64> = (0..=comm.rank() as u64).collect();
            allgather_slice(&comm, CommTag::new(8), &local).unwrap()
        });
        for out in results {
            assert_eq!(out[0], vec![0]);
            assert_eq!(out[1], vec![0, 1]);
        }
    }
}
