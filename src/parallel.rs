//! Parallel scan and slicing helpers shared by the contraction phases.

use rayon::prelude::*;
use std::ops::Add;

/// Minimum chunk length before a scan bothers going parallel. Below this the
/// sequential pass wins on every machine we care about.
const SEQ_CUTOFF: usize = 1 << 14;

/// In-place inclusive prefix sum.
///
/// Two-pass chunked scan: per-chunk sums, a sequential scan over the (few)
/// chunk totals, then a parallel fix-up pass adding each chunk's offset.
pub fn prefix_sum<T>(data: &mut [T])
where
    T: Copy + Default + Add<Output = T> + Send + Sync,
{
    if data.len() < SEQ_CUTOFF {
        let mut acc = T::default();
        for x in data.iter_mut() {
            acc = acc + *x;
            *x = acc;
        }
        return;
    }

    let chunk_len = (data.len() / rayon::current_num_threads().max(1)).max(SEQ_CUTOFF);

    let mut offsets: Vec<T> = data
        .par_chunks_mut(chunk_len)
        .map(|chunk| {
            let mut acc = T::default();
            for x in chunk.iter_mut() {
                acc = acc + *x;
                *x = acc;
            }
            acc
        })
        .collect();

    let mut acc = T::default();
    for o in offsets.iter_mut() {
        let next = acc + *o;
        *o = acc;
        acc = next;
    }

    data.par_chunks_mut(chunk_len)
        .zip(offsets.into_par_iter())
        .for_each(|(chunk, offset)| {
            for x in chunk.iter_mut() {
                *x = *x + offset;
            }
        });
}

/// Exclusive prefix sum into a fresh vector one element longer than the
/// input; the final element is the total. Sequential: used for
/// per-rank count/displacement arrays whose length is the process count.
pub fn exclusive_prefix_sum<T>(counts: &[T]) -> Vec<T>
where
    T: Copy + Default + Add<Output = T>,
{
    let mut out = Vec::with_capacity(counts.len() + 1);
    let mut acc = T::default();
    for &c in counts {
        out.push(acc);
        acc = acc + c;
    }
    out.push(acc);
    out
}

/// Split `buf` into consecutive mutable sub-slices of the given lengths.
/// The lengths must sum to exactly `buf.len()`.
///
/// Lets a caller hand disjoint output ranges to parallel workers without
/// unsafe scatter writes.
pub fn split_lengths_mut<'a, T>(mut buf: &'a mut [T], lengths: &[usize]) -> Vec<&'a mut [T]> {
    let mut out = Vec::with_capacity(lengths.len());
    for &len in lengths {
        let (head, tail) = buf.split_at_mut(len);
        out.push(head);
        buf = tail;
    }
    debug_assert!(buf.is_empty(), "lengths do not cover the buffer");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_sum_small() {
        let mut v = vec![1u64, 2, 3, 4];
        prefix_sum(&mut v);
        assert_eq!(v, vec![1, 3, 6, 10]);
    }

    #[test]
    fn prefix_sum_empty() {
        let mut v: Vec<u64> = vec![];
        prefix_sum(&mut v);
        assert!(v.is_empty());
    }

    #[test]
    fn prefix_sum_large_matches_sequential() {
        let n = (1 << 16) + 37;
        let mut v: Vec<u64> = (0..n).map(|i| (i % 7) as u64).collect();
        let mut expected = v.clone();
        let mut acc = 0u64;
        for x in expected.iter_mut() {
            acc += *x;
            *x = acc;
        }
        prefix_sum(&mut v);
        assert_eq!(v, expected);
    }

    #[test]
    fn exclusive_scan() {
        assert_eq!(exclusive_prefix_sum(&[2usize, 0, 3]), vec![0, 2, 2, 5]);
        assert_eq!(exclusive_prefix_sum::<usize>(&[]), vec![0]);
    }

    #[test]
    fn split_lengths() {
        let mut buf = vec![0u32; 6];
        {
            let parts = split_lengths_mut(&mut buf, &[2, 0, 4]);
            assert_eq!(parts.len(), 3);
            assert_eq!(parts[0].len(), 2);
            assert_eq!(parts[2].len(), 4);
        }
    }
}
