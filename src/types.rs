//! Shared integer types for graph entities.
//!
//! Local IDs index into per-process arrays and are kept at 32 bits; global
//! IDs span the whole distributed graph and are 64 bits. Weights are signed
//! 64-bit integers so that aggregated coarse weights cannot overflow on the
//! graph sizes this crate targets. All of these are plain aliases: the code
//! is index arithmetic heavy and a newtype at every offset computation would
//! obscure more than it protects.

/// Process rank within the communicator, `0..P`.
pub type Rank = usize;

/// Block (partition class) identifier.
pub type BlockId = u32;

/// Local vertex ID on one process: owned vertices are `[0, n)`, ghost
/// vertices are `[n, total_n)`.
pub type NodeId = u32;

/// Local edge ID on one process, an index into the CSR `edges` array.
pub type EdgeId = u64;

/// Vertex ID in the global graph, `[0, global_n)`.
pub type GlobalNodeId = u64;

/// Edge ID in the global graph, `[0, global_m)`.
pub type GlobalEdgeId = u64;

/// Weight of a single vertex or a sum of vertex weights.
pub type NodeWeight = i64;

/// Weight of a single edge or a sum of edge weights.
pub type EdgeWeight = i64;

/// Values carried through byte-oriented exchanges.
///
/// Payloads travel as little-endian `u64` words; this trait pins the
/// conversion for every type the halo and collective layers may ship.
pub trait WireValue: Copy + Send + Sync + 'static {
    fn to_wire(self) -> u64;
    fn from_wire(w: u64) -> Self;
}

impl WireValue for u64 {
    #[inline]
    fn to_wire(self) -> u64 {
        self
    }
    #[inline]
    fn from_wire(w: u64) -> Self {
        w
    }
}

impl WireValue for i64 {
    #[inline]
    fn to_wire(self) -> u64 {
        self as u64
    }
    #[inline]
    fn from_wire(w: u64) -> Self {
        w as i64
    }
}

impl WireValue for u32 {
    #[inline]
    fn to_wire(self) -> u64 {
        self as u64
    }
    #[inline]
    fn from_wire(w: u64) -> Self {
        w as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_roundtrip_signed() {
        let w = (-7i64).to_wire();
        assert_eq!(i64::from_wire(w), -7);
    }

    #[test]
    fn wire_roundtrip_unsigned() {
        assert_eq!(u64::from_wire(42u64.to_wire()), 42);
        assert_eq!(u32::from_wire(7u32.to_wire()), 7);
    }
}
