//! `DistPartError`: unified error type for the crate's public APIs.

use thiserror::Error;

use crate::types::GlobalNodeId;

/// Unified error type for distributed graph and contraction operations.
#[derive(Debug, Error)]
pub enum DistPartError {
    /// A global vertex ID that is neither owned by this process nor present
    /// in its ghost directory.
    #[error("global node {global} is neither owned nor a known ghost on this process")]
    UnknownGlobal { global: GlobalNodeId },

    /// The distribution vectors differ across processes.
    #[error("node/edge distribution vectors are inconsistent across processes")]
    InconsistentDistribution,

    /// A clustering array whose length matches neither `n` nor `total_n`.
    #[error("clustering has length {len}, expected {expected_n} (owned) or {expected_total} (with ghosts)")]
    InvalidClustering {
        len: usize,
        expected_n: usize,
        expected_total: usize,
    },

    /// Failure surfaced by the communication substrate.
    #[error("communication with rank {peer} failed: {what}")]
    Communication { peer: usize, what: String },

    /// I/O failure while reading a graph file.
    #[error("graph I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed graph file contents.
    #[error("parse error in line {line}: {what}")]
    Parse { line: usize, what: String },

    /// An internal invariant of a caller-supplied structure does not hold.
    /// Produced by the explicit validation routines; checked builds also
    /// back the same invariants with debug assertions.
    #[error("invariant violated: {0}")]
    InvariantViolated(String),
}

/// Crate-wide result alias.
pub type Result<T, E = DistPartError> = std::result::Result<T, E>;
