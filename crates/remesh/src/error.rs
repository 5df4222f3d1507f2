//! Engine error types.
//!
//! Almost everything that goes wrong mid-pass (stale queue entries, boundary
//! mismatches, seam-chain truncation) is ordinary control flow and never
//! surfaces as an error. What remains is the host-facing fallible surface
//! and the single fatal condition: a corrupted leaf-index side table.

use thiserror::Error;

/// Errors reported by the remeshing engine.
#[derive(Debug, Error)]
pub enum RemeshError {
    /// A face's owner index points outside the hierarchy. The engine aborts
    /// the running phase when it sees this; the membership tables need a
    /// rebuild before remeshing can continue.
    #[error("face references a leaf outside the hierarchy")]
    CorruptLeafIndex,

    /// A requested triangle had repeated vertices or already exists.
    #[error("degenerate or duplicate triangle rejected")]
    DegenerateFace,
}
