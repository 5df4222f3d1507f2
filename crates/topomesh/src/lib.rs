//! Topological triangle-mesh kernel.
//!
//! This crate provides the structural substrate for dynamic-topology
//! sculpting:
//!
//! - **Types**: slot-arena element ids, head-flags, atomic vertex positions
//! - **Mesh**: vertex/edge/face/loop storage with disk and radial cycles,
//!   create/kill operations and existence queries
//! - **Ops**: kernel edge split and face split
//! - **Attr**: opaque host-owned attribute blocks with interpolate/copy/swap
//! - **Triangulate**: n-gon triangulation with a beauty option for quads
//! - **Log**: undo/redo topology event log with reverse replay
//! - **Validate**: whole-mesh connectivity checking for tests
//!
//! # Connectivity model
//!
//! Rather than object-oriented iterators, the disk cycle around a vertex is
//! exposed as `first_edge(v)` / `disk_next(e, v)` so callers can write a
//! simple do-while walk; the loops around an edge are reached through
//! `loop.radial_next`. Wire edges (no loops) and boundaries (one loop) need
//! no special representation.

pub mod attr;
pub mod log;
pub mod mesh;
mod ops;
pub mod triangulate;
pub mod types;
pub mod validate;

pub use attr::AttrBlock;
pub use log::{LogEntry, LogEvent, MemoryLog, NullLog, TopologyLog};
pub use mesh::{triangle_normal, EdgeSplitResult, Mesh};
pub use triangulate::triangulate_face;
pub use types::{
    AtomicPoint, Edge, EdgeId, Face, FaceId, HeadFlags, Loop, LoopId, MeshError, Vertex, VertId,
};
pub use validate::validate;
