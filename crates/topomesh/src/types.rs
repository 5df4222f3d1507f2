//! Type definitions for the topological mesh kernel.

use std::sync::atomic::{AtomicU32, Ordering};

use glam::Vec3;

use crate::attr::AttrBlock;

/// Type-safe vertex identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct VertId(pub u32);

/// Type-safe edge identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct EdgeId(pub u32);

/// Type-safe face identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct FaceId(pub u32);

/// Type-safe loop (face corner) identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct LoopId(pub u32);

impl VertId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl EdgeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl FaceId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl LoopId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Element head-flags shared by vertices, edges and faces.
///
/// The low bits are user-visible state, the two top bits are scratch tags
/// reserved for bulk operations. Scratch tags are cleared by whoever sets
/// them and are never meaningful across public API calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct HeadFlags(pub u8);

impl HeadFlags {
    pub const HIDDEN: u8 = 1 << 0;
    pub const SEAM: u8 = 1 << 1;
    pub const SHARP: u8 = 1 << 2;
    pub const SELECT: u8 = 1 << 3;
    /// Scratch tag used by bulk passes.
    pub const TAG: u8 = 1 << 6;
    /// Second scratch tag, for passes that need two independent marks.
    pub const TAG_ALT: u8 = 1 << 7;

    #[inline]
    pub fn contains(self, bits: u8) -> bool {
        self.0 & bits != 0
    }

    #[inline]
    pub fn insert(&mut self, bits: u8) {
        self.0 |= bits;
    }

    #[inline]
    pub fn remove(&mut self, bits: u8) {
        self.0 &= !bits;
    }

    /// All bits except the hidden bit; used when flags propagate onto
    /// neighbouring elements during merges and splits.
    #[inline]
    pub fn visible_bits(self) -> u8 {
        self.0 & !Self::HIDDEN
    }
}

/// A vertex position stored as three bit-packed atomic floats.
///
/// Scan workers relax positions concurrently while the rest of the mesh is
/// behind a shared reference; each component is committed with a single
/// compare-and-swap attempt and a lost race simply drops that component's
/// update.
#[derive(Debug, Default)]
pub struct AtomicPoint([AtomicU32; 3]);

impl AtomicPoint {
    pub fn new(p: Vec3) -> Self {
        Self([
            AtomicU32::new(p.x.to_bits()),
            AtomicU32::new(p.y.to_bits()),
            AtomicU32::new(p.z.to_bits()),
        ])
    }

    #[inline]
    pub fn get(&self) -> Vec3 {
        Vec3::new(
            f32::from_bits(self.0[0].load(Ordering::Relaxed)),
            f32::from_bits(self.0[1].load(Ordering::Relaxed)),
            f32::from_bits(self.0[2].load(Ordering::Relaxed)),
        )
    }

    #[inline]
    pub fn set(&self, p: Vec3) {
        self.0[0].store(p.x.to_bits(), Ordering::Relaxed);
        self.0[1].store(p.y.to_bits(), Ordering::Relaxed);
        self.0[2].store(p.z.to_bits(), Ordering::Relaxed);
    }

    /// Add `delta` component-wise, one compare-and-swap attempt per
    /// component; a lost race drops that component's update.
    pub fn cas_add(&self, delta: Vec3) {
        for (slot, d) in self.0.iter().zip([delta.x, delta.y, delta.z]) {
            let cur = slot.load(Ordering::Relaxed);
            let new = (f32::from_bits(cur) + d).to_bits();
            let _ = slot.compare_exchange(cur, new, Ordering::Relaxed, Ordering::Relaxed);
        }
    }
}

impl Clone for AtomicPoint {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

/// Doubly linked disk-cycle node; one per edge endpoint.
#[derive(Debug, Clone, Copy)]
pub struct DiskLink {
    pub prev: EdgeId,
    pub next: EdgeId,
}

/// A vertex in the mesh.
#[derive(Debug, Clone)]
pub struct Vertex {
    pub co: AtomicPoint,
    pub no: Vec3,
    /// One edge of this vertex's disk cycle (arbitrary choice if multiple).
    pub edge: Option<EdgeId>,
    pub flags: HeadFlags,
    pub attr: AttrBlock,
}

/// An edge in the mesh.
///
/// Edges carry one disk-cycle link per endpoint (the doubly linked list of
/// edges around that endpoint) and a pointer to one incident loop. An edge
/// with no loop is a wire edge.
#[derive(Debug, Clone)]
pub struct Edge {
    pub v1: VertId,
    pub v2: VertId,
    pub(crate) d1: DiskLink,
    pub(crate) d2: DiskLink,
    pub l: Option<LoopId>,
    pub flags: HeadFlags,
    pub attr: AttrBlock,
}

impl Edge {
    /// The endpoint of this edge that is not `v`.
    #[inline]
    pub fn other_vert(&self, v: VertId) -> VertId {
        if v == self.v1 {
            self.v2
        } else {
            self.v1
        }
    }

    #[inline]
    pub fn has_vert(&self, v: VertId) -> bool {
        self.v1 == v || self.v2 == v
    }

    #[inline]
    pub fn disk(&self, v: VertId) -> &DiskLink {
        if v == self.v1 {
            &self.d1
        } else {
            &self.d2
        }
    }

    #[inline]
    pub(crate) fn disk_mut(&mut self, v: VertId) -> &mut DiskLink {
        if v == self.v1 {
            &mut self.d1
        } else {
            &mut self.d2
        }
    }
}

/// A face in the mesh. Always a triangle once triangulation has run, but the
/// kernel tolerates larger polygons so splits can grow faces transiently.
#[derive(Debug, Clone)]
pub struct Face {
    pub len: u32,
    pub l_first: LoopId,
    pub mat: u16,
    pub no: Vec3,
    pub flags: HeadFlags,
    pub attr: AttrBlock,
}

/// A face corner: pointers into the face cycle and the edge's radial cycle.
#[derive(Debug, Clone)]
pub struct Loop {
    pub v: VertId,
    pub e: EdgeId,
    pub f: FaceId,
    pub next: LoopId,
    pub prev: LoopId,
    pub radial_next: LoopId,
    pub radial_prev: LoopId,
    pub attr: AttrBlock,
}

/// Errors reported by mesh kernel operations.
#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    #[error("stale or invalid element id")]
    StaleId,
    #[error("face needs at least 3 vertices, got {0}")]
    FaceTooSmall(usize),
    #[error("face has repeated vertices")]
    DegenerateFace,
    #[error("cannot split a face along adjacent corners")]
    DegenerateSplit,
    #[error("slot already occupied during restore")]
    SlotOccupied,
    #[error("invalid mesh topology: {0}")]
    InvalidTopology(String),
}
