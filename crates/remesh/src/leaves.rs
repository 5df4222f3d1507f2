//! Leaf membership: which spatial-hierarchy leaf owns each face and vertex.
//!
//! The hierarchy itself (construction, ray queries, splitting policy) lives
//! behind the [`crate::hierarchy::Hierarchy`] trait; this module only keeps
//! the membership sets, the owner side tables and the per-leaf dirty flags
//! consistent while topology changes underneath them.
//!
//! Ownership rules: every face has exactly one owning leaf (or none during
//! transient windows); every vertex has at most one owner, and a consistent
//! owner holds at least one face incident to the vertex. Membership sets are
//! ordered so parallel scans see a deterministic iteration order.

use std::collections::BTreeSet;

use glam::Vec3;
use tracing::warn;

use topomesh::{FaceId, Mesh, VertId};

/// Index of a leaf in the hierarchy's leaf array. Stored as a small integer
/// rather than a reference so leaves can be relocated freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LeafId(pub u32);

impl LeafId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Per-leaf dirty bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LeafFlags(pub u16);

impl LeafFlags {
    pub const REDRAW: u16 = 1 << 0;
    pub const UPDATE_BB: u16 = 1 << 1;
    pub const UPDATE_NORMALS: u16 = 1 << 2;
    pub const UPDATE_TRIS: u16 = 1 << 3;
    pub const UPDATE_OTHER_VERTS: u16 = 1 << 4;
    /// Leaf is flagged for the next topology update; the driver clears it.
    pub const UPDATE_TOPOLOGY: u16 = 1 << 5;
    /// Vertex ownership in this leaf needs a rebuild by the hierarchy.
    pub const REBUILD_NODE_VERTS: u16 = 1 << 6;
    pub const FULLY_HIDDEN: u16 = 1 << 7;

    /// The usual "geometry changed under this leaf" set.
    pub const UPDATE_ALL: u16 = Self::REDRAW
        | Self::UPDATE_BB
        | Self::UPDATE_NORMALS
        | Self::UPDATE_TRIS
        | Self::UPDATE_OTHER_VERTS;

    #[inline]
    pub fn contains(self, bits: u16) -> bool {
        self.0 & bits != 0
    }

    #[inline]
    pub fn insert(&mut self, bits: u16) {
        self.0 |= bits;
    }

    #[inline]
    pub fn remove(&mut self, bits: u16) {
        self.0 &= !bits;
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::MAX),
            max: Vec3::splat(f32::MIN),
        }
    }

    pub fn include_point(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn longest_axis(&self) -> usize {
        let size = self.size();
        if size.x >= size.y && size.x >= size.z {
            0
        } else if size.y >= size.z {
            1
        } else {
            2
        }
    }
}

/// A leaf node's membership record.
#[derive(Debug, Clone)]
pub struct Leaf {
    /// Vertices uniquely owned by this leaf.
    pub verts: BTreeSet<VertId>,
    /// Faces owned by this leaf.
    pub faces: BTreeSet<FaceId>,
    pub flags: LeafFlags,
    pub bounds: Aabb,
}

impl Leaf {
    fn new(bounds: Aabb) -> Self {
        Self {
            verts: BTreeSet::new(),
            faces: BTreeSet::new(),
            flags: LeafFlags::default(),
            bounds,
        }
    }
}

/// All leaves plus the face→leaf and vertex→leaf side tables.
#[derive(Debug, Clone)]
pub struct Leaves {
    leaves: Vec<Leaf>,
    vert_owner: Vec<Option<LeafId>>,
    face_owner: Vec<Option<LeafId>>,
    /// A leaf holding more faces than this should be split by the hierarchy.
    pub leaf_limit: usize,
}

impl Leaves {
    pub fn new(leaf_limit: usize) -> Self {
        Self {
            leaves: Vec::new(),
            vert_owner: Vec::new(),
            face_owner: Vec::new(),
            leaf_limit,
        }
    }

    pub fn create_leaf(&mut self, bounds: Aabb) -> LeafId {
        self.leaves.push(Leaf::new(bounds));
        LeafId(self.leaves.len() as u32 - 1)
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub fn leaf(&self, id: LeafId) -> Option<&Leaf> {
        self.leaves.get(id.index())
    }

    pub fn leaf_mut(&mut self, id: LeafId) -> Option<&mut Leaf> {
        self.leaves.get_mut(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = (LeafId, &Leaf)> {
        self.leaves
            .iter()
            .enumerate()
            .map(|(i, l)| (LeafId(i as u32), l))
    }

    pub fn vert_owner(&self, v: VertId) -> Option<LeafId> {
        self.vert_owner.get(v.index()).copied().flatten()
    }

    pub fn face_owner(&self, f: FaceId) -> Option<LeafId> {
        self.face_owner.get(f.index()).copied().flatten()
    }

    fn set_vert_owner(&mut self, v: VertId, owner: Option<LeafId>) {
        if v.index() >= self.vert_owner.len() {
            self.vert_owner.resize(v.index() + 1, None);
        }
        self.vert_owner[v.index()] = owner;
    }

    fn set_face_owner(&mut self, f: FaceId, owner: Option<LeafId>) {
        if f.index() >= self.face_owner.len() {
            self.face_owner.resize(f.index() + 1, None);
        }
        self.face_owner[f.index()] = owner;
    }

    pub fn mark_dirty(&mut self, leaf: LeafId, bits: u16) {
        if let Some(l) = self.leaf_mut(leaf) {
            l.flags.insert(bits);
        }
    }

    /// Flag every leaf for the next topology update (host/test convenience).
    pub fn mark_all_topology(&mut self) {
        for leaf in &mut self.leaves {
            leaf.flags.insert(LeafFlags::UPDATE_TOPOLOGY);
        }
    }

    // ========================================================================
    // Membership operations
    // ========================================================================

    /// Register `f` with `leaf` and update the side table.
    pub fn add_face_to_leaf(&mut self, leaf: LeafId, f: FaceId) {
        if let Some(l) = self.leaf_mut(leaf) {
            l.faces.insert(f);
            l.flags.insert(
                LeafFlags::REDRAW
                    | LeafFlags::UPDATE_NORMALS
                    | LeafFlags::UPDATE_TRIS
                    | LeafFlags::UPDATE_OTHER_VERTS,
            );
        }
        self.set_face_owner(f, Some(leaf));
    }

    /// Register `v` as uniquely owned by `leaf`.
    pub fn add_unique_vert(&mut self, leaf: LeafId, v: VertId) {
        if let Some(l) = self.leaf_mut(leaf) {
            l.verts.insert(v);
            l.flags.insert(
                LeafFlags::REDRAW
                    | LeafFlags::UPDATE_BB
                    | LeafFlags::UPDATE_TRIS
                    | LeafFlags::UPDATE_OTHER_VERTS,
            );
        }
        self.set_vert_owner(v, Some(leaf));
    }

    /// Number of `leaf`'s faces using `v`, counting no higher than `cap`.
    pub fn node_vert_use_count_at_most(
        &self,
        mesh: &Mesh,
        leaf: LeafId,
        v: VertId,
        cap: usize,
    ) -> usize {
        let mut count = 0;
        for f in mesh.vert_faces(v) {
            if self.face_owner(f) == Some(leaf) {
                count += 1;
                if count >= cap {
                    return count;
                }
            }
        }
        count
    }

    /// A leaf other than `v`'s current owner that holds a face incident to
    /// `v`, if any.
    pub fn vert_other_leaf_find(&self, mesh: &Mesh, v: VertId) -> Option<LeafId> {
        let current = self.vert_owner(v);
        for f in mesh.vert_faces(v) {
            let owner = self.face_owner(f);
            if owner.is_some() && owner != current {
                return owner;
            }
        }
        None
    }

    /// Move unique ownership of `v` to `new_leaf`, dirtying both leaves.
    pub fn vert_ownership_transfer(&mut self, v: VertId, new_leaf: LeafId) {
        if let Some(current) = self.vert_owner(v) {
            if current == new_leaf {
                return;
            }
            if let Some(l) = self.leaf_mut(current) {
                l.verts.remove(&v);
                l.flags.insert(LeafFlags::REDRAW | LeafFlags::UPDATE_BB);
            }
        }
        self.add_unique_vert(new_leaf, v);
        self.mark_dirty(
            new_leaf,
            LeafFlags::REDRAW | LeafFlags::UPDATE_BB | LeafFlags::UPDATE_OTHER_VERTS,
        );
    }

    /// Drop `v` from its owner and mark every leaf holding an incident face
    /// dirty.
    pub fn vert_remove(&mut self, mesh: &Mesh, v: VertId) {
        const UPDATE: u16 = LeafFlags::UPDATE_ALL;

        if let Some(owner) = self.vert_owner(v) {
            if let Some(l) = self.leaf_mut(owner) {
                l.verts.remove(&v);
                l.flags.insert(UPDATE);
            }
        }
        self.set_vert_owner(v, None);

        let mut prev: Option<LeafId> = None;
        for f in mesh.vert_faces(v) {
            let Some(owner) = self.face_owner(f) else {
                continue;
            };
            // Incident faces usually share a leaf; skip repeated marking.
            if prev != Some(owner) {
                prev = Some(owner);
                self.mark_dirty(owner, UPDATE);
            }
        }
    }

    /// Drop `f` from its owning leaf.
    ///
    /// With `check_verts`, corner vertices about to lose their last face in
    /// that leaf are transferred to another leaf that still uses them; when
    /// no such leaf exists and `ensure_transfer` is set, the vertex loses its
    /// owner and the leaf is flagged for a vertex rebuild.
    pub fn face_membership_remove(
        &mut self,
        mesh: &Mesh,
        f: FaceId,
        check_verts: bool,
        ensure_transfer: bool,
    ) {
        let Some(leaf) = self.face_owner(f) else {
            warn!(?f, "face membership remove on unowned face");
            return;
        };

        if check_verts {
            for v in mesh.face_verts(f) {
                if self.node_vert_use_count_at_most(mesh, leaf, v, 2) != 1 {
                    continue;
                }
                if self.vert_owner(v) != Some(leaf) {
                    continue;
                }
                if let Some(other) = self.vert_other_leaf_find(mesh, v) {
                    self.vert_ownership_transfer(v, other);
                } else if ensure_transfer && mesh.vert_faces(v).len() > 1 {
                    self.vert_remove(mesh, v);
                    self.mark_dirty(leaf, LeafFlags::REBUILD_NODE_VERTS);
                }
            }
        }

        if let Some(l) = self.leaf_mut(leaf) {
            l.faces.remove(&f);
            l.flags.insert(LeafFlags::UPDATE_ALL);
        }
        self.set_face_owner(f, None);
    }

    /// Re-own an ownerless vertex into any leaf holding one of its faces.
    pub fn vert_relink(&mut self, mesh: &Mesh, v: VertId) -> bool {
        debug_assert!(self.vert_owner(v).is_none());
        for f in mesh.vert_faces(v) {
            if let Some(leaf) = self.face_owner(f) {
                self.add_unique_vert(leaf, v);
                return true;
            }
        }
        false
    }

    /// Membership with every face and vertex in one leaf, flagged for
    /// topology update. Small hosts and tests start here and let
    /// `node_limit_ensure` grow the hierarchy.
    pub fn single_leaf_for_mesh(mesh: &Mesh, leaf_limit: usize) -> Self {
        let mut bounds = Aabb::empty();
        for (_, vert) in mesh.iter_verts() {
            bounds.include_point(vert.co.get());
        }
        let mut leaves = Self::new(leaf_limit);
        let root = leaves.create_leaf(bounds);
        for (f, _) in mesh.iter_faces() {
            leaves.add_face_to_leaf(root, f);
        }
        for (v, _) in mesh.iter_verts() {
            leaves.add_unique_vert(root, v);
        }
        leaves.mark_all_topology();
        leaves
    }

    /// Recompute a leaf's bounds from the geometry it owns.
    pub fn update_bounds(&mut self, mesh: &Mesh, leaf: LeafId) {
        let Some(l) = self.leaf(leaf) else {
            return;
        };
        let mut bounds = Aabb::empty();
        let mut any = false;
        for &f in &l.faces {
            for v in mesh.face_verts(f) {
                bounds.include_point(mesh.vert_co(v));
                any = true;
            }
        }
        if let Some(l) = self.leaf_mut(leaf) {
            if any {
                l.bounds = bounds;
            }
            l.flags.remove(LeafFlags::UPDATE_BB);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip() -> (Mesh, Vec<VertId>, Vec<FaceId>) {
        // Two triangles sharing an edge.
        let mut m = Mesh::new();
        let a = m.vert_create(Vec3::new(0.0, 0.0, 0.0), Vec3::Z, None);
        let b = m.vert_create(Vec3::new(1.0, 0.0, 0.0), Vec3::Z, None);
        let c = m.vert_create(Vec3::new(0.5, 1.0, 0.0), Vec3::Z, None);
        let d = m.vert_create(Vec3::new(1.5, 1.0, 0.0), Vec3::Z, None);
        let f0 = m.face_create(&[a, b, c], None, None).unwrap();
        let f1 = m.face_create(&[b, d, c], None, None).unwrap();
        (m, vec![a, b, c, d], vec![f0, f1])
    }

    fn bounds() -> Aabb {
        Aabb::new(Vec3::splat(-10.0), Vec3::splat(10.0))
    }

    #[test]
    fn test_membership_basics() {
        let (m, verts, faces) = strip();
        let mut leaves = Leaves::new(100);
        let l0 = leaves.create_leaf(bounds());
        let l1 = leaves.create_leaf(bounds());

        leaves.add_face_to_leaf(l0, faces[0]);
        leaves.add_face_to_leaf(l1, faces[1]);
        for &v in &verts[..3] {
            leaves.add_unique_vert(l0, v);
        }
        leaves.add_unique_vert(l1, verts[3]);

        assert_eq!(leaves.face_owner(faces[0]), Some(l0));
        assert_eq!(leaves.vert_owner(verts[3]), Some(l1));
        assert_eq!(leaves.node_vert_use_count_at_most(&m, l0, verts[1], 8), 1);
        assert_eq!(leaves.vert_other_leaf_find(&m, verts[1]), Some(l1));
        assert_eq!(leaves.vert_other_leaf_find(&m, verts[0]), None);
    }

    #[test]
    fn test_face_remove_transfers_verts() {
        let (m, verts, faces) = strip();
        let mut leaves = Leaves::new(100);
        let l0 = leaves.create_leaf(bounds());
        let l1 = leaves.create_leaf(bounds());
        leaves.add_face_to_leaf(l0, faces[0]);
        leaves.add_face_to_leaf(l1, faces[1]);
        for &v in &verts[..3] {
            leaves.add_unique_vert(l0, v);
        }
        leaves.add_unique_vert(l1, verts[3]);

        // Removing f0 from l0 leaves b and c with no face in l0; both have a
        // face in l1 and must transfer. a has no other leaf and only one
        // face, so it keeps its (now inconsistent-tolerated) owner.
        leaves.face_membership_remove(&m, faces[0], true, true);
        assert_eq!(leaves.vert_owner(verts[1]), Some(l1));
        assert_eq!(leaves.vert_owner(verts[2]), Some(l1));
        assert_eq!(leaves.vert_owner(verts[0]), Some(l0));
        assert_eq!(leaves.face_owner(faces[0]), None);
    }

    #[test]
    fn test_vert_remove_clears_owner() {
        let (m, verts, faces) = strip();
        let mut leaves = Leaves::new(100);
        let l0 = leaves.create_leaf(bounds());
        leaves.add_face_to_leaf(l0, faces[0]);
        leaves.add_face_to_leaf(l0, faces[1]);
        leaves.add_unique_vert(l0, verts[0]);

        leaves.vert_remove(&m, verts[0]);
        assert_eq!(leaves.vert_owner(verts[0]), None);
        assert!(leaves.leaf(l0).unwrap().flags.contains(LeafFlags::REDRAW));
    }

    #[test]
    fn test_longest_axis() {
        let b = Aabb::new(Vec3::ZERO, Vec3::new(1.0, 3.0, 2.0));
        assert_eq!(b.longest_axis(), 1);
    }
}
