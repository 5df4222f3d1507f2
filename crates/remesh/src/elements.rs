//! Element management shared by the remeshing passes: creation and removal
//! wrappers that keep the undo log, the annotation table and the leaf
//! membership in step with every structural change.

use std::collections::HashSet;

use tracing::warn;

use topomesh::{triangulate_face, EdgeId, FaceId, HeadFlags, VertId};

use crate::annotate::AnnoFlags;
use crate::config::MaskFn;
use crate::driver::Remesher;
use crate::leaves::{LeafFlags, LeafId};

/// Mask value of a single vertex; 1 without a callback.
#[inline]
pub(crate) fn vert_mask(mask: Option<MaskFn<'_>>, v: VertId) -> f32 {
    match mask {
        Some(cb) => cb(v),
        None => 1.0,
    }
}

/// Edge mask weight: the endpoint average.
#[inline]
pub(crate) fn edge_mask_weight(mask: Option<MaskFn<'_>>, v1: VertId, v2: VertId) -> f32 {
    match mask {
        Some(cb) => 0.5 * (cb(v1) + cb(v2)),
        None => 1.0,
    }
}

const NEEDS_ALL: u16 =
    AnnoFlags::NEEDS_VALENCE | AnnoFlags::NEEDS_BOUNDARY | AnnoFlags::NEEDS_DISK_SORT;

impl Remesher<'_> {
    /// Existing edge between the vertices, or a new one with the example's
    /// head-flags, logged as added.
    pub(crate) fn edge_create_log(
        &mut self,
        v1: VertId,
        v2: VertId,
        example: Option<EdgeId>,
    ) -> EdgeId {
        let (e, created) = self.mesh.edge_get_or_create(v1, v2, example);
        if created {
            self.log.edge_added(self.mesh, e);
        }
        e
    }

    pub(crate) fn edges_from_tri(&mut self, v_tri: [VertId; 3]) -> [EdgeId; 3] {
        [
            self.edge_create_log(v_tri[0], v_tri[1], None),
            self.edge_create_log(v_tri[1], v_tri[2], None),
            self.edge_create_log(v_tri[2], v_tri[0], None),
        ]
    }

    /// Like [`Remesher::edges_from_tri`], but each created edge copies flags
    /// and attributes from the matching example edge.
    pub(crate) fn edges_from_tri_example(
        &mut self,
        v_tri: [VertId; 3],
        examples: [EdgeId; 3],
    ) -> [EdgeId; 3] {
        [
            self.edge_create_log(v_tri[0], v_tri[1], Some(examples[0])),
            self.edge_create_log(v_tri[1], v_tri[2], Some(examples[1])),
            self.edge_create_log(v_tri[2], v_tri[0], Some(examples[2])),
        ]
    }

    /// Create a vertex owned by `leaf`, with annotation and log records.
    pub(crate) fn vert_create_in_leaf(
        &mut self,
        leaf: LeafId,
        co: glam::Vec3,
        no: glam::Vec3,
        example: Option<VertId>,
    ) -> VertId {
        let v = self.mesh.vert_create(co, no, example);

        match example {
            Some(ex) => {
                let mut rec = self.anno.get(ex);
                rec.flags.insert(NEEDS_ALL);
                *self.anno.get_mut(v) = rec;
            }
            None => self.anno.mark_new(v, co, no, self.stroke_id),
        }

        self.leaves.add_unique_vert(leaf, v);
        self.leaves.mark_dirty(
            leaf,
            LeafFlags::REDRAW | LeafFlags::UPDATE_BB | LeafFlags::UPDATE_TRIS
                | LeafFlags::UPDATE_OTHER_VERTS,
        );
        self.log.vert_added(self.mesh, v);
        v
    }

    /// Create a triangle owned by `leaf`. Corner vertices get their needs
    /// bits set; with `ensure_verts`, ownerless corners are adopted by the
    /// leaf. Returns `None` (with a diagnostic) for degenerate input.
    pub(crate) fn face_create_in_leaf(
        &mut self,
        leaf: LeafId,
        v_tri: [VertId; 3],
        e_tri: Option<[EdgeId; 3]>,
        example: Option<FaceId>,
        ensure_verts: bool,
        log_face: bool,
    ) -> Option<FaceId> {
        debug_assert!(self.mesh.face_exists(v_tri).is_none());

        let edges = e_tri.unwrap_or_else(|| [
            self.edge_create_log(v_tri[0], v_tri[1], None),
            self.edge_create_log(v_tri[1], v_tri[2], None),
            self.edge_create_log(v_tri[2], v_tri[0], None),
        ]);
        let f = match self.mesh.face_create(&v_tri, Some(&edges), example) {
            Ok(f) => f,
            Err(err) => {
                warn!(?v_tri, %err, "face creation rejected");
                return None;
            }
        };

        self.leaves.add_face_to_leaf(leaf, f);
        if let Some(l) = self.leaves.leaf_mut(leaf) {
            l.flags.remove(LeafFlags::FULLY_HIDDEN);
        }

        if log_face {
            self.log.face_added(self.mesh, f);
        }

        for &v in &v_tri {
            if ensure_verts && self.leaves.vert_owner(v).is_none() {
                self.leaves.add_unique_vert(leaf, v);
            }
            self.anno.add_flags(v, NEEDS_ALL);
        }
        Some(f)
    }

    /// Remove `f` from its leaf, logging it first. See
    /// [`crate::leaves::Leaves::face_membership_remove`] for the corner
    /// vertex ownership rules.
    pub(crate) fn face_remove(
        &mut self,
        f: FaceId,
        log_face: bool,
        check_verts: bool,
        ensure_transfer: bool,
    ) {
        match self.leaves.face_owner(f) {
            None => {
                warn!(?f, "face remove on unowned face");
                return;
            }
            Some(leaf) if self.leaves.leaf(leaf).is_none() => {
                // Corrupted side table; abort the running phase.
                tracing::error!(?f, leaf = leaf.0, "face references a leaf outside the hierarchy");
                self.corrupt = true;
                return;
            }
            Some(_) => {}
        }
        if log_face {
            self.log.face_removed(self.mesh, f);
        }
        self.leaves
            .face_membership_remove(self.mesh, f, check_verts, ensure_transfer);
    }

    /// Place `f` into a leaf: adopt a radial neighbour's leaf when allowed,
    /// otherwise fall back to the hierarchy's tree walk.
    pub(crate) fn face_add(&mut self, f: FaceId, log_face: bool, force_tree_walk: bool) {
        if force_tree_walk {
            self.hierarchy.insert_face(self.mesh, self.leaves, f);
            if log_face {
                self.log.face_added(self.mesh, f);
            }
            return;
        }

        let mut adopted = None;
        for l in self.mesh.face_loops(f) {
            let Some(radial) = self
                .mesh
                .loop_ref(l)
                .and_then(|ll| self.mesh.loop_ref(ll.radial_next))
            else {
                continue;
            };
            if radial.f == f {
                continue;
            }
            if let Some(leaf) = self.leaves.face_owner(radial.f) {
                adopted = Some(leaf);
                break;
            }
        }

        match adopted {
            Some(leaf) => {
                let mesh = &*self.mesh;
                self.hierarchy.insert_face_finalize(mesh, self.leaves, f, leaf);
            }
            None => {
                self.hierarchy.insert_face(self.mesh, self.leaves, f);
            }
        }
        if log_face {
            self.log.face_added(self.mesh, f);
        }
    }

    /// Remove `v` from its leaf and log the removal.
    pub(crate) fn vert_remove_log(&mut self, v: VertId, log_vert: bool) {
        self.leaves.vert_remove(self.mesh, v);
        if log_vert {
            self.log.vert_removed(self.mesh, v);
        }
    }

    /// Kill `v`, logging every incident edge as removed and then the vertex
    /// itself, in that order; reverse replay then restores the vertex before
    /// any edge that needs it. Remaining incident faces die with the vertex;
    /// callers log those before getting here.
    pub(crate) fn kill_vert(&mut self, v: VertId, log_vert: bool) {
        for e in self.mesh.vert_edges(v) {
            self.log.edge_removed(self.mesh, e);
        }
        if log_vert {
            self.log.vert_removed(self.mesh, v);
        }
        self.mesh.vert_kill(v);
    }

    /// Make sure `f` is a triangle, re-triangulating n-gons in place.
    /// Returns whether the face was already a triangle.
    pub(crate) fn ensure_face_is_tri(&mut self, f: FaceId) -> bool {
        let len = match self.mesh.face(f) {
            Some(face) => face.len,
            None => return false,
        };
        if len == 3 {
            return true;
        }
        if len < 3 {
            warn!(?f, len, "degenerate face dropped");
            self.face_remove(f, false, true, true);
            self.mesh.face_kill(f);
            return false;
        }

        let pre_edges: HashSet<EdgeId> = self
            .mesh
            .face_loops(f)
            .iter()
            .filter_map(|&l| self.mesh.loop_ref(l).map(|ll| ll.e))
            .collect();

        self.face_remove(f, true, true, true);

        let new_faces = match triangulate_face(self.mesh, f, true) {
            Ok(fs) => fs,
            Err(err) => {
                warn!(?f, %err, "triangulation failed");
                return false;
            }
        };

        for nf in new_faces.iter().copied().chain(std::iter::once(f)) {
            for l in self.mesh.face_loops(nf) {
                if let Some(e) = self.mesh.loop_ref(l).map(|ll| ll.e) {
                    if !pre_edges.contains(&e) {
                        self.log.edge_added(self.mesh, e);
                    }
                }
            }
            self.face_add(nf, true, true);
        }
        false
    }

    /// Triangulate every face around `v` if its fan is flagged as needing it.
    pub(crate) fn check_vert_fan_tris(&mut self, v: VertId) {
        if !self
            .anno
            .flags(v)
            .contains(AnnoFlags::NEEDS_TRIANGULATE)
        {
            return;
        }

        let faces = self.mesh.vert_faces(v);
        for &f in &faces {
            for w in self.mesh.face_verts(f) {
                self.anno.add_flags(
                    w,
                    AnnoFlags::NEEDS_BOUNDARY
                        | AnnoFlags::NEEDS_VALENCE
                        | AnnoFlags::NEEDS_DISK_SORT,
                );
            }
        }
        self.anno.clear_flags(v, AnnoFlags::NEEDS_TRIANGULATE);

        for &f in &faces {
            self.ensure_face_is_tri(f);
        }
    }

    /// Queue `v` for the valence cleanup pass, once per call.
    pub(crate) fn watchlist_push(&mut self, watchlist: &mut Vec<VertId>, v: VertId) {
        if self.anno.flags(v).contains(AnnoFlags::VALENCE_SCRATCH) {
            return;
        }
        self.anno.add_flags(v, AnnoFlags::VALENCE_SCRATCH);
        watchlist.push(v);
    }

    /// OR together the visible head-flag bits of two vertices, used when a
    /// new vertex inherits the marks of the edge it was split out of.
    pub(crate) fn merged_vert_flags(&self, v1: VertId, v2: VertId) -> u8 {
        let f1 = self.mesh.vert(v1).map(|v| v.flags).unwrap_or_default();
        let f2 = self.mesh.vert(v2).map(|v| v.flags).unwrap_or_default();
        HeadFlags(f1.0 | f2.0).visible_bits()
    }
}
