//! Mesh storage and structural operations.
//!
//! Elements live in slot arenas (`Vec<Option<T>>` plus a free list) addressed
//! by `u32` newtype ids. Freed slots may be reused by later allocations, but
//! a live id is never moved. Connectivity follows the radial-edge model:
//! every edge keeps a doubly linked disk cycle per endpoint and a radial
//! cycle of incident loops, so wire edges and boundaries fall out naturally.

use glam::Vec3;
use smallvec::SmallVec;

use crate::attr::{self, AttrBlock};
use crate::types::{
    AtomicPoint, DiskLink, Edge, EdgeId, Face, FaceId, HeadFlags, Loop, LoopId, MeshError, Vertex,
    VertId,
};

/// Triangle mesh with vertex/edge/face/loop connectivity.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub(crate) verts: Vec<Option<Vertex>>,
    pub(crate) edges: Vec<Option<Edge>>,
    pub(crate) faces: Vec<Option<Face>>,
    pub(crate) loops: Vec<Option<Loop>>,

    free_verts: Vec<u32>,
    free_edges: Vec<u32>,
    free_faces: Vec<u32>,
    free_loops: Vec<u32>,

    totvert: usize,
    totedge: usize,
    totface: usize,
}

/// Result of a kernel edge split.
#[derive(Debug, Clone, Copy)]
pub struct EdgeSplitResult {
    /// New vertex at the split parameter.
    pub new_vert: VertId,
    /// New edge running from the new vertex to the old second endpoint.
    pub new_edge: EdgeId,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn vert(&self, id: VertId) -> Option<&Vertex> {
        self.verts.get(id.index()).and_then(|s| s.as_ref())
    }

    pub fn vert_mut(&mut self, id: VertId) -> Option<&mut Vertex> {
        self.verts.get_mut(id.index()).and_then(|s| s.as_mut())
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.index()).and_then(|s| s.as_ref())
    }

    pub fn edge_mut(&mut self, id: EdgeId) -> Option<&mut Edge> {
        self.edges.get_mut(id.index()).and_then(|s| s.as_mut())
    }

    pub fn face(&self, id: FaceId) -> Option<&Face> {
        self.faces.get(id.index()).and_then(|s| s.as_ref())
    }

    pub fn face_mut(&mut self, id: FaceId) -> Option<&mut Face> {
        self.faces.get_mut(id.index()).and_then(|s| s.as_mut())
    }

    pub fn loop_ref(&self, id: LoopId) -> Option<&Loop> {
        self.loops.get(id.index()).and_then(|s| s.as_ref())
    }

    pub fn loop_mut(&mut self, id: LoopId) -> Option<&mut Loop> {
        self.loops.get_mut(id.index()).and_then(|s| s.as_mut())
    }

    pub fn vert_count(&self) -> usize {
        self.totvert
    }

    pub fn edge_count(&self) -> usize {
        self.totedge
    }

    pub fn face_count(&self) -> usize {
        self.totface
    }

    /// Slot capacity of the vertex arena; side tables size themselves on it.
    pub fn vert_slots(&self) -> usize {
        self.verts.len()
    }

    pub fn iter_verts(&self) -> impl Iterator<Item = (VertId, &Vertex)> {
        self.verts
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|v| (VertId(i as u32), v)))
    }

    pub fn iter_edges(&self) -> impl Iterator<Item = (EdgeId, &Edge)> {
        self.edges
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|e| (EdgeId(i as u32), e)))
    }

    pub fn iter_faces(&self) -> impl Iterator<Item = (FaceId, &Face)> {
        self.faces
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|f| (FaceId(i as u32), f)))
    }

    /// Vertex position shortcut; zero for a stale id.
    #[inline]
    pub fn vert_co(&self, v: VertId) -> Vec3 {
        self.vert(v).map(|vv| vv.co.get()).unwrap_or(Vec3::ZERO)
    }

    #[inline]
    pub fn vert_no(&self, v: VertId) -> Vec3 {
        self.vert(v).map(|vv| vv.no).unwrap_or(Vec3::Z)
    }

    // ========================================================================
    // Slot allocation
    // ========================================================================

    fn alloc_vert(&mut self, v: Vertex) -> VertId {
        self.totvert += 1;
        // Free-list entries can be stale after a restore re-occupied a slot.
        while let Some(i) = self.free_verts.pop() {
            if self.verts[i as usize].is_none() {
                self.verts[i as usize] = Some(v);
                return VertId(i);
            }
        }
        self.verts.push(Some(v));
        VertId(self.verts.len() as u32 - 1)
    }

    fn alloc_edge(&mut self, e: Edge) -> EdgeId {
        self.totedge += 1;
        while let Some(i) = self.free_edges.pop() {
            if self.edges[i as usize].is_none() {
                self.edges[i as usize] = Some(e);
                return EdgeId(i);
            }
        }
        self.edges.push(Some(e));
        EdgeId(self.edges.len() as u32 - 1)
    }

    pub(crate) fn alloc_face(&mut self, f: Face) -> FaceId {
        self.totface += 1;
        while let Some(i) = self.free_faces.pop() {
            if self.faces[i as usize].is_none() {
                self.faces[i as usize] = Some(f);
                return FaceId(i);
            }
        }
        self.faces.push(Some(f));
        FaceId(self.faces.len() as u32 - 1)
    }

    pub(crate) fn alloc_loop(&mut self, l: Loop) -> LoopId {
        while let Some(i) = self.free_loops.pop() {
            if self.loops[i as usize].is_none() {
                self.loops[i as usize] = Some(l);
                return LoopId(i);
            }
        }
        self.loops.push(Some(l));
        LoopId(self.loops.len() as u32 - 1)
    }

    // ========================================================================
    // Disk cycle (edges around a vertex)
    // ========================================================================

    /// First edge of `v`'s disk cycle, if any.
    #[inline]
    pub fn first_edge(&self, v: VertId) -> Option<EdgeId> {
        self.vert(v).and_then(|vv| vv.edge)
    }

    /// Disk-cycle successor of `e` around `v`.
    #[inline]
    pub fn disk_next(&self, e: EdgeId, v: VertId) -> Option<EdgeId> {
        self.edge(e).map(|ee| ee.disk(v).next)
    }

    #[inline]
    pub fn disk_prev(&self, e: EdgeId, v: VertId) -> Option<EdgeId> {
        self.edge(e).map(|ee| ee.disk(v).prev)
    }

    /// Edges incident to `v`, in disk-cycle order.
    pub fn vert_edges(&self, v: VertId) -> SmallVec<[EdgeId; 8]> {
        let mut out = SmallVec::new();
        let Some(first) = self.first_edge(v) else {
            return out;
        };
        let mut e = first;
        loop {
            out.push(e);
            let Some(next) = self.disk_next(e, v) else {
                break;
            };
            e = next;
            if e == first {
                break;
            }
        }
        out
    }

    /// Number of edges incident to `v`.
    pub fn vert_edge_count(&self, v: VertId) -> usize {
        self.vert_edges(v).len()
    }

    pub(crate) fn disk_append(&mut self, e: EdgeId, v: VertId) {
        match self.first_edge(v) {
            None => {
                if let Some(edge) = self.edge_mut(e) {
                    *edge.disk_mut(v) = DiskLink { prev: e, next: e };
                }
                if let Some(vert) = self.vert_mut(v) {
                    vert.edge = Some(e);
                }
            }
            Some(first) => {
                let Some(prev) = self.disk_prev(first, v) else {
                    return;
                };
                if let Some(edge) = self.edge_mut(e) {
                    *edge.disk_mut(v) = DiskLink { prev, next: first };
                }
                if let Some(pe) = self.edge_mut(prev) {
                    pe.disk_mut(v).next = e;
                }
                if let Some(fe) = self.edge_mut(first) {
                    fe.disk_mut(v).prev = e;
                }
            }
        }
    }

    pub(crate) fn disk_remove(&mut self, e: EdgeId, v: VertId) {
        let Some(edge) = self.edge(e) else {
            return;
        };
        let DiskLink { prev, next } = *edge.disk(v);

        if next == e {
            // Last edge on this vertex.
            if let Some(vert) = self.vert_mut(v) {
                vert.edge = None;
            }
            return;
        }
        if let Some(pe) = self.edge_mut(prev) {
            pe.disk_mut(v).next = next;
        }
        if let Some(ne) = self.edge_mut(next) {
            ne.disk_mut(v).prev = prev;
        }
        if self.first_edge(v) == Some(e) {
            if let Some(vert) = self.vert_mut(v) {
                vert.edge = Some(next);
            }
        }
    }

    // ========================================================================
    // Radial cycle (loops around an edge)
    // ========================================================================

    pub(crate) fn radial_append(&mut self, e: EdgeId, l: LoopId) {
        let head = self.edge(e).and_then(|ee| ee.l);
        match head {
            None => {
                if let Some(ll) = self.loop_mut(l) {
                    ll.radial_next = l;
                    ll.radial_prev = l;
                }
                if let Some(ee) = self.edge_mut(e) {
                    ee.l = Some(l);
                }
            }
            Some(first) => {
                let Some(prev) = self.loop_ref(first).map(|fl| fl.radial_prev) else {
                    return;
                };
                if let Some(ll) = self.loop_mut(l) {
                    ll.radial_prev = prev;
                    ll.radial_next = first;
                }
                if let Some(pl) = self.loop_mut(prev) {
                    pl.radial_next = l;
                }
                if let Some(fl) = self.loop_mut(first) {
                    fl.radial_prev = l;
                }
            }
        }
    }

    pub(crate) fn radial_remove(&mut self, e: EdgeId, l: LoopId) {
        let Some(ll) = self.loop_ref(l) else {
            return;
        };
        let (prev, next) = (ll.radial_prev, ll.radial_next);

        if next == l {
            if let Some(ee) = self.edge_mut(e) {
                ee.l = None;
            }
            return;
        }
        if let Some(pl) = self.loop_mut(prev) {
            pl.radial_next = next;
        }
        if let Some(nl) = self.loop_mut(next) {
            nl.radial_prev = prev;
        }
        if self.edge(e).and_then(|ee| ee.l) == Some(l) {
            if let Some(ee) = self.edge_mut(e) {
                ee.l = Some(next);
            }
        }
    }

    /// Number of loops in `e`'s radial cycle, counting at most `cap`.
    pub fn edge_loop_count_at_most(&self, e: EdgeId, cap: usize) -> usize {
        let Some(first) = self.edge(e).and_then(|ee| ee.l) else {
            return 0;
        };
        let mut n = 0;
        let mut l = first;
        loop {
            n += 1;
            if n >= cap {
                return n;
            }
            let Some(next) = self.loop_ref(l).map(|ll| ll.radial_next) else {
                return n;
            };
            l = next;
            if l == first {
                return n;
            }
        }
    }

    /// Fast path for the common manifold case: the two loops of an edge with
    /// exactly two incident loops.
    pub fn edge_loop_pair(&self, e: EdgeId) -> Option<(LoopId, LoopId)> {
        let first = self.edge(e)?.l?;
        let l = self.loop_ref(first)?;
        if l.radial_next == first {
            return None;
        }
        let second = l.radial_next;
        if self.loop_ref(second)?.radial_next != first {
            return None;
        }
        Some((first, second))
    }

    /// All loops in `e`'s radial cycle.
    pub fn edge_loops(&self, e: EdgeId) -> SmallVec<[LoopId; 4]> {
        let mut out = SmallVec::new();
        let Some(first) = self.edge(e).and_then(|ee| ee.l) else {
            return out;
        };
        let mut l = first;
        loop {
            out.push(l);
            let Some(next) = self.loop_ref(l).map(|ll| ll.radial_next) else {
                break;
            };
            l = next;
            if l == first {
                break;
            }
        }
        out
    }

    /// Corner loops at `v` (one per incident face corner), gathered by walking
    /// the disk cycle and each edge's radial cycle.
    pub fn vert_loops(&self, v: VertId) -> SmallVec<[LoopId; 8]> {
        let mut out = SmallVec::new();
        for e in self.vert_edges(v) {
            for l in self.edge_loops(e) {
                if self.loop_ref(l).map(|ll| ll.v) == Some(v) {
                    out.push(l);
                }
            }
        }
        out
    }

    /// Faces incident to `v`, deduplicated, in deterministic walk order.
    pub fn vert_faces(&self, v: VertId) -> SmallVec<[FaceId; 8]> {
        let mut out: SmallVec<[FaceId; 8]> = SmallVec::new();
        for l in self.vert_loops(v) {
            if let Some(f) = self.loop_ref(l).map(|ll| ll.f) {
                if !out.contains(&f) {
                    out.push(f);
                }
            }
        }
        out
    }

    /// Loops of a face, starting at `l_first`.
    pub fn face_loops(&self, f: FaceId) -> SmallVec<[LoopId; 4]> {
        let mut out = SmallVec::new();
        let Some(face) = self.face(f) else {
            return out;
        };
        let first = face.l_first;
        let mut l = first;
        loop {
            out.push(l);
            let Some(next) = self.loop_ref(l).map(|ll| ll.next) else {
                break;
            };
            l = next;
            if l == first {
                break;
            }
        }
        out
    }

    /// Vertices of a face in winding order.
    pub fn face_verts(&self, f: FaceId) -> SmallVec<[VertId; 4]> {
        self.face_loops(f)
            .iter()
            .filter_map(|&l| self.loop_ref(l).map(|ll| ll.v))
            .collect()
    }

    // ========================================================================
    // Existence queries
    // ========================================================================

    /// The edge connecting `v1` and `v2`, if one exists.
    pub fn edge_exists(&self, v1: VertId, v2: VertId) -> Option<EdgeId> {
        if v1 == v2 {
            return None;
        }
        let first = self.first_edge(v1)?;
        let mut e = first;
        loop {
            let ee = self.edge(e)?;
            if ee.other_vert(v1) == v2 {
                return Some(e);
            }
            e = ee.disk(v1).next;
            if e == first {
                return None;
            }
        }
    }

    /// A triangle using exactly these three vertices, at either winding.
    pub fn face_exists(&self, v_tri: [VertId; 3]) -> Option<FaceId> {
        let e = self.edge_exists(v_tri[0], v_tri[1])?;
        for l in self.edge_loops(e) {
            let Some(ll) = self.loop_ref(l) else {
                continue;
            };
            if self.face(ll.f).map(|f| f.len) != Some(3) {
                continue;
            }
            let verts = self.face_verts(ll.f);
            if verts.contains(&v_tri[2]) {
                return Some(ll.f);
            }
        }
        None
    }

    /// Triangle-specialized variant of [`Mesh::face_exists`] for when a loop
    /// on the shared edge and the opposite vertex are already known. Checks
    /// whether any other triangle in the loop's radial cycle closes against
    /// `v_opposite`; `l_radial_first`'s own face is never reported.
    pub fn face_exists_tri_from_loop_vert(
        &self,
        l_radial_first: LoopId,
        v_opposite: VertId,
    ) -> Option<FaceId> {
        let first = self.loop_ref(l_radial_first)?;
        if first.radial_next == l_radial_first {
            return None;
        }
        let mut l = first.radial_next;
        while l != l_radial_first {
            let ll = self.loop_ref(l)?;
            if self.loop_ref(ll.prev)?.v == v_opposite {
                return Some(ll.f);
            }
            l = ll.radial_next;
        }
        None
    }

    // ========================================================================
    // Element creation
    // ========================================================================

    /// Create an isolated vertex.
    pub fn vert_create(&mut self, co: Vec3, no: Vec3, example: Option<VertId>) -> VertId {
        let (flags, attr) = match example.and_then(|e| self.vert(e)) {
            Some(ex) => (ex.flags, ex.attr.clone()),
            None => (HeadFlags::default(), AttrBlock::default()),
        };
        self.alloc_vert(Vertex {
            co: AtomicPoint::new(co),
            no,
            edge: None,
            flags,
            attr,
        })
    }

    /// Create an edge between two distinct vertices. The caller must know no
    /// edge exists yet; use [`Mesh::edge_get_or_create`] otherwise.
    pub fn edge_create(&mut self, v1: VertId, v2: VertId, example: Option<EdgeId>) -> EdgeId {
        debug_assert!(v1 != v2);
        debug_assert!(self.edge_exists(v1, v2).is_none());

        let (flags, attr) = match example.and_then(|e| self.edge(e)) {
            Some(ex) => (ex.flags, ex.attr.clone()),
            None => (HeadFlags::default(), AttrBlock::default()),
        };
        let sentinel = DiskLink {
            prev: EdgeId(u32::MAX),
            next: EdgeId(u32::MAX),
        };
        let e = self.alloc_edge(Edge {
            v1,
            v2,
            d1: sentinel,
            d2: sentinel,
            l: None,
            flags,
            attr,
        });
        self.disk_append(e, v1);
        self.disk_append(e, v2);
        e
    }

    /// Existing edge between the two vertices, or a newly created one. A new
    /// edge also ORs in the example's head-flags, so seam and sharp marks
    /// survive re-wiring.
    pub fn edge_get_or_create(
        &mut self,
        v1: VertId,
        v2: VertId,
        example: Option<EdgeId>,
    ) -> (EdgeId, bool) {
        if let Some(e) = self.edge_exists(v1, v2) {
            return (e, false);
        }
        let e = self.edge_create(v1, v2, example);
        if let Some(ex_flags) = example.and_then(|x| self.edge(x)).map(|x| x.flags) {
            if let Some(edge) = self.edge_mut(e) {
                edge.flags.insert(ex_flags.0);
            }
        }
        (e, true)
    }

    /// Create a face over `verts`, using `edges` when supplied and looking
    /// edges up (or creating them) otherwise. Copies head-flags, material and
    /// the attribute block from `example`.
    pub fn face_create(
        &mut self,
        verts: &[VertId],
        edges: Option<&[EdgeId]>,
        example: Option<FaceId>,
    ) -> Result<FaceId, MeshError> {
        if verts.len() < 3 {
            return Err(MeshError::FaceTooSmall(verts.len()));
        }
        for i in 0..verts.len() {
            for j in (i + 1)..verts.len() {
                if verts[i] == verts[j] {
                    return Err(MeshError::DegenerateFace);
                }
            }
        }

        let mut e_cycle: SmallVec<[EdgeId; 4]> = SmallVec::new();
        match edges {
            Some(es) if es.len() == verts.len() => e_cycle.extend_from_slice(es),
            _ => {
                for i in 0..verts.len() {
                    let (e, _) =
                        self.edge_get_or_create(verts[i], verts[(i + 1) % verts.len()], None);
                    e_cycle.push(e);
                }
            }
        }

        let (flags, mat, attr) = match example.and_then(|x| self.face(x)) {
            Some(ex) => (ex.flags, ex.mat, ex.attr.clone()),
            None => (HeadFlags::default(), 0, AttrBlock::default()),
        };

        let f = self.alloc_face(Face {
            len: verts.len() as u32,
            l_first: LoopId(u32::MAX),
            mat,
            no: Vec3::ZERO,
            flags,
            attr,
        });

        // Build the loop cycle, then close it and hook up radial cycles.
        let mut l_ids: SmallVec<[LoopId; 4]> = SmallVec::new();
        for (i, &v) in verts.iter().enumerate() {
            let l = self.alloc_loop(Loop {
                v,
                e: e_cycle[i],
                f,
                next: LoopId(u32::MAX),
                prev: LoopId(u32::MAX),
                radial_next: LoopId(u32::MAX),
                radial_prev: LoopId(u32::MAX),
                attr: AttrBlock::default(),
            });
            l_ids.push(l);
        }
        let n = l_ids.len();
        for i in 0..n {
            if let Some(l) = self.loop_mut(l_ids[i]) {
                l.next = l_ids[(i + 1) % n];
                l.prev = l_ids[(i + n - 1) % n];
            }
            self.radial_append(e_cycle[i], l_ids[i]);
        }
        if let Some(face) = self.face_mut(f) {
            face.l_first = l_ids[0];
        }
        self.face_normal_update(f);
        Ok(f)
    }

    // ========================================================================
    // Element destruction
    // ========================================================================

    /// Unlink and free a face and its loops. Edges and vertices survive;
    /// edges left without loops become wire edges.
    pub fn face_kill(&mut self, f: FaceId) {
        let loops = self.face_loops(f);
        for &l in &loops {
            if let Some(e) = self.loop_ref(l).map(|ll| ll.e) {
                self.radial_remove(e, l);
            }
            self.loops[l.index()] = None;
            self.free_loops.push(l.0);
        }
        if self.faces[f.index()].take().is_some() {
            self.free_faces.push(f.0);
            self.totface -= 1;
        }
    }

    /// Unlink and free an edge. Incident faces are killed first, so callers
    /// that require a wire edge should assert that themselves.
    pub fn edge_kill(&mut self, e: EdgeId) {
        while let Some(l) = self.edge(e).and_then(|ee| ee.l) {
            let Some(f) = self.loop_ref(l).map(|ll| ll.f) else {
                break;
            };
            self.face_kill(f);
        }
        let Some((v1, v2)) = self.edge(e).map(|ee| (ee.v1, ee.v2)) else {
            return;
        };
        self.disk_remove(e, v1);
        self.disk_remove(e, v2);
        if self.edges[e.index()].take().is_some() {
            self.free_edges.push(e.0);
            self.totedge -= 1;
        }
    }

    /// Unlink and free a vertex, killing any remaining incident edges (and
    /// through them, faces) first.
    pub fn vert_kill(&mut self, v: VertId) {
        while let Some(e) = self.first_edge(v) {
            self.edge_kill(e);
        }
        if self.verts[v.index()].take().is_some() {
            self.free_verts.push(v.0);
            self.totvert -= 1;
        }
    }

    // ========================================================================
    // Normals
    // ========================================================================

    /// Recompute and cache the face normal.
    pub fn face_normal_update(&mut self, f: FaceId) {
        let verts = self.face_verts(f);
        if verts.len() < 3 {
            return;
        }
        let no = triangle_normal(
            self.vert_co(verts[0]),
            self.vert_co(verts[1]),
            self.vert_co(verts[2]),
        );
        if let Some(face) = self.face_mut(f) {
            face.no = no;
        }
    }

    // ========================================================================
    // Attribute helpers that need two mutable blocks
    // ========================================================================

    pub fn swap_edge_attrs(&mut self, a: EdgeId, b: EdgeId) {
        if a == b {
            return;
        }
        let mut block = match self.edge_mut(a) {
            Some(e) => std::mem::take(&mut e.attr),
            None => return,
        };
        if let Some(e) = self.edge_mut(b) {
            attr::swap(&mut block, &mut e.attr);
        }
        if let Some(e) = self.edge_mut(a) {
            e.attr = block;
        }
    }

    pub fn swap_loop_attrs(&mut self, a: LoopId, b: LoopId) {
        if a == b {
            return;
        }
        let mut block = match self.loop_mut(a) {
            Some(l) => std::mem::take(&mut l.attr),
            None => return,
        };
        if let Some(l) = self.loop_mut(b) {
            attr::swap(&mut block, &mut l.attr);
        }
        if let Some(l) = self.loop_mut(a) {
            l.attr = block;
        }
    }

    pub fn copy_loop_attr(&mut self, src: LoopId, dst: LoopId) {
        if src == dst {
            return;
        }
        let Some(block) = self.loop_ref(src).map(|l| l.attr.clone()) else {
            return;
        };
        if let Some(l) = self.loop_mut(dst) {
            l.attr = block;
        }
    }

    // ========================================================================
    // Restore-at-slot (undo-log support)
    // ========================================================================

    /// Re-create a vertex at a specific slot. Only the undo log should call
    /// this; allocation order makes the slot free during reverse replay.
    pub fn restore_vert_at(
        &mut self,
        v: VertId,
        co: Vec3,
        no: Vec3,
        flags: HeadFlags,
        attr: AttrBlock,
    ) -> Result<(), MeshError> {
        if v.index() >= self.verts.len() {
            self.verts.resize_with(v.index() + 1, || None);
        }
        if self.verts[v.index()].is_some() {
            return Err(MeshError::SlotOccupied);
        }
        self.verts[v.index()] = Some(Vertex {
            co: AtomicPoint::new(co),
            no,
            edge: None,
            flags,
            attr,
        });
        self.totvert += 1;
        Ok(())
    }

    /// Re-create an edge at a specific slot; both endpoints must be live.
    pub fn restore_edge_at(
        &mut self,
        e: EdgeId,
        v1: VertId,
        v2: VertId,
        flags: HeadFlags,
        attr: AttrBlock,
    ) -> Result<(), MeshError> {
        if e.index() >= self.edges.len() {
            self.edges.resize_with(e.index() + 1, || None);
        }
        if self.edges[e.index()].is_some() {
            return Err(MeshError::SlotOccupied);
        }
        if self.vert(v1).is_none() || self.vert(v2).is_none() {
            return Err(MeshError::StaleId);
        }
        let sentinel = DiskLink {
            prev: EdgeId(u32::MAX),
            next: EdgeId(u32::MAX),
        };
        self.edges[e.index()] = Some(Edge {
            v1,
            v2,
            d1: sentinel,
            d2: sentinel,
            l: None,
            flags,
            attr,
        });
        self.totedge += 1;
        self.disk_append(e, v1);
        self.disk_append(e, v2);
        Ok(())
    }

    /// Re-create a face at a specific slot over live vertices. Edges are
    /// looked up or re-created; loop attribute blocks are applied
    /// positionally when given.
    pub fn restore_face_at(
        &mut self,
        f: FaceId,
        verts: &[VertId],
        flags: HeadFlags,
        mat: u16,
        attr: AttrBlock,
        loop_attrs: &[AttrBlock],
    ) -> Result<(), MeshError> {
        if f.index() >= self.faces.len() {
            self.faces.resize_with(f.index() + 1, || None);
        }
        if self.faces[f.index()].is_some() {
            return Err(MeshError::SlotOccupied);
        }
        // Build through the ordinary path, then move the face into its slot.
        let tmp = self.face_create(verts, None, None)?;
        let mut face = match self.faces[tmp.index()].take() {
            Some(face) => face,
            None => return Err(MeshError::StaleId),
        };
        face.flags = flags;
        face.mat = mat;
        face.attr = attr;
        self.free_faces.push(tmp.0);

        let loops = {
            let first = face.l_first;
            let mut out: SmallVec<[LoopId; 4]> = SmallVec::new();
            let mut l = first;
            loop {
                out.push(l);
                let Some(next) = self.loop_ref(l).map(|ll| ll.next) else {
                    break;
                };
                l = next;
                if l == first {
                    break;
                }
            }
            out
        };
        for (&l, block) in loops.iter().zip(loop_attrs) {
            if let Some(ll) = self.loop_mut(l) {
                ll.attr = block.clone();
            }
            if let Some(ll) = self.loop_mut(l) {
                ll.f = f;
            }
        }
        for &l in loops.iter().skip(loop_attrs.len()) {
            if let Some(ll) = self.loop_mut(l) {
                ll.f = f;
            }
        }
        self.faces[f.index()] = Some(face);
        Ok(())
    }
}

/// Unnormalized-input-safe triangle normal.
pub fn triangle_normal(a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    (b - a).cross(c - a).normalize_or_zero()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tri_mesh() -> (Mesh, [VertId; 3], FaceId) {
        let mut m = Mesh::new();
        let a = m.vert_create(Vec3::new(0.0, 0.0, 0.0), Vec3::Z, None);
        let b = m.vert_create(Vec3::new(1.0, 0.0, 0.0), Vec3::Z, None);
        let c = m.vert_create(Vec3::new(0.0, 1.0, 0.0), Vec3::Z, None);
        let f = m.face_create(&[a, b, c], None, None).unwrap();
        (m, [a, b, c], f)
    }

    #[test]
    fn test_face_create_builds_cycles() {
        let (m, [a, b, c], f) = tri_mesh();
        assert_eq!(m.vert_count(), 3);
        assert_eq!(m.edge_count(), 3);
        assert_eq!(m.face_count(), 1);

        let verts = m.face_verts(f);
        assert_eq!(verts.as_slice(), &[a, b, c]);

        // Every face loop connects its vertex and the next one.
        for &l in &m.face_loops(f) {
            let ll = m.loop_ref(l).unwrap();
            let next_v = m.loop_ref(ll.next).unwrap().v;
            let e = m.edge(ll.e).unwrap();
            assert!(e.has_vert(ll.v) && e.has_vert(next_v));
        }

        assert_eq!(m.vert_edge_count(a), 2);
        assert!(m.edge_exists(a, b).is_some());
        assert!(m.edge_exists(b, a).is_some());
        assert!(m.edge_exists(a, a).is_none());
    }

    #[test]
    fn test_face_exists() {
        let (mut m, [a, b, c], f) = tri_mesh();
        assert_eq!(m.face_exists([a, b, c]), Some(f));
        assert_eq!(m.face_exists([c, a, b]), Some(f));

        let d = m.vert_create(Vec3::new(1.0, 1.0, 0.0), Vec3::Z, None);
        assert_eq!(m.face_exists([a, b, d]), None);
    }

    #[test]
    fn test_face_exists_tri_from_loop_vert() {
        let (mut m, [a, b, c], f) = tri_mesh();
        let d = m.vert_create(Vec3::new(1.0, 1.0, 0.0), Vec3::Z, None);
        let f2 = m.face_create(&[b, a, d], None, None).unwrap();

        // From a loop of f on edge (a, b), the opposite vertex d finds f2.
        let e_ab = m.edge_exists(a, b).unwrap();
        let (l0, l1) = m.edge_loop_pair(e_ab).unwrap();
        let l_on_f = if m.loop_ref(l0).unwrap().f == f { l0 } else { l1 };
        assert_eq!(m.face_exists_tri_from_loop_vert(l_on_f, d), Some(f2));
        assert_eq!(m.face_exists_tri_from_loop_vert(l_on_f, c), None);
        let _ = f2;
    }

    #[test]
    fn test_kill_face_leaves_wire_edges() {
        let (mut m, [a, _, _], f) = tri_mesh();
        m.face_kill(f);
        assert_eq!(m.face_count(), 0);
        assert_eq!(m.edge_count(), 3);
        for (_, e) in m.iter_edges() {
            assert!(e.l.is_none());
        }
        m.vert_kill(a);
        assert_eq!(m.vert_count(), 2);
        assert_eq!(m.edge_count(), 1);
    }

    #[test]
    fn test_edge_loop_pair_and_counts() {
        let (mut m, [a, b, c], _) = tri_mesh();
        let d = m.vert_create(Vec3::new(1.0, 1.0, 0.0), Vec3::Z, None);
        m.face_create(&[b, a, d], None, None).unwrap();

        let e_ab = m.edge_exists(a, b).unwrap();
        let e_bc = m.edge_exists(b, c).unwrap();
        assert!(m.edge_loop_pair(e_ab).is_some());
        assert!(m.edge_loop_pair(e_bc).is_none());
        assert_eq!(m.edge_loop_count_at_most(e_ab, 8), 2);
        assert_eq!(m.edge_loop_count_at_most(e_bc, 8), 1);
    }

    #[test]
    fn test_slot_reuse() {
        let (mut m, [a, b, c], f) = tri_mesh();
        m.face_kill(f);
        let f2 = m.face_create(&[a, c, b], None, None).unwrap();
        // The freed slot is reused.
        assert_eq!(f2, f);
        let _ = b;
    }

    #[test]
    fn test_restore_vert_and_edge_roundtrip() {
        let mut m = Mesh::new();
        let a = m.vert_create(Vec3::ZERO, Vec3::Z, None);
        let b = m.vert_create(Vec3::X, Vec3::Z, None);
        let e = m.edge_create(a, b, None);

        m.edge_kill(e);
        m.vert_kill(b);

        m.restore_vert_at(b, Vec3::X, Vec3::Z, HeadFlags::default(), AttrBlock::default())
            .unwrap();
        m.restore_edge_at(e, a, b, HeadFlags::default(), AttrBlock::default())
            .unwrap();
        assert_eq!(m.edge_exists(a, b), Some(e));
    }
}
