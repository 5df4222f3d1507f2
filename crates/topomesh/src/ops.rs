//! Structural kernel operations: edge split and face split.

use glam::Vec3;
use smallvec::SmallVec;

use crate::attr::{self, AttrBlock};
use crate::mesh::{EdgeSplitResult, Mesh};
use crate::types::{EdgeId, FaceId, LoopId, MeshError};

impl Mesh {
    /// Split `e` at parameter `t` (measured from `v1`).
    ///
    /// The edge keeps its id and becomes `(v1, m)`; a new edge `(m, v2)` is
    /// created with the same head-flags and attributes. Every incident face
    /// grows by one loop, so triangles become quads until the caller
    /// re-triangulates. The new vertex interpolates position, normal and
    /// attribute blocks from the endpoints; each inserted loop interpolates
    /// the two loops it lands between.
    pub fn edge_split(&mut self, e: EdgeId, t: f32) -> Result<EdgeSplitResult, MeshError> {
        let (v1, v2, e_flags, e_attr) = {
            let edge = self.edge(e).ok_or(MeshError::StaleId)?;
            (edge.v1, edge.v2, edge.flags, edge.attr.clone())
        };

        let co = self.vert_co(v1).lerp(self.vert_co(v2), t);
        let no = self
            .vert_no(v1)
            .lerp(self.vert_no(v2), t)
            .normalize_or_zero();
        let m = self.vert_create(co, no, None);
        if let (Some(b1), Some(b2)) = (
            self.vert(v1).map(|v| v.attr.clone()),
            self.vert(v2).map(|v| v.attr.clone()),
        ) {
            let mut dst = AttrBlock::default();
            attr::interp_into(&mut dst, &[&b1, &b2], &[1.0 - t, t]);
            if let Some(vm) = self.vert_mut(m) {
                vm.attr = dst;
            }
        }

        // Gather incident loops before rewiring; the radial cycle of `e` is
        // rebuilt below as loops move between the halves.
        let loops = self.edge_loops(e);

        // Re-point the old edge at (v1, m).
        self.disk_remove(e, v1);
        self.disk_remove(e, v2);
        if let Some(edge) = self.edge_mut(e) {
            edge.v1 = v1;
            edge.v2 = m;
        }
        self.disk_append(e, v1);
        self.disk_append(e, m);

        let new_e = self.edge_create(m, v2, None);
        if let Some(edge) = self.edge_mut(new_e) {
            edge.flags = e_flags;
            edge.attr = e_attr;
        }

        for l in loops {
            let Some((lv, l_next, f)) = self.loop_ref(l).map(|ll| (ll.v, ll.next, ll.f)) else {
                continue;
            };

            // Interpolated corner data for the inserted midpoint loop.
            let mut mid_attr = AttrBlock::default();
            if let (Some(a), Some(b)) = (
                self.loop_ref(l).map(|ll| ll.attr.clone()),
                self.loop_ref(l_next).map(|ll| ll.attr.clone()),
            ) {
                attr::interp_into(&mut mid_attr, &[&a, &b], &[0.5, 0.5]);
            }

            // The loop keeps its vertex; its edge is whichever half now runs
            // from that vertex, and the inserted loop carries the other half.
            let (l_edge, mid_edge) = if lv == v1 { (e, new_e) } else { (new_e, e) };
            self.radial_remove(self.loop_ref(l).map(|ll| ll.e).unwrap_or(e), l);
            if let Some(ll) = self.loop_mut(l) {
                ll.e = l_edge;
            }
            self.radial_append(l_edge, l);

            let mid = self.alloc_loop_for_split(m, mid_edge, f, mid_attr);
            // Stitch mid between l and l_next in the face cycle.
            if let Some(ll) = self.loop_mut(l) {
                ll.next = mid;
            }
            if let Some(ln) = self.loop_mut(l_next) {
                ln.prev = mid;
            }
            if let Some(lm) = self.loop_mut(mid) {
                lm.prev = l;
                lm.next = l_next;
            }
            self.radial_append(mid_edge, mid);

            if let Some(face) = self.face_mut(f) {
                face.len += 1;
            }
        }

        Ok(EdgeSplitResult {
            new_vert: m,
            new_edge: new_e,
        })
    }

    fn alloc_loop_for_split(
        &mut self,
        v: crate::types::VertId,
        e: EdgeId,
        f: FaceId,
        attr: AttrBlock,
    ) -> LoopId {
        use crate::types::Loop;
        let sentinel = LoopId(u32::MAX);
        let l = Loop {
            v,
            e,
            f,
            next: sentinel,
            prev: sentinel,
            radial_next: sentinel,
            radial_prev: sentinel,
            attr,
        };
        self.alloc_loop(l)
    }

    /// Cut face `f` along the diagonal between the corners `l_a` and `l_b`.
    ///
    /// `f` keeps the corners from `l_a` up to (not including) `l_b` plus a
    /// closing corner at `l_b`'s vertex; the new face receives the remainder
    /// (`l_b` through `l_a.prev`) plus a closing corner at `l_a`'s vertex.
    /// Iterating diagonal cuts on the returned face therefore peels polygons
    /// the way the split-pattern table expects. Returns the new face and the
    /// loop on it that rides the diagonal edge.
    pub fn face_split(
        &mut self,
        f: FaceId,
        l_a: LoopId,
        l_b: LoopId,
    ) -> Result<(FaceId, LoopId), MeshError> {
        if l_a == l_b {
            return Err(MeshError::DegenerateSplit);
        }
        let (va, a_prev) = {
            let la = self.loop_ref(l_a).ok_or(MeshError::StaleId)?;
            if la.f != f {
                return Err(MeshError::StaleId);
            }
            (la.v, la.prev)
        };
        let (vb, b_prev) = {
            let lb = self.loop_ref(l_b).ok_or(MeshError::StaleId)?;
            if lb.f != f {
                return Err(MeshError::StaleId);
            }
            (lb.v, lb.prev)
        };
        if a_prev == l_b || b_prev == l_a {
            return Err(MeshError::DegenerateSplit);
        }

        let (e_diag, _) = self.edge_get_or_create(va, vb, None);

        let (flags, mat, f_attr) = {
            let face = self.face(f).ok_or(MeshError::StaleId)?;
            (face.flags, face.mat, face.attr.clone())
        };

        // Count the two halves.
        let count_between = |mesh: &Mesh, from: LoopId, to: LoopId| -> u32 {
            let mut n = 0;
            let mut l = from;
            while l != to {
                n += 1;
                let Some(next) = mesh.loop_ref(l).map(|ll| ll.next) else {
                    break;
                };
                l = next;
            }
            n
        };
        let len_kept = count_between(self, l_a, l_b) + 1;
        let len_new = count_between(self, l_b, l_a) + 1;

        let f2 = self.alloc_face(crate::types::Face {
            len: len_new,
            l_first: LoopId(u32::MAX),
            mat,
            no: Vec3::ZERO,
            flags,
            attr: f_attr,
        });

        // Closing loop for the kept face, at vb, running the diagonal.
        let close_attr = self.loop_ref(l_b).map(|l| l.attr.clone()).unwrap_or_default();
        let l_close_f = self.alloc_loop_for_split(vb, e_diag, f, close_attr);
        // Closing loop for the new face, at va.
        let close_attr2 = self.loop_ref(l_a).map(|l| l.attr.clone()).unwrap_or_default();
        let l_close_f2 = self.alloc_loop_for_split(va, e_diag, f2, close_attr2);

        // Re-parent the moved range (l_b .. l_a.prev) onto f2.
        let mut l = l_b;
        loop {
            if let Some(ll) = self.loop_mut(l) {
                ll.f = f2;
            }
            if l == a_prev {
                break;
            }
            let Some(next) = self.loop_ref(l).map(|ll| ll.next) else {
                break;
            };
            l = next;
        }

        // Stitch the kept cycle: a_prev was the last kept corner? No: the
        // kept face runs l_a .. b_prev, then l_close_f, back to l_a.
        if let Some(ll) = self.loop_mut(b_prev) {
            ll.next = l_close_f;
        }
        if let Some(ll) = self.loop_mut(l_close_f) {
            ll.prev = b_prev;
            ll.next = l_a;
        }
        if let Some(ll) = self.loop_mut(l_a) {
            ll.prev = l_close_f;
        }

        // Stitch the new cycle: l_b .. a_prev, then l_close_f2, back to l_b.
        if let Some(ll) = self.loop_mut(a_prev) {
            ll.next = l_close_f2;
        }
        if let Some(ll) = self.loop_mut(l_close_f2) {
            ll.prev = a_prev;
            ll.next = l_b;
        }
        if let Some(ll) = self.loop_mut(l_b) {
            ll.prev = l_close_f2;
        }

        self.radial_append(e_diag, l_close_f);
        self.radial_append(e_diag, l_close_f2);

        if let Some(face) = self.face_mut(f) {
            face.len = len_kept;
            face.l_first = l_a;
        }
        if let Some(face) = self.face_mut(f2) {
            face.l_first = l_b;
        }
        self.face_normal_update(f);
        self.face_normal_update(f2);

        Ok((f2, l_close_f2))
    }

    /// Corner loops of `f` whose vertices match `targets`, in target order.
    pub fn find_face_loops_of_verts(
        &self,
        f: FaceId,
        targets: &[crate::types::VertId],
    ) -> SmallVec<[Option<LoopId>; 2]> {
        let mut out: SmallVec<[Option<LoopId>; 2]> = SmallVec::new();
        out.resize(targets.len(), None);
        for l in self.face_loops(f) {
            if let Some(v) = self.loop_ref(l).map(|ll| ll.v) {
                for (slot, &target) in out.iter_mut().zip(targets) {
                    if v == target && slot.is_none() {
                        *slot = Some(l);
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VertId;
    use glam::Vec3;

    fn two_tris() -> (Mesh, [VertId; 4], EdgeId) {
        // Two triangles sharing edge (a, b).
        let mut m = Mesh::new();
        let a = m.vert_create(Vec3::new(0.0, 0.0, 0.0), Vec3::Z, None);
        let b = m.vert_create(Vec3::new(1.0, 0.0, 0.0), Vec3::Z, None);
        let c = m.vert_create(Vec3::new(0.5, 1.0, 0.0), Vec3::Z, None);
        let d = m.vert_create(Vec3::new(0.5, -1.0, 0.0), Vec3::Z, None);
        m.face_create(&[a, b, c], None, None).unwrap();
        m.face_create(&[b, a, d], None, None).unwrap();
        let e = m.edge_exists(a, b).unwrap();
        (m, [a, b, c, d], e)
    }

    #[test]
    fn test_edge_split_grows_both_faces() {
        let (mut m, [a, b, _, _], e) = two_tris();
        let r = m.edge_split(e, 0.5).unwrap();

        assert_eq!(m.vert_count(), 5);
        assert_eq!(m.edge_count(), 7);
        assert_eq!(m.face_count(), 2);
        for (_, f) in m.iter_faces() {
            assert_eq!(f.len, 4);
        }
        assert_eq!(m.vert_co(r.new_vert), Vec3::new(0.5, 0.0, 0.0));
        assert!(m.edge_exists(a, r.new_vert).is_some());
        assert!(m.edge_exists(r.new_vert, b).is_some());
        assert!(m.edge_exists(a, b).is_none());

        // Both halves carry two loops, like the original shared edge.
        assert_eq!(m.edge_loop_count_at_most(e, 8), 2);
        assert_eq!(m.edge_loop_count_at_most(r.new_edge, 8), 2);
    }

    #[test]
    fn test_edge_split_boundary_edge() {
        let (mut m, [_, b, c, _], _) = two_tris();
        let e_bc = m.edge_exists(b, c).unwrap();
        let r = m.edge_split(e_bc, 0.5).unwrap();
        // One incident face grew, the other triangle is untouched.
        let lens: Vec<u32> = m.iter_faces().map(|(_, f)| f.len).collect();
        assert!(lens.contains(&4) && lens.contains(&3));
        assert_eq!(m.edge_loop_count_at_most(r.new_edge, 8), 1);
    }

    #[test]
    fn test_face_split_quad_into_tris() {
        let (mut m, [a, b, _, _], e) = two_tris();
        let r = m.edge_split(e, 0.5).unwrap();
        let mid = r.new_vert;

        // Split the quad (a, mid, b, c) along mid..c.
        let quad = m
            .iter_faces()
            .find(|(f, _)| m.face_verts(*f).contains(&mid) && m.face_verts(*f).len() == 4)
            .map(|(f, _)| f)
            .unwrap();
        let verts = m.face_verts(quad);
        let opp = *verts
            .iter()
            .find(|&&v| v != a && v != b && v != mid)
            .unwrap();
        let loops = m.find_face_loops_of_verts(quad, &[mid, opp]);
        let (la, lb) = (loops[0].unwrap(), loops[1].unwrap());

        let (f2, l_diag) = m.face_split(quad, la, lb).unwrap();
        assert_eq!(m.face(quad).unwrap().len, 3);
        assert_eq!(m.face(f2).unwrap().len, 3);
        assert!(m.edge_exists(mid, opp).is_some());
        assert_eq!(m.loop_ref(l_diag).unwrap().f, f2);

        // The diagonal edge carries exactly the two new loops.
        let e_diag = m.edge_exists(mid, opp).unwrap();
        assert_eq!(m.edge_loop_count_at_most(e_diag, 8), 2);
    }

    #[test]
    fn test_face_split_remainder_is_new_face() {
        // Pentagon split keeps the cut triangle on the original face and the
        // remainder on the returned face, so chained cuts keep working.
        let mut m = Mesh::new();
        let vs: Vec<VertId> = (0..5)
            .map(|i| {
                let ang = i as f32 * std::f32::consts::TAU / 5.0;
                m.vert_create(Vec3::new(ang.cos(), ang.sin(), 0.0), Vec3::Z, None)
            })
            .collect();
        let f = m.face_create(&vs, None, None).unwrap();

        let loops = m.find_face_loops_of_verts(f, &[vs[0], vs[2]]);
        let (f2, _) = m.face_split(f, loops[0].unwrap(), loops[1].unwrap()).unwrap();

        assert_eq!(m.face(f).unwrap().len, 3);
        assert_eq!(m.face(f2).unwrap().len, 4);
        let f2_verts = m.face_verts(f2);
        assert!(f2_verts.contains(&vs[2]) && f2_verts.contains(&vs[3]) && f2_verts.contains(&vs[4]));
    }
}
