//! Valence 3/4 cleanup.
//!
//! Interior vertices with only three or four edges produce poor triangle
//! fans after heavy collapsing. This pass deletes them and re-tessellates
//! the surrounding ring into one or two triangles, picking the quad
//! diagonal whose two triangle normals agree most.

use glam::Vec3;
use smallvec::SmallVec;
use tracing::debug;

use topomesh::{triangle_normal, LoopId, VertId};

use crate::annotate::AnnoFlags;
use crate::config::RemeshParams;
use crate::driver::Remesher;

impl Remesher<'_> {
    /// Run the cleanup over the watchlist gathered during queue scans.
    /// Returns whether anything changed.
    pub(crate) fn cleanup_valence_3_4(
        &mut self,
        watchlist: &[VertId],
        params: &RemeshParams<'_>,
    ) -> bool {
        // The cleanup reaches slightly past the query region so fans on the
        // rim get tidied too.
        let radius_wide = params.radius * 1.25;
        let rsq = radius_wide * radius_wide;
        let mut modified = false;

        for &v in watchlist {
            if self.corrupt {
                break;
            }
            if self.mesh.vert(v).is_none() || self.leaves.vert_owner(v).is_none() {
                continue;
            }
            if self.mesh.vert_co(v).distance_squared(params.center) >= rsq {
                continue;
            }
            if self.mesh.first_edge(v).is_none() {
                continue;
            }

            self.check_vert_fan_tris(v);
            let val = self.anno.update_valence(self.mesh, v);
            if val != 3 && val != 4 {
                continue;
            }

            self.anno.check_boundary(self.mesh, v);
            if self.anno.flags(v).contains(AnnoFlags::ALL_BOUNDARY) {
                continue;
            }

            modified |= self.dissolve_low_valence_vert(v, val);
        }

        debug!(candidates = watchlist.len(), modified, "valence cleanup complete");
        modified
    }

    /// Delete `v` and re-tessellate its fan. Returns false when the fan walk
    /// hits anything non-manifold or degenerate.
    fn dissolve_low_valence_vert(&mut self, v: VertId, val: u32) -> bool {
        let Some(mut ls) = self.ordered_fan_loops(v, val) else {
            return false;
        };
        let Some(leaf) = self.leaves.vert_owner(v) else {
            return false;
        };

        self.leaves.vert_remove(self.mesh, v);

        // Membership and log first; the old fan stays alive until the new
        // triangles have taken its corner attributes.
        let old_faces = self.mesh.vert_faces(v);
        for &f in &old_faces {
            if self.leaves.face_owner(f).is_some() {
                self.face_remove(f, true, true, true);
            }
        }

        if val == 4 {
            // Pick the diagonal whose triangle normals agree most.
            let p: SmallVec<[Vec3; 4]> = ls
                .iter()
                .filter_map(|&l| self.mesh.loop_ref(l).map(|ll| self.mesh.vert_co(ll.v)))
                .collect();
            if p.len() == 4 {
                let th1 = triangle_normal(p[0], p[1], p[2]).dot(triangle_normal(p[0], p[2], p[3]));
                let th2 = triangle_normal(p[1], p[2], p[3]).dot(triangle_normal(p[1], p[3], p[0]));
                if th2 > th1 {
                    ls.rotate_left(1);
                }
            }
        }

        let ring: SmallVec<[VertId; 4]> = ls
            .iter()
            .filter_map(|&l| self.mesh.loop_ref(l).map(|ll| ll.v))
            .collect();
        if ring.len() != val as usize {
            return false;
        }
        for &rv in &ring {
            self.anno.add_flags(
                rv,
                AnnoFlags::NEEDS_VALENCE | AnnoFlags::NEEDS_BOUNDARY | AnnoFlags::NEEDS_DISK_SORT,
            );
        }

        let example = self
            .mesh
            .first_edge(v)
            .and_then(|e| self.mesh.edge(e))
            .and_then(|ee| ee.l)
            .and_then(|l| self.mesh.loop_ref(l))
            .map(|ll| ll.f);

        let mut made = false;

        if ring[0] != ring[1]
            && ring[1] != ring[2]
            && ring[0] != ring[2]
            && self.mesh.face_exists([ring[0], ring[1], ring[2]]).is_none()
        {
            if let Some(f1) = self.face_create_in_leaf(
                leaf,
                [ring[0], ring[1], ring[2]],
                None,
                example,
                true,
                false,
            ) {
                let l2 = self.mesh.face_loops(f1);
                self.swap_loop_attr_pair(l2[0], ls[0]);
                self.swap_loop_attr_pair(l2[1], ls[1]);
                self.swap_loop_attr_pair(l2[2], ls[2]);
                self.mesh.face_normal_update(f1);
                self.log.face_added(self.mesh, f1);
                made = true;
            }
        }

        if val == 4
            && ring[0] != ring[2]
            && ring[2] != ring[3]
            && ring[0] != ring[3]
            && self.mesh.face_exists([ring[0], ring[2], ring[3]]).is_none()
        {
            if let Some(f2) = self.face_create_in_leaf(
                leaf,
                [ring[0], ring[2], ring[3]],
                None,
                example,
                true,
                false,
            ) {
                let l2 = self.mesh.face_loops(f2);
                self.swap_loop_attr_pair(l2[2], ls[3]);
                self.mesh.copy_loop_attr(ls[0], l2[0]);
                self.mesh.copy_loop_attr(ls[2], l2[1]);
                self.mesh.face_normal_update(f2);
                self.log.face_added(self.mesh, f2);
                made = true;
            }
        }

        // Kills the vertex along with what is left of the old fan.
        self.kill_vert(v, true);
        made || !old_faces.is_empty()
    }

    fn swap_loop_attr_pair(&mut self, a: LoopId, b: LoopId) {
        self.mesh.swap_loop_attrs(a, b);
    }

    /// Collect the ring loops opposite `v`, one per fan face, walking the
    /// disk cycle. Returns `None` when the walk meets a non-manifold edge, a
    /// repeated ring vertex it cannot sidestep, or two ring loops on the
    /// same face.
    fn ordered_fan_loops(&self, v: VertId, val: u32) -> Option<SmallVec<[LoopId; 4]>> {
        let first_edge = self.mesh.first_edge(v)?;
        let mut l = self.mesh.edge(first_edge)?.l?;
        if self.mesh.loop_ref(l)?.v != v {
            l = self.mesh.loop_ref(l)?.next;
        }

        let mut ls: SmallVec<[LoopId; 4]> = SmallVec::new();
        for j in 0..val as usize {
            let cur = self.mesh.loop_ref(l)?;
            ls.push(if cur.v == v { cur.next } else { l });

            // Step to the next fan face across the previous edge.
            let prev = self.mesh.loop_ref(cur.prev)?;
            l = prev.radial_next;
            if self.mesh.loop_ref(l)?.v != v {
                l = self.mesh.loop_ref(l)?.next;
            }

            let probe = self.mesh.loop_ref(l)?;
            let radial2 = self.mesh.loop_ref(probe.radial_next)?.radial_next;
            if probe.radial_next == l || radial2 != l {
                return None;
            }

            for k in 0..j {
                let lk = self.mesh.loop_ref(ls[k])?;
                let lj = self.mesh.loop_ref(ls[j])?;
                if lk.v == lj.v {
                    // Try sliding past a repeated ring vertex.
                    let next = self.mesh.loop_ref(lj.next)?;
                    if next.v != v {
                        ls[j] = lj.next;
                    } else {
                        return None;
                    }
                }
                let lk = self.mesh.loop_ref(ls[k])?;
                let rad2 = self.mesh.loop_ref(lk.radial_next)?.radial_next;
                if rad2 != ls[k] {
                    return None;
                }
                if lk.f == self.mesh.loop_ref(ls[j])?.f {
                    return None;
                }
            }
        }
        Some(ls)
    }
}
