//! Short-edge collapse pass.
//!
//! Candidates come off the queue as vertex pairs; both endpoints are walked
//! through the deleted-vertex redirection map before anything else, since
//! earlier collapses routinely consume queued vertices. Every skip condition
//! here is ordinary control flow: the queue is a snapshot and mutation
//! invalidates neighbours constantly.

use std::collections::HashMap;
use std::time::Instant;

use tracing::debug;

use topomesh::attr::{self, AttrBlock};
use topomesh::{EdgeId, FaceId, HeadFlags, VertId};

use crate::annotate::AnnoFlags;
use crate::config::RemeshParams;
use crate::driver::Remesher;
use crate::elements::vert_mask;
use crate::leaves::LeafFlags;
use crate::queue::EdgeQueue;

const NEEDS_ALL: u16 =
    AnnoFlags::NEEDS_VALENCE | AnnoFlags::NEEDS_BOUNDARY | AnnoFlags::NEEDS_DISK_SORT;

/// Follow the redirection chain: a deleted vertex maps to the vertex it was
/// merged into, or to nothing when it was removed outright. Chains cannot
/// cycle because every inserted key is killed immediately afterwards.
fn chain_lookup(map: &HashMap<VertId, Option<VertId>>, mut v: VertId) -> Option<VertId> {
    loop {
        match map.get(&v) {
            None => return Some(v),
            Some(None) => return None,
            Some(Some(next)) => v = *next,
        }
    }
}

impl Remesher<'_> {
    /// Drain the short-edge queue, collapsing every still-valid candidate.
    /// Returns whether anything changed.
    pub(crate) fn collapse_short_edges(
        &mut self,
        queue: &mut EdgeQueue,
        params: &RemeshParams<'_>,
        max_steps: usize,
    ) -> bool {
        let started = Instant::now();
        let min_len_sq = queue.limit_len_sq;
        let mut deleted_verts: HashMap<VertId, Option<VertId>> = HashMap::new();
        let mut deleted_faces: Vec<FaceId> = Vec::new();
        let mut any = false;
        let mut steps = 0usize;

        while let Some(entry) = queue.pop() {
            steps += 1;
            if steps > max_steps || self.corrupt {
                break;
            }
            if let Some(limit) = self.config.time_limit {
                if started.elapsed() > limit {
                    debug!("collapse pass hit its time budget");
                    break;
                }
            }

            let (Some(v1), Some(v2)) = (
                chain_lookup(&deleted_verts, entry.v1),
                chain_lookup(&deleted_verts, entry.v2),
            ) else {
                continue;
            };
            if v1 == v2 {
                continue;
            }
            let Some(e) = self.mesh.edge_exists(v1, v2) else {
                continue;
            };

            // Radial cycles of three or more loops are non-manifold; wire
            // and boundary edges collapse fine.
            if self.mesh.edge_loop_count_at_most(e, 3) >= 3 {
                continue;
            }

            // Neighbouring collapses can have stretched this edge back out.
            if self.mesh.vert_co(v1).distance_squared(self.mesh.vert_co(v2)) >= min_len_sq {
                continue;
            }

            // Endpoints may have dropped out of the hierarchy when an
            // earlier collapse deleted their faces.
            if self.leaves.vert_owner(v1).is_none() || self.leaves.vert_owner(v2).is_none() {
                continue;
            }

            // Boundary compatibility against *current* topology: never eat a
            // corner, never pull a boundary class into another.
            self.anno.check_boundary(self.mesh, v1);
            self.anno.check_boundary(self.mesh, v2);
            let f1 = self.anno.flags(v1);
            let f2 = self.anno.flags(v2);
            if f1.contains(AnnoFlags::ALL_CORNER) || f2.contains(AnnoFlags::ALL_CORNER) {
                continue;
            }
            if f1.masked(AnnoFlags::ALL_BOUNDARY) != f2.masked(AnnoFlags::ALL_BOUNDARY) {
                continue;
            }

            any = true;
            self.collapse_edge(e, v1, v2, params, &mut deleted_verts, &mut deleted_faces);
        }

        debug!(steps, modified = any, "collapse drain complete");
        any
    }

    fn collapse_edge(
        &mut self,
        e: EdgeId,
        v1: VertId,
        v2: VertId,
        params: &RemeshParams<'_>,
        deleted_verts: &mut HashMap<VertId, Option<VertId>>,
        deleted_faces: &mut Vec<FaceId>,
    ) {
        self.check_vert_fan_tris(v1);
        self.check_vert_fan_tris(v2);
        if self.mesh.edge(e).is_none() {
            return;
        }

        self.anno
            .check_origdata(self.mesh, v1, self.stroke_id, vert_mask(params.mask, v1));
        self.anno
            .check_origdata(self.mesh, v2, self.stroke_id, vert_mask(params.mask, v2));

        // A seam edge may only collapse when both endpoints keep another
        // seam edge, otherwise the seam chain would be truncated.
        let is_seam = self
            .mesh
            .edge(e)
            .map(|ee| ee.flags.contains(HeadFlags::SEAM))
            .unwrap_or(false);
        if is_seam {
            let mut chained = 0;
            for v in [v1, v2] {
                for e2 in self.mesh.vert_edges(v) {
                    if e2 == e {
                        continue;
                    }
                    let seam = self
                        .mesh
                        .edge(e2)
                        .map(|ee| ee.flags.contains(HeadFlags::SEAM))
                        .unwrap_or(false);
                    if seam {
                        chained += 1;
                        break;
                    }
                }
            }
            if chained < 2 {
                return;
            }
        }

        // The endpoint with the higher mask survives; ties retain the second.
        let (v_del, v_conn) = if vert_mask(params.mask, v1) <= vert_mask(params.mask, v2) {
            (v1, v2)
        } else {
            (v2, v1)
        };

        // Merge vertex attributes into the survivor.
        if let (Some(b_del), Some(b_conn)) = (
            self.mesh.vert(v_del).map(|v| v.attr.clone()),
            self.mesh.vert(v_conn).map(|v| v.attr.clone()),
        ) {
            let mut dst = AttrBlock::default();
            attr::interp_into(&mut dst, &[&b_del, &b_conn], &[0.5, 0.5]);
            if let Some(vert) = self.mesh.vert_mut(v_conn) {
                vert.attr = dst;
            }
        }

        self.leaves.vert_remove(self.mesh, v_del);

        // Remove every face on the edge, propagating the visible flags of
        // the two surviving edges onto each other so crease/seam marks
        // outlive the merge.
        while let Some(l) = self.mesh.edge(e).and_then(|ee| ee.l) {
            let Some(f_adj) = self.mesh.loop_ref(l).map(|ll| ll.f) else {
                break;
            };

            let loops = self.mesh.face_loops(f_adj);
            let mut eflag = 0u8;
            for &l2 in &loops {
                let Some((v, e2)) = self.mesh.loop_ref(l2).map(|ll| (ll.v, ll.e)) else {
                    continue;
                };
                if e2 != e {
                    eflag |= self
                        .mesh
                        .edge(e2)
                        .map(|ee| ee.flags.visible_bits())
                        .unwrap_or(0);
                }
                self.anno.add_flags(v, NEEDS_ALL);
            }
            for &l2 in &loops {
                let Some(e2) = self.mesh.loop_ref(l2).map(|ll| ll.e) else {
                    continue;
                };
                if e2 != e {
                    if let Some(edge) = self.mesh.edge_mut(e2) {
                        edge.flags.insert(eflag);
                    }
                }
            }

            self.face_remove(f_adj, true, true, true);
            self.mesh.face_kill(f_adj);
        }

        // The edge is wire now.
        self.log.edge_removed(self.mesh, e);
        self.mesh.edge_kill(e);

        // Snap corner attributes: mix every loop around both endpoints into
        // one block and write it back across the fan, so the merged corner
        // reads seamlessly.
        let mut ls: Vec<topomesh::LoopId> = Vec::new();
        for v in [v_del, v_conn] {
            for l in self.mesh.vert_loops(v) {
                self.anno.add_flags(v, NEEDS_ALL);
                ls.push(l);
            }
        }
        if !ls.is_empty() {
            let blocks: Vec<AttrBlock> = ls
                .iter()
                .filter_map(|&l| self.mesh.loop_ref(l).map(|ll| ll.attr.clone()))
                .collect();
            let refs: Vec<&AttrBlock> = blocks.iter().collect();
            let weights = vec![1.0f32; refs.len()];
            let mut dst = AttrBlock::default();
            attr::interp_into(&mut dst, &refs, &weights);
            if let Some(first) = self.mesh.loop_mut(ls[0]) {
                first.attr = dst;
            }
            for &l in &ls[1..] {
                self.mesh.copy_loop_attr(ls[0], l);
            }
        }

        // Rewrite the remaining fan of v_del onto v_conn. A rewrite that
        // would duplicate an existing triangle instead marks the duplicate
        // for deletion, preventing folded-over flaps.
        deleted_faces.clear();
        let corner_loops = self.mesh.vert_loops(v_del);
        for l in corner_loops {
            let Some((l_next, l_prev, f)) = self
                .mesh
                .loop_ref(l)
                .map(|ll| (ll.next, ll.prev, ll.f))
            else {
                continue;
            };

            if let Some(existing) = self.mesh.face_exists_tri_from_loop_vert(l_next, v_conn) {
                if !deleted_faces.contains(&existing) {
                    deleted_faces.push(existing);
                }
            } else {
                let (Some(vn), Some(vp)) = (
                    self.mesh.loop_ref(l_next).map(|ll| ll.v),
                    self.mesh.loop_ref(l_prev).map(|ll| ll.v),
                ) else {
                    continue;
                };
                if v_conn == vn || v_conn == vp || vn == vp {
                    continue;
                }

                self.anno.add_flags(
                    vn,
                    AnnoFlags::NEEDS_BOUNDARY
                        | AnnoFlags::NEEDS_DISK_SORT
                        | AnnoFlags::NEEDS_TRIANGULATE,
                );
                self.anno.add_flags(
                    vp,
                    AnnoFlags::NEEDS_BOUNDARY
                        | AnnoFlags::NEEDS_DISK_SORT
                        | AnnoFlags::NEEDS_TRIANGULATE,
                );

                let old_tri = [v_del, vn, vp];
                let v_tri = [v_conn, vn, vp];
                let e_old = self.edges_from_tri(old_tri);
                let e_new = self.edges_from_tri_example(v_tri, e_old);

                let leaf = self
                    .leaves
                    .face_owner(f)
                    .or_else(|| self.leaves.vert_owner(v_conn));
                let Some(leaf) = leaf else {
                    tracing::warn!(?f, "collapse rewrite found no leaf for replacement face");
                    deleted_faces.push(f);
                    continue;
                };
                let Some(f2) =
                    self.face_create_in_leaf(leaf, v_tri, Some(e_new), Some(f), false, true)
                else {
                    deleted_faces.push(f);
                    continue;
                };

                // Preserve per-edge crease/seam data and corner attributes
                // positionally.
                let l2 = self.mesh.face_loops(f2);
                let pairs = [(l2[0], l), (l2[1], l_next), (l2[2], l_prev)];
                for (dst, src) in pairs {
                    let (Some(de), Some(se)) = (
                        self.mesh.loop_ref(dst).map(|ll| ll.e),
                        self.mesh.loop_ref(src).map(|ll| ll.e),
                    ) else {
                        continue;
                    };
                    self.mesh.swap_edge_attrs(de, se);
                    self.mesh.copy_loop_attr(src, dst);
                }

                deleted_faces.push(f);
            }
        }

        // Kill the marked faces, then mop up: wire edges die, isolated
        // vertices leave the hierarchy and the mesh.
        let mut v_conn_alive = true;
        for i in 0..deleted_faces.len() {
            let f_del = deleted_faces[i];
            if self.mesh.face(f_del).is_none() {
                continue;
            }
            let verts = self.mesh.face_verts(f_del);
            let edges: Vec<EdgeId> = self
                .mesh
                .face_loops(f_del)
                .iter()
                .filter_map(|&l| self.mesh.loop_ref(l).map(|ll| ll.e))
                .collect();
            for &v in &verts {
                self.anno.add_flags(v, NEEDS_ALL);
            }

            self.face_remove(f_del, true, true, true);
            self.mesh.face_kill(f_del);

            for e2 in edges {
                let wire = self.mesh.edge(e2).map(|ee| ee.l.is_none()).unwrap_or(false);
                if wire {
                    self.log.edge_removed(self.mesh, e2);
                    self.mesh.edge_kill(e2);
                }
            }
            for &v in &verts {
                if v == v_del {
                    continue;
                }
                if self.mesh.vert(v).is_some() && self.mesh.first_edge(v).is_none() {
                    self.leaves.vert_remove(self.mesh, v);
                    self.log.vert_removed(self.mesh, v);
                    if v == v_conn {
                        v_conn_alive = false;
                    }
                    deleted_verts.insert(v, None);
                    self.mesh.vert_kill(v);
                }
            }
        }

        // Pull the survivor to the midpoint and blend the normals. Original
        // coordinates stay untouched on purpose; the host restores from the
        // annotation snapshots, not from here.
        if v_conn_alive && self.mesh.vert(v_conn).is_some() {
            self.log.vert_before_modify(self.mesh, v_conn);
            let mid = (self.mesh.vert_co(v_conn) + self.mesh.vert_co(v_del)) * 0.5;
            let no = (self.mesh.vert_no(v_conn) + self.mesh.vert_no(v_del)).normalize_or_zero();
            if let Some(vert) = self.mesh.vert_mut(v_conn) {
                vert.co.set(mid);
                vert.no = no;
            }

            for l in self.mesh.vert_loops(v_conn) {
                let Some((le, lf)) = self.mesh.loop_ref(l).map(|ll| (ll.e, ll.f)) else {
                    continue;
                };
                if let Some(edge) = self.mesh.edge(le) {
                    self.anno.add_flags(edge.other_vert(v_conn), NEEDS_ALL);
                }
                if let Some(leaf) = self.leaves.face_owner(lf) {
                    self.leaves
                        .mark_dirty(leaf, LeafFlags::UPDATE_ALL | LeafFlags::UPDATE_BB);
                }
            }
            self.anno.add_flags(v_conn, NEEDS_ALL);
        }

        deleted_verts.insert(v_del, v_conn_alive.then_some(v_conn));
        self.kill_vert(v_del, true);
    }
}
