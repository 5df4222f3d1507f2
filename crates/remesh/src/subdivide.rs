//! Long-edge subdivision pass.
//!
//! The queue is drained into a pending buffer first, then all splits run as
//! one bulk operation; mutating while popping would disturb the queued
//! priorities of neighbouring edges. The bulk split marks every pending
//! edge, inserts midpoints through the log's atomic edge split, and finally
//! re-triangulates each affected face by looking its tagged-corner mask up
//! in a fixed pattern table.

use std::time::Instant;

use smallvec::SmallVec;
use tracing::{debug, warn};

use topomesh::{EdgeId, FaceId, HeadFlags, VertId};

use crate::annotate::AnnoFlags;
use crate::config::RemeshParams;
use crate::driver::Remesher;
use crate::elements::vert_mask;
use crate::leaves::LeafFlags;
use crate::queue::EdgeQueue;

/// Face split patterns, indexed by the bitmask of tagged (newly inserted)
/// corners after every pending edge has been split. Row layout is
/// `[face_len, connection_for_corner_0, .., connection_for_corner_n-1]`
/// padded with -1; a connection names the corner slot to cut a diagonal to,
/// and `face_len < 0` marks masks no split sequence can produce. The table
/// covers every rotation and mirror of the three base patterns (one split
/// edge, two adjacent, all three) and is part of the remesher's contract:
/// equal inputs must yield the same triangulation.
const SPLIT_PATTERNS: [[i8; 8]; 43] = [
    [-1, -1, -1, -1, -1, -1, -1, -1], // 0
    [4, 2, -1, -1, -1, -1, -1, -1],   // 1
    [4, -1, 3, -1, -1, -1, -1, -1],   // 2
    [-1, -1, -1, -1, -1, -1, -1, -1], // 3
    [4, -1, -1, 0, -1, -1, -1, -1],   // 4
    [5, 2, -1, 4, -1, -1, -1, -1],    // 5
    [-1, -1, -1, -1, -1, -1, -1, -1], // 6
    [-1, -1, -1, -1, -1, -1, -1, -1], // 7
    [4, -1, -1, -1, 1, -1, -1, -1],   // 8
    [5, 2, -1, -1, 0, -1, -1, -1],    // 9
    [5, -1, 3, -1, 0, -1, -1, -1],    // 10
    [-1, -1, -1, -1, -1, -1, -1, -1], // 11
    [-1, -1, -1, -1, -1, -1, -1, -1], // 12
    [-1, -1, -1, -1, -1, -1, -1, -1], // 13
    [-1, -1, -1, -1, -1, -1, -1, -1], // 14
    [-1, -1, -1, -1, -1, -1, -1, -1], // 15
    [-1, -1, -1, -1, -1, -1, -1, -1], // 16
    [-1, -1, -1, -1, -1, -1, -1, -1], // 17
    [5, -1, 3, -1, -1, 1, -1, -1],    // 18
    [-1, -1, -1, -1, -1, -1, -1, -1], // 19
    [5, -1, -1, 4, -1, 1, -1, -1],    // 20
    [6, 2, -1, 4, -1, 0, -1, -1],     // 21
    [-1, -1, -1, -1, -1, -1, -1, -1], // 22
    [-1, -1, -1, -1, -1, -1, -1, -1], // 23
    [-1, -1, -1, -1, -1, -1, -1, -1], // 24
    [-1, -1, -1, -1, -1, -1, -1, -1], // 25
    [-1, -1, -1, -1, -1, -1, -1, -1], // 26
    [-1, -1, -1, -1, -1, -1, -1, -1], // 27
    [-1, -1, -1, -1, -1, -1, -1, -1], // 28
    [-1, -1, -1, -1, -1, -1, -1, -1], // 29
    [-1, -1, -1, -1, -1, -1, -1, -1], // 30
    [-1, -1, -1, -1, -1, -1, -1, -1], // 31
    [-1, -1, -1, -1, -1, -1, -1, -1], // 32
    [-1, -1, -1, -1, -1, -1, -1, -1], // 33
    [-1, -1, -1, -1, -1, -1, -1, -1], // 34
    [-1, -1, -1, -1, -1, -1, -1, -1], // 35
    [-1, -1, -1, -1, -1, -1, -1, -1], // 36
    [-1, -1, -1, -1, -1, -1, -1, -1], // 37
    [-1, -1, -1, -1, -1, -1, -1, -1], // 38
    [-1, -1, -1, -1, -1, -1, -1, -1], // 39
    [-1, -1, -1, -1, -1, -1, -1, -1], // 40
    [-1, -1, -1, -1, -1, -1, -1, -1], // 41
    [6, -1, 3, -1, 5, -1, 1, -1],     // 42
];

const TAG: u8 = HeadFlags::TAG_ALT;
const NEEDS_ALL: u16 =
    AnnoFlags::NEEDS_VALENCE | AnnoFlags::NEEDS_BOUNDARY | AnnoFlags::NEEDS_DISK_SORT;

impl Remesher<'_> {
    /// Drain the long-edge queue (budgeted) and bulk-split the survivors.
    /// Returns whether anything changed.
    pub(crate) fn subdivide_long_edges(
        &mut self,
        queue: &mut EdgeQueue,
        params: &RemeshParams<'_>,
        watchlist: &mut Vec<VertId>,
        max_steps: usize,
    ) -> bool {
        let started = Instant::now();
        let mut pending: Vec<EdgeId> = Vec::new();
        let mut steps = 0usize;

        while let Some(entry) = queue.pop() {
            steps += 1;
            if steps > max_steps || self.corrupt {
                break;
            }
            if let Some(limit) = self.config.time_limit {
                if started.elapsed() > limit {
                    debug!("subdivide pass hit its time budget");
                    break;
                }
            }

            // The entry outlived its snapshot: the edge may be gone, or a
            // neighbouring collapse may have orphaned an endpoint.
            let Some(e) = self.mesh.edge_exists(entry.v1, entry.v2) else {
                continue;
            };
            if self.leaves.vert_owner(entry.v1).is_none()
                || self.leaves.vert_owner(entry.v2).is_none()
            {
                continue;
            }
            pending.push(e);
        }

        debug!(pending = pending.len(), steps, "subdivide drain complete");
        if pending.is_empty() {
            return false;
        }
        self.split_edges_bulk(&pending, params, watchlist);
        true
    }

    /// Two-phase bulk split of `edges`.
    fn split_edges_bulk(
        &mut self,
        edges: &[EdgeId],
        params: &RemeshParams<'_>,
        watchlist: &mut Vec<VertId>,
    ) {
        // Phase 1a: triangulated fans and clean scratch tags around every
        // pending edge.
        for &e in edges {
            let Some((v1, v2)) = self.mesh.edge(e).map(|ee| (ee.v1, ee.v2)) else {
                continue;
            };
            self.check_vert_fan_tris(v1);
            self.check_vert_fan_tris(v2);

            for l in self.mesh.edge_loops(e) {
                let Some(f) = self.mesh.loop_ref(l).map(|ll| ll.f) else {
                    continue;
                };
                for l2 in self.mesh.face_loops(f) {
                    let Some((v, e2)) = self.mesh.loop_ref(l2).map(|ll| (ll.v, ll.e)) else {
                        continue;
                    };
                    if let Some(edge) = self.mesh.edge_mut(e2) {
                        edge.flags.remove(TAG);
                    }
                    if let Some(vert) = self.mesh.vert_mut(v) {
                        vert.flags.remove(TAG);
                    }
                    self.anno.add_flags(v, NEEDS_ALL);
                }
                if let Some(face) = self.mesh.face_mut(f) {
                    face.flags.remove(TAG);
                }
            }
        }

        // Phase 1b: tag the pending edges and collect the affected faces.
        let mut faces: Vec<FaceId> = Vec::new();
        for &e in edges {
            if let Some(edge) = self.mesh.edge_mut(e) {
                edge.flags.insert(TAG);
            } else {
                continue;
            }
            for l in self.mesh.edge_loops(e) {
                let Some(f) = self.mesh.loop_ref(l).map(|ll| ll.f) else {
                    continue;
                };
                let tagged = self
                    .mesh
                    .face(f)
                    .map(|face| face.flags.contains(TAG))
                    .unwrap_or(true);
                if !tagged {
                    if let Some(face) = self.mesh.face_mut(f) {
                        face.flags.insert(TAG);
                    }
                    faces.push(f);
                }
            }
        }

        // Affected faces are logged out as their pre-split triangles and
        // logged back in after re-triangulation.
        for &f in &faces {
            self.log.face_removed(self.mesh, f);
        }

        // Phase 1c: split every tagged edge at its midpoint.
        for &e in edges {
            let Some(edge) = self.mesh.edge(e) else {
                continue;
            };
            if !edge.flags.contains(TAG) {
                continue;
            }
            let (v1, v2) = (edge.v1, edge.v2);
            let eflag = edge.flags.visible_bits() & !TAG;
            if let Some(edge) = self.mesh.edge_mut(e) {
                edge.flags.remove(TAG);
            }

            self.anno
                .check_origdata(self.mesh, v1, self.stroke_id, vert_mask(params.mask, v1));
            self.anno
                .check_origdata(self.mesh, v2, self.stroke_id, vert_mask(params.mask, v2));
            let vflag = self.merged_vert_flags(v1, v2);

            let result = match self.log.edge_split(self.mesh, e, 0.5) {
                Ok(r) => r,
                Err(err) => {
                    warn!(?e, %err, "edge split failed");
                    continue;
                }
            };
            let m = result.new_vert;

            // Both halves carry the original edge's visible flags; the new
            // vertex inherits the merged endpoint marks plus the split tag
            // the pattern lookup reads.
            if let Some(half) = self.mesh.edge_mut(e) {
                half.flags = HeadFlags(eflag);
            }
            if let Some(half) = self.mesh.edge_mut(result.new_edge) {
                half.flags = HeadFlags(eflag);
            }
            if let Some(vert) = self.mesh.vert_mut(m) {
                vert.flags = HeadFlags(vflag | TAG);
            }

            let (co, no) = (self.mesh.vert_co(m), self.mesh.vert_no(m));
            self.anno.mark_new(m, co, no, self.stroke_id);
            self.watchlist_push(watchlist, m);

            // Midpoint ownership prefers an endpoint's leaf and falls back
            // to a face walk; actual hierarchy insertion waits for the
            // driver's split phase.
            let owner = self
                .leaves
                .vert_owner(v1)
                .or_else(|| self.leaves.vert_owner(v2))
                .or_else(|| {
                    [m, v1, v2].into_iter().find_map(|v| {
                        self.mesh
                            .vert_faces(v)
                            .into_iter()
                            .find_map(|f| self.leaves.face_owner(f))
                    })
                });
            match owner {
                Some(leaf) => {
                    self.leaves.add_unique_vert(leaf, m);
                    self.leaves
                        .mark_dirty(leaf, LeafFlags::UPDATE_ALL | LeafFlags::UPDATE_BB);
                }
                None => warn!(?m, "split midpoint found no owning leaf"),
            }
        }

        // Phase 2: re-triangulate each affected face from its tagged-corner
        // mask.
        for &f in &faces {
            if self.mesh.face(f).is_none() {
                continue;
            }
            if let Some(face) = self.mesh.face_mut(f) {
                face.flags.remove(TAG);
            }
            let leaf = self.leaves.face_owner(f);

            let mut mask = 0usize;
            for (j, l) in self.mesh.face_loops(f).iter().enumerate() {
                let tagged = self
                    .mesh
                    .loop_ref(*l)
                    .and_then(|ll| self.mesh.vert(ll.v))
                    .map(|v| v.flags.contains(TAG))
                    .unwrap_or(false);
                if tagged {
                    mask |= 1 << j;
                }
            }

            if mask >= SPLIT_PATTERNS.len() {
                warn!(?f, mask, "split pattern mask out of range");
                self.log.face_added(self.mesh, f);
                continue;
            }
            let pat = &SPLIT_PATTERNS[mask];
            let n = pat[0];
            if n < 0 {
                self.log.face_added(self.mesh, f);
                continue;
            }
            if Some(n as u32) != self.mesh.face(f).map(|face| face.len) {
                warn!(?f, mask, "split pattern does not match face length");
                self.log.face_added(self.mesh, f);
                continue;
            }

            let vs = self.mesh.face_verts(f);
            let mut cur = f;
            let mut new_faces: SmallVec<[FaceId; 4]> = SmallVec::new();

            for j in 0..n as usize {
                let conn = pat[j + 1];
                if conn < 0 {
                    continue;
                }
                let (va, vb) = (vs[j], vs[conn as usize]);

                let loops = self.mesh.find_face_loops_of_verts(cur, &[va, vb]);
                let (Some(la), Some(lb)) = (loops[0], loops[1]) else {
                    warn!(?cur, "pattern diagonal endpoints not found in face");
                    continue;
                };

                let log_edge = self.mesh.edge_exists(va, vb).is_none();
                let (newf, l_diag) = match self.mesh.face_split(cur, la, lb) {
                    Ok(r) => r,
                    Err(err) => {
                        warn!(?cur, %err, "pattern face split failed");
                        continue;
                    }
                };
                if log_edge {
                    if let Some(e_diag) = self.mesh.loop_ref(l_diag).map(|ll| ll.e) {
                        self.log.edge_added(self.mesh, e_diag);
                    }
                }

                // New faces inherit the parent's leaf when everything in
                // sight is still owned; otherwise the hierarchy places them.
                let adopt = leaf.filter(|_| {
                    self.leaves.vert_owner(va).is_some() && self.leaves.vert_owner(vb).is_some()
                });
                if let Some(leaf) = adopt {
                    self.leaves.add_face_to_leaf(leaf, newf);
                }

                new_faces.push(newf);
                cur = newf;
            }

            for &nf in &new_faces {
                if self.leaves.face_owner(nf).is_none() {
                    self.face_add(nf, false, true);
                }
                self.log.face_added(self.mesh, nf);
            }
            if self.leaves.face_owner(f).is_none() {
                self.face_add(f, false, true);
            }
            self.log.face_added(self.mesh, f);
        }

        // The split tag on new midpoints has served its purpose.
        for &e in edges {
            let Some(edge) = self.mesh.edge(e) else {
                continue;
            };
            for v in [edge.v1, edge.v2] {
                if let Some(vert) = self.mesh.vert_mut(v) {
                    vert.flags.remove(TAG);
                }
            }
        }
    }
}
