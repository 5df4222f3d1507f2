//! Remesh driver: orchestrates collapse → subdivide → cleanup over one
//! query region, then lets the hierarchy split overgrown leaves and refresh
//! its caches.

use glam::Vec3;
use tracing::debug;

use topomesh::{FaceId, Mesh, TopologyLog, VertId};

use crate::annotate::{AnnoFlags, VertAnnotations};
use crate::config::{RemeshConfig, RemeshParams, TopologyMode};
use crate::error::RemeshError;
use crate::hierarchy::Hierarchy;
use crate::leaves::{LeafFlags, LeafId, Leaves};
use crate::queue::Region;

/// The remeshing engine. Borrows the mesh and its side structures for a
/// stroke's worth of topology updates; mutation is single-threaded and owned
/// by this struct, scans fan out read-only.
pub struct Remesher<'a> {
    pub mesh: &'a mut Mesh,
    pub anno: &'a mut VertAnnotations,
    pub leaves: &'a mut Leaves,
    pub log: &'a mut dyn TopologyLog,
    pub hierarchy: &'a mut dyn Hierarchy,
    pub config: RemeshConfig,
    /// Current stroke id; original-data snapshots refresh when it changes.
    pub stroke_id: u32,
    /// Set when a pass trips over a corrupted leaf-index table; the running
    /// phase aborts and the host is expected to rebuild membership.
    pub(crate) corrupt: bool,
}

impl<'a> Remesher<'a> {
    pub fn new(
        mesh: &'a mut Mesh,
        anno: &'a mut VertAnnotations,
        leaves: &'a mut Leaves,
        log: &'a mut dyn TopologyLog,
        hierarchy: &'a mut dyn Hierarchy,
        config: RemeshConfig,
    ) -> Self {
        Self {
            mesh,
            anno,
            leaves,
            log,
            hierarchy,
            config,
            stroke_id: 0,
            corrupt: false,
        }
    }

    /// Whether a pass aborted on a corrupted leaf-index side table.
    pub fn take_corruption(&mut self) -> Result<(), RemeshError> {
        if std::mem::take(&mut self.corrupt) {
            Err(RemeshError::CorruptLeafIndex)
        } else {
            Ok(())
        }
    }

    /// Run the requested topology passes over the query region. Returns
    /// whether the mesh changed.
    ///
    /// Pass order is fixed: collapse strictly precedes subdivide strictly
    /// precedes cleanup. Each pass rebuilds its queue from current state, so
    /// earlier passes feed later ones naturally.
    pub fn update_topology(&mut self, params: &RemeshParams<'_>) -> bool {
        let mut modified = false;
        let mut watchlist: Vec<VertId> = Vec::new();

        if params.mode.contains(TopologyMode::COLLAPSE) {
            self.log.entry_push("collapse");
            let mut queue = self.short_edge_queue_create(params);

            // Rate limiter: skinny-edge soups make every collapse spawn new
            // short edges; throttle the step budget by how far the queue's
            // average length sits below the target band.
            let mut ratio = 1.0f32;
            if queue.stats.count > 0.0 {
                let avg = queue.stats.mean();
                let mut emax = queue.stats.len_max;
                if emax == 0.0 {
                    emax = 1.0e-4;
                }
                if self.config.min_edge_len > 0.0 && avg > 0.0 {
                    ratio = (avg / (self.config.min_edge_len * 0.5 + emax * 0.5))
                        .clamp(0.25, 5.0);
                }
            }
            let max_steps = (self.config.max_steps as f32 * ratio) as usize;
            debug!(
                queued = queue.len(),
                max_steps, ratio, "collapse phase starting"
            );
            modified |= self.collapse_short_edges(&mut queue, params, max_steps);
        }

        if params.mode.contains(TopologyMode::SUBDIVIDE) {
            self.log.entry_push("subdivide");
            let mut queue = self.long_edge_queue_create(params, &mut watchlist);

            // Step budget proportional to how many target-sized triangles
            // the brush disk covers.
            let target = self.config.min_edge_len * 0.5 + self.config.max_edge_len * 0.5;
            let brush_area = if target > 0.0 {
                let r = params.radius / target;
                r * r * std::f32::consts::PI
            } else {
                0.0
            };
            let max_steps = brush_area as usize;
            debug!(
                queued = queue.len(),
                max_steps, brush_area, "subdivide phase starting"
            );
            modified |= self.subdivide_long_edges(&mut queue, params, &mut watchlist, max_steps);
        }

        // Without a subdivide scan the cleanup watchlist must be gathered by
        // hand from the leaves' unique vertices.
        if params.mode.contains(TopologyMode::CLEANUP)
            && !params.mode.contains(TopologyMode::SUBDIVIDE)
        {
            self.gather_low_valence_verts(params, &mut watchlist);
        }

        for &v in &watchlist {
            self.anno.clear_flags(v, AnnoFlags::VALENCE_SCRATCH);
        }

        if params.mode.contains(TopologyMode::CLEANUP) {
            self.log.entry_push("cleanup");
            modified |= self.cleanup_valence_3_4(&watchlist, params);
        }

        // Clear the per-call topology flags; on change, let the hierarchy
        // split any leaf that outgrew its face budget. The leaf list is
        // snapshotted first so freshly split leaves are not re-walked.
        let flagged: Vec<LeafId> = self
            .leaves
            .iter()
            .filter(|(_, leaf)| leaf.flags.contains(LeafFlags::UPDATE_TOPOLOGY))
            .map(|(id, _)| id)
            .collect();
        for id in flagged {
            if let Some(leaf) = self.leaves.leaf_mut(id) {
                leaf.flags.remove(LeafFlags::UPDATE_TOPOLOGY);
            }
            if modified && params.update_hierarchy {
                self.hierarchy.node_limit_ensure(self.mesh, self.leaves, id);
            }
        }

        // Triangulation caches on dirty leaves are always refreshed.
        let dirty: Vec<LeafId> = self
            .leaves
            .iter()
            .filter(|(_, leaf)| leaf.flags.contains(LeafFlags::UPDATE_TRIS))
            .map(|(id, _)| id)
            .collect();
        for id in dirty {
            self.hierarchy.check_tris(self.mesh, self.leaves, id);
            if let Some(leaf) = self.leaves.leaf_mut(id) {
                leaf.flags.remove(LeafFlags::UPDATE_TRIS);
            }
        }

        modified
    }

    fn gather_low_valence_verts(
        &mut self,
        params: &RemeshParams<'_>,
        watchlist: &mut Vec<VertId>,
    ) {
        let region = Region::new(params);
        let candidates: Vec<VertId> = self
            .leaves
            .iter()
            .filter(|(_, leaf)| leaf.flags.contains(LeafFlags::UPDATE_TOPOLOGY))
            .flat_map(|(_, leaf)| leaf.verts.iter().copied())
            .collect();

        for v in candidates {
            let Some(vert) = self.mesh.vert(v) else {
                continue;
            };
            if !region.vert_in_range(vert.co.get()) {
                continue;
            }
            if params.use_frontface {
                if let Some(view) = params.view_normal {
                    if vert.no.dot(view) < 0.0 {
                        continue;
                    }
                }
            }
            if self.anno.flags(v).contains(AnnoFlags::NEEDS_VALENCE) {
                self.anno.update_valence(self.mesh, v);
            }
            if self.anno.get(v).valence < 5 {
                self.watchlist_push(watchlist, v);
            }
        }
    }

    // ========================================================================
    // Host-facing element operations
    // ========================================================================

    /// Create a vertex, choosing an owning leaf by bounding box when none is
    /// given.
    pub fn vert_create(
        &mut self,
        co: Vec3,
        no: Vec3,
        leaf: Option<LeafId>,
        example: Option<VertId>,
    ) -> VertId {
        let chosen = leaf.or_else(|| {
            let mut fallback = None;
            for (id, l) in self.leaves.iter() {
                fallback = Some(id);
                if l.bounds.contains_point(co) {
                    return Some(id);
                }
            }
            fallback
        });

        match chosen {
            Some(leaf) => self.vert_create_in_leaf(leaf, co, no, example),
            None => {
                tracing::warn!("vertex created with no leaf to own it");
                let v = self.mesh.vert_create(co, no, example);
                self.anno.mark_new(v, co, no, self.stroke_id);
                self.log.vert_added(self.mesh, v);
                v
            }
        }
    }

    /// Create a triangle, adopting a leaf from the surrounding geometry or
    /// falling back to a bounding-box walk.
    pub fn face_create(
        &mut self,
        v_tri: [VertId; 3],
        e_tri: Option<[topomesh::EdgeId; 3]>,
        example: Option<FaceId>,
    ) -> Result<FaceId, RemeshError> {
        let mut leaf = v_tri.iter().find_map(|&v| {
            self.mesh
                .vert_faces(v)
                .into_iter()
                .find_map(|f| self.leaves.face_owner(f))
        });

        if leaf.is_none() {
            for (id, l) in self.leaves.iter() {
                let in_bounds = v_tri
                    .iter()
                    .any(|&v| l.bounds.contains_point(self.mesh.vert_co(v)));
                if in_bounds && (leaf.is_none() || l.faces.len() < self.leaves.leaf_limit) {
                    leaf = Some(id);
                    break;
                }
            }
        }

        let Some(leaf) = leaf else {
            tracing::warn!("face created with no leaf to own it");
            let f = self
                .mesh
                .face_create(&v_tri, None, example)
                .map_err(|_| RemeshError::DegenerateFace)?;
            self.log.face_added(self.mesh, f);
            return Ok(f);
        };
        self.face_create_in_leaf(leaf, v_tri, e_tri, example, true, true)
            .ok_or(RemeshError::DegenerateFace)
    }

    /// Detach a face from its leaf (and log it); the host owns the kill.
    pub fn remove_face(&mut self, f: FaceId, log: bool) {
        self.face_remove(f, log, true, true);
    }

    /// Detach a vertex from its leaf (and log it).
    pub fn remove_vert(&mut self, v: VertId, log: bool) {
        self.vert_remove_log(v, log);
    }

    /// Place a host-created face into the hierarchy.
    pub fn add_face(&mut self, f: FaceId, log: bool, force_tree_walk: bool) {
        self.face_add(f, log, force_tree_walk);
    }
}
