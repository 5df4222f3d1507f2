//! Candidate edge queues.
//!
//! Queue construction runs in two phases. Phase A scans the leaves flagged
//! for topology update in parallel, one scratch buffer per leaf: workers
//! read geometry and annotations, cull back faces and out-of-range
//! triangles, chase the even-subdivision expansion across radial cycles,
//! and opportunistically relax vertex positions (the only mutation they are
//! allowed). Phase B merges the scratches single-threaded: valence and
//! boundary data is refreshed where stale, low-valence vertices join the
//! cleanup watchlist, and surviving candidates enter a priority heap keyed
//! so the longest (subdivide) or shortest (collapse) edge pops first.
//!
//! Entries carry the vertex pair rather than the edge id; edges freely die
//! between queueing and popping, and stale entries are skipped at pop time.

use std::cmp::Ordering;
use std::collections::HashSet;

use glam::Vec3;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use topomesh::{EdgeId, FaceId, Mesh, VertId};

use crate::annotate::{AnnoFlags, VertAnnotations};
use crate::config::{MaskFn, RemeshParams};
use crate::driver::Remesher;
use crate::elements::edge_mask_weight;
use crate::leaves::{Leaf, LeafFlags, LeafId};
use crate::smooth::smooth_vertex_safe;

/// Neighbour edges must beat the current edge by this factor before the
/// even-subdivision expansion chases them (avoids splitting faces that are
/// only slightly skinny).
pub(crate) const EVEN_EDGELEN_THRESHOLD: f32 = 1.2;
/// How much the expansion limit tightens per recursion generation (keeps the
/// expansion from wandering far from the region).
pub(crate) const EVEN_GENERATION_SCALE: f32 = 1.1;
/// Recursion depth past which the front-face test starts pruning.
pub(crate) const DEPTH_START_LIMIT: u32 = 5;
/// Priority assigned to fully mask-protected collapse candidates, pushing
/// them behind everything else.
const MASK_PROTECT_PENALTY: f32 = 100_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QueueKind {
    Subdivide,
    Collapse,
}

/// The query region: a sphere, or a disk projected along the view normal.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Region {
    pub center: Vec3,
    center_proj: Vec3,
    pub radius_sq: f32,
    view_normal: Vec3,
    use_view_normal: bool,
    projected: bool,
}

#[inline]
fn project_plane(p: Vec3, n: Vec3) -> Vec3 {
    p - n * p.dot(n)
}

/// Closest point to `p` on triangle `(a, b, c)`.
fn closest_point_triangle(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;

    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        return a + ab * (d1 / (d1 - d3));
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        return a + ac * (d2 / (d2 - d6));
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        return b + (c - b) * ((d4 - d3) / ((d4 - d3) + (d5 - d6)));
    }

    let denom = 1.0 / (va + vb + vc);
    a + ab * (vb * denom) + ac * (vc * denom)
}

impl Region {
    pub(crate) fn new(params: &RemeshParams<'_>) -> Self {
        let view_normal = params
            .view_normal
            .map(|n| n.normalize_or_zero())
            .unwrap_or(Vec3::ZERO);
        let has_view = view_normal != Vec3::ZERO;
        Self {
            center: params.center,
            center_proj: project_plane(params.center, view_normal),
            radius_sq: params.radius * params.radius,
            view_normal,
            use_view_normal: params.use_frontface && has_view,
            projected: params.use_projected && has_view,
        }
    }

    /// Whether the front-face filter rejects a face with this normal.
    #[inline]
    pub(crate) fn culled(&self, no: Vec3) -> bool {
        self.use_view_normal && no.dot(self.view_normal) < 0.0
    }

    #[inline]
    pub(crate) fn vert_in_range(&self, co: Vec3) -> bool {
        if self.projected {
            self.center_proj.distance_squared(project_plane(co, self.view_normal))
                <= self.radius_sq
        } else {
            self.center.distance_squared(co) <= self.radius_sq
        }
    }

    /// Region test for a triangle.
    ///
    /// Sphere mode uses a cheap approximation: the minimum squared distance
    /// from the center to the corners, the edge midpoints and the centroid.
    /// Projected mode projects everything onto the view plane and measures
    /// against the exact closest point on the projected triangle.
    pub(crate) fn tri_in_range(&self, mesh: &Mesh, f: FaceId) -> bool {
        let verts = mesh.face_verts(f);
        if verts.len() < 3 {
            return false;
        }
        let [a, b, c] = [
            mesh.vert_co(verts[0]),
            mesh.vert_co(verts[1]),
            mesh.vert_co(verts[2]),
        ];

        if self.projected {
            let pa = project_plane(a, self.view_normal);
            let pb = project_plane(b, self.view_normal);
            let pc = project_plane(c, self.view_normal);
            let closest = closest_point_triangle(self.center_proj, pa, pb, pc);
            return self.center_proj.distance_squared(closest) <= self.radius_sq;
        }

        let p = self.center;
        let mut dis = p.distance_squared(a);
        dis = dis.min(p.distance_squared(b));
        dis = dis.min(p.distance_squared(c));
        dis = dis.min(p.distance_squared((a + b) * 0.5));
        dis = dis.min(p.distance_squared((b + c) * 0.5));
        dis = dis.min(p.distance_squared((c + a) * 0.5));
        dis = dis.min(p.distance_squared((a + b + c) / 3.0));
        dis <= self.radius_sq
    }
}

/// A queued candidate. The pair outlives the edge, so pops re-resolve it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct QueueEntry {
    pub v1: VertId,
    pub v2: VertId,
    pub priority: f32,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap behaviour: the smallest priority pops first.
        other
            .priority
            .partial_cmp(&self.priority)
            .unwrap_or(Ordering::Equal)
    }
}

/// Edge length statistics accumulated while filling the queue; the collapse
/// rate limiter reads these.
#[derive(Debug, Clone, Copy)]
pub(crate) struct QueueStats {
    pub len_sum: f32,
    pub len_min: f32,
    pub len_max: f32,
    pub count: f32,
}

impl Default for QueueStats {
    fn default() -> Self {
        Self {
            len_sum: 0.0,
            len_min: f32::MAX,
            len_max: -f32::MAX,
            count: 0.0,
        }
    }
}

impl QueueStats {
    pub fn mean(&self) -> f32 {
        if self.count > 0.0 {
            self.len_sum / self.count
        } else {
            0.0
        }
    }
}

/// Priority container of edge candidates for one pass.
pub(crate) struct EdgeQueue {
    heap: std::collections::BinaryHeap<QueueEntry>,
    pub region: Region,
    pub limit_len: f32,
    pub limit_len_sq: f32,
    pub stats: QueueStats,
}

impl EdgeQueue {
    pub fn new(region: Region, limit_len: f32) -> Self {
        Self {
            heap: std::collections::BinaryHeap::new(),
            region,
            limit_len,
            limit_len_sq: limit_len * limit_len,
            stats: QueueStats::default(),
        }
    }

    /// Push a candidate unless an endpoint is hidden; tracks length stats.
    pub fn insert(&mut self, mesh: &Mesh, v1: VertId, v2: VertId, priority: f32) {
        use topomesh::HeadFlags;
        let hidden = [v1, v2].iter().any(|&v| {
            mesh.vert(v)
                .map(|vv| vv.flags.contains(HeadFlags::HIDDEN))
                .unwrap_or(true)
        });
        if hidden {
            return;
        }

        let dis = mesh.vert_co(v1).distance(mesh.vert_co(v2));
        self.stats.len_sum += dis;
        self.stats.len_min = self.stats.len_min.min(dis);
        self.stats.len_max = self.stats.len_max.max(dis);
        self.stats.count += 1.0;

        self.heap.push(QueueEntry { v1, v2, priority });
    }

    pub fn pop(&mut self) -> Option<QueueEntry> {
        self.heap.pop()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }
}

/// Per-leaf scratch output of the parallel scan.
#[derive(Debug, Default)]
pub(crate) struct LeafScratch {
    edges: Vec<EdgeId>,
    seen: HashSet<EdgeId>,
    lowval: Vec<VertId>,
}

/// Read-only context shared by all scan workers.
struct ScanCtx<'a> {
    mesh: &'a Mesh,
    anno: &'a VertAnnotations,
    region: Region,
    mask: Option<MaskFn<'a>>,
    kind: QueueKind,
    limit_len: f32,
    limit_len_sq: f32,
    smooth_factor: f32,
    smooth_probability: f32,
    seed: u64,
}

#[inline]
fn edge_len_sq(mesh: &Mesh, v1: VertId, v2: VertId) -> f32 {
    mesh.vert_co(v1).distance_squared(mesh.vert_co(v2))
}

fn scratch_insert(scratch: &mut LeafScratch, e: EdgeId) {
    if scratch.seen.insert(e) {
        scratch.edges.push(e);
    }
}

/// Even-subdivision expansion: follow the radial cycle of a matched edge and
/// queue neighbours that exceed (subdivide) or undercut (collapse) both the
/// relative threshold and the generation-scaled base limit. The front-face
/// test only starts pruning a few generations out, so splits stay watertight
/// near the silhouette.
fn expand_recursive(
    ctx: &ScanCtx<'_>,
    scratch: &mut LeafScratch,
    l_edge: topomesh::LoopId,
    l_end: topomesh::LoopId,
    len_sq: f32,
    mut limit_len: f32,
    depth: u32,
) {
    let Some(start) = ctx.mesh.loop_ref(l_edge) else {
        return;
    };
    if scratch.seen.contains(&start.e) {
        return;
    }

    if depth > DEPTH_START_LIMIT {
        let face_no = ctx.mesh.face(start.f).map(|f| f.no).unwrap_or(Vec3::ZERO);
        if ctx.region.culled(face_no) {
            return;
        }
    }

    scratch_insert(scratch, start.e);

    if start.radial_next == l_edge {
        return;
    }

    let (len_sq_cmp, limit_sq) = match ctx.kind {
        QueueKind::Subdivide => {
            limit_len *= EVEN_GENERATION_SCALE;
            (len_sq * EVEN_EDGELEN_THRESHOLD, limit_len * limit_len)
        }
        QueueKind::Collapse => {
            limit_len /= EVEN_GENERATION_SCALE;
            (len_sq / EVEN_EDGELEN_THRESHOLD, limit_len * limit_len)
        }
    };

    let mut l_iter = l_edge;
    loop {
        let Some(iter) = ctx.mesh.loop_ref(l_iter) else {
            return;
        };
        for l_adj in [iter.next, iter.prev] {
            let Some(adj) = ctx.mesh.loop_ref(l_adj) else {
                continue;
            };
            let Some(edge) = ctx.mesh.edge(adj.e) else {
                continue;
            };
            let w = edge_mask_weight(ctx.mask, edge.v1, edge.v2);
            let mut other = edge_len_sq(ctx.mesh, edge.v1, edge.v2);

            let qualifies = match ctx.kind {
                QueueKind::Subdivide => {
                    other *= w * w;
                    other > len_sq_cmp.max(limit_sq)
                }
                QueueKind::Collapse => {
                    if w <= 0.0 {
                        continue;
                    }
                    other /= w * w;
                    other < len_sq_cmp.min(limit_sq)
                }
            };
            if qualifies {
                expand_recursive(ctx, scratch, adj.radial_next, l_adj, other, limit_len, depth + 1);
            }
        }

        let Some(next) = ctx.mesh.loop_ref(l_iter).map(|l| l.radial_next) else {
            return;
        };
        l_iter = next;
        if l_iter == l_end {
            break;
        }
    }
}

fn scan_leaf(ctx: &ScanCtx<'_>, leaf_id: LeafId, leaf: &Leaf) -> LeafScratch {
    let mut scratch = LeafScratch::default();
    let mut rng = SmallRng::seed_from_u64(
        ctx.seed ^ (leaf_id.0 as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15),
    );

    for &f in &leaf.faces {
        let Some(face) = ctx.mesh.face(f) else {
            continue;
        };
        if ctx.region.culled(face.no) {
            continue;
        }
        if !ctx.region.tri_in_range(ctx.mesh, f) {
            continue;
        }

        for l in ctx.mesh.face_loops(f) {
            let Some(ll) = ctx.mesh.loop_ref(l) else {
                continue;
            };

            // Valence cannot be refreshed from a worker; stale entries are
            // handed to the merge, which de-duplicates and re-checks.
            let rec = ctx.anno.get(ll.v);
            if rec.valence < 5 || rec.flags.contains(AnnoFlags::NEEDS_VALENCE) {
                scratch.lowval.push(ll.v);
            }

            if ctx.smooth_probability > 0.0 && rng.gen::<f32>() < ctx.smooth_probability {
                smooth_vertex_safe(ctx.mesh, ctx.anno, ll.v, ctx.smooth_factor);
            }

            let Some(edge) = ctx.mesh.edge(ll.e) else {
                continue;
            };
            let w = edge_mask_weight(ctx.mask, edge.v1, edge.v2);
            match ctx.kind {
                QueueKind::Subdivide => {
                    let len_sq = edge_len_sq(ctx.mesh, edge.v1, edge.v2) * w * w;
                    if len_sq > ctx.limit_len_sq {
                        expand_recursive(ctx, &mut scratch, ll.radial_next, l, len_sq, ctx.limit_len, 0);
                    }
                }
                QueueKind::Collapse => {
                    if w <= 0.0 {
                        continue;
                    }
                    let len_sq = edge_len_sq(ctx.mesh, edge.v1, edge.v2) / (w * w);
                    if len_sq < ctx.limit_len_sq {
                        expand_recursive(ctx, &mut scratch, ll.radial_next, l, len_sq, ctx.limit_len, 0);
                    }
                }
            }
        }
    }

    scratch
}

impl Remesher<'_> {
    fn scan_leaves(&self, params: &RemeshParams<'_>, kind: QueueKind, region: Region, limit_len: f32) -> Vec<LeafScratch> {
        let leaf_ids: Vec<LeafId> = self
            .leaves
            .iter()
            .filter(|(_, leaf)| {
                leaf.flags.contains(LeafFlags::UPDATE_TOPOLOGY)
                    && !leaf.flags.contains(LeafFlags::FULLY_HIDDEN)
            })
            .map(|(id, _)| id)
            .collect();

        let ctx = ScanCtx {
            mesh: &*self.mesh,
            anno: &*self.anno,
            region,
            mask: params.mask,
            kind,
            limit_len,
            limit_len_sq: limit_len * limit_len,
            smooth_factor: self.config.smooth_factor,
            smooth_probability: self.config.smooth_probability,
            seed: params.seed,
        };
        let leaves = &*self.leaves;

        leaf_ids
            .par_iter()
            .map(|&id| match leaves.leaf(id) {
                Some(leaf) => scan_leaf(&ctx, id, leaf),
                None => LeafScratch::default(),
            })
            .collect()
    }

    /// Build the long-edge (subdivide) queue. Low-valence vertices found on
    /// the way land on `watchlist` for the cleanup pass.
    pub(crate) fn long_edge_queue_create(
        &mut self,
        params: &RemeshParams<'_>,
        watchlist: &mut Vec<VertId>,
    ) -> EdgeQueue {
        let region = Region::new(params);
        let limit_len = self.config.max_edge_len;
        let scratches = self.scan_leaves(params, QueueKind::Subdivide, region, limit_len);

        let mut queue = EdgeQueue::new(region, limit_len);
        let mut seen: HashSet<EdgeId> = HashSet::new();

        for scratch in scratches {
            for v in scratch.lowval {
                if self.mesh.vert(v).is_none() {
                    continue;
                }
                if self.anno.flags(v).contains(AnnoFlags::NEEDS_VALENCE) {
                    self.anno.update_valence(self.mesh, v);
                }
                if self.anno.get(v).valence < 5 {
                    self.watchlist_push(watchlist, v);
                }
            }

            for e in scratch.edges {
                if !seen.insert(e) {
                    continue;
                }
                let Some((v1, v2)) = self.mesh.edge(e).map(|ee| (ee.v1, ee.v2)) else {
                    continue;
                };

                for v in [v1, v2] {
                    if self.anno.flags(v).contains(AnnoFlags::NEEDS_VALENCE) {
                        self.anno.update_valence(self.mesh, v);
                    }
                    if self.anno.get(v).valence < 5 {
                        self.watchlist_push(watchlist, v);
                    }
                }

                self.check_vert_fan_tris(v1);
                self.check_vert_fan_tris(v2);
                if self.mesh.edge(e).is_none() {
                    continue;
                }

                let w = edge_mask_weight(params.mask, v1, v2);
                let len_sq = edge_len_sq(self.mesh, v1, v2);
                queue.insert(self.mesh, v1, v2, -(len_sq * w * w));
            }
        }

        queue
    }

    /// Build the short-edge (collapse) queue.
    pub(crate) fn short_edge_queue_create(&mut self, params: &RemeshParams<'_>) -> EdgeQueue {
        let region = Region::new(params);
        let limit_len = self.config.min_edge_len;
        let scratches = self.scan_leaves(params, QueueKind::Collapse, region, limit_len);

        let mut queue = EdgeQueue::new(region, limit_len);
        let mut seen: HashSet<EdgeId> = HashSet::new();

        for scratch in scratches {
            for e in scratch.edges {
                if !seen.insert(e) {
                    continue;
                }
                let Some((v1, v2)) = self.mesh.edge(e).map(|ee| (ee.v1, ee.v2)) else {
                    continue;
                };

                // Refresh endpoint classification; the compatibility checks
                // themselves run at pop time against current state.
                self.anno.check_boundary(self.mesh, v1);
                self.anno.check_boundary(self.mesh, v2);

                let w2 = edge_mask_weight(params.mask, v1, v2);
                let mut priority = edge_len_sq(self.mesh, v1, v2);
                if w2 > 0.0 {
                    priority /= w2 * w2;
                } else {
                    priority = MASK_PROTECT_PENALTY;
                }
                queue.insert(self.mesh, v1, v2, priority);
            }
        }

        queue
    }
}
