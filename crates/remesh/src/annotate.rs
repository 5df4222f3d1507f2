//! Per-vertex annotation side table.
//!
//! The engine keeps remeshing state off the mesh proper: cached valence,
//! boundary/corner classification, original-data snapshots keyed by stroke,
//! and the lazy "needs" bits that say which of those are stale. Mutation
//! paths set the needs bits; readers restore the invariant on demand.

use glam::Vec3;

use topomesh::{HeadFlags, Mesh, VertId};

/// Annotation flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnnoFlags(pub u16);

impl AnnoFlags {
    pub const NEEDS_VALENCE: u16 = 1 << 0;
    pub const NEEDS_BOUNDARY: u16 = 1 << 1;
    pub const NEEDS_DISK_SORT: u16 = 1 << 2;
    pub const NEEDS_TRIANGULATE: u16 = 1 << 3;
    /// Scratch bit for watchlist deduplication within one call.
    pub const VALENCE_SCRATCH: u16 = 1 << 4;

    pub const BOUNDARY: u16 = 1 << 5;
    pub const FSET_BOUNDARY: u16 = 1 << 6;
    pub const SHARP_BOUNDARY: u16 = 1 << 7;
    pub const SEAM_BOUNDARY: u16 = 1 << 8;
    pub const CORNER: u16 = 1 << 9;
    pub const FSET_CORNER: u16 = 1 << 10;
    pub const SHARP_CORNER: u16 = 1 << 11;
    pub const SEAM_CORNER: u16 = 1 << 12;

    pub const SMOOTH_BOUNDARY: u16 = Self::BOUNDARY | Self::FSET_BOUNDARY | Self::SHARP_BOUNDARY;
    pub const ALL_BOUNDARY: u16 = Self::SMOOTH_BOUNDARY | Self::SEAM_BOUNDARY;
    pub const SMOOTH_CORNER: u16 = Self::CORNER | Self::FSET_CORNER | Self::SHARP_CORNER;
    pub const ALL_CORNER: u16 = Self::SMOOTH_CORNER | Self::SEAM_CORNER;

    const CLASS_BITS: u16 = Self::ALL_BOUNDARY | Self::ALL_CORNER;

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

    #[inline]
    pub fn masked(self, bits: u16) -> u16 {
        self.0 & bits
    }
}

/// Per-vertex engine state.
#[derive(Debug, Clone)]
pub struct VertAnno {
    /// Position snapshot for host undo/restore.
    pub orig_co: Vec3,
    /// Normal snapshot.
    pub orig_no: Vec3,
    /// Mask snapshot.
    pub orig_mask: f32,
    /// Which stroke the snapshot belongs to.
    pub stroke_id: u32,
    /// Cached incident-edge count; valid only when NEEDS_VALENCE is clear.
    pub valence: u32,
    pub flags: AnnoFlags,
}

impl Default for VertAnno {
    fn default() -> Self {
        Self {
            orig_co: Vec3::ZERO,
            orig_no: Vec3::Z,
            orig_mask: 0.0,
            stroke_id: u32::MAX,
            valence: 0,
            flags: AnnoFlags(
                AnnoFlags::NEEDS_VALENCE | AnnoFlags::NEEDS_BOUNDARY | AnnoFlags::NEEDS_DISK_SORT,
            ),
        }
    }
}

/// Side table of [`VertAnno`] records, indexed by vertex slot.
#[derive(Debug, Clone, Default)]
pub struct VertAnnotations {
    data: Vec<VertAnno>,
}

impl VertAnnotations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table sized for `mesh`, everything marked stale.
    pub fn for_mesh(mesh: &Mesh) -> Self {
        Self {
            data: vec![VertAnno::default(); mesh.vert_slots()],
        }
    }

    fn ensure(&mut self, v: VertId) {
        if v.index() >= self.data.len() {
            self.data.resize(v.index() + 1, VertAnno::default());
        }
    }

    /// Shared read; default (all-stale) record for unseen slots.
    pub fn get(&self, v: VertId) -> VertAnno {
        self.data.get(v.index()).cloned().unwrap_or_default()
    }

    pub fn flags(&self, v: VertId) -> AnnoFlags {
        self.data
            .get(v.index())
            .map(|a| a.flags)
            .unwrap_or_else(|| VertAnno::default().flags)
    }

    pub fn get_mut(&mut self, v: VertId) -> &mut VertAnno {
        self.ensure(v);
        &mut self.data[v.index()]
    }

    /// Reset the record for a freshly created vertex.
    pub fn mark_new(&mut self, v: VertId, co: Vec3, no: Vec3, stroke_id: u32) {
        self.ensure(v);
        self.data[v.index()] = VertAnno {
            orig_co: co,
            orig_no: no,
            orig_mask: 0.0,
            stroke_id,
            ..VertAnno::default()
        };
    }

    pub fn add_flags(&mut self, v: VertId, bits: u16) {
        self.get_mut(v).flags.insert(bits);
    }

    pub fn clear_flags(&mut self, v: VertId, bits: u16) {
        self.get_mut(v).flags.remove(bits);
    }

    /// Recount incident edges and clear NEEDS_VALENCE.
    pub fn update_valence(&mut self, mesh: &Mesh, v: VertId) -> u32 {
        let valence = mesh.vert_edge_count(v) as u32;
        let anno = self.get_mut(v);
        anno.valence = valence;
        anno.flags.remove(AnnoFlags::NEEDS_VALENCE);
        valence
    }

    /// Recompute boundary/corner classification from the disk cycle if the
    /// NEEDS_BOUNDARY bit is set.
    pub fn check_boundary(&mut self, mesh: &Mesh, v: VertId) {
        if !self.flags(v).contains(AnnoFlags::NEEDS_BOUNDARY) {
            return;
        }

        let mut bits = 0u16;
        let mut mesh_bound = 0u32;
        let mut seam_bound = 0u32;
        let mut sharp_bound = 0u32;
        let mut fset_bound = 0u32;

        for e in mesh.vert_edges(v) {
            let Some(edge) = mesh.edge(e) else {
                continue;
            };
            let loop_count = mesh.edge_loop_count_at_most(e, 3);
            if loop_count < 2 {
                bits |= AnnoFlags::BOUNDARY;
                mesh_bound += 1;
            }
            if edge.flags.contains(HeadFlags::SEAM) {
                bits |= AnnoFlags::SEAM_BOUNDARY;
                seam_bound += 1;
            }
            if edge.flags.contains(HeadFlags::SHARP) {
                bits |= AnnoFlags::SHARP_BOUNDARY;
                sharp_bound += 1;
            }
            if loop_count == 2 {
                if let Some((l0, l1)) = mesh.edge_loop_pair(e) {
                    let m0 = mesh
                        .loop_ref(l0)
                        .and_then(|l| mesh.face(l.f))
                        .map(|f| f.mat);
                    let m1 = mesh
                        .loop_ref(l1)
                        .and_then(|l| mesh.face(l.f))
                        .map(|f| f.mat);
                    if m0 != m1 {
                        bits |= AnnoFlags::FSET_BOUNDARY;
                        fset_bound += 1;
                    }
                }
            }
        }

        // Three or more boundary edges of a class pin the vertex down as a
        // corner of that class.
        if mesh_bound >= 3 {
            bits |= AnnoFlags::CORNER;
        }
        if seam_bound >= 3 {
            bits |= AnnoFlags::SEAM_CORNER;
        }
        if sharp_bound >= 3 {
            bits |= AnnoFlags::SHARP_CORNER;
        }
        if fset_bound >= 3 {
            bits |= AnnoFlags::FSET_CORNER;
        }

        let anno = self.get_mut(v);
        anno.flags.remove(AnnoFlags::CLASS_BITS);
        anno.flags.insert(bits);
        anno.flags.remove(AnnoFlags::NEEDS_BOUNDARY);
    }

    /// Capture original data for this stroke if the snapshot is stale.
    pub fn check_origdata(&mut self, mesh: &Mesh, v: VertId, stroke_id: u32, mask: f32) {
        self.ensure(v);
        let anno = &mut self.data[v.index()];
        if anno.stroke_id != stroke_id {
            if let Some(vert) = mesh.vert(v) {
                anno.orig_co = vert.co.get();
                anno.orig_no = vert.no;
            }
            anno.orig_mask = mask;
            anno.stroke_id = stroke_id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn fan() -> (Mesh, VertId, Vec<VertId>) {
        let mut m = Mesh::new();
        let center = m.vert_create(Vec3::ZERO, Vec3::Z, None);
        let ring: Vec<VertId> = (0..4)
            .map(|i| {
                let ang = i as f32 * std::f32::consts::TAU / 4.0;
                m.vert_create(Vec3::new(ang.cos(), ang.sin(), 0.0), Vec3::Z, None)
            })
            .collect();
        for i in 0..4 {
            m.face_create(&[center, ring[i], ring[(i + 1) % 4]], None, None)
                .unwrap();
        }
        (m, center, ring)
    }

    #[test]
    fn test_valence_cache() {
        let (m, center, _) = fan();
        let mut anno = VertAnnotations::for_mesh(&m);
        assert!(anno.flags(center).contains(AnnoFlags::NEEDS_VALENCE));
        assert_eq!(anno.update_valence(&m, center), 4);
        assert!(!anno.flags(center).contains(AnnoFlags::NEEDS_VALENCE));
    }

    #[test]
    fn test_interior_vs_boundary_classification() {
        let (m, center, ring) = fan();
        let mut anno = VertAnnotations::for_mesh(&m);

        anno.check_boundary(&m, center);
        assert_eq!(anno.flags(center).masked(AnnoFlags::ALL_BOUNDARY), 0);

        // Ring vertices sit on the mesh boundary (their rim edges have one
        // loop each), and two boundary edges is a chain, not a corner.
        anno.check_boundary(&m, ring[0]);
        assert!(anno.flags(ring[0]).contains(AnnoFlags::BOUNDARY));
        assert!(!anno.flags(ring[0]).contains(AnnoFlags::CORNER));
    }

    #[test]
    fn test_seam_classification() {
        let (mut m, center, ring) = fan();
        let e = m.edge_exists(center, ring[0]).unwrap();
        if let Some(edge) = m.edge_mut(e) {
            edge.flags.insert(HeadFlags::SEAM);
        }
        let mut anno = VertAnnotations::for_mesh(&m);
        anno.check_boundary(&m, center);
        assert!(anno.flags(center).contains(AnnoFlags::SEAM_BOUNDARY));
        assert!(!anno.flags(center).contains(AnnoFlags::SEAM_CORNER));
    }

    #[test]
    fn test_origdata_keyed_by_stroke() {
        let (m, center, _) = fan();
        let mut anno = VertAnnotations::for_mesh(&m);

        anno.check_origdata(&m, center, 7, 0.5);
        assert_eq!(anno.get(center).stroke_id, 7);
        assert_eq!(anno.get(center).orig_mask, 0.5);

        // Same stroke: snapshot untouched.
        anno.check_origdata(&m, center, 7, 0.9);
        assert_eq!(anno.get(center).orig_mask, 0.5);

        // New stroke: recaptured.
        anno.check_origdata(&m, center, 8, 0.9);
        assert_eq!(anno.get(center).orig_mask, 0.9);
    }
}
