//! Shared fixtures for the remesher integration tests.
#![allow(dead_code)]

use glam::Vec3;

use remesh::{
    AnnoFlags, BisectLeaves, Leaves, RemeshConfig, RemeshParams, Remesher, VertAnnotations,
};
use topomesh::{FaceId, MemoryLog, Mesh, VertId};

/// Everything a remesh call borrows, owned in one place.
pub struct Rig {
    pub mesh: Mesh,
    pub anno: VertAnnotations,
    pub leaves: Leaves,
    pub log: MemoryLog,
    pub hierarchy: BisectLeaves,
    pub config: RemeshConfig,
}

impl Rig {
    pub fn new(mesh: Mesh, min_edge_len: f32, max_edge_len: f32) -> Self {
        Self::with_leaf_limit(mesh, min_edge_len, max_edge_len, 10_000)
    }

    pub fn with_leaf_limit(
        mesh: Mesh,
        min_edge_len: f32,
        max_edge_len: f32,
        leaf_limit: usize,
    ) -> Self {
        let anno = VertAnnotations::for_mesh(&mesh);
        let leaves = Leaves::single_leaf_for_mesh(&mesh, leaf_limit);
        Self {
            mesh,
            anno,
            leaves,
            log: MemoryLog::new(),
            hierarchy: BisectLeaves,
            config: RemeshConfig {
                min_edge_len,
                max_edge_len,
                // Stochastic smoothing stays off unless a test opts in, so
                // geometric assertions stay exact.
                smooth_probability: 0.0,
                ..RemeshConfig::default()
            },
        }
    }

    /// Run one topology update; every leaf is re-flagged first the way a
    /// host stroke would.
    pub fn update(&mut self, params: &RemeshParams<'_>) -> bool {
        self.leaves.mark_all_topology();
        let mut remesher = Remesher::new(
            &mut self.mesh,
            &mut self.anno,
            &mut self.leaves,
            &mut self.log,
            &mut self.hierarchy,
            self.config.clone(),
        );
        remesher.update_topology(params)
    }

    /// Run until convergence (bounded), returning the number of modifying
    /// calls.
    pub fn update_until_stable(&mut self, params: &RemeshParams<'_>, max_calls: usize) -> usize {
        for call in 0..max_calls {
            if !self.update(params) {
                return call;
            }
        }
        max_calls
    }

    /// Structural + membership + annotation invariants, checked after every
    /// scenario.
    pub fn assert_valid(&self) {
        topomesh::validate(&self.mesh, true).expect("mesh connectivity");

        // Face ownership agrees between side table and leaf sets.
        for (f, _) in self.mesh.iter_faces() {
            match self.leaves.face_owner(f) {
                Some(leaf) => {
                    let l = self.leaves.leaf(leaf).expect("live leaf");
                    assert!(l.faces.contains(&f), "face {f:?} missing from its leaf");
                }
                None => {}
            }
        }
        let mut seen_faces = std::collections::HashSet::new();
        let mut seen_verts = std::collections::HashSet::new();
        for (id, leaf) in self.leaves.iter() {
            for &f in &leaf.faces {
                assert_eq!(self.leaves.face_owner(f), Some(id));
                assert!(seen_faces.insert(f), "face {f:?} owned twice");
            }
            for &v in &leaf.verts {
                assert_eq!(self.leaves.vert_owner(v), Some(id));
                assert!(seen_verts.insert(v), "vertex {v:?} owned twice");
            }
        }

        // Cached valences are correct wherever they claim to be.
        for (v, _) in self.mesh.iter_verts() {
            let anno = self.anno.get(v);
            if !anno.flags.contains(AnnoFlags::NEEDS_VALENCE) {
                assert_eq!(
                    anno.valence as usize,
                    self.mesh.vert_edge_count(v),
                    "stale cached valence on {v:?}"
                );
            }
        }
    }

    pub fn max_edge_len(&self) -> f32 {
        self.mesh
            .iter_edges()
            .map(|(_, e)| self.mesh.vert_co(e.v1).distance(self.mesh.vert_co(e.v2)))
            .fold(0.0, f32::max)
    }
}

/// Order-independent snapshot of mesh state for equality checks.
#[derive(Debug, PartialEq)]
pub struct MeshSignature {
    pub verts: Vec<(u32, [i64; 3])>,
    pub faces: Vec<[u32; 3]>,
}

pub fn mesh_signature(mesh: &Mesh) -> MeshSignature {
    let quantize = |p: Vec3| -> [i64; 3] {
        [
            (p.x as f64 * 1.0e6).round() as i64,
            (p.y as f64 * 1.0e6).round() as i64,
            (p.z as f64 * 1.0e6).round() as i64,
        ]
    };
    let mut verts: Vec<(u32, [i64; 3])> = mesh
        .iter_verts()
        .map(|(v, vv)| (v.0, quantize(vv.co.get())))
        .collect();
    verts.sort();
    let mut faces: Vec<[u32; 3]> = mesh
        .iter_faces()
        .map(|(f, _)| {
            let vs = mesh.face_verts(f);
            let mut key = [vs[0].0, vs[1].0, vs[2].0];
            key.sort_unstable();
            key
        })
        .collect();
    faces.sort();
    MeshSignature { verts, faces }
}

// ============================================================================
// Mesh builders
// ============================================================================

pub fn single_triangle() -> (Mesh, [VertId; 3]) {
    let mut m = Mesh::new();
    let a = m.vert_create(Vec3::new(0.0, 0.0, 0.0), Vec3::Z, None);
    let b = m.vert_create(Vec3::new(1.0, 0.0, 0.0), Vec3::Z, None);
    let c = m.vert_create(Vec3::new(0.0, 1.0, 0.0), Vec3::Z, None);
    m.face_create(&[a, b, c], None, None).unwrap();
    (m, [a, b, c])
}

/// Unit quad triangulated along the (0,0,0)–(1,1,0) diagonal.
pub fn quad_two_tris() -> (Mesh, [VertId; 4]) {
    let mut m = Mesh::new();
    let a = m.vert_create(Vec3::new(0.0, 0.0, 0.0), Vec3::Z, None);
    let b = m.vert_create(Vec3::new(1.0, 0.0, 0.0), Vec3::Z, None);
    let c = m.vert_create(Vec3::new(1.0, 1.0, 0.0), Vec3::Z, None);
    let d = m.vert_create(Vec3::new(0.0, 1.0, 0.0), Vec3::Z, None);
    m.face_create(&[a, b, c], None, None).unwrap();
    m.face_create(&[a, c, d], None, None).unwrap();
    (m, [a, b, c, d])
}

/// Valence-4 interior vertex at the origin with a 4-triangle fan.
pub fn valence4_fan() -> (Mesh, VertId, [VertId; 4]) {
    let mut m = Mesh::new();
    let center = m.vert_create(Vec3::ZERO, Vec3::Z, None);
    let ring = [
        m.vert_create(Vec3::new(1.0, 0.0, 0.0), Vec3::Z, None),
        m.vert_create(Vec3::new(0.0, 1.0, 0.0), Vec3::Z, None),
        m.vert_create(Vec3::new(-1.0, 0.0, 0.0), Vec3::Z, None),
        m.vert_create(Vec3::new(0.0, -1.0, 0.0), Vec3::Z, None),
    ];
    for i in 0..4 {
        m.face_create(&[center, ring[i], ring[(i + 1) % 4]], None, None)
            .unwrap();
    }
    (m, center, ring)
}

/// Triangulated n x n grid on the XY plane with `scale` spacing.
pub fn grid(n: usize, scale: f32) -> Mesh {
    let mut m = Mesh::new();
    let mut verts = Vec::new();
    for y in 0..=n {
        for x in 0..=n {
            verts.push(m.vert_create(
                Vec3::new(x as f32 * scale, y as f32 * scale, 0.0),
                Vec3::Z,
                None,
            ));
        }
    }
    let at = |x: usize, y: usize| verts[y * (n + 1) + x];
    for y in 0..n {
        for x in 0..n {
            m.face_create(&[at(x, y), at(x + 1, y), at(x + 1, y + 1)], None, None)
                .unwrap();
            m.face_create(&[at(x, y), at(x + 1, y + 1), at(x, y + 1)], None, None)
                .unwrap();
        }
    }
    m
}

#[allow(dead_code)]
pub fn face_of(mesh: &Mesh) -> Option<FaceId> {
    mesh.iter_faces().next().map(|(f, _)| f)
}
