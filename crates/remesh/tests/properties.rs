//! Invariant and round-trip properties checked after whole remesh calls.

mod common;

use common::{grid, mesh_signature, quad_two_tris, single_triangle, valence4_fan, Rig};

use glam::Vec3;
use remesh::{RemeshParams, TopologyMode};

/// Structural invariants hold after a mixed collapse/subdivide/cleanup run
/// over a real grid: triangles only, sound radial and disk cycles, no
/// duplicate triangles, single ownership, honest valence caches.
#[test]
fn invariants_hold_after_mixed_run() {
    let mut rig = Rig::new(grid(6, 0.4), 0.15, 0.45);
    let params = RemeshParams::sphere(Vec3::new(1.2, 1.2, 0.0), 1.5);

    for _ in 0..4 {
        rig.update(&params);
        rig.assert_valid();
    }
}

/// Invariants survive hierarchy splitting when leaves outgrow their limit.
#[test]
fn invariants_hold_across_leaf_splits() {
    let (mesh, _) = single_triangle();
    let mut rig = Rig::with_leaf_limit(mesh, 0.02, 0.08, 32);
    let params = RemeshParams::sphere(Vec3::new(0.33, 0.33, 0.0), 10.0)
        .with_mode(TopologyMode::SUBDIVIDE);

    rig.update_until_stable(&params, 40);
    assert!(
        rig.leaves.len() > 1,
        "subdivision past the leaf limit must split leaves"
    );
    for (_, leaf) in rig.leaves.iter() {
        assert!(leaf.faces.len() <= 32);
    }
    rig.assert_valid();
}

/// Replaying the log in reverse restores the exact pre-call mesh.
#[test]
fn log_reverse_replay_restores_mesh() {
    let mut rig = Rig::new(grid(4, 0.5), 0.2, 0.6);
    let before = mesh_signature(&rig.mesh);

    let params = RemeshParams::sphere(Vec3::new(1.0, 1.0, 0.0), 2.5);
    assert!(rig.update(&params));
    assert_ne!(mesh_signature(&rig.mesh), before, "run must change the mesh");

    rig.log.undo_all(&mut rig.mesh).expect("reverse replay");
    assert_eq!(mesh_signature(&rig.mesh), before);
    topomesh::validate(&rig.mesh, true).expect("restored connectivity");
}

/// Collapse with a zero-radius region is a no-op.
#[test]
fn zero_radius_collapse_is_noop() {
    let (mesh, _) = quad_two_tris();
    let mut rig = Rig::new(mesh, 2.0, 5.0);
    let before = mesh_signature(&rig.mesh);

    let params = RemeshParams::sphere(Vec3::new(0.33, 0.33, 0.0), 0.0)
        .with_mode(TopologyMode::COLLAPSE);
    assert!(!rig.update(&params));
    assert_eq!(mesh_signature(&rig.mesh), before);
}

/// On a converged mesh, subdivide-then-collapse with the same thresholds
/// changes nothing further.
#[test]
fn converged_mesh_is_stable() {
    let (mesh, _) = single_triangle();
    let mut rig = Rig::new(mesh, 0.05, 0.3);
    let sphere = RemeshParams::sphere(Vec3::new(0.33, 0.33, 0.0), 10.0);

    rig.update_until_stable(&sphere.with_mode(TopologyMode::SUBDIVIDE), 32);
    let converged = mesh_signature(&rig.mesh);

    assert!(!rig.update(&sphere.with_mode(TopologyMode::SUBDIVIDE)));
    assert!(!rig.update(&sphere.with_mode(TopologyMode::COLLAPSE)));
    assert_eq!(mesh_signature(&rig.mesh), converged);
}

/// Cleanup is idempotent: a second pass over the same region reproduces the
/// same mesh.
#[test]
fn cleanup_is_idempotent() {
    let (mesh, _, _) = valence4_fan();
    let mut rig = Rig::new(mesh, 0.1, 5.0);
    let params = RemeshParams::sphere(Vec3::ZERO, 10.0).with_mode(TopologyMode::CLEANUP);

    rig.update(&params);
    let once = mesh_signature(&rig.mesh);

    rig.update(&params);
    assert_eq!(mesh_signature(&rig.mesh), once);
    rig.assert_valid();
}

/// A fully masked-out region protects its edges from collapse.
#[test]
fn mask_protects_collapse_candidates() {
    let (mesh, _) = quad_two_tris();
    let mut rig = Rig::new(mesh, 2.0, 5.0);

    let mask = |_v: topomesh::VertId| 0.0f32;
    let mut params = RemeshParams::sphere(Vec3::new(0.5, 0.5, 0.0), 10.0)
        .with_mode(TopologyMode::COLLAPSE);
    params.mask = Some(&mask);

    // Zero weight short-circuits the scan entirely; nothing is collapsed.
    assert!(!rig.update(&params));
    assert_eq!(rig.mesh.face_count(), 2);
    rig.assert_valid();
}

/// Mask weighting biases the survivor: the higher-mask endpoint lives on.
#[test]
fn mask_biases_collapse_survivor() {
    let (mesh, verts) = quad_two_tris();
    let [a, _, c, _] = verts;
    // The mask scales weighted lengths up, so the band is set wide enough
    // that the diagonal still reads as short after weighting.
    let mut rig = Rig::new(mesh, 3.0, 5.0);

    // Protect three corners completely; only the diagonal (a, c) has any
    // collapsible weight, and `a` carries the higher mask.
    let mask = move |v: topomesh::VertId| -> f32 {
        if v == a {
            0.9
        } else if v == c {
            0.4
        } else {
            0.0
        }
    };
    let mut params = RemeshParams::sphere(Vec3::new(0.5, 0.5, 0.0), 10.0)
        .with_mode(TopologyMode::COLLAPSE);
    params.mask = Some(&mask);

    assert!(rig.update(&params));
    assert!(rig.mesh.vert(a).is_some(), "higher-mask endpoint must survive");
    assert!(rig.mesh.vert(c).is_none(), "lower-mask endpoint must be merged");
    rig.assert_valid();
}
