//! Safe tangential position relaxation.
//!
//! Applied opportunistically while scan workers walk faces: a small
//! tangent-plane step toward the neighbour average improves remesher
//! convergence without visibly moving the surface. Positions commit through
//! per-component compare-and-swap, which is the only mutation scan workers
//! are allowed.

use topomesh::{Mesh, VertId};

use crate::annotate::{AnnoFlags, VertAnnotations};

/// Relax `v` toward its same-boundary-class neighbours, projected onto the
/// tangent plane.
///
/// Corners hold still, and a vertex whose boundary classification is stale
/// is skipped outright; workers cannot refresh the annotation table, and
/// smoothing against a wrong class would drag boundaries sideways.
pub fn smooth_vertex_safe(mesh: &Mesh, anno: &VertAnnotations, v: VertId, factor: f32) {
    let Some(first) = mesh.first_edge(v) else {
        return;
    };

    let flags = anno.flags(v);
    if flags.contains(AnnoFlags::NEEDS_BOUNDARY) || flags.contains(AnnoFlags::SMOOTH_CORNER) {
        return;
    }
    let bound = flags.masked(AnnoFlags::SMOOTH_BOUNDARY);

    let (co, no) = match mesh.vert(v) {
        Some(vert) => (vert.co.get(), vert.no),
        None => return,
    };

    let mut acc = glam::Vec3::ZERO;
    let mut tot = 0.0f32;

    let mut e = first;
    loop {
        let Some(edge) = mesh.edge(e) else {
            return;
        };
        let v2 = edge.other_vert(v);

        // Neighbour classification may be stale too; that is tolerated, the
        // merge pass refreshes it before any mutation relies on it.
        if anno.flags(v2).masked(AnnoFlags::SMOOTH_BOUNDARY) == bound {
            let mut tan = mesh.vert_co(v2) - co;
            tan -= no * (tan.dot(no) * 0.99);
            acc += tan;
            tot += 1.0;
        }

        e = edge.disk(v).next;
        if e == first {
            break;
        }
    }

    if tot == 0.0 {
        return;
    }

    let delta = acc / tot * factor;
    if let Some(vert) = mesh.vert(v) {
        vert.co.cas_add(delta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::Vec3;

    fn fan_with_offset_center() -> (Mesh, VertId) {
        let mut m = Mesh::new();
        // Center pushed off the ring plane along +Z: tangential smoothing
        // must pull it toward the ring centroid laterally but barely change
        // its height.
        let center = m.vert_create(Vec3::new(0.3, 0.2, 1.0), Vec3::Z, None);
        let ring: Vec<VertId> = (0..6)
            .map(|i| {
                let ang = i as f32 * std::f32::consts::TAU / 6.0;
                m.vert_create(Vec3::new(ang.cos(), ang.sin(), 0.0), Vec3::Z, None)
            })
            .collect();
        for i in 0..6 {
            m.face_create(&[center, ring[i], ring[(i + 1) % 6]], None, None)
                .unwrap();
        }
        (m, center)
    }

    #[test]
    fn test_smoothing_is_tangential() {
        let (m, center) = fan_with_offset_center();
        let mut anno = VertAnnotations::for_mesh(&m);
        anno.check_boundary(&m, center);

        let before = m.vert_co(center);
        smooth_vertex_safe(&m, &anno, center, 0.5);
        let after = m.vert_co(center);

        // Lateral drift toward the ring center.
        assert!(after.truncate().length() < before.truncate().length());
        // Normal component nearly untouched (1% leak-through by design).
        assert_relative_eq!(after.z, before.z, epsilon = 0.02);
    }

    #[test]
    fn test_stale_boundary_blocks_smoothing() {
        let (m, center) = fan_with_offset_center();
        let anno = VertAnnotations::for_mesh(&m);
        // NEEDS_BOUNDARY is still set: the vertex must not move.
        let before = m.vert_co(center);
        smooth_vertex_safe(&m, &anno, center, 0.5);
        assert_eq!(m.vert_co(center), before);
    }

    #[test]
    fn test_corner_vertex_holds_still() {
        let (m, center) = fan_with_offset_center();
        let mut anno = VertAnnotations::for_mesh(&m);
        anno.check_boundary(&m, center);
        anno.add_flags(center, AnnoFlags::SHARP_CORNER);

        let before = m.vert_co(center);
        smooth_vertex_safe(&m, &anno, center, 0.5);
        assert_eq!(m.vert_co(center), before);
    }
}
