//! Connectivity validation, used by tests and debug checks.

use std::collections::HashSet;

use crate::mesh::Mesh;
use crate::types::MeshError;

/// Walk the whole mesh and verify structural invariants:
///
/// - face cycles close, agree with the cached length, and (when
///   `require_tris`) are triangles
/// - every loop's edge connects the loop's vertex and the next loop's vertex
/// - every radial cycle visits loops of its own edge exactly once
/// - disk cycles are doubly linked and contain exactly the edges that use
///   the vertex
/// - no two faces share the same unordered vertex triple
pub fn validate(mesh: &Mesh, require_tris: bool) -> Result<(), MeshError> {
    let bad = |msg: String| Err(MeshError::InvalidTopology(msg));

    // Faces and their loop cycles.
    let mut seen_tris: HashSet<[u32; 3]> = HashSet::new();
    for (f, face) in mesh.iter_faces() {
        let loops = mesh.face_loops(f);
        if loops.len() != face.len as usize {
            return bad(format!("face {f:?} cycle length {} != len {}", loops.len(), face.len));
        }
        if require_tris && face.len != 3 {
            return bad(format!("face {f:?} is not a triangle (len {})", face.len));
        }
        for (i, &l) in loops.iter().enumerate() {
            let Some(ll) = mesh.loop_ref(l) else {
                return bad(format!("face {f:?} references dead loop {l:?}"));
            };
            if ll.f != f {
                return bad(format!("loop {l:?} points at wrong face"));
            }
            let next = loops[(i + 1) % loops.len()];
            let Some(nl) = mesh.loop_ref(next) else {
                return bad(format!("face {f:?} has dead next loop"));
            };
            if ll.next != next || nl.prev != l {
                return bad(format!("face {f:?} loop cycle is not doubly linked"));
            }
            let Some(e) = mesh.edge(ll.e) else {
                return bad(format!("loop {l:?} references dead edge"));
            };
            if !(e.has_vert(ll.v) && e.has_vert(nl.v)) {
                return bad(format!("loop {l:?} edge does not connect its corners"));
            }
        }
        if face.len == 3 {
            let verts = mesh.face_verts(f);
            let mut key = [verts[0].0, verts[1].0, verts[2].0];
            key.sort_unstable();
            if !seen_tris.insert(key) {
                return bad(format!("duplicate triangle at face {f:?}"));
            }
        }
    }

    // Radial cycles.
    for (e, edge) in mesh.iter_edges() {
        let loops = mesh.edge_loops(e);
        if edge.l.is_some() && loops.is_empty() {
            return bad(format!("edge {e:?} radial head is dead"));
        }
        let mut seen = HashSet::new();
        for &l in &loops {
            let Some(ll) = mesh.loop_ref(l) else {
                return bad(format!("edge {e:?} radial cycle has dead loop"));
            };
            if ll.e != e {
                return bad(format!("edge {e:?} radial cycle contains foreign loop"));
            }
            if !seen.insert(l) {
                return bad(format!("edge {e:?} radial cycle repeats a loop"));
            }
            let Some(rn) = mesh.loop_ref(ll.radial_next) else {
                return bad(format!("edge {e:?} radial link is dead"));
            };
            if rn.radial_prev != l {
                return bad(format!("edge {e:?} radial cycle is not doubly linked"));
            }
        }
    }

    // Disk cycles.
    for (v, vert) in mesh.iter_verts() {
        let edges = mesh.vert_edges(v);
        if vert.edge.is_some() && edges.is_empty() {
            return bad(format!("vertex {v:?} disk head is dead"));
        }
        let mut seen = HashSet::new();
        for &e in &edges {
            let Some(edge) = mesh.edge(e) else {
                return bad(format!("vertex {v:?} disk cycle has dead edge"));
            };
            if !edge.has_vert(v) {
                return bad(format!("vertex {v:?} disk cycle contains foreign edge"));
            }
            if !seen.insert(e) {
                return bad(format!("vertex {v:?} disk cycle repeats an edge"));
            }
            let next = edge.disk(v).next;
            let Some(ne) = mesh.edge(next) else {
                return bad(format!("vertex {v:?} disk link is dead"));
            };
            if ne.disk(v).prev != e {
                return bad(format!("vertex {v:?} disk cycle is not doubly linked"));
            }
        }
    }

    // Every edge is reachable from both endpoint disks.
    for (e, edge) in mesh.iter_edges() {
        for v in [edge.v1, edge.v2] {
            if !mesh.vert_edges(v).contains(&e) {
                return bad(format!("edge {e:?} missing from disk of {v:?}"));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_validate_simple_fan() {
        let mut m = Mesh::new();
        let center = m.vert_create(Vec3::ZERO, Vec3::Z, None);
        let ring: Vec<_> = (0..4)
            .map(|i| {
                let ang = i as f32 * std::f32::consts::TAU / 4.0;
                m.vert_create(Vec3::new(ang.cos(), ang.sin(), 0.0), Vec3::Z, None)
            })
            .collect();
        for i in 0..4 {
            m.face_create(&[center, ring[i], ring[(i + 1) % 4]], None, None)
                .unwrap();
        }
        validate(&m, true).unwrap();
    }

    #[test]
    fn test_validate_after_split_and_kill() {
        let mut m = Mesh::new();
        let a = m.vert_create(Vec3::ZERO, Vec3::Z, None);
        let b = m.vert_create(Vec3::X, Vec3::Z, None);
        let c = m.vert_create(Vec3::Y, Vec3::Z, None);
        let f = m.face_create(&[a, b, c], None, None).unwrap();

        let e = m.edge_exists(a, b).unwrap();
        m.edge_split(e, 0.5).unwrap();
        validate(&m, false).unwrap();

        m.face_kill(f);
        validate(&m, true).unwrap();
    }
}
