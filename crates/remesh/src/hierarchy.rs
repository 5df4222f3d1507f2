//! Spatial hierarchy collaborator interface.
//!
//! The engine never builds or walks the spatial tree itself; it only asks
//! the hierarchy to place faces it cannot adopt locally, to split leaves
//! that outgrew their face limit, and to refresh per-leaf triangulation
//! caches. [`BisectLeaves`] is a reference implementation good enough for
//! tests and simple hosts: leaf placement by bounds, splitting by
//! longest-axis bisection.

use tracing::debug;

use topomesh::{FaceId, Mesh};

use crate::leaves::{Aabb, LeafFlags, LeafId, Leaves};

/// Operations the engine consumes from the spatial hierarchy.
pub trait Hierarchy {
    /// Place `f` into some leaf, updating membership. Returns the chosen
    /// leaf, or `None` when the hierarchy has nowhere to put it.
    fn insert_face(&mut self, mesh: &Mesh, leaves: &mut Leaves, f: FaceId) -> Option<LeafId>;

    /// Finish placing a face whose leaf was already chosen by adjacency.
    fn insert_face_finalize(&mut self, _mesh: &Mesh, leaves: &mut Leaves, f: FaceId, leaf: LeafId) {
        leaves.add_face_to_leaf(leaf, f);
    }

    /// Split `leaf` (recursively) while it exceeds the leaf face limit.
    fn node_limit_ensure(&mut self, mesh: &Mesh, leaves: &mut Leaves, leaf: LeafId);

    /// Rebuild any triangulation caches attached to `leaf`.
    fn check_tris(&mut self, _mesh: &Mesh, _leaves: &mut Leaves, _leaf: LeafId) {}
}

/// Reference hierarchy: places faces by centroid-in-bounds and splits
/// overgrown leaves by bisecting their longest axis.
#[derive(Debug, Default)]
pub struct BisectLeaves;

fn face_centroid(mesh: &Mesh, f: FaceId) -> glam::Vec3 {
    let verts = mesh.face_verts(f);
    if verts.is_empty() {
        return glam::Vec3::ZERO;
    }
    verts.iter().map(|&v| mesh.vert_co(v)).sum::<glam::Vec3>() / verts.len() as f32
}

impl Hierarchy for BisectLeaves {
    fn insert_face(&mut self, mesh: &Mesh, leaves: &mut Leaves, f: FaceId) -> Option<LeafId> {
        let centroid = face_centroid(mesh, f);

        let mut fallback = None;
        let mut chosen = None;
        for (id, leaf) in leaves.iter() {
            fallback = Some(id);
            if leaf.bounds.contains_point(centroid) {
                chosen = Some(id);
                break;
            }
        }
        let leaf = chosen.or(fallback)?;
        leaves.add_face_to_leaf(leaf, f);
        // Corner vertices nobody owns yet land in this leaf too.
        for v in mesh.face_verts(f) {
            if leaves.vert_owner(v).is_none() {
                leaves.add_unique_vert(leaf, v);
            }
        }
        Some(leaf)
    }

    fn node_limit_ensure(&mut self, mesh: &Mesh, leaves: &mut Leaves, leaf: LeafId) {
        let mut pending = vec![leaf];

        while let Some(id) = pending.pop() {
            let count = match leaves.leaf(id) {
                Some(l) => l.faces.len(),
                None => continue,
            };
            if count <= leaves.leaf_limit {
                continue;
            }

            // Bisect the centroid bounds along the longest axis.
            let faces: Vec<FaceId> = leaves.leaf(id).map(|l| l.faces.iter().copied().collect()).unwrap_or_default();
            let mut centroid_bounds = Aabb::empty();
            for &f in &faces {
                centroid_bounds.include_point(face_centroid(mesh, f));
            }
            let axis = centroid_bounds.longest_axis();
            let mid = centroid_bounds.center()[axis];

            let moved: Vec<FaceId> = faces
                .iter()
                .copied()
                .filter(|&f| face_centroid(mesh, f)[axis] >= mid)
                .collect();
            if moved.is_empty() || moved.len() == faces.len() {
                // Degenerate distribution; splitting further cannot help.
                debug!(leaf = id.0, faces = faces.len(), "leaf split found no separating plane");
                continue;
            }

            let new_leaf = {
                let bounds = leaves.leaf(id).map(|l| l.bounds).unwrap_or_else(Aabb::empty);
                leaves.create_leaf(bounds)
            };
            for &f in &moved {
                leaves.face_membership_remove(mesh, f, false, false);
                leaves.add_face_to_leaf(new_leaf, f);
            }

            // Vertices owned by the old leaf but no longer touching any of
            // its faces follow their geometry.
            let owned: Vec<_> = leaves
                .leaf(id)
                .map(|l| l.verts.iter().copied().collect())
                .unwrap_or_default();
            for v in owned {
                if leaves.node_vert_use_count_at_most(mesh, id, v, 1) == 0 {
                    if let Some(other) = leaves.vert_other_leaf_find(mesh, v) {
                        leaves.vert_ownership_transfer(v, other);
                    }
                }
            }

            leaves.update_bounds(mesh, id);
            leaves.update_bounds(mesh, new_leaf);
            leaves.mark_dirty(id, LeafFlags::UPDATE_ALL);
            leaves.mark_dirty(new_leaf, LeafFlags::UPDATE_ALL);
            debug!(
                leaf = id.0,
                new_leaf = new_leaf.0,
                moved = moved.len(),
                "split overgrown leaf"
            );

            pending.push(id);
            pending.push(new_leaf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use topomesh::VertId;

    fn grid(n: usize) -> (Mesh, Vec<FaceId>) {
        // n x n quads on the XY plane, triangulated.
        let mut m = Mesh::new();
        let mut verts = vec![];
        for y in 0..=n {
            for x in 0..=n {
                verts.push(m.vert_create(Vec3::new(x as f32, y as f32, 0.0), Vec3::Z, None));
            }
        }
        let at = |x: usize, y: usize| -> VertId { verts[y * (n + 1) + x] };
        let mut faces = vec![];
        for y in 0..n {
            for x in 0..n {
                faces.push(
                    m.face_create(&[at(x, y), at(x + 1, y), at(x + 1, y + 1)], None, None)
                        .unwrap(),
                );
                faces.push(
                    m.face_create(&[at(x, y), at(x + 1, y + 1), at(x, y + 1)], None, None)
                        .unwrap(),
                );
            }
        }
        (m, faces)
    }

    #[test]
    fn test_insert_face_adopts_by_bounds() {
        let (m, faces) = grid(2);
        let mut leaves = Leaves::new(64);
        leaves.create_leaf(Aabb::new(Vec3::splat(-10.0), Vec3::splat(10.0)));

        let mut h = BisectLeaves;
        let leaf = h.insert_face(&m, &mut leaves, faces[0]).unwrap();
        assert_eq!(leaves.face_owner(faces[0]), Some(leaf));
    }

    #[test]
    fn test_node_limit_ensure_splits() {
        let (m, faces) = grid(4);
        let mut leaves = Leaves::new(8);
        let root = leaves.create_leaf(Aabb::new(Vec3::splat(-10.0), Vec3::splat(10.0)));
        let mut h = BisectLeaves;
        for &f in &faces {
            h.insert_face(&m, &mut leaves, f);
        }
        assert_eq!(leaves.leaf(root).unwrap().faces.len(), faces.len());

        h.node_limit_ensure(&m, &mut leaves, root);

        assert!(leaves.len() > 1);
        for (_, leaf) in leaves.iter() {
            assert!(leaf.faces.len() <= 8);
        }
        // Every face still has exactly one owner.
        for &f in &faces {
            assert!(leaves.face_owner(f).is_some());
        }
        // Every owned vertex touches a face of its owner.
        for (id, leaf) in leaves.iter() {
            for &v in &leaf.verts {
                assert!(leaves.node_vert_use_count_at_most(&m, id, v, 1) >= 1);
            }
        }
    }
}
