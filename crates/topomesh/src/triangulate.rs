//! Polygon triangulation primitive.
//!
//! Splits an n-gon face into triangles with repeated diagonal cuts. Quads
//! optionally pick the "beauty" diagonal, the one whose two triangle normals
//! agree most; larger polygons fan from their first corner. The caller owns
//! logging and spatial bookkeeping for the faces this produces.

use smallvec::SmallVec;

use crate::mesh::{triangle_normal, Mesh};
use crate::types::{FaceId, MeshError};

/// Triangulate `f` in place. Returns the faces created by the cuts; `f`
/// itself remains alive as one of the triangles. A triangle input returns an
/// empty list.
pub fn triangulate_face(
    mesh: &mut Mesh,
    f: FaceId,
    beauty: bool,
) -> Result<SmallVec<[FaceId; 4]>, MeshError> {
    let mut out: SmallVec<[FaceId; 4]> = SmallVec::new();
    let len = mesh.face(f).ok_or(MeshError::StaleId)?.len;
    if len < 3 {
        return Err(MeshError::FaceTooSmall(len as usize));
    }
    if len == 3 {
        return Ok(out);
    }

    if len == 4 && beauty {
        let verts = mesh.face_verts(f);
        let p: SmallVec<[glam::Vec3; 4]> = verts.iter().map(|&v| mesh.vert_co(v)).collect();

        let d0 = triangle_normal(p[0], p[1], p[2]).dot(triangle_normal(p[0], p[2], p[3]));
        let d1 = triangle_normal(p[1], p[2], p[3]).dot(triangle_normal(p[1], p[3], p[0]));

        let (a, b) = if d1 > d0 {
            (verts[1], verts[3])
        } else {
            (verts[0], verts[2])
        };
        let loops = mesh.find_face_loops_of_verts(f, &[a, b]);
        if let (Some(la), Some(lb)) = (loops[0], loops[1]) {
            let (f2, _) = mesh.face_split(f, la, lb)?;
            out.push(f2);
        }
        return Ok(out);
    }

    // Fan: peel triangles off the first corner until a triangle remains.
    let anchor = mesh.face_verts(f)[0];
    let mut cur = f;
    while mesh.face(cur).map(|face| face.len).unwrap_or(0) > 3 {
        let verts = mesh.face_verts(cur);
        let Some(pos) = verts.iter().position(|&v| v == anchor) else {
            break;
        };
        let target = verts[(pos + 2) % verts.len()];
        let loops = mesh.find_face_loops_of_verts(cur, &[anchor, target]);
        let (Some(la), Some(lb)) = (loops[0], loops[1]) else {
            break;
        };
        let (f2, _) = mesh.face_split(cur, la, lb)?;
        out.push(f2);
        cur = f2;
    }
    Ok(out)
}
