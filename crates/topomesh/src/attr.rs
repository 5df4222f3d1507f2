//! Opaque custom-attribute blocks.
//!
//! Hosts attach fixed-width float blocks to vertices, edges, faces and loops
//! (masks, UVs, crease weights). The kernel never interprets the contents; it
//! only interpolates, copies and swaps whole blocks when topology changes.

/// An opaque block of host-owned attribute floats. Empty by default, so
/// meshes without custom layers pay nothing.
#[derive(Debug, Clone, Default, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct AttrBlock(pub Vec<f32>);

impl AttrBlock {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Interpolate `sources` into `dst` with the given weights.
///
/// Weights are renormalized so callers can pass equal raw weights for an
/// arbitrary source count. Sources shorter than `dst` contribute nothing to
/// the missing components; an empty source list leaves `dst` untouched.
pub fn interp_into(dst: &mut AttrBlock, sources: &[&AttrBlock], weights: &[f32]) {
    if sources.is_empty() || weights.len() < sources.len() {
        return;
    }

    let total: f32 = weights[..sources.len()].iter().sum();
    if total <= 0.0 {
        return;
    }

    let width = sources.iter().map(|s| s.len()).max().unwrap_or(0);
    if dst.len() < width {
        dst.0.resize(width, 0.0);
    }

    let mut mixed = vec![0.0f32; dst.len()];
    for (src, &w) in sources.iter().zip(weights) {
        let w = w / total;
        for (acc, &x) in mixed.iter_mut().zip(&src.0) {
            *acc += x * w;
        }
    }
    dst.0.copy_from_slice(&mixed);
}

/// Copy `src` over `dst`, replacing the destination layout.
pub fn copy(src: &AttrBlock, dst: &mut AttrBlock) {
    dst.0.clear();
    dst.0.extend_from_slice(&src.0);
}

/// Swap two blocks without touching their contents.
pub fn swap(a: &mut AttrBlock, b: &mut AttrBlock) {
    std::mem::swap(&mut a.0, &mut b.0);
}
