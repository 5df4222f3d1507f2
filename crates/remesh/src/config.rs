//! Engine configuration and per-call parameters.

use std::time::Duration;

use glam::Vec3;

use topomesh::VertId;

/// Which topology passes a call runs, as an OR-combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TopologyMode(pub u8);

impl TopologyMode {
    pub const COLLAPSE: TopologyMode = TopologyMode(1 << 0);
    pub const SUBDIVIDE: TopologyMode = TopologyMode(1 << 1);
    pub const CLEANUP: TopologyMode = TopologyMode(1 << 2);

    #[inline]
    pub fn contains(self, other: TopologyMode) -> bool {
        self.0 & other.0 != 0
    }
}

impl std::ops::BitOr for TopologyMode {
    type Output = TopologyMode;
    fn bitor(self, rhs: TopologyMode) -> TopologyMode {
        TopologyMode(self.0 | rhs.0)
    }
}

/// Engine tuning knobs.
///
/// Values are configurable and should not be treated as magic numbers.
#[derive(Debug, Clone)]
pub struct RemeshConfig {
    /// Collapse edges shorter than this (world units).
    pub min_edge_len: f32,
    /// Subdivide edges longer than this (world units).
    pub max_edge_len: f32,
    /// Baseline mutation step budget per pass (default: 4096). The collapse
    /// rate limiter scales it by [0.25, 5.0]; the subdivide budget is derived
    /// from the brush area instead.
    pub max_steps: usize,
    /// Optional coarse wall-clock budget per pass, checked between pops.
    pub time_limit: Option<Duration>,
    /// Tangential relaxation strength applied during scans (default: 0.05).
    pub smooth_factor: f32,
    /// Probability that a scanned corner gets one relaxation step
    /// (default: 0.25). Zero disables smoothing entirely.
    pub smooth_probability: f32,
}

impl Default for RemeshConfig {
    fn default() -> Self {
        Self {
            min_edge_len: 0.05,
            max_edge_len: 0.15,
            max_steps: 4096,
            time_limit: None,
            smooth_factor: 0.05,
            smooth_probability: 0.25,
        }
    }
}

/// Per-vertex mask callback; returns an influence weight in `[0, 1]`.
pub type MaskFn<'a> = &'a (dyn Fn(VertId) -> f32 + Sync);

/// Parameters for one `update_topology` invocation.
#[derive(Clone, Copy)]
pub struct RemeshParams<'a> {
    /// Region center (world space).
    pub center: Vec3,
    /// Region radius.
    pub radius: f32,
    /// View direction; required for front-face culling and projected mode.
    pub view_normal: Option<Vec3>,
    /// Only consider triangles facing the view normal.
    pub use_frontface: bool,
    /// Use the view-projected disk region instead of the sphere.
    pub use_projected: bool,
    /// Which passes to run.
    pub mode: TopologyMode,
    /// Informational symmetry axis; the engine records it but mirrors
    /// nothing itself.
    pub sym_axis: Option<u8>,
    /// Allow the spatial hierarchy to split overgrown leaves afterwards.
    pub update_hierarchy: bool,
    /// Seed for the stochastic smoothing dilution. Identical seeds with
    /// identical inputs reproduce the exact same mesh.
    pub seed: u64,
    /// Optional per-vertex mask weighting.
    pub mask: Option<MaskFn<'a>>,
}

impl<'a> RemeshParams<'a> {
    /// Sphere-region defaults: all passes, no mask, no projection.
    pub fn sphere(center: Vec3, radius: f32) -> Self {
        Self {
            center,
            radius,
            view_normal: None,
            use_frontface: false,
            use_projected: false,
            mode: TopologyMode::COLLAPSE | TopologyMode::SUBDIVIDE | TopologyMode::CLEANUP,
            sym_axis: None,
            update_hierarchy: true,
            seed: 0,
            mask: None,
        }
    }

    pub fn with_mode(mut self, mode: TopologyMode) -> Self {
        self.mode = mode;
        self
    }
}

impl std::fmt::Debug for RemeshParams<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemeshParams")
            .field("center", &self.center)
            .field("radius", &self.radius)
            .field("view_normal", &self.view_normal)
            .field("use_frontface", &self.use_frontface)
            .field("use_projected", &self.use_projected)
            .field("mode", &self.mode)
            .field("sym_axis", &self.sym_axis)
            .field("update_hierarchy", &self.update_hierarchy)
            .field("seed", &self.seed)
            .field("mask", &self.mask.map(|_| "fn"))
            .finish()
    }
}
