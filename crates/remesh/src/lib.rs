//! Dynamic-topology remeshing engine.
//!
//! Given a triangle mesh organized into spatial-hierarchy leaves and a query
//! region (sphere or view-projected disk) with a target edge-length band,
//! [`Remesher::update_topology`] converges edge lengths toward the target:
//! long edges split, short edges collapse, valence-3/4 interior vertices
//! dissolve, and scanned vertices relax tangentially.
//!
//! # Components
//!
//! - **Annotate**: per-vertex side table (valence cache, boundary/corner
//!   classification, original-data snapshots, lazy needs bits)
//! - **Leaves**: face→leaf and vertex→leaf membership with dirty flags
//! - **Hierarchy**: the spatial-tree collaborator trait plus a reference
//!   bisection implementation
//! - **Queue**: parallel leaf scan with per-leaf scratch, merged into a
//!   priority heap of candidate edges
//! - **Subdivide / Collapse / Cleanup**: the mutation passes
//! - **Smooth**: compare-and-swap tangential relaxation used by scans
//! - **Driver**: the orchestrating [`Remesher`]
//!
//! Mutation is strictly single-threaded; scan workers only read, fill their
//! own scratch and relax positions atomically. Structural changes all flow
//! through the undo event log from `topomesh`.
//!
//! ```
//! use glam::Vec3;
//! use remesh::{BisectLeaves, Leaves, Remesher, RemeshConfig, RemeshParams, VertAnnotations};
//! use topomesh::{Mesh, NullLog};
//!
//! let mut mesh = Mesh::new();
//! let a = mesh.vert_create(Vec3::ZERO, Vec3::Z, None);
//! let b = mesh.vert_create(Vec3::X, Vec3::Z, None);
//! let c = mesh.vert_create(Vec3::Y, Vec3::Z, None);
//! mesh.face_create(&[a, b, c], None, None).unwrap();
//!
//! let mut anno = VertAnnotations::for_mesh(&mesh);
//! let mut leaves = Leaves::single_leaf_for_mesh(&mesh, 1000);
//! let mut log = NullLog;
//! let mut hierarchy = BisectLeaves;
//! let config = RemeshConfig {
//!     min_edge_len: 0.1,
//!     max_edge_len: 0.3,
//!     ..RemeshConfig::default()
//! };
//!
//! let mut remesher = Remesher::new(&mut mesh, &mut anno, &mut leaves, &mut log, &mut hierarchy, config);
//! let modified = remesher.update_topology(&RemeshParams::sphere(Vec3::ZERO, 10.0));
//! assert!(modified);
//! ```

mod annotate;
mod cleanup;
mod collapse;
mod config;
mod driver;
mod elements;
mod error;
mod hierarchy;
mod leaves;
mod queue;
mod smooth;
mod subdivide;

pub use annotate::{AnnoFlags, VertAnno, VertAnnotations};
pub use config::{MaskFn, RemeshConfig, RemeshParams, TopologyMode};
pub use driver::Remesher;
pub use error::RemeshError;
pub use hierarchy::{BisectLeaves, Hierarchy};
pub use leaves::{Aabb, Leaf, LeafFlags, LeafId, Leaves};
pub use smooth::smooth_vertex_safe;
