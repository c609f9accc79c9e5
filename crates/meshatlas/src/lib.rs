//! meshatlas: UV atlas generation for batches of triangle meshes.
//!
//! - Callers describe meshes with borrowed byte views ([`MeshDecl`]):
//!   positions and optional normals at any stride, 16- or 32-bit indices.
//! - [`Atlas`] validates the whole batch, hands owned copies to an
//!   [`AtlasEngine`] exactly once, and keeps one reusable [`ResultMesh`]
//!   per input.
//! - Each result holds, per generated vertex, the source vertex it came from
//!   (`mappings`) and its normalized atlas coordinate (`uvs`), plus a
//!   triangle list over the generated vertices. Vertices on chart seams are
//!   emitted once per chart.
//! - [`PlanarEngine`] is the bundled engine; [`bake`] turns per-vertex
//!   colours, or a camera image seen through a view-projection matrix, into
//!   a texture for the generated atlas.
//!
//! ```no_run
//! use meshatlas::{Atlas, MeshDecl};
//!
//! let positions = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
//! let indices = [0u32, 1, 2];
//!
//! let mut atlas = Atlas::new();
//! atlas.generate(&[MeshDecl::new(&positions, &indices)])?;
//! let mesh = atlas.mesh_at(0)?;
//! assert_eq!(mesh.vertex_count(), 3);
//! # Ok::<(), meshatlas::AtlasError>(())
//! ```

pub mod atlas;
pub mod bake;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod options;
pub mod raster;
pub mod result;

pub use atlas::Atlas;
pub use bake::{bake_projection, bake_vertex_colors, Texture};
pub use descriptor::{IndexFormat, MeshDecl};
pub use engine::{AtlasEngine, AtlasImage, AtlasOutput, MeshInput, MeshOutput, PlanarEngine};
pub use error::{AtlasError, BufferKind, EngineError, InputError, Result};
pub use options::{ChartOptions, PackOptions};
pub use result::{HasUv, OutputBuffer, ResultMesh, UvSink};
