//! The boundary between the orchestrator and whatever generates the atlas.
//!
//! An engine sees owned, validated geometry only. It is called once per
//! batch and must return exactly one [`MeshOutput`] per [`MeshInput`], in
//! order.

mod charts;
mod pack;
mod planar;

pub use planar::PlanarEngine;

use crate::error::EngineError;
use crate::options::{ChartOptions, PackOptions};
use glam::Vec3;

/// A validated mesh, copied out of the caller's buffers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshInput {
    pub positions: Vec<Vec3>,
    pub normals: Option<Vec<Vec3>>,
    /// Triangle list, always widened to 32 bits.
    pub indices: Vec<u32>,
}

impl MeshInput {
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Generated geometry for one input mesh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshOutput {
    /// Source vertex index for every generated vertex.
    pub mappings: Vec<u32>,
    /// Normalized atlas coordinates, one per generated vertex.
    pub uvs: Vec<[f32; 2]>,
    /// Triangle list over the generated vertices.
    pub indices: Vec<u32>,
}

impl MeshOutput {
    /// Structural checks the orchestrator runs before copying an output into a slot.
    pub fn check(&self, mesh: usize, source_vertices: usize) -> Result<(), EngineError> {
        let malformed = |reason: String| EngineError::MalformedOutput { mesh, reason };

        if self.uvs.len() != self.mappings.len() {
            return Err(malformed(format!(
                "{} uvs for {} vertices",
                self.uvs.len(),
                self.mappings.len()
            )));
        }
        if self.indices.len() % 3 != 0 {
            return Err(malformed(format!("{} indices", self.indices.len())));
        }
        if let Some(&m) = self.mappings.iter().find(|&&m| m as usize >= source_vertices) {
            return Err(malformed(format!(
                "mapping {m} exceeds source vertex count {source_vertices}"
            )));
        }
        if let Some(&i) = self.indices.iter().find(|&&i| i as usize >= self.mappings.len()) {
            return Err(malformed(format!(
                "index {i} exceeds output vertex count {}",
                self.mappings.len()
            )));
        }

        Ok(())
    }
}

/// Chart raster produced when [`PackOptions::create_image`] is set.
///
/// Each texel holds `chart + 1`, or 0 where no chart was placed. The
/// orchestrator passes it through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtlasImage {
    pub width: u32,
    pub height: u32,
    pub texels: Vec<u32>,
}

/// Everything one engine run produces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AtlasOutput {
    pub meshes: Vec<MeshOutput>,
    pub width: u32,
    pub height: u32,
    pub chart_count: u32,
    pub image: Option<AtlasImage>,
}

/// A UV atlas generator.
///
/// Implementations may use threads internally but are invoked synchronously.
pub trait AtlasEngine {
    fn run(
        &self,
        meshes: &[MeshInput],
        chart_options: &ChartOptions,
        pack_options: &PackOptions,
    ) -> Result<AtlasOutput, EngineError>;
}

impl<E: AtlasEngine + ?Sized> AtlasEngine for &E {
    fn run(
        &self,
        meshes: &[MeshInput],
        chart_options: &ChartOptions,
        pack_options: &PackOptions,
    ) -> Result<AtlasOutput, EngineError> {
        (**self).run(meshes, chart_options, pack_options)
    }
}

impl<E: AtlasEngine + ?Sized> AtlasEngine for Box<E> {
    fn run(
        &self,
        meshes: &[MeshInput],
        chart_options: &ChartOptions,
        pack_options: &PackOptions,
    ) -> Result<AtlasOutput, EngineError> {
        (**self).run(meshes, chart_options, pack_options)
    }
}
