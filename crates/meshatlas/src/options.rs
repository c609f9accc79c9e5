//! Chart formation and packing parameters.
//!
//! Defaults mirror the usual engine defaults, so leaving an options argument
//! out is always safe. Both structs deserialize from partial JSON: missing
//! fields take their default value.

use crate::error::{AtlasError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartOptions {
    /// Largest chart surface area; 0 = unlimited.
    pub max_chart_area: f32,
    /// Longest chart boundary; 0 = unlimited.
    pub max_boundary_length: f32,
    pub normal_deviation_weight: f32,
    pub roundness_weight: f32,
    pub straightness_weight: f32,
    /// Penalty for growing across differing vertex normals.
    pub normal_seam_weight: f32,
    pub texture_seam_weight: f32,
    /// Faces whose growth cost exceeds this start a new chart.
    pub max_cost: f32,
    pub max_iterations: u32,
    pub use_input_mesh_uvs: bool,
    /// Keep every chart's UV winding consistent with its 3D winding.
    pub fix_winding: bool,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            max_chart_area: 0.0,
            max_boundary_length: 0.0,
            normal_deviation_weight: 2.0,
            roundness_weight: 0.01,
            straightness_weight: 6.0,
            normal_seam_weight: 4.0,
            texture_seam_weight: 0.5,
            max_cost: 2.0,
            max_iterations: 1,
            use_input_mesh_uvs: false,
            fix_winding: false,
        }
    }
}

impl ChartOptions {
    pub fn validate(&self) -> Result<()> {
        check_field("max_chart_area", self.max_chart_area)?;
        check_field("max_boundary_length", self.max_boundary_length)?;
        check_field("normal_deviation_weight", self.normal_deviation_weight)?;
        check_field("roundness_weight", self.roundness_weight)?;
        check_field("straightness_weight", self.straightness_weight)?;
        check_field("normal_seam_weight", self.normal_seam_weight)?;
        check_field("texture_seam_weight", self.texture_seam_weight)?;
        check_field("max_cost", self.max_cost)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackOptions {
    /// Charts larger than this many texels on a side are scaled down; 0 = no limit.
    pub max_chart_size: u32,
    /// Texels of padding around each chart.
    pub padding: u32,
    /// Texels per world unit; 0 = estimate from `resolution`.
    pub texels_per_unit: f32,
    /// Target atlas width/height in texels; 0 = estimate (about 1024x1024).
    pub resolution: u32,
    /// Leave an extra texel around charts for bilinear filtering.
    pub bilinear: bool,
    /// Align chart rectangles to 4x4 blocks.
    pub block_align: bool,
    /// Slower packing that tries several atlas widths.
    pub brute_force: bool,
    /// Also produce a chart raster (see [`AtlasImage`](crate::engine::AtlasImage)).
    pub create_image: bool,
    pub rotate_charts_to_axis: bool,
    pub rotate_charts: bool,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            max_chart_size: 0,
            padding: 0,
            texels_per_unit: 0.0,
            resolution: 0,
            bilinear: true,
            block_align: false,
            brute_force: false,
            create_image: false,
            rotate_charts_to_axis: true,
            rotate_charts: true,
        }
    }
}

impl PackOptions {
    pub fn validate(&self) -> Result<()> {
        check_field("texels_per_unit", self.texels_per_unit)
    }
}

#[inline]
fn check_field(field: &'static str, value: f32) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(AtlasError::InvalidOption {
            field,
            value: value as f64,
            reason: "must be finite and non-negative",
        })
    }
}
