//! A small, deterministic reference engine.
//!
//! Charts are grown over nearly coplanar faces, flattened by orthogonal
//! projection onto the seed face's plane, optionally rotated to their
//! minimum-area bounding box, then shelf-packed into a single atlas shared
//! by every mesh in the batch. Meshes are charted in parallel.
//!
//! It honours the size-related pack options and the area/boundary/normal
//! chart options; `roundness_weight`, `straightness_weight`,
//! `texture_seam_weight`, `max_iterations` and `use_input_mesh_uvs` are
//! accepted but have no effect.

use std::collections::HashMap;

use glam::{Vec2, Vec3};
use log::{debug, info, warn};
use rayon::prelude::*;

use super::charts::{build_charts, surface_area, Chart};
use super::pack::{align4, pack_rects};
use super::{AtlasEngine, AtlasImage, AtlasOutput, MeshInput, MeshOutput};
use crate::error::EngineError;
use crate::options::{ChartOptions, PackOptions};
use crate::raster::rasterize_triangle;

/// Edge length used when neither a resolution nor a texel density is given.
pub const DEFAULT_RESOLUTION: u32 = 1024;

/// Largest atlas side the engine will produce.
pub const MAX_ATLAS_SIZE: u32 = 16384;

/// Share of the target atlas area the estimated texel density aims to fill.
const TARGET_FILL: f32 = 1.0;

const TEXEL_EPSILON: f32 = 1e-3;

#[derive(Debug, Clone, Copy, Default)]
pub struct PlanarEngine;

impl PlanarEngine {
    pub fn new() -> Self {
        Self
    }
}

/// A flattened chart in chart-local world units, origin at its bbox minimum.
#[derive(Debug, Clone)]
struct FlatChart {
    mesh: usize,
    faces: Vec<u32>,
    /// Local 2D coordinate per source vertex used by the chart.
    coords: HashMap<u32, Vec2>,
    extent: Vec2,
}

/// Where a flat chart ended up in the atlas.
#[derive(Debug, Clone, Copy)]
struct Placement {
    /// Texel position of the chart's local origin.
    offset: Vec2,
    scale: f32,
    /// Rotated 90 degrees to lie landscape.
    rotated: bool,
    /// Scaled height, needed to undo the rotation.
    scaled_height: f32,
}

impl Placement {
    #[inline]
    fn texel(&self, local: Vec2) -> Vec2 {
        let q = local * self.scale;
        let q = if self.rotated {
            Vec2::new(self.scaled_height - q.y, q.x)
        } else {
            q
        };
        self.offset + q
    }
}

impl AtlasEngine for PlanarEngine {
    fn run(
        &self,
        meshes: &[MeshInput],
        chart_options: &ChartOptions,
        pack_options: &PackOptions,
    ) -> Result<AtlasOutput, EngineError> {
        // ---------------------------------------------------------------------
        // Chart and flatten every mesh (in parallel)
        // ---------------------------------------------------------------------
        let per_mesh: Vec<Vec<FlatChart>> = meshes
            .par_iter()
            .enumerate()
            .map(|(index, mesh)| {
                // NaN or overflowing positions leave no usable area either.
                let area = surface_area(mesh);
                if !area.is_finite() || area <= 0.0 {
                    return Err(EngineError::DegenerateMesh { mesh: index });
                }

                let charts = build_charts(mesh, chart_options);
                debug!("mesh {}: {} faces -> {} charts", index, mesh.triangle_count(), charts.len());

                Ok(charts
                    .into_iter()
                    .map(|chart| flatten(index, mesh, chart, chart_options, pack_options))
                    .collect())
            })
            .collect::<Result<_, _>>()?;

        let charts: Vec<FlatChart> = per_mesh.into_iter().flatten().collect();
        let degenerate = charts.iter().filter(|c| c.extent == Vec2::ZERO).count();
        if degenerate > 0 {
            warn!("{degenerate} charts have no extent and collapse to a single texel");
        }

        // ---------------------------------------------------------------------
        // Texel density and chart rectangles
        // ---------------------------------------------------------------------
        let total_area: f32 = meshes.iter().map(surface_area).sum();
        let texels_per_unit = if pack_options.texels_per_unit > 0.0 {
            pack_options.texels_per_unit
        } else {
            let target = match pack_options.resolution {
                0 => DEFAULT_RESOLUTION,
                r => r,
            } as f32;
            target * (TARGET_FILL / total_area).sqrt()
        };
        debug!("texels per unit: {texels_per_unit:.4}");

        let border = pack_options
            .padding
            .saturating_add(u32::from(pack_options.bilinear));

        let mut placements = Vec::with_capacity(charts.len());
        let mut sizes = Vec::with_capacity(charts.len());

        for chart in &charts {
            let mut scale = texels_per_unit;
            let longest = chart.extent.max_element();
            let limit = pack_options.max_chart_size as f32;
            if pack_options.max_chart_size > 0 && longest * scale > limit {
                scale = limit / longest;
            }

            let scaled = chart.extent * scale;
            let rotated = pack_options.rotate_charts && scaled.y > scaled.x;
            let (w, h) = if rotated {
                (scaled.y, scaled.x)
            } else {
                (scaled.x, scaled.y)
            };

            let mut rect =
                [w, h].map(|len| texel_span(len).saturating_add(border.saturating_mul(2)));
            if pack_options.block_align {
                rect = rect.map(align4);
            }
            if rect[0] > MAX_ATLAS_SIZE || rect[1] > MAX_ATLAS_SIZE {
                return Err(EngineError::AtlasTooLarge {
                    width: rect[0],
                    height: rect[1],
                    limit: MAX_ATLAS_SIZE,
                });
            }

            sizes.push(rect);
            placements.push(Placement {
                offset: Vec2::splat(border as f32),
                scale,
                rotated,
                scaled_height: scaled.y,
            });
        }

        // ---------------------------------------------------------------------
        // Pack and check the atlas size
        // ---------------------------------------------------------------------
        let packed = pack_rects(&sizes, pack_options);
        if packed.width > MAX_ATLAS_SIZE || packed.height > MAX_ATLAS_SIZE {
            return Err(EngineError::AtlasTooLarge {
                width: packed.width,
                height: packed.height,
                limit: MAX_ATLAS_SIZE,
            });
        }

        for (placement, origin) in placements.iter_mut().zip(&packed.origins) {
            placement.offset += Vec2::new(origin[0] as f32, origin[1] as f32);
        }

        // ---------------------------------------------------------------------
        // Emit per-mesh outputs (in parallel)
        // ---------------------------------------------------------------------
        let atlas_size = Vec2::new(packed.width as f32, packed.height as f32);

        let mut by_mesh: Vec<Vec<usize>> = vec![Vec::new(); meshes.len()];
        for (id, chart) in charts.iter().enumerate() {
            by_mesh[chart.mesh].push(id);
        }

        let outputs: Vec<MeshOutput> = meshes
            .par_iter()
            .zip(by_mesh.par_iter())
            .map(|(mesh, chart_ids)| emit(mesh, chart_ids, &charts, &placements, atlas_size))
            .collect();

        let image = pack_options
            .create_image
            .then(|| chart_image(meshes, &charts, &placements, packed.width, packed.height));

        info!(
            "atlas {}x{}: {} meshes, {} charts",
            packed.width,
            packed.height,
            meshes.len(),
            charts.len()
        );

        Ok(AtlasOutput {
            meshes: outputs,
            width: packed.width,
            height: packed.height,
            chart_count: charts.len() as u32,
            image,
        })
    }
}

/// Project a chart onto its seed plane and normalize its placement.
fn flatten(
    mesh_index: usize,
    mesh: &MeshInput,
    chart: Chart,
    chart_options: &ChartOptions,
    pack_options: &PackOptions,
) -> FlatChart {
    let (tangent, bitangent) = chart.normal.any_orthonormal_pair();
    // any_orthonormal_pair is not guaranteed to be right-handed about the normal.
    let bitangent = if tangent.cross(bitangent).dot(chart.normal) < 0.0 {
        -bitangent
    } else {
        bitangent
    };

    let mut coords: HashMap<u32, Vec2> = HashMap::new();
    for &face in &chart.faces {
        for &v in &mesh.indices[face as usize * 3..face as usize * 3 + 3] {
            coords
                .entry(v)
                .or_insert_with(|| project(mesh.positions[v as usize], tangent, bitangent));
        }
    }

    if chart_options.fix_winding && signed_area(mesh, &chart.faces, &coords) < 0.0 {
        for p in coords.values_mut() {
            p.x = -p.x;
        }
    }

    let rotation = if pack_options.rotate_charts_to_axis {
        best_rotation(&coords)
    } else {
        Vec2::X
    };
    if rotation != Vec2::X {
        for p in coords.values_mut() {
            *p = rotation.rotate(*p);
        }
    }

    let (min, max) = bounds(coords.values());
    for p in coords.values_mut() {
        *p -= min;
    }

    FlatChart {
        mesh: mesh_index,
        faces: chart.faces,
        coords,
        extent: (max - min).max(Vec2::ZERO),
    }
}

/// Whole texels needed to hold `len`, ignoring float noise just past an integer.
#[inline]
fn texel_span(len: f32) -> u32 {
    ((len - TEXEL_EPSILON).ceil() as u32).max(1)
}

#[inline]
fn project(p: Vec3, tangent: Vec3, bitangent: Vec3) -> Vec2 {
    Vec2::new(p.dot(tangent), p.dot(bitangent))
}

fn signed_area(mesh: &MeshInput, faces: &[u32], coords: &HashMap<u32, Vec2>) -> f32 {
    faces
        .iter()
        .map(|&f| {
            let tri = &mesh.indices[f as usize * 3..f as usize * 3 + 3];
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|v| coords[&v]);
            (b - a).perp_dot(c - a)
        })
        .sum()
}

fn bounds<'a>(points: impl Iterator<Item = &'a Vec2>) -> (Vec2, Vec2) {
    points.fold((Vec2::splat(f32::INFINITY), Vec2::splat(f32::NEG_INFINITY)), |(lo, hi), p| {
        (lo.min(*p), hi.max(*p))
    })
}

/// Rotation (as a unit complex number for [`Vec2::rotate`]) giving the
/// minimum-area bounding box. Candidates are the convex hull's edge directions.
fn best_rotation(coords: &HashMap<u32, Vec2>) -> Vec2 {
    // Sort for a deterministic hull regardless of map order.
    let mut points: Vec<Vec2> = coords.values().copied().collect();
    points.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    points.dedup();

    let hull = convex_hull(&points);
    if hull.len() < 3 {
        return Vec2::X;
    }

    let area_for = |rotation: Vec2| {
        let (lo, hi) = bounds(hull.iter().map(|p| rotation.rotate(*p)).collect::<Vec<_>>().iter());
        let size = hi - lo;
        size.x * size.y
    };

    let mut best = Vec2::X;
    let mut best_area = area_for(best);

    for (i, a) in hull.iter().enumerate() {
        let b = hull[(i + 1) % hull.len()];
        let dir = (b - *a).normalize_or_zero();
        if dir == Vec2::ZERO {
            continue;
        }

        // Rotate the edge onto +x: multiply by the conjugate.
        let rotation = Vec2::new(dir.x, -dir.y);
        let area = area_for(rotation);
        if area < best_area * (1.0 - 1e-4) {
            best = rotation;
            best_area = area;
        }
    }

    best
}

/// Andrew's monotone chain. `points` must be sorted by (x, y) and deduplicated.
fn convex_hull(points: &[Vec2]) -> Vec<Vec2> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let mut hull: Vec<Vec2> = Vec::with_capacity(points.len() * 2);

    for pass in 0..2 {
        let start = hull.len();
        let iter: Box<dyn Iterator<Item = &Vec2>> = if pass == 0 {
            Box::new(points.iter())
        } else {
            Box::new(points.iter().rev())
        };

        for &p in iter {
            while hull.len() >= start + 2 {
                let a = hull[hull.len() - 2];
                let b = hull[hull.len() - 1];
                if (b - a).perp_dot(p - a) > 0.0 {
                    break;
                }
                hull.pop();
            }
            hull.push(p);
        }
        hull.pop();
    }

    hull
}

/// Build one mesh's output, keeping the source face order.
fn emit(
    mesh: &MeshInput,
    chart_ids: &[usize],
    charts: &[FlatChart],
    placements: &[Placement],
    atlas_size: Vec2,
) -> MeshOutput {
    let mut chart_of_face = vec![0usize; mesh.triangle_count()];
    for &id in chart_ids {
        for &face in &charts[id].faces {
            chart_of_face[face as usize] = id;
        }
    }

    let mut out = MeshOutput {
        mappings: Vec::with_capacity(mesh.vertex_count()),
        uvs: Vec::with_capacity(mesh.vertex_count()),
        indices: Vec::with_capacity(mesh.indices.len()),
    };
    let mut generated: HashMap<(usize, u32), u32> = HashMap::new();

    for (face, tri) in mesh.indices.chunks_exact(3).enumerate() {
        let id = chart_of_face[face];

        for &v in tri {
            let next = out.mappings.len() as u32;
            let out_index = *generated.entry((id, v)).or_insert_with(|| {
                let texel = placements[id].texel(charts[id].coords[&v]);
                let uv = (texel / atlas_size).clamp(Vec2::ZERO, Vec2::ONE);
                out.mappings.push(v);
                out.uvs.push(uv.to_array());
                next
            });
            out.indices.push(out_index);
        }
    }

    out
}

/// Rasterize every chart's faces into a `chart + 1` id image.
fn chart_image(
    meshes: &[MeshInput],
    charts: &[FlatChart],
    placements: &[Placement],
    width: u32,
    height: u32,
) -> AtlasImage {
    let mut texels = vec![0u32; width as usize * height as usize];

    for (id, chart) in charts.iter().enumerate() {
        let mesh = &meshes[chart.mesh];

        for &face in &chart.faces {
            let tri = &mesh.indices[face as usize * 3..face as usize * 3 + 3];
            let corners =
                [tri[0], tri[1], tri[2]].map(|v| placements[id].texel(chart.coords[&v]).to_array());

            rasterize_triangle(corners, width, height, |x, y, _| {
                texels[y as usize * width as usize + x as usize] = id as u32 + 1;
            });
        }
    }

    AtlasImage {
        width,
        height,
        texels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> MeshInput {
        MeshInput {
            positions: vec![
                Vec3::ZERO,
                Vec3::X,
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::Y,
            ],
            normals: None,
            indices: vec![0, 1, 2, 0, 2, 3],
        }
    }

    fn tent() -> MeshInput {
        // Two faces meeting at a right angle along the x axis.
        MeshInput {
            positions: vec![
                Vec3::ZERO,
                Vec3::X,
                Vec3::new(0.0, 1.0, 0.0),
                Vec3::new(0.0, 0.0, 1.0),
            ],
            normals: None,
            indices: vec![0, 1, 2, 1, 0, 3],
        }
    }

    fn run(meshes: &[MeshInput], pack: &PackOptions) -> AtlasOutput {
        PlanarEngine
            .run(meshes, &ChartOptions::default(), pack)
            .unwrap()
    }

    #[test]
    fn test_quad_single_chart() {
        let out = run(&[quad()], &PackOptions::default());
        let mesh = &out.meshes[0];

        assert_eq!(out.chart_count, 1);
        assert_eq!(mesh.mappings, vec![0, 1, 2, 3]);
        assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3]);
        assert!(mesh.check(0, 4).is_ok());
    }

    #[test]
    fn test_seam_duplicates_vertices() {
        let out = run(&[tent()], &PackOptions::default());
        let mesh = &out.meshes[0];

        assert_eq!(out.chart_count, 2);
        // Vertices 0 and 1 sit on the seam and are emitted once per chart.
        assert_eq!(mesh.mappings.len(), 6);
        assert_eq!(mesh.mappings.iter().filter(|&&m| m == 0).count(), 2);
        assert!(mesh.check(0, 4).is_ok());
    }

    #[test]
    fn test_uvs_in_unit_square() {
        for pack in [
            PackOptions::default(),
            PackOptions {
                padding: 3,
                block_align: true,
                brute_force: true,
                ..PackOptions::default()
            },
            PackOptions {
                resolution: 256,
                rotate_charts: false,
                rotate_charts_to_axis: false,
                ..PackOptions::default()
            },
        ] {
            let out = run(&[quad(), tent()], &pack);
            for mesh in &out.meshes {
                assert!(mesh
                    .uvs
                    .iter()
                    .all(|uv| (0.0..=1.0).contains(&uv[0]) && (0.0..=1.0).contains(&uv[1])));
            }
        }
    }

    #[test]
    fn test_default_scale_targets_1024() {
        let out = run(&[quad()], &PackOptions::default());
        // 1024 texels across the square plus the bilinear border.
        assert_eq!((out.width, out.height), (1026, 1026));
    }

    #[test]
    fn test_explicit_texel_density() {
        let pack = PackOptions {
            texels_per_unit: 16.0,
            bilinear: false,
            ..PackOptions::default()
        };
        let out = run(&[quad()], &pack);
        assert_eq!((out.width, out.height), (16, 16));
    }

    #[test]
    fn test_max_chart_size() {
        let pack = PackOptions {
            texels_per_unit: 100.0,
            max_chart_size: 10,
            bilinear: false,
            ..PackOptions::default()
        };
        let out = run(&[quad()], &pack);
        assert_eq!((out.width, out.height), (10, 10));
    }

    #[test]
    fn test_chart_image() {
        let pack = PackOptions {
            create_image: true,
            texels_per_unit: 8.0,
            ..PackOptions::default()
        };
        let out = run(&[tent()], &pack);
        let image = out.image.unwrap();

        assert_eq!(image.texels.len(), (image.width * image.height) as usize);
        assert!(image.texels.contains(&1));
        assert!(image.texels.contains(&2));
        assert!(image.texels.iter().all(|&t| t <= 2));
    }

    #[test]
    fn test_degenerate_mesh_fails() {
        let flat = MeshInput {
            positions: vec![Vec3::ZERO, Vec3::X, Vec3::new(2.0, 0.0, 0.0)],
            normals: None,
            indices: vec![0, 1, 2],
        };
        let err = PlanarEngine
            .run(&[quad(), flat], &ChartOptions::default(), &PackOptions::default())
            .unwrap_err();
        assert_eq!(err, EngineError::DegenerateMesh { mesh: 1 });
    }

    #[test]
    fn test_too_large() {
        let pack = PackOptions {
            texels_per_unit: 40_000.0,
            ..PackOptions::default()
        };
        let err = PlanarEngine
            .run(&[quad()], &ChartOptions::default(), &pack)
            .unwrap_err();
        assert!(matches!(err, EngineError::AtlasTooLarge { .. }));
    }

    #[test]
    fn test_huge_density_is_too_large() {
        let pack = PackOptions {
            texels_per_unit: 1e30,
            ..PackOptions::default()
        };
        let err = PlanarEngine
            .run(&[quad()], &ChartOptions::default(), &pack)
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::AtlasTooLarge {
                width: u32::MAX,
                height: u32::MAX,
                limit: MAX_ATLAS_SIZE,
            }
        );
    }

    #[test]
    fn test_huge_padding_is_too_large() {
        for block_align in [false, true] {
            let pack = PackOptions {
                padding: u32::MAX,
                texels_per_unit: 16.0,
                block_align,
                ..PackOptions::default()
            };
            let err = PlanarEngine
                .run(&[quad()], &ChartOptions::default(), &pack)
                .unwrap_err();
            assert!(
                matches!(err, EngineError::AtlasTooLarge { width: u32::MAX, .. }),
                "{err:?}"
            );
        }
    }

    #[test]
    fn test_padding_just_under_limit() {
        // 16 texels of chart plus a border on each side fills the largest atlas exactly.
        let pack = PackOptions {
            padding: (MAX_ATLAS_SIZE - 16) / 2,
            texels_per_unit: 16.0,
            bilinear: false,
            ..PackOptions::default()
        };
        let out = run(&[quad()], &pack);
        assert_eq!((out.width, out.height), (MAX_ATLAS_SIZE, MAX_ATLAS_SIZE));
    }

    #[test]
    fn test_non_finite_positions_fail() {
        let mut nan = quad();
        nan.positions[2] = Vec3::new(f32::NAN, 1.0, 0.0);
        let err = PlanarEngine
            .run(&[quad(), nan], &ChartOptions::default(), &PackOptions::default())
            .unwrap_err();
        assert_eq!(err, EngineError::DegenerateMesh { mesh: 1 });

        let mut far = quad();
        far.positions[2] = Vec3::new(f32::INFINITY, 1.0, 0.0);
        let err = PlanarEngine
            .run(&[far], &ChartOptions::default(), &PackOptions::default())
            .unwrap_err();
        assert_eq!(err, EngineError::DegenerateMesh { mesh: 0 });
    }

    #[test]
    fn test_rotation_to_axis() {
        // A unit square rotated 45 degrees in the xy plane.
        let h = std::f32::consts::FRAC_1_SQRT_2;
        let diamond = MeshInput {
            positions: vec![
                Vec3::new(0.0, -h, 0.0),
                Vec3::new(h, 0.0, 0.0),
                Vec3::new(0.0, h, 0.0),
                Vec3::new(-h, 0.0, 0.0),
            ],
            normals: None,
            indices: vec![0, 1, 2, 0, 2, 3],
        };

        let pack = PackOptions {
            texels_per_unit: 16.0,
            bilinear: false,
            ..PackOptions::default()
        };
        let aligned = run(&[diamond.clone()], &pack);
        assert_eq!((aligned.width, aligned.height), (16, 16));

        let unaligned = run(
            &[diamond],
            &PackOptions {
                rotate_charts_to_axis: false,
                ..pack
            },
        );
        assert!(unaligned.width > 16);
    }
}
