// Chart formation for the planar engine.
//
// Charts grow breadth-first over shared edges from the lowest unassigned
// face. A neighbour joins while its growth cost stays under `max_cost`:
//
//   cost = normal_deviation_weight * (1 - n_face . n_seed)
//        + normal_seam_weight      * (1 - m_face . m_from)     (input normals only)
//
// where n is the geometric face normal and m the mean input vertex normal of
// a face. Faces turned away from the seed never join, so every chart projects
// onto its seed plane without flipping.

use std::collections::{HashMap, VecDeque};

use glam::Vec3;

use super::MeshInput;
use crate::options::ChartOptions;

/// Below this the face is treated as having no area.
const DEGENERATE_AREA: f32 = 1e-12;

/// Minimum cosine between a face and its chart's seed normal (about 78 degrees).
const MIN_FACING: f32 = 0.2;

const UNASSIGNED: u32 = u32::MAX;

/// Canonical key for an undirected edge: always (min, max).
#[inline]
fn edge_key(a: u32, b: u32) -> (u32, u32) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[derive(Debug, Clone, Copy)]
struct FaceInfo {
    normal: Vec3,
    /// Mean of the input vertex normals, when the mesh has them.
    shading: Option<Vec3>,
    area: f32,
}

impl FaceInfo {
    #[inline]
    fn is_degenerate(&self) -> bool {
        self.area <= DEGENERATE_AREA
    }
}

#[derive(Debug, Clone)]
pub(super) struct Chart {
    /// Face indices in the order they joined.
    pub faces: Vec<u32>,
    /// Projection normal (the seed face's normal).
    pub normal: Vec3,
    /// Surface area in world units squared.
    pub area: f32,
}

/// Split a mesh's faces into charts. Every face lands in exactly one chart.
pub(super) fn build_charts(mesh: &MeshInput, opts: &ChartOptions) -> Vec<Chart> {
    let faces = face_infos(mesh);
    let adjacency = edge_faces(&mesh.indices);

    let mut chart_of = vec![UNASSIGNED; faces.len()];
    let mut tried = vec![UNASSIGNED; faces.len()];
    let mut charts = Vec::new();

    for seed in 0..faces.len() {
        if chart_of[seed] != UNASSIGNED {
            continue;
        }

        let chart_id = charts.len() as u32;
        let seed_info = faces[seed];
        chart_of[seed] = chart_id;

        // A degenerate face cannot define a projection plane; it stays alone.
        if seed_info.is_degenerate() {
            charts.push(Chart {
                faces: vec![seed as u32],
                normal: seed_info.shading.unwrap_or(Vec3::Z),
                area: 0.0,
            });
            continue;
        }

        let mut chart = Chart {
            faces: vec![seed as u32],
            normal: seed_info.normal,
            area: seed_info.area,
        };
        let mut boundary = perimeter_delta(mesh, &adjacency, &chart_of, seed, chart_id);

        let mut queue = VecDeque::new();
        push_neighbours(&mut queue, &adjacency, mesh, seed, &chart_of, &mut tried, chart_id);

        while let Some((face, from)) = queue.pop_front() {
            let face = face as usize;
            if chart_of[face] != UNASSIGNED {
                continue;
            }

            let info = faces[face];
            if info.is_degenerate() {
                continue;
            }

            let facing = info.normal.dot(chart.normal);
            if facing < MIN_FACING {
                continue;
            }

            let mut cost = opts.normal_deviation_weight * (1.0 - facing);
            if let (Some(m), Some(m_from)) = (info.shading, faces[from as usize].shading) {
                cost += opts.normal_seam_weight * (1.0 - m.dot(m_from));
            }
            if cost > opts.max_cost {
                continue;
            }

            if opts.max_chart_area > 0.0 && chart.area + info.area > opts.max_chart_area {
                continue;
            }

            let delta = perimeter_delta(mesh, &adjacency, &chart_of, face, chart_id);
            if opts.max_boundary_length > 0.0 && boundary + delta > opts.max_boundary_length {
                continue;
            }

            chart_of[face] = chart_id;
            chart.faces.push(face as u32);
            chart.area += info.area;
            boundary += delta;

            push_neighbours(&mut queue, &adjacency, mesh, face, &chart_of, &mut tried, chart_id);
        }

        charts.push(chart);
    }

    charts
}

/// Total surface area of non-degenerate faces.
pub(super) fn surface_area(mesh: &MeshInput) -> f32 {
    face_infos(mesh)
        .iter()
        .filter(|f| !f.is_degenerate())
        .map(|f| f.area)
        .sum()
}

fn face_infos(mesh: &MeshInput) -> Vec<FaceInfo> {
    mesh.indices
        .chunks_exact(3)
        .map(|tri| {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| mesh.positions[i as usize]);
            let cross = (b - a).cross(c - a);

            let shading = mesh.normals.as_ref().map(|normals| {
                (normals[tri[0] as usize] + normals[tri[1] as usize] + normals[tri[2] as usize])
                    .normalize_or_zero()
            });

            FaceInfo {
                normal: cross.normalize_or_zero(),
                shading,
                area: cross.length() * 0.5,
            }
        })
        .collect()
}

fn edge_faces(indices: &[u32]) -> HashMap<(u32, u32), Vec<u32>> {
    let mut map: HashMap<(u32, u32), Vec<u32>> = HashMap::new();

    for (face, tri) in indices.chunks_exact(3).enumerate() {
        for k in 0..3 {
            let key = edge_key(tri[k], tri[(k + 1) % 3]);
            if key.0 == key.1 {
                continue;
            }
            map.entry(key).or_default().push(face as u32);
        }
    }

    map
}

#[inline]
fn face_edges(mesh: &MeshInput, face: usize) -> [(u32, u32); 3] {
    let tri = &mesh.indices[face * 3..face * 3 + 3];
    [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])]
}

/// Queue every not-yet-tried neighbour of `face` for this chart.
fn push_neighbours(
    queue: &mut VecDeque<(u32, u32)>,
    adjacency: &HashMap<(u32, u32), Vec<u32>>,
    mesh: &MeshInput,
    face: usize,
    chart_of: &[u32],
    tried: &mut [u32],
    chart_id: u32,
) {
    for (a, b) in face_edges(mesh, face) {
        let Some(neighbours) = adjacency.get(&edge_key(a, b)) else {
            continue;
        };

        for &n in neighbours {
            let n_idx = n as usize;
            if n_idx == face || chart_of[n_idx] != UNASSIGNED || tried[n_idx] == chart_id {
                continue;
            }
            tried[n_idx] = chart_id;
            queue.push_back((n, face as u32));
        }
    }
}

/// Change in chart perimeter if `face` joins chart `chart_id`: edges shared
/// with the chart disappear from the boundary, the others are added.
fn perimeter_delta(
    mesh: &MeshInput,
    adjacency: &HashMap<(u32, u32), Vec<u32>>,
    chart_of: &[u32],
    face: usize,
    chart_id: u32,
) -> f32 {
    let mut delta = 0.0;

    for (a, b) in face_edges(mesh, face) {
        let len = (mesh.positions[a as usize] - mesh.positions[b as usize]).length();

        let shared = adjacency.get(&edge_key(a, b)).is_some_and(|neighbours| {
            neighbours
                .iter()
                .any(|&n| n as usize != face && chart_of[n as usize] == chart_id)
        });

        delta += if shared { -len } else { len };
    }

    delta
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube() -> MeshInput {
        let positions = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(0.0, 1.0, 1.0),
        ];
        #[rustfmt::skip]
        let indices = vec![
            0, 2, 1, 0, 3, 2, // -z
            4, 5, 6, 4, 6, 7, // +z
            0, 1, 5, 0, 5, 4, // -y
            3, 7, 6, 3, 6, 2, // +y
            0, 4, 7, 0, 7, 3, // -x
            1, 2, 6, 1, 6, 5, // +x
        ];
        MeshInput {
            positions,
            normals: None,
            indices,
        }
    }

    #[test]
    fn test_cube_splits_per_side() {
        let charts = build_charts(&cube(), &ChartOptions::default());

        assert_eq!(charts.len(), 6);
        for chart in &charts {
            assert_eq!(chart.faces.len(), 2);
            assert!((chart.area - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_every_face_assigned_once() {
        let mesh = cube();
        let charts = build_charts(&mesh, &ChartOptions::default());

        let mut seen: Vec<u32> = charts.iter().flat_map(|c| c.faces.iter().copied()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..12).collect::<Vec<u32>>());
    }

    #[test]
    fn test_area_limit_splits_side() {
        let opts = ChartOptions {
            max_chart_area: 0.75,
            ..ChartOptions::default()
        };
        let charts = build_charts(&cube(), &opts);
        assert_eq!(charts.len(), 12);
    }

    #[test]
    fn test_degenerate_face_gets_own_chart() {
        let mesh = MeshInput {
            positions: vec![
                Vec3::ZERO,
                Vec3::X,
                Vec3::Y,
                Vec3::new(2.0, 0.0, 0.0),
            ],
            normals: None,
            indices: vec![0, 1, 2, 0, 1, 3],
        };

        let charts = build_charts(&mesh, &ChartOptions::default());
        assert_eq!(charts.len(), 2);
        assert_eq!(charts[1].faces, vec![1]);
        assert_eq!(charts[1].area, 0.0);
        assert!((surface_area(&mesh) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_boundary_limit() {
        // Quad perimeter is 4; each triangle alone is 2 + sqrt(2).
        let mesh = MeshInput {
            positions: vec![Vec3::ZERO, Vec3::X, Vec3::new(1.0, 1.0, 0.0), Vec3::Y],
            normals: None,
            indices: vec![0, 1, 2, 0, 2, 3],
        };

        let tight = ChartOptions {
            max_boundary_length: 3.9,
            ..ChartOptions::default()
        };
        assert_eq!(build_charts(&mesh, &tight).len(), 2);

        let loose = ChartOptions {
            max_boundary_length: 4.1,
            ..ChartOptions::default()
        };
        assert_eq!(build_charts(&mesh, &loose).len(), 1);
    }
}
