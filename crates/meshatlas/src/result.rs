//! Reusable containers for generated meshes.
//!
//! Buffers only ever grow. Refilling a [`ResultMesh`] with output of equal or
//! smaller size keeps the existing allocations, so one mesh can be recycled
//! across many `generate` calls.

use crate::engine::MeshOutput;
use crate::error::{InputError, Result};

/// A grow-only buffer: `len` tracks the current result, `capacity` the
/// largest allocation ever made.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputBuffer<T> {
    data: Vec<T>,
}

impl<T> Default for OutputBuffer<T> {
    fn default() -> Self {
        Self { data: Vec::new() }
    }
}

impl<T: Copy> OutputBuffer<T> {
    /// Replace the contents; reallocates only when `src` exceeds the capacity.
    pub fn fill(&mut self, src: &[T]) {
        self.data.clear();
        self.data.extend_from_slice(src);
    }

    /// Drop the contents, keep the allocation.
    #[inline]
    pub fn clear(&mut self) {
        self.data.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }
}

/// Source-attribute types that carry a texture coordinate.
pub trait HasUv {
    fn set_uv(&mut self, uv: [f32; 2]);
}

/// Vertex stores that accept UVs addressed by source vertex index.
pub trait UvSink {
    fn set_vertex_uv(&mut self, vertex: u32, uv: [f32; 2]);
}

/// The generated geometry for one mesh of a batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultMesh {
    mappings: OutputBuffer<u32>,
    uvs: OutputBuffer<[f32; 2]>,
    indices: OutputBuffer<[u32; 3]>,
}

impl ResultMesh {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.mappings.len()
    }

    /// Number of indices (three per triangle).
    #[inline]
    pub fn index_count(&self) -> usize {
        self.indices.len() * 3
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Source vertex for each generated vertex.
    #[inline]
    pub fn mappings(&self) -> &[u32] {
        self.mappings.as_slice()
    }

    #[inline]
    pub fn uvs(&self) -> &[[f32; 2]] {
        self.uvs.as_slice()
    }

    #[inline]
    pub fn indices(&self) -> &[[u32; 3]] {
        self.indices.as_slice()
    }

    /// The triangle list as a flat index slice.
    #[inline]
    pub fn flat_indices(&self) -> &[u32] {
        bytemuck::cast_slice(self.indices.as_slice())
    }

    pub fn mapping_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.mappings.as_slice())
    }

    pub fn uv_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.uvs.as_slice())
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.indices.as_slice())
    }

    /// Current allocation sizes as (vertices, triangles).
    pub fn capacity(&self) -> (usize, usize) {
        (
            self.mappings.capacity().min(self.uvs.capacity()),
            self.indices.capacity(),
        )
    }

    /// Reset lengths to zero; allocations are kept.
    pub fn clear(&mut self) {
        self.mappings.clear();
        self.uvs.clear();
        self.indices.clear();
    }

    /// Copy an engine output in. The output must already have passed
    /// [`MeshOutput::check`]; a trailing partial triangle is dropped.
    pub(crate) fn fill_from_output(&mut self, out: &MeshOutput) {
        let whole = out.indices.len() / 3 * 3;

        self.mappings.fill(&out.mappings);
        self.uvs.fill(&out.uvs);
        self.indices.fill(bytemuck::cast_slice(&out.indices[..whole]));
    }

    /// Copy another result in, reusing this mesh's allocations where possible.
    pub fn copy_from(&mut self, other: &ResultMesh) {
        self.mappings.fill(other.mappings());
        self.uvs.fill(other.uvs());
        self.indices.fill(other.indices());
    }

    /// Source attributes re-ordered into generated vertex order.
    pub fn rearrange<T: Clone>(&self, points: &[T]) -> Result<Vec<T>> {
        self.mappings()
            .iter()
            .map(|&m| source(points, m).cloned())
            .collect()
    }

    /// Like [`rearrange`](Self::rearrange), with each copy's UV set to the generated one.
    pub fn apply_uv<T: HasUv + Clone>(&self, points: &[T]) -> Result<Vec<T>> {
        self.mappings()
            .iter()
            .zip(self.uvs())
            .map(|(&m, &uv)| {
                let mut point = source(points, m)?.clone();
                point.set_uv(uv);
                Ok(point)
            })
            .collect()
    }

    /// Push every generated UV back to the source vertex it came from.
    ///
    /// When seams split a source vertex, the last generated copy wins.
    pub fn apply_uvs<S: UvSink>(&self, sink: &mut S) {
        for (&m, &uv) in self.mappings().iter().zip(self.uvs()) {
            sink.set_vertex_uv(m, uv);
        }
    }
}

#[inline]
fn source<T>(points: &[T], mapping: u32) -> Result<&T> {
    points.get(mapping as usize).ok_or_else(|| {
        InputError::AttributeTooShort {
            len: points.len(),
            needed: mapping,
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AtlasError;

    fn output(vertices: u32) -> MeshOutput {
        MeshOutput {
            mappings: (0..vertices).collect(),
            uvs: (0..vertices).map(|v| [v as f32 * 0.1, 0.5]).collect(),
            indices: (0..vertices).collect(),
        }
    }

    #[derive(Clone, Debug, PartialEq)]
    struct Point {
        id: u32,
        uv: [f32; 2],
    }

    impl HasUv for Point {
        fn set_uv(&mut self, uv: [f32; 2]) {
            self.uv = uv;
        }
    }

    struct UvTable(Vec<[f32; 2]>);

    impl UvSink for UvTable {
        fn set_vertex_uv(&mut self, vertex: u32, uv: [f32; 2]) {
            self.0[vertex as usize] = uv;
        }
    }

    #[test]
    fn test_fill_exposes_counts() {
        let mut mesh = ResultMesh::new();
        mesh.fill_from_output(&output(6));

        assert_eq!(mesh.vertex_count(), 6);
        assert_eq!(mesh.index_count(), 6);
        assert_eq!(mesh.indices(), &[[0, 1, 2], [3, 4, 5]]);
        assert_eq!(mesh.flat_indices(), &[0, 1, 2, 3, 4, 5]);
        assert_eq!(mesh.uv_bytes().len(), 6 * 8);
    }

    #[test]
    fn test_refill_smaller_keeps_allocation() {
        let mut mesh = ResultMesh::new();
        mesh.fill_from_output(&output(9));
        let uv_ptr = mesh.uvs().as_ptr();
        let idx_ptr = mesh.indices().as_ptr();
        let before = mesh.capacity();

        mesh.fill_from_output(&output(6));

        assert_eq!(mesh.vertex_count(), 6);
        assert_eq!(mesh.uvs().as_ptr(), uv_ptr);
        assert_eq!(mesh.indices().as_ptr(), idx_ptr);
        assert_eq!(mesh.capacity(), before);
    }

    #[test]
    fn test_clear_keeps_capacity() {
        let mut mesh = ResultMesh::new();
        mesh.fill_from_output(&output(3));
        let before = mesh.capacity();

        mesh.clear();

        assert!(mesh.is_empty());
        assert_eq!(mesh.index_count(), 0);
        assert_eq!(mesh.capacity(), before);
    }

    #[test]
    fn test_rearrange_and_apply_uv() {
        let mut mesh = ResultMesh::new();
        mesh.fill_from_output(&MeshOutput {
            mappings: vec![1, 0, 1],
            uvs: vec![[0.0, 0.0], [0.5, 0.5], [1.0, 1.0]],
            indices: vec![0, 1, 2],
        });

        let points = vec![
            Point { id: 10, uv: [9.0, 9.0] },
            Point { id: 11, uv: [9.0, 9.0] },
        ];

        let ids: Vec<u32> = mesh.rearrange(&points).unwrap().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![11, 10, 11]);

        let applied = mesh.apply_uv(&points).unwrap();
        assert_eq!(applied[2], Point { id: 11, uv: [1.0, 1.0] });

        let mut table = UvTable(vec![[0.0; 2]; 2]);
        mesh.apply_uvs(&mut table);
        assert_eq!(table.0, vec![[0.5, 0.5], [1.0, 1.0]]);
    }

    #[test]
    fn test_rearrange_short_slice() {
        let mut mesh = ResultMesh::new();
        mesh.fill_from_output(&output(3));

        let err = mesh.rearrange(&[1u8, 2]).unwrap_err();
        assert_eq!(
            err,
            AtlasError::InvalidInput(InputError::AttributeTooShort { len: 2, needed: 2 })
        );
    }
}
