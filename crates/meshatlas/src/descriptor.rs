//! Read-only views over caller-owned mesh buffers.
//!
//! A [`MeshDecl`] borrows raw bytes; nothing here copies until
//! [`MeshDecl::ingest`] turns a validated view into an owned [`MeshInput`].
//!
//! Buffer layout expected from the caller (native endianness):
//!   positions : vertex_count records, `position_stride` bytes apart,
//!               each starting with f32 x, f32 y, f32 z
//!   normals   : same shape as positions, `normal_stride` bytes apart
//!   indices   : index_count u16 or u32 values, tightly packed

use crate::engine::MeshInput;
use crate::error::{BufferKind, InputError};
use glam::Vec3;

/// Size of one f32 triplet, the minimum stride for positions and normals.
pub const VEC3_BYTES: u32 = 12;

/// Width of the caller's index values. Everything is widened to `u32` on ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexFormat {
    U16,
    #[default]
    U32,
}

impl IndexFormat {
    #[inline]
    pub fn byte_width(self) -> usize {
        match self {
            IndexFormat::U16 => 2,
            IndexFormat::U32 => 4,
        }
    }
}

/// One mesh of a batch, as seen by the atlas.
///
/// All buffers are borrowed for the duration of a single `generate` call.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeshDecl<'a> {
    pub vertex_count: u32,
    pub positions: Option<&'a [u8]>,
    pub position_stride: u32,
    /// When false the normal buffer is ignored entirely.
    pub has_normals: bool,
    pub normals: Option<&'a [u8]>,
    pub normal_stride: u32,
    pub index_count: u32,
    pub indices: Option<&'a [u8]>,
    pub index_format: IndexFormat,
}

impl<'a> MeshDecl<'a> {
    /// Tightly packed positions with 32-bit indices.
    pub fn new(positions: &'a [[f32; 3]], indices: &'a [u32]) -> Self {
        Self {
            vertex_count: positions.len() as u32,
            positions: Some(bytemuck::cast_slice(positions)),
            position_stride: VEC3_BYTES,
            index_count: indices.len() as u32,
            indices: Some(bytemuck::cast_slice(indices)),
            index_format: IndexFormat::U32,
            ..Self::default()
        }
    }

    /// Tightly packed positions with 16-bit indices.
    pub fn with_u16_indices(positions: &'a [[f32; 3]], indices: &'a [u16]) -> Self {
        Self {
            index_count: indices.len() as u32,
            indices: Some(bytemuck::cast_slice(indices)),
            index_format: IndexFormat::U16,
            ..Self::new(positions, &[])
        }
    }

    /// Interleaved vertex records: positions (and optionally normals) live at
    /// byte offsets inside each `V`, one record per vertex.
    pub fn interleaved<V: bytemuck::Pod>(
        vertices: &'a [V],
        position_offset: usize,
        normal_offset: Option<usize>,
        indices: &'a [u32],
    ) -> Self {
        let bytes: &'a [u8] = bytemuck::cast_slice(vertices);
        let stride = std::mem::size_of::<V>() as u32;

        let mut decl = Self {
            vertex_count: vertices.len() as u32,
            positions: bytes.get(position_offset..),
            position_stride: stride,
            index_count: indices.len() as u32,
            indices: Some(bytemuck::cast_slice(indices)),
            index_format: IndexFormat::U32,
            ..Self::default()
        };

        if let Some(offset) = normal_offset {
            decl.has_normals = true;
            decl.normals = bytes.get(offset..);
            decl.normal_stride = stride;
        }

        decl
    }

    /// Attach tightly packed per-vertex normals.
    pub fn with_normals(mut self, normals: &'a [[f32; 3]]) -> Self {
        self.has_normals = true;
        self.normals = Some(bytemuck::cast_slice(normals));
        self.normal_stride = VEC3_BYTES;
        self
    }

    /// Check the descriptor and report the first violation.
    ///
    /// Order is fixed (missing buffers, counts, strides, buffer lengths, index
    /// range, position values) so the reported error is deterministic. `mesh` is the batch
    /// position and is only used to label the error.
    pub fn validate(&self, mesh: usize) -> Result<(), InputError> {
        let positions = self.positions.ok_or(InputError::NullBuffer {
            mesh,
            buffer: BufferKind::Positions,
        })?;
        let indices = self.indices.ok_or(InputError::NullBuffer {
            mesh,
            buffer: BufferKind::Indices,
        })?;
        let normals = match (self.has_normals, self.normals) {
            (false, _) => None,
            (true, Some(n)) => Some(n),
            (true, None) => {
                return Err(InputError::NullBuffer {
                    mesh,
                    buffer: BufferKind::Normals,
                })
            }
        };

        if self.vertex_count == 0 {
            return Err(InputError::NoVertices { mesh });
        }
        if self.index_count == 0 {
            return Err(InputError::NoIndices { mesh });
        }
        if self.index_count % 3 != 0 {
            return Err(InputError::PartialTriangle {
                mesh,
                index_count: self.index_count,
            });
        }

        if self.position_stride < VEC3_BYTES {
            return Err(InputError::InvalidStride {
                mesh,
                buffer: BufferKind::Positions,
                stride: self.position_stride,
            });
        }
        if normals.is_some() && self.normal_stride < VEC3_BYTES {
            return Err(InputError::InvalidStride {
                mesh,
                buffer: BufferKind::Normals,
                stride: self.normal_stride,
            });
        }

        check_len(mesh, BufferKind::Positions, positions, self.strided_len(self.position_stride))?;
        if let Some(normals) = normals {
            check_len(mesh, BufferKind::Normals, normals, self.strided_len(self.normal_stride))?;
        }
        let index_bytes = self.index_count as usize * self.index_format.byte_width();
        check_len(mesh, BufferKind::Indices, indices, index_bytes)?;

        if let Some((position, index)) = self
            .index_values(indices)
            .enumerate()
            .find(|&(_, index)| index >= self.vertex_count)
        {
            return Err(InputError::OutOfRangeIndex {
                mesh,
                position,
                index,
                vertex_count: self.vertex_count,
            });
        }

        let stride = self.position_stride as usize;
        if let Some(vertex) = (0..self.vertex_count as usize)
            .find(|&i| !vec3_at(positions, stride, i).is_some_and(Vec3::is_finite))
        {
            return Err(InputError::NonFinitePosition { mesh, vertex });
        }

        Ok(())
    }

    /// Copy a validated descriptor into the engine's owned representation.
    ///
    /// Call [`validate`](Self::validate) first; missing buffers here yield
    /// empty attribute arrays rather than a panic.
    pub fn ingest(&self) -> MeshInput {
        let vertex_count = self.vertex_count as usize;

        let positions = self
            .positions
            .map(|buf| read_vec3s(buf, self.position_stride, vertex_count))
            .unwrap_or_default();

        let normals = if self.has_normals {
            self.normals
                .map(|buf| read_vec3s(buf, self.normal_stride, vertex_count))
        } else {
            None
        };

        let indices = self
            .indices
            .map(|buf| self.index_values(buf).take(self.index_count as usize).collect())
            .unwrap_or_default();

        MeshInput {
            positions,
            normals,
            indices,
        }
    }

    #[inline]
    fn strided_len(&self, stride: u32) -> usize {
        (self.vertex_count as usize - 1) * stride as usize + VEC3_BYTES as usize
    }

    fn index_values<'b>(&self, buf: &'b [u8]) -> impl Iterator<Item = u32> + 'b {
        let width = self.index_format.byte_width();
        let count = self.index_count as usize;

        buf.chunks_exact(width).take(count).map(move |c| match width {
            2 => u16::from_ne_bytes([c[0], c[1]]) as u32,
            _ => u32::from_ne_bytes([c[0], c[1], c[2], c[3]]),
        })
    }
}

#[inline]
fn check_len(mesh: usize, buffer: BufferKind, buf: &[u8], needed: usize) -> Result<(), InputError> {
    if buf.len() < needed {
        Err(InputError::BufferTooShort {
            mesh,
            buffer,
            len: buf.len(),
            needed,
        })
    } else {
        Ok(())
    }
}

#[inline]
fn vec3_at(buf: &[u8], stride: usize, i: usize) -> Option<Vec3> {
    buf.get(i * stride..i * stride + VEC3_BYTES as usize)
        .map(|rec| Vec3::from_array(bytemuck::pod_read_unaligned::<[f32; 3]>(rec)))
}

fn read_vec3s(buf: &[u8], stride: u32, count: usize) -> Vec<Vec3> {
    (0..count)
        .filter_map(|i| vec3_at(buf, stride as usize, i))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD: [[f32; 3]; 4] = [
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [1.0, 1.0, 0.0],
        [0.0, 1.0, 0.0],
    ];
    const QUAD_IDX: [u32; 6] = [0, 1, 2, 0, 2, 3];

    #[repr(C)]
    #[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
    struct Point {
        pos: [f32; 3],
        normal: [f32; 3],
        uv: [f32; 2],
    }

    #[test]
    fn test_valid_quad() {
        let decl = MeshDecl::new(&QUAD, &QUAD_IDX);
        assert_eq!(decl.validate(0), Ok(()));
    }

    #[test]
    fn test_null_checks_come_first() {
        // Also has a bad index count; the missing buffer must win.
        let decl = MeshDecl {
            positions: None,
            index_count: 4,
            ..MeshDecl::new(&QUAD, &QUAD_IDX)
        };
        assert_eq!(
            decl.validate(2),
            Err(InputError::NullBuffer {
                mesh: 2,
                buffer: BufferKind::Positions
            })
        );

        let decl = MeshDecl {
            has_normals: true,
            ..MeshDecl::new(&QUAD, &QUAD_IDX)
        };
        assert_eq!(
            decl.validate(0),
            Err(InputError::NullBuffer {
                mesh: 0,
                buffer: BufferKind::Normals
            })
        );
    }

    #[test]
    fn test_partial_triangle() {
        let decl = MeshDecl::new(&QUAD, &QUAD_IDX[..4]);
        assert_eq!(
            decl.validate(0),
            Err(InputError::PartialTriangle {
                mesh: 0,
                index_count: 4
            })
        );
    }

    #[test]
    fn test_empty_counts() {
        let decl = MeshDecl::new(&[], &QUAD_IDX);
        assert_eq!(decl.validate(0), Err(InputError::NoVertices { mesh: 0 }));

        let decl = MeshDecl::new(&QUAD, &[]);
        assert_eq!(decl.validate(0), Err(InputError::NoIndices { mesh: 0 }));
    }

    #[test]
    fn test_stride_checked_before_index_range() {
        let bad_indices = [0u32, 1, 9];
        let decl = MeshDecl {
            position_stride: 8,
            ..MeshDecl::new(&QUAD, &bad_indices)
        };
        assert_eq!(
            decl.validate(0),
            Err(InputError::InvalidStride {
                mesh: 0,
                buffer: BufferKind::Positions,
                stride: 8
            })
        );
    }

    #[test]
    fn test_out_of_range_index_is_named() {
        let indices = [0u32, 1, 2, 0, 2, 7];
        let err = MeshDecl::new(&QUAD, &indices).validate(1).unwrap_err();
        assert_eq!(
            err,
            InputError::OutOfRangeIndex {
                mesh: 1,
                position: 5,
                index: 7,
                vertex_count: 4
            }
        );
        assert!(err.to_string().contains("index 7"));
    }

    #[test]
    fn test_short_buffer() {
        let decl = MeshDecl {
            vertex_count: 5,
            ..MeshDecl::new(&QUAD, &QUAD_IDX)
        };
        assert!(matches!(
            decl.validate(0),
            Err(InputError::BufferTooShort {
                buffer: BufferKind::Positions,
                len: 48,
                needed: 60,
                ..
            })
        ));
    }

    #[test]
    fn test_non_finite_position() {
        let mut points = QUAD;
        points[3][1] = f32::NAN;
        assert_eq!(
            MeshDecl::new(&points, &QUAD_IDX).validate(0),
            Err(InputError::NonFinitePosition { mesh: 0, vertex: 3 })
        );

        points[3][1] = 1.0;
        points[1][2] = f32::NEG_INFINITY;
        assert_eq!(
            MeshDecl::new(&points, &QUAD_IDX).validate(4),
            Err(InputError::NonFinitePosition { mesh: 4, vertex: 1 })
        );
    }

    #[test]
    fn test_index_range_checked_before_positions() {
        let mut points = QUAD;
        points[0][0] = f32::NAN;
        let indices = [0u32, 1, 9];
        assert!(matches!(
            MeshDecl::new(&points, &indices).validate(0),
            Err(InputError::OutOfRangeIndex { index: 9, .. })
        ));
    }

    #[test]
    fn test_u16_indices_are_widened() {
        let indices = [0u16, 1, 2, 0, 2, 3];
        let decl = MeshDecl::with_u16_indices(&QUAD, &indices);
        assert_eq!(decl.validate(0), Ok(()));

        let input = decl.ingest();
        assert_eq!(input.indices, QUAD_IDX.to_vec());
        assert_eq!(input.positions.len(), 4);
        assert!(input.normals.is_none());
    }

    #[test]
    fn test_interleaved_ingest() {
        let points: Vec<Point> = QUAD
            .iter()
            .map(|&pos| Point {
                pos,
                normal: [0.0, 0.0, 1.0],
                uv: [0.0, 0.0],
            })
            .collect();

        let decl = MeshDecl::interleaved(&points, 0, Some(12), &QUAD_IDX);
        assert_eq!(decl.position_stride, 32);
        assert_eq!(decl.validate(0), Ok(()));

        let input = decl.ingest();
        assert_eq!(input.positions[2], Vec3::new(1.0, 1.0, 0.0));
        let normals = input.normals.unwrap();
        assert!(normals.iter().all(|n| *n == Vec3::Z));
    }
}
