use thiserror::Error;

/// Which caller-supplied buffer a validation error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    Positions,
    Normals,
    Indices,
}

impl std::fmt::Display for BufferKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BufferKind::Positions => "position",
            BufferKind::Normals => "normal",
            BufferKind::Indices => "index",
        };

        f.write_str(s)
    }
}

/// Problems with a mesh descriptor (or the batch holding it), found before the engine runs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputError {
    #[error("batch contains no meshes")]
    EmptyBatch,

    #[error("mesh {mesh}: {buffer} buffer is missing")]
    NullBuffer { mesh: usize, buffer: BufferKind },

    #[error("mesh {mesh}: vertex count must be > 0")]
    NoVertices { mesh: usize },

    #[error("mesh {mesh}: index count must be > 0")]
    NoIndices { mesh: usize },

    #[error("mesh {mesh}: index count {index_count} is not a multiple of 3")]
    PartialTriangle { mesh: usize, index_count: u32 },

    #[error("mesh {mesh}: {buffer} stride {stride} is smaller than 12 bytes")]
    InvalidStride {
        mesh: usize,
        buffer: BufferKind,
        stride: u32,
    },

    #[error("mesh {mesh}: {buffer} buffer holds {len} bytes, {needed} required")]
    BufferTooShort {
        mesh: usize,
        buffer: BufferKind,
        len: usize,
        needed: usize,
    },

    #[error("mesh {mesh}: index {index} at position {position} is out of range (vertex count {vertex_count})")]
    OutOfRangeIndex {
        mesh: usize,
        position: usize,
        index: u32,
        vertex_count: u32,
    },

    #[error("mesh {mesh}: position of vertex {vertex} is not finite")]
    NonFinitePosition { mesh: usize, vertex: usize },

    #[error("attribute slice holds {len} entries, mapping references source vertex {needed}")]
    AttributeTooShort { len: usize, needed: u32 },
}

/// Failure reported by an [`AtlasEngine`](crate::engine::AtlasEngine).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("mesh {mesh} has no non-degenerate faces")]
    DegenerateMesh { mesh: usize },

    #[error("atlas of {width}x{height} texels exceeds the {limit} texel limit")]
    AtlasTooLarge { width: u32, height: u32, limit: u32 },

    #[error("engine returned {got} meshes for a batch of {expected}")]
    MeshCountMismatch { expected: usize, got: usize },

    #[error("mesh {mesh}: malformed engine output ({reason})")]
    MalformedOutput { mesh: usize, reason: String },

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AtlasError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InputError),

    #[error("invalid option {field} = {value}: {reason}")]
    InvalidOption {
        field: &'static str,
        value: f64,
        reason: &'static str,
    },

    #[error("engine failure: {0}")]
    EngineFailure(#[from] EngineError),

    #[error("mesh index {index} out of bounds (batch of {len})")]
    IndexOutOfBounds { index: usize, len: usize },
}

pub type Result<T> = std::result::Result<T, AtlasError>;
