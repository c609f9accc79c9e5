//! The orchestrator: validates a batch, runs the engine once, and keeps one
//! reusable [`ResultMesh`] slot per input mesh.

use log::debug;

use crate::descriptor::MeshDecl;
use crate::engine::{AtlasEngine, AtlasImage, MeshInput, PlanarEngine};
use crate::error::{AtlasError, EngineError, InputError, Result};
use crate::options::{ChartOptions, PackOptions};
use crate::result::ResultMesh;

#[derive(Debug, Clone, Default)]
struct Slot {
    mesh: ResultMesh,
    populated: bool,
}

/// Generates UV atlases for batches of meshes.
///
/// Slots and their buffers survive across `generate` calls; a batch with the
/// same (or smaller) output reuses every allocation.
#[derive(Debug, Default)]
pub struct Atlas<E: AtlasEngine = PlanarEngine> {
    engine: E,
    slots: Vec<Slot>,
    width: u32,
    height: u32,
    chart_count: u32,
    image: Option<AtlasImage>,
}

impl Atlas<PlanarEngine> {
    pub fn new() -> Self {
        Self::with_engine(PlanarEngine::new())
    }
}

impl<E: AtlasEngine> Atlas<E> {
    pub fn with_engine(engine: E) -> Self {
        Self {
            engine,
            slots: Vec::new(),
            width: 0,
            height: 0,
            chart_count: 0,
            image: None,
        }
    }

    /// [`generate_with`](Self::generate_with) using default options.
    pub fn generate(&mut self, meshes: &[MeshDecl<'_>]) -> Result<()> {
        self.generate_with(meshes, None, None)
    }

    /// Build one atlas shared by every mesh in `meshes`.
    ///
    /// Nothing changes if options or descriptors are invalid, or if the engine
    /// fails. If an engine output turns out malformed, slots before it hold the
    /// new results and it and every later slot become unpopulated.
    pub fn generate_with(
        &mut self,
        meshes: &[MeshDecl<'_>],
        chart_options: Option<&ChartOptions>,
        pack_options: Option<&PackOptions>,
    ) -> Result<()> {
        let chart_options = chart_options.cloned().unwrap_or_default();
        let pack_options = pack_options.cloned().unwrap_or_default();
        chart_options.validate()?;
        pack_options.validate()?;

        if meshes.is_empty() {
            return Err(InputError::EmptyBatch.into());
        }
        for (index, decl) in meshes.iter().enumerate() {
            decl.validate(index)?;
        }

        let inputs: Vec<MeshInput> = meshes.iter().map(MeshDecl::ingest).collect();
        debug!("generating atlas for {} meshes", inputs.len());

        let output = self.engine.run(&inputs, &chart_options, &pack_options)?;
        if output.meshes.len() != inputs.len() {
            return Err(EngineError::MeshCountMismatch {
                expected: inputs.len(),
                got: output.meshes.len(),
            }
            .into());
        }

        self.width = output.width;
        self.height = output.height;
        self.chart_count = output.chart_count;
        self.image = output.image;

        self.slots.truncate(inputs.len());
        self.slots.resize_with(inputs.len(), Slot::default);

        for (index, (out, input)) in output.meshes.iter().zip(&inputs).enumerate() {
            if let Err(e) = out.check(index, input.vertex_count()) {
                for slot in &mut self.slots[index..] {
                    slot.populated = false;
                }
                return Err(e.into());
            }

            let slot = &mut self.slots[index];
            slot.mesh.fill_from_output(out);
            slot.populated = true;
        }

        debug!(
            "atlas {}x{} with {} charts materialized",
            self.width, self.height, self.chart_count
        );
        Ok(())
    }

    /// The generated mesh for batch position `index`.
    pub fn mesh_at(&self, index: usize) -> Result<&ResultMesh> {
        self.slots
            .get(index)
            .filter(|slot| slot.populated)
            .map(|slot| &slot.mesh)
            .ok_or(AtlasError::IndexOutOfBounds {
                index,
                len: self.slots.len(),
            })
    }

    /// Copy the mesh at `index` into `dest`, reusing its allocations.
    pub fn mesh_at_into(&self, index: usize, dest: &mut ResultMesh) -> Result<()> {
        dest.copy_from(self.mesh_at(index)?);
        Ok(())
    }

    /// Number of slots from the last batch (populated or not).
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn chart_count(&self) -> u32 {
        self.chart_count
    }

    /// Chart image from the last run, when `create_image` was set.
    pub fn image(&self) -> Option<&AtlasImage> {
        self.image.as_ref()
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }
}
