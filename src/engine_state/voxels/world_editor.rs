use cgmath::Point3;

use crate::engine_state::voxels::block::BlockId;
use crate::engine_state::voxels::chunk::{chunk_position_of, Chunk, DimensionId};
use crate::error::{EngineError, EngineResult};

use super::world::World;

/// Journaled, non-blocking access to the world for the duration of one behaviour dispatch.
///
/// Writes land in the world immediately and record the cell's previous value. Meshing is only
/// re-armed when the editor is dropped, so [`WorldEditor::rollback`] leaves no trace of a
/// faulting handler: neither the cells nor the meshing flags.
///
/// Chunks are only ever try-locked. A chunk held elsewhere, such as the chunk being ticked,
/// reports [`EngineError::ChunkLocked`] instead of blocking.
pub struct WorldEditor<'a> {
    world: &'a World,
    journal: Vec<(Point3<i32>, BlockId)>,
}

impl<'a> WorldEditor<'a> {
    pub fn new(world: &'a World) -> Self {
        Self {
            world,
            journal: Vec::new(),
        }
    }

    pub fn dimension(&self) -> DimensionId {
        self.world.dimension()
    }

    pub fn contains_chunk(&self, chunk_position: Point3<i32>) -> bool {
        self.world.contains_chunk(chunk_position)
    }

    pub fn get_block_at(&self, world_position: Point3<i32>) -> EngineResult<BlockId> {
        self.world.get_block_at(world_position)
    }

    /// Writes a cell and remembers the previous value.
    ///
    /// # Returns
    /// The block that previously occupied the cell.
    pub fn set_block_at(&mut self, world_position: Point3<i32>, block: BlockId) -> EngineResult<BlockId> {
        let previous = self.world.write_block_at(world_position, block)?;
        self.journal.push((world_position, previous));
        Ok(previous)
    }

    /// Reads a whole chunk.
    ///
    /// # Errors
    /// - [`EngineError::ChunkNotLoaded`] if no chunk is loaded at `chunk_position`
    /// - [`EngineError::ChunkLocked`] if the chunk is held, the ticked chunk included
    pub fn with_chunk<R>(
        &self,
        chunk_position: Point3<i32>,
        read: impl FnOnce(&Chunk) -> R,
    ) -> EngineResult<R> {
        let chunk = self
            .world
            .get_chunk_at(chunk_position)
            .ok_or(EngineError::ChunkNotLoaded(chunk_position))?;
        let guard = chunk
            .try_get()
            .ok_or(EngineError::ChunkLocked(chunk_position))?;
        Ok(read(&guard))
    }

    /// Number of writes made through this editor.
    pub fn edit_count(&self) -> usize {
        self.journal.len()
    }

    /// Undoes every write made through this editor, newest first.
    pub fn rollback(&mut self) {
        if self.journal.is_empty() {
            return;
        }
        log::debug!("Rolling back {} world edit(s)", self.journal.len());
        while let Some((world_position, previous)) = self.journal.pop() {
            let restored = self.world.write_block_at(world_position, previous);
            debug_assert!(
                restored.is_ok(),
                "journaled cell {:?} in chunk {:?} could not be restored",
                world_position,
                chunk_position_of(world_position)
            );
        }
    }
}

impl Drop for WorldEditor<'_> {
    fn drop(&mut self) {
        for (world_position, _) in self.journal.drain(..) {
            self.world.invalidate_around(world_position);
        }
    }
}
