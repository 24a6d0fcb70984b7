use cgmath::Point3;

use crate::engine_state::voxels::block::BlockId;
use crate::error::EngineResult;

use super::Chunk;

/// Journaled write access to a chunk for the duration of one behaviour dispatch.
///
/// Every write records the cell's previous value. If the handler faults, [`ChunkEditor::rollback`]
/// restores the chunk to the state it had before the dispatch started, including the meshing
/// flag. Writes that survive are committed when the editor is dropped.
pub struct ChunkEditor<'a> {
    chunk: &'a mut Chunk,
    journal: Vec<(Point3<i32>, BlockId)>,
    was_ready_for_meshing: bool,
}

impl<'a> ChunkEditor<'a> {
    pub fn new(chunk: &'a mut Chunk) -> Self {
        let was_ready_for_meshing = chunk.is_ready_for_meshing();
        Self {
            chunk,
            journal: Vec::new(),
            was_ready_for_meshing,
        }
    }

    /// Read-only view of the chunk being edited.
    pub fn chunk(&self) -> &Chunk {
        self.chunk
    }

    pub fn position(&self) -> Point3<i32> {
        self.chunk.position
    }

    pub fn get_block(&self, local: Point3<i32>) -> EngineResult<BlockId> {
        self.chunk.get_block(local)
    }

    /// Writes a cell, re-arms meshing and remembers the previous value.
    pub fn set_block(&mut self, local: Point3<i32>, block: BlockId) -> EngineResult<BlockId> {
        let previous = self.chunk.set_block(local, block)?;
        self.journal.push((local, previous));
        Ok(previous)
    }

    /// Number of writes made through this editor.
    pub fn edit_count(&self) -> usize {
        self.journal.len()
    }

    /// Local positions written through this editor, oldest first. A cell written twice appears
    /// twice.
    pub fn edited_positions(&self) -> impl Iterator<Item = Point3<i32>> + '_ {
        self.journal.iter().map(|(local, _)| *local)
    }

    /// Undoes every write made through this editor, newest first.
    pub fn rollback(&mut self) {
        if self.journal.is_empty() {
            return;
        }
        log::debug!(
            "Rolling back {} edit(s) in chunk {:?}",
            self.journal.len(),
            self.chunk.position
        );
        while let Some((local, previous)) = self.journal.pop() {
            let restored = self.chunk.write_cell(local, previous);
            debug_assert!(restored.is_ok(), "journaled cell {:?} is out of bounds", local);
        }
        self.chunk.set_ready_for_meshing(self.was_ready_for_meshing);
    }
}
