//! # Chunk Module
//!
//! This module provides the `Chunk` struct: a fixed 16x16x16 cuboid of block ids plus the state
//! flags that tie it to the meshing and tick loops.
//!
//! ## Storage
//!
//! - `cells`: one [`BlockId`] per cell, stored x-major, then y, then z
//! - `solid_array`: a bit vector (1 bit per cell) marking non-air cells, so iteration and
//!   emptiness checks skip air without touching `cells`
//!
//! ## State flags
//!
//! | flag                  | set by                                   | cleared by                   |
//! |-----------------------|------------------------------------------|------------------------------|
//! | `is_initialized`      | world, once content is stable            | never                        |
//! | `is_ready_for_meshing`| initialisation and every later cell write| the mesher taking the chunk  |
//! | `is_too_far`          | distance culling                         | distance culling             |
//!
//! Every cell write made after initialisation re-arms `is_ready_for_meshing`. Writes made while
//! the world is still generating the chunk do not, so half-built content is never meshed.

use bitvec::prelude::BitVec;
use cgmath::{Point3, Vector3};

use super::block::block_side::BlockSide;
use super::block::BlockId;
use crate::error::{EngineError, EngineResult};

mod chunk_editor;
pub mod chunk_iteration;

pub use chunk_editor::ChunkEditor;
use chunk_iteration::ChunkBlockIterator;

/// The dimension (width, height, depth) of a chunk in blocks.
pub const CHUNK_DIMENSION: i32 = 16;
/// The number of blocks in a single 2D plane of a chunk (CHUNK_DIMENSION²).
pub const CHUNK_PLANE_SIZE: i32 = CHUNK_DIMENSION * CHUNK_DIMENSION;
/// The total number of blocks in a chunk (CHUNK_DIMENSION³).
pub const CHUNK_SIZE: i32 = CHUNK_PLANE_SIZE * CHUNK_DIMENSION;

/// Identifier of the dimension a chunk belongs to.
pub type DimensionId = u16;

/// Converts a world block position to the chunk containing it.
pub fn chunk_position_of(world_position: Point3<i32>) -> Point3<i32> {
    Point3::new(
        world_position.x.div_euclid(CHUNK_DIMENSION),
        world_position.y.div_euclid(CHUNK_DIMENSION),
        world_position.z.div_euclid(CHUNK_DIMENSION),
    )
}

/// Converts a world block position to its position inside the containing chunk.
pub fn local_position_of(world_position: Point3<i32>) -> Point3<i32> {
    Point3::new(
        world_position.x.rem_euclid(CHUNK_DIMENSION),
        world_position.y.rem_euclid(CHUNK_DIMENSION),
        world_position.z.rem_euclid(CHUNK_DIMENSION),
    )
}

/// A 16x16x16 collection of voxel blocks in the world.
///
/// Chunks are the unit of loading, ticking and meshing. A chunk exclusively owns its cells and
/// flags; block types are shared and only referenced by id.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// The position of this chunk in chunk coordinates (not block coordinates).
    pub position: Point3<i32>,
    dimension: DimensionId,
    cells: Vec<BlockId>,
    solid_array: BitVec,
    is_initialized: bool,
    is_ready_for_meshing: bool,
    is_too_far: bool,
    content_version: u64,
}

impl Chunk {
    /// Creates a new, completely empty chunk (all blocks are air).
    pub fn new(position: Point3<i32>, dimension: DimensionId) -> Self {
        Chunk {
            position,
            dimension,
            cells: vec![BlockId::AIR; CHUNK_SIZE as usize],
            solid_array: BitVec::repeat(false, CHUNK_SIZE as usize),
            is_initialized: false,
            is_ready_for_meshing: false,
            is_too_far: false,
            content_version: 0,
        }
    }

    pub fn dimension(&self) -> DimensionId {
        self.dimension
    }

    /// Whether a chunk-local position lies inside the chunk.
    pub fn contains(local: Point3<i32>) -> bool {
        (0..CHUNK_DIMENSION).contains(&local.x)
            && (0..CHUNK_DIMENSION).contains(&local.y)
            && (0..CHUNK_DIMENSION).contains(&local.z)
    }

    fn index_of(local: Point3<i32>) -> EngineResult<usize> {
        if !Self::contains(local) {
            return Err(EngineError::PositionOutOfBounds(local));
        }
        Ok((local.x + CHUNK_DIMENSION * local.y + CHUNK_PLANE_SIZE * local.z) as usize)
    }

    pub(crate) fn position_of_index(index: usize) -> Point3<i32> {
        let index = index as i32;
        Point3::new(
            index % CHUNK_DIMENSION,
            (index / CHUNK_DIMENSION) % CHUNK_DIMENSION,
            index / CHUNK_PLANE_SIZE,
        )
    }

    /// World block position of a chunk-local position.
    pub fn world_position(&self, local: Point3<i32>) -> Point3<i32> {
        Point3::new(
            self.position.x * CHUNK_DIMENSION + local.x,
            self.position.y * CHUNK_DIMENSION + local.y,
            self.position.z * CHUNK_DIMENSION + local.z,
        )
    }

    /// Gets the block at the specified chunk-relative coordinates.
    ///
    /// # Errors
    /// [`EngineError::PositionOutOfBounds`] if any coordinate is outside `0..CHUNK_DIMENSION`.
    pub fn get_block(&self, local: Point3<i32>) -> EngineResult<BlockId> {
        Ok(self.cells[Self::index_of(local)?])
    }

    /// Sets the block at the specified chunk-relative coordinates and re-arms meshing.
    ///
    /// # Returns
    /// The block that previously occupied the cell.
    ///
    /// # Errors
    /// [`EngineError::PositionOutOfBounds`] if any coordinate is outside `0..CHUNK_DIMENSION`.
    pub fn set_block(&mut self, local: Point3<i32>, block: BlockId) -> EngineResult<BlockId> {
        let previous = self.write_cell(local, block)?;
        self.invalidate_mesh();
        Ok(previous)
    }

    /// Writes a cell without touching the meshing flags.
    ///
    /// Callers are responsible for calling [`Chunk::invalidate_mesh`] once the surrounding
    /// mutation is complete.
    pub(crate) fn write_cell(&mut self, local: Point3<i32>, block: BlockId) -> EngineResult<BlockId> {
        let index = Self::index_of(local)?;
        let previous = std::mem::replace(&mut self.cells[index], block);
        self.solid_array.set(index, !block.is_air());
        self.content_version += 1;
        Ok(previous)
    }

    /// Marks the content as stable and ready for its first mesh build.
    ///
    /// Called by the world once generation or loading, including the placement side effects of
    /// the initial blocks, has completed.
    pub fn mark_initialized(&mut self) {
        if !self.is_initialized {
            log::debug!("Chunk {:?} initialized", self.position);
        }
        self.is_initialized = true;
        self.is_ready_for_meshing = true;
    }

    pub fn is_initialized(&self) -> bool {
        self.is_initialized
    }

    /// Requests a mesh rebuild after a content change. No-op until the chunk is initialized.
    pub fn invalidate_mesh(&mut self) {
        if self.is_initialized {
            self.is_ready_for_meshing = true;
        }
    }

    pub fn is_ready_for_meshing(&self) -> bool {
        self.is_ready_for_meshing
    }

    pub fn set_ready_for_meshing(&mut self, is_ready_for_meshing: bool) {
        self.is_ready_for_meshing = is_ready_for_meshing;
    }

    /// Clears the meshing request and reports whether one was pending.
    pub fn take_ready_for_meshing(&mut self) -> bool {
        std::mem::take(&mut self.is_ready_for_meshing)
    }

    pub fn is_too_far(&self) -> bool {
        self.is_too_far
    }

    pub fn set_too_far(&mut self, is_too_far: bool) {
        if self.is_too_far != is_too_far {
            log::debug!("Chunk {:?} too far: {}", self.position, is_too_far);
        }
        self.is_too_far = is_too_far;
    }

    /// Monotonic counter bumped by every cell write.
    pub fn content_version(&self) -> u64 {
        self.content_version
    }

    /// Number of non-air cells.
    pub fn solid_count(&self) -> usize {
        self.solid_array.count_ones()
    }

    pub fn is_empty(&self) -> bool {
        self.solid_array.not_any()
    }

    /// Iterates over every non-air cell with its chunk-local position.
    pub fn blocks(&self) -> ChunkBlockIterator<'_> {
        ChunkBlockIterator::new(self)
    }

    /// Faces of the chunk a local position touches. A write to such a cell changes what the
    /// neighbouring chunk across that face has to draw.
    pub fn boundary_sides(local: Point3<i32>) -> impl Iterator<Item = BlockSide> {
        BlockSide::all().into_iter().filter(move |side| {
            let neighbour = local + side.offset();
            Self::contains(local) && !Self::contains(neighbour)
        })
    }

    /// Chunk coordinates of the neighbour across the given face.
    pub fn neighbour_position(&self, side: BlockSide) -> Point3<i32> {
        self.position + side.offset()
    }

    /// Offset of this chunk's origin in world block space.
    pub fn origin(&self) -> Vector3<i32> {
        Vector3::new(
            self.position.x * CHUNK_DIMENSION,
            self.position.y * CHUNK_DIMENSION,
            self.position.z * CHUNK_DIMENSION,
        )
    }

    pub(crate) fn cells(&self) -> &[BlockId] {
        &self.cells
    }

    pub(crate) fn solid_array(&self) -> &BitVec {
        &self.solid_array
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STONE: BlockId = BlockId(1);

    #[test]
    fn new_chunk_is_empty_and_not_ready() {
        let chunk = Chunk::new(Point3::new(0, 0, 0), 0);
        assert!(chunk.is_empty());
        assert!(!chunk.is_ready_for_meshing());
        assert!(!chunk.is_too_far());
        assert!(!chunk.is_initialized());
    }

    #[test]
    fn out_of_bounds_positions_are_rejected() {
        let mut chunk = Chunk::new(Point3::new(0, 0, 0), 0);
        for local in [
            Point3::new(-1, 0, 0),
            Point3::new(0, CHUNK_DIMENSION, 0),
            Point3::new(0, 0, 99),
        ] {
            assert!(matches!(
                chunk.get_block(local),
                Err(EngineError::PositionOutOfBounds(p)) if p == local
            ));
            assert!(chunk.set_block(local, STONE).is_err());
        }
        assert_eq!(chunk.content_version(), 0);
    }

    #[test]
    fn writes_before_initialization_do_not_request_meshing() {
        let mut chunk = Chunk::new(Point3::new(0, 0, 0), 0);
        chunk.set_block(Point3::new(1, 2, 3), STONE).unwrap();
        assert!(!chunk.is_ready_for_meshing());

        chunk.mark_initialized();
        assert!(chunk.take_ready_for_meshing());
        assert!(!chunk.is_ready_for_meshing());

        let previous = chunk.set_block(Point3::new(1, 2, 3), BlockId::AIR).unwrap();
        assert_eq!(previous, STONE);
        assert!(chunk.is_ready_for_meshing());
    }

    #[test]
    fn raw_writes_leave_flags_alone() {
        let mut chunk = Chunk::new(Point3::new(0, 0, 0), 0);
        chunk.mark_initialized();
        chunk.take_ready_for_meshing();

        chunk.write_cell(Point3::new(0, 0, 0), STONE).unwrap();
        assert!(!chunk.is_ready_for_meshing());
        assert_eq!(chunk.solid_count(), 1);

        chunk.invalidate_mesh();
        assert!(chunk.is_ready_for_meshing());
    }

    #[test]
    fn index_and_position_agree() {
        let local = Point3::new(3, 7, 11);
        let index = Chunk::index_of(local).unwrap();
        assert_eq!(Chunk::position_of_index(index), local);
    }

    #[test]
    fn world_and_local_coordinates_handle_negatives() {
        let world = Point3::new(-1, 16, -17);
        assert_eq!(chunk_position_of(world), Point3::new(-1, 1, -2));
        assert_eq!(local_position_of(world), Point3::new(15, 0, 15));

        let chunk = Chunk::new(chunk_position_of(world), 0);
        assert_eq!(chunk.world_position(local_position_of(world)), world);
    }

    #[test]
    fn boundary_sides_only_on_edges() {
        assert_eq!(Chunk::boundary_sides(Point3::new(5, 5, 5)).count(), 0);
        let corner: Vec<_> = Chunk::boundary_sides(Point3::new(0, 15, 7)).collect();
        assert_eq!(corner, vec![BlockSide::FRONT, BlockSide::TOP]);
    }
}
