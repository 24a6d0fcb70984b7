//! # World Module
//!
//! This module provides the `World` struct which owns the loaded chunks of one dimension on the
//! simulation side.
//!
//! ## Architecture
//!
//! The world uses a sparse storage approach where only loaded chunks are kept in memory. Each
//! chunk sits in its own [`MtResource`] so a tick can hold one chunk exclusively while handlers
//! read the rest of the world.
//!
//! ## Re-entrancy
//!
//! World-space accessors never block. While a chunk is held by an in-progress dispatch, reading
//! or writing it through the world fails with [`EngineError::ChunkLocked`]. Neighbour
//! invalidations that hit a held chunk are deferred and applied by
//! [`World::flush_deferred_invalidations`].

use std::collections::{HashMap, HashSet};

use cgmath::Point3;

use crate::core::MtResource;
use crate::engine_state::context::{chunk_distance, PlayerList};
use crate::engine_state::voxels::block::block_side::BlockSide;
use crate::engine_state::voxels::block::BlockId;
use crate::engine_state::voxels::chunk::{
    chunk_position_of, local_position_of, Chunk, DimensionId,
};
use crate::error::{EngineError, EngineResult};

/// A voxel world composed of multiple chunks.
///
/// # Examples
///
/// ```
/// use cgmath::Point3;
/// use voxel_runtime::engine_state::voxels::block::BlockId;
/// use voxel_runtime::engine_state::voxels::chunk::Chunk;
/// use voxel_runtime::engine_state::voxels::world::World;
///
/// let mut world = World::new(0);
/// world.add_chunk(Chunk::new(Point3::new(0, 0, 0), 0));
///
/// world.set_block_at(Point3::new(3, 4, 5), BlockId(1)).unwrap();
/// assert_eq!(world.get_block_at(Point3::new(3, 4, 5)).unwrap(), BlockId(1));
/// ```
pub struct World {
    dimension: DimensionId,
    chunks: HashMap<Point3<i32>, MtResource<Chunk>>,
    deferred_invalidations: MtResource<HashSet<Point3<i32>>>,
}

impl World {
    pub fn new(dimension: DimensionId) -> Self {
        World {
            dimension,
            chunks: HashMap::new(),
            deferred_invalidations: MtResource::new(HashSet::new()),
        }
    }

    pub fn dimension(&self) -> DimensionId {
        self.dimension
    }

    /// Inserts a chunk, replacing any chunk already loaded at its position.
    ///
    /// The chunk keeps whatever flags it carries. Call [`World::mark_chunk_initialized`] once its
    /// content is complete.
    pub fn add_chunk(&mut self, chunk: Chunk) -> MtResource<Chunk> {
        let position = chunk.position;
        let resource = MtResource::new(chunk);
        if self.chunks.insert(position, resource.clone()).is_some() {
            log::debug!("Replaced loaded chunk at {:?}", position);
        }
        resource
    }

    /// Retrieves the chunk at the given chunk coordinates.
    ///
    /// Locking the returned handle blocks while the chunk is held. Behaviour handlers read
    /// chunks through [`WorldEditor::with_chunk`](super::world_editor::WorldEditor::with_chunk)
    /// instead.
    pub fn get_chunk_at(&self, position: Point3<i32>) -> Option<MtResource<Chunk>> {
        self.chunks.get(&position).cloned()
    }

    pub fn contains_chunk(&self, position: Point3<i32>) -> bool {
        self.chunks.contains_key(&position)
    }

    /// Unloads a chunk. No behaviour handler is invoked.
    pub fn remove_chunk(&mut self, position: Point3<i32>) -> Option<MtResource<Chunk>> {
        let removed = self.chunks.remove(&position);
        if removed.is_some() {
            log::debug!("Unloaded chunk at {:?}", position);
        }
        removed
    }

    pub fn chunk_positions(&self) -> impl Iterator<Item = Point3<i32>> + '_ {
        self.chunks.keys().copied()
    }

    pub fn chunks(&self) -> impl Iterator<Item = (&Point3<i32>, &MtResource<Chunk>)> {
        self.chunks.iter()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    fn loaded_chunk(&self, world_position: Point3<i32>) -> EngineResult<&MtResource<Chunk>> {
        let chunk_position = chunk_position_of(world_position);
        self.chunks
            .get(&chunk_position)
            .ok_or(EngineError::ChunkNotLoaded(chunk_position))
    }

    /// Reads the block at a world position.
    ///
    /// # Errors
    /// - [`EngineError::ChunkNotLoaded`] if the containing chunk is not loaded
    /// - [`EngineError::ChunkLocked`] if the containing chunk is being written elsewhere
    pub fn get_block_at(&self, world_position: Point3<i32>) -> EngineResult<BlockId> {
        let chunk = self.loaded_chunk(world_position)?;
        let guard = chunk
            .try_get()
            .ok_or(EngineError::ChunkLocked(chunk_position_of(world_position)))?;
        guard.get_block(local_position_of(world_position))
    }

    /// Writes the block at a world position and re-arms meshing for the containing chunk and
    /// every neighbour whose boundary faces depend on the cell.
    ///
    /// # Returns
    /// The block that previously occupied the cell.
    pub fn set_block_at(&self, world_position: Point3<i32>, block: BlockId) -> EngineResult<BlockId> {
        let previous = self.write_block_at(world_position, block)?;
        self.invalidate_around(world_position);
        Ok(previous)
    }

    /// Writes a cell without touching any meshing flag.
    pub(crate) fn write_block_at(
        &self,
        world_position: Point3<i32>,
        block: BlockId,
    ) -> EngineResult<BlockId> {
        let chunk = self.loaded_chunk(world_position)?;
        let mut guard = chunk
            .try_get_mut()
            .ok_or(EngineError::ChunkLocked(chunk_position_of(world_position)))?;
        guard.write_cell(local_position_of(world_position), block)
    }

    /// Re-arms meshing for the chunk containing `world_position` and for the neighbours across
    /// any chunk face the cell touches.
    pub fn invalidate_around(&self, world_position: Point3<i32>) {
        let chunk_position = chunk_position_of(world_position);
        self.invalidate_chunk(chunk_position);
        for side in Chunk::boundary_sides(local_position_of(world_position)) {
            self.invalidate_chunk(chunk_position + side.offset());
        }
    }

    /// Re-arms meshing for one chunk, deferring the request if the chunk is held.
    pub fn invalidate_chunk(&self, chunk_position: Point3<i32>) {
        let Some(chunk) = self.chunks.get(&chunk_position) else {
            return;
        };
        match chunk.try_get_mut() {
            Some(mut guard) => guard.invalidate_mesh(),
            None => {
                log::debug!("Deferring mesh invalidation of held chunk {:?}", chunk_position);
                self.deferred_invalidations.get_mut().insert(chunk_position);
            }
        }
    }

    /// Applies invalidations deferred while their chunk was held. Returns how many were applied.
    pub fn flush_deferred_invalidations(&self) -> usize {
        let pending: Vec<_> = self.deferred_invalidations.get_mut().drain().collect();
        let mut applied = 0;
        for chunk_position in pending {
            if let Some(chunk) = self.chunks.get(&chunk_position) {
                chunk.get_mut().invalidate_mesh();
                applied += 1;
            }
        }
        applied
    }

    /// Declares a chunk's content complete: the chunk becomes ready for its first mesh build and
    /// initialized neighbours are re-armed, since their boundary faces may now be hidden.
    pub fn mark_chunk_initialized(&self, chunk_position: Point3<i32>) -> EngineResult<()> {
        let chunk = self
            .chunks
            .get(&chunk_position)
            .ok_or(EngineError::ChunkNotLoaded(chunk_position))?;
        chunk.get_mut().mark_initialized();
        for side in BlockSide::all() {
            self.invalidate_chunk(chunk_position + side.offset());
        }
        Ok(())
    }

    /// Loaded neighbours of a chunk, by face.
    pub fn neighbours(&self, chunk_position: Point3<i32>) -> Vec<(BlockSide, MtResource<Chunk>)> {
        BlockSide::all()
            .into_iter()
            .filter_map(|side| {
                self.get_chunk_at(chunk_position + side.offset())
                    .map(|chunk| (side, chunk))
            })
            .collect()
    }

    /// Flags every chunk farther than `radius` chunks from all players as too far to simulate.
    ///
    /// # Returns
    /// The number of chunks flagged too far.
    pub fn update_simulation_distance(&self, players: &PlayerList, radius: i32) -> usize {
        let player_chunks: Vec<_> = players.values().map(|player| player.chunk_position()).collect();
        let mut too_far = 0;
        for (position, chunk) in &self.chunks {
            let is_too_far = !player_chunks
                .iter()
                .any(|player_chunk| chunk_distance(*position, *player_chunk) <= radius);
            chunk.get_mut().set_too_far(is_too_far);
            too_far += is_too_far as usize;
        }
        too_far
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::context::Player;

    const STONE: BlockId = BlockId(1);

    fn initialized_world(positions: &[Point3<i32>]) -> World {
        let mut world = World::new(0);
        for position in positions {
            world.add_chunk(Chunk::new(*position, 0));
        }
        for position in positions {
            world.mark_chunk_initialized(*position).unwrap();
        }
        for (_, chunk) in world.chunks() {
            chunk.get_mut().take_ready_for_meshing();
        }
        world
    }

    #[test]
    fn world_positions_resolve_to_chunks() {
        let world = initialized_world(&[Point3::new(-1, 0, 0)]);
        world.set_block_at(Point3::new(-1, 2, 3), STONE).unwrap();

        let chunk = world.get_chunk_at(Point3::new(-1, 0, 0)).unwrap();
        assert_eq!(chunk.get().get_block(Point3::new(15, 2, 3)).unwrap(), STONE);
        assert!(chunk.get().is_ready_for_meshing());

        assert!(matches!(
            world.get_block_at(Point3::new(0, 0, 0)),
            Err(EngineError::ChunkNotLoaded(p)) if p == Point3::new(0, 0, 0)
        ));
    }

    #[test]
    fn boundary_writes_invalidate_neighbours() {
        let world = initialized_world(&[Point3::new(0, 0, 0), Point3::new(1, 0, 0), Point3::new(0, 1, 0)]);

        world.set_block_at(Point3::new(15, 5, 5), STONE).unwrap();

        let ready = |p: Point3<i32>| world.get_chunk_at(p).unwrap().get().is_ready_for_meshing();
        assert!(ready(Point3::new(0, 0, 0)));
        assert!(ready(Point3::new(1, 0, 0)));
        assert!(!ready(Point3::new(0, 1, 0)));
    }

    #[test]
    fn held_chunks_fail_fast_and_defer_invalidation() {
        let world = initialized_world(&[Point3::new(0, 0, 0), Point3::new(1, 0, 0)]);
        let held = world.get_chunk_at(Point3::new(1, 0, 0)).unwrap();

        {
            let _guard = held.get_mut();
            assert!(matches!(
                world.get_block_at(Point3::new(16, 0, 0)),
                Err(EngineError::ChunkLocked(_))
            ));
            world.set_block_at(Point3::new(15, 0, 0), STONE).unwrap();
        }

        assert!(!held.get().is_ready_for_meshing());
        assert_eq!(world.flush_deferred_invalidations(), 1);
        assert!(held.get().is_ready_for_meshing());
        assert_eq!(world.flush_deferred_invalidations(), 0);
    }

    #[test]
    fn initializing_a_chunk_rearms_its_neighbours() {
        let mut world = initialized_world(&[Point3::new(0, 0, 0)]);
        world.add_chunk(Chunk::new(Point3::new(0, 0, 1), 0));
        world.mark_chunk_initialized(Point3::new(0, 0, 1)).unwrap();

        assert!(world.get_chunk_at(Point3::new(0, 0, 0)).unwrap().get().is_ready_for_meshing());
        assert_eq!(world.neighbours(Point3::new(0, 0, 0)).len(), 1);
    }

    #[test]
    fn simulation_distance_follows_players() {
        let world = initialized_world(&[Point3::new(0, 0, 0), Point3::new(5, 0, 0)]);
        let mut players = PlayerList::new();
        players.insert(1, Player::new(1, "alex", Point3::new(8.0, 8.0, 8.0)));

        assert_eq!(world.update_simulation_distance(&players, 2), 1);
        assert!(!world.get_chunk_at(Point3::new(0, 0, 0)).unwrap().get().is_too_far());
        assert!(world.get_chunk_at(Point3::new(5, 0, 0)).unwrap().get().is_too_far());

        assert_eq!(world.update_simulation_distance(&PlayerList::new(), 2), 2);
    }
}
