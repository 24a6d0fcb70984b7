//! Task for generating mesh data for chunks in a background thread.
//!
//! The task captures the boundary layers of the chunk's neighbours first, then builds the mesh
//! under a read lock on the chunk itself, so a concurrent edit to the chunk waits for the build
//! instead of racing it. The result carries the instance id of the renderable chunk that asked
//! for it; the owner drops results whose chunk has been evicted or replaced in the meantime.

use std::sync::Arc;

use cgmath::Point3;
use web_time::{Duration, Instant};

use crate::{
    core::MtResource,
    engine_state::{
        rendering::meshing::{build_chunk_mesh, ChunkMesh, NeighbourLayers},
        task_management::task::Task,
        voxels::{
            block::{block_side::BlockSide, BlockTypeTable},
            chunk::Chunk,
        },
    },
};

/// A task that builds the mesh of one chunk.
pub struct ChunkMeshGenerationTask {
    /// Position of the chunk, in chunk coordinates
    position: Point3<i32>,
    /// Identity of the renderable chunk the mesh is for
    instance_id: u64,
    chunk: MtResource<Chunk>,
    neighbours: Vec<(BlockSide, MtResource<Chunk>)>,
    types: Arc<BlockTypeTable>,
}

impl ChunkMeshGenerationTask {
    pub fn new(
        position: Point3<i32>,
        instance_id: u64,
        chunk: MtResource<Chunk>,
        neighbours: Vec<(BlockSide, MtResource<Chunk>)>,
        types: Arc<BlockTypeTable>,
    ) -> Self {
        ChunkMeshGenerationTask {
            position,
            instance_id,
            chunk,
            neighbours,
            types,
        }
    }
}

/// Output of a [`ChunkMeshGenerationTask`].
#[derive(Debug)]
pub struct ChunkMeshResult {
    pub position: Point3<i32>,
    pub instance_id: u64,
    /// The built mesh, or the message of the panic that aborted the build.
    pub mesh: Result<ChunkMesh, String>,
    pub build_time: Duration,
}

impl Task for ChunkMeshGenerationTask {
    type Output = ChunkMeshResult;

    fn process(&self) -> ChunkMeshResult {
        let start = Instant::now();

        let mut layers = NeighbourLayers::default();
        for (side, neighbour) in &self.neighbours {
            layers.capture(*side, &neighbour.get());
        }
        let mesh = build_chunk_mesh(&self.chunk.get(), &layers, &self.types);

        ChunkMeshResult {
            position: self.position,
            instance_id: self.instance_id,
            mesh: Ok(mesh),
            build_time: start.elapsed(),
        }
    }

    fn recover(&self, panic_message: String) -> ChunkMeshResult {
        ChunkMeshResult {
            position: self.position,
            instance_id: self.instance_id,
            mesh: Err(panic_message),
            build_time: Duration::ZERO,
        }
    }
}
