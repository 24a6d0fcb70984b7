//! # Client World Module
//!
//! The display client's collection of [`RenderableChunk`]s and the per-frame meshing and draw
//! passes over them.
//!
//! ## Frame structure
//!
//! 1. [`ClientWorld::update_culling`] flags chunks outside the view distance as too far and
//!    evicts those whose neighbours are all too far as well
//! 2. [`ClientWorld::schedule_mesh_builds`] starts builds for ready chunks, nearest first
//! 3. [`ClientWorld::collect_mesh_builds`] uploads finished meshes, dropping results for
//!    chunks evicted while their build was running
//! 4. [`ClientWorld::draw`] emits one [`ChunkDrawCall`] per non-empty layer
//!
//! [`ClientWorld::process_meshing`] runs steps 2 and 3 back to back.

use std::collections::HashMap;
use std::sync::Arc;

use cgmath::{Point3, Vector3};
use web_time::{Duration, Instant};

use crate::config::EngineConfig;
use crate::core::MtResource;
use crate::engine_state::buffer_state::VertexBufferBackend;
use crate::engine_state::context::chunk_distance;
use crate::engine_state::task_management::TaskManager;
use crate::engine_state::voxels::block::block_side::BlockSide;
use crate::engine_state::voxels::block::{BlockTypeTable, RenderLayer};
use crate::engine_state::voxels::chunk::{Chunk, DimensionId};

use super::renderable_chunk::{ChunkUpdate, RenderableChunk};
use super::tasks::chunk_mesh_generation_task::{ChunkMeshGenerationTask, ChunkMeshResult};

/// Chunk update statistics, owned by the client world.
#[derive(Debug, Clone)]
pub struct MeshingMetrics {
    /// Meshes applied since the current one-second window started
    pub chunk_update_counter: u32,
    /// Meshes applied during the last complete one-second window
    pub chunk_updates_per_sec: u32,
    /// Build time accumulated over the current window
    pub chunk_update_time: Duration,
    /// Meshes applied since the last reset
    pub total_updates: u64,
    /// Results dropped because their chunk was evicted or replaced
    pub discarded_builds: u64,
    /// Builds that panicked or whose upload failed
    pub failed_builds: u64,
    window_start: Instant,
}

impl Default for MeshingMetrics {
    fn default() -> Self {
        Self {
            chunk_update_counter: 0,
            chunk_updates_per_sec: 0,
            chunk_update_time: Duration::ZERO,
            total_updates: 0,
            discarded_builds: 0,
            failed_builds: 0,
            window_start: Instant::now(),
        }
    }
}

impl MeshingMetrics {
    pub fn record_update(&mut self, build_time: Duration) {
        self.chunk_update_counter += 1;
        self.chunk_update_time += build_time;
        self.total_updates += 1;
    }

    /// Closes the current window once a second has passed since it started.
    pub fn roll_over(&mut self, now: Instant) {
        if now.duration_since(self.window_start) < Duration::from_secs(1) {
            return;
        }
        self.chunk_updates_per_sec = self.chunk_update_counter;
        log::trace!(
            "{} chunk update(s) in {:?}",
            self.chunk_update_counter,
            self.chunk_update_time
        );
        self.chunk_update_counter = 0;
        self.chunk_update_time = Duration::ZERO;
        self.window_start = now;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// One draw call for the external renderer.
#[derive(Debug)]
pub struct ChunkDrawCall<'a, Buffer> {
    pub position: Point3<i32>,
    /// World block offset of the chunk, applied to its chunk-local vertices
    pub origin: Vector3<i32>,
    pub layer: RenderLayer,
    pub buffer: &'a Buffer,
    pub vertex_count: u32,
}

/// The chunks known to a display client.
pub struct ClientWorld<B: VertexBufferBackend> {
    dimension: DimensionId,
    chunks: HashMap<Point3<i32>, RenderableChunk<B>>,
    backend: B,
    types: Arc<BlockTypeTable>,
    task_manager: TaskManager<ChunkMeshGenerationTask>,
    next_instance_id: u64,
    view_distance: i32,
    max_mesh_builds_per_frame: usize,
    viewer_chunk: Point3<i32>,
    metrics: MeshingMetrics,
}

impl<B: VertexBufferBackend> ClientWorld<B> {
    pub fn new(
        backend: B,
        types: Arc<BlockTypeTable>,
        config: &EngineConfig,
        dimension: DimensionId,
    ) -> Self {
        Self {
            dimension,
            chunks: HashMap::new(),
            backend,
            types,
            task_manager: TaskManager::new(config.mesh_workers),
            next_instance_id: 0,
            view_distance: config.view_distance,
            max_mesh_builds_per_frame: config.max_mesh_builds_per_frame,
            viewer_chunk: Point3::new(0, 0, 0),
            metrics: MeshingMetrics::default(),
        }
    }

    pub fn dimension(&self) -> DimensionId {
        self.dimension
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn metrics(&self) -> &MeshingMetrics {
        &self.metrics
    }

    pub fn metrics_mut(&mut self) -> &mut MeshingMetrics {
        &mut self.metrics
    }

    pub fn get_chunk(&self, position: Point3<i32>) -> Option<&RenderableChunk<B>> {
        self.chunks.get(&position)
    }

    pub fn chunk_positions(&self) -> impl Iterator<Item = Point3<i32>> + '_ {
        self.chunks.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Replaces the block type table, e.g. after content was reloaded, and re-arms every chunk.
    pub fn set_block_types(&mut self, types: Arc<BlockTypeTable>) {
        self.types = types;
        for renderable in self.chunks.values() {
            renderable.chunk().get_mut().invalidate_mesh();
        }
    }

    /// Accepts chunk content from the server.
    ///
    /// A new chunk is inserted and its loaded neighbours are told so they can hide the faces
    /// they now share with it. Content for a known chunk replaces the old content in place.
    pub fn receive_chunk(&mut self, chunk: Chunk) {
        if chunk.dimension() != self.dimension {
            log::warn!(
                "Ignoring chunk {:?} of dimension {} while in dimension {}",
                chunk.position,
                chunk.dimension(),
                self.dimension
            );
            return;
        }

        let position = chunk.position;
        if let Some(renderable) = self.chunks.get_mut(&position) {
            renderable.update(ChunkUpdate::ContentReceived(chunk));
            log::debug!(
                "Chunk {:?} received {} times",
                position,
                renderable.debug_times_received()
            );
        } else {
            let instance_id = self.next_instance_id;
            self.next_instance_id += 1;
            let renderable = RenderableChunk::new(chunk, instance_id);
            let too_far = chunk_distance(position, self.viewer_chunk) > self.view_distance;
            renderable.chunk().get_mut().set_too_far(too_far);
            self.chunks.insert(position, renderable);
        }
        self.notify_neighbours(position);
    }

    fn notify_neighbours(&mut self, position: Point3<i32>) {
        for side in BlockSide::all() {
            if let Some(neighbour) = self.chunks.get_mut(&(position + side.offset())) {
                neighbour.update(ChunkUpdate::NeighbourChanged(side.opposite()));
            }
        }
    }

    /// Removes a chunk and releases its GPU buffers. A build still running for it is discarded
    /// when it completes.
    pub fn evict_chunk(&mut self, position: Point3<i32>) -> bool {
        let Some(mut renderable) = self.chunks.remove(&position) else {
            return false;
        };
        if renderable.is_mesh_in_flight() {
            log::debug!("Evicting chunk {:?} with a mesh build in flight", position);
        }
        renderable.release_buffers(&mut self.backend);
        self.notify_neighbours(position);
        true
    }

    /// Switches to another dimension, evicting every chunk of the current one.
    pub fn change_dimension(&mut self, dimension: DimensionId) {
        if dimension == self.dimension {
            return;
        }
        log::info!("Changing dimension {} -> {}", self.dimension, dimension);
        let positions: Vec<_> = self.chunks.keys().copied().collect();
        for position in positions {
            self.evict_chunk(position);
        }
        self.dimension = dimension;
    }

    /// Whether every neighbour of the chunk is too far. Neighbours that are not loaded count as
    /// too far.
    pub fn are_all_neighbours_too_far(&self, position: Point3<i32>) -> bool {
        BlockSide::all().into_iter().all(|side| {
            self.chunks
                .get(&(position + side.offset()))
                .map_or(true, RenderableChunk::is_too_far)
        })
    }

    /// Applies view-distance culling around the viewer and evicts chunks that are too far and
    /// no longer needed as a meshing neighbour.
    ///
    /// # Returns
    /// The evicted chunk positions.
    pub fn update_culling(&mut self, viewer_chunk: Point3<i32>) -> Vec<Point3<i32>> {
        self.viewer_chunk = viewer_chunk;
        for (position, renderable) in &self.chunks {
            let too_far = chunk_distance(*position, viewer_chunk) > self.view_distance;
            renderable.chunk().get_mut().set_too_far(too_far);
        }

        let evicted: Vec<_> = self
            .chunks
            .iter()
            .filter(|(position, renderable)| {
                renderable.is_too_far() && self.are_all_neighbours_too_far(**position)
            })
            .map(|(position, _)| *position)
            .collect();
        for position in &evicted {
            self.evict_chunk(*position);
        }
        evicted
    }

    /// Starts mesh builds for ready chunks, nearest to the viewer first, up to the per-frame
    /// limit.
    ///
    /// # Returns
    /// The number of builds started.
    pub fn schedule_mesh_builds(&mut self) -> usize {
        let mut candidates: Vec<_> = self
            .chunks
            .iter()
            .filter(|(_, renderable)| !renderable.is_mesh_in_flight())
            .map(|(position, _)| *position)
            .collect();
        candidates.sort_by_key(|position| {
            (
                chunk_distance(*position, self.viewer_chunk),
                position.x,
                position.y,
                position.z,
            )
        });

        let mut scheduled = 0;
        for position in candidates {
            if scheduled >= self.max_mesh_builds_per_frame {
                break;
            }
            let neighbours = self.neighbour_chunks(position);
            let types = self.types.clone();
            let Some(renderable) = self.chunks.get_mut(&position) else {
                continue;
            };
            if let Some(task) = renderable.process(neighbours, types) {
                self.task_manager.publish_task(task);
                scheduled += 1;
            }
        }
        scheduled
    }

    fn neighbour_chunks(&self, position: Point3<i32>) -> Vec<(BlockSide, MtResource<Chunk>)> {
        BlockSide::all()
            .into_iter()
            .filter_map(|side| {
                self.chunks
                    .get(&(position + side.offset()))
                    .map(|neighbour| (side, neighbour.chunk().clone()))
            })
            .collect()
    }

    /// Applies every finished build without blocking.
    ///
    /// # Returns
    /// The number of meshes swapped in.
    pub fn collect_mesh_builds(&mut self) -> usize {
        let results = self.task_manager.drain_completed();
        self.apply_results(results)
    }

    /// Blocks until every running build has finished and applies them.
    pub fn finish_mesh_builds(&mut self) -> usize {
        let results = self.task_manager.wait_all();
        self.apply_results(results)
    }

    /// Schedules and collects mesh builds.
    pub fn process_meshing(&mut self) -> usize {
        self.schedule_mesh_builds();
        self.collect_mesh_builds()
    }

    fn apply_results(&mut self, results: Vec<ChunkMeshResult>) -> usize {
        let mut applied = 0;
        for result in results {
            let Some(renderable) = self
                .chunks
                .get_mut(&result.position)
                .filter(|renderable| renderable.instance_id() == result.instance_id)
            else {
                log::warn!(
                    "Discarding mesh for chunk {:?} evicted during its build",
                    result.position
                );
                self.metrics.discarded_builds += 1;
                continue;
            };

            match result.mesh {
                Ok(mesh) => match renderable.apply_mesh(&mesh, &mut self.backend) {
                    Ok(()) => {
                        self.metrics.record_update(result.build_time);
                        applied += 1;
                    }
                    Err(_) => self.metrics.failed_builds += 1,
                },
                Err(message) => {
                    log::error!("Mesh build for chunk {:?} failed: {}", result.position, message);
                    renderable.abandon_mesh();
                    self.metrics.failed_builds += 1;
                }
            }
        }
        self.metrics.roll_over(Instant::now());
        applied
    }

    /// Emits a draw call for every non-empty layer of every chunk within view. Chunks that have
    /// not finished a build yet emit nothing.
    ///
    /// # Returns
    /// The number of draw calls emitted.
    pub fn draw(&mut self, mut emit: impl FnMut(ChunkDrawCall<'_, B::Buffer>)) -> usize {
        let mut draw_calls = 0;
        for (position, renderable) in self.chunks.iter_mut() {
            if renderable.is_too_far() {
                continue;
            }
            let origin = renderable.chunk().get().origin();
            let mut drew = false;
            for layer in RenderLayer::all() {
                let vertex_count = renderable.get_vertices_count(layer);
                let Some(buffer) = renderable.get_vertex_buffer(layer) else {
                    continue;
                };
                emit(ChunkDrawCall {
                    position: *position,
                    origin,
                    layer,
                    buffer,
                    vertex_count,
                });
                drew = true;
                draw_calls += 1;
            }
            if drew {
                renderable.mark_drawn();
            }
        }
        draw_calls
    }

    /// Evicts every chunk, releasing all GPU buffers.
    pub fn clear(&mut self) {
        let positions: Vec<_> = self.chunks.keys().copied().collect();
        for position in positions {
            self.evict_chunk(position);
        }
    }
}

impl<B: VertexBufferBackend> Drop for ClientWorld<B> {
    fn drop(&mut self) {
        self.clear();
    }
}
