//! # Renderable Chunk Module
//!
//! A [`RenderableChunk`] is the client-side view of a chunk: the shared [`Chunk`] plus the GPU
//! geometry built from it.
//!
//! ## Buffer lifecycle
//!
//! Each render layer has at most one vertex buffer. A rebuild uploads every non-empty layer into
//! fresh buffers first and swaps them in only once all uploads succeeded, releasing the old
//! buffers afterwards. Readers of [`RenderableChunk::get_vertex_buffer`] and
//! [`RenderableChunk::get_vertices_count`] therefore always see the last complete build. A
//! failed upload leaves the previous geometry in place and re-arms meshing.
//!
//! Buffers are handed back to the backend by [`RenderableChunk::release_buffers`], which the
//! client world calls exactly once when it evicts the chunk.

use std::sync::Arc;

use cgmath::Point3;

use crate::core::MtResource;
use crate::engine_state::buffer_state::VertexBufferBackend;
use crate::engine_state::voxels::block::block_side::BlockSide;
use crate::engine_state::voxels::block::{BlockTypeTable, RenderLayer};
use crate::engine_state::voxels::chunk::Chunk;
use crate::error::EngineResult;

use super::meshing::ChunkMesh;
use super::tasks::chunk_mesh_generation_task::ChunkMeshGenerationTask;

/// Gameplay-level change a renderable chunk reacts to.
#[derive(Debug)]
pub enum ChunkUpdate {
    /// Fresh content for the chunk arrived from the server.
    ContentReceived(Chunk),
    /// A neighbouring chunk was loaded, changed or unloaded across the given face.
    NeighbourChanged(BlockSide),
}

/// A chunk together with the per-layer vertex buffers drawn for it.
pub struct RenderableChunk<B: VertexBufferBackend> {
    chunk: MtResource<Chunk>,
    instance_id: u64,
    buffers: [Option<B::Buffer>; RenderLayer::COUNT],
    vertex_counts: [u32; RenderLayer::COUNT],
    has_been_drawn: bool,
    mesh_in_flight: bool,
    debug_times_received: u32,
}

impl<B: VertexBufferBackend> RenderableChunk<B> {
    /// Wraps a received chunk. The chunk is treated as complete and becomes ready for meshing.
    ///
    /// `instance_id` must be unique for the lifetime of the owning world; mesh results are
    /// matched against it.
    pub fn new(mut chunk: Chunk, instance_id: u64) -> Self {
        chunk.mark_initialized();
        Self {
            chunk: MtResource::new(chunk),
            instance_id,
            buffers: Default::default(),
            vertex_counts: [0; RenderLayer::COUNT],
            has_been_drawn: false,
            mesh_in_flight: false,
            debug_times_received: 1,
        }
    }

    pub fn chunk(&self) -> &MtResource<Chunk> {
        &self.chunk
    }

    pub fn position(&self) -> Point3<i32> {
        self.chunk.get().position
    }

    pub fn instance_id(&self) -> u64 {
        self.instance_id
    }

    /// How many times content for this chunk has been received.
    pub fn debug_times_received(&self) -> u32 {
        self.debug_times_received
    }

    pub fn has_been_drawn(&self) -> bool {
        self.has_been_drawn
    }

    pub(crate) fn mark_drawn(&mut self) {
        if !self.has_been_drawn {
            log::debug!("Chunk {:?} drawn for the first time", self.position());
        }
        self.has_been_drawn = true;
    }

    pub fn is_too_far(&self) -> bool {
        self.chunk.get().is_too_far()
    }

    pub fn is_mesh_in_flight(&self) -> bool {
        self.mesh_in_flight
    }

    /// Reacts to a gameplay-level change by re-arming meshing where the geometry depends on it.
    pub fn update(&mut self, update: ChunkUpdate) {
        let mut chunk = self.chunk.get_mut();
        match update {
            ChunkUpdate::ContentReceived(mut content) => {
                self.debug_times_received += 1;
                content.set_too_far(chunk.is_too_far());
                content.mark_initialized();
                *chunk = content;
            }
            ChunkUpdate::NeighbourChanged(side) => {
                log::trace!("Chunk {:?} neighbour changed across {:?}", chunk.position, side);
                chunk.invalidate_mesh();
            }
        }
    }

    /// Starts a rebuild if one is needed.
    ///
    /// Nothing happens while the chunk is too far, not ready for meshing, or still waiting for
    /// a previous build; a pending request stays armed until it can be served. Otherwise the
    /// readiness flag is consumed and a build task over the chunk and its neighbours is
    /// returned. Its result is applied with [`RenderableChunk::apply_mesh`].
    pub fn process(
        &mut self,
        neighbours: Vec<(BlockSide, MtResource<Chunk>)>,
        types: Arc<BlockTypeTable>,
    ) -> Option<ChunkMeshGenerationTask> {
        if self.mesh_in_flight {
            return None;
        }
        let position = {
            let mut chunk = self.chunk.get_mut();
            if chunk.is_too_far() || !chunk.take_ready_for_meshing() {
                return None;
            }
            chunk.position
        };
        self.mesh_in_flight = true;
        Some(ChunkMeshGenerationTask::new(
            position,
            self.instance_id,
            self.chunk.clone(),
            neighbours,
            types,
        ))
    }

    /// Uploads a finished mesh and swaps it in.
    ///
    /// # Errors
    /// The first upload error. Buffers uploaded before it are released again, the previous
    /// geometry stays in place and the chunk is re-armed for meshing.
    pub fn apply_mesh(&mut self, mesh: &ChunkMesh, backend: &mut B) -> EngineResult<()> {
        self.mesh_in_flight = false;
        let position = self.position();

        let mut uploaded: [Option<B::Buffer>; RenderLayer::COUNT] = Default::default();
        for layer in RenderLayer::all() {
            let vertices = mesh.vertices(layer);
            if vertices.is_empty() {
                continue;
            }
            let label = format!("chunk {:?} {:?}", position, layer);
            match backend.upload_vertices(&label, vertices) {
                Ok(buffer) => uploaded[layer.index()] = Some(buffer),
                Err(error) => {
                    log::error!("Mesh upload for chunk {:?} failed: {}", position, error);
                    for buffer in uploaded.into_iter().flatten() {
                        backend.release(buffer);
                    }
                    self.chunk.get_mut().set_ready_for_meshing(true);
                    return Err(error);
                }
            }
        }

        let previous = std::mem::replace(&mut self.buffers, uploaded);
        self.vertex_counts = mesh.vertex_counts();
        for buffer in previous.into_iter().flatten() {
            backend.release(buffer);
        }
        Ok(())
    }

    /// Gives up on a build that produced no mesh and re-arms meshing.
    pub fn abandon_mesh(&mut self) {
        self.mesh_in_flight = false;
        self.chunk.get_mut().set_ready_for_meshing(true);
    }

    /// Releases every vertex buffer. Calling it again releases nothing.
    pub fn release_buffers(&mut self, backend: &mut B) {
        for buffer in self.buffers.iter_mut().filter_map(Option::take) {
            backend.release(buffer);
        }
        self.vertex_counts = [0; RenderLayer::COUNT];
    }

    /// Vertex buffer of the last completed build for `layer`, if it had any geometry.
    pub fn get_vertex_buffer(&self, layer: RenderLayer) -> Option<&B::Buffer> {
        self.buffers[layer.index()].as_ref()
    }

    /// Vertex count of the last completed build for `layer`. Zero before the first build.
    pub fn get_vertices_count(&self, layer: RenderLayer) -> u32 {
        self.vertex_counts[layer.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::buffer_state::HeadlessBufferState;
    use crate::engine_state::task_management::task::Task;
    use crate::engine_state::voxels::block::registry::BlockRegistry;
    use crate::engine_state::voxels::block::{BlockDefinition, BlockId, TilesDef};
    use crate::error::EngineError;

    fn setup() -> (Arc<BlockTypeTable>, BlockId) {
        let mut registry = BlockRegistry::new();
        let stone = registry
            .register_block(BlockDefinition::solid("default:stone", "Stone", TilesDef::uniform(1)))
            .unwrap();
        (registry.types(), stone)
    }

    fn build(
        renderable: &mut RenderableChunk<HeadlessBufferState>,
        types: &Arc<BlockTypeTable>,
    ) -> Option<ChunkMesh> {
        let task = renderable.process(Vec::new(), types.clone())?;
        task.process().mesh.ok()
    }

    #[test]
    fn stale_geometry_draws_nothing() {
        let renderable = RenderableChunk::<HeadlessBufferState>::new(Chunk::new(Point3::new(0, 0, 0), 0), 1);
        for layer in RenderLayer::all() {
            assert!(renderable.get_vertex_buffer(layer).is_none());
            assert_eq!(renderable.get_vertices_count(layer), 0);
        }
        assert!(!renderable.has_been_drawn());
    }

    #[test]
    fn process_consumes_readiness_once() {
        let (types, stone) = setup();
        let mut chunk = Chunk::new(Point3::new(0, 0, 0), 0);
        chunk.set_block(Point3::new(1, 1, 1), stone).unwrap();
        let mut renderable = RenderableChunk::<HeadlessBufferState>::new(chunk, 1);
        let mut backend = HeadlessBufferState::new();

        let mesh = build(&mut renderable, &types).unwrap();
        assert!(renderable.is_mesh_in_flight());
        assert!(renderable.process(Vec::new(), types.clone()).is_none());

        renderable.apply_mesh(&mesh, &mut backend).unwrap();
        assert_eq!(renderable.get_vertices_count(RenderLayer::Solid), 36);
        assert!(renderable.get_vertex_buffer(RenderLayer::Solid).is_some());
        assert!(renderable.get_vertex_buffer(RenderLayer::Liquid).is_none());
        assert!(build(&mut renderable, &types).is_none());
    }

    #[test]
    fn too_far_chunks_keep_their_request() {
        let (types, _) = setup();
        let mut renderable = RenderableChunk::<HeadlessBufferState>::new(Chunk::new(Point3::new(0, 0, 0), 0), 1);
        renderable.chunk().get_mut().set_too_far(true);
        assert!(build(&mut renderable, &types).is_none());
        assert!(renderable.chunk().get().is_ready_for_meshing());

        renderable.chunk().get_mut().set_too_far(false);
        assert!(build(&mut renderable, &types).is_some());
    }

    #[test]
    fn rebuild_on_unchanged_content_is_identical() {
        let (types, stone) = setup();
        let mut chunk = Chunk::new(Point3::new(0, 0, 0), 0);
        chunk.set_block(Point3::new(3, 3, 3), stone).unwrap();
        chunk.set_block(Point3::new(3, 4, 3), stone).unwrap();
        let mut renderable = RenderableChunk::new(chunk, 1);
        let mut backend = HeadlessBufferState::new();

        let first = build(&mut renderable, &types).unwrap();
        renderable.apply_mesh(&first, &mut backend).unwrap();
        let counts: Vec<_> = RenderLayer::all().map(|l| renderable.get_vertices_count(l)).to_vec();

        renderable.update(ChunkUpdate::NeighbourChanged(BlockSide::TOP));
        let second = build(&mut renderable, &types).unwrap();
        renderable.apply_mesh(&second, &mut backend).unwrap();

        assert_eq!(first, second);
        assert_eq!(counts, RenderLayer::all().map(|l| renderable.get_vertices_count(l)).to_vec());
        assert_eq!(backend.live_buffers(), 1);
        assert_eq!(backend.releases(), 1);
    }

    #[test]
    fn failed_upload_keeps_previous_geometry() {
        let (types, stone) = setup();
        let mut chunk = Chunk::new(Point3::new(0, 0, 0), 0);
        chunk.set_block(Point3::new(0, 0, 0), stone).unwrap();
        let mut renderable = RenderableChunk::new(chunk, 1);
        let mut backend = HeadlessBufferState::new();

        let mesh = build(&mut renderable, &types).unwrap();
        renderable.apply_mesh(&mesh, &mut backend).unwrap();
        let first_id = renderable.get_vertex_buffer(RenderLayer::Solid).unwrap().id();

        renderable.chunk().get_mut().set_block(Point3::new(1, 0, 0), stone).unwrap();
        let mesh = build(&mut renderable, &types).unwrap();
        backend.fail_next_uploads(1);
        assert!(matches!(
            renderable.apply_mesh(&mesh, &mut backend),
            Err(EngineError::BufferUpload { .. })
        ));

        assert_eq!(renderable.get_vertex_buffer(RenderLayer::Solid).unwrap().id(), first_id);
        assert_eq!(renderable.get_vertices_count(RenderLayer::Solid), 36);
        assert!(renderable.chunk().get().is_ready_for_meshing());
        assert!(!renderable.is_mesh_in_flight());
    }

    #[test]
    fn release_is_idempotent() {
        let (types, stone) = setup();
        let mut chunk = Chunk::new(Point3::new(0, 0, 0), 0);
        chunk.set_block(Point3::new(0, 0, 0), stone).unwrap();
        let mut renderable = RenderableChunk::new(chunk, 1);
        let mut backend = HeadlessBufferState::new();
        let mesh = build(&mut renderable, &types).unwrap();
        renderable.apply_mesh(&mesh, &mut backend).unwrap();

        renderable.release_buffers(&mut backend);
        renderable.release_buffers(&mut backend);
        assert_eq!(backend.releases(), 1);
        assert_eq!(backend.live_buffers(), 0);
        assert_eq!(renderable.get_vertices_count(RenderLayer::Solid), 0);
    }

    #[test]
    fn received_content_counts_and_rearms() {
        let mut renderable =
            RenderableChunk::<HeadlessBufferState>::new(Chunk::new(Point3::new(2, 0, 0), 0), 1);
        renderable.chunk().get_mut().take_ready_for_meshing();
        renderable.chunk().get_mut().set_too_far(true);

        renderable.update(ChunkUpdate::ContentReceived(Chunk::new(Point3::new(2, 0, 0), 0)));
        assert_eq!(renderable.debug_times_received(), 2);
        assert!(renderable.chunk().get().is_ready_for_meshing());
        assert!(renderable.is_too_far());
    }
}
