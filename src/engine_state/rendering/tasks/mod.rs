//! Background tasks for the rendering system.
//!
//! - `ChunkMeshGenerationTask`: builds a chunk's per-layer geometry off the render thread

pub mod chunk_mesh_generation_task;
