//! Client-side chunk rendering state.
//!
//! This module turns chunk content into GPU geometry and keeps that geometry in step with the
//! content. It holds no pipeline or surface; the external renderer receives one
//! [`client_world::ChunkDrawCall`] per non-empty layer and binds the buffers itself.
//!
//! # Architecture
//! - `client_world`: the client's chunk collection and its per-frame meshing and draw passes
//! - `renderable_chunk`: one chunk's buffers and mesh lifecycle
//! - `meshing`: the face-culling mesher
//! - `tasks`: background mesh builds
//! - `vertex`: the vertex layout shared with the shaders

pub mod client_world;
pub mod meshing;
pub mod renderable_chunk;
pub mod tasks;
mod vertex;

pub use client_world::{ChunkDrawCall, ClientWorld, MeshingMetrics};
pub use renderable_chunk::{ChunkUpdate, RenderableChunk};
pub use vertex::Vertex;
