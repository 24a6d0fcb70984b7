//! Mesh generation for voxel rendering.
//!
//! This module converts a chunk's block ids into per-layer vertex lists. Faces are culled
//! against the neighbouring cell: a face is emitted only when the cell across it is air, not
//! opaque, or a different see-through block. Cells across the chunk boundary are read from
//! [`NeighbourLayers`], a copy of the facing layer of each loaded neighbour; a missing neighbour
//! counts as air.
//!
//! # Architecture
//! - `build_chunk_mesh`: the mesher
//! - `ChunkMesh`: its output, one vertex list per [`RenderLayer`]
//! - `NeighbourLayers`: boundary cells captured from neighbouring chunks
//! - `face`: quad geometry for a single voxel face

use crate::engine_state::voxels::{
    block::{block_side::BlockSide, BlockId, BlockTypeTable, RenderLayer},
    chunk::{local_position_of, Chunk, CHUNK_DIMENSION, CHUNK_PLANE_SIZE},
};
use cgmath::Point3;

mod face;

pub use face::Face;

use super::Vertex;

/// Geometry of one chunk, split by render layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkMesh {
    layers: [Vec<Vertex>; RenderLayer::COUNT],
}

impl ChunkMesh {
    pub fn vertices(&self, layer: RenderLayer) -> &[Vertex] {
        &self.layers[layer.index()]
    }

    pub fn vertex_count(&self, layer: RenderLayer) -> u32 {
        self.layers[layer.index()].len() as u32
    }

    /// Vertex counts of every layer, in [`RenderLayer::all`] order.
    pub fn vertex_counts(&self) -> [u32; RenderLayer::COUNT] {
        RenderLayer::all().map(|layer| self.vertex_count(layer))
    }

    pub fn total_vertices(&self) -> usize {
        self.layers.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.iter().all(Vec::is_empty)
    }

    fn push_face(&mut self, layer: RenderLayer, face: Face) {
        self.layers[layer.index()].extend_from_slice(&face.vertices());
    }
}

/// Index of a boundary cell inside a captured layer. Only the two coordinates parallel to the
/// face are used, so the same index addresses both sides of a chunk boundary.
fn layer_index(side: BlockSide, local: Point3<i32>) -> usize {
    let (a, b) = match side {
        BlockSide::FRONT | BlockSide::BACK => (local.y, local.z),
        BlockSide::BOTTOM | BlockSide::TOP => (local.x, local.z),
        BlockSide::LEFT | BlockSide::RIGHT => (local.x, local.y),
    };
    (a + CHUNK_DIMENSION * b) as usize
}

/// Cell on the `face` layer of a chunk with in-plane coordinates `a`, `b`.
fn face_cell(face: BlockSide, a: i32, b: i32) -> Point3<i32> {
    let last = CHUNK_DIMENSION - 1;
    match face {
        BlockSide::FRONT => Point3::new(0, a, b),
        BlockSide::BACK => Point3::new(last, a, b),
        BlockSide::BOTTOM => Point3::new(a, 0, b),
        BlockSide::TOP => Point3::new(a, last, b),
        BlockSide::LEFT => Point3::new(a, b, 0),
        BlockSide::RIGHT => Point3::new(a, b, last),
    }
}

fn cell_index(local: Point3<i32>) -> usize {
    (local.x + CHUNK_DIMENSION * local.y + CHUNK_PLANE_SIZE * local.z) as usize
}

/// Copies of the cells bordering a chunk, one layer per face.
#[derive(Debug, Clone, Default)]
pub struct NeighbourLayers {
    layers: [Option<Vec<BlockId>>; 6],
}

impl NeighbourLayers {
    /// Records the layer of `neighbour` that touches the chunk across `side`.
    pub fn capture(&mut self, side: BlockSide, neighbour: &Chunk) {
        let touching_face = side.opposite();
        let cells = neighbour.cells();
        let mut layer = vec![BlockId::AIR; CHUNK_PLANE_SIZE as usize];
        for a in 0..CHUNK_DIMENSION {
            for b in 0..CHUNK_DIMENSION {
                let local = face_cell(touching_face, a, b);
                layer[layer_index(touching_face, local)] = cells[cell_index(local)];
            }
        }
        self.layers[side as usize] = Some(layer);
    }

    pub fn has(&self, side: BlockSide) -> bool {
        self.layers[side as usize].is_some()
    }

    /// Block across `side` from a boundary cell, given the cell position wrapped into the
    /// neighbour. Missing neighbours read as air.
    fn get(&self, side: BlockSide, wrapped: Point3<i32>) -> BlockId {
        self.layers[side as usize]
            .as_ref()
            .map_or(BlockId::AIR, |layer| layer[layer_index(side, wrapped)])
    }
}

fn face_visible(types: &BlockTypeTable, block: BlockId, across: BlockId) -> bool {
    if across.is_air() {
        return true;
    }
    !types.is_opaque(across) && across != block
}

/// Builds the mesh of `chunk`. Deterministic for a given chunk content, neighbour layers and
/// type table.
pub fn build_chunk_mesh(
    chunk: &Chunk,
    neighbours: &NeighbourLayers,
    types: &BlockTypeTable,
) -> ChunkMesh {
    let mut mesh = ChunkMesh::default();
    let cells = chunk.cells();

    for (local, block) in chunk.blocks() {
        let Some(block_type) = types.get(block) else {
            log::warn!("Skipping unregistered block {:?} in chunk {:?}", block, chunk.position);
            continue;
        };

        for side in BlockSide::all() {
            let across_position = local + side.offset();
            let across = if Chunk::contains(across_position) {
                cells[cell_index(across_position)]
            } else {
                neighbours.get(side, local_position_of(across_position))
            };

            if face_visible(types, block, across) {
                let face = Face::new(local, block_type.tiles().texture_for(side), side);
                mesh.push_face(block_type.render_layer(), face);
            }
        }
    }

    mesh
}
