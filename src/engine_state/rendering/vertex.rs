//! Vertex data structures and layouts for voxel rendering.
//!
//! This module defines the vertex format uploaded into each renderable chunk's per-layer vertex
//! buffers and the matching `wgpu` layout.

use cgmath::Point3;

use crate::engine_state::voxels::block::block_side::BlockSide;

/// A vertex in the voxel rendering pipeline.
///
/// Positions are chunk-local; the draw pass supplies the chunk origin separately.
///
/// # Memory Layout
/// - Position: 3x i32 (12 bytes)
/// - Texture Index: u32 (4 bytes)
/// - Texture Coordinates: [f32; 2] (8 bytes)
/// - Block Side: u32 (4 bytes)
///
/// Total size: 28 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    /// X coordinate in chunk space
    x: i32,
    /// Y coordinate in chunk space
    y: i32,
    /// Z coordinate in chunk space
    z: i32,
    /// Index of the texture in the texture array
    texture_index: u32,
    /// UV texture coordinates
    tex_coords: [f32; 2],
    /// Face the vertex belongs to, used for directional shading
    side: u32,
}

impl Vertex {
    /// Creates a new vertex.
    ///
    /// # Arguments
    /// * `pos` - The position of the vertex in chunk space
    /// * `texture_index` - Index of the texture in the texture array
    /// * `u`, `v` - Texture coordinates
    /// * `side` - The face this vertex belongs to
    pub fn new(pos: Point3<i32>, texture_index: u32, u: f32, v: f32, side: BlockSide) -> Self {
        Vertex {
            x: pos.x,
            y: pos.y,
            z: pos.z,
            texture_index,
            tex_coords: [u, v],
            side: side as u32,
        }
    }

    pub fn position(&self) -> Point3<i32> {
        Point3::new(self.x, self.y, self.z)
    }

    pub fn texture_index(&self) -> u32 {
        self.texture_index
    }

    /// Returns the vertex buffer layout description for the shader pipeline.
    ///
    /// # Shader Attributes
    /// - `location = 0..=2`: position (i32, i32, i32)
    /// - `location = 3`: texture_index (u32)
    /// - `location = 4`: tex_coords (vec2<f32>)
    /// - `location = 5`: side (u32)
    pub fn desc<'a>() -> wgpu::VertexBufferLayout<'a> {
        const ATTRIBUTES: [wgpu::VertexAttribute; 6] = wgpu::vertex_attr_array![
            0 => Sint32,
            1 => Sint32,
            2 => Sint32,
            3 => Uint32,
            4 => Float32x2,
            5 => Uint32,
        ];
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &ATTRIBUTES,
        }
    }
}
