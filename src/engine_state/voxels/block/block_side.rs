//! # Block Side Module
//!
//! This module defines the six faces of a voxel block, the order tile textures are listed in,
//! and the unit offset towards the neighbouring cell each face looks at.

use cgmath::Vector3;

/// Represents the six possible faces of a voxel block.
///
/// The discriminants index [`TilesDef`](super::TilesDef) texture arrays and are written into
/// vertices so shaders can pick a face normal.
///
/// The order is: [FRONT, BACK, BOTTOM, TOP, LEFT, RIGHT]
#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug)]
pub enum BlockSide {
    /// The face looking towards negative X
    FRONT = 0,

    /// The face looking towards positive X
    BACK = 1,

    /// The face looking towards negative Y
    BOTTOM = 2,

    /// The face looking towards positive Y
    TOP = 3,

    /// The face looking towards negative Z
    LEFT = 4,

    /// The face looking towards positive Z
    RIGHT = 5,
}

impl BlockSide {
    /// Returns an array containing all six block faces in a consistent order.
    ///
    /// The order is: [FRONT, BACK, BOTTOM, TOP, LEFT, RIGHT]
    pub fn all() -> [BlockSide; 6] {
        [
            BlockSide::FRONT,
            BlockSide::BACK,
            BlockSide::BOTTOM,
            BlockSide::TOP,
            BlockSide::LEFT,
            BlockSide::RIGHT,
        ]
    }

    /// Unit offset from a cell to the neighbour this face is shared with.
    pub fn offset(self) -> Vector3<i32> {
        match self {
            BlockSide::FRONT => Vector3::new(-1, 0, 0),
            BlockSide::BACK => Vector3::new(1, 0, 0),
            BlockSide::BOTTOM => Vector3::new(0, -1, 0),
            BlockSide::TOP => Vector3::new(0, 1, 0),
            BlockSide::LEFT => Vector3::new(0, 0, -1),
            BlockSide::RIGHT => Vector3::new(0, 0, 1),
        }
    }

    /// The face on the neighbouring cell that touches this one.
    pub fn opposite(self) -> BlockSide {
        match self {
            BlockSide::FRONT => BlockSide::BACK,
            BlockSide::BACK => BlockSide::FRONT,
            BlockSide::BOTTOM => BlockSide::TOP,
            BlockSide::TOP => BlockSide::BOTTOM,
            BlockSide::LEFT => BlockSide::RIGHT,
            BlockSide::RIGHT => BlockSide::LEFT,
        }
    }
}
