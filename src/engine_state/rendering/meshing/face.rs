use cgmath::Point3;

use crate::engine_state::rendering::Vertex;
use crate::engine_state::voxels::block::block_side::BlockSide;

/// A single quad face of a voxel.
///
/// A face is defined by four corner points (lower-left, lower-right, upper-right, upper-left) in
/// chunk coordinates, wound so the quad faces away from the block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Face {
    pub ll: Point3<i32>,
    pub lr: Point3<i32>,
    pub ul: Point3<i32>,
    pub ur: Point3<i32>,
    pub texture_index: u32,
    pub side: BlockSide,
}

impl Face {
    /// Creates the face on `side` of the voxel at chunk-local position `local`.
    pub fn new(local: Point3<i32>, texture_index: u32, side: BlockSide) -> Self {
        let (i, j, k) = (local.x, local.y, local.z);
        let (ll, lr, ul, ur) = match side {
            BlockSide::FRONT => (
                Point3::new(i, j, k),
                Point3::new(i, j, k + 1),
                Point3::new(i, j + 1, k),
                Point3::new(i, j + 1, k + 1),
            ),
            BlockSide::BACK => (
                Point3::new(i + 1, j, k + 1),
                Point3::new(i + 1, j, k),
                Point3::new(i + 1, j + 1, k + 1),
                Point3::new(i + 1, j + 1, k),
            ),
            BlockSide::BOTTOM => (
                Point3::new(i, j, k + 1),
                Point3::new(i, j, k),
                Point3::new(i + 1, j, k + 1),
                Point3::new(i + 1, j, k),
            ),
            BlockSide::TOP => (
                Point3::new(i, j + 1, k),
                Point3::new(i, j + 1, k + 1),
                Point3::new(i + 1, j + 1, k),
                Point3::new(i + 1, j + 1, k + 1),
            ),
            BlockSide::LEFT => (
                Point3::new(i + 1, j, k),
                Point3::new(i, j, k),
                Point3::new(i + 1, j + 1, k),
                Point3::new(i, j + 1, k),
            ),
            BlockSide::RIGHT => (
                Point3::new(i, j, k + 1),
                Point3::new(i + 1, j, k + 1),
                Point3::new(i, j + 1, k + 1),
                Point3::new(i + 1, j + 1, k + 1),
            ),
        };
        Face {
            ll,
            lr,
            ul,
            ur,
            texture_index,
            side,
        }
    }

    /// The two triangles of the quad, as a non-indexed vertex list.
    pub fn vertices(&self) -> [Vertex; 6] {
        let vertex = |pos, u, v| Vertex::new(pos, self.texture_index, u, v, self.side);
        let ll = vertex(self.ll, 0.0, 1.0);
        let lr = vertex(self.lr, 1.0, 1.0);
        let ul = vertex(self.ul, 0.0, 0.0);
        let ur = vertex(self.ur, 1.0, 0.0);
        [ll, lr, ur, ll, ur, ul]
    }
}
