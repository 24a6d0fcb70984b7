//! # Chunk Generation Task
//!
//! This module defines the `ChunkGenerationTask` which fills a new chunk off the simulation
//! thread. The generated chunk is not initialized; the owner loads it into the world, which
//! declares its content complete.
//!
//! Generation is deterministic for a given method, seed, palette and chunk position.

use std::sync::Arc;

use cgmath::Point3;
use noise::{NoiseFn, Perlin};
use serde::Deserialize;

use crate::engine_state::task_management::task::Task;
use crate::engine_state::voxels::block::BlockId;
use crate::engine_state::voxels::chunk::{Chunk, DimensionId, CHUNK_DIMENSION};

/// Threshold above which Perlin noise is considered solid for terrain generation.
pub const PERLIN_POSITIVE_THRESHOLD: f64 = 0.2;
/// Threshold below which Perlin noise is considered solid as well.
pub const PERLIN_NEGATIVE_THRESHOLD: f64 = -0.2;
/// Scaling factor applied to world coordinates when sampling Perlin noise.
pub const PERLIN_SCALE_FACTOR: f64 = 0.02;
/// Share of cells left empty by [`GenerationMethod::Random`].
pub const RANDOM_SPARSENESS: f64 = 0.9;

/// The method used to fill new chunks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMethod {
    /// 3D Perlin noise with caves and overhangs
    #[default]
    Perlin,
    /// Sparse random blocks
    Random,
    /// Alternating solid and air cells
    Checkerboard,
    /// Every cell solid
    Solid,
    /// Every cell air
    Empty,
}

/// A task that generates the content of one chunk.
pub struct ChunkGenerationTask {
    position: Point3<i32>,
    dimension: DimensionId,
    method: GenerationMethod,
    seed: u32,
    /// Block types solid cells are drawn from
    palette: Arc<[BlockId]>,
}

impl ChunkGenerationTask {
    pub fn new(
        position: Point3<i32>,
        dimension: DimensionId,
        method: GenerationMethod,
        seed: u32,
        palette: Arc<[BlockId]>,
    ) -> Self {
        ChunkGenerationTask {
            position,
            dimension,
            method,
            seed,
            palette,
        }
    }

    fn rng(&self) -> fastrand::Rng {
        let position = self.position;
        let mixed = (self.seed as u64)
            ^ (position.x as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
            ^ (position.y as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
            ^ (position.z as u64).wrapping_mul(0x1656_67B1_9E37_79F9);
        fastrand::Rng::with_seed(mixed)
    }

    /// Whether the cell at a world block position is solid.
    fn is_solid(&self, perlin: &Perlin, rng: &mut fastrand::Rng, world: Point3<i32>) -> bool {
        match self.method {
            GenerationMethod::Perlin => {
                let sample = perlin.get(to_perlin_pos(world, PERLIN_SCALE_FACTOR));
                !(PERLIN_NEGATIVE_THRESHOLD..=PERLIN_POSITIVE_THRESHOLD).contains(&sample)
            }
            GenerationMethod::Random => rng.f64() >= RANDOM_SPARSENESS,
            GenerationMethod::Checkerboard => (world.x + world.y + world.z).rem_euclid(2) == 0,
            GenerationMethod::Solid => true,
            GenerationMethod::Empty => false,
        }
    }
}

/// Converts world block coordinates to Perlin sample coordinates.
fn to_perlin_pos(pos: Point3<i32>, scale_factor: f64) -> [f64; 3] {
    [
        pos.x as f64 * scale_factor,
        pos.y as f64 * scale_factor,
        pos.z as f64 * scale_factor,
    ]
}

/// Output of a [`ChunkGenerationTask`].
#[derive(Debug)]
pub struct ChunkGenerationResult {
    pub position: Point3<i32>,
    /// The generated chunk, or the message of the panic that aborted generation.
    pub chunk: Result<Chunk, String>,
}

impl Task for ChunkGenerationTask {
    type Output = ChunkGenerationResult;

    fn process(&self) -> ChunkGenerationResult {
        let mut chunk = Chunk::new(self.position, self.dimension);
        if self.palette.is_empty() {
            return ChunkGenerationResult {
                position: self.position,
                chunk: Ok(chunk),
            };
        }

        let perlin = Perlin::new(self.seed);
        let mut rng = self.rng();
        for k in 0..CHUNK_DIMENSION {
            for j in 0..CHUNK_DIMENSION {
                for i in 0..CHUNK_DIMENSION {
                    let local = Point3::new(i, j, k);
                    if !self.is_solid(&perlin, &mut rng, chunk.world_position(local)) {
                        continue;
                    }
                    let block = self.palette[rng.usize(..self.palette.len())];
                    // Loop bounds keep `local` inside the chunk.
                    let _ = chunk.set_block(local, block);
                }
            }
        }

        ChunkGenerationResult {
            position: self.position,
            chunk: Ok(chunk),
        }
    }

    fn recover(&self, panic_message: String) -> ChunkGenerationResult {
        ChunkGenerationResult {
            position: self.position,
            chunk: Err(panic_message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::chunk::CHUNK_SIZE;

    fn palette() -> Arc<[BlockId]> {
        Arc::from(vec![BlockId(1), BlockId(2)])
    }

    fn generate(method: GenerationMethod, position: Point3<i32>) -> Chunk {
        ChunkGenerationTask::new(position, 0, method, 7, palette())
            .process()
            .chunk
            .unwrap()
    }

    #[test]
    fn simple_methods_fill_as_named() {
        let origin = Point3::new(0, 0, 0);
        assert_eq!(generate(GenerationMethod::Solid, origin).solid_count(), CHUNK_SIZE as usize);
        assert!(generate(GenerationMethod::Empty, origin).is_empty());
        assert_eq!(
            generate(GenerationMethod::Checkerboard, origin).solid_count(),
            CHUNK_SIZE as usize / 2
        );
    }

    #[test]
    fn generation_is_deterministic_and_uninitialized() {
        let position = Point3::new(3, -1, 2);
        for method in [GenerationMethod::Perlin, GenerationMethod::Random] {
            let first = generate(method, position);
            let second = generate(method, position);
            assert_eq!(first.cells(), second.cells());
            assert!(!first.is_initialized());
            assert!(!first.is_ready_for_meshing());
        }
    }

    #[test]
    fn solid_cells_come_from_the_palette() {
        let chunk = generate(GenerationMethod::Random, Point3::new(0, 0, 0));
        assert!(chunk
            .blocks()
            .all(|(_, block)| block == BlockId(1) || block == BlockId(2)));
    }

    #[test]
    fn empty_palette_generates_air() {
        let task = ChunkGenerationTask::new(
            Point3::new(0, 0, 0),
            0,
            GenerationMethod::Solid,
            0,
            Arc::from(Vec::new()),
        );
        assert!(task.process().chunk.unwrap().is_empty());
    }
}
