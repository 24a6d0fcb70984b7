//! # Chunk Iteration Module
//!
//! This module provides an iterator over all non-air blocks in a chunk.
//!
//! The `ChunkBlockIterator` walks the chunk's `solid_array` bit vector, jumping straight to the
//! next set bit, so air cells cost nothing beyond the bit scan. Positions are yielded in storage
//! order (x fastest, then y, then z).

use bitvec::slice::IterOnes;
use bitvec::order::Lsb0;
use cgmath::Point3;

use crate::engine_state::voxels::block::BlockId;

use super::Chunk;

/// An iterator over all non-air blocks in a chunk.
pub struct ChunkBlockIterator<'a> {
    /// Reference to the chunk being iterated over
    chunk_ref: &'a Chunk,
    /// Indices of the set bits in the solid array
    solid_indices: IterOnes<'a, usize, Lsb0>,
}

impl<'a> ChunkBlockIterator<'a> {
    /// Creates a new `ChunkBlockIterator` positioned before the first non-air block.
    pub fn new(chunk_ref: &'a Chunk) -> Self {
        ChunkBlockIterator {
            chunk_ref,
            solid_indices: chunk_ref.solid_array().iter_ones(),
        }
    }
}

impl Iterator for ChunkBlockIterator<'_> {
    type Item = (Point3<i32>, BlockId);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.solid_indices.next()?;
        Some((Chunk::position_of_index(index), self.chunk_ref.cells()[index]))
    }
}
