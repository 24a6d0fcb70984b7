//! # Error Module
//!
//! Error types shared by the simulation and rendering halves of the runtime.
//!
//! Behaviour handlers have their own error type (see
//! [`BehaviorError`](crate::engine_state::voxels::block::behavior::BehaviorError)); everything the
//! engine itself can fail on is an [`EngineError`].

use cgmath::Point3;
use thiserror::Error;

use crate::engine_state::voxels::block::BlockId;

/// Result alias used across the crate.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised by chunk, world, registry and buffer operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A chunk-local position outside `0..CHUNK_DIMENSION` on some axis.
    #[error("position {0:?} is outside the chunk bounds")]
    PositionOutOfBounds(Point3<i32>),

    /// No chunk is loaded at the given chunk coordinates.
    #[error("no chunk loaded at chunk position {0:?}")]
    ChunkNotLoaded(Point3<i32>),

    /// The chunk is exclusively held elsewhere, typically because a handler tried to reach the
    /// chunk it is being dispatched from through the world instead of its own editor.
    #[error("chunk at {0:?} is locked by an in-progress operation")]
    ChunkLocked(Point3<i32>),

    /// The block id has never been registered.
    #[error("unknown block id {0:?}")]
    UnknownBlock(BlockId),

    /// No block type is registered under this name.
    #[error("unknown block name '{0}'")]
    UnknownBlockName(String),

    /// A block type with the same internal name already exists.
    #[error("block name '{0}' is already registered")]
    DuplicateBlockName(String),

    /// The id space for block types is exhausted.
    #[error("block registry is full")]
    RegistryFull,

    /// No player with this id is connected.
    #[error("unknown player {0}")]
    UnknownPlayer(u16),

    /// The render backend could not create a vertex buffer.
    #[error("failed to upload vertex buffer '{label}': {reason}")]
    BufferUpload {
        /// Label of the buffer being created
        label: String,
        /// Backend-provided reason
        reason: String,
    },

    /// Reading a configuration file failed.
    #[error("config I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),

    /// A configuration document could not be parsed.
    #[error("config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),
}
