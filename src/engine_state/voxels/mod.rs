//! # Voxel Engine Core
//!
//! Representation of the voxel world shared by the simulation and rendering halves.
//!
//! ## Architecture
//!
//! * **Block**: immutable block types, their faces, and the late-bound behaviour attached to them
//! * **Chunk**: fixed-size 3D arrays of block ids plus the flags driving meshing and ticking
//! * **World**: the sparse map of loaded chunks with world-space reads and writes
//! * **WorldEditor**: the journaled view of the world handed to behaviour handlers
//! * **Tasks**: background chunk generation
//!
//! ## Data Flow
//!
//! 1. The world receives a request for block access or modification
//! 2. It resolves the containing chunk and writes through it
//! 3. The write re-arms meshing for that chunk and any neighbour sharing the edited face
//! 4. The client picks up re-armed chunks on its next meshing pass

pub mod block;
pub mod chunk;
pub mod tasks;
pub mod world;
pub mod world_editor;
