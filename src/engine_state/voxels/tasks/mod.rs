//! # Voxel Task System
//!
//! Tasks related to voxel world generation. They run on a
//! [`TaskManager`](crate::engine_state::task_management::TaskManager) so generation does not
//! stall the tick.

pub mod chunk_generation_task;
