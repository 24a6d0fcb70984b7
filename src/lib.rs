#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::invalid_rust_codeblocks)]

//! # Voxel Runtime
//!
//! The runtime core of a voxel game: chunk storage with meshing readiness tracking, client-side
//! chunk geometry built on WGPU buffers, and a registry through which block types bind tick,
//! activation and placement behaviour without the engine knowing about any particular block.
//!
//! ## Key Modules
//!
//! * `config` - Tuning knobs, loadable from JSON
//! * `core` - Shared resource handles and small utilities
//! * `engine_state` - The simulation facade, voxels, rendering state and task management
//! * `error` - The engine error type
//!
//! ## Architecture
//!
//! The crate keeps a clear split between:
//! * The simulation side (`EngineState`), which owns the world, runs ticks and routes activation
//!   and placement events into block behaviour
//! * The client side (`ClientWorld`), which receives chunk content, builds meshes on worker
//!   threads and keeps one vertex buffer per render layer and chunk
//!
//! Both sides share the `Chunk` type and its meshing flags.
//!
//! ## Usage
//!
//! ```rust
//! use cgmath::Point3;
//! use voxel_runtime::config::EngineConfig;
//! use voxel_runtime::engine_state::buffer_state::HeadlessBufferState;
//! use voxel_runtime::engine_state::rendering::ClientWorld;
//! use voxel_runtime::engine_state::voxels::chunk::Chunk;
//! use voxel_runtime::engine_state::EngineState;
//!
//! voxel_runtime::init_logger();
//!
//! let config = EngineConfig { mesh_workers: 0, ..EngineConfig::default() };
//! let mut engine_state = EngineState::new(config.clone(), 0);
//! engine_state.load_chunk(Chunk::new(Point3::new(0, 0, 0), 0));
//!
//! let mut client_world = ClientWorld::new(
//!     HeadlessBufferState::new(),
//!     engine_state.registry().types(),
//!     &config,
//!     0,
//! );
//! client_world.receive_chunk(Chunk::new(Point3::new(0, 0, 0), 0));
//! client_world.process_meshing();
//! ```

pub mod config;
pub mod core;
pub mod engine_state;
pub mod error;

/// Initializes `env_logger` on stdout, filtered by `RUST_LOG`. Later calls do nothing.
pub fn init_logger() {
    let mut log_builder = env_logger::Builder::new();
    if log_builder
        .target(env_logger::Target::Stdout)
        .parse_env("RUST_LOG")
        .try_init()
        .is_ok()
    {
        log::info!("Logger initialized");
    }
}
