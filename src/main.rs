//! # Voxel Runtime Demo
//!
//! Headless walk through the runtime: registers a handful of block types, two of them with
//! behaviour, generates a small world on worker threads, runs the tick, activates a chest, then
//! meshes and draws everything through the headless buffer backend.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=info VOXEL_CONFIG=config.json cargo run --release
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cgmath::Point3;

use voxel_runtime::config::EngineConfig;
use voxel_runtime::engine_state::buffer_state::{HeadlessBufferState, VertexBufferBackend};
use voxel_runtime::engine_state::context::{Player, RecordingClient, RecordingServer};
use voxel_runtime::engine_state::rendering::ClientWorld;
use voxel_runtime::engine_state::task_management::TaskManager;
use voxel_runtime::engine_state::voxels::block::behavior::{ActivatedHandler, TickHandler};
use voxel_runtime::engine_state::voxels::block::{BlockDefinition, BlockId, RenderLayer, TilesDef};
use voxel_runtime::engine_state::voxels::tasks::chunk_generation_task::ChunkGenerationTask;
use voxel_runtime::engine_state::EngineState;
use voxel_runtime::error::EngineResult;

/// Radius, in chunks, of the generated world around the origin.
const WORLD_RADIUS: i32 = 2;
/// Number of ticks simulated by the demo.
const DEMO_TICKS: u32 = 40;

fn load_config() -> EngineResult<EngineConfig> {
    match std::env::var("VOXEL_CONFIG") {
        Ok(path) => EngineConfig::load(path),
        Err(_) => {
            log::info!("VOXEL_CONFIG not set, using default config");
            Ok(EngineConfig::default())
        }
    }
}

fn register_content(engine_state: &mut EngineState) -> EngineResult<(Vec<BlockId>, BlockId, BlockId)> {
    let registry = engine_state.registry_mut();
    let stone = registry.register_block(BlockDefinition::solid(
        "default:stone",
        "Stone",
        TilesDef::uniform(1),
    ))?;
    let dirt = registry.register_block(BlockDefinition::solid(
        "default:dirt",
        "Dirt",
        TilesDef::uniform(2),
    ))?;
    let grass = registry.register_block(BlockDefinition::solid(
        "default:grass",
        "Grass",
        TilesDef::top_bottom_sides(3, 2, 4),
    ))?;
    let torch = registry.register_block(
        BlockDefinition::solid("default:torch", "Torch", TilesDef::uniform(5))
            .with_layer(RenderLayer::Flora),
    )?;
    let chest = registry.register_block(BlockDefinition::solid(
        "default:chest",
        "Chest",
        TilesDef::top_bottom_sides(6, 6, 7),
    ))?;

    let flickers = Arc::new(AtomicU64::new(0));
    registry.update_binding(torch, |binding| {
        binding.set_on_tick(TickHandler::new(move |context| {
            if flickers.fetch_add(1, Ordering::Relaxed) % 20 == 0 {
                context.server.send_block_update(context.position, context.block);
            }
            Ok(())
        }))
    })?;
    registry.update_binding(chest, |binding| {
        binding.set_on_block_activated(ActivatedHandler::new(|context| {
            context
                .client
                .show_message(&format!("{} opened a chest", context.player.name));
            Ok(true)
        }))
    })?;

    Ok((vec![stone, dirt, grass], torch, chest))
}

fn generate_world(engine_state: &mut EngineState, palette: Vec<BlockId>) {
    let config = engine_state.config().clone();
    let palette: Arc<[BlockId]> = Arc::from(palette);
    let mut task_manager = TaskManager::new(config.mesh_workers);
    for x in -WORLD_RADIUS..=WORLD_RADIUS {
        for y in -1..=0 {
            for z in -WORLD_RADIUS..=WORLD_RADIUS {
                task_manager.publish_task(ChunkGenerationTask::new(
                    Point3::new(x, y, z),
                    engine_state.world().dimension(),
                    config.generation,
                    config.world_seed,
                    palette.clone(),
                ));
            }
        }
    }

    for result in task_manager.wait_all() {
        match result.chunk {
            Ok(chunk) => {
                engine_state.load_chunk(chunk);
            }
            Err(message) => log::error!("Generating chunk {:?} failed: {}", result.position, message),
        }
    }
    log::info!("Generated {} chunks", engine_state.world().len());
}

fn run() -> EngineResult<()> {
    let config = load_config()?;
    let mut engine_state = EngineState::new(config.clone(), 0);
    let (palette, torch, chest) = register_content(&mut engine_state)?;

    engine_state.add_player(Player::new(1, "steve", Point3::new(8.5, 2.0, 8.5)));
    generate_world(&mut engine_state, palette);
    engine_state.update_simulation_distance();

    let torch_position = Point3::new(4, 1, 4);
    let chest_position = Point3::new(6, 1, 4);
    engine_state.place_block(torch_position, torch)?;
    engine_state.place_block(chest_position, chest)?;

    let mut server = RecordingServer::default();
    let ticks = engine_state.update(config.tick_interval() * DEMO_TICKS, &mut server);
    let tick_metrics = engine_state.tick_metrics();
    log::info!(
        "Ran {} ticks: {} handler call(s), {} fault(s), {} block update(s) sent, last tick {:?}",
        ticks,
        tick_metrics.handler_invocations,
        tick_metrics.handler_faults,
        server.block_updates.len(),
        tick_metrics.last_tick_duration
    );

    let mut client = RecordingClient::default();
    engine_state.activate_block(1, chest_position, &mut client)?;
    engine_state.activate_block(1, torch_position, &mut client)?;
    for message in &client.messages {
        log::info!("[client] {}", message);
    }
    log::info!("Default interfaces opened: {}", client.opened_interfaces.len());

    let mut client_world = ClientWorld::new(
        HeadlessBufferState::new(),
        engine_state.registry().types(),
        &config,
        engine_state.world().dimension(),
    );
    for (_, chunk) in engine_state.world().chunks() {
        client_world.receive_chunk(chunk.get().clone());
    }
    let viewer_chunk = engine_state
        .players()
        .get(&1)
        .map(Player::chunk_position)
        .unwrap_or(Point3::new(0, 0, 0));
    client_world.update_culling(viewer_chunk);

    while client_world.schedule_mesh_builds() > 0 {
        client_world.finish_mesh_builds();
    }

    let mut vertices = 0;
    let draw_calls = client_world.draw(|call| vertices += call.vertex_count as u64);
    let metrics = client_world.metrics();
    log::info!(
        "Meshed {} chunk(s) ({} discarded, {} failed); {} draw call(s), {} vertices, {} bytes of geometry",
        metrics.total_updates,
        metrics.discarded_builds,
        metrics.failed_builds,
        draw_calls,
        vertices,
        client_world.backend().allocated_memory()
    );
    Ok(())
}

fn main() {
    voxel_runtime::init_logger();
    if let Err(error) = run() {
        log::error!("{}", error);
        std::process::exit(1);
    }
}
