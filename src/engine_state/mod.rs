//! # Engine State Module
//!
//! The simulation side of the engine: the loaded world, the block registry, the connected players
//! and the tick scheduler, together with the operations that route gameplay events into block
//! behaviour.
//!
//! ## Key Components
//!
//! * `EngineState` - The simulation facade
//! * `buffer_state` - Vertex buffer backends for chunk geometry
//! * `context` - Players and the server/client services handed to behaviour handlers
//! * `rendering` - Client-side chunk meshing and drawing
//! * `simulation` - The fixed-rate tick
//! * `task_management` - Worker threads for background work
//! * `voxels` - Blocks, chunks and the world
//!
//! ## Event ordering
//!
//! A placement commits the cell write, runs the placed handler, and only then re-arms meshing for
//! the chunk and any neighbour sharing the cell's faces. An activation runs the engine's default
//! path whenever the block's handler is missing, declines the interaction or faults.

use cgmath::Point3;
use web_time::Duration;

use crate::config::EngineConfig;
use crate::core::MtResource;
use crate::error::{EngineError, EngineResult};

use context::{ClientContext, Player, PlayerId, PlayerList, ServerContext};
use simulation::{TickMetrics, TickScheduler};
use voxels::block::behavior::{ActivationContext, Dispatch, PlacementContext};
use voxels::block::registry::BlockRegistry;
use voxels::block::BlockId;
use voxels::chunk::{Chunk, DimensionId};
use voxels::world::World;
use voxels::world_editor::WorldEditor;

pub mod buffer_state;
pub mod context;
pub mod rendering;
pub mod simulation;
pub mod task_management;
pub mod voxels;

/// The simulation state of one dimension.
///
/// # Examples
///
/// ```
/// use cgmath::Point3;
/// use voxel_runtime::config::EngineConfig;
/// use voxel_runtime::engine_state::context::{Player, RecordingServer};
/// use voxel_runtime::engine_state::voxels::block::{BlockDefinition, TilesDef};
/// use voxel_runtime::engine_state::voxels::chunk::Chunk;
/// use voxel_runtime::engine_state::EngineState;
///
/// let mut engine_state = EngineState::new(EngineConfig::default(), 0);
/// let stone = engine_state
///     .registry_mut()
///     .register_block(BlockDefinition::solid("default:stone", "Stone", TilesDef::uniform(1)))
///     .unwrap();
///
/// engine_state.add_player(Player::new(1, "steve", Point3::new(0.0, 0.0, 0.0)));
/// engine_state.load_chunk(Chunk::new(Point3::new(0, 0, 0), 0));
/// engine_state.place_block(Point3::new(2, 3, 4), stone).unwrap();
///
/// let mut server = RecordingServer::default();
/// engine_state.tick(&mut server);
/// assert_eq!(engine_state.tick_metrics().ticks_run, 1);
/// ```
pub struct EngineState {
    config: EngineConfig,
    registry: BlockRegistry,
    world: World,
    players: PlayerList,
    scheduler: TickScheduler,
}

impl EngineState {
    pub fn new(config: EngineConfig, dimension: DimensionId) -> Self {
        log::info!(
            "Creating engine state for dimension {} ({} ticks/s, simulation distance {})",
            dimension,
            config.tick_rate,
            config.simulation_distance
        );
        let scheduler = TickScheduler::new(config.tick_interval());
        Self {
            config,
            registry: BlockRegistry::new(),
            world: World::new(dimension),
            players: PlayerList::new(),
            scheduler,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &BlockRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut BlockRegistry {
        &mut self.registry
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn players(&self) -> &PlayerList {
        &self.players
    }

    pub fn tick_metrics(&self) -> &TickMetrics {
        self.scheduler.metrics()
    }

    pub fn tick_metrics_mut(&mut self) -> &mut TickMetrics {
        self.scheduler.metrics_mut()
    }

    /// Adds a player, replacing any player with the same id.
    pub fn add_player(&mut self, player: Player) -> Option<Player> {
        log::info!("Player {} '{}' joined", player.id, player.name);
        self.players.insert(player.id, player)
    }

    pub fn remove_player(&mut self, id: PlayerId) -> EngineResult<Player> {
        let player = self.players.remove(&id).ok_or(EngineError::UnknownPlayer(id))?;
        log::info!("Player {} '{}' left", player.id, player.name);
        Ok(player)
    }

    pub fn player_mut(&mut self, id: PlayerId) -> EngineResult<&mut Player> {
        self.players.get_mut(&id).ok_or(EngineError::UnknownPlayer(id))
    }

    /// Loads a chunk whose content is complete and makes it ready for meshing.
    ///
    /// The chunk is flagged too far right away when no player is within simulation distance.
    pub fn load_chunk(&mut self, chunk: Chunk) -> MtResource<Chunk> {
        let position = chunk.position;
        if chunk.dimension() != self.world.dimension() {
            log::warn!(
                "Loading chunk {:?} of dimension {} into dimension {}",
                position,
                chunk.dimension(),
                self.world.dimension()
            );
        }
        let resource = self.world.add_chunk(chunk);
        {
            let mut chunk = resource.get_mut();
            let too_far = !self.players.values().any(|player| {
                context::chunk_distance(position, player.chunk_position())
                    <= self.config.simulation_distance
            });
            chunk.set_too_far(too_far);
        }
        // The chunk was inserted above.
        let _ = self.world.mark_chunk_initialized(position);
        resource
    }

    pub fn unload_chunk(&mut self, position: Point3<i32>) -> bool {
        self.world.remove_chunk(position).is_some()
    }

    /// Re-evaluates which chunks are close enough to a player to be ticked.
    pub fn update_simulation_distance(&self) -> usize {
        self.world
            .update_simulation_distance(&self.players, self.config.simulation_distance)
    }

    /// Runs one tick immediately. Returns the number of tick handler calls.
    pub fn tick(&mut self, server: &mut dyn ServerContext) -> u64 {
        self.scheduler
            .run_tick(&self.registry, &self.world, &mut self.players, server)
    }

    /// Advances simulation time, running every tick that became due.
    ///
    /// # Returns
    /// The number of ticks run.
    pub fn update(&mut self, elapsed: Duration, server: &mut dyn ServerContext) -> u32 {
        let due = self.scheduler.advance(elapsed);
        if due > 0 {
            self.update_simulation_distance();
        }
        for _ in 0..due {
            self.tick(server);
        }
        due
    }

    /// A player interacts with a block.
    ///
    /// # Returns
    /// `true` if the block's activation handler consumed the interaction. Otherwise the default
    /// path has run.
    ///
    /// # Errors
    /// - [`EngineError::UnknownPlayer`] if the player is not in the world
    /// - [`EngineError::ChunkNotLoaded`] if the block's chunk is not loaded
    pub fn activate_block(
        &mut self,
        player_id: PlayerId,
        position: Point3<i32>,
        client: &mut dyn ClientContext,
    ) -> EngineResult<bool> {
        let player = self
            .players
            .get_mut(&player_id)
            .ok_or(EngineError::UnknownPlayer(player_id))?;
        let block = self.world.get_block_at(position)?;
        if block.is_air() {
            return Ok(false);
        }

        let binding = self.registry.binding(block)?;
        if binding.can_be_activated() {
            let mut context = ActivationContext {
                position,
                block,
                player,
                world: WorldEditor::new(&self.world),
                client: &mut *client,
            };
            if let Dispatch::Handled(true) = binding.dispatch_activated(&mut context) {
                return Ok(true);
            }
        }

        client.open_default_interface(position, self.registry.get_type(block)?);
        Ok(false)
    }

    /// Places a block, running its placement handler between the write and the meshing
    /// invalidation. Placing air removes the block without any handler.
    ///
    /// # Returns
    /// The block that previously occupied the cell.
    ///
    /// # Errors
    /// - [`EngineError::UnknownBlock`] if the block id is not registered
    /// - [`EngineError::ChunkNotLoaded`] if the position's chunk is not loaded
    pub fn place_block(&mut self, position: Point3<i32>, block: BlockId) -> EngineResult<BlockId> {
        if block.is_air() {
            return self.remove_block(position);
        }
        let binding = self.registry.binding(block)?;

        let previous = self.world.write_block_at(position, block)?;
        if binding.has_placement_handler() {
            let mut context = PlacementContext {
                position,
                block,
                world: WorldEditor::new(&self.world),
            };
            binding.dispatch_placed(&mut context);
        }
        self.world.invalidate_around(position);
        self.world.flush_deferred_invalidations();
        Ok(previous)
    }

    /// Clears a block to air. No handler runs.
    pub fn remove_block(&mut self, position: Point3<i32>) -> EngineResult<BlockId> {
        let previous = self.world.set_block_at(position, BlockId::AIR)?;
        self.world.flush_deferred_invalidations();
        Ok(previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::context::{RecordingClient, RecordingServer};
    use crate::engine_state::voxels::block::behavior::{ActivatedHandler, PlacedHandler};
    use crate::engine_state::voxels::block::{BlockDefinition, TilesDef};
    use std::sync::{Arc, Mutex};

    fn engine_state() -> EngineState {
        let mut engine_state = EngineState::new(EngineConfig::default(), 0);
        engine_state.add_player(Player::new(7, "alex", Point3::new(1.0, 1.0, 1.0)));
        engine_state.load_chunk(Chunk::new(Point3::new(0, 0, 0), 0));
        engine_state
    }

    fn register(engine_state: &mut EngineState, name: &str) -> BlockId {
        engine_state
            .registry_mut()
            .register_block(BlockDefinition::solid(name, name, TilesDef::uniform(1)))
            .unwrap()
    }

    #[test]
    fn handled_activation_skips_default_path() {
        let mut engine_state = engine_state();
        let chest = register(&mut engine_state, "default:chest");
        engine_state
            .registry_mut()
            .update_binding(chest, |binding| {
                binding.set_on_block_activated(ActivatedHandler::new(|context| {
                    context.client.show_message("chest opened");
                    Ok(true)
                }))
            })
            .unwrap();
        let position = Point3::new(3, 3, 3);
        engine_state.place_block(position, chest).unwrap();

        let mut client = RecordingClient::default();
        assert!(engine_state.activate_block(7, position, &mut client).unwrap());
        assert_eq!(client.messages, vec!["chest opened".to_string()]);
        assert!(client.opened_interfaces.is_empty());
    }

    #[test]
    fn missing_declined_or_faulting_handler_runs_default_path() {
        let mut engine_state = engine_state();
        let stone = register(&mut engine_state, "default:stone");
        let lever = register(&mut engine_state, "default:lever");
        let trap = register(&mut engine_state, "default:trap");
        engine_state
            .registry_mut()
            .update_binding(lever, |binding| {
                binding.set_on_block_activated(ActivatedHandler::new(|_| Ok(false)))
            })
            .unwrap();
        engine_state
            .registry_mut()
            .update_binding(trap, |binding| {
                binding.set_on_block_activated(ActivatedHandler::new(|_| panic!("sprung")))
            })
            .unwrap();

        let mut client = RecordingClient::default();
        for (x, block) in [(1, stone), (2, lever), (3, trap)] {
            let position = Point3::new(x, 0, 0);
            engine_state.place_block(position, block).unwrap();
            assert!(!engine_state.activate_block(7, position, &mut client).unwrap());
        }
        assert_eq!(
            client.opened_interfaces,
            vec![
                (Point3::new(1, 0, 0), stone),
                (Point3::new(2, 0, 0), lever),
                (Point3::new(3, 0, 0), trap),
            ]
        );
    }

    #[test]
    fn activation_errors_reach_the_caller() {
        let mut engine_state = engine_state();
        let mut client = RecordingClient::default();
        assert!(matches!(
            engine_state.activate_block(99, Point3::new(0, 0, 0), &mut client),
            Err(EngineError::UnknownPlayer(99))
        ));
        assert!(matches!(
            engine_state.activate_block(7, Point3::new(0, 40, 0), &mut client),
            Err(EngineError::ChunkNotLoaded(_))
        ));
        assert!(!engine_state.activate_block(7, Point3::new(0, 0, 0), &mut client).unwrap());
        assert!(client.opened_interfaces.is_empty());
    }

    #[test]
    fn placement_handler_sees_committed_cell_before_invalidation() {
        let mut engine_state = engine_state();
        let sapling = register(&mut engine_state, "default:sapling");
        let observed = Arc::new(Mutex::new(Vec::new()));
        let record = observed.clone();
        engine_state
            .registry_mut()
            .update_binding(sapling, |binding| {
                binding.set_on_block_placed(PlacedHandler::new(move |context| {
                    let ready = context
                        .world
                        .with_chunk(Point3::new(0, 0, 0), |chunk| chunk.is_ready_for_meshing())?;
                    record
                        .lock()
                        .unwrap()
                        .push((context.world.get_block_at(context.position)?, ready));
                    Ok(())
                }))
            })
            .unwrap();
        let chunk = engine_state.world().get_chunk_at(Point3::new(0, 0, 0)).unwrap();
        chunk.get_mut().take_ready_for_meshing();

        engine_state.place_block(Point3::new(4, 4, 4), sapling).unwrap();

        assert_eq!(*observed.lock().unwrap(), vec![(sapling, false)]);
        assert!(chunk.get().is_ready_for_meshing());
    }

    #[test]
    fn removal_skips_placement_handler() {
        let mut engine_state = engine_state();
        let calls = Arc::new(Mutex::new(0));
        let sapling = register(&mut engine_state, "default:sapling");
        let counter = calls.clone();
        engine_state
            .registry_mut()
            .update_binding(sapling, |binding| {
                binding.set_on_block_placed(PlacedHandler::new(move |_| {
                    *counter.lock().unwrap() += 1;
                    Ok(())
                }))
            })
            .unwrap();
        let position = Point3::new(4, 4, 4);
        engine_state.place_block(position, sapling).unwrap();
        let chunk = engine_state.world().get_chunk_at(Point3::new(0, 0, 0)).unwrap();
        chunk.get_mut().take_ready_for_meshing();
        assert_eq!(engine_state.remove_block(position).unwrap(), sapling);
        assert!(chunk.get().is_ready_for_meshing());
        assert_eq!(engine_state.place_block(position, BlockId::AIR).unwrap(), BlockId::AIR);
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn faulting_activation_leaves_world_untouched() {
        let mut engine_state = engine_state();
        let stone = register(&mut engine_state, "default:stone");
        let trap = register(&mut engine_state, "default:trap");
        engine_state
            .registry_mut()
            .update_binding(trap, |binding| {
                binding.set_on_block_activated(ActivatedHandler::new(move |context| {
                    context.world.set_block_at(Point3::new(9, 9, 9), stone)?;
                    Err("trap jammed".into())
                }))
            })
            .unwrap();
        let position = Point3::new(2, 2, 2);
        engine_state.place_block(position, trap).unwrap();
        let chunk = engine_state.world().get_chunk_at(Point3::new(0, 0, 0)).unwrap();
        chunk.get_mut().take_ready_for_meshing();

        let mut client = RecordingClient::default();
        assert!(!engine_state.activate_block(7, position, &mut client).unwrap());

        assert_eq!(engine_state.world().get_block_at(Point3::new(9, 9, 9)).unwrap(), BlockId::AIR);
        assert!(!chunk.get().is_ready_for_meshing());
        assert_eq!(client.opened_interfaces, vec![(position, trap)]);
    }

    #[test]
    fn faulting_placement_handler_keeps_only_the_placed_block() {
        let mut engine_state = engine_state();
        let stone = register(&mut engine_state, "default:stone");
        let sapling = register(&mut engine_state, "default:sapling");
        engine_state
            .registry_mut()
            .update_binding(sapling, |binding| {
                binding.set_on_block_placed(PlacedHandler::new(move |context| {
                    context.world.set_block_at(Point3::new(9, 9, 9), stone)?;
                    panic!("roots failed to spread");
                }))
            })
            .unwrap();

        let position = Point3::new(4, 4, 4);
        assert_eq!(engine_state.place_block(position, sapling).unwrap(), BlockId::AIR);

        assert_eq!(engine_state.world().get_block_at(position).unwrap(), sapling);
        assert_eq!(engine_state.world().get_block_at(Point3::new(9, 9, 9)).unwrap(), BlockId::AIR);
    }

    #[test]
    fn successful_handler_world_edits_are_kept() {
        let mut engine_state = engine_state();
        let stone = register(&mut engine_state, "default:stone");
        let sapling = register(&mut engine_state, "default:sapling");
        engine_state
            .registry_mut()
            .update_binding(sapling, |binding| {
                binding.set_on_block_placed(PlacedHandler::new(move |context| {
                    context
                        .world
                        .set_block_at(context.position + cgmath::Vector3::new(0, 1, 0), stone)?;
                    Ok(())
                }))
            })
            .unwrap();

        engine_state.place_block(Point3::new(4, 4, 4), sapling).unwrap();
        assert_eq!(engine_state.world().get_block_at(Point3::new(4, 5, 4)).unwrap(), stone);
    }

    #[test]
    fn unknown_blocks_are_rejected() {
        let mut engine_state = engine_state();
        assert!(matches!(
            engine_state.place_block(Point3::new(0, 0, 0), BlockId(42)),
            Err(EngineError::UnknownBlock(BlockId(42)))
        ));
    }

    #[test]
    fn chunks_far_from_players_load_too_far() {
        let mut engine_state = engine_state();
        let far = engine_state.load_chunk(Chunk::new(Point3::new(30, 0, 0), 0));
        assert!(far.get().is_too_far());
        assert!(!engine_state
            .world()
            .get_chunk_at(Point3::new(0, 0, 0))
            .unwrap()
            .get()
            .is_too_far());

        engine_state.player_mut(7).unwrap().position = Point3::new(30.0 * 16.0, 0.0, 0.0);
        assert_eq!(engine_state.update_simulation_distance(), 1);
        assert!(!far.get().is_too_far());
        let far_from_player = engine_state.load_chunk(Chunk::new(Point3::new(-10, 0, 0), 0));
        assert!(far_from_player.get().is_too_far());
        assert_eq!(engine_state.update_simulation_distance(), 2);
    }

    #[test]
    fn update_runs_due_ticks() {
        let mut engine_state = engine_state();
        let mut server = RecordingServer::default();
        let interval = engine_state.config().tick_interval();
        assert_eq!(engine_state.update(interval * 3, &mut server), 3);
        assert_eq!(engine_state.tick_metrics().ticks_run, 3);
        assert!(engine_state.remove_player(7).is_ok());
        assert!(matches!(engine_state.remove_player(7), Err(EngineError::UnknownPlayer(7))));
    }
}
