use bitvec::prelude::BitVec;
use web_time::{Duration, Instant};

use crate::engine_state::context::{PlayerList, ServerContext};
use crate::engine_state::voxels::block::behavior::{Dispatch, TickContext};
use crate::engine_state::voxels::block::registry::BlockRegistry;
use crate::engine_state::voxels::block::BlockId;
use crate::engine_state::voxels::chunk::{Chunk, ChunkEditor};
use crate::engine_state::voxels::world::World;
use crate::engine_state::voxels::world_editor::WorldEditor;

/// Tick statistics, owned by the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickMetrics {
    pub ticks_run: u64,
    /// Tick handler calls, faulted ones included
    pub handler_invocations: u64,
    pub handler_faults: u64,
    /// Chunks passed over because no player was close enough
    pub chunks_skipped_too_far: u64,
    pub last_tick_duration: Duration,
}

impl TickMetrics {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Drives tick handlers at a fixed rate.
///
/// The scheduler keeps the set of block types that have a tick handler and rebuilds it when the
/// registry's behaviour generation moves, so types without a handler cost nothing per tick.
#[derive(Debug)]
pub struct TickScheduler {
    tick_interval: Duration,
    accumulated: Duration,
    eligible: BitVec,
    eligible_generation: Option<u64>,
    metrics: TickMetrics,
}

impl TickScheduler {
    pub fn new(tick_interval: Duration) -> Self {
        Self {
            tick_interval,
            accumulated: Duration::ZERO,
            eligible: BitVec::new(),
            eligible_generation: None,
            metrics: TickMetrics::default(),
        }
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub fn metrics(&self) -> &TickMetrics {
        &self.metrics
    }

    pub fn metrics_mut(&mut self) -> &mut TickMetrics {
        &mut self.metrics
    }

    /// Adds elapsed wall time and returns how many ticks are now due.
    pub fn advance(&mut self, elapsed: Duration) -> u32 {
        if self.tick_interval.is_zero() {
            return 1;
        }
        self.accumulated += elapsed;
        let mut due = 0;
        while self.accumulated >= self.tick_interval {
            self.accumulated -= self.tick_interval;
            due += 1;
        }
        due
    }

    /// Whether a block type is in the current eligible set.
    pub fn is_eligible(&self, block: BlockId) -> bool {
        self.eligible.get(block.index()).is_some_and(|bit| *bit)
    }

    fn refresh_eligible(&mut self, registry: &BlockRegistry) {
        let generation = registry.behavior_generation();
        if self.eligible_generation == Some(generation) && self.eligible.len() == registry.len() {
            return;
        }
        self.eligible = BitVec::repeat(false, registry.len());
        for block in registry.tick_eligible() {
            self.eligible.set(block.index(), true);
        }
        log::debug!(
            "Tick-eligible block types rebuilt: {} of {}",
            self.eligible.count_ones(),
            registry.len()
        );
        self.eligible_generation = Some(generation);
    }

    /// Runs one tick over every loaded chunk that is not too far.
    ///
    /// Each eligible block instance gets exactly one handler call. The ticked chunk is held
    /// exclusively while its handlers run; meshing invalidations aimed at it are applied once the
    /// tick ends.
    ///
    /// # Returns
    /// The number of handler calls made.
    pub fn run_tick(
        &mut self,
        registry: &BlockRegistry,
        world: &World,
        players: &mut PlayerList,
        server: &mut dyn ServerContext,
    ) -> u64 {
        let start = Instant::now();
        self.refresh_eligible(registry);

        let mut chunks: Vec<_> = world
            .chunks()
            .map(|(position, chunk)| (*position, chunk.clone()))
            .collect();
        chunks.sort_by_key(|(position, _)| (position.x, position.y, position.z));

        let mut invocations = 0;
        if self.eligible.any() {
            for (chunk_position, chunk) in chunks {
                let mut guard = chunk.get_mut();
                if guard.is_too_far() {
                    self.metrics.chunks_skipped_too_far += 1;
                    continue;
                }

                let targets: Vec<_> = guard
                    .blocks()
                    .filter(|(_, block)| self.is_eligible(*block))
                    .collect();
                for (local, block) in targets {
                    // An earlier handler may have replaced the block.
                    if guard.get_block(local).ok() != Some(block) {
                        continue;
                    }
                    let Ok(binding) = registry.binding(block) else {
                        continue;
                    };

                    let position = guard.world_position(local);
                    let mut context = TickContext {
                        position,
                        local_position: local,
                        block,
                        players: &mut *players,
                        chunk: ChunkEditor::new(&mut guard),
                        world: WorldEditor::new(world),
                        server: &mut *server,
                    };
                    let outcome = binding.dispatch_tick(&mut context);
                    let boundary_edits: Vec<_> = context
                        .chunk
                        .edited_positions()
                        .flat_map(Chunk::boundary_sides)
                        .collect();
                    drop(context);

                    match outcome {
                        Dispatch::Inert => continue,
                        Dispatch::Faulted(_) => self.metrics.handler_faults += 1,
                        Dispatch::Handled(()) => {
                            for side in boundary_edits {
                                world.invalidate_chunk(chunk_position + side.offset());
                            }
                        }
                    }
                    invocations += 1;
                }
            }
        } else {
            self.metrics.chunks_skipped_too_far += chunks
                .iter()
                .filter(|(_, chunk)| chunk.get().is_too_far())
                .count() as u64;
        }

        world.flush_deferred_invalidations();
        self.metrics.ticks_run += 1;
        self.metrics.handler_invocations += invocations;
        self.metrics.last_tick_duration = start.elapsed();
        log::trace!(
            "Tick {} ran {} handler(s) in {:?}",
            self.metrics.ticks_run,
            invocations,
            self.metrics.last_tick_duration
        );
        invocations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::context::RecordingServer;
    use crate::engine_state::voxels::block::behavior::TickHandler;
    use crate::engine_state::voxels::block::{BlockDefinition, TilesDef};
    use cgmath::Point3;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Fixture {
        registry: BlockRegistry,
        world: World,
        stone: BlockId,
        torch: BlockId,
    }

    fn fixture() -> Fixture {
        let mut registry = BlockRegistry::new();
        let stone = registry
            .register_block(BlockDefinition::solid("default:stone", "Stone", TilesDef::uniform(1)))
            .unwrap();
        let torch = registry
            .register_block(BlockDefinition::solid("default:torch", "Torch", TilesDef::uniform(2)))
            .unwrap();
        let mut world = World::new(0);
        world.add_chunk(Chunk::new(Point3::new(0, 0, 0), 0));
        world.add_chunk(Chunk::new(Point3::new(1, 0, 0), 0));
        world.mark_chunk_initialized(Point3::new(0, 0, 0)).unwrap();
        world.mark_chunk_initialized(Point3::new(1, 0, 0)).unwrap();
        Fixture {
            registry,
            world,
            stone,
            torch,
        }
    }

    fn counting_handler(counter: &Arc<AtomicUsize>) -> TickHandler {
        let counter = counter.clone();
        TickHandler::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn each_eligible_instance_ticks_once_per_tick() {
        let mut fixture = fixture();
        let calls = Arc::new(AtomicUsize::new(0));
        fixture
            .registry
            .update_binding(fixture.torch, |binding| binding.set_on_tick(counting_handler(&calls)))
            .unwrap();
        fixture.world.set_block_at(Point3::new(1, 1, 1), fixture.torch).unwrap();
        fixture.world.set_block_at(Point3::new(20, 1, 1), fixture.torch).unwrap();
        fixture.world.set_block_at(Point3::new(2, 1, 1), fixture.stone).unwrap();

        let mut scheduler = TickScheduler::new(Duration::from_millis(50));
        let mut players = PlayerList::new();
        let mut server = RecordingServer::default();
        for _ in 0..3 {
            let invoked =
                scheduler.run_tick(&fixture.registry, &fixture.world, &mut players, &mut server);
            assert_eq!(invoked, 2);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 6);
        assert_eq!(scheduler.metrics().ticks_run, 3);
        assert_eq!(scheduler.metrics().handler_invocations, 6);
        assert!(!scheduler.is_eligible(fixture.stone));
    }

    #[test]
    fn too_far_chunks_are_not_ticked() {
        let mut fixture = fixture();
        let calls = Arc::new(AtomicUsize::new(0));
        fixture
            .registry
            .update_binding(fixture.torch, |binding| binding.set_on_tick(counting_handler(&calls)))
            .unwrap();
        fixture.world.set_block_at(Point3::new(1, 1, 1), fixture.torch).unwrap();
        fixture.world.set_block_at(Point3::new(20, 1, 1), fixture.torch).unwrap();
        fixture
            .world
            .get_chunk_at(Point3::new(1, 0, 0))
            .unwrap()
            .get_mut()
            .set_too_far(true);

        let mut scheduler = TickScheduler::new(Duration::from_millis(50));
        scheduler.run_tick(
            &fixture.registry,
            &fixture.world,
            &mut PlayerList::new(),
            &mut RecordingServer::default(),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.metrics().chunks_skipped_too_far, 1);
    }

    #[test]
    fn eligible_set_follows_hot_reload() {
        let mut fixture = fixture();
        let calls = Arc::new(AtomicUsize::new(0));
        fixture.world.set_block_at(Point3::new(1, 1, 1), fixture.stone).unwrap();

        let mut scheduler = TickScheduler::new(Duration::from_millis(50));
        let mut players = PlayerList::new();
        let mut server = RecordingServer::default();
        assert_eq!(
            scheduler.run_tick(&fixture.registry, &fixture.world, &mut players, &mut server),
            0
        );

        fixture
            .registry
            .update_binding(fixture.stone, |binding| binding.set_on_tick(counting_handler(&calls)))
            .unwrap();
        assert_eq!(
            scheduler.run_tick(&fixture.registry, &fixture.world, &mut players, &mut server),
            1
        );

        fixture
            .registry
            .update_binding(fixture.stone, |binding| binding.set_on_tick(None))
            .unwrap();
        assert_eq!(
            scheduler.run_tick(&fixture.registry, &fixture.world, &mut players, &mut server),
            0
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn faulting_handler_leaves_no_trace_and_stays_eligible() {
        let mut fixture = fixture();
        let stone = fixture.stone;
        fixture
            .registry
            .update_binding(fixture.torch, |binding| {
                binding.set_on_tick(TickHandler::new(move |context| {
                    context.chunk.set_block(Point3::new(5, 5, 5), stone)?;
                    Err("torch went out".into())
                }))
            })
            .unwrap();
        fixture.world.set_block_at(Point3::new(1, 1, 1), fixture.torch).unwrap();
        let chunk = fixture.world.get_chunk_at(Point3::new(0, 0, 0)).unwrap();
        chunk.get_mut().take_ready_for_meshing();

        let mut scheduler = TickScheduler::new(Duration::from_millis(50));
        let mut players = PlayerList::new();
        let mut server = RecordingServer::default();
        for _ in 0..2 {
            scheduler.run_tick(&fixture.registry, &fixture.world, &mut players, &mut server);
        }

        assert_eq!(chunk.get().get_block(Point3::new(5, 5, 5)).unwrap(), BlockId::AIR);
        assert!(!chunk.get().is_ready_for_meshing());
        assert_eq!(scheduler.metrics().handler_faults, 2);
        assert_eq!(scheduler.metrics().handler_invocations, 2);
    }

    #[test]
    fn faulting_handler_world_edits_are_rolled_back() {
        let mut fixture = fixture();
        let stone = fixture.stone;
        fixture
            .registry
            .update_binding(fixture.torch, |binding| {
                binding.set_on_tick(TickHandler::new(move |context| {
                    context.world.set_block_at(Point3::new(20, 1, 1), stone)?;
                    Err("torch went out".into())
                }))
            })
            .unwrap();
        fixture.world.set_block_at(Point3::new(1, 1, 1), fixture.torch).unwrap();
        for (_, chunk) in fixture.world.chunks() {
            chunk.get_mut().take_ready_for_meshing();
        }

        let mut scheduler = TickScheduler::new(Duration::from_millis(50));
        scheduler.run_tick(
            &fixture.registry,
            &fixture.world,
            &mut PlayerList::new(),
            &mut RecordingServer::default(),
        );

        assert_eq!(scheduler.metrics().handler_faults, 1);
        assert_eq!(fixture.world.get_block_at(Point3::new(20, 1, 1)).unwrap(), BlockId::AIR);
        let neighbour = fixture.world.get_chunk_at(Point3::new(1, 0, 0)).unwrap();
        assert!(!neighbour.get().is_ready_for_meshing());
    }

    #[test]
    fn handler_reading_its_own_chunk_through_the_world_is_told_it_is_locked() {
        let mut fixture = fixture();
        let observed = Arc::new(std::sync::Mutex::new(Vec::new()));
        let record = observed.clone();
        fixture
            .registry
            .update_binding(fixture.torch, |binding| {
                binding.set_on_tick(TickHandler::new(move |context| {
                    let own = context.chunk.position();
                    let neighbour = own + cgmath::Vector3::new(1, 0, 0);
                    let mut record = record.lock().unwrap();
                    record.push(context.world.with_chunk(own, |chunk| chunk.solid_count()).is_err());
                    record.push(context.world.with_chunk(neighbour, |chunk| chunk.solid_count()).is_err());
                    record.push(context.world.get_block_at(context.position).is_err());
                    Ok(())
                }))
            })
            .unwrap();
        fixture.world.set_block_at(Point3::new(1, 1, 1), fixture.torch).unwrap();

        let mut scheduler = TickScheduler::new(Duration::from_millis(50));
        let invoked = scheduler.run_tick(
            &fixture.registry,
            &fixture.world,
            &mut PlayerList::new(),
            &mut RecordingServer::default(),
        );

        assert_eq!(invoked, 1);
        assert_eq!(*observed.lock().unwrap(), vec![true, false, true]);
        assert_eq!(scheduler.metrics().handler_faults, 0);
    }

    #[test]
    fn boundary_edits_rearm_the_neighbour() {
        let mut fixture = fixture();
        let stone = fixture.stone;
        fixture
            .registry
            .update_binding(fixture.torch, |binding| {
                binding.set_on_tick(TickHandler::new(move |context| {
                    context.chunk.set_block(Point3::new(15, 3, 3), stone)?;
                    Ok(())
                }))
            })
            .unwrap();
        fixture.world.set_block_at(Point3::new(1, 1, 1), fixture.torch).unwrap();
        for (_, chunk) in fixture.world.chunks() {
            chunk.get_mut().take_ready_for_meshing();
        }

        let mut scheduler = TickScheduler::new(Duration::from_millis(50));
        scheduler.run_tick(
            &fixture.registry,
            &fixture.world,
            &mut PlayerList::new(),
            &mut RecordingServer::default(),
        );

        let neighbour = fixture.world.get_chunk_at(Point3::new(1, 0, 0)).unwrap();
        assert!(neighbour.get().is_ready_for_meshing());
        let own = fixture.world.get_chunk_at(Point3::new(0, 0, 0)).unwrap();
        assert!(own.get().is_ready_for_meshing());
    }

    #[test]
    fn advance_counts_due_ticks() {
        let mut scheduler = TickScheduler::new(Duration::from_millis(50));
        assert_eq!(scheduler.advance(Duration::from_millis(30)), 0);
        assert_eq!(scheduler.advance(Duration::from_millis(30)), 1);
        assert_eq!(scheduler.advance(Duration::from_millis(110)), 2);
    }

    #[test]
    fn metrics_reset() {
        let mut scheduler = TickScheduler::new(Duration::from_millis(50));
        let fixture = fixture();
        scheduler.run_tick(
            &fixture.registry,
            &fixture.world,
            &mut PlayerList::new(),
            &mut RecordingServer::default(),
        );
        assert_eq!(scheduler.metrics().ticks_run, 1);
        scheduler.metrics_mut().reset();
        assert_eq!(*scheduler.metrics(), TickMetrics::default());
    }
}
