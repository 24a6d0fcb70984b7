//! # Block Behaviour Module
//!
//! Late-bound logic attached to a block type. A [`BlockBehaviorBinding`] has three optional
//! slots:
//!
//! * `on_tick` - periodic simulation, called once per tick for every instance of the block in a
//!   chunk that is close enough to be simulated
//! * `on_block_activated` - direct player interaction; returning `true` consumes the event and
//!   suppresses the engine's default activation behaviour
//! * `on_block_placed` - side effects right after the block is written into a chunk
//!
//! Whether a slot is "enabled" is never stored separately: [`BlockBehaviorBinding::can_update`]
//! and [`BlockBehaviorBinding::can_be_activated`] are derived from the presence of the handler,
//! so replacing or clearing a handler is observed by the very next dispatch.
//!
//! ## Fault isolation
//!
//! Handlers are authored outside the engine and may fail. Every dispatch runs the handler
//! under [`std::panic::catch_unwind`]; a returned [`BehaviorError`] and a panic are both turned
//! into a [`HandlerFault`], logged, and reported to the caller as [`Dispatch::Faulted`]. Every
//! world edit a faulting handler made is rolled back: writes to the ticked chunk through its
//! [`ChunkEditor`], and writes anywhere else through its [`WorldEditor`]. The block stays bound
//! and is dispatched again on the next tick or interaction.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use cgmath::Point3;
use thiserror::Error;

use super::BlockId;
use crate::core::panic_message;
use crate::engine_state::context::{ClientContext, Player, PlayerList, ServerContext};
use crate::engine_state::voxels::chunk::ChunkEditor;
use crate::engine_state::voxels::world_editor::WorldEditor;
use crate::error::EngineError;

/// Result type returned by behaviour handlers.
pub type BehaviorResult<T> = Result<T, BehaviorError>;

/// Error a behaviour handler can report back to the engine.
#[derive(Error, Debug)]
pub enum BehaviorError {
    /// Failure described by the handler itself.
    #[error("{0}")]
    Script(String),

    /// An engine operation issued by the handler failed.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl From<&str> for BehaviorError {
    fn from(message: &str) -> Self {
        BehaviorError::Script(message.to_string())
    }
}

impl From<String> for BehaviorError {
    fn from(message: String) -> Self {
        BehaviorError::Script(message)
    }
}

/// Why a dispatched handler produced no effect.
#[derive(Error, Debug)]
pub enum HandlerFault {
    #[error("handler returned an error: {0}")]
    Failed(#[source] BehaviorError),

    #[error("handler panicked: {0}")]
    Panicked(String),
}

/// Outcome of a dispatch into a binding.
#[derive(Debug)]
pub enum Dispatch<T> {
    /// The handler ran to completion.
    Handled(T),
    /// No handler is bound to the slot; nothing was attempted.
    Inert,
    /// The handler faulted and was isolated.
    Faulted(HandlerFault),
}

impl<T> Dispatch<T> {
    pub fn is_faulted(&self) -> bool {
        matches!(self, Dispatch::Faulted(_))
    }

    pub fn handled(self) -> Option<T> {
        match self {
            Dispatch::Handled(value) => Some(value),
            _ => None,
        }
    }
}

/// Everything a tick handler may read or change.
pub struct TickContext<'a> {
    /// World block position of the ticked block.
    pub position: Point3<i32>,
    /// Position of the ticked block inside `chunk`.
    pub local_position: Point3<i32>,
    pub block: BlockId,
    pub players: &'a mut PlayerList,
    /// The chunk containing the block. Edits made here are rolled back if the handler faults.
    pub chunk: ChunkEditor<'a>,
    /// The rest of the world. The ticked chunk is locked for the duration of the call, so world
    /// reads and edits aimed at it fail with [`EngineError::ChunkLocked`]; use `chunk` instead.
    pub world: WorldEditor<'a>,
    pub server: &'a mut dyn ServerContext,
}

/// Everything an activation handler may read or change.
pub struct ActivationContext<'a> {
    pub position: Point3<i32>,
    pub block: BlockId,
    pub player: &'a mut Player,
    pub world: WorldEditor<'a>,
    pub client: &'a mut dyn ClientContext,
}

/// Everything a placement handler may read or change.
pub struct PlacementContext<'a> {
    pub position: Point3<i32>,
    pub block: BlockId,
    pub world: WorldEditor<'a>,
}

type TickFn = dyn Fn(&mut TickContext<'_>) -> BehaviorResult<()> + Send + Sync;
type ActivatedFn = dyn Fn(&mut ActivationContext<'_>) -> BehaviorResult<bool> + Send + Sync;
type PlacedFn = dyn Fn(&mut PlacementContext<'_>) -> BehaviorResult<()> + Send + Sync;

/// Shared reference to a tick handler.
#[derive(Clone)]
pub struct TickHandler(Arc<TickFn>);

impl TickHandler {
    pub fn new(
        handler: impl Fn(&mut TickContext<'_>) -> BehaviorResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self(Arc::new(handler))
    }
}

/// Shared reference to an activation handler. The handler returns whether it consumed the
/// interaction.
#[derive(Clone)]
pub struct ActivatedHandler(Arc<ActivatedFn>);

impl ActivatedHandler {
    pub fn new(
        handler: impl Fn(&mut ActivationContext<'_>) -> BehaviorResult<bool> + Send + Sync + 'static,
    ) -> Self {
        Self(Arc::new(handler))
    }
}

/// Shared reference to a placement handler.
#[derive(Clone)]
pub struct PlacedHandler(Arc<PlacedFn>);

impl PlacedHandler {
    pub fn new(
        handler: impl Fn(&mut PlacementContext<'_>) -> BehaviorResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self(Arc::new(handler))
    }
}

/// Optional behaviour attached to one block type.
#[derive(Clone, Default)]
pub struct BlockBehaviorBinding {
    on_tick: Option<TickHandler>,
    on_block_activated: Option<ActivatedHandler>,
    on_block_placed: Option<PlacedHandler>,
}

impl fmt::Debug for BlockBehaviorBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockBehaviorBinding")
            .field("on_tick", &self.on_tick.is_some())
            .field("on_block_activated", &self.on_block_activated.is_some())
            .field("on_block_placed", &self.on_block_placed.is_some())
            .finish()
    }
}

impl BlockBehaviorBinding {
    /// Replaces the tick handler. Passing `None` clears it.
    pub fn set_on_tick(&mut self, handler: impl Into<Option<TickHandler>>) {
        self.on_tick = handler.into();
    }

    /// Replaces the activation handler. Passing `None` clears it.
    pub fn set_on_block_activated(&mut self, handler: impl Into<Option<ActivatedHandler>>) {
        self.on_block_activated = handler.into();
    }

    /// Replaces the placement handler. Passing `None` clears it.
    pub fn set_on_block_placed(&mut self, handler: impl Into<Option<PlacedHandler>>) {
        self.on_block_placed = handler.into();
    }

    /// Whether the block type takes part in the tick loop.
    pub fn can_update(&self) -> bool {
        self.on_tick.is_some()
    }

    /// Whether the block type reacts to direct interaction.
    pub fn can_be_activated(&self) -> bool {
        self.on_block_activated.is_some()
    }

    pub fn has_placement_handler(&self) -> bool {
        self.on_block_placed.is_some()
    }

    /// Whether no slot is bound.
    pub fn is_inert(&self) -> bool {
        !self.can_update() && !self.can_be_activated() && !self.has_placement_handler()
    }

    /// Runs the tick handler for one block instance.
    ///
    /// Edits made through `context.chunk` and `context.world` are rolled back if the handler
    /// faults.
    pub fn dispatch_tick(&self, context: &mut TickContext<'_>) -> Dispatch<()> {
        let Some(TickHandler(handler)) = &self.on_tick else {
            return Dispatch::Inert;
        };

        match isolate(|| handler(context)) {
            Ok(()) => Dispatch::Handled(()),
            Err(fault) => {
                context.chunk.rollback();
                context.world.rollback();
                log::warn!(
                    "Tick handler for block {:?} at {:?} faulted: {}",
                    context.block,
                    context.position,
                    fault
                );
                Dispatch::Faulted(fault)
            }
        }
    }

    /// Runs the activation handler. `Dispatch::Handled(true)` means the interaction was
    /// consumed.
    pub fn dispatch_activated(&self, context: &mut ActivationContext<'_>) -> Dispatch<bool> {
        let Some(ActivatedHandler(handler)) = &self.on_block_activated else {
            return Dispatch::Inert;
        };

        match isolate(|| handler(context)) {
            Ok(consumed) => Dispatch::Handled(consumed),
            Err(fault) => {
                context.world.rollback();
                log::warn!(
                    "Activation handler for block {:?} at {:?} faulted: {}",
                    context.block,
                    context.position,
                    fault
                );
                Dispatch::Faulted(fault)
            }
        }
    }

    /// Runs the placement handler.
    pub fn dispatch_placed(&self, context: &mut PlacementContext<'_>) -> Dispatch<()> {
        let Some(PlacedHandler(handler)) = &self.on_block_placed else {
            return Dispatch::Inert;
        };

        match isolate(|| handler(context)) {
            Ok(()) => Dispatch::Handled(()),
            Err(fault) => {
                context.world.rollback();
                log::warn!(
                    "Placement handler for block {:?} at {:?} faulted: {}",
                    context.block,
                    context.position,
                    fault
                );
                Dispatch::Faulted(fault)
            }
        }
    }
}

fn isolate<T>(call: impl FnOnce() -> BehaviorResult<T>) -> Result<T, HandlerFault> {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(HandlerFault::Failed(error)),
        Err(payload) => Err(HandlerFault::Panicked(panic_message(payload.as_ref()))),
    }
}
