use std::collections::HashMap;
use std::sync::Arc;

use super::behavior::BlockBehaviorBinding;
use super::{BlockDefinition, BlockId, BlockType, BlockTypeSize, BlockTypeTable, RenderLayer, TilesDef};
use crate::error::{EngineError, EngineResult};

/// Internal name of the built-in empty block.
pub const AIR_NAME: &str = "air";

/// Owns every block type and its behaviour binding.
///
/// Ids are handed out densely in registration order and stay stable for the session. Id `0` is
/// reserved for air, which is registered on construction and never has behaviour.
///
/// The type table is shared with meshing workers through [`BlockRegistry::types`]. Registering
/// a new type after the table has been shared copies it, so workers keep a consistent snapshot.
pub struct BlockRegistry {
    types: Arc<BlockTypeTable>,
    bindings: Vec<BlockBehaviorBinding>,
    name_to_id: HashMap<String, BlockId>,
    behavior_generation: u64,
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            types: Arc::default(),
            bindings: Vec::new(),
            name_to_id: HashMap::new(),
            behavior_generation: 0,
        };
        registry.insert(BlockDefinition {
            name: AIR_NAME.to_string(),
            label: "Air".to_string(),
            tiles: TilesDef::uniform(0),
            render_layer: RenderLayer::Solid,
            opaque: false,
        });
        registry
    }

    /// Registers a block type and returns its id. The new type starts with an inert binding.
    ///
    /// # Errors
    /// - [`EngineError::DuplicateBlockName`] if the name is already taken
    /// - [`EngineError::RegistryFull`] if the id space is exhausted
    pub fn register_block(&mut self, definition: BlockDefinition) -> EngineResult<BlockId> {
        if self.name_to_id.contains_key(&definition.name) {
            return Err(EngineError::DuplicateBlockName(definition.name));
        }
        if self.bindings.len() > BlockTypeSize::MAX as usize {
            return Err(EngineError::RegistryFull);
        }
        let name = definition.name.clone();
        let id = self.insert(definition);
        log::info!("Registered block '{}' with id {}", name, id.0);
        Ok(id)
    }

    fn insert(&mut self, definition: BlockDefinition) -> BlockId {
        let id = BlockId(self.bindings.len() as BlockTypeSize);
        let block_type = BlockType::new(
            id,
            definition.tiles,
            &definition.name,
            &definition.label,
            definition.render_layer,
            definition.opaque,
        );
        Arc::make_mut(&mut self.types).push(block_type);
        self.bindings.push(BlockBehaviorBinding::default());
        self.name_to_id.insert(definition.name, id);
        id
    }

    pub fn get_type(&self, id: BlockId) -> EngineResult<&BlockType> {
        self.types.get(id).ok_or(EngineError::UnknownBlock(id))
    }

    pub fn get_id(&self, name: &str) -> EngineResult<BlockId> {
        self.name_to_id
            .get(name)
            .copied()
            .ok_or_else(|| EngineError::UnknownBlockName(name.to_string()))
    }

    /// Shared snapshot of the type table.
    pub fn types(&self) -> Arc<BlockTypeTable> {
        self.types.clone()
    }

    pub fn contains(&self, id: BlockId) -> bool {
        id.index() < self.bindings.len()
    }

    /// Number of registered types, air included.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn binding(&self, id: BlockId) -> EngineResult<&BlockBehaviorBinding> {
        self.bindings.get(id.index()).ok_or(EngineError::UnknownBlock(id))
    }

    /// Changes the behaviour of a block type. Safe to call at any time; the next dispatch sees
    /// the new handlers.
    ///
    /// ```
    /// use voxel_runtime::engine_state::voxels::block::behavior::TickHandler;
    /// use voxel_runtime::engine_state::voxels::block::registry::BlockRegistry;
    /// use voxel_runtime::engine_state::voxels::block::{BlockDefinition, TilesDef};
    ///
    /// let mut registry = BlockRegistry::new();
    /// let torch = registry
    ///     .register_block(BlockDefinition::solid("default:torch", "Torch", TilesDef::uniform(4)))
    ///     .unwrap();
    /// registry
    ///     .update_binding(torch, |binding| binding.set_on_tick(TickHandler::new(|_| Ok(()))))
    ///     .unwrap();
    /// assert!(registry.binding(torch).unwrap().can_update());
    /// ```
    ///
    /// # Errors
    /// [`EngineError::UnknownBlock`] for an unregistered id. Air cannot be given behaviour and is
    /// reported the same way.
    pub fn update_binding<R>(
        &mut self,
        id: BlockId,
        update: impl FnOnce(&mut BlockBehaviorBinding) -> R,
    ) -> EngineResult<R> {
        if id.is_air() {
            return Err(EngineError::UnknownBlock(id));
        }
        let binding = self
            .bindings
            .get_mut(id.index())
            .ok_or(EngineError::UnknownBlock(id))?;
        let result = update(binding);
        self.behavior_generation += 1;
        log::debug!("Behaviour of block {:?} updated: {:?}", id, binding);
        Ok(result)
    }

    /// Ids of every block type with a tick handler, in id order.
    pub fn tick_eligible(&self) -> Vec<BlockId> {
        self.bindings
            .iter()
            .enumerate()
            .filter(|(_, binding)| binding.can_update())
            .map(|(index, _)| BlockId(index as BlockTypeSize))
            .collect()
    }

    /// Counter bumped by every [`BlockRegistry::update_binding`] call.
    pub fn behavior_generation(&self) -> u64 {
        self.behavior_generation
    }
}
