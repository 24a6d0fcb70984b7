//! # Block Module
//!
//! This module provides the block-related functionality of the runtime: immutable block type
//! definitions, the faces of a block, late-bound behaviour bindings and the registry that owns
//! both.
//!
//! Chunks never own block types. A cell stores a [`BlockId`], and everything else about the
//! block is looked up in the [`BlockTypeTable`] shared by the registry and the meshing workers.

use serde::{Deserialize, Serialize};

use block_side::BlockSide;

pub mod behavior;
pub mod block_side;
pub mod registry;

/// The underlying integer type used to represent block types in memory.
pub type BlockTypeSize = u16;

/// Dense, session-stable identifier of a registered block type.
///
/// Id `0` is always air.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub BlockTypeSize);

impl BlockId {
    /// The empty cell.
    pub const AIR: BlockId = BlockId(0);

    /// Whether this id is the empty cell.
    pub fn is_air(self) -> bool {
        self == Self::AIR
    }

    /// Index into dense per-type tables.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The draw pass a block's faces are emitted into.
///
/// Each renderable chunk keeps one vertex buffer per layer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RenderLayer {
    /// Opaque cubes, drawn with mipmapped textures
    Solid = 0,
    /// Opaque geometry whose textures must not be mipmapped
    NoMipMap = 1,
    /// Alpha-tested plants and similar cut-out geometry
    Flora = 2,
    /// Translucent fluids, drawn last
    Liquid = 3,
}

impl RenderLayer {
    /// Number of render layers.
    pub const COUNT: usize = 4;

    /// All layers in draw order.
    pub fn all() -> [RenderLayer; Self::COUNT] {
        [
            RenderLayer::Solid,
            RenderLayer::NoMipMap,
            RenderLayer::Flora,
            RenderLayer::Liquid,
        ]
    }

    /// Index into per-layer arrays.
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Texture indices for each face of a block.
///
/// Indexed by `BlockSide` as a `usize`, in the order
/// [Front, Back, Bottom, Top, Left, Right].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TilesDef {
    pub textures: [u32; 6],
}

impl TilesDef {
    /// Same texture on every face.
    pub fn uniform(texture: u32) -> Self {
        Self {
            textures: [texture; 6],
        }
    }

    /// Distinct top and bottom textures with a shared texture on the four sides.
    pub fn top_bottom_sides(top: u32, bottom: u32, sides: u32) -> Self {
        let mut textures = [sides; 6];
        textures[BlockSide::TOP as usize] = top;
        textures[BlockSide::BOTTOM as usize] = bottom;
        Self { textures }
    }

    /// Texture index for the given face.
    pub fn texture_for(&self, side: BlockSide) -> u32 {
        self.textures[side as usize]
    }
}

/// Immutable definition of one voxel kind.
///
/// Block types are created by the content stage through
/// [`BlockRegistry::register_block`](registry::BlockRegistry::register_block) and never change
/// afterwards. Behaviour lives in a separate
/// [`BlockBehaviorBinding`](behavior::BlockBehaviorBinding) so that it can be swapped at runtime
/// without touching the shared type table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockType {
    id: BlockId,
    tiles: TilesDef,
    name: String,
    label: String,
    render_layer: RenderLayer,
    opaque: bool,
}

impl BlockType {
    pub(crate) fn new(
        id: BlockId,
        tiles: TilesDef,
        name: &str,
        label: &str,
        render_layer: RenderLayer,
        opaque: bool,
    ) -> Self {
        Self {
            id,
            tiles,
            name: name.to_string(),
            label: label.to_string(),
            render_layer,
            opaque,
        }
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn tiles(&self) -> &TilesDef {
        &self.tiles
    }

    /// Stable internal key, e.g. `"default:torch"`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable display name.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn render_layer(&self) -> RenderLayer {
        self.render_layer
    }

    /// Whether the block fully hides the faces of its neighbours.
    pub fn is_opaque(&self) -> bool {
        self.opaque
    }
}

/// Definition supplied by the content stage when registering a block type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDefinition {
    pub name: String,
    pub label: String,
    pub tiles: TilesDef,
    #[serde(default = "BlockDefinition::default_layer")]
    pub render_layer: RenderLayer,
    #[serde(default = "BlockDefinition::default_opaque")]
    pub opaque: bool,
}

impl BlockDefinition {
    /// An opaque, solid-layer cube with the given tiles.
    pub fn solid(name: &str, label: &str, tiles: TilesDef) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            tiles,
            render_layer: RenderLayer::Solid,
            opaque: true,
        }
    }

    /// Moves the block into another render layer. Anything outside the solid layer is treated as
    /// see-through for face culling.
    pub fn with_layer(mut self, render_layer: RenderLayer) -> Self {
        self.render_layer = render_layer;
        self.opaque = render_layer == RenderLayer::Solid;
        self
    }

    fn default_layer() -> RenderLayer {
        RenderLayer::Solid
    }

    fn default_opaque() -> bool {
        true
    }
}

/// Dense table of every registered block type, indexed by [`BlockId`].
///
/// Shared read-only with meshing workers behind an `Arc`.
#[derive(Clone, Debug, Default)]
pub struct BlockTypeTable {
    types: Vec<BlockType>,
}

impl BlockTypeTable {
    pub fn get(&self, id: BlockId) -> Option<&BlockType> {
        self.types.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BlockType> {
        self.types.iter()
    }

    /// Whether the cell hides the faces of its neighbours. Unknown ids do not.
    pub fn is_opaque(&self, id: BlockId) -> bool {
        self.get(id).is_some_and(BlockType::is_opaque)
    }

    pub(crate) fn push(&mut self, block_type: BlockType) {
        self.types.push(block_type);
    }
}
