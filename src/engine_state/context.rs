//! # Context Module
//!
//! The world/server/client boundary handed to behaviour handlers. The engine only needs to read
//! and write through these types; networking and UI sit behind the two traits.

use std::collections::HashMap;

use cgmath::Point3;

use super::voxels::block::{BlockId, BlockType};
use super::voxels::chunk::chunk_position_of;

/// Identifier of a connected player.
pub type PlayerId = u16;

/// Players currently in the world, by id.
pub type PlayerList = HashMap<PlayerId, Player>;

/// A connected player.
#[derive(Clone, Debug, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    /// Position in world block space.
    pub position: Point3<f32>,
}

impl Player {
    pub fn new(id: PlayerId, name: &str, position: Point3<f32>) -> Self {
        Self {
            id,
            name: name.to_string(),
            position,
        }
    }

    /// World block containing the player.
    pub fn block_position(&self) -> Point3<i32> {
        Point3::new(
            self.position.x.floor() as i32,
            self.position.y.floor() as i32,
            self.position.z.floor() as i32,
        )
    }

    /// Chunk containing the player.
    pub fn chunk_position(&self) -> Point3<i32> {
        chunk_position_of(self.block_position())
    }
}

/// Chebyshev distance between two chunk positions, in chunks.
pub fn chunk_distance(a: Point3<i32>, b: Point3<i32>) -> i32 {
    (a.x - b.x).abs().max((a.y - b.y).abs()).max((a.z - b.z).abs())
}

/// Server-side services available to tick handlers.
pub trait ServerContext {
    /// Notifies clients that a block changed.
    fn send_block_update(&mut self, position: Point3<i32>, block: BlockId);

    /// Sends a chat line to every player.
    fn broadcast_message(&mut self, message: &str);
}

/// Client-side services available to activation handlers and the default activation path.
pub trait ClientContext {
    /// The engine's default reaction to activating a block, e.g. opening its container UI.
    fn open_default_interface(&mut self, position: Point3<i32>, block_type: &BlockType);

    /// Shows a message to the local player.
    fn show_message(&mut self, message: &str);
}

/// [`ServerContext`] that only remembers what was asked of it.
#[derive(Debug, Default)]
pub struct RecordingServer {
    pub block_updates: Vec<(Point3<i32>, BlockId)>,
    pub messages: Vec<String>,
}

impl ServerContext for RecordingServer {
    fn send_block_update(&mut self, position: Point3<i32>, block: BlockId) {
        self.block_updates.push((position, block));
    }

    fn broadcast_message(&mut self, message: &str) {
        log::info!("[server] {}", message);
        self.messages.push(message.to_string());
    }
}

/// [`ClientContext`] that only remembers what was asked of it.
#[derive(Debug, Default)]
pub struct RecordingClient {
    pub opened_interfaces: Vec<(Point3<i32>, BlockId)>,
    pub messages: Vec<String>,
}

impl ClientContext for RecordingClient {
    fn open_default_interface(&mut self, position: Point3<i32>, block_type: &BlockType) {
        log::debug!("Opening default interface of '{}' at {:?}", block_type.name(), position);
        self.opened_interfaces.push((position, block_type.id()));
    }

    fn show_message(&mut self, message: &str) {
        self.messages.push(message.to_string());
    }
}
