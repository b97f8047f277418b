//! Types and constants shared by the server and its clients
//!
//! The [`protocol`] module defines the binary packet layout and the
//! [`wire`] module the big-endian field helpers it is built on. Gameplay
//! constants live here so both ends agree on the size of the world and on
//! what each sprite id means.

pub mod protocol;
pub mod wire;

pub use protocol::{
    snapshot_packets, InputCommand, Packet, PacketHeader, PacketType, ProtocolError,
    SnapshotEntity, HEADER_SIZE, MAX_DATAGRAM_SIZE, MAX_SNAPSHOT_ENTITIES, PROTOCOL_VERSION,
};

pub const WORLD_WIDTH: f32 = 1920.0;
pub const WORLD_HEIGHT: f32 = 1080.0;

pub const PLAYER_SIZE: f32 = 32.0;
pub const PLAYER_SPEED: f32 = 300.0;
pub const PLAYER_MAX_HP: i32 = 100;

pub const ENEMY_SIZE: f32 = 48.0;
pub const ENEMY_SPEED: f32 = 120.0;
pub const ENEMY_MAX_HP: i32 = 30;

pub const PROJECTILE_SIZE: f32 = 8.0;
pub const PROJECTILE_SPEED: f32 = 700.0;

/// Sprite ids carried in snapshots and entity-create packets
pub mod sprite {
    pub const PLAYER: u16 = 1;
    pub const ENEMY: u16 = 2;
    pub const PLAYER_SHOT: u16 = 3;
    pub const ENEMY_SHOT: u16 = 4;
}
