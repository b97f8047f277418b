//! Binary wire protocol shared by the server and its clients
//!
//! Every packet starts with a 4 byte header:
//!
//! ```text
//! +--------+---------+----------------+
//! | type u8| ver u8  | size u16 (BE)  |
//! +--------+---------+----------------+
//! ```
//!
//! `size` is the total length of header plus payload. Payloads are packed,
//! fixed-size records except for snapshots, which carry a tick, an entity
//! count and `count` fixed-size entity records.
//!
//! Decoding never panics: anything that does not match the layout exactly is
//! reported as a [`ProtocolError`] so the receive loop can drop it and move on.

use crate::wire::{WireReader, WireWriter};
use thiserror::Error;

/// Protocol version stamped into every header
pub const PROTOCOL_VERSION: u8 = 1;
/// Size of the common packet header in bytes
pub const HEADER_SIZE: usize = 4;
/// Header + tick + entity count
pub const SNAPSHOT_PREFIX_SIZE: usize = HEADER_SIZE + 4 + 2;
/// Largest datagram the server reads or writes
pub const MAX_DATAGRAM_SIZE: usize = 2048;
/// Entity records that fit in one snapshot datagram
pub const MAX_SNAPSHOT_ENTITIES: usize =
    (MAX_DATAGRAM_SIZE - SNAPSHOT_PREFIX_SIZE) / SnapshotEntity::WIRE_SIZE;

/// Closed set of packet kinds understood on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Connect = 0x01,
    Disconnect = 0x02,
    Input = 0x03,
    Ping = 0x04,
    Accept = 0x10,
    Reject = 0x11,
    Snapshot = 0x12,
    EntityCreate = 0x13,
    EntityDestroy = 0x14,
    Pong = 0x15,
    DamageEvent = 0x16,
    GameOver = 0x17,
}

impl PacketType {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Total encoded size for fixed-layout packets, `None` for snapshots.
    pub fn fixed_size(self) -> Option<usize> {
        let payload = match self {
            PacketType::Disconnect
            | PacketType::Ping
            | PacketType::Reject
            | PacketType::Pong
            | PacketType::GameOver => 0,
            PacketType::Connect | PacketType::Accept | PacketType::EntityDestroy => 4,
            PacketType::Input => 4 + 4 + 4 + 1,
            PacketType::EntityCreate => 4 + 4 + 4 + 2,
            PacketType::DamageEvent => 4 + 2,
            PacketType::Snapshot => return None,
        };
        Some(HEADER_SIZE + payload)
    }

    /// Packets a client is allowed to send to the server
    pub fn is_client_to_server(self) -> bool {
        matches!(
            self,
            PacketType::Connect | PacketType::Disconnect | PacketType::Input | PacketType::Ping
        )
    }
}

impl TryFrom<u8> for PacketType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x01 => PacketType::Connect,
            0x02 => PacketType::Disconnect,
            0x03 => PacketType::Input,
            0x04 => PacketType::Ping,
            0x10 => PacketType::Accept,
            0x11 => PacketType::Reject,
            0x12 => PacketType::Snapshot,
            0x13 => PacketType::EntityCreate,
            0x14 => PacketType::EntityDestroy,
            0x15 => PacketType::Pong,
            0x16 => PacketType::DamageEvent,
            0x17 => PacketType::GameOver,
            other => return Err(ProtocolError::UnknownType(other)),
        })
    }
}

/// Reasons a buffer is rejected by the decoder or encoder
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Truncated buffer: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },
    #[error("Unknown packet type 0x{0:02X}")]
    UnknownType(u8),
    #[error("Unsupported protocol version {found} (expected {expected})")]
    VersionMismatch { found: u8, expected: u8 },
    #[error("Declared size {declared} exceeds the {received} bytes received")]
    SizeExceedsDatagram { declared: usize, received: usize },
    #[error("{kind:?} packet declares {declared} bytes but its layout needs {expected}")]
    SizeMismatch {
        kind: PacketType,
        declared: usize,
        expected: usize,
    },
    #[error("Payload too large to encode: {0} bytes")]
    PayloadTooLarge(usize),
}

/// Common header at the start of every packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub kind: PacketType,
    pub version: u8,
    pub size: u16,
}

impl PacketHeader {
    /// Parses and validates the header of a received buffer.
    ///
    /// Checks the type against the known enumeration, the version against
    /// [`PROTOCOL_VERSION`] and the declared size against the bytes actually
    /// received.
    pub fn parse(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let mut reader = WireReader::new(bytes);
        let kind = PacketType::try_from(reader.get_u8()?)?;
        let version = reader.get_u8()?;
        let size = reader.get_u16()?;

        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::VersionMismatch {
                found: version,
                expected: PROTOCOL_VERSION,
            });
        }
        if size as usize > bytes.len() {
            return Err(ProtocolError::SizeExceedsDatagram {
                declared: size as usize,
                received: bytes.len(),
            });
        }

        Ok(Self {
            kind,
            version,
            size,
        })
    }

    fn write(&self, writer: &mut WireWriter) {
        writer.put_u8(self.kind.as_u8());
        writer.put_u8(self.version);
        writer.put_u16(self.size);
    }
}

/// Movement and fire intent for one controlled entity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputCommand {
    pub entity: u32,
    /// Horizontal axis, expected in -1.0..=1.0
    pub dx: f32,
    /// Vertical axis, expected in -1.0..=1.0
    pub dy: f32,
    pub shooting: bool,
}

/// One entity record inside a snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapshotEntity {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub sprite: u16,
}

impl SnapshotEntity {
    pub const WIRE_SIZE: usize = 4 + 4 * 4 + 2;

    fn write(&self, writer: &mut WireWriter) {
        writer.put_u32(self.id);
        writer.put_f32(self.x);
        writer.put_f32(self.y);
        writer.put_f32(self.vx);
        writer.put_f32(self.vy);
        writer.put_u16(self.sprite);
    }

    fn read(reader: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: reader.get_u32()?,
            x: reader.get_f32()?,
            y: reader.get_f32()?,
            vx: reader.get_f32()?,
            vy: reader.get_f32()?,
            sprite: reader.get_u16()?,
        })
    }
}

/// Decoded packet
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    // Client -> server
    Connect { client_id: u32 },
    Disconnect,
    Input(InputCommand),
    Ping,

    // Server -> client
    Accept { entity: u32 },
    Reject,
    Snapshot {
        tick: u32,
        entities: Vec<SnapshotEntity>,
    },
    EntityCreate { id: u32, x: f32, y: f32, sprite: u16 },
    EntityDestroy { id: u32 },
    Pong,
    DamageEvent { id: u32, amount: u16 },
    GameOver,
}

impl Packet {
    pub fn kind(&self) -> PacketType {
        match self {
            Packet::Connect { .. } => PacketType::Connect,
            Packet::Disconnect => PacketType::Disconnect,
            Packet::Input(_) => PacketType::Input,
            Packet::Ping => PacketType::Ping,
            Packet::Accept { .. } => PacketType::Accept,
            Packet::Reject => PacketType::Reject,
            Packet::Snapshot { .. } => PacketType::Snapshot,
            Packet::EntityCreate { .. } => PacketType::EntityCreate,
            Packet::EntityDestroy { .. } => PacketType::EntityDestroy,
            Packet::Pong => PacketType::Pong,
            Packet::DamageEvent { .. } => PacketType::DamageEvent,
            Packet::GameOver => PacketType::GameOver,
        }
    }

    /// Number of bytes [`Packet::encode`] produces
    pub fn encoded_len(&self) -> usize {
        match self {
            Packet::Snapshot { entities, .. } => {
                SNAPSHOT_PREFIX_SIZE + entities.len() * SnapshotEntity::WIRE_SIZE
            }
            other => other.kind().fixed_size().unwrap_or(HEADER_SIZE),
        }
    }

    /// Serializes the packet into its exact wire layout.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let len = self.encoded_len();
        let size = u16::try_from(len).map_err(|_| ProtocolError::PayloadTooLarge(len))?;

        let mut writer = WireWriter::with_capacity(len);
        PacketHeader {
            kind: self.kind(),
            version: PROTOCOL_VERSION,
            size,
        }
        .write(&mut writer);

        match self {
            Packet::Connect { client_id } => writer.put_u32(*client_id),
            Packet::Input(input) => {
                writer.put_u32(input.entity);
                writer.put_f32(input.dx);
                writer.put_f32(input.dy);
                writer.put_u8(u8::from(input.shooting));
            }
            Packet::Accept { entity } => writer.put_u32(*entity),
            Packet::Snapshot { tick, entities } => {
                let count = u16::try_from(entities.len())
                    .map_err(|_| ProtocolError::PayloadTooLarge(len))?;
                writer.put_u32(*tick);
                writer.put_u16(count);
                for entity in entities {
                    entity.write(&mut writer);
                }
            }
            Packet::EntityCreate { id, x, y, sprite } => {
                writer.put_u32(*id);
                writer.put_f32(*x);
                writer.put_f32(*y);
                writer.put_u16(*sprite);
            }
            Packet::EntityDestroy { id } => writer.put_u32(*id),
            Packet::DamageEvent { id, amount } => {
                writer.put_u32(*id);
                writer.put_u16(*amount);
            }
            Packet::Disconnect
            | Packet::Ping
            | Packet::Reject
            | Packet::Pong
            | Packet::GameOver => {}
        }

        debug_assert_eq!(writer.len(), len);
        Ok(writer.into_bytes())
    }

    /// Parses a received buffer.
    ///
    /// Only the first `size` bytes declared by the header are interpreted;
    /// anything after them is ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let header = PacketHeader::parse(bytes)?;
        let declared = header.size as usize;
        let body = &bytes[..declared];

        if let Some(expected) = header.kind.fixed_size() {
            if declared != expected {
                return Err(ProtocolError::SizeMismatch {
                    kind: header.kind,
                    declared,
                    expected,
                });
            }
        } else if declared < SNAPSHOT_PREFIX_SIZE {
            return Err(ProtocolError::SizeMismatch {
                kind: header.kind,
                declared,
                expected: SNAPSHOT_PREFIX_SIZE,
            });
        }

        let mut reader = WireReader::new(&body[HEADER_SIZE..]);
        let packet = match header.kind {
            PacketType::Connect => Packet::Connect {
                client_id: reader.get_u32()?,
            },
            PacketType::Disconnect => Packet::Disconnect,
            PacketType::Input => Packet::Input(InputCommand {
                entity: reader.get_u32()?,
                dx: reader.get_f32()?,
                dy: reader.get_f32()?,
                shooting: reader.get_u8()? != 0,
            }),
            PacketType::Ping => Packet::Ping,
            PacketType::Accept => Packet::Accept {
                entity: reader.get_u32()?,
            },
            PacketType::Reject => Packet::Reject,
            PacketType::Snapshot => {
                let tick = reader.get_u32()?;
                let count = reader.get_u16()? as usize;
                let expected = SNAPSHOT_PREFIX_SIZE + count * SnapshotEntity::WIRE_SIZE;
                if declared != expected {
                    return Err(ProtocolError::SizeMismatch {
                        kind: header.kind,
                        declared,
                        expected,
                    });
                }
                let mut entities = Vec::with_capacity(count);
                for _ in 0..count {
                    entities.push(SnapshotEntity::read(&mut reader)?);
                }
                Packet::Snapshot { tick, entities }
            }
            PacketType::EntityCreate => Packet::EntityCreate {
                id: reader.get_u32()?,
                x: reader.get_f32()?,
                y: reader.get_f32()?,
                sprite: reader.get_u16()?,
            },
            PacketType::EntityDestroy => Packet::EntityDestroy {
                id: reader.get_u32()?,
            },
            PacketType::Pong => Packet::Pong,
            PacketType::DamageEvent => Packet::DamageEvent {
                id: reader.get_u32()?,
                amount: reader.get_u16()?,
            },
            PacketType::GameOver => Packet::GameOver,
        };

        Ok(packet)
    }
}

/// Splits entity records into as many snapshot packets as needed to keep
/// every datagram within [`MAX_DATAGRAM_SIZE`]. Always yields at least one
/// packet so clients still see the tick advance when the world is empty.
pub fn snapshot_packets(tick: u32, entities: &[SnapshotEntity]) -> Vec<Packet> {
    if entities.is_empty() {
        return vec![Packet::Snapshot {
            tick,
            entities: Vec::new(),
        }];
    }

    entities
        .chunks(MAX_SNAPSHOT_ENTITIES)
        .map(|chunk| Packet::Snapshot {
            tick,
            entities: chunk.to_vec(),
        })
        .collect()
}
