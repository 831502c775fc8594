//! Snapshot message framing.
//!
//! Every tick a peer receives exactly one of three messages: an empty marker
//! when nothing changed since the acknowledged base, a single message holding
//! the whole delta, or a run of numbered parts when the delta is larger than
//! one message payload.

use crate::error::{LimitKind, WireError, WireResult};
use crate::limits::WireLimits;
use crate::varint::VarInt;

/// Largest delta chunk carried by one message, in bytes.
pub const MAX_SNAPSHOT_PACKSIZE: usize = 900;

/// Largest number of parts a snapshot may be split into.
pub const MAX_SNAPSHOT_PARTS: usize = 64;

/// Message id byte leading every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageId {
    Snap = 5,
    SnapEmpty = 6,
    SnapSingle = 7,
}

impl MessageId {
    /// Parses a message id from a raw byte.
    pub fn parse(id: u8) -> WireResult<Self> {
        match id {
            5 => Ok(Self::Snap),
            6 => Ok(Self::SnapEmpty),
            7 => Ok(Self::SnapSingle),
            _ => Err(WireError::UnknownMessage { id }),
        }
    }
}

/// A decoded snapshot message.
///
/// `delta_tick` is the distance from `tick` back to the delta base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapMessage {
    Empty {
        tick: i32,
        delta_tick: i32,
    },
    Single {
        tick: i32,
        delta_tick: i32,
        crc: u32,
        data: Vec<u8>,
    },
    Part {
        tick: i32,
        delta_tick: i32,
        num_parts: i32,
        part: i32,
        crc: u32,
        data: Vec<u8>,
    },
}

impl SnapMessage {
    /// Returns the message id used on the wire.
    #[must_use]
    pub const fn id(&self) -> MessageId {
        match self {
            Self::Empty { .. } => MessageId::SnapEmpty,
            Self::Single { .. } => MessageId::SnapSingle,
            Self::Part { .. } => MessageId::Snap,
        }
    }

    /// Returns the tick this message describes.
    #[must_use]
    pub const fn tick(&self) -> i32 {
        match self {
            Self::Empty { tick, .. } | Self::Single { tick, .. } | Self::Part { tick, .. } => *tick,
        }
    }

    /// Returns the distance back to the delta base.
    #[must_use]
    pub const fn delta_tick(&self) -> i32 {
        match self {
            Self::Empty { delta_tick, .. }
            | Self::Single { delta_tick, .. }
            | Self::Part { delta_tick, .. } => *delta_tick,
        }
    }
}

/// Splits an encoded delta into the messages for one tick.
///
/// An empty `data` slice yields a single [`SnapMessage::Empty`].
pub fn chunk_snapshot(
    tick: i32,
    delta_tick: i32,
    crc: u32,
    data: &[u8],
    max_pack_size: usize,
) -> WireResult<Vec<SnapMessage>> {
    if data.is_empty() {
        return Ok(vec![SnapMessage::Empty { tick, delta_tick }]);
    }
    let max_pack_size = max_pack_size.max(1);
    let num_parts = data.len().div_ceil(max_pack_size);
    if num_parts > MAX_SNAPSHOT_PARTS {
        return Err(WireError::LimitsExceeded {
            kind: LimitKind::Parts,
            limit: MAX_SNAPSHOT_PARTS,
            actual: num_parts,
        });
    }
    if num_parts == 1 {
        return Ok(vec![SnapMessage::Single {
            tick,
            delta_tick,
            crc,
            data: data.to_vec(),
        }]);
    }

    // Bounded by MAX_SNAPSHOT_PARTS above.
    let total = num_parts as i32;
    Ok(data
        .chunks(max_pack_size)
        .zip(0..)
        .map(|(chunk, part)| SnapMessage::Part {
            tick,
            delta_tick,
            num_parts: total,
            part,
            crc,
            data: chunk.to_vec(),
        })
        .collect())
}

/// Appends the framed form of `message` to `out`.
pub fn encode_message(message: &SnapMessage, out: &mut Vec<u8>) {
    out.push(message.id() as u8);
    match message {
        SnapMessage::Empty { tick, delta_tick } => {
            VarInt::pack(*tick, out);
            VarInt::pack(*delta_tick, out);
        }
        SnapMessage::Single {
            tick,
            delta_tick,
            crc,
            data,
        } => {
            VarInt::pack(*tick, out);
            VarInt::pack(*delta_tick, out);
            VarInt::pack(*crc as i32, out);
            write_chunk(data, out);
        }
        SnapMessage::Part {
            tick,
            delta_tick,
            num_parts,
            part,
            crc,
            data,
        } => {
            VarInt::pack(*tick, out);
            VarInt::pack(*delta_tick, out);
            VarInt::pack(*num_parts, out);
            VarInt::pack(*part, out);
            VarInt::pack(*crc as i32, out);
            write_chunk(data, out);
        }
    }
}

/// Decodes one framed message.
pub fn decode_message(frame: &[u8], limits: &WireLimits) -> WireResult<SnapMessage> {
    if frame.len() > limits.max_message_bytes {
        return Err(WireError::LimitsExceeded {
            kind: LimitKind::MessageBytes,
            limit: limits.max_message_bytes,
            actual: frame.len(),
        });
    }
    let (&id, body) = frame.split_first().ok_or(WireError::UnexpectedEof {
        needed: 1,
        available: 0,
    })?;
    let mut reader = FieldReader { body, pos: 0 };

    let message = match MessageId::parse(id)? {
        MessageId::SnapEmpty => SnapMessage::Empty {
            tick: reader.int()?,
            delta_tick: reader.int()?,
        },
        MessageId::SnapSingle => SnapMessage::Single {
            tick: reader.int()?,
            delta_tick: reader.int()?,
            crc: reader.int()? as u32,
            data: reader.chunk()?.to_vec(),
        },
        MessageId::Snap => {
            let tick = reader.int()?;
            let delta_tick = reader.int()?;
            let num_parts = reader.int()?;
            let part = reader.int()?;
            if num_parts <= 0 {
                return Err(WireError::NegativeField {
                    field: "part count",
                    value: num_parts,
                });
            }
            if num_parts as usize > limits.max_parts {
                return Err(WireError::LimitsExceeded {
                    kind: LimitKind::Parts,
                    limit: limits.max_parts,
                    actual: num_parts as usize,
                });
            }
            if part < 0 || part >= num_parts {
                return Err(WireError::PartOutOfRange { part, num_parts });
            }
            SnapMessage::Part {
                tick,
                delta_tick,
                num_parts,
                part,
                crc: reader.int()? as u32,
                data: reader.chunk()?.to_vec(),
            }
        }
    };

    if reader.pos != body.len() {
        return Err(WireError::TrailingBytes {
            remaining: body.len() - reader.pos,
        });
    }
    Ok(message)
}

fn write_chunk(data: &[u8], out: &mut Vec<u8>) {
    // Chunks are cut to MAX_SNAPSHOT_PACKSIZE by the sender.
    VarInt::pack(i32::try_from(data.len()).unwrap_or(i32::MAX), out);
    out.extend_from_slice(data);
}

struct FieldReader<'a> {
    body: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    fn int(&mut self) -> WireResult<i32> {
        let (value, used) = VarInt::unpack(&self.body[self.pos..])?;
        self.pos += used;
        Ok(value)
    }

    fn chunk(&mut self) -> WireResult<&'a [u8]> {
        let len = self.int()?;
        let len = usize::try_from(len).map_err(|_| WireError::NegativeField {
            field: "chunk length",
            value: len,
        })?;
        let available = self.body.len() - self.pos;
        if len > available {
            return Err(WireError::UnexpectedEof {
                needed: len,
                available,
            });
        }
        let chunk = &self.body[self.pos..self.pos + len];
        self.pos += len;
        Ok(chunk)
    }
}
