//! Variable-length integer packing and the word-stream compression pass.
//!
//! The first byte carries an extend bit, a sign bit and six value bits; each
//! following byte carries an extend bit and seven value bits. Negative values
//! are folded (`!x`) before packing so small magnitudes of either sign stay
//! short.

use crate::error::{LimitKind, WireError, WireResult};
use crate::words::WORD_SIZE;

/// Variable-length `i32` encoding.
#[derive(Debug, Clone, Copy)]
pub struct VarInt;

impl VarInt {
    /// Maximum packed size of one value.
    pub const MAX_BYTES: usize = 5;

    const EXTEND: u8 = 0x80;
    const SIGN: u8 = 0x40;

    /// Appends the packed form of `value` to `out`.
    pub fn pack(value: i32, out: &mut Vec<u8>) {
        let sign = if value < 0 { Self::SIGN } else { 0 };
        let mut rest = (value ^ (value >> 31)) as u32;

        let mut byte = sign | (rest & 0x3F) as u8;
        rest >>= 6;
        while rest != 0 {
            out.push(byte | Self::EXTEND);
            byte = (rest & 0x7F) as u8;
            rest >>= 7;
        }
        out.push(byte);
    }

    /// Returns the number of bytes `value` packs into.
    #[must_use]
    pub const fn packed_len(value: i32) -> usize {
        let mut rest = ((value ^ (value >> 31)) as u32) >> 6;
        let mut len = 1;
        while rest != 0 {
            len += 1;
            rest >>= 7;
        }
        len
    }

    /// Unpacks one value, returning it with the number of bytes consumed.
    pub fn unpack(input: &[u8]) -> WireResult<(i32, usize)> {
        let first = *input.first().ok_or(WireError::UnexpectedEof {
            needed: 1,
            available: 0,
        })?;
        let negative = first & Self::SIGN != 0;
        let mut value = u32::from(first & 0x3F);
        let mut used = 1;
        let mut extend = first & Self::EXTEND != 0;
        let mut shift = 6;

        while extend {
            if used == Self::MAX_BYTES {
                return Err(WireError::InvalidVarInt {
                    max_bytes: Self::MAX_BYTES,
                });
            }
            let byte = *input.get(used).ok_or(WireError::UnexpectedEof {
                needed: used + 1,
                available: input.len(),
            })?;
            value |= u32::from(byte & 0x7F) << shift;
            extend = byte & Self::EXTEND != 0;
            shift += 7;
            used += 1;
        }

        let value = value as i32;
        Ok((if negative { !value } else { value }, used))
    }
}

/// Packs a buffer of little-endian words as a stream of [`VarInt`]s.
///
/// This is the optional post-pass applied to encoded deltas before they are
/// split into messages; small diff words shrink to a single byte.
pub fn compress(words: &[u8], out: &mut Vec<u8>) -> WireResult<()> {
    if words.len() % WORD_SIZE != 0 {
        return Err(WireError::UnalignedLength {
            len: words.len(),
            word_size: WORD_SIZE,
        });
    }
    out.clear();
    for chunk in words.chunks_exact(WORD_SIZE) {
        let mut word = [0u8; WORD_SIZE];
        word.copy_from_slice(chunk);
        VarInt::pack(i32::from_le_bytes(word), out);
    }
    Ok(())
}

/// Reverses [`compress`], refusing to produce more than `max_out` bytes.
pub fn decompress(packed: &[u8], out: &mut Vec<u8>, max_out: usize) -> WireResult<()> {
    out.clear();
    let mut pos = 0;
    while pos < packed.len() {
        let (value, used) = VarInt::unpack(&packed[pos..])?;
        pos += used;
        if out.len() + WORD_SIZE > max_out {
            return Err(WireError::LimitsExceeded {
                kind: LimitKind::SnapshotBytes,
                limit: max_out,
                actual: out.len() + WORD_SIZE,
            });
        }
        out.extend_from_slice(&value.to_le_bytes());
    }
    Ok(())
}
