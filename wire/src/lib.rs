//! Word framing, varint packing and snapshot message layout for ticksnap.
//!
//! This crate handles the byte-level side of the snapshot protocol: bounded
//! little-endian word access, the variable-length integer format, the
//! optional word-stream compression pass, and the framing of snapshot
//! messages (empty, single, multi-part). It does not know what an item is.
//!
//! # Design Principles
//!
//! - **Bounded decoding** - Every length read from the wire is checked against
//!   the remaining input before it is used.
//! - **Explicit errors** - Malformed input returns a structured [`WireError`],
//!   never a panic.
//! - **No domain knowledge** - Items, stores and deltas live in `codec`.

mod error;
mod limits;
mod message;
mod varint;
mod words;

pub use error::{LimitKind, WireError, WireResult};
pub use limits::WireLimits;
pub use message::{
    chunk_snapshot, decode_message, encode_message, MessageId, SnapMessage, MAX_SNAPSHOT_PACKSIZE,
    MAX_SNAPSHOT_PARTS,
};
pub use varint::{compress, decompress, VarInt};
pub use words::{WordReader, WordWriter, WORD_SIZE};
