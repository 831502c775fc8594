//! Item stores, snapshot building, delta compression and history for ticksnap.
//!
//! This is the main codec crate. It ties `wire` word framing to `schema`
//! type identities and provides the per-tick replication pipeline: build a
//! store, diff it against the last acknowledged store, and rebuild it on the
//! receiving side.
//!
//! # Features
//!
//! - Compact, validated item stores with extended type declarations
//! - Word-wise wraparound deltas with optional statically agreed sizes
//! - Tick-ordered history with age-based purging
//!
//! # Design Principles
//!
//! - **Untrusted input is bounded** - Every count, offset and size read from
//!   the wire is checked before use.
//! - **Explicit state** - The type registry is passed in, and per-call key
//!   indexes are built fresh for each delta.
//! - **Deterministic** - Same inputs produce same outputs.

mod builder;
mod delta;
mod error;
mod history;
mod key_index;
mod limits;
mod snapshot;
mod stats;
mod types;

pub use builder::{Numbering, SnapshotBuilder};
pub use delta::{diff_words, undiff_words, Delta, DeltaEncoder, DeltaItem, DELTA_HEADER_SIZE};
pub use error::{
    BuildError, BuildResult, CapacityKind, DeltaError, DeltaResult, DeltaSection, HistoryError,
    SnapshotError, SnapshotResult,
};
pub use history::{HistoryEntry, SnapshotHistory};
pub use limits::{
    SnapshotLimits, ITEM_HEADER_SIZE, MAX_EXTENDED_TYPES, MAX_ID, MAX_ITEMS, MAX_SIZE,
    MAX_STATIC_SIZES, MAX_TYPE, NO_ID, OFFSET_UUID_TYPE, SNAPSHOT_HEADER_SIZE,
};
pub use snapshot::{Item, Snapshot};
pub use stats::{DeltaStats, TypeStats};
pub use types::{ItemKey, ItemType, SnapshotTick};
