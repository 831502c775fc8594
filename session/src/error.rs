//! Error types for session operations.

use std::path::PathBuf;

use codec::{BuildError, DeltaError, HistoryError, SnapshotError};
use schema::RegistryError;
use wire::WireError;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors raised while sending or receiving snapshots.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SessionError {
    /// Config file could not be read.
    #[error("failed to read config {path}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config text is not valid TOML for [`SessionConfig`](crate::SessionConfig).
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Config values are out of range.
    #[error("invalid config: {reason}")]
    InvalidConfig { reason: &'static str },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Delta(#[from] DeltaError),

    #[error(transparent)]
    History(#[from] HistoryError),

    /// A message carried a negative tick.
    #[error("invalid tick {tick}")]
    InvalidTick { tick: i32 },

    /// The delta base named by a message is not in the receiver's history.
    #[error("delta base {base} for tick {tick} not found")]
    MissingBase { tick: i32, base: i32 },

    /// The rebuilt store does not match the sender's checksum.
    #[error("crc mismatch at tick {tick}: expected {expected:#010x}, got {actual:#010x}")]
    CrcMismatch {
        tick: i32,
        expected: u32,
        actual: u32,
    },

    /// An id was freed that is not currently allocated.
    #[error("snap id {id} is not allocated")]
    IdNotAllocated { id: u16 },
}
