//! Configurable limits for bounded decoding.

use crate::message::MAX_SNAPSHOT_PARTS;

/// Wire-level limits for snapshot message decoding.
///
/// These bound what a remote peer can make us allocate. Item store limits
/// belong to `codec`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireLimits {
    /// Maximum size of one framed message in bytes.
    pub max_message_bytes: usize,

    /// Maximum size of a reassembled or decompressed snapshot payload.
    pub max_snapshot_bytes: usize,

    /// Maximum number of parts a snapshot may be split into.
    pub max_parts: usize,
}

impl Default for WireLimits {
    fn default() -> Self {
        Self {
            // One part plus framing overhead.
            max_message_bytes: 1400,
            max_snapshot_bytes: 64 * 1024,
            max_parts: MAX_SNAPSHOT_PARTS,
        }
    }
}

impl WireLimits {
    /// Creates limits suitable for testing with smaller values.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            max_message_bytes: 256,
            max_snapshot_bytes: 4096,
            max_parts: 8,
        }
    }

    /// Creates limits with no restrictions (use with caution).
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_message_bytes: usize::MAX,
            max_snapshot_bytes: usize::MAX,
            max_parts: usize::MAX,
        }
    }
}
