//! Protocol constants and item store limits.

/// Largest internal item type.
pub const MAX_TYPE: u16 = 0x7FFF;

/// Largest item id.
pub const MAX_ID: u16 = 0xFFFF;

/// Reserved id meaning "no id was allocated".
pub const NO_ID: i32 = -1;

/// Protocol maximum for the data section of one store, in bytes.
pub const MAX_SIZE: usize = 64 * 1024;

/// Protocol maximum for the number of items in one store.
pub const MAX_ITEMS: usize = 1024;

/// Internal types at or above this value are extended type indirections.
pub const OFFSET_UUID_TYPE: u16 = 0x4000;

/// Types below this value may have a statically agreed size.
pub const MAX_STATIC_SIZES: usize = 64;

/// Maximum number of distinct extended types one builder can track.
pub const MAX_EXTENDED_TYPES: usize = 64;

/// Size of an item header (the key word) in bytes.
pub const ITEM_HEADER_SIZE: usize = 4;

/// Size of the store header (`data_size`, `num_items`) in bytes.
pub const SNAPSHOT_HEADER_SIZE: usize = 8;

/// Limits enforced when building, validating or unpacking item stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotLimits {
    /// Maximum number of bytes in the data section.
    pub max_data_size: usize,
    /// Maximum number of items.
    pub max_items: usize,
}

impl Default for SnapshotLimits {
    fn default() -> Self {
        Self {
            max_data_size: MAX_SIZE,
            max_items: MAX_ITEMS,
        }
    }
}

impl SnapshotLimits {
    /// Creates limits suitable for testing with smaller values.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            max_data_size: 256,
            max_items: 8,
        }
    }

    /// Returns the largest serialized store these limits allow, in bytes.
    #[must_use]
    pub const fn max_total_size(&self) -> usize {
        SNAPSHOT_HEADER_SIZE + self.max_items * 4 + self.max_data_size
    }
}
