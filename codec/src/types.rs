//! Core types for the codec.

use schema::ExtendedType;

/// A simulation tick number.
///
/// Ticks are monotonically increasing identifiers for simulation states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SnapshotTick(u32);

impl SnapshotTick {
    /// Creates a new snapshot tick.
    #[must_use]
    pub const fn new(tick: u32) -> Self {
        Self(tick)
    }

    /// Returns the raw tick value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns `true` if this tick is zero (often used as "no baseline").
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Returns the tick `ticks` steps earlier, stopping at zero.
    #[must_use]
    pub const fn saturating_sub(self, ticks: u32) -> Self {
        Self(self.0.saturating_sub(ticks))
    }
}

impl From<u32> for SnapshotTick {
    fn from(tick: u32) -> Self {
        Self(tick)
    }
}

impl From<SnapshotTick> for u32 {
    fn from(tick: SnapshotTick) -> Self {
        tick.0
    }
}

/// Composite item key: `(type << 16) | id`.
///
/// Unique within one item store and the sort/lookup key everywhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ItemKey(u32);

impl ItemKey {
    /// Creates a key from an internal type and an id.
    #[must_use]
    pub const fn new(type_id: u16, id: u16) -> Self {
        Self(((type_id as u32) << 16) | id as u32)
    }

    /// Creates a key from its raw wire word.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw key value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns the key as the signed word written on the wire.
    #[must_use]
    pub const fn word(self) -> i32 {
        self.0 as i32
    }

    /// Returns the internal type half of the key.
    #[must_use]
    pub const fn type_id(self) -> u16 {
        (self.0 >> 16) as u16
    }

    /// Returns the instance id half of the key.
    #[must_use]
    pub const fn id(self) -> u16 {
        self.0 as u16
    }
}

/// The type of an item as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemType {
    /// A fixed protocol type, in the native numbering.
    Native(u16),
    /// A type that only exists in the variant numbering and is written as-is.
    VariantOnly(u16),
    /// A type identified through the registry by its stable identifier.
    Extended(ExtendedType),
}
