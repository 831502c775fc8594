//! Error types for codec operations.

use std::fmt;

use crate::types::{ItemKey, SnapshotTick};

/// Result type for item store validation and serialization.
pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Result type for snapshot building.
pub type BuildResult<T> = Result<T, BuildError>;

/// Result type for delta encoding and decoding.
pub type DeltaResult<T> = Result<T, DeltaError>;

/// Which store capacity a write or read ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityKind {
    DataBytes,
    Items,
}

impl fmt::Display for CapacityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DataBytes => "data bytes",
            Self::Items => "items",
        };
        write!(f, "{name}")
    }
}

/// Reasons a serialized item store is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum SnapshotError {
    /// Fewer bytes than the fixed header.
    #[error("store too short: {actual} bytes, header needs 8")]
    TooShort { actual: usize },

    /// Declared item count is negative.
    #[error("negative item count {value}")]
    NegativeItemCount { value: i32 },

    /// Declared data size is negative.
    #[error("negative data size {value}")]
    NegativeDataSize { value: i32 },

    /// Declared data size is not a whole number of words.
    #[error("data size {data_size} is not word aligned")]
    MisalignedDataSize { data_size: usize },

    /// A header value exceeds the configured limits.
    #[error("{kind} limit exceeded: {actual} > {limit}")]
    LimitsExceeded {
        kind: CapacityKind,
        limit: usize,
        actual: usize,
    },

    /// The buffer length disagrees with the header.
    #[error("store size mismatch: header implies {declared} bytes, got {actual}")]
    SizeMismatch { declared: usize, actual: usize },

    /// An offset points outside the data section.
    #[error("item {index} offset {offset} outside data section of {data_size} bytes")]
    OffsetOutOfRange {
        index: usize,
        offset: i32,
        data_size: usize,
    },

    /// An offset is not word aligned.
    #[error("item {index} offset {offset} is not word aligned")]
    MisalignedOffset { index: usize, offset: i32 },

    /// Offsets leave no room for an item header.
    #[error("item {index} has negative payload size {size}")]
    NegativeItemSize { index: usize, size: i64 },

    /// Output buffer is too small.
    #[error("output too small: need {needed} bytes, have {available}")]
    OutputTooSmall { needed: usize, available: usize },
}

/// Reasons the builder refuses an item.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum BuildError {
    /// The caller passed the "no id" sentinel.
    #[error("item id was never allocated")]
    NoId,

    /// Id outside `0..=MAX_ID`.
    #[error("item id {id} out of range")]
    IdOutOfRange { id: i32 },

    /// Native type outside the usable range.
    #[error("item type {type_id} out of range")]
    TypeOutOfRange { type_id: u16 },

    /// Payload size is not a whole number of words.
    #[error("item size {size} is not word aligned")]
    UnalignedSize { size: usize },

    /// An item with this key is already staged.
    #[error("item {key:?} already staged")]
    DuplicateKey { key: ItemKey },

    /// The store would exceed its limits.
    #[error("{kind} capacity exceeded: {actual} > {limit}")]
    CapacityExceeded {
        kind: CapacityKind,
        limit: usize,
        actual: usize,
    },

    /// Native type has no equivalent under the variant numbering.
    #[error("type {native} has no variant equivalent")]
    NoVariantEquivalent { native: u16 },

    /// Variant-only type used under the native numbering.
    #[error("variant-only type {type_id} used with native numbering")]
    VariantOnlyType { type_id: u16 },

    /// Extended type is not registered.
    #[error("extended type {index} is not registered")]
    UnknownExtendedType { index: u16 },

    /// More distinct extended types than the builder can track.
    #[error("too many extended types (limit {limit})")]
    TooManyExtendedTypes { limit: usize },

    /// Output buffer is too small.
    #[error("output too small: need {needed} bytes, have {available}")]
    OutputTooSmall { needed: usize, available: usize },
}

/// Section of a delta being parsed when it ended early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaSection {
    Header,
    DeletedKeys,
    UpdateHeader,
    UpdatePayload,
}

impl fmt::Display for DeltaSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Header => "header",
            Self::DeletedKeys => "deleted keys",
            Self::UpdateHeader => "update header",
            Self::UpdatePayload => "update payload",
        };
        write!(f, "{name}")
    }
}

/// Reasons delta creation or application fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum DeltaError {
    /// Delta bytes are not a whole number of words.
    #[error("delta length {len} is not word aligned")]
    UnalignedLength { len: usize },

    /// Input ended inside a section.
    #[error("delta truncated in {section}")]
    Truncated { section: DeltaSection },

    /// A header count is negative.
    #[error("negative {field}: {value}")]
    NegativeCount { field: &'static str, value: i32 },

    /// Update type outside `0..=MAX_TYPE`.
    #[error("update type {type_id} out of range")]
    TypeOutOfRange { type_id: i32 },

    /// Update id outside `0..=MAX_ID`.
    #[error("update id {id} out of range")]
    IdOutOfRange { id: i32 },

    /// Update payload size negative or above the store limit.
    #[error("invalid update size {size}")]
    InvalidSize { size: i32 },

    /// Words remained after the last update.
    #[error("{remaining} trailing bytes after delta")]
    TrailingData { remaining: usize },

    /// A deleted key is not present in the base store.
    #[error("deleted key {key:?} not in base")]
    UnknownDeletedKey { key: ItemKey },

    /// The same key is updated twice.
    #[error("duplicate update for {key:?}")]
    DuplicateUpdate { key: ItemKey },

    /// An item does not match the statically agreed size for its type.
    #[error("item {key:?} has size {actual}, static size is {expected}")]
    StaticSizeMismatch {
        key: ItemKey,
        expected: usize,
        actual: usize,
    },

    /// Reconstructed store would exceed its limits.
    #[error("unpacked store exceeds capacity: {0}")]
    Capacity(#[from] BuildError),

    /// Output buffer is too small.
    #[error("output too small: need {needed} bytes, have {available}")]
    OutputTooSmall { needed: usize, available: usize },
}

/// Errors raised by the history ring.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    /// Ticks must be strictly increasing.
    #[error("tick {tick:?} is not after last stored tick {last:?}")]
    OutOfOrder {
        last: SnapshotTick,
        tick: SnapshotTick,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_error_display() {
        let err = SnapshotError::SizeMismatch {
            declared: 40,
            actual: 36,
        };
        let msg = err.to_string();
        assert!(msg.contains("40"), "should mention declared size");
        assert!(msg.contains("36"), "should mention actual size");
    }

    #[test]
    fn build_error_capacity_display() {
        let err = BuildError::CapacityExceeded {
            kind: CapacityKind::Items,
            limit: 8,
            actual: 9,
        };
        let msg = err.to_string();
        assert!(msg.contains("items"));
        assert!(msg.contains('8'));
        assert!(msg.contains('9'));
    }

    #[test]
    fn delta_error_truncated_names_section() {
        let err = DeltaError::Truncated {
            section: DeltaSection::UpdatePayload,
        };
        assert!(err.to_string().contains("update payload"));
    }

    #[test]
    fn delta_error_wraps_capacity() {
        let err: DeltaError = BuildError::CapacityExceeded {
            kind: CapacityKind::DataBytes,
            limit: 256,
            actual: 300,
        }
        .into();
        assert!(matches!(err, DeltaError::Capacity(_)));
        assert!(err.to_string().contains("data bytes"));
    }

    #[test]
    fn history_error_display() {
        let err = HistoryError::OutOfOrder {
            last: SnapshotTick::new(5),
            tick: SnapshotTick::new(3),
        };
        let msg = err.to_string();
        assert!(msg.contains('5'));
        assert!(msg.contains('3'));
    }
}
