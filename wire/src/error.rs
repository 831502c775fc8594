//! Error types for wire operations.

use std::fmt;

/// Result type for wire operations.
pub type WireResult<T> = Result<T, WireError>;

/// Errors raised while reading or writing wire data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum WireError {
    /// Input ended before a complete value could be read.
    #[error("unexpected end of input: need {needed} bytes, have {available}")]
    UnexpectedEof { needed: usize, available: usize },

    /// Output buffer cannot hold the value being written.
    #[error("output too small: need {needed} bytes, have {available}")]
    OutputTooSmall { needed: usize, available: usize },

    /// A variable-length integer used more than the permitted bytes.
    #[error("invalid varint: more than {max_bytes} bytes")]
    InvalidVarInt { max_bytes: usize },

    /// Input length is not a multiple of the word size.
    #[error("length {len} is not a multiple of {word_size}")]
    UnalignedLength { len: usize, word_size: usize },

    /// Unknown message id byte.
    #[error("unknown message id {id}")]
    UnknownMessage { id: u8 },

    /// A length or count field was negative.
    #[error("negative {field}: {value}")]
    NegativeField { field: &'static str, value: i32 },

    /// Part index is outside the announced part count.
    #[error("part {part} out of range for {num_parts} parts")]
    PartOutOfRange { part: i32, num_parts: i32 },

    /// Message bytes remained after the last field.
    #[error("{remaining} trailing bytes after message")]
    TrailingBytes { remaining: usize },

    /// Limits exceeded.
    #[error("{kind} limit exceeded: {actual} > {limit}")]
    LimitsExceeded {
        kind: LimitKind,
        limit: usize,
        actual: usize,
    },
}

/// Specific wire limits that can be exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    MessageBytes,
    SnapshotBytes,
    Parts,
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MessageBytes => "message bytes",
            Self::SnapshotBytes => "snapshot bytes",
            Self::Parts => "snapshot parts",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_unexpected_eof() {
        let err = WireError::UnexpectedEof {
            needed: 4,
            available: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains('4'));
        assert!(msg.contains('1'));
    }

    #[test]
    fn display_limits_exceeded() {
        let err = WireError::LimitsExceeded {
            kind: LimitKind::Parts,
            limit: 64,
            actual: 65,
        };
        let msg = err.to_string();
        assert!(msg.contains("snapshot parts"));
        assert!(msg.contains("65"));
    }

    #[test]
    fn display_unknown_message() {
        let err = WireError::UnknownMessage { id: 0xEE };
        assert!(err.to_string().contains("238"));
    }

    #[test]
    fn error_is_std_error() {
        fn assert_error<E: std::error::Error>() {}
        assert_error::<WireError>();
    }
}
