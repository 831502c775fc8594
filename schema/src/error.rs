//! Registry errors.

use crate::TypeUuid;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors that can occur while building a type registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Two registrations hash to the same identifier.
    #[error("type {name:?} collides with an existing registration ({uuid})")]
    DuplicateType { name: String, uuid: TypeUuid },

    /// The registry has no room for another extended type.
    #[error("too many extended types: limit is {limit}")]
    TooManyTypes { limit: usize },

    /// A native type was given two variant numbers.
    #[error("native type {native} already has a variant mapping")]
    DuplicateVariant { native: u16 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_duplicate_type() {
        let err = RegistryError::DuplicateType {
            name: "flag@example.org".into(),
            uuid: TypeUuid::from_name("flag@example.org"),
        };
        let msg = err.to_string();
        assert!(msg.contains("flag@example.org"));
        assert!(msg.contains("collides"));
    }

    #[test]
    fn display_duplicate_variant() {
        let err = RegistryError::DuplicateVariant { native: 12 };
        assert!(err.to_string().contains("12"));
    }
}
