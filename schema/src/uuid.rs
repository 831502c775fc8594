//! 128-bit stable type identifiers.

use std::fmt;

/// Namespace mixed into every name before hashing.
const NAMESPACE: &[u8] = b"ticksnap/item-type/v1";

/// A 128-bit identifier for an extended item type.
///
/// Stores carry it as four big-endian words in a type declaration item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TypeUuid([u8; 16]);

impl TypeUuid {
    /// Number of payload words a declaration item uses for the identifier.
    pub const WORDS: usize = 4;

    /// Creates an identifier from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Derives the identifier for a type name.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(NAMESPACE);
        hasher.update(name.as_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&hash.as_bytes()[..16]);
        Self(bytes)
    }

    /// Returns the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Splits the identifier into the payload words of a declaration item.
    #[must_use]
    pub fn to_words(self) -> [i32; Self::WORDS] {
        let mut words = [0i32; Self::WORDS];
        for (word, chunk) in words.iter_mut().zip(self.0.chunks_exact(4)) {
            *word = i32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        words
    }

    /// Reassembles an identifier from declaration item words.
    #[must_use]
    pub fn from_words(words: [i32; Self::WORDS]) -> Self {
        let mut bytes = [0u8; 16];
        for (chunk, word) in bytes.chunks_exact_mut(4).zip(words) {
            chunk.copy_from_slice(&word.to_be_bytes());
        }
        Self(bytes)
    }
}

impl fmt::Display for TypeUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, byte) in self.0.iter().enumerate() {
            if matches!(index, 4 | 6 | 8 | 10) {
                write!(f, "-")?;
            }
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn same_name_same_uuid() {
        assert_eq!(
            TypeUuid::from_name("my-item@example.org"),
            TypeUuid::from_name("my-item@example.org")
        );
        assert_ne!(
            TypeUuid::from_name("my-item@example.org"),
            TypeUuid::from_name("my-other-item@example.org")
        );
    }

    #[test]
    fn words_are_big_endian() {
        let mut bytes = [0u8; 16];
        bytes[3] = 1;
        bytes[4] = 0x80;
        let words = TypeUuid::from_bytes(bytes).to_words();
        assert_eq!(words[0], 1);
        assert_eq!(words[1], i32::MIN);
    }

    #[test]
    fn display_is_hyphenated_hex() {
        let uuid = TypeUuid::from_bytes([0xAB; 16]);
        let text = uuid.to_string();
        assert_eq!(text.len(), 36);
        assert_eq!(text.matches('-').count(), 4);
        assert!(text.starts_with("abababab-abab-"));
    }

    proptest! {
        #[test]
        fn prop_words_roundtrip(bytes in any::<[u8; 16]>()) {
            let uuid = TypeUuid::from_bytes(bytes);
            prop_assert_eq!(TypeUuid::from_words(uuid.to_words()), uuid);
        }
    }
}
