//! Deterministic registry hashing.

use blake3::Hasher;

use crate::TypeRegistry;

/// Computes a deterministic digest of a registry.
///
/// Peers compare digests to confirm they agree on extended type order and
/// the variant table.
#[must_use]
pub fn registry_hash(registry: &TypeRegistry) -> u64 {
    let mut hasher = Hasher::new();
    write_u32(&mut hasher, registry.len() as u32);

    for (ty, _, uuid) in registry.iter() {
        write_u16(&mut hasher, ty.index());
        hasher.update(uuid.as_bytes());
    }

    let mappings: Vec<_> = registry.variant_mappings().collect();
    write_u32(&mut hasher, mappings.len() as u32);
    for mapping in mappings {
        write_u16(&mut hasher, mapping.native);
        write_u16(&mut hasher, mapping.variant);
    }

    let hash = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[0..8]);
    u64::from_le_bytes(bytes)
}

fn write_u16(hasher: &mut Hasher, value: u16) {
    hasher.update(&value.to_le_bytes());
}

fn write_u32(hasher: &mut Hasher, value: u32) {
    hasher.update(&value.to_le_bytes());
}
