//! Stable item type identifiers and the type registry for ticksnap.
//!
//! Item stores address items by compact 16-bit types. Types that were added
//! after the fixed protocol table was frozen are identified by a 128-bit
//! [`TypeUuid`] instead, and each store declares the compact index it used
//! for them. The [`TypeRegistry`] is the single place that maps between the
//! two; it is built once at startup and shared read-only afterwards.
//!
//! # Design Principles
//!
//! - **Explicit registry** - No process-wide state; callers pass the registry.
//! - **Stable identifiers** - A type's identifier depends only on its name.
//! - **Deterministic hashing** - The registry digest is stable given the same
//!   registrations in the same order.

mod error;
mod hash;
mod registry;
mod uuid;

pub use error::{RegistryError, RegistryResult};
pub use hash::registry_hash;
pub use registry::{ExtendedType, RegistryConfig, TypeRegistry, VariantMapping, OFFSET_UUID};
pub use uuid::TypeUuid;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_api_exports() {
        let _ = TypeRegistry::new();
        let _ = TypeUuid::from_name("weapon-state@example.org");
        let _ = RegistryConfig::default();
        let _: RegistryResult<()> = Ok(());
    }

    #[test]
    fn registry_from_config_matches_manual_registration() {
        let config = RegistryConfig {
            extended: vec!["a@example.org".into(), "b@example.org".into()],
            variant: vec![VariantMapping {
                native: 4,
                variant: 9,
            }],
        };
        let from_config = TypeRegistry::from_config(&config).unwrap();

        let mut manual = TypeRegistry::new();
        manual.register("a@example.org").unwrap();
        manual.register("b@example.org").unwrap();
        manual.map_variant(4, 9).unwrap();

        assert_eq!(registry_hash(&from_config), registry_hash(&manual));
    }
}
