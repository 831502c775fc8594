//! The item type registry.

use std::collections::HashMap;

use crate::error::{RegistryError, RegistryResult};
use crate::TypeUuid;

/// External type numbers at or above this value name extended types.
pub const OFFSET_UUID: u32 = 1 << 16;

/// Upper bound on registered extended types.
const MAX_REGISTERED: usize = 0x4000;

/// Handle for a registered extended type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExtendedType(u16);

impl ExtendedType {
    /// Returns the registration index.
    #[must_use]
    pub const fn index(self) -> u16 {
        self.0
    }

    /// Returns the external type number (`OFFSET_UUID + index`).
    #[must_use]
    pub const fn external(self) -> u32 {
        OFFSET_UUID + self.0 as u32
    }
}

/// One native-to-variant type number translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VariantMapping {
    pub native: u16,
    pub variant: u16,
}

/// Declarative registry contents, suitable for configuration files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RegistryConfig {
    /// Extended type names, registered in order.
    pub extended: Vec<String>,
    /// Native to variant numbering table.
    pub variant: Vec<VariantMapping>,
}

#[derive(Debug, Clone)]
struct Registration {
    name: String,
    uuid: TypeUuid,
}

/// Maps extended types to their stable identifiers and native types to the
/// variant numbering.
///
/// Built once during startup, then shared by reference (usually behind an
/// `Arc`) with every builder and reader.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: Vec<Registration>,
    by_uuid: HashMap<TypeUuid, ExtendedType>,
    variant: HashMap<u16, u16>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from declarative configuration.
    pub fn from_config(config: &RegistryConfig) -> RegistryResult<Self> {
        let mut registry = Self::new();
        for name in &config.extended {
            registry.register(name)?;
        }
        for mapping in &config.variant {
            registry.map_variant(mapping.native, mapping.variant)?;
        }
        Ok(registry)
    }

    /// Registers an extended type by name.
    pub fn register(&mut self, name: &str) -> RegistryResult<ExtendedType> {
        let uuid = TypeUuid::from_name(name);
        if self.by_uuid.contains_key(&uuid) {
            return Err(RegistryError::DuplicateType {
                name: name.to_owned(),
                uuid,
            });
        }
        if self.types.len() >= MAX_REGISTERED {
            return Err(RegistryError::TooManyTypes {
                limit: MAX_REGISTERED,
            });
        }
        // Bounded by MAX_REGISTERED.
        let handle = ExtendedType(self.types.len() as u16);
        self.types.push(Registration {
            name: name.to_owned(),
            uuid,
        });
        self.by_uuid.insert(uuid, handle);
        Ok(handle)
    }

    /// Declares the variant numbering of a native type.
    pub fn map_variant(&mut self, native: u16, variant: u16) -> RegistryResult<()> {
        if self.variant.contains_key(&native) {
            return Err(RegistryError::DuplicateVariant { native });
        }
        self.variant.insert(native, variant);
        Ok(())
    }

    /// Returns the number of registered extended types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns `true` if no extended type is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Returns the identifier of a registered type.
    #[must_use]
    pub fn uuid(&self, ty: ExtendedType) -> Option<TypeUuid> {
        self.types.get(usize::from(ty.0)).map(|r| r.uuid)
    }

    /// Returns the name a type was registered with.
    #[must_use]
    pub fn name(&self, ty: ExtendedType) -> Option<&str> {
        self.types.get(usize::from(ty.0)).map(|r| r.name.as_str())
    }

    /// Resolves an identifier back to its registration.
    #[must_use]
    pub fn lookup(&self, uuid: &TypeUuid) -> Option<ExtendedType> {
        self.by_uuid.get(uuid).copied()
    }

    /// Resolves an external type number to a registration.
    #[must_use]
    pub fn from_external(&self, external: u32) -> Option<ExtendedType> {
        let index = external.checked_sub(OFFSET_UUID)?;
        let index = u16::try_from(index).ok()?;
        (usize::from(index) < self.types.len()).then_some(ExtendedType(index))
    }

    /// Translates a native type to the variant numbering.
    #[must_use]
    pub fn to_variant(&self, native: u16) -> Option<u16> {
        self.variant.get(&native).copied()
    }

    /// Iterates registrations in index order.
    pub fn iter(&self) -> impl Iterator<Item = (ExtendedType, &str, TypeUuid)> {
        self.types
            .iter()
            .enumerate()
            .map(|(index, r)| (ExtendedType(index as u16), r.name.as_str(), r.uuid))
    }

    /// Iterates variant mappings sorted by native type.
    pub fn variant_mappings(&self) -> impl Iterator<Item = VariantMapping> {
        let mut mappings: Vec<_> = self
            .variant
            .iter()
            .map(|(&native, &variant)| VariantMapping { native, variant })
            .collect();
        mappings.sort_by_key(|m| m.native);
        mappings.into_iter()
    }
}
