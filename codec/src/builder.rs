//! Incremental construction of item stores.

use std::collections::HashMap;
use std::sync::Arc;

use schema::{ExtendedType, TypeRegistry, TypeUuid};
use wire::WORD_SIZE;

use crate::error::{BuildError, BuildResult, CapacityKind};
use crate::limits::{
    SnapshotLimits, ITEM_HEADER_SIZE, MAX_EXTENDED_TYPES, MAX_TYPE, NO_ID, OFFSET_UUID_TYPE,
    SNAPSHOT_HEADER_SIZE,
};
use crate::snapshot::{write_layout, Snapshot};
use crate::types::{ItemKey, ItemType};

/// Type numbering used for the store being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Numbering {
    /// Native protocol type numbers.
    #[default]
    Native,
    /// Legacy numbering; native types are translated through the registry.
    Variant,
}

/// Append-only item buffer with capacity enforcement.
#[derive(Debug, Clone)]
pub(crate) struct ItemBuffer {
    limits: SnapshotLimits,
    offsets: Vec<u32>,
    data: Vec<i32>,
    index: HashMap<ItemKey, usize>,
}

impl ItemBuffer {
    pub(crate) fn new(limits: SnapshotLimits) -> Self {
        Self {
            limits,
            offsets: Vec::new(),
            data: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub(crate) fn clear(&mut self) {
        self.offsets.clear();
        self.data.clear();
        self.index.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.offsets.len()
    }

    pub(crate) fn data_size(&self) -> usize {
        self.data.len() * WORD_SIZE
    }

    /// Fails if `items` more items with `bytes` more data would not fit.
    pub(crate) fn check_capacity(&self, items: usize, bytes: usize) -> BuildResult<()> {
        let data_size = self.data_size().saturating_add(bytes);
        if data_size > self.limits.max_data_size {
            return Err(BuildError::CapacityExceeded {
                kind: CapacityKind::DataBytes,
                limit: self.limits.max_data_size,
                actual: data_size,
            });
        }
        let count = self.len().saturating_add(items);
        if count > self.limits.max_items {
            return Err(BuildError::CapacityExceeded {
                kind: CapacityKind::Items,
                limit: self.limits.max_items,
                actual: count,
            });
        }
        Ok(())
    }

    /// Appends a zeroed item of `size` bytes and returns its payload.
    pub(crate) fn push(&mut self, key: ItemKey, size: usize) -> BuildResult<&mut [i32]> {
        if self.index.contains_key(&key) {
            return Err(BuildError::DuplicateKey { key });
        }
        self.check_capacity(1, ITEM_HEADER_SIZE.saturating_add(size))?;
        let start = self.data.len();
        // The store header carries the data size as an `i32`.
        let end = self.data_size() + ITEM_HEADER_SIZE + size;
        if i32::try_from(end).is_err() {
            return Err(BuildError::CapacityExceeded {
                kind: CapacityKind::DataBytes,
                limit: i32::MAX as usize,
                actual: end,
            });
        }
        self.offsets.push((start * WORD_SIZE) as u32);
        self.index.insert(key, self.offsets.len() - 1);
        self.data.push(key.word());
        self.data.resize(start + 1 + size / WORD_SIZE, 0);
        Ok(&mut self.data[start + 1..])
    }

    /// Appends an item holding a copy of `payload`.
    pub(crate) fn push_copy(&mut self, key: ItemKey, payload: &[i32]) -> BuildResult<()> {
        self.push(key, payload.len() * WORD_SIZE)?
            .copy_from_slice(payload);
        Ok(())
    }

    pub(crate) fn find_mut(&mut self, key: ItemKey) -> Option<&mut [i32]> {
        let index = *self.index.get(&key)?;
        let start = self.offsets[index] as usize / WORD_SIZE;
        let end = self
            .offsets
            .get(index + 1)
            .map_or(self.data.len(), |&next| next as usize / WORD_SIZE);
        Some(&mut self.data[start + 1..end])
    }

    pub(crate) fn write_into(&self, out: &mut [u8]) -> BuildResult<usize> {
        let needed = SNAPSHOT_HEADER_SIZE + self.len() * WORD_SIZE + self.data_size();
        if out.len() < needed {
            return Err(BuildError::OutputTooSmall {
                needed,
                available: out.len(),
            });
        }
        write_layout(&self.offsets, &self.data, out).ok_or(BuildError::OutputTooSmall {
            needed,
            available: out.len(),
        })
    }

    pub(crate) fn to_snapshot(&self) -> Snapshot {
        Snapshot::from_parts(self.offsets.clone(), self.data.clone())
    }

    pub(crate) fn into_snapshot(self) -> Snapshot {
        Snapshot::from_parts(self.offsets, self.data)
    }
}

/// Builds one item store per tick.
///
/// The extended type table survives [`reset`](Self::reset); each store
/// declares the extended types it uses the first time one of their items
/// is added.
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    registry: Arc<TypeRegistry>,
    items: ItemBuffer,
    numbering: Numbering,
    extended: Vec<ExtendedType>,
    declared: u64,
}

impl SnapshotBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new(registry: Arc<TypeRegistry>, limits: SnapshotLimits) -> Self {
        Self {
            registry,
            items: ItemBuffer::new(limits),
            numbering: Numbering::Native,
            extended: Vec::new(),
            declared: 0,
        }
    }

    /// Discards staged items and starts a new store.
    pub fn reset(&mut self, numbering: Numbering) {
        self.items.clear();
        self.numbering = numbering;
        self.declared = 0;
    }

    #[must_use]
    pub const fn numbering(&self) -> Numbering {
        self.numbering
    }

    #[must_use]
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Number of staged items, including type declarations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.len() == 0
    }

    /// Staged data size in bytes.
    #[must_use]
    pub fn data_size(&self) -> usize {
        self.items.data_size()
    }

    /// Appends a zero-initialized item and returns its payload for writing.
    ///
    /// On error nothing is staged, except that an extended type may have
    /// been added to the builder's type table.
    pub fn new_item(&mut self, ty: ItemType, id: i32, size: usize) -> BuildResult<&mut [i32]> {
        if id == NO_ID {
            return Err(BuildError::NoId);
        }
        let id = u16::try_from(id).map_err(|_| BuildError::IdOutOfRange { id })?;
        if size % WORD_SIZE != 0 {
            return Err(BuildError::UnalignedSize { size });
        }
        let internal = match ty {
            ItemType::Native(type_id) => {
                check_plain_type(type_id)?;
                match self.numbering {
                    Numbering::Native => type_id,
                    Numbering::Variant => self
                        .registry
                        .to_variant(type_id)
                        .ok_or(BuildError::NoVariantEquivalent { native: type_id })?,
                }
            }
            ItemType::VariantOnly(type_id) => {
                check_plain_type(type_id)?;
                if self.numbering == Numbering::Native {
                    return Err(BuildError::VariantOnlyType { type_id });
                }
                type_id
            }
            ItemType::Extended(ext) => return self.new_extended_item(ext, id, size),
        };
        self.items.push(ItemKey::new(internal, id), size)
    }

    /// Payload of an already staged item, so several writers can merge into it.
    pub fn find_staged_item(&mut self, key: ItemKey) -> Option<&mut [i32]> {
        self.items.find_mut(key)
    }

    /// Serializes the staged store into `out` and returns its size.
    pub fn finish_into(&self, out: &mut [u8]) -> BuildResult<usize> {
        self.items.write_into(out)
    }

    /// Returns the staged store as an immutable snapshot.
    #[must_use]
    pub fn finish(&self) -> Snapshot {
        self.items.to_snapshot()
    }

    fn new_extended_item(
        &mut self,
        ext: ExtendedType,
        id: u16,
        size: usize,
    ) -> BuildResult<&mut [i32]> {
        let uuid = self
            .registry
            .uuid(ext)
            .ok_or(BuildError::UnknownExtendedType { index: ext.index() })?;
        let slot = self.extended_slot(ext)?;
        let internal = MAX_TYPE - slot as u16;
        let bit = 1u64 << slot;
        if self.declared & bit == 0 {
            let decl_size = TypeUuid::WORDS * WORD_SIZE;
            self.items
                .check_capacity(2, (2 * ITEM_HEADER_SIZE + decl_size).saturating_add(size))?;
            let key = ItemKey::new(internal, id);
            if self.items.find_mut(key).is_some() {
                return Err(BuildError::DuplicateKey { key });
            }
            self.items
                .push_copy(ItemKey::new(0, internal), &uuid.to_words())?;
            self.declared |= bit;
            tracing::trace!(%uuid, internal, "declared extended type");
        }
        self.items.push(ItemKey::new(internal, id), size)
    }

    fn extended_slot(&mut self, ext: ExtendedType) -> BuildResult<usize> {
        if let Some(slot) = self.extended.iter().position(|&known| known == ext) {
            return Ok(slot);
        }
        if self.extended.len() >= MAX_EXTENDED_TYPES {
            return Err(BuildError::TooManyExtendedTypes {
                limit: MAX_EXTENDED_TYPES,
            });
        }
        self.extended.push(ext);
        Ok(self.extended.len() - 1)
    }
}

/// Plain types exclude 0 (declarations) and the extended range.
fn check_plain_type(type_id: u16) -> BuildResult<()> {
    if type_id == 0 || type_id >= OFFSET_UUID_TYPE {
        return Err(BuildError::TypeOutOfRange { type_id });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::MAX_ID;

    fn builder() -> SnapshotBuilder {
        SnapshotBuilder::new(Arc::new(TypeRegistry::new()), SnapshotLimits::default())
    }

    #[test]
    fn new_item_is_zeroed_and_writable() {
        let mut builder = builder();
        let payload = builder.new_item(ItemType::Native(1), 4, 8).unwrap();
        assert_eq!(payload, &[0, 0]);
        payload.copy_from_slice(&[3, 4]);
        let snapshot = builder.finish();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.item(0).key(), ItemKey::new(1, 4));
        assert_eq!(snapshot.item(0).data(), &[3, 4]);
    }

    #[test]
    fn zero_size_items_are_allowed() {
        let mut builder = builder();
        assert!(builder.new_item(ItemType::Native(2), 0, 0).unwrap().is_empty());
        assert_eq!(builder.finish().item_size(0), 0);
    }

    #[test]
    fn rejects_no_id_and_out_of_range_ids() {
        let mut builder = builder();
        assert_eq!(
            builder.new_item(ItemType::Native(1), NO_ID, 4).unwrap_err(),
            BuildError::NoId
        );
        assert_eq!(
            builder.new_item(ItemType::Native(1), -7, 4).unwrap_err(),
            BuildError::IdOutOfRange { id: -7 }
        );
        let too_big = i32::from(MAX_ID) + 1;
        assert_eq!(
            builder.new_item(ItemType::Native(1), too_big, 4).unwrap_err(),
            BuildError::IdOutOfRange { id: too_big }
        );
        assert!(builder.is_empty());
    }

    #[test]
    fn rejects_reserved_types_and_unaligned_sizes() {
        let mut builder = builder();
        assert!(matches!(
            builder.new_item(ItemType::Native(0), 1, 4),
            Err(BuildError::TypeOutOfRange { type_id: 0 })
        ));
        assert!(matches!(
            builder.new_item(ItemType::Native(OFFSET_UUID_TYPE), 1, 4),
            Err(BuildError::TypeOutOfRange { .. })
        ));
        assert!(matches!(
            builder.new_item(ItemType::Native(1), 1, 6),
            Err(BuildError::UnalignedSize { size: 6 })
        ));
    }

    #[test]
    fn rejects_duplicate_keys() {
        let mut builder = builder();
        builder.new_item(ItemType::Native(1), 1, 4).unwrap();
        assert_eq!(
            builder.new_item(ItemType::Native(1), 1, 4).unwrap_err(),
            BuildError::DuplicateKey {
                key: ItemKey::new(1, 1)
            }
        );
        assert_eq!(builder.len(), 1);
    }

    #[test]
    fn find_staged_item_merges_writes() {
        let mut builder = builder();
        builder.new_item(ItemType::Native(5), 2, 8).unwrap()[0] = 1;
        let staged = builder.find_staged_item(ItemKey::new(5, 2)).unwrap();
        staged[1] = 9;
        assert!(builder.find_staged_item(ItemKey::new(5, 3)).is_none());
        assert_eq!(builder.finish().item(0).data(), &[1, 9]);
    }

    #[test]
    fn capacity_is_enforced_and_prior_items_survive() {
        let limits = SnapshotLimits::for_testing();
        let mut builder = SnapshotBuilder::new(Arc::new(TypeRegistry::new()), limits);
        for id in 0..8 {
            builder.new_item(ItemType::Native(1), id, 4).unwrap()[0] = id;
        }
        let before = builder.finish();
        let err = builder.new_item(ItemType::Native(1), 8, 4).unwrap_err();
        assert!(matches!(
            err,
            BuildError::CapacityExceeded {
                kind: CapacityKind::Items,
                ..
            }
        ));
        assert_eq!(builder.finish(), before);
    }

    #[test]
    fn data_capacity_is_inclusive() {
        let limits = SnapshotLimits::for_testing();
        let mut builder = SnapshotBuilder::new(Arc::new(TypeRegistry::new()), limits);
        // 4 byte header + 252 byte payload fills exactly 256 bytes.
        builder.new_item(ItemType::Native(1), 0, 252).unwrap();
        assert_eq!(builder.data_size(), 256);
        let err = builder.new_item(ItemType::Native(1), 1, 0).unwrap_err();
        assert!(matches!(
            err,
            BuildError::CapacityExceeded {
                kind: CapacityKind::DataBytes,
                limit: 256,
                actual: 260
            }
        ));
    }

    #[test]
    fn oversized_item_is_capacity_error() {
        let mut builder = builder();
        let err = builder
            .new_item(ItemType::Native(1), 0, usize::MAX - 3)
            .unwrap_err();
        assert_eq!(
            err,
            BuildError::CapacityExceeded {
                kind: CapacityKind::DataBytes,
                limit: SnapshotLimits::default().max_data_size,
                actual: usize::MAX,
            }
        );
        assert!(builder.is_empty());
    }

    #[test]
    fn data_size_stays_within_header_range() {
        let limits = SnapshotLimits {
            max_data_size: usize::MAX,
            max_items: 16,
        };
        let mut builder = SnapshotBuilder::new(Arc::new(TypeRegistry::new()), limits);
        let size = i32::MAX as usize + 1;
        let err = builder.new_item(ItemType::Native(1), 0, size).unwrap_err();
        assert_eq!(
            err,
            BuildError::CapacityExceeded {
                kind: CapacityKind::DataBytes,
                limit: i32::MAX as usize,
                actual: size + ITEM_HEADER_SIZE,
            }
        );
        assert!(builder.is_empty());
    }

    #[test]
    fn oversized_extended_item_is_capacity_error() {
        let mut registry = TypeRegistry::new();
        let flag = registry.register("game/flag").unwrap();
        let mut builder = SnapshotBuilder::new(Arc::new(registry), SnapshotLimits::default());
        let err = builder
            .new_item(ItemType::Extended(flag), 0, usize::MAX - 3)
            .unwrap_err();
        assert!(matches!(
            err,
            BuildError::CapacityExceeded {
                kind: CapacityKind::DataBytes,
                ..
            }
        ));
        assert!(builder.is_empty(), "no declaration left behind");
    }

    #[test]
    fn finish_into_matches_snapshot_bytes() {
        let mut builder = builder();
        builder.new_item(ItemType::Native(1), 0, 4).unwrap()[0] = 5;
        builder.new_item(ItemType::Native(2), 0, 8).unwrap()[1] = 20;
        let mut out = vec![0u8; SnapshotLimits::default().max_total_size()];
        let size = builder.finish_into(&mut out).unwrap();
        assert_eq!(&out[..size], builder.finish().to_bytes().as_slice());

        let mut tiny = [0u8; 4];
        assert!(matches!(
            builder.finish_into(&mut tiny),
            Err(BuildError::OutputTooSmall { .. })
        ));
    }

    #[test]
    fn reset_clears_items() {
        let mut builder = builder();
        builder.new_item(ItemType::Native(1), 0, 4).unwrap();
        builder.reset(Numbering::Native);
        assert!(builder.is_empty());
        assert!(builder.finish().is_empty());
    }

    #[test]
    fn variant_numbering_translates_types() {
        let mut registry = TypeRegistry::new();
        registry.map_variant(3, 9).unwrap();
        let mut builder = SnapshotBuilder::new(Arc::new(registry), SnapshotLimits::default());
        builder.reset(Numbering::Variant);
        builder.new_item(ItemType::Native(3), 1, 4).unwrap();
        assert_eq!(
            builder.new_item(ItemType::Native(4), 1, 4).unwrap_err(),
            BuildError::NoVariantEquivalent { native: 4 }
        );
        builder.new_item(ItemType::VariantOnly(20), 1, 4).unwrap();
        let snapshot = builder.finish();
        assert_eq!(snapshot.item(0).key(), ItemKey::new(9, 1));
        assert_eq!(snapshot.item(1).key(), ItemKey::new(20, 1));
    }

    #[test]
    fn variant_only_rejected_under_native_numbering() {
        let mut builder = builder();
        assert_eq!(
            builder.new_item(ItemType::VariantOnly(20), 1, 4).unwrap_err(),
            BuildError::VariantOnlyType { type_id: 20 }
        );
    }

    #[test]
    fn extended_items_declare_their_type_once() {
        let mut registry = TypeRegistry::new();
        let flag = registry.register("game/flag").unwrap();
        let uuid = registry.uuid(flag).unwrap();
        let registry = Arc::new(registry);
        let mut builder = SnapshotBuilder::new(Arc::clone(&registry), SnapshotLimits::default());

        builder.new_item(ItemType::Extended(flag), 0, 4).unwrap()[0] = 11;
        builder.new_item(ItemType::Extended(flag), 1, 4).unwrap()[0] = 12;
        let snapshot = builder.finish();

        assert_eq!(snapshot.len(), 3);
        let decl = snapshot.item(0);
        assert_eq!(decl.key(), ItemKey::new(0, MAX_TYPE));
        assert_eq!(decl.data(), &uuid.to_words());
        assert_eq!(snapshot.item(1).type_id(), MAX_TYPE);
        assert_eq!(snapshot.item_type(1, &registry), ItemType::Extended(flag));
        assert_eq!(
            snapshot.find_item(ItemType::Extended(flag), 1, &registry),
            Some(&[12][..])
        );

        builder.reset(Numbering::Native);
        builder.new_item(ItemType::Extended(flag), 0, 4).unwrap();
        assert_eq!(builder.len(), 2, "declaration repeats in each new store");
    }

    #[test]
    fn extended_types_count_down_from_max_type() {
        let mut registry = TypeRegistry::new();
        let flag = registry.register("game/flag").unwrap();
        let door = registry.register("game/door").unwrap();
        let registry = Arc::new(registry);
        let mut builder = SnapshotBuilder::new(Arc::clone(&registry), SnapshotLimits::default());

        builder.new_item(ItemType::Extended(flag), 3, 4).unwrap()[0] = 1;
        builder.new_item(ItemType::Extended(door), 3, 4).unwrap()[0] = 2;
        let snapshot = builder.finish();

        let keys: Vec<_> = snapshot.items().map(|item| item.key()).collect();
        assert_eq!(
            keys,
            vec![
                ItemKey::new(0, MAX_TYPE),
                ItemKey::new(MAX_TYPE, 3),
                ItemKey::new(0, MAX_TYPE - 1),
                ItemKey::new(MAX_TYPE - 1, 3),
            ]
        );
        assert_eq!(
            snapshot.item(2).data(),
            &registry.uuid(door).unwrap().to_words()
        );
        assert_eq!(snapshot.item_type(3, &registry), ItemType::Extended(door));
        assert_eq!(
            snapshot.find_item(ItemType::Extended(door), 3, &registry),
            Some(&[2][..])
        );
    }

    #[test]
    fn extended_declarations_bypass_variant_numbering() {
        let mut registry = TypeRegistry::new();
        let flag = registry.register("game/flag").unwrap();
        let mut builder = SnapshotBuilder::new(Arc::new(registry), SnapshotLimits::default());
        builder.reset(Numbering::Variant);
        builder.new_item(ItemType::Extended(flag), 0, 0).unwrap();
        let snapshot = builder.finish();
        assert_eq!(snapshot.item(0).type_id(), 0);
    }

    #[test]
    fn extended_table_is_bounded() {
        let mut registry = TypeRegistry::new();
        let types: Vec<_> = (0..=MAX_EXTENDED_TYPES)
            .map(|index| registry.register(&format!("ext/{index}")).unwrap())
            .collect();
        let mut builder = SnapshotBuilder::new(Arc::new(registry), SnapshotLimits::default());
        for &ty in &types[..MAX_EXTENDED_TYPES] {
            builder.reset(Numbering::Native);
            builder.new_item(ItemType::Extended(ty), 0, 0).unwrap();
        }
        builder.reset(Numbering::Native);
        assert_eq!(
            builder
                .new_item(ItemType::Extended(types[MAX_EXTENDED_TYPES]), 0, 0)
                .unwrap_err(),
            BuildError::TooManyExtendedTypes {
                limit: MAX_EXTENDED_TYPES
            }
        );
    }

    #[test]
    fn extended_capacity_checked_before_declaring() {
        let mut registry = TypeRegistry::new();
        let flag = registry.register("game/flag").unwrap();
        let mut builder =
            SnapshotBuilder::new(Arc::new(registry), SnapshotLimits::for_testing());
        for id in 0..7 {
            builder.new_item(ItemType::Native(1), id, 0).unwrap();
        }
        assert!(matches!(
            builder.new_item(ItemType::Extended(flag), 0, 0),
            Err(BuildError::CapacityExceeded { .. })
        ));
        assert_eq!(builder.len(), 7);
    }
}
