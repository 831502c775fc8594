//! Item store: an immutable, compact set of keyed items.
//!
//! Serialized layout, all little-endian `i32` words:
//! `[data_size][num_items][offsets; num_items][data; data_size bytes]`.
//! Each item in the data section is `[key][payload words]`, and an item's
//! payload size is the gap to the next offset (or the end of data) minus
//! the key word.

use std::fmt::Write as _;

use schema::{TypeRegistry, TypeUuid};
use wire::{WordReader, WordWriter, WORD_SIZE};

use crate::error::{CapacityKind, SnapshotError, SnapshotResult};
use crate::limits::{
    SnapshotLimits, ITEM_HEADER_SIZE, MAX_TYPE, OFFSET_UUID_TYPE, SNAPSHOT_HEADER_SIZE,
};
use crate::types::{ItemKey, ItemType};

static EMPTY: Snapshot = Snapshot {
    offsets: Vec::new(),
    data: Vec::new(),
};

/// An immutable item store.
///
/// Items are kept in insertion order. Keys are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Byte offset of each item within `data`.
    offsets: Vec<u32>,
    data: Vec<i32>,
}

/// A borrowed item: its key and payload words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Item<'a> {
    key: ItemKey,
    data: &'a [i32],
}

impl<'a> Item<'a> {
    #[must_use]
    pub const fn key(&self) -> ItemKey {
        self.key
    }

    #[must_use]
    pub const fn type_id(&self) -> u16 {
        self.key.type_id()
    }

    #[must_use]
    pub const fn id(&self) -> u16 {
        self.key.id()
    }

    /// Payload words.
    #[must_use]
    pub const fn data(&self) -> &'a [i32] {
        self.data
    }

    /// Payload size in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.data.len() * WORD_SIZE
    }
}

impl Snapshot {
    /// The shared empty store, used as the base when no acknowledged base exists.
    #[must_use]
    pub fn empty() -> &'static Self {
        &EMPTY
    }

    pub(crate) fn from_parts(offsets: Vec<u32>, data: Vec<i32>) -> Self {
        Self { offsets, data }
    }

    /// Parses and validates a serialized store.
    pub fn from_bytes(bytes: &[u8], limits: &SnapshotLimits) -> SnapshotResult<Self> {
        let (offsets, data_size) = parse_layout(bytes, limits).map_err(|err| {
            tracing::debug!(len = bytes.len(), %err, "rejected item store");
            err
        })?;
        let data_start = SNAPSHOT_HEADER_SIZE + offsets.len() * WORD_SIZE;
        let mut reader = WordReader::new(&bytes[data_start..]);
        let mut data = Vec::with_capacity(data_size / WORD_SIZE);
        reader
            .read_words_into(data_size / WORD_SIZE, &mut data)
            .map_err(|_| SnapshotError::SizeMismatch {
                declared: data_start + data_size,
                actual: bytes.len(),
            })?;
        Ok(Self { offsets, data })
    }

    /// Checks that `bytes` is a well-formed store without keeping it.
    pub fn validate(bytes: &[u8], limits: &SnapshotLimits) -> SnapshotResult<()> {
        parse_layout(bytes, limits).map(|_| ())
    }

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Size of the data section in bytes.
    #[must_use]
    pub fn data_size(&self) -> usize {
        self.data.len() * WORD_SIZE
    }

    /// Serialized size in bytes.
    #[must_use]
    pub fn total_size(&self) -> usize {
        SNAPSHOT_HEADER_SIZE + self.offsets.len() * WORD_SIZE + self.data_size()
    }

    /// Returns the item at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    #[must_use]
    pub fn item(&self, index: usize) -> Item<'_> {
        let start = self.offsets[index] as usize / WORD_SIZE;
        let end = self.item_end(index);
        Item {
            key: ItemKey::from_raw(self.data[start] as u32),
            data: &self.data[start + 1..end],
        }
    }

    /// Returns the item at `index`, or `None` when out of range.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Item<'_>> {
        (index < self.len()).then(|| self.item(index))
    }

    /// Payload size of the item at `index`, in bytes.
    #[must_use]
    pub fn item_size(&self, index: usize) -> usize {
        self.item(index).size()
    }

    /// Iterates items in store order.
    pub fn items(&self) -> impl ExactSizeIterator<Item = Item<'_>> + '_ {
        (0..self.len()).map(|index| self.item(index))
    }

    /// Position of the item with `key`.
    #[must_use]
    pub fn item_index(&self, key: ItemKey) -> Option<usize> {
        self.items().position(|item| item.key == key)
    }

    /// External type of the item at `index`.
    ///
    /// Internal types in the extended range resolve through the store's
    /// declaration items and the registry. When no declaration or
    /// registration is found the internal number is returned as native.
    #[must_use]
    pub fn item_type(&self, index: usize, registry: &TypeRegistry) -> ItemType {
        self.external_type(self.item(index).type_id(), registry)
    }

    /// Resolves an internal type number to the caller-facing type.
    #[must_use]
    pub fn external_type(&self, internal: u16, registry: &TypeRegistry) -> ItemType {
        if internal < OFFSET_UUID_TYPE {
            return ItemType::Native(internal);
        }
        let declared = self
            .item_index(ItemKey::new(0, internal))
            .map(|index| self.item(index))
            .and_then(|decl| uuid_from_payload(decl.data()));
        match declared.and_then(|uuid| registry.lookup(&uuid)) {
            Some(ext) => ItemType::Extended(ext),
            None => ItemType::Native(internal),
        }
    }

    /// Payload of the item with the given external type and id.
    #[must_use]
    pub fn find_item(&self, ty: ItemType, id: u16, registry: &TypeRegistry) -> Option<&[i32]> {
        let internal = match ty {
            ItemType::Native(type_id) | ItemType::VariantOnly(type_id) => type_id,
            ItemType::Extended(ext) => self.declared_type(registry.uuid(ext)?)?,
        };
        self.item_index(ItemKey::new(internal, id))
            .map(|index| self.item(index).data())
    }

    /// Internal type number this store declares for `uuid`.
    fn declared_type(&self, uuid: TypeUuid) -> Option<u16> {
        self.items()
            .filter(|item| item.type_id() == 0)
            .filter(|item| (OFFSET_UUID_TYPE..=MAX_TYPE).contains(&item.id()))
            .find(|item| uuid_from_payload(item.data()) == Some(uuid))
            .map(|item| item.id())
    }

    /// Checksum: wrapping sum of every payload word. Keys are excluded.
    #[must_use]
    pub fn crc(&self) -> u32 {
        self.items()
            .flat_map(|item| item.data().iter())
            .fold(0u32, |crc, &word| crc.wrapping_add(word as u32))
    }

    /// Returns `true` if both stores hold the same keys with the same payloads,
    /// regardless of item order.
    #[must_use]
    pub fn same_items(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        let mut ours: Vec<_> = self.items().collect();
        let mut theirs: Vec<_> = other.items().collect();
        ours.sort_by_key(Item::key);
        theirs.sort_by_key(Item::key);
        ours == theirs
    }

    /// Serializes the store into a new buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.total_size()];
        // Data sections never exceed `i32::MAX` bytes (checked on build and
        // parse), and `out` is sized from `total_size`, so the layout fits.
        let written = write_layout(&self.offsets, &self.data, &mut out);
        debug_assert_eq!(written, Some(out.len()));
        out
    }

    /// Serializes the store into `out`, returning the bytes written.
    pub fn encode_into(&self, out: &mut [u8]) -> SnapshotResult<usize> {
        let needed = self.total_size();
        if out.len() < needed {
            return Err(SnapshotError::OutputTooSmall {
                needed,
                available: out.len(),
            });
        }
        write_layout(&self.offsets, &self.data, out).ok_or(SnapshotError::OutputTooSmall {
            needed,
            available: out.len(),
        })
    }

    /// Human-readable listing of every item and payload word.
    #[must_use]
    pub fn debug_dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "data_size={} num_items={}",
            self.data_size(),
            self.len()
        );
        for item in self.items() {
            let _ = writeln!(
                out,
                "  type={} id={} size={}",
                item.type_id(),
                item.id(),
                item.size()
            );
            for (index, word) in item.data().iter().enumerate() {
                let _ = writeln!(out, "    {index:3} {word:12} {word:08x}");
            }
        }
        out
    }

    fn item_end(&self, index: usize) -> usize {
        self.offsets
            .get(index + 1)
            .map_or(self.data.len(), |&next| next as usize / WORD_SIZE)
    }
}

fn uuid_from_payload(data: &[i32]) -> Option<TypeUuid> {
    let words: [i32; TypeUuid::WORDS] = data.get(..TypeUuid::WORDS)?.try_into().ok()?;
    Some(TypeUuid::from_words(words))
}

/// Writes header, offsets and data. Returns `None` if `out` is too small.
pub(crate) fn write_layout(offsets: &[u32], data: &[i32], out: &mut [u8]) -> Option<usize> {
    let mut writer = WordWriter::new(out);
    writer
        .write_i32(i32::try_from(data.len() * WORD_SIZE).ok()?)
        .ok()?;
    writer.write_i32(i32::try_from(offsets.len()).ok()?).ok()?;
    for &offset in offsets {
        writer.write_i32(i32::try_from(offset).ok()?).ok()?;
    }
    writer.write_words(data).ok()?;
    Some(writer.finish())
}

/// Validates the header and offset table, returning the offsets and data size.
fn parse_layout(bytes: &[u8], limits: &SnapshotLimits) -> SnapshotResult<(Vec<u32>, usize)> {
    if bytes.len() < SNAPSHOT_HEADER_SIZE {
        return Err(SnapshotError::TooShort {
            actual: bytes.len(),
        });
    }
    let mut reader = WordReader::new(bytes);
    let too_short = |_| SnapshotError::TooShort {
        actual: bytes.len(),
    };
    let raw_data_size = reader.read_i32().map_err(too_short)?;
    let raw_num_items = reader.read_i32().map_err(too_short)?;

    let data_size = usize::try_from(raw_data_size).map_err(|_| SnapshotError::NegativeDataSize {
        value: raw_data_size,
    })?;
    let num_items = usize::try_from(raw_num_items).map_err(|_| SnapshotError::NegativeItemCount {
        value: raw_num_items,
    })?;
    if num_items > limits.max_items {
        return Err(SnapshotError::LimitsExceeded {
            kind: CapacityKind::Items,
            limit: limits.max_items,
            actual: num_items,
        });
    }
    if data_size > limits.max_data_size {
        return Err(SnapshotError::LimitsExceeded {
            kind: CapacityKind::DataBytes,
            limit: limits.max_data_size,
            actual: data_size,
        });
    }
    if data_size % WORD_SIZE != 0 {
        return Err(SnapshotError::MisalignedDataSize { data_size });
    }

    let declared = SNAPSHOT_HEADER_SIZE + num_items * WORD_SIZE + data_size;
    if bytes.len() != declared {
        return Err(SnapshotError::SizeMismatch {
            declared,
            actual: bytes.len(),
        });
    }

    let mut offsets = Vec::with_capacity(num_items);
    for index in 0..num_items {
        let offset = reader.read_i32().map_err(|_| SnapshotError::SizeMismatch {
            declared,
            actual: bytes.len(),
        })?;
        let in_range = usize::try_from(offset).is_ok_and(|offset| offset <= data_size);
        if !in_range {
            return Err(SnapshotError::OffsetOutOfRange {
                index,
                offset,
                data_size,
            });
        }
        if offset % WORD_SIZE as i32 != 0 {
            return Err(SnapshotError::MisalignedOffset { index, offset });
        }
        offsets.push(offset as u32);
    }

    for (index, &offset) in offsets.iter().enumerate() {
        let end = offsets.get(index + 1).map_or(data_size, |&next| next as usize);
        let size = end as i64 - i64::from(offset) - ITEM_HEADER_SIZE as i64;
        if size < 0 {
            return Err(SnapshotError::NegativeItemSize { index, size });
        }
    }

    Ok((offsets, data_size))
}
