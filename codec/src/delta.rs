//! Delta creation, encoding, decoding and application.
//!
//! Wire layout, all little-endian `i32` words:
//! `[num_deleted][num_updates][num_temp = 0][deleted keys...]`, then per update
//! `[type][id][size in words, unless static][payload words...]`.
//!
//! An update is a word-wise wrapping difference against the base item when
//! the base holds the same key with the same size, and the raw payload
//! otherwise.

use std::collections::{HashMap, HashSet};

use wire::{WordReader, WordWriter, WORD_SIZE};

use crate::builder::ItemBuffer;
use crate::error::{DeltaError, DeltaResult, DeltaSection};
use crate::key_index::KeyIndex;
use crate::limits::{SnapshotLimits, MAX_STATIC_SIZES, MAX_TYPE};
use crate::snapshot::{Item, Snapshot};
use crate::stats::DeltaStats;
use crate::types::ItemKey;

/// Size of the delta header in bytes.
pub const DELTA_HEADER_SIZE: usize = 3 * WORD_SIZE;

/// One update record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaItem {
    pub key: ItemKey,
    /// Diff words, or the raw payload when the base has no matching item.
    pub data: Vec<i32>,
}

/// The change between two stores.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    pub deleted: Vec<ItemKey>,
    pub updates: Vec<DeltaItem>,
}

impl Delta {
    /// Returns `true` when nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.updates.is_empty()
    }
}

/// Writes `current - past` per word into `out`. Returns `true` if any word differs.
///
/// All three slices must have the same length; extra words are ignored.
pub fn diff_words(past: &[i32], current: &[i32], out: &mut [i32]) -> bool {
    let mut changed = false;
    for ((out, &past), &current) in out.iter_mut().zip(past).zip(current) {
        *out = current.wrapping_sub(past);
        changed |= *out != 0;
    }
    changed
}

/// Writes `past + diff` per word into `out`, inverting [`diff_words`].
pub fn undiff_words(past: &[i32], diff: &[i32], out: &mut [i32]) {
    for ((out, &past), &diff) in out.iter_mut().zip(past).zip(diff) {
        *out = past.wrapping_add(diff);
    }
}

/// Creates and applies deltas between item stores.
#[derive(Debug, Clone)]
pub struct DeltaEncoder {
    /// Statically agreed payload size per type, in bytes; 0 means explicit.
    static_sizes: [u32; MAX_STATIC_SIZES],
    limits: SnapshotLimits,
    stats: DeltaStats,
}

impl Default for DeltaEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl DeltaEncoder {
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(SnapshotLimits::default())
    }

    /// Creates an encoder that rebuilds stores within `limits`.
    #[must_use]
    pub fn with_limits(limits: SnapshotLimits) -> Self {
        Self {
            static_sizes: [0; MAX_STATIC_SIZES],
            limits,
            stats: DeltaStats::new(),
        }
    }

    #[must_use]
    pub const fn limits(&self) -> &SnapshotLimits {
        &self.limits
    }

    /// Agrees a fixed payload size for `type_id`, so its size is not sent.
    ///
    /// Types outside the static table are ignored. A size of 0 clears the entry.
    pub fn set_static_size(&mut self, type_id: u16, size: usize) {
        let Some(slot) = self.static_sizes.get_mut(usize::from(type_id)) else {
            return;
        };
        *slot = u32::try_from(size).unwrap_or(0);
    }

    /// Static payload size for `type_id`, in bytes.
    #[must_use]
    pub fn static_size(&self, type_id: u16) -> Option<usize> {
        self.static_sizes
            .get(usize::from(type_id))
            .filter(|&&size| size != 0)
            .map(|&size| size as usize)
    }

    /// Counters for deltas applied by this encoder.
    #[must_use]
    pub const fn stats(&self) -> &DeltaStats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats.clear();
    }

    /// Computes the change from `from` to `to`.
    pub fn create_delta(&self, from: &Snapshot, to: &Snapshot) -> DeltaResult<Delta> {
        let to_index = KeyIndex::build(to);
        let deleted: Vec<ItemKey> = from
            .items()
            .map(|item| item.key())
            .filter(|&key| to_index.get(key).is_none())
            .collect();

        let from_index = KeyIndex::build(from);
        let mut updates = Vec::new();
        for item in to.items() {
            self.check_static_size(item.key(), item.data())?;
            match matching_base(from, &from_index, &item) {
                Some(past) => {
                    let mut diff = vec![0; item.data().len()];
                    if diff_words(past.data(), item.data(), &mut diff) {
                        updates.push(DeltaItem {
                            key: item.key(),
                            data: diff,
                        });
                    }
                }
                None => updates.push(DeltaItem {
                    key: item.key(),
                    data: item.data().to_vec(),
                }),
            }
        }

        tracing::trace!(
            deleted = deleted.len(),
            updated = updates.len(),
            items = to.len(),
            "created delta"
        );
        Ok(Delta { deleted, updates })
    }

    /// Encoded size of `delta` in bytes.
    #[must_use]
    pub fn encoded_len(&self, delta: &Delta) -> usize {
        let updates: usize = delta
            .updates
            .iter()
            .map(|update| {
                let size_word = if self.static_size(update.key.type_id()).is_some() {
                    0
                } else {
                    WORD_SIZE
                };
                2 * WORD_SIZE + size_word + update.data.len() * WORD_SIZE
            })
            .sum();
        DELTA_HEADER_SIZE + delta.deleted.len() * WORD_SIZE + updates
    }

    /// Serializes `delta` into `out`, returning the bytes written.
    pub fn encode_delta(&self, delta: &Delta, out: &mut [u8]) -> DeltaResult<usize> {
        let needed = self.encoded_len(delta);
        let too_small = DeltaError::OutputTooSmall {
            needed,
            available: out.len(),
        };
        if out.len() < needed {
            return Err(too_small);
        }
        for update in &delta.updates {
            self.check_static_size(update.key, &update.data)?;
        }

        let mut writer = WordWriter::new(out);
        let mut put = |word: i32| writer.write_i32(word).map_err(|_| too_small.clone());
        put(count_word(delta.deleted.len()))?;
        put(count_word(delta.updates.len()))?;
        put(0)?;
        for key in &delta.deleted {
            put(key.word())?;
        }
        for update in &delta.updates {
            put(i32::from(update.key.type_id()))?;
            put(i32::from(update.key.id()))?;
            if self.static_size(update.key.type_id()).is_none() {
                put(count_word(update.data.len()))?;
            }
            for &word in &update.data {
                put(word)?;
            }
        }
        Ok(writer.finish())
    }

    /// Serializes `delta` into a new buffer.
    pub fn encode_delta_to_vec(&self, delta: &Delta) -> DeltaResult<Vec<u8>> {
        let mut out = vec![0u8; self.encoded_len(delta)];
        let written = self.encode_delta(delta, &mut out)?;
        out.truncate(written);
        Ok(out)
    }

    /// Parses delta bytes, checking every count and size against the input.
    pub fn decode_delta(&self, bytes: &[u8]) -> DeltaResult<Delta> {
        if bytes.len() % WORD_SIZE != 0 {
            return Err(DeltaError::UnalignedLength { len: bytes.len() });
        }
        let mut reader = WordReader::new(bytes);
        let num_deleted = read_word(&mut reader, DeltaSection::Header)?;
        let num_updates = read_word(&mut reader, DeltaSection::Header)?;
        let _num_temp = read_word(&mut reader, DeltaSection::Header)?;
        let num_deleted = count("deleted count", num_deleted)?;
        let num_updates = count("update count", num_updates)?;

        if num_deleted > reader.remaining_words() {
            return Err(DeltaError::Truncated {
                section: DeltaSection::DeletedKeys,
            });
        }
        let mut deleted = Vec::with_capacity(num_deleted);
        for _ in 0..num_deleted {
            let word = read_word(&mut reader, DeltaSection::DeletedKeys)?;
            deleted.push(ItemKey::from_raw(word as u32));
        }

        let mut updates = Vec::with_capacity(num_updates.min(reader.remaining_words() / 2));
        for _ in 0..num_updates {
            let type_word = read_word(&mut reader, DeltaSection::UpdateHeader)?;
            let type_id = u16::try_from(type_word)
                .ok()
                .filter(|&type_id| type_id <= MAX_TYPE)
                .ok_or(DeltaError::TypeOutOfRange { type_id: type_word })?;
            let id_word = read_word(&mut reader, DeltaSection::UpdateHeader)?;
            let id =
                u16::try_from(id_word).map_err(|_| DeltaError::IdOutOfRange { id: id_word })?;
            let words = match self.static_size(type_id) {
                Some(size) => size / WORD_SIZE,
                None => {
                    let size = read_word(&mut reader, DeltaSection::UpdateHeader)?;
                    usize::try_from(size)
                        .ok()
                        .filter(|&words| {
                            words
                                .checked_mul(WORD_SIZE)
                                .is_some_and(|bytes| bytes <= self.limits.max_data_size)
                        })
                        .ok_or(DeltaError::InvalidSize { size })?
                }
            };
            let mut data = Vec::new();
            reader
                .read_words_into(words, &mut data)
                .map_err(|_| DeltaError::Truncated {
                    section: DeltaSection::UpdatePayload,
                })?;
            updates.push(DeltaItem {
                key: ItemKey::new(type_id, id),
                data,
            });
        }

        if !reader.is_empty() {
            return Err(DeltaError::TrailingData {
                remaining: reader.remaining_bytes(),
            });
        }
        Ok(Delta { deleted, updates })
    }

    /// Rebuilds the store `delta` was created against `from` to produce.
    ///
    /// Surviving items keep their order from `from`; new items follow in
    /// update order. Nothing is recorded in the stats unless this succeeds.
    pub fn apply_delta(&mut self, from: &Snapshot, delta: &Delta) -> DeltaResult<Snapshot> {
        let from_index = KeyIndex::build(from);
        let mut deleted = HashSet::with_capacity(delta.deleted.len());
        for &key in &delta.deleted {
            if from_index.get(key).is_none() {
                return Err(DeltaError::UnknownDeletedKey { key });
            }
            deleted.insert(key);
        }
        let mut updates = HashMap::with_capacity(delta.updates.len());
        for update in &delta.updates {
            if updates.insert(update.key, update).is_some() {
                return Err(DeltaError::DuplicateUpdate { key: update.key });
            }
        }

        let mut stats = DeltaStats::new();
        let mut out = ItemBuffer::new(self.limits);
        for item in from.items().filter(|item| !deleted.contains(&item.key())) {
            match updates.get(&item.key()) {
                Some(update) => apply_update(&mut out, &mut stats, Some(item), update)?,
                None => out.push_copy(item.key(), item.data())?,
            }
        }
        for update in &delta.updates {
            let base = from_index.get(update.key).map(|index| from.item(index));
            if base.is_some() && !deleted.contains(&update.key) {
                continue;
            }
            apply_update(&mut out, &mut stats, base, update)?;
        }

        self.stats.merge(&stats);
        Ok(out.into_snapshot())
    }

    /// Decodes `bytes` and applies the result to `from`.
    pub fn unpack_delta(&mut self, from: &Snapshot, bytes: &[u8]) -> DeltaResult<Snapshot> {
        let result = self
            .decode_delta(bytes)
            .and_then(|delta| self.apply_delta(from, &delta));
        if let Err(err) = &result {
            tracing::debug!(len = bytes.len(), %err, "rejected delta");
        }
        result
    }

    fn check_static_size(&self, key: ItemKey, data: &[i32]) -> DeltaResult<()> {
        match self.static_size(key.type_id()) {
            Some(expected) if expected != data.len() * WORD_SIZE => {
                Err(DeltaError::StaticSizeMismatch {
                    key,
                    expected,
                    actual: data.len() * WORD_SIZE,
                })
            }
            _ => Ok(()),
        }
    }
}

/// The base item an update for `item` would be diffed against.
fn matching_base<'a>(
    from: &'a Snapshot,
    from_index: &KeyIndex,
    item: &Item<'_>,
) -> Option<Item<'a>> {
    from_index
        .get(item.key())
        .map(|index| from.item(index))
        .filter(|past| past.data().len() == item.data().len())
}

fn apply_update(
    out: &mut ItemBuffer,
    stats: &mut DeltaStats,
    base: Option<Item<'_>>,
    update: &DeltaItem,
) -> DeltaResult<()> {
    let slot = out.push(update.key, update.data.len() * WORD_SIZE)?;
    match base.filter(|past| past.data().len() == update.data.len()) {
        Some(past) => {
            undiff_words(past.data(), &update.data, slot);
            stats.record_diff(update.key.type_id(), &update.data);
        }
        None => {
            slot.copy_from_slice(&update.data);
            stats.record_full(update.key.type_id(), &update.data);
        }
    }
    Ok(())
}

fn read_word(reader: &mut WordReader<'_>, section: DeltaSection) -> DeltaResult<i32> {
    reader
        .read_i32()
        .map_err(|_| DeltaError::Truncated { section })
}

fn count(field: &'static str, value: i32) -> DeltaResult<usize> {
    usize::try_from(value).map_err(|_| DeltaError::NegativeCount { field, value })
}

/// Counts are bounded by store limits, far below `i32::MAX`.
fn count_word(len: usize) -> i32 {
    i32::try_from(len).unwrap_or(i32::MAX)
}
