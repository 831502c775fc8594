//! Bounded hash index from item key to position in a store.

use std::collections::HashMap;

use crate::snapshot::Snapshot;
use crate::types::ItemKey;

const BUCKETS: usize = 256;
const BUCKET_DEPTH: usize = 64;

/// Key lookup for one store, built per delta computation.
///
/// Each bucket keeps at most 64 entries; keys past that depth go to a
/// spill map, so lookups stay exact.
#[derive(Debug)]
pub(crate) struct KeyIndex {
    buckets: Vec<Vec<(ItemKey, usize)>>,
    spilled: HashMap<ItemKey, usize>,
}

impl KeyIndex {
    pub(crate) fn build(snapshot: &Snapshot) -> Self {
        let mut buckets = vec![Vec::new(); BUCKETS];
        let mut spilled = HashMap::new();
        for (index, item) in snapshot.items().enumerate() {
            let bucket: &mut Vec<_> = &mut buckets[bucket_of(item.key())];
            if bucket.len() < BUCKET_DEPTH {
                bucket.push((item.key(), index));
            } else {
                spilled.insert(item.key(), index);
            }
        }
        Self { buckets, spilled }
    }

    pub(crate) fn get(&self, key: ItemKey) -> Option<usize> {
        self.buckets[bucket_of(key)]
            .iter()
            .find(|(candidate, _)| *candidate == key)
            .map(|&(_, index)| index)
            .or_else(|| self.spilled.get(&key).copied())
    }
}

/// djb2 over the little-endian key bytes.
fn hash_key(key: ItemKey) -> u32 {
    key.raw()
        .to_le_bytes()
        .iter()
        .fold(5381u32, |hash, &byte| {
            (hash << 5).wrapping_add(hash).wrapping_add(u32::from(byte))
        })
}

pub(crate) fn bucket_of(key: ItemKey) -> usize {
    hash_key(key) as usize % BUCKETS
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use schema::TypeRegistry;

    use super::*;
    use crate::builder::SnapshotBuilder;
    use crate::limits::SnapshotLimits;
    use crate::types::ItemType;

    fn colliding_keys(count: usize) -> Vec<ItemKey> {
        let target = bucket_of(ItemKey::new(1, 0));
        (0..=u16::MAX)
            .map(|id| ItemKey::new(1, id))
            .filter(|&key| bucket_of(key) == target)
            .take(count)
            .collect()
    }

    #[test]
    fn djb2_matches_reference_value() {
        // 5381 * 33 + 0, four times, for the zero key.
        let expected = (0..4).fold(5381u32, |hash, _| hash.wrapping_mul(33));
        assert_eq!(hash_key(ItemKey::from_raw(0)), expected);
    }

    #[test]
    fn finds_every_item() {
        let mut builder =
            SnapshotBuilder::new(Arc::new(TypeRegistry::new()), SnapshotLimits::default());
        for id in 0..100 {
            builder.new_item(ItemType::Native(3), id, 4).unwrap();
        }
        let snapshot = builder.finish();
        let index = KeyIndex::build(&snapshot);
        for id in 0..100u16 {
            assert_eq!(index.get(ItemKey::new(3, id)), Some(usize::from(id)));
        }
        assert_eq!(index.get(ItemKey::new(4, 0)), None);
    }

    #[test]
    fn overflowing_bucket_stays_exact() {
        let keys = colliding_keys(BUCKET_DEPTH + 6);
        assert_eq!(keys.len(), BUCKET_DEPTH + 6, "need enough colliding keys");
        let mut builder =
            SnapshotBuilder::new(Arc::new(TypeRegistry::new()), SnapshotLimits::default());
        for key in &keys {
            builder
                .new_item(ItemType::Native(key.type_id()), i32::from(key.id()), 0)
                .unwrap();
        }
        let snapshot = builder.finish();
        let index = KeyIndex::build(&snapshot);
        assert_eq!(index.buckets[bucket_of(keys[0])].len(), BUCKET_DEPTH);
        assert_eq!(index.spilled.len(), 6);
        for (position, key) in keys.iter().enumerate() {
            assert_eq!(index.get(*key), Some(position));
        }
    }

    #[test]
    fn positions_past_u16_range_are_exact() {
        let target = ItemKey::new(9, 0);
        let fillers: Vec<ItemKey> = (1..=3u16)
            .flat_map(|type_id| (0..=u16::MAX).map(move |id| ItemKey::new(type_id, id)))
            .filter(|&key| bucket_of(key) != bucket_of(target))
            .take(usize::from(u16::MAX) + 1)
            .collect();
        let limits = SnapshotLimits {
            max_data_size: 1 << 20,
            max_items: 70_000,
        };
        let mut builder = SnapshotBuilder::new(Arc::new(TypeRegistry::new()), limits);
        for key in &fillers {
            builder
                .new_item(ItemType::Native(key.type_id()), i32::from(key.id()), 0)
                .unwrap();
        }
        builder.new_item(ItemType::Native(9), 0, 4).unwrap()[0] = 100;
        let snapshot = builder.finish();

        let index = KeyIndex::build(&snapshot);
        assert!(!index.spilled.contains_key(&target));
        assert_eq!(index.get(target), Some(fillers.len()));
    }
}
