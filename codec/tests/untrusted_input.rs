use std::sync::Arc;

use codec::{DeltaEncoder, ItemType, Snapshot, SnapshotBuilder, SnapshotError, SnapshotLimits};
use proptest::prelude::*;
use schema::TypeRegistry;

fn sample_store() -> Snapshot {
    let mut builder =
        SnapshotBuilder::new(Arc::new(TypeRegistry::new()), SnapshotLimits::default());
    for id in 0..4 {
        builder
            .new_item(ItemType::Native(2), id, 8)
            .unwrap()
            .copy_from_slice(&[id, id * 3]);
    }
    builder.finish()
}

#[test]
fn every_truncation_of_a_store_is_rejected() {
    let bytes = sample_store().to_bytes();
    for len in 0..bytes.len() {
        assert!(
            Snapshot::validate(&bytes[..len], &SnapshotLimits::default()).is_err(),
            "truncated to {len} bytes"
        );
    }
}

#[test]
fn inflated_item_count_is_rejected() {
    let mut bytes = sample_store().to_bytes();
    bytes[4..8].copy_from_slice(&5i32.to_le_bytes());
    let err = Snapshot::validate(&bytes, &SnapshotLimits::default()).unwrap_err();
    assert!(matches!(err, SnapshotError::SizeMismatch { .. }), "{err}");
}

#[test]
fn every_truncation_of_a_delta_is_rejected() {
    let store = sample_store();
    let mut encoder = DeltaEncoder::new();
    let delta = encoder.create_delta(Snapshot::empty(), &store).unwrap();
    let bytes = encoder.encode_delta_to_vec(&delta).unwrap();
    for len in 0..bytes.len() {
        assert!(
            encoder.unpack_delta(Snapshot::empty(), &bytes[..len]).is_err(),
            "truncated to {len} bytes"
        );
    }
    assert_eq!(encoder.stats().total().updates, 0);
    assert!(encoder
        .unpack_delta(Snapshot::empty(), &bytes)
        .unwrap()
        .same_items(&store));
}

proptest! {
    #[test]
    fn prop_arbitrary_store_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        if let Ok(store) = Snapshot::from_bytes(&bytes, &SnapshotLimits::default()) {
            prop_assert_eq!(store.to_bytes(), bytes);
        }
    }

    #[test]
    fn prop_arbitrary_delta_bytes_never_panic(words in prop::collection::vec(any::<i32>(), 0..64)) {
        let bytes: Vec<u8> = words.iter().flat_map(|word| word.to_le_bytes()).collect();
        let mut encoder = DeltaEncoder::new();
        let _ = encoder.unpack_delta(&sample_store(), &bytes);
    }

    #[test]
    fn prop_small_counts_parse_without_panic(
        deleted in 0i32..4,
        updates in 0i32..4,
        tail in prop::collection::vec(0i32..8, 0..24),
    ) {
        let mut words = vec![deleted, updates, 0];
        words.extend(tail);
        let bytes: Vec<u8> = words.iter().flat_map(|word| word.to_le_bytes()).collect();
        let _ = DeltaEncoder::new().decode_delta(&bytes);
    }
}
