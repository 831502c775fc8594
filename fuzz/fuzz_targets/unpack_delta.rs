#![no_main]

use codec::{DeltaEncoder, Snapshot, SnapshotLimits};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // First byte picks how much of the input is the base store.
    let Some((&split, rest)) = data.split_first() else {
        return;
    };
    let split = (usize::from(split) * 4).min(rest.len());
    let (base, delta) = rest.split_at(split);
    let limits = SnapshotLimits::for_testing();
    let base = Snapshot::from_bytes(base, &limits).unwrap_or_default();

    let mut encoder = DeltaEncoder::with_limits(limits);
    encoder.set_static_size(1, 8);
    if let Ok(rebuilt) = encoder.unpack_delta(&base, delta) {
        assert!(rebuilt.len() <= limits.max_items);
        assert!(rebuilt.data_size() <= limits.max_data_size);
    }
});
