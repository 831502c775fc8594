#![no_main]

use codec::{Snapshot, SnapshotLimits};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(snapshot) = Snapshot::from_bytes(data, &SnapshotLimits::default()) else {
        return;
    };
    // Accepted stores must be fully walkable and re-serialize to the input.
    for item in snapshot.items() {
        let _ = item.data().len();
    }
    let _ = snapshot.crc();
    assert_eq!(snapshot.to_bytes(), data);
});
