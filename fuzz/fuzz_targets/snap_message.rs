#![no_main]

use libfuzzer_sys::fuzz_target;
use session::{SessionConfig, SnapshotReceiver};
use wire::{decode_message, WireLimits};

fuzz_target!(|data: &[u8]| {
    let mut receiver = SnapshotReceiver::new(&SessionConfig::default());
    // Inputs are a sequence of length-prefixed frames.
    let mut rest = data;
    while let Some((&len, tail)) = rest.split_first() {
        let len = usize::from(len).min(tail.len());
        let (frame, next) = tail.split_at(len);
        rest = next;
        if let Ok(message) = decode_message(frame, &WireLimits::default()) {
            let _ = receiver.receive(&message);
        }
    }
});
