//! Diagnostic counters for received deltas.

use std::collections::BTreeMap;

use wire::{VarInt, WORD_SIZE};

/// Counters for one item type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypeStats {
    /// Number of update records applied.
    pub updates: u64,
    /// Estimated payload bits on the wire.
    pub bits: u64,
}

/// Per-type delta counters. Informational only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeltaStats {
    per_type: BTreeMap<u16, TypeStats>,
}

impl DeltaStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a diffed update: zero words cost one bit, others their packed length.
    pub fn record_diff(&mut self, type_id: u16, diff: &[i32]) {
        let bits: u64 = diff
            .iter()
            .map(|&word| {
                if word == 0 {
                    1
                } else {
                    VarInt::packed_len(word) as u64 * 8
                }
            })
            .sum();
        self.record(type_id, bits);
    }

    /// Counts an update sent as a full payload.
    pub fn record_full(&mut self, type_id: u16, payload: &[i32]) {
        self.record(type_id, (payload.len() * WORD_SIZE * 8) as u64);
    }

    fn record(&mut self, type_id: u16, bits: u64) {
        let entry = self.per_type.entry(type_id).or_default();
        entry.updates += 1;
        entry.bits += bits;
    }

    /// Counters for `type_id`; zero when nothing was recorded.
    #[must_use]
    pub fn get(&self, type_id: u16) -> TypeStats {
        self.per_type.get(&type_id).copied().unwrap_or_default()
    }

    /// Iterates recorded types in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (u16, TypeStats)> + '_ {
        self.per_type.iter().map(|(&type_id, &stats)| (type_id, stats))
    }

    /// Sum over every type.
    #[must_use]
    pub fn total(&self) -> TypeStats {
        self.per_type
            .values()
            .fold(TypeStats::default(), |acc, stats| TypeStats {
                updates: acc.updates + stats.updates,
                bits: acc.bits + stats.bits,
            })
    }

    pub(crate) fn merge(&mut self, other: &Self) {
        for (&type_id, stats) in &other.per_type {
            let entry = self.per_type.entry(type_id).or_default();
            entry.updates += stats.updates;
            entry.bits += stats.bits;
        }
    }

    pub fn clear(&mut self) {
        self.per_type.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_bits_count_zero_words_as_one() {
        let mut stats = DeltaStats::new();
        stats.record_diff(3, &[0, 0, 1]);
        // 1 + 1 + one packed byte
        assert_eq!(
            stats.get(3),
            TypeStats {
                updates: 1,
                bits: 10
            }
        );
    }

    #[test]
    fn full_payload_counts_bytes() {
        let mut stats = DeltaStats::new();
        stats.record_full(2, &[1, 2]);
        assert_eq!(stats.get(2).bits, 64);
        assert_eq!(stats.get(9), TypeStats::default());
    }

    #[test]
    fn total_and_clear() {
        let mut stats = DeltaStats::new();
        stats.record_full(1, &[1]);
        stats.record_diff(2, &[0]);
        assert_eq!(
            stats.total(),
            TypeStats {
                updates: 2,
                bits: 33
            }
        );
        assert_eq!(stats.iter().map(|(ty, _)| ty).collect::<Vec<_>>(), vec![1, 2]);
        stats.clear();
        assert_eq!(stats.total(), TypeStats::default());
    }

    #[test]
    fn merge_adds_counters() {
        let mut a = DeltaStats::new();
        a.record_full(1, &[1]);
        let mut b = DeltaStats::new();
        b.record_full(1, &[1]);
        a.merge(&b);
        assert_eq!(a.get(1).updates, 2);
    }
}
