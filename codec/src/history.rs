//! Per-connection history of sent item stores, keyed by tick.

use std::collections::VecDeque;
use std::time::Instant;

use crate::error::HistoryError;
use crate::snapshot::Snapshot;
use crate::SnapshotTick;

/// One retained store.
#[derive(Debug, Clone)]
pub struct HistoryEntry<T> {
    tick: SnapshotTick,
    tag: T,
    snapshot: Snapshot,
    alt: Option<Snapshot>,
}

impl<T> HistoryEntry<T> {
    #[must_use]
    pub const fn tick(&self) -> SnapshotTick {
        self.tick
    }

    /// Caller-supplied tag, usually the send time.
    #[must_use]
    pub const fn tag(&self) -> &T {
        &self.tag
    }

    #[must_use]
    pub const fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Alternate rendering of the same tick, if one was stored.
    #[must_use]
    pub const fn alt(&self) -> Option<&Snapshot> {
        self.alt.as_ref()
    }
}

/// Tick-ordered history of stores.
///
/// Entries are strictly increasing by tick. Growth is bounded by the
/// caller's purge policy.
#[derive(Debug, Clone)]
pub struct SnapshotHistory<T = Instant> {
    entries: VecDeque<HistoryEntry<T>>,
}

impl<T> Default for SnapshotHistory<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SnapshotHistory<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tick of the newest entry.
    #[must_use]
    pub fn last_tick(&self) -> Option<SnapshotTick> {
        self.entries.back().map(HistoryEntry::tick)
    }

    /// Tick of the oldest entry.
    #[must_use]
    pub fn first_tick(&self) -> Option<SnapshotTick> {
        self.entries.front().map(HistoryEntry::tick)
    }

    /// Appends a store at `tick`.
    ///
    /// Ticks must be strictly increasing.
    pub fn add(
        &mut self,
        tick: SnapshotTick,
        tag: T,
        snapshot: Snapshot,
        alt: Option<Snapshot>,
    ) -> Result<(), HistoryError> {
        if let Some(last) = self.last_tick() {
            if tick <= last {
                return Err(HistoryError::OutOfOrder { last, tick });
            }
        }
        self.entries.push_back(HistoryEntry {
            tick,
            tag,
            snapshot,
            alt,
        });
        Ok(())
    }

    /// Entry for an exact tick.
    #[must_use]
    pub fn get(&self, tick: SnapshotTick) -> Option<&HistoryEntry<T>> {
        self.entries.iter().find(|entry| entry.tick == tick)
    }

    /// Drops every entry older than `tick`. Returns the number dropped.
    pub fn purge_until(&mut self, tick: SnapshotTick) -> usize {
        let mut purged = 0;
        while self.entries.front().is_some_and(|entry| entry.tick < tick) {
            self.entries.pop_front();
            purged += 1;
        }
        purged
    }

    /// Drops everything.
    pub fn purge_all(&mut self) {
        self.entries.clear();
    }

    /// Iterates from oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &HistoryEntry<T>> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(ticks: &[u32]) -> SnapshotHistory<u32> {
        let mut history = SnapshotHistory::new();
        for &tick in ticks {
            history
                .add(SnapshotTick::new(tick), tick * 10, Snapshot::default(), None)
                .unwrap();
        }
        history
    }

    #[test]
    fn add_and_get() {
        let history = history(&[1, 2]);
        assert_eq!(history.get(SnapshotTick::new(1)).map(|e| *e.tag()), Some(10));
        assert_eq!(history.get(SnapshotTick::new(2)).map(|e| *e.tag()), Some(20));
        assert!(history.get(SnapshotTick::new(3)).is_none());
        assert_eq!(history.first_tick(), Some(SnapshotTick::new(1)));
        assert_eq!(history.last_tick(), Some(SnapshotTick::new(2)));
    }

    #[test]
    fn rejects_out_of_order() {
        let mut history = history(&[5]);
        let err = history
            .add(SnapshotTick::new(5), 0, Snapshot::default(), None)
            .unwrap_err();
        assert_eq!(
            err,
            HistoryError::OutOfOrder {
                last: SnapshotTick::new(5),
                tick: SnapshotTick::new(5)
            }
        );
        assert!(history
            .add(SnapshotTick::new(4), 0, Snapshot::default(), None)
            .is_err());
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn purge_until_keeps_newer_entries() {
        let mut history = history(&[1, 2, 3, 4, 5]);
        assert_eq!(history.purge_until(SnapshotTick::new(3)), 2);
        assert!(history.get(SnapshotTick::new(1)).is_none());
        assert!(history.get(SnapshotTick::new(2)).is_none());
        for tick in 3..=5 {
            assert!(history.get(SnapshotTick::new(tick)).is_some());
        }
        assert_eq!(history.purge_until(SnapshotTick::new(3)), 0);
    }

    #[test]
    fn purge_all_allows_restart() {
        let mut history = history(&[10, 11]);
        history.purge_all();
        assert!(history.is_empty());
        history
            .add(SnapshotTick::new(1), 0, Snapshot::default(), None)
            .unwrap();
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn keeps_alternate_store() {
        let mut history = SnapshotHistory::<()>::new();
        let alt = Snapshot::empty().clone();
        history
            .add(SnapshotTick::new(1), (), Snapshot::default(), Some(alt))
            .unwrap();
        assert!(history.get(SnapshotTick::new(1)).unwrap().alt().is_some());
        assert_eq!(history.iter().count(), 1);
    }
}
