//! Per-peer send state: history, acknowledgement and snap rate.

use std::time::{Duration, Instant};

use codec::{SnapshotHistory, SnapshotTick};

use crate::config::SessionConfig;

/// How often a peer is sent snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapRate {
    /// No acknowledgement yet; send every `init_interval` ticks.
    #[default]
    Init,
    /// The acknowledged base was lost; send every `recover_interval` ticks.
    Recover,
    /// Send every tick.
    Full,
}

/// Snapshot state the sender keeps for one connection.
#[derive(Debug, Clone, Default)]
pub struct PeerSnapshots {
    pub(crate) history: SnapshotHistory<Instant>,
    last_acked: Option<SnapshotTick>,
    rate: SnapRate,
    latency: Option<Duration>,
}

impl PeerSnapshots {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn rate(&self) -> SnapRate {
        self.rate
    }

    #[must_use]
    pub const fn last_acked(&self) -> Option<SnapshotTick> {
        self.last_acked
    }

    /// Round trip time measured from the last acknowledged store.
    #[must_use]
    pub const fn latency(&self) -> Option<Duration> {
        self.latency
    }

    #[must_use]
    pub const fn history(&self) -> &SnapshotHistory<Instant> {
        &self.history
    }

    /// Returns `true` if this peer is due a snapshot at `tick`.
    #[must_use]
    pub fn should_send(&self, tick: SnapshotTick, config: &SessionConfig) -> bool {
        let interval = match self.rate {
            SnapRate::Full => return true,
            SnapRate::Init => config.init_interval,
            SnapRate::Recover => config.recover_interval,
        };
        tick.raw() % interval.max(1) == 0
    }

    /// Records an acknowledgement from the peer.
    ///
    /// Any acknowledged tick above zero switches to full rate. Latency is
    /// measured when the acknowledged store is still in history.
    pub fn on_ack(&mut self, tick: SnapshotTick, now: Instant) {
        self.last_acked = Some(tick);
        if !tick.is_zero() && self.rate != SnapRate::Full {
            tracing::info!(tick = tick.raw(), from = ?self.rate, "snap rate full");
            self.rate = SnapRate::Full;
        }
        if let Some(entry) = self.history.get(tick) {
            self.latency = Some(now.saturating_duration_since(*entry.tag()));
        }
    }

    /// Forgets everything, as on a map change or reconnect.
    pub fn reset(&mut self) {
        tracing::info!(stored = self.history.len(), "peer snapshots reset");
        self.history.purge_all();
        self.last_acked = None;
        self.rate = SnapRate::Init;
        self.latency = None;
    }

    /// Falls back to recover rate after the acknowledged base was lost.
    pub(crate) fn base_lost(&mut self) {
        if self.rate == SnapRate::Full {
            tracing::info!("acked base lost, snap rate recover");
            self.rate = SnapRate::Recover;
        }
    }
}

#[cfg(test)]
mod tests {
    use codec::Snapshot;

    use super::*;

    #[test]
    fn init_rate_sends_every_interval() {
        let peer = PeerSnapshots::new();
        let config = SessionConfig::default();
        assert_eq!(peer.rate(), SnapRate::Init);
        assert!(peer.should_send(SnapshotTick::new(20), &config));
        assert!(!peer.should_send(SnapshotTick::new(21), &config));
    }

    #[test]
    fn ack_above_zero_switches_to_full() {
        let mut peer = PeerSnapshots::new();
        let now = Instant::now();
        peer.on_ack(SnapshotTick::new(0), now);
        assert_eq!(peer.rate(), SnapRate::Init);
        peer.on_ack(SnapshotTick::new(3), now);
        assert_eq!(peer.rate(), SnapRate::Full);
        assert!(peer.should_send(SnapshotTick::new(7), &SessionConfig::default()));
    }

    #[test]
    fn base_lost_only_downgrades_full() {
        let mut peer = PeerSnapshots::new();
        peer.base_lost();
        assert_eq!(peer.rate(), SnapRate::Init);
        peer.on_ack(SnapshotTick::new(1), Instant::now());
        peer.base_lost();
        assert_eq!(peer.rate(), SnapRate::Recover);
        let config = SessionConfig::default();
        assert!(peer.should_send(SnapshotTick::new(100), &config));
        assert!(!peer.should_send(SnapshotTick::new(110), &config));
    }

    #[test]
    fn latency_measured_from_history_tag() {
        let mut peer = PeerSnapshots::new();
        let sent = Instant::now();
        peer.history
            .add(SnapshotTick::new(4), sent, Snapshot::default(), None)
            .unwrap();
        peer.on_ack(SnapshotTick::new(4), sent + Duration::from_millis(40));
        assert_eq!(peer.latency(), Some(Duration::from_millis(40)));
    }

    #[test]
    fn reset_clears_state() {
        let mut peer = PeerSnapshots::new();
        peer.history
            .add(SnapshotTick::new(1), Instant::now(), Snapshot::default(), None)
            .unwrap();
        peer.on_ack(SnapshotTick::new(1), Instant::now());
        peer.reset();
        assert!(peer.history().is_empty());
        assert_eq!(peer.last_acked(), None);
        assert_eq!(peer.rate(), SnapRate::Init);
    }
}
