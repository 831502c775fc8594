//! Server side: turn each tick's store into snapshot messages for a peer.

use std::time::Instant;

use codec::{DeltaEncoder, Snapshot, SnapshotTick};
use wire::{chunk_snapshot, compress, SnapMessage};

use crate::config::SessionConfig;
use crate::error::SessionResult;
use crate::peer::PeerSnapshots;

/// Builds the messages that carry one tick to one peer.
#[derive(Debug, Clone)]
pub struct SnapshotSender {
    config: SessionConfig,
    encoder: DeltaEncoder,
    packed: Vec<u8>,
}

impl SnapshotSender {
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            encoder: DeltaEncoder::new(),
            packed: Vec::new(),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Agrees a static payload size for `type_id` with every peer.
    pub fn set_static_size(&mut self, type_id: u16, size: usize) {
        self.encoder.set_static_size(type_id, size);
    }

    /// Encodes `snapshot` against the peer's last acknowledged store and
    /// stores it in the peer's history.
    ///
    /// Falls back to the empty store when that base is gone. The snapshot is
    /// only stored once its messages are built, so a failed tick can be
    /// retried. Callers check [`PeerSnapshots::should_send`] first.
    pub fn send_tick(
        &mut self,
        peer: &mut PeerSnapshots,
        tick: SnapshotTick,
        snapshot: &Snapshot,
        now: Instant,
    ) -> SessionResult<Vec<SnapMessage>> {
        peer.history
            .purge_until(tick.saturating_sub(self.config.history_ticks()));

        let acked = peer
            .last_acked()
            .and_then(|acked| peer.history.get(acked).map(|entry| (acked, entry)));
        let (base, base_tick) = match acked {
            Some((acked, entry)) => (entry.snapshot(), Some(acked)),
            None => (Snapshot::empty(), None),
        };
        let delta = self.encoder.create_delta(base, snapshot)?;

        let tick_word = wire_tick(tick);
        let delta_tick = match base_tick {
            Some(base) => tick_word.wrapping_sub(wire_tick(base)),
            None => tick_word.wrapping_add(1),
        };
        let crc = snapshot.crc();
        let messages = if delta.is_empty() {
            chunk_snapshot(tick_word, delta_tick, crc, &[], self.config.max_pack_size)?
        } else {
            let encoded = self.encoder.encode_delta_to_vec(&delta)?;
            let payload = if self.config.compress {
                compress(&encoded, &mut self.packed)?;
                &self.packed
            } else {
                &encoded
            };
            let messages = chunk_snapshot(
                tick_word,
                delta_tick,
                crc,
                payload,
                self.config.max_pack_size,
            )?;
            tracing::trace!(
                tick = tick.raw(),
                delta_tick,
                bytes = payload.len(),
                parts = messages.len(),
                "snapshot encoded"
            );
            messages
        };

        peer.history.add(tick, now, snapshot.clone(), None)?;
        if base_tick.is_none() {
            tracing::debug!(
                tick = tick.raw(),
                acked = ?peer.last_acked().map(SnapshotTick::raw),
                "no acked base, delta against empty store"
            );
            peer.base_lost();
        }
        Ok(messages)
    }
}

/// Ticks are carried as signed words on the wire.
pub(crate) const fn wire_tick(tick: SnapshotTick) -> i32 {
    tick.raw() as i32
}
