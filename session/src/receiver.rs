//! Client side: reassemble snapshot messages and rebuild stores.

use codec::{Delta, DeltaEncoder, DeltaStats, Snapshot, SnapshotHistory, SnapshotTick};
use wire::{decompress, LimitKind, SnapMessage, WireError, WireLimits, MAX_SNAPSHOT_PARTS};

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};

#[derive(Debug, Clone)]
struct Assembly {
    tick: i32,
    num_parts: i32,
    received: u64,
    bytes: usize,
    parts: Vec<Vec<u8>>,
}

impl Assembly {
    fn new(tick: i32, num_parts: i32) -> Self {
        let count = usize::try_from(num_parts).unwrap_or(0);
        Self {
            tick,
            num_parts,
            received: 0,
            bytes: 0,
            parts: vec![Vec::new(); count],
        }
    }

    fn is_complete(&self) -> bool {
        self.received.count_ones() as usize == self.parts.len()
    }
}

/// Rebuilds the sender's stores from snapshot messages.
///
/// Each applied tick is kept as a base for later deltas and should be
/// acknowledged to the sender.
#[derive(Debug, Clone)]
pub struct SnapshotReceiver {
    compress: bool,
    limits: WireLimits,
    encoder: DeltaEncoder,
    history: SnapshotHistory<()>,
    assembly: Option<Assembly>,
    unpacked: Vec<u8>,
    newest_tick: Option<i32>,
    applied_tick: Option<i32>,
    crc_errors: u32,
}

impl SnapshotReceiver {
    #[must_use]
    pub fn new(config: &SessionConfig) -> Self {
        Self::with_limits(config, WireLimits::default())
    }

    #[must_use]
    pub fn with_limits(config: &SessionConfig, limits: WireLimits) -> Self {
        Self {
            compress: config.compress,
            limits,
            encoder: DeltaEncoder::new(),
            history: SnapshotHistory::new(),
            assembly: None,
            unpacked: Vec::new(),
            newest_tick: None,
            applied_tick: None,
            crc_errors: 0,
        }
    }

    /// Agrees a static payload size for `type_id` with the sender.
    pub fn set_static_size(&mut self, type_id: u16, size: usize) {
        self.encoder.set_static_size(type_id, size);
    }

    /// Handles one message. Returns the tick to acknowledge once a store
    /// has been rebuilt, `None` while parts are missing or for stale ticks.
    ///
    /// On error the receiver keeps its previous stores.
    pub fn receive(&mut self, message: &SnapMessage) -> SessionResult<Option<SnapshotTick>> {
        let tick = message.tick();
        if tick < 0 {
            return Err(SessionError::InvalidTick { tick });
        }
        if self.applied_tick.is_some_and(|applied| tick <= applied)
            || self.newest_tick.is_some_and(|newest| tick < newest)
        {
            tracing::trace!(tick, "ignoring stale snapshot message");
            return Ok(None);
        }
        if self.newest_tick != Some(tick) {
            self.assembly = None;
            self.newest_tick = Some(tick);
        }

        match message {
            SnapMessage::Empty { delta_tick, .. } => self.apply(tick, *delta_tick, None, &[]),
            SnapMessage::Single {
                delta_tick,
                crc,
                data,
                ..
            } => self.apply(tick, *delta_tick, Some(*crc), data),
            SnapMessage::Part {
                delta_tick,
                num_parts,
                part,
                crc,
                data,
                ..
            } => {
                let Some(joined) = self.collect_part(tick, *num_parts, *part, data)? else {
                    return Ok(None);
                };
                self.apply(tick, *delta_tick, Some(*crc), &joined)
            }
        }
    }

    fn collect_part(
        &mut self,
        tick: i32,
        num_parts: i32,
        part: i32,
        data: &[u8],
    ) -> SessionResult<Option<Vec<u8>>> {
        if usize::try_from(num_parts).map_or(true, |count| count > MAX_SNAPSHOT_PARTS) {
            return Err(WireError::LimitsExceeded {
                kind: LimitKind::Parts,
                limit: MAX_SNAPSHOT_PARTS,
                actual: usize::try_from(num_parts).unwrap_or(0),
            }
            .into());
        }
        let index = usize::try_from(part)
            .ok()
            .filter(|_| part < num_parts)
            .ok_or(WireError::PartOutOfRange { part, num_parts })?;
        let mut assembly = match self.assembly.take() {
            Some(assembly) if assembly.tick == tick && assembly.num_parts == num_parts => assembly,
            _ => Assembly::new(tick, num_parts),
        };
        let bit = 1u64 << index;
        if assembly.received & bit == 0 {
            let bytes = assembly.bytes + data.len();
            if bytes > self.limits.max_snapshot_bytes {
                return Err(WireError::LimitsExceeded {
                    kind: LimitKind::SnapshotBytes,
                    limit: self.limits.max_snapshot_bytes,
                    actual: bytes,
                }
                .into());
            }
            assembly.bytes = bytes;
            assembly.received |= bit;
            assembly.parts[index] = data.to_vec();
        }
        if !assembly.is_complete() {
            self.assembly = Some(assembly);
            return Ok(None);
        }
        Ok(Some(assembly.parts.concat()))
    }

    fn apply(
        &mut self,
        tick: i32,
        delta_tick: i32,
        crc: Option<u32>,
        data: &[u8],
    ) -> SessionResult<Option<SnapshotTick>> {
        let base_tick = tick.wrapping_sub(delta_tick);
        let base = if base_tick < 0 {
            Snapshot::empty()
        } else {
            self.history
                .get(SnapshotTick::new(base_tick as u32))
                .map(|entry| entry.snapshot())
                .ok_or_else(|| {
                    tracing::warn!(tick, base = base_tick, "delta base not found");
                    SessionError::MissingBase {
                        tick,
                        base: base_tick,
                    }
                })?
        };

        let snapshot = if data.is_empty() {
            self.encoder.apply_delta(base, &Delta::default())?
        } else {
            let delta_bytes = if self.compress {
                decompress(data, &mut self.unpacked, self.limits.max_snapshot_bytes)?;
                self.unpacked.as_slice()
            } else {
                data
            };
            self.encoder
                .unpack_delta(base, delta_bytes)
                .map_err(|err| {
                    tracing::warn!(tick, %err, "malformed delta from peer");
                    err
                })?
        };

        if let Some(expected) = crc {
            let actual = snapshot.crc();
            if actual != expected {
                self.crc_errors += 1;
                tracing::warn!(
                    tick,
                    expected,
                    actual,
                    errors = self.crc_errors,
                    "snapshot crc mismatch"
                );
                return Err(SessionError::CrcMismatch {
                    tick,
                    expected,
                    actual,
                });
            }
        }

        if base_tick >= 0 {
            self.history
                .purge_until(SnapshotTick::new(base_tick as u32));
        }
        let tick_id = SnapshotTick::new(tick as u32);
        self.history.add(tick_id, (), snapshot, None)?;
        self.applied_tick = Some(tick);
        self.assembly = None;
        Ok(Some(tick_id))
    }

    /// Newest rebuilt store.
    #[must_use]
    pub fn latest(&self) -> Option<(SnapshotTick, &Snapshot)> {
        self.history
            .iter()
            .next_back()
            .map(|entry| (entry.tick(), entry.snapshot()))
    }

    /// Rebuilt store for `tick`, if still kept.
    #[must_use]
    pub fn snapshot(&self, tick: SnapshotTick) -> Option<&Snapshot> {
        self.history.get(tick).map(|entry| entry.snapshot())
    }

    /// Number of checksum failures seen.
    #[must_use]
    pub const fn crc_errors(&self) -> u32 {
        self.crc_errors
    }

    #[must_use]
    pub const fn stats(&self) -> &DeltaStats {
        self.encoder.stats()
    }

    /// Forgets every store, as on a map change or reconnect.
    pub fn reset(&mut self) {
        self.history.purge_all();
        self.assembly = None;
        self.newest_tick = None;
        self.applied_tick = None;
        self.crc_errors = 0;
    }
}
