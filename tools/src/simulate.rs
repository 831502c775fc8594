use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use codec::{ItemType, Numbering, Snapshot, SnapshotBuilder, SnapshotLimits, SnapshotTick};
use schema::TypeRegistry;
use serde::Serialize;
use session::{PeerSnapshots, SessionConfig, SnapIdPool, SnapshotReceiver, SnapshotSender};
use wire::{decode_message, encode_message, WireLimits};

const CHARACTER_TYPE: u16 = 1;
const GAME_INFO_TYPE: u16 = 2;
const CHARACTER_BYTES: usize = 16;
const WORLD_SIZE: i32 = 4096;

/// Parameters for a synthetic server run.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub peers: u32,
    pub ticks: u32,
    pub entities: u16,
    pub seed: u64,
    /// Percentage of acknowledgements dropped on the way back.
    pub ack_loss_percent: u8,
    pub session: SessionConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            peers: 4,
            ticks: 300,
            entities: 32,
            seed: 1,
            ack_loss_percent: 0,
            session: SessionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationSummary {
    pub peers: u32,
    pub ticks: u32,
    pub entities: u16,
    pub seed: u64,
    pub ack_loss_percent: u8,
    pub messages: u64,
    pub bytes_total: u64,
    pub avg_message_bytes: u64,
    pub p95_message_bytes: u64,
    /// Sends encoded against the empty store.
    pub full_sends: u64,
    pub applied: u64,
    pub acks_dropped: u64,
    pub crc_errors: u32,
    pub desyncs: u64,
    pub per_type: Vec<TypeSummary>,
    #[serde(skip)]
    message_sizes: Vec<u64>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TypeSummary {
    pub type_id: u16,
    pub updates: u64,
    pub bits: u64,
}

impl SimulationSummary {
    fn new(config: &SimulationConfig) -> Self {
        Self {
            peers: config.peers,
            ticks: config.ticks,
            entities: config.entities,
            seed: config.seed,
            ack_loss_percent: config.ack_loss_percent,
            messages: 0,
            bytes_total: 0,
            avg_message_bytes: 0,
            p95_message_bytes: 0,
            full_sends: 0,
            applied: 0,
            acks_dropped: 0,
            crc_errors: 0,
            desyncs: 0,
            per_type: Vec::new(),
            message_sizes: Vec::new(),
        }
    }

    fn finalize(&mut self, clients: &[Client]) {
        if self.messages > 0 {
            self.avg_message_bytes = self.bytes_total / self.messages;
            self.p95_message_bytes = p95(&mut self.message_sizes);
        }
        let mut per_type = BTreeMap::<u16, TypeSummary>::new();
        for client in clients {
            self.crc_errors += client.receiver.crc_errors();
            for (type_id, stats) in client.receiver.stats().iter() {
                let entry = per_type.entry(type_id).or_insert(TypeSummary {
                    type_id,
                    updates: 0,
                    bits: 0,
                });
                entry.updates += stats.updates;
                entry.bits += stats.bits;
            }
        }
        self.per_type = per_type.into_values().collect();
    }
}

struct Client {
    peer: PeerSnapshots,
    receiver: SnapshotReceiver,
}

#[derive(Debug, Clone, Copy)]
struct Character {
    id: u16,
    pos: [i32; 2],
    vel: [i32; 2],
    health: i32,
}

struct World {
    builder: SnapshotBuilder,
    ids: SnapIdPool,
    characters: Vec<Character>,
}

impl World {
    fn new(
        registry: Arc<TypeRegistry>,
        config: &SimulationConfig,
        rng: &mut Rng,
        now: Instant,
    ) -> Result<Self> {
        let mut ids = SnapIdPool::new(config.session.id_timeout());
        let mut characters = Vec::with_capacity(usize::from(config.entities));
        for _ in 0..config.entities {
            let id = ids.new_id(now).context("allocate snap id")?;
            characters.push(Character::spawn(id, rng));
        }
        Ok(Self {
            builder: SnapshotBuilder::new(registry, SnapshotLimits::default()),
            ids,
            characters,
        })
    }

    fn step(&mut self, rng: &mut Rng, now: Instant) -> Result<()> {
        for character in &mut self.characters {
            if rng.chance(1) {
                character.health = 0;
            }
            if rng.chance(10) {
                character.vel = [rng.range(-8, 8), rng.range(-8, 8)];
            }
            for (pos, vel) in character.pos.iter_mut().zip(character.vel) {
                *pos = (*pos + vel).clamp(0, WORLD_SIZE);
            }
        }
        for character in &mut self.characters {
            if character.health > 0 {
                continue;
            }
            self.ids.free_id(character.id, now)?;
            let id = self.ids.new_id(now).context("allocate snap id")?;
            *character = Character::spawn(id, rng);
        }
        Ok(())
    }

    fn snapshot(&mut self, tick: u32) -> Result<Snapshot> {
        self.builder.reset(Numbering::Native);
        let count = i32::try_from(self.characters.len()).unwrap_or(i32::MAX);
        self.builder
            .new_item(ItemType::Native(GAME_INFO_TYPE), 0, 8)?
            .copy_from_slice(&[i32::try_from(tick).unwrap_or(i32::MAX), count]);
        for character in &self.characters {
            self.builder
                .new_item(
                    ItemType::Native(CHARACTER_TYPE),
                    i32::from(character.id),
                    CHARACTER_BYTES,
                )?
                .copy_from_slice(&[
                    character.pos[0],
                    character.pos[1],
                    character.vel[0] + character.vel[1] * 256,
                    character.health,
                ]);
        }
        Ok(self.builder.finish())
    }
}

impl Character {
    fn spawn(id: u16, rng: &mut Rng) -> Self {
        Self {
            id,
            pos: [rng.range(0, WORLD_SIZE), rng.range(0, WORLD_SIZE)],
            vel: [rng.range(-8, 8), rng.range(-8, 8)],
            health: 10,
        }
    }
}

/// Runs a deterministic server with `peers` clients over the message framing.
///
/// Every client must end up with the exact store the server sent for each
/// applied tick; mismatches are counted as desyncs.
pub fn run(config: &SimulationConfig) -> Result<SimulationSummary> {
    config.session.validate().context("invalid session config")?;
    let registry = Arc::new(
        TypeRegistry::from_config(&config.session.registry).context("build type registry")?,
    );
    let start = Instant::now();
    let tick_ms = 1000 / u64::from(config.session.tick_speed);
    let mut rng = Rng::new(config.seed);
    let mut world = World::new(registry, config, &mut rng, start)?;
    let mut sender = SnapshotSender::new(config.session.clone());
    sender.set_static_size(CHARACTER_TYPE, CHARACTER_BYTES);
    let mut clients: Vec<Client> = (0..config.peers)
        .map(|_| {
            let mut receiver = SnapshotReceiver::new(&config.session);
            receiver.set_static_size(CHARACTER_TYPE, CHARACTER_BYTES);
            Client {
                peer: PeerSnapshots::new(),
                receiver,
            }
        })
        .collect();
    let mut summary = SimulationSummary::new(config);
    let mut frame = Vec::new();

    for tick in 1..=config.ticks {
        let now = start + Duration::from_millis(u64::from(tick) * tick_ms);
        world.step(&mut rng, now)?;
        let snapshot = world.snapshot(tick)?;
        let tick = SnapshotTick::new(tick);

        for client in &mut clients {
            if !client.peer.should_send(tick, &config.session) {
                continue;
            }
            let messages = sender.send_tick(&mut client.peer, tick, &snapshot, now)?;
            if messages
                .first()
                .is_some_and(|message| i64::from(message.delta_tick()) == i64::from(tick.raw()) + 1)
            {
                summary.full_sends += 1;
            }
            for message in &messages {
                frame.clear();
                encode_message(message, &mut frame);
                summary.messages += 1;
                summary.bytes_total += frame.len() as u64;
                summary.message_sizes.push(frame.len() as u64);

                let message = decode_message(&frame, &WireLimits::default())?;
                let Some(applied) = client.receiver.receive(&message)? else {
                    continue;
                };
                summary.applied += 1;
                let in_sync = client
                    .receiver
                    .snapshot(applied)
                    .is_some_and(|received| received.same_items(&snapshot));
                if !in_sync {
                    tracing::warn!(tick = applied.raw(), "client store differs from server");
                    summary.desyncs += 1;
                }
                if rng.chance(config.ack_loss_percent) {
                    summary.acks_dropped += 1;
                } else {
                    client.peer.on_ack(applied, now + Duration::from_millis(tick_ms));
                }
            }
        }
    }

    summary.finalize(&clients);
    tracing::info!(
        messages = summary.messages,
        bytes = summary.bytes_total,
        applied = summary.applied,
        desyncs = summary.desyncs,
        "simulation finished"
    );
    Ok(summary)
}

fn p95(values: &mut [u64]) -> u64 {
    values.sort_unstable();
    let idx = (values.len() * 95).div_ceil(100);
    let idx = idx.saturating_sub(1).min(values.len() - 1);
    values[idx]
}

struct Rng {
    state: u64,
}

impl Rng {
    const fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u32(&mut self) -> u32 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1);
        (self.state >> 32) as u32
    }

    fn range(&mut self, min: i32, max: i32) -> i32 {
        let span = i64::from(max) - i64::from(min) + 1;
        let value = i64::from(self.next_u32()) % span;
        (i64::from(min) + value) as i32
    }

    fn chance(&mut self, percent: u8) -> bool {
        self.next_u32() % 100 < u32::from(percent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small(peers: u32, ack_loss_percent: u8) -> SimulationConfig {
        SimulationConfig {
            peers,
            ticks: 120,
            entities: 12,
            seed: 7,
            ack_loss_percent,
            session: SessionConfig::default(),
        }
    }

    #[test]
    fn clients_stay_in_sync() {
        let summary = run(&small(3, 0)).unwrap();
        assert_eq!(summary.desyncs, 0);
        assert_eq!(summary.crc_errors, 0);
        assert!(summary.applied > 3 * 100);
        assert_eq!(summary.full_sends, 3, "only the first send has no base");
        assert!(summary.p95_message_bytes >= summary.avg_message_bytes / 2);
        assert!(summary
            .per_type
            .iter()
            .any(|stats| stats.type_id == CHARACTER_TYPE && stats.updates > 0));
    }

    #[test]
    fn dropped_acks_still_converge() {
        let summary = run(&small(2, 60)).unwrap();
        assert!(summary.acks_dropped > 0);
        assert_eq!(summary.desyncs, 0);
        assert_eq!(summary.crc_errors, 0);
    }

    #[test]
    fn same_seed_is_deterministic() {
        let first = run(&small(1, 20)).unwrap();
        let second = run(&small(1, 20)).unwrap();
        assert_eq!(first.bytes_total, second.bytes_total);
        assert_eq!(first.applied, second.applied);
    }

    #[test]
    fn small_packets_split_into_parts() {
        let mut config = small(1, 0);
        config.session.max_pack_size = 64;
        config.session.compress = false;
        let summary = run(&config).unwrap();
        assert!(summary.messages > summary.applied);
        assert_eq!(summary.desyncs, 0);
    }

    #[test]
    fn summary_serializes() {
        let summary = run(&small(1, 0)).unwrap();
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["peers"], 1);
        assert!(json.get("message_sizes").is_none());
    }

    #[test]
    fn rejects_invalid_session_config() {
        let mut config = small(1, 0);
        config.session.tick_speed = 0;
        let err = run(&config).unwrap_err();
        assert_eq!(err.to_string(), "invalid session config");
    }
}
