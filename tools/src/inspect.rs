use std::fmt::Write as _;
use std::str::FromStr;

use anyhow::{Context, Result};
use codec::{DeltaEncoder, ItemType, Snapshot, SnapshotLimits};
use schema::TypeRegistry;
use serde::Serialize;

/// Summary of one item store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InspectReport {
    pub total_size: usize,
    pub data_size: usize,
    pub num_items: usize,
    pub crc: u32,
    pub registry_hash: u64,
    pub items: Vec<ItemReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemReport {
    pub type_id: u16,
    pub id: u16,
    pub size: usize,
    /// `native`, or `extended:<name>` when the store declares a registered type.
    pub kind: String,
}

/// A `TYPE=BYTES` static size override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticSize {
    pub type_id: u16,
    pub bytes: usize,
}

impl FromStr for StaticSize {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (type_id, bytes) = value
            .split_once('=')
            .ok_or_else(|| format!("expected TYPE=BYTES, got `{value}`"))?;
        let type_id = type_id
            .trim()
            .parse()
            .map_err(|err| format!("invalid type `{type_id}`: {err}"))?;
        let bytes: usize = bytes
            .trim()
            .parse()
            .map_err(|err| format!("invalid size `{bytes}`: {err}"))?;
        if bytes % wire::WORD_SIZE != 0 {
            return Err(format!("size {bytes} is not a multiple of 4"));
        }
        Ok(Self { type_id, bytes })
    }
}

/// Parses and summarizes a serialized item store.
pub fn inspect_store(
    bytes: &[u8],
    registry: &TypeRegistry,
    limits: &SnapshotLimits,
) -> Result<InspectReport> {
    let snapshot = Snapshot::from_bytes(bytes, limits).context("parse item store")?;
    let items = snapshot
        .items()
        .enumerate()
        .map(|(index, item)| ItemReport {
            type_id: item.type_id(),
            id: item.id(),
            size: item.size(),
            kind: match snapshot.item_type(index, registry) {
                ItemType::Extended(ext) => {
                    format!("extended:{}", registry.name(ext).unwrap_or("?"))
                }
                ItemType::Native(_) | ItemType::VariantOnly(_) => "native".to_string(),
            },
        })
        .collect();
    Ok(InspectReport {
        total_size: snapshot.total_size(),
        data_size: snapshot.data_size(),
        num_items: snapshot.len(),
        crc: snapshot.crc(),
        registry_hash: schema::registry_hash(registry),
        items,
    })
}

/// Human-readable form of a report.
#[must_use]
pub fn format_report(report: &InspectReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "total_size: {} data_size: {} items: {} crc: 0x{:08x}",
        report.total_size, report.data_size, report.num_items, report.crc
    );
    let _ = writeln!(out, "registry_hash: 0x{:016x}", report.registry_hash);
    for item in &report.items {
        let _ = writeln!(
            out,
            "  type={:<5} id={:<5} size={:<5} {}",
            item.type_id, item.id, item.size, item.kind
        );
    }
    out
}

fn encoder_with(static_sizes: &[StaticSize], limits: SnapshotLimits) -> DeltaEncoder {
    let mut encoder = DeltaEncoder::with_limits(limits);
    for size in static_sizes {
        encoder.set_static_size(size.type_id, size.bytes);
    }
    encoder
}

/// Encodes the delta that turns store `from` into store `to`.
pub fn diff_stores(
    from: &[u8],
    to: &[u8],
    static_sizes: &[StaticSize],
    limits: &SnapshotLimits,
) -> Result<Vec<u8>> {
    let from = Snapshot::from_bytes(from, limits).context("parse base store")?;
    let to = Snapshot::from_bytes(to, limits).context("parse target store")?;
    let encoder = encoder_with(static_sizes, *limits);
    let delta = encoder.create_delta(&from, &to).context("create delta")?;
    tracing::debug!(
        deleted = delta.deleted.len(),
        updates = delta.updates.len(),
        "delta created"
    );
    encoder.encode_delta_to_vec(&delta).context("encode delta")
}

/// Applies encoded delta bytes to a serialized base store.
pub fn apply_delta(
    from: &[u8],
    delta: &[u8],
    static_sizes: &[StaticSize],
    limits: &SnapshotLimits,
) -> Result<Vec<u8>> {
    let from = Snapshot::from_bytes(from, limits).context("parse base store")?;
    let mut encoder = encoder_with(static_sizes, *limits);
    let rebuilt = encoder.unpack_delta(&from, delta).context("apply delta")?;
    Ok(rebuilt.to_bytes())
}
