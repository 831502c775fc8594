//! Inspection and simulation tools for ticksnap item stores.
//!
//! - Summarize serialized item stores, resolving extended types through a
//!   registry
//! - Create and apply deltas between stores on disk
//! - Run a seeded multi-peer server simulation and report traffic

pub mod inspect;
pub mod simulate;

pub use inspect::{
    apply_delta, diff_stores, format_report, inspect_store, InspectReport, ItemReport, StaticSize,
};
pub use simulate::{run as run_simulation, SimulationConfig, SimulationSummary, TypeSummary};
