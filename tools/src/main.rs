use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use codec::SnapshotLimits;
use glob::Pattern;
use schema::TypeRegistry;
use session::SessionConfig;
use ticksnap_tools::{
    apply_delta, diff_stores, format_report, inspect_store, run_simulation, SimulationConfig,
    StaticSize,
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "ticksnap-tools",
    version,
    about = "ticksnap item store inspection, delta and simulation tools"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Summarize a serialized item store, or every store in a directory.
    Inspect {
        /// Path to the store bytes or a directory of stores.
        path: PathBuf,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
        /// Print every payload word.
        #[arg(long, conflicts_with = "json")]
        words: bool,
        /// Session config TOML whose registry resolves extended types.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Optional glob filter when inspecting a directory.
        #[arg(long)]
        glob: Option<String>,
        /// Sort inspected stores.
        #[arg(long, value_enum)]
        sort: Option<InspectSort>,
        /// Limit the number of inspected stores (after sorting).
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Write the delta that turns one store into another.
    Diff {
        from: PathBuf,
        to: PathBuf,
        /// Output path for the delta bytes.
        #[arg(short, long)]
        out: PathBuf,
        /// Fixed payload size for a type, as TYPE=BYTES. Repeatable.
        #[arg(long = "static-size")]
        static_sizes: Vec<StaticSize>,
    },
    /// Apply delta bytes to a store and write the result.
    Apply {
        from: PathBuf,
        delta: PathBuf,
        /// Output path for the rebuilt store.
        #[arg(short, long)]
        out: PathBuf,
        /// Fixed payload size for a type, as TYPE=BYTES. Repeatable.
        #[arg(long = "static-size")]
        static_sizes: Vec<StaticSize>,
    },
    /// Run a seeded multi-peer server simulation.
    Simulate {
        #[arg(long, default_value_t = 4)]
        peers: u32,
        #[arg(long, default_value_t = 300)]
        ticks: u32,
        #[arg(long, default_value_t = 32)]
        entities: u16,
        /// RNG seed for deterministic results.
        #[arg(long, default_value_t = 1)]
        seed: u64,
        /// Percentage of acknowledgements to drop.
        #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=100))]
        ack_loss: u8,
        /// Session config TOML.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Output path for summary JSON.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum InspectSort {
    Size,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let limits = SnapshotLimits::default();
    match cli.command {
        Command::Inspect {
            path,
            json,
            words,
            config,
            glob,
            sort,
            limit,
        } => {
            let config = load_config(config.as_deref())?;
            let registry =
                TypeRegistry::from_config(&config.registry).context("build type registry")?;
            let paths = if path.is_dir() {
                let mut entries = collect_store_entries(&path, glob.as_deref())?;
                if let Some(InspectSort::Size) = sort {
                    entries.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.path.cmp(&b.path)));
                }
                if let Some(limit) = limit.or(sort.map(|InspectSort::Size| 10)) {
                    entries.truncate(limit);
                }
                entries.into_iter().map(|entry| entry.path).collect()
            } else {
                vec![path]
            };
            for path in paths {
                let bytes = read(&path, "store")?;
                let report = inspect_store(&bytes, &registry, &limits)
                    .with_context(|| format!("inspect {}", path.display()))?;
                if json {
                    let json = serde_json::to_string_pretty(&report).context("serialize json")?;
                    println!("{json}");
                    continue;
                }
                println!("== {} ==", path.display());
                if words {
                    let snapshot = codec::Snapshot::from_bytes(&bytes, &limits)?;
                    print!("{}", snapshot.debug_dump());
                } else {
                    print!("{}", format_report(&report));
                }
            }
        }
        Command::Diff {
            from,
            to,
            out,
            static_sizes,
        } => {
            let delta = diff_stores(
                &read(&from, "base store")?,
                &read(&to, "target store")?,
                &static_sizes,
                &limits,
            )?;
            fs::write(&out, &delta).with_context(|| format!("write {}", out.display()))?;
            tracing::info!(bytes = delta.len(), out = %out.display(), "delta written");
        }
        Command::Apply {
            from,
            delta,
            out,
            static_sizes,
        } => {
            let rebuilt = apply_delta(
                &read(&from, "base store")?,
                &read(&delta, "delta")?,
                &static_sizes,
                &limits,
            )?;
            fs::write(&out, &rebuilt).with_context(|| format!("write {}", out.display()))?;
            tracing::info!(bytes = rebuilt.len(), out = %out.display(), "store written");
        }
        Command::Simulate {
            peers,
            ticks,
            entities,
            seed,
            ack_loss,
            config,
            out,
        } => {
            let session = load_config(config.as_deref())?;
            let summary = run_simulation(&SimulationConfig {
                peers,
                ticks,
                entities,
                seed,
                ack_loss_percent: ack_loss,
                session,
            })?;
            let contents = serde_json::to_string_pretty(&summary).context("serialize summary")?;
            match out {
                Some(path) => {
                    fs::write(&path, contents)
                        .with_context(|| format!("write {}", path.display()))?;
                }
                None => println!("{contents}"),
            }
            if summary.desyncs > 0 {
                anyhow::bail!("{} applied ticks differed from the server", summary.desyncs);
            }
        }
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(path: Option<&Path>) -> Result<SessionConfig> {
    match path {
        Some(path) => {
            SessionConfig::load(path).with_context(|| format!("load config {}", path.display()))
        }
        None => Ok(SessionConfig::default()),
    }
}

fn read(path: &Path, what: &str) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("read {what} {}", path.display()))
}

struct StoreEntry {
    path: PathBuf,
    size: u64,
}

fn collect_store_entries(dir: &Path, glob: Option<&str>) -> Result<Vec<StoreEntry>> {
    let mut entries = Vec::new();
    let pattern = glob
        .map(Pattern::new)
        .transpose()
        .context("invalid glob pattern")?;

    for entry in fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(pattern) = &pattern {
            let matches_path = pattern.matches_path(&path);
            let matches_name = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| pattern.matches(name));
            if !matches_path && !matches_name {
                continue;
            }
        }
        let size = entry.metadata()?.len();
        entries.push(StoreEntry { path, size });
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}
