//! # Launchrank CLI Entry Point
//!
//! Command line front end over the launchrank library, mostly useful for
//! scripting a launcher and for inspecting a usage file by hand.
//!
//! ## Usage
//!
//! ```bash
//! # Record a launch (now, or at a given epoch-millis)
//! launchrank record com.example.mail
//! launchrank record com.example.mail --at 1700000000000
//!
//! # Rank installed apps for a query
//! launchrank rank --candidates apps.json --filter ma --limit 10
//!
//! # Keep the order steady across calls
//! launchrank rank --candidates apps.json --previous shown.json
//!
//! # Drop records of uninstalled, stale and surplus apps
//! launchrank prune --installed apps.json
//!
//! # Inspect
//! launchrank show com.example.mail
//! launchrank list
//!
//! # Feed a launch log ("ID [MILLIS]" per line) through the async queue
//! launchrank replay launches.txt
//! ```
//!
//! `apps.json` is a JSON array of `{"identity", "label", "iconRef"?}`.
//! Diagnostics go to stderr; `-v` raises the level, `LAUNCHRANK_LOG`
//! overrides it.

use launchrank::maintenance::{Maintenance, PrunePolicy};
use launchrank::rank::{Candidate, RankingEngine};
use launchrank::recorder::{spawn_writer, EventRecorder, LaunchEvent};
use launchrank::usage::{now_millis, EpochMillis, LaunchableId, StoreOptions, UsageRecord};
use launchrank::{logging, Config, UsageStore};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Launchrank - frequency and recency ranking for app launchers
#[derive(Parser, Debug)]
#[command(name = "launchrank")]
#[command(author = "Luckystrike561")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Record app launches and rank apps by how often and how recently they are used", long_about = None)]
struct Args {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Usage file, overriding the configured one
    #[arg(long, value_name = "FILE", global = true)]
    data: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record one launch and print the updated record
    Record {
        /// Launchable identity
        id: String,

        /// Launch time in epoch milliseconds (defaults to now)
        #[arg(long, value_name = "MILLIS")]
        at: Option<EpochMillis>,
    },

    /// Rank installed launchables for a query
    Rank {
        /// JSON array of installed launchables
        #[arg(long, value_name = "FILE")]
        candidates: PathBuf,

        /// Label filter; empty matches everything
        #[arg(long, default_value = "")]
        filter: String,

        /// Maximum number of results (defaults to the configured limit)
        #[arg(long)]
        limit: Option<usize>,

        /// JSON array of the identities shown last time; rewritten with the new order
        #[arg(long, value_name = "FILE")]
        previous: Option<PathBuf>,
    },

    /// Remove records of uninstalled, stale and surplus launchables
    Prune {
        /// JSON array of the launchables still installed
        #[arg(long, value_name = "FILE")]
        installed: PathBuf,
    },

    /// Print the record of one launchable
    Show {
        /// Launchable identity
        id: String,
    },

    /// Print every record
    List,

    /// Record every "ID [MILLIS]" line of a file through the launch queue
    Replay {
        /// Launch log
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.verbose);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    run_application(args, &mut out).await
}

async fn run_application(args: Args, out: &mut dyn Write) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(data) = args.data {
        config.data_file = Some(data);
    }

    let data_file = config.resolve_data_file()?;
    let store = UsageStore::open_or_quarantine(&data_file, StoreOptions::from(&config.storage))
        .with_context(|| format!("Failed to open usage store: {}", data_file.display()))?;
    let store = Arc::new(store);

    let result = run_command(args.command, &config, &store, out).await;
    store.close();
    result
}

async fn run_command(
    command: Command,
    config: &Config,
    store: &Arc<UsageStore>,
    out: &mut dyn Write,
) -> Result<()> {
    match command {
        Command::Record { id, at } => {
            let record = EventRecorder::new(Arc::clone(store))
                .record_launch(&id, at)
                .with_context(|| format!("Failed to record launch of {id}"))?;
            print_record(out, &record)?;
        }

        Command::Rank {
            candidates,
            filter,
            limit,
            previous,
        } => {
            let candidates = read_candidates(&candidates)?;
            let engine = RankingEngine::from_config(Arc::clone(store), config);
            let now = now_millis();

            let ranked = match &previous {
                Some(path) => {
                    let shown = read_previous(path)?;
                    engine.rank_stable(&candidates, &filter, limit, now, shown.as_slice())
                }
                None => engine.rank(&candidates, &filter, limit, now),
            };

            for (n, item) in ranked.iter().enumerate() {
                writeln!(
                    out,
                    "{:>3}. {:<32} {:<40} {:.4}",
                    n + 1,
                    item.label(),
                    item.identity(),
                    item.score
                )?;
            }

            if let Some(path) = previous {
                let order: Vec<&str> = ranked.iter().map(|r| r.identity().as_str()).collect();
                let json = serde_json::to_string_pretty(&order)?;
                fs::write(&path, json)
                    .with_context(|| format!("Failed to write previous order: {}", path.display()))?;
            }
        }

        Command::Prune { installed } => {
            let installed: HashSet<LaunchableId> = read_candidates(&installed)?
                .into_iter()
                .map(|c| c.identity)
                .collect();
            let report = Maintenance::new(Arc::clone(store), PrunePolicy::from(config))
                .prune(&installed, now_millis())
                .context("Failed to prune usage store")?;

            writeln!(out, "uninstalled: {}", join_ids(&report.uninstalled))?;
            writeln!(out, "stale:       {}", join_ids(&report.stale))?;
            writeln!(out, "evicted:     {}", join_ids(&report.evicted))?;
            writeln!(out, "remaining:   {}", report.remaining)?;
        }

        Command::Show { id } => match store.get(&id)? {
            Some(record) => print_record(out, &record)?,
            None => bail!("No usage recorded for {id}"),
        },

        Command::List => {
            for record in store.scan_all()? {
                print_record(out, &record)?;
            }
        }

        Command::Replay { file } => {
            let contents = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read launch log: {}", file.display()))?;
            let events = parse_launch_log(&contents)
                .with_context(|| format!("Failed to parse launch log: {}", file.display()))?;

            let (sender, writer) =
                spawn_writer(EventRecorder::new(Arc::clone(store)), config.queue_capacity);

            let mut pending = Vec::with_capacity(events.len());
            for event in &events {
                pending.push(sender.submit_event(event.clone()).await?);
            }
            sender.flush().await?;
            drop(sender);

            let mut failed = 0usize;
            for (ack, event) in pending.into_iter().zip(&events) {
                if let Err(e) = ack.durable().await {
                    failed += 1;
                    writeln!(out, "failed: {}: {e}", event.identity)?;
                }
            }
            let stats = writer.join().await?;
            writeln!(
                out,
                "replayed {} launches ({} recorded, {} failed, {} retried)",
                events.len(),
                stats.recorded,
                failed,
                stats.retried
            )?;
        }
    }

    Ok(())
}

fn print_record(out: &mut dyn Write, record: &UsageRecord) -> io::Result<()> {
    let last_used = record
        .last_used()
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| record.last_used_at.to_string());
    writeln!(
        out,
        "{}\tlaunches={}\tlast_used={}",
        record.identity, record.launch_count, last_used
    )
}

fn join_ids(ids: &[LaunchableId]) -> String {
    if ids.is_empty() {
        return "-".to_string();
    }
    ids.iter()
        .map(LaunchableId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn read_candidates(path: &Path) -> Result<Vec<Candidate>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read candidates file: {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse candidates file: {}", path.display()))
}

/// A missing file means nothing was shown yet.
fn read_previous(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read previous order: {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse previous order: {}", path.display()))
}

/// Parse `ID [MILLIS]` lines; blank lines and `#` comments are skipped.
/// Parse and validate every line up front, so a bad line rejects the whole
/// log before anything is queued.
fn parse_launch_log(contents: &str) -> Result<Vec<LaunchEvent>> {
    let mut events = Vec::new();
    for (n, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split_whitespace();
        let Some(id) = fields.next() else {
            continue;
        };
        let at = fields
            .next()
            .map(str::parse::<EpochMillis>)
            .transpose()
            .with_context(|| format!("line {}: invalid timestamp", n + 1))?;
        if fields.next().is_some() {
            bail!("line {}: expected `ID [MILLIS]`", n + 1);
        }
        let event =
            LaunchEvent::new(id, at).with_context(|| format!("line {}: invalid launch", n + 1))?;
        events.push(event);
    }
    Ok(events)
}
