use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;

use crosstune::cache::MappingCache;
use crosstune::executor::{ExecutorConfig, SyncExecutor};
use crosstune::models::{Direction, EntityKind};
use crosstune::progress::{format_duration, set_quiet};
use crosstune::safety::ensure_distinct_output;
use crosstune::scoring::{ScoreConfig, TieBreak};
use crosstune::snapshot::{LibrarySnapshot, SnapshotCatalog};

#[derive(Parser)]
#[command(name = "crosstune")]
#[command(about = "Reconcile a music library across two catalog exports")]
struct Cli {
    /// Hide progress bars (tail-friendly output)
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Plan and apply a one-way sync between two library snapshots
    Sync {
        /// Source library snapshot (JSON)
        source: PathBuf,

        /// Target library snapshot (JSON)
        target: PathBuf,

        /// Entity kind to sync: track, album, or artist
        #[arg(long, default_value = "track", value_parser = parse_kind)]
        kind: EntityKind,

        /// Sync direction label for the cache: a_to_b or b_to_a
        #[arg(long, default_value = "a_to_b", value_parser = parse_direction)]
        direction: Direction,

        /// Mapping cache database (created if missing)
        #[arg(long, default_value = "crosstune-cache.sqlite3")]
        cache: PathBuf,

        /// Concurrent search workers
        #[arg(long, default_value_t = 4)]
        workers: usize,

        /// Match and report without performing writes
        #[arg(long)]
        dry_run: bool,

        /// Reject ties between equally-similar candidates instead of
        /// keeping the first search hit
        #[arg(long)]
        strict_ties: bool,

        /// Write the not-found report to this JSON file
        #[arg(long)]
        unmatched_out: Option<PathBuf>,
    },
    /// Export accumulated mappings to a portable JSON file
    ExportCache {
        /// Mapping cache database
        cache: PathBuf,

        /// Destination JSON file
        output: PathBuf,
    },
    /// Import mappings from a portable JSON file
    ImportCache {
        /// Mapping cache database
        cache: PathBuf,

        /// Source JSON file
        input: PathBuf,
    },
}

fn parse_kind(s: &str) -> std::result::Result<EntityKind, String> {
    EntityKind::parse(s).ok_or_else(|| format!("unknown entity kind '{s}'"))
}

fn parse_direction(s: &str) -> std::result::Result<Direction, String> {
    Direction::parse(s).ok_or_else(|| format!("unknown direction '{s}'"))
}

fn main() -> Result<()> {
    colog::init();
    let cli = Cli::parse();
    set_quiet(cli.quiet);

    match cli.command {
        Command::Sync {
            source,
            target,
            kind,
            direction,
            cache,
            workers,
            dry_run,
            strict_ties,
            unmatched_out,
        } => run_sync(
            &source,
            &target,
            kind,
            direction,
            &cache,
            workers,
            dry_run,
            strict_ties,
            unmatched_out.as_deref(),
        ),
        Command::ExportCache { cache, output } => {
            let count = MappingCache::open(&cache).export_json(&output)?;
            println!("Exported {count} mappings to {}", output.display());
            Ok(())
        }
        Command::ImportCache { cache, input } => {
            let count = MappingCache::open(&cache).import_json(&input)?;
            println!("Imported {count} mappings from {}", input.display());
            Ok(())
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_sync(
    source_path: &std::path::Path,
    target_path: &std::path::Path,
    kind: EntityKind,
    direction: Direction,
    cache_path: &std::path::Path,
    workers: usize,
    dry_run: bool,
    strict_ties: bool,
    unmatched_out: Option<&std::path::Path>,
) -> Result<()> {
    if let Some(out) = unmatched_out {
        ensure_distinct_output(out, &[source_path, target_path])?;
    }

    let start = Instant::now();

    let source = LibrarySnapshot::load(source_path)?;
    let target = LibrarySnapshot::load(target_path)?;
    let catalog = SnapshotCatalog::new(target);
    let cache = MappingCache::open(cache_path);

    let score = ScoreConfig {
        tie_break: if strict_ties {
            TieBreak::Reject
        } else {
            TieBreak::SearchOrder
        },
        ..ScoreConfig::default()
    };
    let executor = SyncExecutor::new(
        &catalog,
        &cache,
        ExecutorConfig {
            workers,
            dry_run,
            score,
        },
    );

    let report = executor
        .sync_collection(kind, source.entities(kind), direction)
        .context("sync run failed")?;

    println!("\n{:=<60}", "");
    println!(
        "Sync complete{}",
        if dry_run { " (dry run)" } else { "" }
    );
    println!("  Kind:            {}", kind.as_str());
    println!("  Direction:       {}", direction.as_str());
    println!("  Processed:       {}", report.total_processed());
    println!("  Written:         {}", report.written);
    println!("  Already present: {}", report.already_present);
    println!("  From cache:      {}", report.from_cache);
    println!("  Unmatched:       {}", report.unmatched.len());
    println!("  Malformed:       {}", report.malformed.len());
    if report.failed_writes > 0 {
        println!("  Failed writes:   {}", report.failed_writes);
    }
    if report.cancelled {
        println!("  Run was cancelled before completion");
    }
    println!("  Elapsed:         {}", format_duration(start.elapsed()));
    println!("{:=<60}", "");

    if !report.unmatched.is_empty() {
        println!("\nCould not match {} {}(s):", report.unmatched.len(), kind.as_str());
        for entity in report.unmatched.iter().take(10) {
            println!("  - {} - {}", entity.display_artist, entity.display_name);
        }
        if report.unmatched.len() > 10 {
            println!("  ... and {} more", report.unmatched.len() - 10);
        }
        if let Some(out) = unmatched_out {
            let json = serde_json::to_string_pretty(&report.unmatched)?;
            std::fs::write(out, json)
                .with_context(|| format!("writing not-found report to {}", out.display()))?;
            println!("Not-found report written to {}", out.display());
        }
    }

    Ok(())
}
