//! urivstat-aggregate - aggregate an existing snapshot directory
//!
//! Reads the per-table CSV files of one snapshot and writes the summary
//! tables plus `manifest.json`.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use urivstat_core::config::{AnalyticsOverrides, StreakAnchor};
use urivstat_core::format::format_duration;
use urivstat_core::pipeline::{self, RunManifest};
use urivstat_core::Config;

#[derive(Parser, Debug)]
#[command(name = "urivstat-aggregate")]
#[command(about = "Aggregate a URIV snapshot into summary tables")]
#[command(version)]
struct Args {
    /// Snapshot directory holding users.csv, page_views.csv, ...
    snapshot_dir: PathBuf,

    /// Output directory (default: <snapshot_dir>/aggregated)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Compute as of this date (YYYY-MM-DD, end of day) or RFC 3339 instant
    #[arg(long)]
    as_of: Option<String>,

    /// Minutes of inactivity that close a session
    #[arg(long)]
    gap_minutes: Option<u32>,

    /// Keep admin accounts in the per-user tables
    #[arg(long)]
    include_admins: bool,

    /// Current streak anchor: today or last-active
    #[arg(long)]
    streak_anchor: Option<StreakAnchor>,

    /// Output format: text (default) or json
    #[arg(short, long, default_value = "text")]
    format: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load().context("failed to load configuration")?;
    let _log_guard =
        urivstat_core::logging::init(&config.logging).context("failed to initialize logging")?;

    config.analytics.apply(&AnalyticsOverrides {
        session_gap_minutes: args.gap_minutes,
        current_streak: args.streak_anchor,
        include_admins: args.include_admins,
    });
    config
        .analytics
        .validate()
        .context("invalid analytics settings")?;

    let offset = config.analytics.reference_offset()?;
    let as_of = pipeline::resolve_as_of(args.as_of.as_deref(), offset)?;
    tracing::info!(snapshot = %args.snapshot_dir.display(), %as_of, "Aggregating snapshot");
    let out_dir = args
        .out
        .clone()
        .unwrap_or_else(|| pipeline::default_out_dir(&args.snapshot_dir));

    let manifest = pipeline::aggregate_snapshot(&args.snapshot_dir, &out_dir, &config, as_of)
        .with_context(|| format!("failed to aggregate {}", args.snapshot_dir.display()))?;

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&manifest)?),
        "text" => print_text(&manifest),
        other => anyhow::bail!("Unknown output format: {}. Use 'text' or 'json'", other),
    }
    Ok(())
}

fn print_text(manifest: &RunManifest) {
    println!("Aggregated {}", manifest.snapshot_dir.display());
    println!("  as of:    {} ({})", manifest.today, manifest.as_of.to_rfc3339());
    println!(
        "  gap:      {}",
        format_duration(i64::from(manifest.analytics.session_gap_minutes) * 60)
    );
    println!("  dropped:  {} row(s)", manifest.normalize.dropped());
    println!();
    for output in &manifest.outputs {
        println!("  {:<28} {:>8} row(s)", output.file, output.rows);
    }
    println!();
    println!("Written to {}", manifest.out_dir.display());
}
