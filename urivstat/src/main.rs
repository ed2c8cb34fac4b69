//! urivstat - snapshot the URIV database and aggregate it in one run
//!
//! Equivalent to `urivstat-export` followed by `urivstat-aggregate` on the
//! new snapshot.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use urivstat_core::config::{AnalyticsOverrides, StreakAnchor};
use urivstat_core::{pipeline, Config};

#[derive(Parser, Debug)]
#[command(name = "urivstat")]
#[command(about = "Export the URIV database and compute engagement summaries")]
#[command(version)]
struct Args {
    /// SQLite database to read (default: paths.database from config)
    #[arg(long)]
    database: Option<PathBuf>,

    /// Directory that receives the snapshot directory (default: paths.export_root)
    #[arg(long)]
    export_root: Option<PathBuf>,

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

    /// Print the run manifest as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load().context("failed to load configuration")?;
    let _log_guard =
        urivstat_core::logging::init(&config.logging).context("failed to initialize logging")?;

    if let Some(database) = args.database {
        config.paths.database = Some(database);
    }
    if let Some(root) = args.export_root {
        config.paths.export_root = Some(root);
    }
    if config.paths.database.is_none() {
        anyhow::bail!("No database given. Pass --database or set paths.database in the config");
    }
    config.analytics.apply(&AnalyticsOverrides {
        session_gap_minutes: args.gap_minutes,
        current_streak: args.streak_anchor,
        include_admins: args.include_admins,
    });
    config
        .analytics
        .validate()
        .context("invalid analytics settings")?;
    tracing::info!(
        gap_minutes = config.analytics.session_gap_minutes,
        include_admins = config.analytics.include_admins,
        "urivstat run starting"
    );

    let offset = config.analytics.reference_offset()?;
    let as_of = pipeline::resolve_as_of(args.as_of.as_deref(), offset)?;

    let (export, manifest) =
        pipeline::export_and_aggregate(&config, as_of).context("urivstat run failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&manifest)?);
        return Ok(());
    }

    println!(
        "Snapshot: {} ({} tables, {} rows)",
        export.dir.display(),
        export.tables.len(),
        export.total_rows()
    );
    println!("Summary:  {}", manifest.out_dir.display());
    for output in &manifest.outputs {
        println!("  {:<28} {:>8} row(s)", output.file, output.rows);
    }
    Ok(())
}
