//! urivstat-export - snapshot the application database to CSV

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use urivstat_core::db::export_all_tables;
use urivstat_core::{Config, Database};

#[derive(Parser, Debug)]
#[command(name = "urivstat-export")]
#[command(about = "Export every table of the URIV database to a timestamped CSV snapshot")]
#[command(version)]
struct Args {
    /// SQLite database to read (default: paths.database from config)
    #[arg(long)]
    database: Option<PathBuf>,

    /// Directory that receives the snapshot directory (default: paths.export_root)
    #[arg(long)]
    export_root: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;
    let _log_guard =
        urivstat_core::logging::init(&config.logging).context("failed to initialize logging")?;

    let Some(db_path) = args.database.or_else(|| config.paths.database.clone()) else {
        anyhow::bail!("No database given. Pass --database or set paths.database in the config");
    };
    let export_root = args
        .export_root
        .unwrap_or_else(|| config.paths.export_root());
    let offset = config.analytics.reference_offset()?;
    tracing::info!(database = %db_path.display(), root = %export_root.display(), "Exporting snapshot");

    let db = Database::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.display()))?;
    let result = export_all_tables(&db, &export_root, &Utc::now().with_timezone(&offset))
        .context("failed to export snapshot")?;

    for table in &result.tables {
        println!("  {:<28} {:>8} row(s)", table.table, table.rows);
    }
    println!("{}", result.dir.display());
    Ok(())
}
