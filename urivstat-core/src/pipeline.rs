//! End-to-end aggregation run
//!
//! ```text
//! snapshot dir ──► Snapshot::load ──► Normalizer ──► truncate_after(as_of)
//!                                                        │
//!        out dir ◄── SummaryWriter ◄── analytics::aggregate
//! ```
//!
//! Every run recomputes everything from the snapshot and owns its output
//! directory for the duration of the run.

use crate::analytics::{aggregate, AggregateParams};
use crate::config::{AnalyticsConfig, Config};
use crate::db::{export_all_tables, Database, ExportResult};
use crate::error::{Error, Result};
use crate::identity::EmailRules;
use crate::ingest::{NormalizeReport, Normalizer, Snapshot};
use crate::summary::{SummaryWriter, WrittenTable};
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const MANIFEST: &str = "manifest.json";

/// Default output directory for a snapshot: `<snapshot>/aggregated`.
pub fn default_out_dir(snapshot_dir: &Path) -> PathBuf {
    snapshot_dir.join("aggregated")
}

/// Last instant of a calendar date in the reference offset.
pub fn end_of_day(date: NaiveDate, offset: FixedOffset) -> Result<DateTime<Utc>> {
    date.and_hms_nano_opt(23, 59, 59, 999_999_999)
        .and_then(|naive| offset.from_local_datetime(&naive).single())
        .map(|at| at.with_timezone(&Utc))
        .ok_or_else(|| Error::Config(format!("cannot resolve end of day for {}", date)))
}

/// Resolve an `--as-of` value: `YYYY-MM-DD` (end of that day in the
/// reference offset) or an RFC 3339 instant. `None` means now.
pub fn resolve_as_of(raw: Option<&str>, offset: FixedOffset) -> Result<DateTime<Utc>> {
    let Some(raw) = raw.map(str::trim) else {
        return Ok(Utc::now());
    };
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return end_of_day(date, offset);
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|_| {
            Error::Config(format!(
                "invalid as-of value {:?}: expected YYYY-MM-DD or RFC 3339",
                raw
            ))
        })
}

/// Record of one aggregation run, written as `manifest.json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunManifest {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub as_of: DateTime<Utc>,
    /// Reference date for windows and the current streak
    pub today: NaiveDate,
    pub snapshot_dir: PathBuf,
    pub out_dir: PathBuf,
    pub analytics: AnalyticsConfig,
    pub normalize: NormalizeReport,
    pub outputs: Vec<WrittenTable>,
}

impl RunManifest {
    /// Row count of one output file, if it was written.
    pub fn rows(&self, file: &str) -> Option<usize> {
        self.outputs.iter().find(|o| o.file == file).map(|o| o.rows)
    }
}

/// Aggregate a snapshot directory into `out_dir`.
///
/// Records observed after `as_of` are ignored. Fails on structural input
/// problems (missing required columns, unreadable files); row-level problems
/// only show up in the manifest's normalize report.
pub fn aggregate_snapshot(
    snapshot_dir: &Path,
    out_dir: &Path,
    config: &Config,
    as_of: DateTime<Utc>,
) -> Result<RunManifest> {
    let params = AggregateParams::from_config(&config.analytics, as_of)?;
    let snapshot = Snapshot::load(snapshot_dir)?;

    let normalizer = Normalizer::new(EmailRules::from_config(&config.identity), params.offset);
    let mut normalized = normalizer.normalize(&snapshot)?;
    normalized.truncate_after(as_of);

    let dropped = normalized.report.dropped();
    if dropped > 0 {
        tracing::warn!(
            dropped,
            duplicates = normalized.report.duplicate_events,
            "Dropped malformed or unresolvable rows"
        );
    }
    tracing::debug!(
        events = normalized.events.len(),
        as_of = %as_of,
        "Applied as-of cutoff"
    );

    let aggregates = aggregate(&normalized, &params);
    let outputs = SummaryWriter::new(out_dir, params.offset).write_all(&aggregates)?;

    let manifest = RunManifest {
        run_id: Uuid::new_v4(),
        generated_at: Utc::now(),
        as_of,
        today: params.streak.today,
        snapshot_dir: snapshot_dir.to_path_buf(),
        out_dir: out_dir.to_path_buf(),
        analytics: config.analytics.clone(),
        normalize: normalized.report,
        outputs,
    };
    write_manifest(out_dir, &manifest)?;

    tracing::info!(
        run_id = %manifest.run_id,
        out_dir = %out_dir.display(),
        "Aggregation complete"
    );
    Ok(manifest)
}

fn write_manifest(out_dir: &Path, manifest: &RunManifest) -> Result<()> {
    let file = File::create(out_dir.join(MANIFEST))?;
    write_manifest_to(file, manifest)
}

fn write_manifest_to<W: Write>(inner: W, manifest: &RunManifest) -> Result<()> {
    let mut writer = BufWriter::new(inner);
    serde_json::to_writer_pretty(&mut writer, manifest)?;
    writer.flush()?;
    Ok(())
}

/// Snapshot the configured database, then aggregate the new snapshot.
///
/// The snapshot lands under the configured export root; aggregates go to
/// `<snapshot>/aggregated`.
pub fn export_and_aggregate(
    config: &Config,
    as_of: DateTime<Utc>,
) -> Result<(ExportResult, RunManifest)> {
    let db_path = config
        .paths
        .database
        .as_deref()
        .ok_or_else(|| Error::Config("paths.database is not set".to_string()))?;
    let offset = config.analytics.reference_offset()?;

    let db = Database::open(db_path)?;
    let taken_at = Utc::now().with_timezone(&offset);
    let export = export_all_tables(&db, &config.paths.export_root(), &taken_at)?;
    let out_dir = default_out_dir(&export.dir);
    let manifest = aggregate_snapshot(&export.dir, &out_dir, config, as_of)?;
    Ok((export, manifest))
}
