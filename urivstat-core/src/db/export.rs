//! Snapshot export: every table to `<table>.csv`

use super::{quote_ident, Database};
use crate::error::Result;
use chrono::{DateTime, TimeZone};
use rusqlite::types::ValueRef;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory name format of one snapshot.
pub const SNAPSHOT_DIR_FORMAT: &str = "%Y%m%d_%H%M%S";

/// One exported table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportedTable {
    pub table: String,
    pub rows: usize,
}

/// Outcome of a full export.
#[derive(Debug, Clone, Serialize)]
pub struct ExportResult {
    /// Snapshot directory that was written
    pub dir: PathBuf,
    pub tables: Vec<ExportedTable>,
}

impl ExportResult {
    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|t| t.rows).sum()
    }
}

/// Snapshot directory name for an instant, e.g. `20250105_120000`.
pub fn snapshot_dir_name<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format(SNAPSHOT_DIR_FORMAT).to_string()
}

fn field(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => hex::encode(b),
    }
}

impl Database {
    /// Write one table as CSV with a header row. Returns the row count.
    ///
    /// NULL becomes an empty field; blobs are hex-encoded.
    pub fn export_table(&self, table: &str, path: &Path) -> Result<usize> {
        let mut stmt = self
            .connection()
            .prepare(&format!("SELECT * FROM {}", quote_ident(table)))?;
        let headers: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = headers.len();

        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&headers)?;

        let mut rows = stmt.query([])?;
        let mut count = 0;
        while let Some(row) = rows.next()? {
            let mut record = Vec::with_capacity(width);
            for i in 0..width {
                record.push(field(row.get_ref(i)?));
            }
            writer.write_record(&record)?;
            count += 1;
        }
        writer.flush()?;
        Ok(count)
    }
}

/// Export every user table into `<export_root>/<YYYYmmdd_HHMMSS>/`.
pub fn export_all_tables<Tz: TimeZone>(
    db: &Database,
    export_root: &Path,
    at: &DateTime<Tz>,
) -> Result<ExportResult>
where
    Tz::Offset: std::fmt::Display,
{
    let dir = export_root.join(snapshot_dir_name(at));
    fs::create_dir_all(&dir)?;

    let mut tables = Vec::new();
    for table in db.table_names()? {
        let rows = db.export_table(&table, &dir.join(format!("{}.csv", table)))?;
        tracing::debug!(table = %table, rows, "Exported table");
        tables.push(ExportedTable { table, rows });
    }

    let result = ExportResult { dir, tables };
    tracing::info!(
        database = %db.path().display(),
        dir = %result.dir.display(),
        tables = result.tables.len(),
        rows = result.total_rows(),
        "Exported snapshot"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate};
    use rusqlite::Connection;
    use tempfile::TempDir;

    fn fixture(dir: &Path) -> PathBuf {
        let path = dir.join("app.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT, year TEXT, avatar BLOB, score REAL);
             INSERT INTO users VALUES (1, 'a@keio.jp', NULL, x'0aff', 1.5);
             INSERT INTO users VALUES (2, 'b, \"quoted\"@keio.jp', '3', NULL, NULL);
             CREATE TABLE board_posts (id INTEGER PRIMARY KEY, content TEXT);",
        )
        .unwrap();
        path
    }

    #[test]
    fn test_snapshot_dir_name() {
        let at = FixedOffset::east_opt(9 * 3600)
            .unwrap()
            .from_local_datetime(
                &NaiveDate::from_ymd_opt(2025, 1, 5)
                    .unwrap()
                    .and_hms_opt(12, 3, 4)
                    .unwrap(),
            )
            .unwrap();
        assert_eq!(snapshot_dir_name(&at), "20250105_120304");
    }

    #[test]
    fn test_export_all_tables() {
        let tmp = TempDir::new().unwrap();
        let db = Database::open(&fixture(tmp.path())).unwrap();
        let at = chrono::Utc::now();

        let result = export_all_tables(&db, &tmp.path().join("exports"), &at).unwrap();
        assert_eq!(result.tables.len(), 2);
        assert_eq!(result.total_rows(), 2);
        assert!(result.dir.ends_with(snapshot_dir_name(&at)));

        let users = fs::read_to_string(result.dir.join("users.csv")).unwrap();
        let lines: Vec<&str> = users.lines().collect();
        assert_eq!(lines[0], "id,email,year,avatar,score");
        assert_eq!(lines[1], "1,a@keio.jp,,0aff,1.5");
        assert_eq!(lines[2], "2,\"b, \"\"quoted\"\"@keio.jp\",3,,");

        let posts = fs::read_to_string(result.dir.join("board_posts.csv")).unwrap();
        assert_eq!(posts.trim_end(), "id,content");
    }
}
