//! Database layer for urivstat
//!
//! Reads the application's SQLite database and writes one CSV per table into
//! a timestamped snapshot directory, the input of the aggregation pipeline.
//! The database is only ever opened read-only.

pub mod export;

pub use export::{export_all_tables, snapshot_dir_name, ExportResult, ExportedTable};

use crate::error::{Error, Result};
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};

/// Read-only handle on the application database.
pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    /// Open an existing database read-only.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::InvalidSnapshot(format!(
                "database not found: {}",
                path.display()
            )));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        tracing::debug!(path = %path.display(), "Opened database read-only");
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the underlying connection (for advanced use)
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// User tables, alphabetically. SQLite internal tables are skipped.
    pub fn table_names(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }
}

/// Quote an SQL identifier.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_open_missing_database() {
        let dir = TempDir::new().unwrap();
        let result = Database::open(&dir.path().join("nope.db"));
        assert!(matches!(result, Err(Error::InvalidSnapshot(_))));
    }

    #[test]
    fn test_table_names() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, email TEXT);
                 CREATE TABLE board_posts (id INTEGER PRIMARY KEY);
                 INSERT INTO users (email) VALUES ('a@keio.jp');",
            )
            .unwrap();
        }
        let db = Database::open(&path).unwrap();
        // sqlite_sequence exists because of AUTOINCREMENT but is skipped
        assert_eq!(db.table_names().unwrap(), vec!["board_posts", "users"]);
    }
}
