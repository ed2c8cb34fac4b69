//! Raw snapshot tables
//!
//! A [`Table`] is one CSV file held as string records plus its header. Column
//! lookup and null handling live here; typing lives in [`super::schema`].

use crate::error::{Error, Result};
use csv::{ReaderBuilder, StringRecord};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Field values that mean "absent".
const NULL_MARKERS: &[&str] = &["", "None", "NULL", "null"];

/// One input table.
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    headers: Vec<String>,
    records: Vec<StringRecord>,
    malformed: usize,
}

impl Table {
    /// A table with no header and no rows (used for absent files).
    pub fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            headers: Vec::new(),
            records: Vec::new(),
            malformed: 0,
        }
    }

    /// Load `<dir>/<name>.csv`, or an empty table if the file does not exist.
    pub fn load(dir: &Path, name: &str) -> Result<Self> {
        let path = dir.join(format!("{}.csv", name));
        if !path.exists() {
            tracing::warn!(table = name, path = %path.display(), "Table file missing, treating as empty");
            return Ok(Self::empty(name));
        }
        let table = Self::from_reader(File::open(&path)?, name)?;
        tracing::debug!(
            table = name,
            rows = table.len(),
            columns = table.headers.len(),
            malformed = table.malformed,
            "Loaded table"
        );
        Ok(table)
    }

    /// Read a table from any CSV source with a header row.
    ///
    /// Records that cannot be decoded are skipped and counted; only I/O
    /// failures abort.
    pub fn from_reader<R: Read>(reader: R, name: &str) -> Result<Self> {
        let mut reader = ReaderBuilder::new().flexible(true).from_reader(reader);

        let headers = match reader.headers() {
            Ok(headers) => headers
                .iter()
                .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
                .collect::<Vec<_>>(),
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                return Err(Error::InvalidSnapshot(format!(
                    "unreadable header in table {}: {}",
                    name, e
                )))
            }
        };
        let headers = if headers.iter().all(|h| h.is_empty()) {
            Vec::new()
        } else {
            headers
        };

        let mut records = Vec::new();
        let mut malformed = 0;
        for record in reader.records() {
            match record {
                Ok(record) => records.push(record),
                Err(e) if e.is_io_error() => return Err(e.into()),
                Err(e) => {
                    tracing::debug!(table = name, error = %e, "Skipping malformed record");
                    malformed += 1;
                }
            }
        }

        Ok(Self {
            name: name.to_string(),
            headers,
            records,
            malformed,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the source had a header row at all.
    ///
    /// Header-less tables are treated as absent, so their columns are not checked.
    pub fn has_header(&self) -> bool {
        !self.headers.is_empty()
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Number of decoded records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records skipped because they could not be decoded.
    pub fn malformed(&self) -> usize {
        self.malformed
    }

    /// Index of a column, if present.
    pub fn column(&self, column: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == column)
    }

    /// Index of a column that must be present.
    pub fn require(&self, column: &str) -> Result<usize> {
        self.column(column).ok_or_else(|| Error::MissingColumn {
            table: self.name.clone(),
            column: column.to_string(),
        })
    }

    /// Iterate rows.
    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.records.iter().map(|record| Row { record })
    }
}

/// A borrowed record with null-aware field access.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    record: &'a StringRecord,
}

impl<'a> Row<'a> {
    /// Trimmed field at `column`; `None` for missing columns, short rows and null markers.
    pub fn get(&self, column: Option<usize>) -> Option<&'a str> {
        let value = self.record.get(column?)?.trim();
        if NULL_MARKERS.contains(&value) {
            None
        } else {
            Some(value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_table_with_nulls() {
        let csv = "\u{feff}id,email , university\n1,a@keio.jp,None\n2,,Keio\n3\n";
        let table = Table::from_reader(csv.as_bytes(), "users").unwrap();

        assert!(table.has_header());
        assert_eq!(table.headers(), &["id", "email", "university"]);
        assert_eq!(table.len(), 3);

        let email = table.column("email");
        let university = table.column("university");
        let rows: Vec<_> = table.rows().collect();
        assert_eq!(rows[0].get(email), Some("a@keio.jp"));
        assert_eq!(rows[0].get(university), None);
        assert_eq!(rows[1].get(email), None);
        assert_eq!(rows[1].get(university), Some("Keio"));
        assert_eq!(rows[2].get(email), None);
        assert_eq!(rows[2].get(None), None);
    }

    #[test]
    fn test_require_missing_column() {
        let table = Table::from_reader("id,email\n".as_bytes(), "users").unwrap();
        assert!(table.require("id").is_ok());
        let err = table.require("created_at").unwrap_err();
        assert!(matches!(err, Error::MissingColumn { ref column, .. } if column == "created_at"));
    }

    #[test]
    fn test_empty_source_has_no_header() {
        let table = Table::from_reader("".as_bytes(), "page_views").unwrap();
        assert!(!table.has_header());
        assert!(table.is_empty());
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let table = Table::load(dir.path(), "board_visits").unwrap();
        assert_eq!(table.name(), "board_visits");
        assert!(!table.has_header());
    }
}
