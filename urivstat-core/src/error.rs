//! Error types for urivstat-core
//!
//! Only structural failures surface here. Row-level malformation (bad
//! timestamps, unresolvable identities) is tallied in
//! [`NormalizeReport`](crate::ingest::NormalizeReport) and never aborts a run.

use thiserror::Error;

/// Main error type for the urivstat-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error while reading a snapshot source
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reading or writing error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization error (run manifest)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// A required column is absent from an input table
    #[error("table {table} is missing required column {column}")]
    MissingColumn { table: String, column: String },

    /// A page-view table carries neither `user_id` nor `email`
    #[error("table {table} has no identity column (expected user_id or email)")]
    MissingIdentityColumns { table: String },

    /// Snapshot directory is unusable
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

/// Result type alias for urivstat-core
pub type Result<T> = std::result::Result<T, Error>;
