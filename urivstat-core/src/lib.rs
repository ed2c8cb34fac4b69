//! # urivstat-core
//!
//! Core library for urivstat - engagement analytics for the URIV university
//! community (forum boards, marketplace, courses, circles).
//!
//! This library provides:
//! - Snapshot export from the application's SQLite database
//! - Event normalization with canonical email identities
//! - Session segmentation, active days and streaks
//! - Per-user, per-board and per-seller roll-ups, plus the admin cohort report
//! - Fixed-schema CSV summary tables
//! - Configuration and logging infrastructure
//!
//! ## Architecture
//!
//! Data flows through three layers:
//! - **Layer 0 (Raw):** Snapshot CSV files, one per database table (immutable)
//! - **Layer 1 (Normalized):** Identity-resolved events and domain records
//! - **Layer 2 (Derived):** Sessions and aggregates (recomputed every run)
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use urivstat_core::{pipeline, Config};
//!
//! let config = Config::load().expect("failed to load config");
//! let snapshot = Path::new("exports/20250105_120000");
//! let manifest = pipeline::aggregate_snapshot(
//!     snapshot,
//!     &pipeline::default_out_dir(snapshot),
//!     &config,
//!     chrono::Utc::now(),
//! )
//! .expect("aggregation failed");
//! println!("run {}", manifest.run_id);
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
pub use identity::{EmailRules, Identity};
pub use types::*;

// Public modules
pub mod analytics;
pub mod config;
pub mod db;
pub mod error;
pub mod format;
pub mod identity;
pub mod ingest;
pub mod logging;
pub mod pipeline;
pub mod summary;
pub mod types;
