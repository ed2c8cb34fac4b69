//! Ingestion layer: snapshot tables to normalized records
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────┐     ┌──────────────────┐
//! │ Snapshot dir     │ ──► │ schema::*    │ ──► │   Normalizer     │ ──► Normalized
//! │ (users.csv, ...) │     │ typed rows   │     │ identity + event │     (events, posts, ...)
//! └──────────────────┘     └──────────────┘     └──────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use urivstat_core::identity::EmailRules;
//! use urivstat_core::ingest::{Normalizer, Snapshot};
//!
//! let snapshot = Snapshot::load(Path::new("exports/20250105_120000"))?;
//! let normalizer = Normalizer::new(EmailRules::builtin(), offset);
//! let normalized = normalizer.normalize(&snapshot)?;
//! println!("{} events, {} rows dropped", normalized.events.len(), normalized.report.dropped());
//! ```

mod normalize;
pub mod schema;
mod table;
mod timestamp;

pub use normalize::{
    Like, Listing, NormalizeReport, Normalized, Normalizer, Post, Profile, Reply, TableReport,
    Visit,
};
pub use table::{Row, Table};
pub use timestamp::parse_timestamp;

use crate::error::{Error, Result};
use std::path::Path;

pub const USERS: &str = "users";
pub const PAGE_VIEWS: &str = "page_views";
pub const BOARD_POSTS: &str = "board_posts";
pub const BOARD_REPLIES: &str = "board_replies";
pub const BOARD_POST_LIKES: &str = "board_post_likes";
pub const BOARD_REPLY_LIKES: &str = "board_reply_likes";
pub const BOARD_VISITS: &str = "board_visits";
pub const MARKET_ITEMS: &str = "market_items";
pub const MARKET_ITEM_LIKES: &str = "market_item_likes";

/// Every table a snapshot may contain.
pub const TABLES: &[&str] = &[
    USERS,
    PAGE_VIEWS,
    BOARD_POSTS,
    BOARD_REPLIES,
    BOARD_POST_LIKES,
    BOARD_REPLY_LIKES,
    BOARD_VISITS,
    MARKET_ITEMS,
    MARKET_ITEM_LIKES,
];

/// Raw tables of one exported snapshot.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub users: Table,
    pub page_views: Table,
    pub board_posts: Table,
    pub board_replies: Table,
    pub board_post_likes: Table,
    pub board_reply_likes: Table,
    pub board_visits: Table,
    pub market_items: Table,
    pub market_item_likes: Table,
}

impl Snapshot {
    /// A snapshot where every table is absent.
    pub fn empty() -> Self {
        Self {
            users: Table::empty(USERS),
            page_views: Table::empty(PAGE_VIEWS),
            board_posts: Table::empty(BOARD_POSTS),
            board_replies: Table::empty(BOARD_REPLIES),
            board_post_likes: Table::empty(BOARD_POST_LIKES),
            board_reply_likes: Table::empty(BOARD_REPLY_LIKES),
            board_visits: Table::empty(BOARD_VISITS),
            market_items: Table::empty(MARKET_ITEMS),
            market_item_likes: Table::empty(MARKET_ITEM_LIKES),
        }
    }

    /// Load every known table from a snapshot directory.
    pub fn load(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(Error::InvalidSnapshot(format!(
                "{} is not a directory",
                dir.display()
            )));
        }
        tracing::info!(dir = %dir.display(), "Loading snapshot");

        Ok(Self {
            users: Table::load(dir, USERS)?,
            page_views: Table::load(dir, PAGE_VIEWS)?,
            board_posts: Table::load(dir, BOARD_POSTS)?,
            board_replies: Table::load(dir, BOARD_REPLIES)?,
            board_post_likes: Table::load(dir, BOARD_POST_LIKES)?,
            board_reply_likes: Table::load(dir, BOARD_REPLY_LIKES)?,
            board_visits: Table::load(dir, BOARD_VISITS)?,
            market_items: Table::load(dir, MARKET_ITEMS)?,
            market_item_likes: Table::load(dir, MARKET_ITEM_LIKES)?,
        })
    }
}
