//! Typed rows for each snapshot table
//!
//! Every table has an explicit column schema. Required columns are checked
//! once per table (a missing one aborts the run); field values are then parsed
//! per row, and a row with an unparseable required field is rejected and
//! counted instead of being coerced.

use super::table::{Row, Table};
use super::timestamp::parse_timestamp;
use crate::error::{Error, Result};
use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;

/// Why a row was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowIssue {
    /// The timestamp matched no supported form
    BadTimestamp,
    /// A required id/key was absent or not a number
    BadField,
}

/// Rows of one table that passed typing, plus rejection tallies.
#[derive(Debug, Clone)]
pub struct Parsed<T> {
    pub rows: Vec<T>,
    pub bad_timestamp: usize,
    pub bad_field: usize,
}

impl<T> Default for Parsed<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            bad_timestamp: 0,
            bad_field: 0,
        }
    }
}

impl<T> Parsed<T> {
    fn collect<'a>(
        table: &'a Table,
        mut parse: impl FnMut(Row<'a>) -> std::result::Result<T, RowIssue>,
    ) -> Self {
        let mut parsed = Self::default();
        for row in table.rows() {
            match parse(row) {
                Ok(value) => parsed.rows.push(value),
                Err(RowIssue::BadTimestamp) => parsed.bad_timestamp += 1,
                Err(RowIssue::BadField) => parsed.bad_field += 1,
            }
        }
        parsed
    }
}

// ============================================
// Field parsers
// ============================================

/// Parse a numeric id. `"12"` is valid; `"12.0"` and `"abc"` are not.
pub fn parse_id(raw: Option<&str>) -> Option<i64> {
    raw?.parse().ok()
}

fn required_id(raw: Option<&str>) -> std::result::Result<i64, RowIssue> {
    parse_id(raw).ok_or(RowIssue::BadField)
}

fn required_key(raw: Option<&str>) -> std::result::Result<String, RowIssue> {
    raw.map(str::to_string).ok_or(RowIssue::BadField)
}

fn required_time(
    raw: Option<&str>,
    offset: FixedOffset,
) -> std::result::Result<DateTime<Utc>, RowIssue> {
    raw.and_then(|s| parse_timestamp(s, offset))
        .ok_or(RowIssue::BadTimestamp)
}

fn content_len(raw: Option<&str>) -> usize {
    raw.map(|s| s.trim().chars().count()).unwrap_or(0)
}

// ============================================
// Row types
// ============================================

/// `users`: attribute join table and id → email lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRow {
    pub id: i64,
    pub email: Option<String>,
    pub university: Option<String>,
    pub year: Option<String>,
    pub department: Option<String>,
}

/// `page_views`: generic activity log.
#[derive(Debug, Clone, PartialEq)]
pub struct PageViewRow {
    pub user_id: Option<i64>,
    pub email: Option<String>,
    pub at: DateTime<Utc>,
    pub path: String,
    pub user_agent: Option<String>,
}

/// `board_posts`
#[derive(Debug, Clone, PartialEq)]
pub struct PostRow {
    pub id: i64,
    pub board_id: String,
    pub author_id: i64,
    pub at: DateTime<Utc>,
    pub content_len: usize,
}

/// `board_replies`
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyRow {
    pub id: i64,
    pub post_id: i64,
    pub author_id: i64,
    pub at: DateTime<Utc>,
    pub content_len: usize,
}

/// `board_post_likes`, `board_reply_likes`, `market_item_likes`
#[derive(Debug, Clone, PartialEq)]
pub struct LikeRow {
    /// Id of the liked post, reply or item
    pub target_id: i64,
    pub user_id: i64,
    pub at: DateTime<Utc>,
}

/// `board_visits`
#[derive(Debug, Clone, PartialEq)]
pub struct VisitRow {
    pub board_id: String,
    pub user_id: i64,
    pub at: DateTime<Utc>,
}

/// Marketplace listing type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingKind {
    Sell,
    Buy,
    Free,
    Other,
}

impl ListingKind {
    fn from_field(raw: Option<&str>) -> Self {
        match raw.map(str::to_lowercase).as_deref() {
            Some("sell") => ListingKind::Sell,
            Some("buy") => ListingKind::Buy,
            Some("free") => ListingKind::Free,
            _ => ListingKind::Other,
        }
    }
}

/// `market_items`
#[derive(Debug, Clone, PartialEq)]
pub struct ListingRow {
    pub id: i64,
    pub author_id: i64,
    pub at: DateTime<Utc>,
    pub price: Option<i64>,
    pub kind: ListingKind,
    pub category: Option<String>,
}

// ============================================
// Table parsers
// ============================================

pub fn users(table: &Table) -> Result<Parsed<UserRow>> {
    if !table.has_header() {
        return Ok(Parsed::default());
    }
    let id = table.require("id")?;
    let email = table.require("email")?;
    let university = table.column("university");
    let year = table.column("year");
    let department = table.column("department");

    Ok(Parsed::collect(table, |row| {
        Ok(UserRow {
            id: required_id(row.get(Some(id)))?,
            email: row.get(Some(email)).map(str::to_string),
            university: row.get(university).map(str::to_string),
            year: row.get(year).map(str::to_string),
            department: row.get(department).map(str::to_string),
        })
    }))
}

pub fn page_views(table: &Table, offset: FixedOffset) -> Result<Parsed<PageViewRow>> {
    if !table.has_header() {
        return Ok(Parsed::default());
    }
    let created_at = table.require("created_at")?;
    let user_id = table.column("user_id");
    let email = table.column("email");
    if user_id.is_none() && email.is_none() {
        return Err(Error::MissingIdentityColumns {
            table: table.name().to_string(),
        });
    }
    let path = table.column("path");
    let user_agent = table.column("user_agent");

    Ok(Parsed::collect(table, |row| {
        Ok(PageViewRow {
            user_id: parse_id(row.get(user_id)),
            email: row.get(email).map(str::to_string),
            at: required_time(row.get(Some(created_at)), offset)?,
            path: row.get(path).unwrap_or_default().to_string(),
            user_agent: row.get(user_agent).map(str::to_string),
        })
    }))
}

pub fn posts(table: &Table, offset: FixedOffset) -> Result<Parsed<PostRow>> {
    if !table.has_header() {
        return Ok(Parsed::default());
    }
    let id = table.require("id")?;
    let board_id = table.require("board_id")?;
    let author_id = table.require("author_id")?;
    let created_at = table.require("created_at")?;
    let content = table.column("content");

    Ok(Parsed::collect(table, |row| {
        Ok(PostRow {
            id: required_id(row.get(Some(id)))?,
            board_id: required_key(row.get(Some(board_id)))?,
            author_id: required_id(row.get(Some(author_id)))?,
            at: required_time(row.get(Some(created_at)), offset)?,
            content_len: content_len(row.get(content)),
        })
    }))
}

pub fn replies(table: &Table, offset: FixedOffset) -> Result<Parsed<ReplyRow>> {
    if !table.has_header() {
        return Ok(Parsed::default());
    }
    let id = table.require("id")?;
    let post_id = table.require("post_id")?;
    let author_id = table.require("author_id")?;
    let created_at = table.require("created_at")?;
    let content = table.column("content");

    Ok(Parsed::collect(table, |row| {
        Ok(ReplyRow {
            id: required_id(row.get(Some(id)))?,
            post_id: required_id(row.get(Some(post_id)))?,
            author_id: required_id(row.get(Some(author_id)))?,
            at: required_time(row.get(Some(created_at)), offset)?,
            content_len: content_len(row.get(content)),
        })
    }))
}

/// Likes keyed by `target_column` (`post_id`, `reply_id` or `item_id`).
pub fn likes(table: &Table, target_column: &str, offset: FixedOffset) -> Result<Parsed<LikeRow>> {
    if !table.has_header() {
        return Ok(Parsed::default());
    }
    let target = table.require(target_column)?;
    let user_id = table.require("user_id")?;
    let created_at = table.require("created_at")?;

    Ok(Parsed::collect(table, |row| {
        Ok(LikeRow {
            target_id: required_id(row.get(Some(target)))?,
            user_id: required_id(row.get(Some(user_id)))?,
            at: required_time(row.get(Some(created_at)), offset)?,
        })
    }))
}

pub fn visits(table: &Table, offset: FixedOffset) -> Result<Parsed<VisitRow>> {
    if !table.has_header() {
        return Ok(Parsed::default());
    }
    let board_id = table.require("board_id")?;
    let user_id = table.require("user_id")?;
    let created_at = table.require("created_at")?;

    Ok(Parsed::collect(table, |row| {
        Ok(VisitRow {
            board_id: required_key(row.get(Some(board_id)))?,
            user_id: required_id(row.get(Some(user_id)))?,
            at: required_time(row.get(Some(created_at)), offset)?,
        })
    }))
}

pub fn listings(table: &Table, offset: FixedOffset) -> Result<Parsed<ListingRow>> {
    if !table.has_header() {
        return Ok(Parsed::default());
    }
    let id = table.require("id")?;
    let author_id = table.require("author_id")?;
    let created_at = table.require("created_at")?;
    let price = table.column("price");
    let kind = table.column("type");
    let category = table.column("category");

    Ok(Parsed::collect(table, |row| {
        Ok(ListingRow {
            id: required_id(row.get(Some(id)))?,
            author_id: required_id(row.get(Some(author_id)))?,
            at: required_time(row.get(Some(created_at)), offset)?,
            price: parse_id(row.get(price)),
            kind: ListingKind::from_field(row.get(kind)),
            category: row.get(category).map(str::to_string),
        })
    }))
}
