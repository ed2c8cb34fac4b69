//! Event normalization
//!
//! Resolves every typed row to a canonical [`Identity`], derives one [`Event`]
//! per row, and drops what cannot be resolved. Resolution order: an explicit
//! email wins; otherwise the numeric user id is looked up in `users`.
//!
//! Admin identities are kept here. Exclusion is the aggregator's job so the
//! admin cohort can still be reported.

use super::schema::{self, ListingKind, Parsed};
use super::Snapshot;
use crate::error::Result;
use crate::identity::{EmailRules, Identity};
use crate::types::{Event, EventSource};
use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

// ============================================
// Normalized records
// ============================================

/// Attributes joined from `users` for one identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Profile {
    /// Every user id that folds to this identity, ascending
    pub user_ids: Vec<i64>,
    pub university: Option<String>,
    pub year: Option<String>,
    pub department: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: i64,
    pub board_id: String,
    pub author: Identity,
    pub at: DateTime<Utc>,
    pub content_len: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub id: i64,
    pub post_id: i64,
    pub author: Identity,
    pub at: DateTime<Utc>,
    pub content_len: usize,
}

/// A like on a post, reply or item.
#[derive(Debug, Clone, PartialEq)]
pub struct Like {
    pub target_id: i64,
    pub liker: Identity,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Visit {
    pub board_id: String,
    pub visitor: Identity,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub id: i64,
    pub seller: Identity,
    pub at: DateTime<Utc>,
    pub price: Option<i64>,
    pub kind: ListingKind,
    pub category: Option<String>,
}

/// Per-table normalization tallies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableReport {
    /// Records decoded from the source
    pub rows_read: usize,
    /// Rows that produced a normalized record
    pub kept: usize,
    /// Records the CSV reader could not decode
    pub malformed: usize,
    pub bad_timestamp: usize,
    pub bad_field: usize,
    pub unresolved_identity: usize,
    /// Rows dropped because they happened after the run's as-of instant
    pub after_as_of: usize,
}

impl TableReport {
    pub fn dropped(&self) -> usize {
        self.malformed + self.bad_timestamp + self.bad_field + self.unresolved_identity + self.after_as_of
    }
}

/// Row accounting for one normalization pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeReport {
    pub tables: BTreeMap<String, TableReport>,
    /// Events collapsed because an identical event was already present
    pub duplicate_events: usize,
}

impl NormalizeReport {
    /// Total rows dropped across all tables.
    pub fn dropped(&self) -> usize {
        self.tables.values().map(TableReport::dropped).sum()
    }
}

/// Output of the normalizer: identity-resolved records and the event stream.
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    /// Deduplicated events sorted by identity, then instant
    pub events: Vec<Event>,
    pub profiles: BTreeMap<Identity, Profile>,
    pub posts: Vec<Post>,
    pub replies: Vec<Reply>,
    pub post_likes: Vec<Like>,
    pub reply_likes: Vec<Like>,
    pub visits: Vec<Visit>,
    pub listings: Vec<Listing>,
    pub item_likes: Vec<Like>,
    /// Board of every parsed post, whether or not its author resolved
    pub post_boards: HashMap<i64, String>,
    /// Parent post of every parsed reply
    pub reply_posts: HashMap<i64, i64>,
    pub report: NormalizeReport,
}

impl Normalized {
    /// Board a post belongs to.
    pub fn board_of_post(&self, post_id: i64) -> Option<&str> {
        self.post_boards.get(&post_id).map(String::as_str)
    }

    /// Board of a reply, through its parent post.
    pub fn board_of_reply(&self, reply_id: i64) -> Option<&str> {
        self.reply_posts
            .get(&reply_id)
            .and_then(|post_id| self.board_of_post(*post_id))
    }

    /// Drop every record observed after `as_of`, counting drops per table.
    pub fn truncate_after(&mut self, as_of: DateTime<Utc>) {
        fn retain<T>(
            rows: &mut Vec<T>,
            at: impl Fn(&T) -> DateTime<Utc>,
            as_of: DateTime<Utc>,
            report: Option<&mut TableReport>,
        ) {
            let before = rows.len();
            rows.retain(|row| at(row) <= as_of);
            let removed = before - rows.len();
            if let Some(report) = report {
                report.after_as_of += removed;
                report.kept -= removed;
            }
        }

        let tables = &mut self.report.tables;
        retain(&mut self.posts, |r| r.at, as_of, tables.get_mut(super::BOARD_POSTS));
        retain(&mut self.replies, |r| r.at, as_of, tables.get_mut(super::BOARD_REPLIES));
        retain(&mut self.post_likes, |r| r.at, as_of, tables.get_mut(super::BOARD_POST_LIKES));
        retain(&mut self.reply_likes, |r| r.at, as_of, tables.get_mut(super::BOARD_REPLY_LIKES));
        retain(&mut self.visits, |r| r.at, as_of, tables.get_mut(super::BOARD_VISITS));
        retain(&mut self.listings, |r| r.at, as_of, tables.get_mut(super::MARKET_ITEMS));
        retain(&mut self.item_likes, |r| r.at, as_of, tables.get_mut(super::MARKET_ITEM_LIKES));

        let page_views_before = self
            .events
            .iter()
            .filter(|e| e.source == EventSource::PageView)
            .count();
        self.events.retain(|e| e.at <= as_of);
        let page_views_after = self
            .events
            .iter()
            .filter(|e| e.source == EventSource::PageView)
            .count();
        if let Some(report) = tables.get_mut(super::PAGE_VIEWS) {
            let removed = page_views_before - page_views_after;
            report.after_as_of += removed;
            report.kept = report.kept.saturating_sub(removed);
        }
    }
}

// ============================================
// Normalizer
// ============================================

/// Turns a raw [`Snapshot`] into [`Normalized`] records.
pub struct Normalizer {
    rules: EmailRules,
    offset: FixedOffset,
}

/// id → identity lookup built from `users`.
struct Directory<'a> {
    rules: &'a EmailRules,
    by_id: HashMap<i64, Identity>,
}

impl Directory<'_> {
    /// Explicit email first, then the user id lookup.
    fn resolve(&self, email: Option<&str>, user_id: Option<i64>) -> Option<Identity> {
        email
            .and_then(|e| self.rules.identity(e))
            .or_else(|| user_id.and_then(|id| self.by_id.get(&id).cloned()))
    }

    fn by_id(&self, user_id: i64) -> Option<Identity> {
        self.by_id.get(&user_id).cloned()
    }
}

fn report_for<T>(table_rows: usize, malformed: usize, parsed: &Parsed<T>) -> TableReport {
    TableReport {
        rows_read: table_rows,
        malformed,
        bad_timestamp: parsed.bad_timestamp,
        bad_field: parsed.bad_field,
        ..Default::default()
    }
}

fn board_path(board_id: Option<&str>) -> String {
    match board_id {
        Some(board) => format!("/board/{}", board),
        None => "/board".to_string(),
    }
}

impl Normalizer {
    pub fn new(rules: EmailRules, offset: FixedOffset) -> Self {
        Self { rules, offset }
    }

    /// Normalize every table of a snapshot.
    ///
    /// Fails only on structural problems (missing required columns).
    pub fn normalize(&self, snapshot: &Snapshot) -> Result<Normalized> {
        let offset = self.offset;
        let mut out = Normalized::default();
        let mut events = Vec::new();

        // Users: directory and profiles
        let users = schema::users(&snapshot.users)?;
        let mut report = report_for(snapshot.users.len(), snapshot.users.malformed(), &users);
        let mut by_id = HashMap::new();
        let mut user_rows = users.rows;
        user_rows.sort_by_key(|u| u.id);
        for user in user_rows {
            let Some(identity) = user.email.as_deref().and_then(|e| self.rules.identity(e)) else {
                report.unresolved_identity += 1;
                continue;
            };
            report.kept += 1;
            by_id.insert(user.id, identity.clone());
            let profile = out.profiles.entry(identity).or_insert_with(|| Profile {
                user_ids: Vec::new(),
                university: user.university.clone(),
                year: user.year.clone(),
                department: user.department.clone(),
            });
            profile.user_ids.push(user.id);
        }
        out.report.tables.insert(super::USERS.to_string(), report);
        let directory = Directory {
            rules: &self.rules,
            by_id,
        };

        // Page views
        let page_views = schema::page_views(&snapshot.page_views, offset)?;
        let mut report = report_for(
            snapshot.page_views.len(),
            snapshot.page_views.malformed(),
            &page_views,
        );
        for view in page_views.rows {
            match directory.resolve(view.email.as_deref(), view.user_id) {
                Some(identity) => {
                    report.kept += 1;
                    events.push(Event {
                        identity,
                        at: view.at,
                        resource_path: view.path,
                        source: EventSource::PageView,
                        user_agent: view.user_agent,
                    });
                }
                None => report.unresolved_identity += 1,
            }
        }
        out.report.tables.insert(super::PAGE_VIEWS.to_string(), report);

        // Posts
        let posts = schema::posts(&snapshot.board_posts, offset)?;
        let mut report = report_for(
            snapshot.board_posts.len(),
            snapshot.board_posts.malformed(),
            &posts,
        );
        // Parent indexes cover every parsed row so board attribution
        // does not depend on the author resolving
        let post_board: HashMap<i64, String> = posts
            .rows
            .iter()
            .map(|p| (p.id, p.board_id.clone()))
            .collect();
        for post in posts.rows {
            let Some(author) = directory.by_id(post.author_id) else {
                report.unresolved_identity += 1;
                continue;
            };
            report.kept += 1;
            events.push(Event {
                identity: author.clone(),
                at: post.at,
                resource_path: board_path(Some(&post.board_id)),
                source: EventSource::Post,
                user_agent: None,
            });
            out.posts.push(Post {
                id: post.id,
                board_id: post.board_id,
                author,
                at: post.at,
                content_len: post.content_len,
            });
        }
        out.report.tables.insert(super::BOARD_POSTS.to_string(), report);

        // Replies
        let replies = schema::replies(&snapshot.board_replies, offset)?;
        let mut report = report_for(
            snapshot.board_replies.len(),
            snapshot.board_replies.malformed(),
            &replies,
        );
        let reply_post: HashMap<i64, i64> = replies
            .rows
            .iter()
            .map(|r| (r.id, r.post_id))
            .collect();
        for reply in replies.rows {
            let Some(author) = directory.by_id(reply.author_id) else {
                report.unresolved_identity += 1;
                continue;
            };
            report.kept += 1;
            events.push(Event {
                identity: author.clone(),
                at: reply.at,
                resource_path: board_path(post_board.get(&reply.post_id).map(String::as_str)),
                source: EventSource::Reply,
                user_agent: None,
            });
            out.replies.push(Reply {
                id: reply.id,
                post_id: reply.post_id,
                author,
                at: reply.at,
                content_len: reply.content_len,
            });
        }
        out.report.tables.insert(super::BOARD_REPLIES.to_string(), report);

        // Post likes
        let (likes, report) = self.likes(
            &snapshot.board_post_likes,
            "post_id",
            &directory,
            EventSource::PostLike,
            |post_id| board_path(post_board.get(&post_id).map(String::as_str)),
            &mut events,
        )?;
        out.post_likes = likes;
        out.report.tables.insert(super::BOARD_POST_LIKES.to_string(), report);

        // Reply likes
        let (likes, report) = self.likes(
            &snapshot.board_reply_likes,
            "reply_id",
            &directory,
            EventSource::ReplyLike,
            |reply_id| {
                let board = reply_post
                    .get(&reply_id)
                    .and_then(|post_id| post_board.get(post_id));
                board_path(board.map(String::as_str))
            },
            &mut events,
        )?;
        out.reply_likes = likes;
        out.report.tables.insert(super::BOARD_REPLY_LIKES.to_string(), report);
        out.post_boards = post_board;
        out.reply_posts = reply_post;

        // Board visits
        let visits = schema::visits(&snapshot.board_visits, offset)?;
        let mut report = report_for(
            snapshot.board_visits.len(),
            snapshot.board_visits.malformed(),
            &visits,
        );
        for visit in visits.rows {
            let Some(visitor) = directory.by_id(visit.user_id) else {
                report.unresolved_identity += 1;
                continue;
            };
            report.kept += 1;
            events.push(Event {
                identity: visitor.clone(),
                at: visit.at,
                resource_path: board_path(Some(&visit.board_id)),
                source: EventSource::BoardVisit,
                user_agent: None,
            });
            out.visits.push(Visit {
                board_id: visit.board_id,
                visitor,
                at: visit.at,
            });
        }
        out.report.tables.insert(super::BOARD_VISITS.to_string(), report);

        // Listings
        let listings = schema::listings(&snapshot.market_items, offset)?;
        let mut report = report_for(
            snapshot.market_items.len(),
            snapshot.market_items.malformed(),
            &listings,
        );
        for item in listings.rows {
            let Some(seller) = directory.by_id(item.author_id) else {
                report.unresolved_identity += 1;
                continue;
            };
            report.kept += 1;
            events.push(Event {
                identity: seller.clone(),
                at: item.at,
                resource_path: format!("/market/{}", item.id),
                source: EventSource::Listing,
                user_agent: None,
            });
            out.listings.push(Listing {
                id: item.id,
                seller,
                at: item.at,
                price: item.price,
                kind: item.kind,
                category: item.category,
            });
        }
        out.report.tables.insert(super::MARKET_ITEMS.to_string(), report);

        // Item likes
        let (likes, report) = self.likes(
            &snapshot.market_item_likes,
            "item_id",
            &directory,
            EventSource::ItemLike,
            |item_id| format!("/market/{}", item_id),
            &mut events,
        )?;
        out.item_likes = likes;
        out.report.tables.insert(super::MARKET_ITEM_LIKES.to_string(), report);

        // Order and collapse exact duplicates
        events.sort_by(|a, b| {
            (&a.identity, a.at, a.source, &a.resource_path).cmp(&(
                &b.identity,
                b.at,
                b.source,
                &b.resource_path,
            ))
        });
        let before = events.len();
        events.dedup_by(|later, earlier| {
            later.identity == earlier.identity
                && later.at == earlier.at
                && later.source == earlier.source
                && later.resource_path == earlier.resource_path
        });
        out.report.duplicate_events = before - events.len();
        out.events = events;

        tracing::info!(
            events = out.events.len(),
            identities = out.profiles.len(),
            dropped = out.report.dropped(),
            duplicates = out.report.duplicate_events,
            "Normalized snapshot"
        );
        Ok(out)
    }

    fn likes(
        &self,
        table: &super::Table,
        target_column: &str,
        directory: &Directory<'_>,
        source: EventSource,
        path_for: impl Fn(i64) -> String,
        events: &mut Vec<Event>,
    ) -> Result<(Vec<Like>, TableReport)> {
        let parsed = schema::likes(table, target_column, self.offset)?;
        let mut report = report_for(table.len(), table.malformed(), &parsed);
        let mut likes = Vec::with_capacity(parsed.rows.len());
        for like in parsed.rows {
            let Some(liker) = directory.by_id(like.user_id) else {
                report.unresolved_identity += 1;
                continue;
            };
            report.kept += 1;
            events.push(Event {
                identity: liker.clone(),
                at: like.at,
                resource_path: path_for(like.target_id),
                source,
                user_agent: None,
            });
            likes.push(Like {
                target_id: like.target_id,
                liker,
                at: like.at,
            });
        }
        Ok((likes, report))
    }
}
