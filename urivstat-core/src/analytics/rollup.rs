//! Domain-action roll-ups
//!
//! Counts posts, replies, likes and listings per identity, per board and per
//! identity × board. Likes received are resolved through the liked entity's
//! author; a reply's board is resolved through its parent post.
//!
//! Every function takes an actor filter. A row whose acting identity (author,
//! liker, visitor, seller) is rejected by the filter contributes nothing, on
//! either the giving or the receiving side.

use crate::identity::Identity;
use crate::ingest::schema::ListingKind;
use crate::ingest::Normalized;
use crate::types::{board_id_from_path, EventSource};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};

// ============================================
// Per-identity counts
// ============================================

/// Domain-action counts of one identity (or one admin cohort).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionCounts {
    pub posts: u32,
    pub replies: u32,
    pub likes_given_posts: u32,
    pub likes_given_replies: u32,
    pub likes_received_posts: u32,
    pub likes_received_replies: u32,
    pub listings: u32,
    pub likes_given_items: u32,
    pub likes_received_items: u32,
    /// Sum of trimmed post content lengths
    pub post_chars: u64,
    /// Sum of trimmed reply content lengths
    pub reply_chars: u64,
}

impl ActionCounts {
    pub fn likes_given(&self) -> u32 {
        self.likes_given_posts + self.likes_given_replies + self.likes_given_items
    }

    pub fn likes_received(&self) -> u32 {
        self.likes_received_posts + self.likes_received_replies + self.likes_received_items
    }

    /// Mean post length in characters, 0 without posts.
    pub fn avg_post_length(&self) -> f64 {
        mean(self.post_chars, self.posts)
    }

    /// Mean reply length in characters, 0 without replies.
    pub fn avg_reply_length(&self) -> f64 {
        mean(self.reply_chars, self.replies)
    }

    /// Add another identity's counts into this one.
    pub fn merge(&mut self, other: &ActionCounts) {
        self.posts += other.posts;
        self.replies += other.replies;
        self.likes_given_posts += other.likes_given_posts;
        self.likes_given_replies += other.likes_given_replies;
        self.likes_received_posts += other.likes_received_posts;
        self.likes_received_replies += other.likes_received_replies;
        self.listings += other.listings;
        self.likes_given_items += other.likes_given_items;
        self.likes_received_items += other.likes_received_items;
        self.post_chars += other.post_chars;
        self.reply_chars += other.reply_chars;
    }
}

fn mean(total: u64, count: u32) -> f64 {
    if count == 0 {
        0.0
    } else {
        total as f64 / f64::from(count)
    }
}

/// Author lookups used to credit likes received.
///
/// Board attribution goes through [`Normalized::board_of_post`] instead,
/// which also covers posts whose author did not resolve.
struct Authors<'a> {
    posts: HashMap<i64, &'a Identity>,
    replies: HashMap<i64, &'a Identity>,
    items: HashMap<i64, &'a Identity>,
}

impl<'a> Authors<'a> {
    fn index(data: &'a Normalized) -> Self {
        Self {
            posts: data.posts.iter().map(|p| (p.id, &p.author)).collect(),
            replies: data.replies.iter().map(|r| (r.id, &r.author)).collect(),
            items: data.listings.iter().map(|l| (l.id, &l.seller)).collect(),
        }
    }
}

/// Action counts for every identity accepted by `include`.
///
/// Identities appear only when they have at least one counted action.
pub fn actions_by_identity<F>(data: &Normalized, include: F) -> BTreeMap<Identity, ActionCounts>
where
    F: Fn(&Identity) -> bool,
{
    let authors = Authors::index(data);
    let mut counts: BTreeMap<Identity, ActionCounts> = BTreeMap::new();

    for post in data.posts.iter().filter(|p| include(&p.author)) {
        let c = action_slot(&mut counts, &post.author);
        c.posts += 1;
        c.post_chars += post.content_len as u64;
    }
    for reply in data.replies.iter().filter(|r| include(&r.author)) {
        let c = action_slot(&mut counts, &reply.author);
        c.replies += 1;
        c.reply_chars += reply.content_len as u64;
    }
    for like in data.post_likes.iter().filter(|l| include(&l.liker)) {
        action_slot(&mut counts, &like.liker).likes_given_posts += 1;
        if let Some(&author) = authors.posts.get(&like.target_id) {
            if include(author) {
                action_slot(&mut counts, author).likes_received_posts += 1;
            }
        }
    }
    for like in data.reply_likes.iter().filter(|l| include(&l.liker)) {
        action_slot(&mut counts, &like.liker).likes_given_replies += 1;
        if let Some(&author) = authors.replies.get(&like.target_id) {
            if include(author) {
                action_slot(&mut counts, author).likes_received_replies += 1;
            }
        }
    }
    for listing in data.listings.iter().filter(|l| include(&l.seller)) {
        action_slot(&mut counts, &listing.seller).listings += 1;
    }
    for like in data.item_likes.iter().filter(|l| include(&l.liker)) {
        action_slot(&mut counts, &like.liker).likes_given_items += 1;
        if let Some(&seller) = authors.items.get(&like.target_id) {
            if include(seller) {
                action_slot(&mut counts, seller).likes_received_items += 1;
            }
        }
    }

    counts
}

fn action_slot<'m>(
    counts: &'m mut BTreeMap<Identity, ActionCounts>,
    identity: &Identity,
) -> &'m mut ActionCounts {
    counts.entry(identity.clone()).or_default()
}

// ============================================
// Boards
// ============================================

/// One row per board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardSummary {
    pub board_id: String,
    pub post_count: u32,
    pub reply_count: u32,
    pub post_likes: u32,
    pub reply_likes: u32,
    /// Distinct identities seen visiting (board visits and `/board/<id>` page views)
    pub unique_visitors: u32,
    /// Distinct post authors
    pub unique_posters: u32,
    /// Instant of the most recent post
    pub latest_post: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct BoardAccumulator<'a> {
    posts: u32,
    replies: u32,
    post_likes: u32,
    reply_likes: u32,
    visitors: BTreeSet<&'a Identity>,
    posters: BTreeSet<&'a Identity>,
    latest_post: Option<DateTime<Utc>>,
}

/// Board ordering: shorter ids first, then lexicographic, so numeric ids sort naturally.
pub fn board_order(a: &str, b: &str) -> std::cmp::Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Per-board summaries for rows whose actor passes `include`.
///
/// Replies and likes whose board cannot be resolved are not attributed.
pub fn board_summaries<F>(data: &Normalized, include: F) -> Vec<BoardSummary>
where
    F: Fn(&Identity) -> bool,
{
    let mut boards: HashMap<&str, BoardAccumulator> = HashMap::new();

    for post in data.posts.iter().filter(|p| include(&p.author)) {
        let acc = boards.entry(post.board_id.as_str()).or_default();
        acc.posts += 1;
        acc.posters.insert(&post.author);
        acc.latest_post = acc.latest_post.max(Some(post.at));
    }
    for reply in data.replies.iter().filter(|r| include(&r.author)) {
        if let Some(board) = data.board_of_post(reply.post_id) {
            boards.entry(board).or_default().replies += 1;
        }
    }
    for like in data.post_likes.iter().filter(|l| include(&l.liker)) {
        if let Some(board) = data.board_of_post(like.target_id) {
            boards.entry(board).or_default().post_likes += 1;
        }
    }
    for like in data.reply_likes.iter().filter(|l| include(&l.liker)) {
        if let Some(board) = data.board_of_reply(like.target_id) {
            boards.entry(board).or_default().reply_likes += 1;
        }
    }
    for visit in data.visits.iter().filter(|v| include(&v.visitor)) {
        boards
            .entry(visit.board_id.as_str())
            .or_default()
            .visitors
            .insert(&visit.visitor);
    }
    for event in data
        .events
        .iter()
        .filter(|e| e.source == EventSource::PageView && include(&e.identity))
    {
        if let Some(board) = board_id_from_path(&event.resource_path) {
            boards.entry(board).or_default().visitors.insert(&event.identity);
        }
    }

    let mut rows: Vec<BoardSummary> = boards
        .into_iter()
        .map(|(board_id, acc)| BoardSummary {
            board_id: board_id.to_string(),
            post_count: acc.posts,
            reply_count: acc.replies,
            post_likes: acc.post_likes,
            reply_likes: acc.reply_likes,
            unique_visitors: acc.visitors.len() as u32,
            unique_posters: acc.posters.len() as u32,
            latest_post: acc.latest_post,
        })
        .collect();
    rows.sort_by(|a, b| board_order(&a.board_id, &b.board_id));
    rows
}

// ============================================
// Identity x board
// ============================================

/// Engagement of one identity on one board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserBoardEngagement {
    pub identity: Identity,
    pub board_id: String,
    pub posts: u32,
    pub replies: u32,
    pub likes_given_posts: u32,
    pub likes_given_replies: u32,
    pub likes_received_posts: u32,
    pub likes_received_replies: u32,
}

/// Identity × board engagement, ordered by identity then board.
pub fn user_board_engagement<F>(data: &Normalized, include: F) -> Vec<UserBoardEngagement>
where
    F: Fn(&Identity) -> bool,
{
    let authors = Authors::index(data);
    let mut cells: HashMap<(&Identity, &str), UserBoardEngagement> = HashMap::new();
    for post in data.posts.iter().filter(|p| include(&p.author)) {
        cell_slot(&mut cells, &post.author, &post.board_id).posts += 1;
    }
    for reply in data.replies.iter().filter(|r| include(&r.author)) {
        if let Some(board) = data.board_of_post(reply.post_id) {
            cell_slot(&mut cells, &reply.author, board).replies += 1;
        }
    }
    for like in data.post_likes.iter().filter(|l| include(&l.liker)) {
        let Some(board) = data.board_of_post(like.target_id) else {
            continue;
        };
        cell_slot(&mut cells, &like.liker, board).likes_given_posts += 1;
        if let Some(&author) = authors.posts.get(&like.target_id) {
            if include(author) {
                cell_slot(&mut cells, author, board).likes_received_posts += 1;
            }
        }
    }
    for like in data.reply_likes.iter().filter(|l| include(&l.liker)) {
        let Some(board) = data.board_of_reply(like.target_id) else {
            continue;
        };
        cell_slot(&mut cells, &like.liker, board).likes_given_replies += 1;
        if let Some(&author) = authors.replies.get(&like.target_id) {
            if include(author) {
                cell_slot(&mut cells, author, board).likes_received_replies += 1;
            }
        }
    }

    let mut rows: Vec<UserBoardEngagement> = cells.into_values().collect();
    rows.sort_by(|a, b| {
        a.identity
            .cmp(&b.identity)
            .then_with(|| board_order(&a.board_id, &b.board_id))
    });
    rows
}

fn cell_slot<'m, 'a>(
    cells: &'m mut HashMap<(&'a Identity, &'a str), UserBoardEngagement>,
    identity: &'a Identity,
    board: &'a str,
) -> &'m mut UserBoardEngagement {
    cells
        .entry((identity, board))
        .or_insert_with(|| UserBoardEngagement {
            identity: identity.clone(),
            board_id: board.to_string(),
            posts: 0,
            replies: 0,
            likes_given_posts: 0,
            likes_given_replies: 0,
            likes_received_posts: 0,
            likes_received_replies: 0,
        })
}

// ============================================
// Market sellers
// ============================================

/// One row per identity active on the marketplace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SellerSummary {
    pub identity: Identity,
    pub items: u32,
    pub sell_items: u32,
    pub buy_items: u32,
    pub free_items: u32,
    pub likes_given_items: u32,
    pub likes_received_items: u32,
    /// Most recent listing
    pub latest_listing: Option<DateTime<Utc>>,
}

/// Seller summaries for every identity with listings or item likes.
pub fn seller_summaries<F>(data: &Normalized, include: F) -> Vec<SellerSummary>
where
    F: Fn(&Identity) -> bool,
{
    let item_seller: HashMap<i64, &Identity> =
        data.listings.iter().map(|l| (l.id, &l.seller)).collect();
    let mut sellers: BTreeMap<&Identity, SellerSummary> = BTreeMap::new();

    for listing in data.listings.iter().filter(|l| include(&l.seller)) {
        let s = seller_slot(&mut sellers, &listing.seller);
        s.items += 1;
        match listing.kind {
            ListingKind::Sell => s.sell_items += 1,
            ListingKind::Buy => s.buy_items += 1,
            ListingKind::Free => s.free_items += 1,
            ListingKind::Other => {}
        }
        s.latest_listing = s.latest_listing.max(Some(listing.at));
    }
    for like in data.item_likes.iter().filter(|l| include(&l.liker)) {
        seller_slot(&mut sellers, &like.liker).likes_given_items += 1;
        if let Some(&seller) = item_seller.get(&like.target_id) {
            if include(seller) {
                seller_slot(&mut sellers, seller).likes_received_items += 1;
            }
        }
    }

    sellers.into_values().collect()
}

fn seller_slot<'m, 'a>(
    sellers: &'m mut BTreeMap<&'a Identity, SellerSummary>,
    identity: &'a Identity,
) -> &'m mut SellerSummary {
    sellers.entry(identity).or_insert_with(|| SellerSummary {
        identity: identity.clone(),
        items: 0,
        sell_items: 0,
        buy_items: 0,
        free_items: 0,
        likes_given_items: 0,
        likes_received_items: 0,
        latest_listing: None,
    })
}
