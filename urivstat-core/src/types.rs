//! Core domain types for urivstat
//!
//! These types describe the normalized view of a snapshot (Layer 1) and the
//! sessions derived from it.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Identity** | Canonical email of one person (see [`crate::identity`]) |
//! | **Event** | One observed action of an identity at an instant |
//! | **Session** | Maximal run of one identity's events without an inactivity gap |
//! | **Active day** | Calendar date (reference timezone) with at least one event |
//! | **Board** | Forum board, the sub-entity of forum roll-ups |
//! | **Listing** | Marketplace item offered by a seller |

use crate::identity::Identity;
use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

// ============================================
// Events
// ============================================

/// Input table an event was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    PageView,
    BoardVisit,
    Post,
    Reply,
    PostLike,
    ReplyLike,
    Listing,
    ItemLike,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::PageView => "page_view",
            EventSource::BoardVisit => "board_visit",
            EventSource::Post => "post",
            EventSource::Reply => "reply",
            EventSource::PostLike => "post_like",
            EventSource::ReplyLike => "reply_like",
            EventSource::Listing => "listing",
            EventSource::ItemLike => "item_like",
        }
    }
}

/// One observed action at a point in time.
///
/// Events are never mutated after normalization; every aggregate derives from them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Canonical identity of the actor
    pub identity: Identity,
    /// Absolute instant of the action
    pub at: DateTime<Utc>,
    /// Path used for classification (empty when unknown)
    pub resource_path: String,
    /// Table the event came from
    pub source: EventSource,
    /// Opaque user agent, carried through unused
    pub user_agent: Option<String>,
}

impl Event {
    /// Whether the actor is an admin account.
    pub fn is_admin(&self) -> bool {
        self.identity.is_admin()
    }
}

// ============================================
// Resource categories
// ============================================

/// Fixed classification of resource paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceCategory {
    Board,
    Market,
    Course,
    Circle,
    Other,
}

static CATEGORY_PATTERNS: Lazy<Vec<(ResourceCategory, Regex)>> = Lazy::new(|| {
    [
        (ResourceCategory::Board, r"(?:^|/)boards?(?:/|$|\?|#)"),
        (ResourceCategory::Market, r"(?:^|/)market(?:/|$|\?|#)"),
        (ResourceCategory::Course, r"(?:^|/)courses?(?:/|$|\?|#)"),
        (ResourceCategory::Circle, r"(?:^|/)circles?(?:/|$|\?|#)"),
    ]
    .into_iter()
    .map(|(category, pattern)| {
        (
            category,
            Regex::new(pattern).expect("category pattern is valid"),
        )
    })
    .collect()
});

static BOARD_ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|/)board/([^/?#]+)").expect("board id pattern is valid")
});

impl ResourceCategory {
    /// Every category, `Other` last.
    pub const ALL: [ResourceCategory; 5] = [
        ResourceCategory::Board,
        ResourceCategory::Market,
        ResourceCategory::Course,
        ResourceCategory::Circle,
        ResourceCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceCategory::Board => "board",
            ResourceCategory::Market => "market",
            ResourceCategory::Course => "course",
            ResourceCategory::Circle => "circle",
            ResourceCategory::Other => "other",
        }
    }

    /// Categories a path belongs to.
    ///
    /// Not exclusive: a path can match several categories. Unmatched paths
    /// (including the empty path) are `Other`.
    pub fn classify(path: &str) -> Vec<ResourceCategory> {
        let matched: Vec<_> = CATEGORY_PATTERNS
            .iter()
            .filter(|(_, re)| re.is_match(path))
            .map(|(category, _)| *category)
            .collect();
        if matched.is_empty() {
            vec![ResourceCategory::Other]
        } else {
            matched
        }
    }
}

/// Board id addressed by a path such as `/board/3` or `/board/3/post/9`.
pub fn board_id_from_path(path: &str) -> Option<&str> {
    BOARD_ID_PATTERN
        .captures(path)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Per-category event tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryCounts {
    pub board: u32,
    pub market: u32,
    pub course: u32,
    pub circle: u32,
    pub other: u32,
}

impl CategoryCounts {
    /// Tally one path into every category it matches.
    pub fn record(&mut self, path: &str) {
        for category in ResourceCategory::classify(path) {
            *self.slot(category) += 1;
        }
    }

    pub fn get(&self, category: ResourceCategory) -> u32 {
        match category {
            ResourceCategory::Board => self.board,
            ResourceCategory::Market => self.market,
            ResourceCategory::Course => self.course,
            ResourceCategory::Circle => self.circle,
            ResourceCategory::Other => self.other,
        }
    }

    fn slot(&mut self, category: ResourceCategory) -> &mut u32 {
        match category {
            ResourceCategory::Board => &mut self.board,
            ResourceCategory::Market => &mut self.market,
            ResourceCategory::Course => &mut self.course,
            ResourceCategory::Circle => &mut self.circle,
            ResourceCategory::Other => &mut self.other,
        }
    }
}

// ============================================
// Sessions
// ============================================

/// A maximal run of one identity's events with no internal gap above the threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Identity the session belongs to
    pub identity: Identity,
    /// Position of this session in the identity's chronological list (0-based)
    pub index: usize,
    /// Instant of the first event
    pub started_at: DateTime<Utc>,
    /// Instant of the last event
    pub ended_at: DateTime<Utc>,
    /// Number of member events
    pub event_count: usize,
    /// Number of distinct resource paths among member events
    pub distinct_resources: usize,
    /// Per-category tallies of member events
    pub categories: CategoryCounts,
}

impl Session {
    /// `ended_at - started_at`; zero for single-event sessions.
    pub fn duration(&self) -> Duration {
        self.ended_at - self.started_at
    }

    /// Stable identifier derived from identity and start instant.
    pub fn id(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.identity.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(self.started_at.to_rfc3339().as_bytes());
        hex::encode(&hasher.finalize()[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_paths() {
        assert_eq!(
            ResourceCategory::classify("/board/3"),
            vec![ResourceCategory::Board]
        );
        assert_eq!(
            ResourceCategory::classify("/market?type=sell"),
            vec![ResourceCategory::Market]
        );
        assert_eq!(
            ResourceCategory::classify("/courses"),
            vec![ResourceCategory::Course]
        );
        assert_eq!(
            ResourceCategory::classify("/circle/12"),
            vec![ResourceCategory::Circle]
        );
        assert_eq!(ResourceCategory::classify(""), vec![ResourceCategory::Other]);
        assert_eq!(
            ResourceCategory::classify("/dashboard"),
            vec![ResourceCategory::Other]
        );
    }

    #[test]
    fn test_classify_is_not_exclusive() {
        assert_eq!(
            ResourceCategory::classify("/market/board/4"),
            vec![ResourceCategory::Board, ResourceCategory::Market]
        );

        let mut counts = CategoryCounts::default();
        counts.record("/market/board/4");
        counts.record("/home");
        assert_eq!(counts.board, 1);
        assert_eq!(counts.market, 1);
        assert_eq!(counts.other, 1);
        assert_eq!(counts.get(ResourceCategory::Course), 0);
    }

    #[test]
    fn test_board_id_from_path() {
        assert_eq!(board_id_from_path("/board/3"), Some("3"));
        assert_eq!(board_id_from_path("/board/3/post/9?x=1"), Some("3"));
        assert_eq!(board_id_from_path("/boards"), None);
        assert_eq!(board_id_from_path("/market/7"), None);
    }

    #[test]
    fn test_session_id_is_stable() {
        let identity = crate::identity::EmailRules::builtin()
            .identity("u1@keio.jp")
            .unwrap();
        let at = DateTime::parse_from_rfc3339("2025-01-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let session = Session {
            identity,
            index: 0,
            started_at: at,
            ended_at: at,
            event_count: 1,
            distinct_resources: 1,
            categories: CategoryCounts::default(),
        };
        assert_eq!(session.id(), session.clone().id());
        assert_eq!(session.id().len(), 16);
        assert_eq!(session.duration(), Duration::zero());
    }
}
