//! Summary writer: aggregate tables to flat CSV files
//!
//! Each output table has a fixed column list ([`TableRow::HEADERS`]). The
//! header row is always written, so a table with zero rows is still a valid
//! file with the expected columns. Absent optional values are empty fields.
//!
//! Timestamps are RFC 3339 in the reference offset; dates are `YYYY-MM-DD`;
//! averages are rounded to two decimals.

use crate::analytics::{
    ActionCounts, AdminCohortSummary, Aggregates, BoardSummary, EngagementSummary, SellerSummary,
    UserBoardEngagement,
};
use crate::error::Result;
use crate::types::Session;
use chrono::{DateTime, FixedOffset, NaiveDate, SecondsFormat, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const USERS_SUMMARY: &str = "users_summary.csv";
pub const USER_BOARD_ENGAGEMENT: &str = "user_board_engagement.csv";
pub const BOARDS_SUMMARY: &str = "boards_summary.csv";
pub const MARKET_SUMMARY: &str = "market_summary.csv";
pub const SESSIONS: &str = "sessions.csv";
pub const ADMIN_COHORTS: &str = "admin_cohorts.csv";

/// A row type with a fixed output file and column list.
///
/// `HEADERS` must list the serialized field names in declaration order.
pub trait TableRow: Serialize {
    const FILE: &'static str;
    const HEADERS: &'static [&'static str];
}

/// One written output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WrittenTable {
    pub file: String,
    pub rows: usize,
}

// ============================================
// Field formatting
// ============================================

fn timestamp(at: Option<DateTime<Utc>>, offset: FixedOffset) -> Option<String> {
    at.map(|at| {
        at.with_timezone(&offset)
            .to_rfc3339_opts(SecondsFormat::Secs, false)
    })
}

fn date(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format("%Y-%m-%d").to_string())
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ============================================
// Rows
// ============================================

/// `users_summary.csv`
#[derive(Debug, Clone, Serialize)]
pub struct UserSummaryRow {
    pub identity: String,
    /// Account ids folded into this identity, `;`-separated
    pub user_ids: String,
    pub university: Option<String>,
    pub year: Option<String>,
    pub department: Option<String>,
    pub active_days_total: u32,
    pub active_days_30d: u32,
    pub active_days_7d: u32,
    pub current_streak_days: u32,
    pub longest_streak_days: u32,
    pub longest_streak_start: Option<String>,
    pub longest_streak_end: Option<String>,
    pub first_seen: Option<String>,
    pub last_seen: Option<String>,
    pub events: u32,
    pub sessions: u32,
    pub session_seconds: i64,
    pub posts: u32,
    pub replies: u32,
    pub likes_given_posts: u32,
    pub likes_given_replies: u32,
    pub likes_received_posts: u32,
    pub likes_received_replies: u32,
    pub listings: u32,
    pub likes_given_items: u32,
    pub likes_received_items: u32,
    pub avg_post_length: f64,
    pub avg_reply_length: f64,
}

impl TableRow for UserSummaryRow {
    const FILE: &'static str = USERS_SUMMARY;
    const HEADERS: &'static [&'static str] = &[
        "identity",
        "user_ids",
        "university",
        "year",
        "department",
        "active_days_total",
        "active_days_30d",
        "active_days_7d",
        "current_streak_days",
        "longest_streak_days",
        "longest_streak_start",
        "longest_streak_end",
        "first_seen",
        "last_seen",
        "events",
        "sessions",
        "session_seconds",
        "posts",
        "replies",
        "likes_given_posts",
        "likes_given_replies",
        "likes_received_posts",
        "likes_received_replies",
        "listings",
        "likes_given_items",
        "likes_received_items",
        "avg_post_length",
        "avg_reply_length",
    ];
}

impl UserSummaryRow {
    pub fn new(summary: &EngagementSummary, offset: FixedOffset) -> Self {
        let profile = summary.profile.as_ref();
        let actions: &ActionCounts = &summary.actions;
        let streaks = &summary.streaks;
        Self {
            identity: summary.identity.to_string(),
            user_ids: profile
                .map(|p| {
                    p.user_ids
                        .iter()
                        .map(|id| id.to_string())
                        .collect::<Vec<_>>()
                        .join(";")
                })
                .unwrap_or_default(),
            university: profile.and_then(|p| p.university.clone()),
            year: profile.and_then(|p| p.year.clone()),
            department: profile.and_then(|p| p.department.clone()),
            active_days_total: streaks.active_days_total,
            active_days_30d: streaks.active_days_long,
            active_days_7d: streaks.active_days_short,
            current_streak_days: streaks.current_streak_days,
            longest_streak_days: streaks.longest_streak_days,
            longest_streak_start: date(streaks.longest_streak_start),
            longest_streak_end: date(streaks.longest_streak_end),
            first_seen: timestamp(summary.first_seen, offset),
            last_seen: timestamp(summary.last_seen, offset),
            events: summary.events,
            sessions: summary.sessions,
            session_seconds: summary.session_seconds,
            posts: actions.posts,
            replies: actions.replies,
            likes_given_posts: actions.likes_given_posts,
            likes_given_replies: actions.likes_given_replies,
            likes_received_posts: actions.likes_received_posts,
            likes_received_replies: actions.likes_received_replies,
            listings: actions.listings,
            likes_given_items: actions.likes_given_items,
            likes_received_items: actions.likes_received_items,
            avg_post_length: round2(actions.avg_post_length()),
            avg_reply_length: round2(actions.avg_reply_length()),
        }
    }
}

/// `user_board_engagement.csv`
#[derive(Debug, Clone, Serialize)]
pub struct UserBoardRow {
    pub identity: String,
    pub board_id: String,
    pub posts: u32,
    pub replies: u32,
    pub likes_given_posts: u32,
    pub likes_given_replies: u32,
    pub likes_received_posts: u32,
    pub likes_received_replies: u32,
}

impl TableRow for UserBoardRow {
    const FILE: &'static str = USER_BOARD_ENGAGEMENT;
    const HEADERS: &'static [&'static str] = &[
        "identity",
        "board_id",
        "posts",
        "replies",
        "likes_given_posts",
        "likes_given_replies",
        "likes_received_posts",
        "likes_received_replies",
    ];
}

impl From<&UserBoardEngagement> for UserBoardRow {
    fn from(e: &UserBoardEngagement) -> Self {
        Self {
            identity: e.identity.to_string(),
            board_id: e.board_id.clone(),
            posts: e.posts,
            replies: e.replies,
            likes_given_posts: e.likes_given_posts,
            likes_given_replies: e.likes_given_replies,
            likes_received_posts: e.likes_received_posts,
            likes_received_replies: e.likes_received_replies,
        }
    }
}

/// `boards_summary.csv`
#[derive(Debug, Clone, Serialize)]
pub struct BoardRow {
    pub board_id: String,
    pub post_count: u32,
    pub reply_count: u32,
    pub post_likes: u32,
    pub reply_likes: u32,
    pub unique_visitors: u32,
    pub unique_posters: u32,
    pub latest_post: Option<String>,
}

impl TableRow for BoardRow {
    const FILE: &'static str = BOARDS_SUMMARY;
    const HEADERS: &'static [&'static str] = &[
        "board_id",
        "post_count",
        "reply_count",
        "post_likes",
        "reply_likes",
        "unique_visitors",
        "unique_posters",
        "latest_post",
    ];
}

impl BoardRow {
    pub fn new(board: &BoardSummary, offset: FixedOffset) -> Self {
        Self {
            board_id: board.board_id.clone(),
            post_count: board.post_count,
            reply_count: board.reply_count,
            post_likes: board.post_likes,
            reply_likes: board.reply_likes,
            unique_visitors: board.unique_visitors,
            unique_posters: board.unique_posters,
            latest_post: timestamp(board.latest_post, offset),
        }
    }
}

/// `market_summary.csv`
#[derive(Debug, Clone, Serialize)]
pub struct MarketRow {
    pub identity: String,
    pub items: u32,
    pub sell_items: u32,
    pub buy_items: u32,
    pub free_items: u32,
    pub likes_given_items: u32,
    pub likes_received_items: u32,
    pub latest_listing: Option<String>,
}

impl TableRow for MarketRow {
    const FILE: &'static str = MARKET_SUMMARY;
    const HEADERS: &'static [&'static str] = &[
        "identity",
        "items",
        "sell_items",
        "buy_items",
        "free_items",
        "likes_given_items",
        "likes_received_items",
        "latest_listing",
    ];
}

impl MarketRow {
    pub fn new(seller: &SellerSummary, offset: FixedOffset) -> Self {
        Self {
            identity: seller.identity.to_string(),
            items: seller.items,
            sell_items: seller.sell_items,
            buy_items: seller.buy_items,
            free_items: seller.free_items,
            likes_given_items: seller.likes_given_items,
            likes_received_items: seller.likes_received_items,
            latest_listing: timestamp(seller.latest_listing, offset),
        }
    }
}

/// `sessions.csv`
#[derive(Debug, Clone, Serialize)]
pub struct SessionRow {
    pub session_id: String,
    pub identity: String,
    pub session_index: usize,
    pub started_at: String,
    pub ended_at: String,
    pub duration_seconds: i64,
    pub event_count: usize,
    pub distinct_resources: usize,
    pub board_events: u32,
    pub market_events: u32,
    pub course_events: u32,
    pub circle_events: u32,
    pub other_events: u32,
}

impl TableRow for SessionRow {
    const FILE: &'static str = SESSIONS;
    const HEADERS: &'static [&'static str] = &[
        "session_id",
        "identity",
        "session_index",
        "started_at",
        "ended_at",
        "duration_seconds",
        "event_count",
        "distinct_resources",
        "board_events",
        "market_events",
        "course_events",
        "circle_events",
        "other_events",
    ];
}

impl SessionRow {
    pub fn new(session: &Session, offset: FixedOffset) -> Self {
        let stamp = |at: DateTime<Utc>| timestamp(Some(at), offset).unwrap_or_default();
        Self {
            session_id: session.id(),
            identity: session.identity.to_string(),
            session_index: session.index,
            started_at: stamp(session.started_at),
            ended_at: stamp(session.ended_at),
            duration_seconds: session.duration().num_seconds(),
            event_count: session.event_count,
            distinct_resources: session.distinct_resources,
            board_events: session.categories.board,
            market_events: session.categories.market,
            course_events: session.categories.course,
            circle_events: session.categories.circle,
            other_events: session.categories.other,
        }
    }
}

/// `admin_cohorts.csv`
#[derive(Debug, Clone, Serialize)]
pub struct AdminCohortRow {
    pub cohort: String,
    pub members: u32,
    pub events: u32,
    pub sessions: u32,
    pub session_seconds: i64,
    pub active_days_total: u32,
    pub active_days_30d: u32,
    pub active_days_7d: u32,
    pub posts: u32,
    pub replies: u32,
    pub likes_given: u32,
    pub likes_received: u32,
    pub listings: u32,
    pub last_seen: Option<String>,
}

impl TableRow for AdminCohortRow {
    const FILE: &'static str = ADMIN_COHORTS;
    const HEADERS: &'static [&'static str] = &[
        "cohort",
        "members",
        "events",
        "sessions",
        "session_seconds",
        "active_days_total",
        "active_days_30d",
        "active_days_7d",
        "posts",
        "replies",
        "likes_given",
        "likes_received",
        "listings",
        "last_seen",
    ];
}

impl AdminCohortRow {
    pub fn new(cohort: &AdminCohortSummary, offset: FixedOffset) -> Self {
        Self {
            cohort: cohort.cohort.label().to_string(),
            members: cohort.members,
            events: cohort.events,
            sessions: cohort.sessions,
            session_seconds: cohort.session_seconds,
            active_days_total: cohort.active_days_total,
            active_days_30d: cohort.active_days_long,
            active_days_7d: cohort.active_days_short,
            posts: cohort.actions.posts,
            replies: cohort.actions.replies,
            likes_given: cohort.actions.likes_given(),
            likes_received: cohort.actions.likes_received(),
            listings: cohort.actions.listings,
            last_seen: timestamp(cohort.last_seen, offset),
        }
    }
}

// ============================================
// Writer
// ============================================

/// Writes aggregate tables into one output directory.
///
/// Existing files of the same name are replaced.
pub struct SummaryWriter {
    out_dir: PathBuf,
    offset: FixedOffset,
}

impl SummaryWriter {
    pub fn new(out_dir: &Path, offset: FixedOffset) -> Self {
        Self {
            out_dir: out_dir.to_path_buf(),
            offset,
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Write one table, header first.
    pub fn write_table<R: TableRow>(&self, rows: &[R]) -> Result<WrittenTable> {
        fs::create_dir_all(&self.out_dir)?;
        let path = self.out_dir.join(R::FILE);
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&path)?;
        writer.write_record(R::HEADERS)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;

        tracing::debug!(file = R::FILE, rows = rows.len(), "Wrote summary table");
        Ok(WrittenTable {
            file: R::FILE.to_string(),
            rows: rows.len(),
        })
    }

    /// Write every aggregate table.
    pub fn write_all(&self, aggregates: &Aggregates) -> Result<Vec<WrittenTable>> {
        let offset = self.offset;

        let users: Vec<UserSummaryRow> = aggregates
            .users
            .iter()
            .map(|s| UserSummaryRow::new(s, offset))
            .collect();
        let user_boards: Vec<UserBoardRow> =
            aggregates.user_boards.iter().map(UserBoardRow::from).collect();
        let boards: Vec<BoardRow> = aggregates
            .boards
            .iter()
            .map(|b| BoardRow::new(b, offset))
            .collect();
        let sellers: Vec<MarketRow> = aggregates
            .sellers
            .iter()
            .map(|s| MarketRow::new(s, offset))
            .collect();
        let sessions: Vec<SessionRow> = aggregates
            .sessions
            .iter()
            .map(|s| SessionRow::new(s, offset))
            .collect();
        let cohorts: Vec<AdminCohortRow> = aggregates
            .admin_cohorts
            .iter()
            .map(|c| AdminCohortRow::new(c, offset))
            .collect();

        let written = vec![
            self.write_table(&users)?,
            self.write_table(&user_boards)?,
            self.write_table(&boards)?,
            self.write_table(&sellers)?,
            self.write_table(&sessions)?,
            self.write_table(&cohorts)?,
        ];

        tracing::info!(
            out_dir = %self.out_dir.display(),
            tables = written.len(),
            "Wrote summary tables"
        );
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::StreakStats;
    use crate::identity::EmailRules;
    use crate::ingest::Profile;
    use crate::types::CategoryCounts;
    use tempfile::TempDir;

    fn jst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    /// Serialize one row with serde-derived headers and compare to `HEADERS`.
    fn assert_headers<R: TableRow>(row: R) {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.serialize(row).unwrap();
        let bytes = writer.into_inner().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let header = text.lines().next().unwrap();
        assert_eq!(header, R::HEADERS.join(","), "{}", R::FILE);
    }

    fn summary() -> EngagementSummary {
        EngagementSummary {
            identity: EmailRules::builtin().identity("u1@keio.jp").unwrap(),
            profile: Some(Profile {
                user_ids: vec![3, 8],
                university: Some("Keio".to_string()),
                year: None,
                department: None,
            }),
            streaks: StreakStats {
                active_days_total: 2,
                longest_streak_days: 2,
                longest_streak_start: NaiveDate::from_ymd_opt(2025, 1, 1),
                longest_streak_end: NaiveDate::from_ymd_opt(2025, 1, 2),
                ..Default::default()
            },
            first_seen: Some(ts("2025-01-01T01:00:00Z")),
            last_seen: Some(ts("2025-01-02T01:00:00Z")),
            events: 2,
            sessions: 2,
            session_seconds: 0,
            actions: ActionCounts {
                posts: 3,
                post_chars: 10,
                ..Default::default()
            },
        }
    }

    fn session() -> Session {
        Session {
            identity: EmailRules::builtin().identity("u1@keio.jp").unwrap(),
            index: 0,
            started_at: ts("2025-01-01T01:00:00Z"),
            ended_at: ts("2025-01-01T01:10:00Z"),
            event_count: 2,
            distinct_resources: 1,
            categories: CategoryCounts {
                board: 2,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_headers_match_fields() {
        let offset = jst();
        assert_headers(UserSummaryRow::new(&summary(), offset));
        assert_headers(SessionRow::new(&session(), offset));
        assert_headers(BoardRow::new(
            &BoardSummary {
                board_id: "3".to_string(),
                post_count: 0,
                reply_count: 0,
                post_likes: 0,
                reply_likes: 0,
                unique_visitors: 0,
                unique_posters: 0,
                latest_post: None,
            },
            offset,
        ));
        let identity = EmailRules::builtin().identity("u1@keio.jp").unwrap();
        assert_headers(UserBoardRow::from(&UserBoardEngagement {
            identity: identity.clone(),
            board_id: "3".to_string(),
            posts: 1,
            replies: 0,
            likes_given_posts: 0,
            likes_given_replies: 0,
            likes_received_posts: 0,
            likes_received_replies: 0,
        }));
        assert_headers(MarketRow::new(
            &SellerSummary {
                identity,
                items: 1,
                sell_items: 1,
                buy_items: 0,
                free_items: 0,
                likes_given_items: 0,
                likes_received_items: 0,
                latest_listing: None,
            },
            offset,
        ));
        let cohorts = crate::analytics::admin_cohorts(&[]);
        assert_headers(AdminCohortRow::new(&cohorts[0], offset));
    }

    #[test]
    fn test_user_row_formatting() {
        let row = UserSummaryRow::new(&summary(), jst());
        assert_eq!(row.user_ids, "3;8");
        assert_eq!(row.first_seen.as_deref(), Some("2025-01-01T10:00:00+09:00"));
        assert_eq!(row.longest_streak_start.as_deref(), Some("2025-01-01"));
        assert_eq!(row.avg_post_length, 3.33);
        assert_eq!(row.avg_reply_length, 0.0);
        assert!(row.year.is_none());
    }

    #[test]
    fn test_session_row() {
        let row = SessionRow::new(&session(), jst());
        assert_eq!(row.duration_seconds, 600);
        assert_eq!(row.board_events, 2);
        assert_eq!(row.started_at, "2025-01-01T10:00:00+09:00");
        assert_eq!(row.session_id.len(), 16);
    }

    #[test]
    fn test_write_all_empty_tables_keep_headers() {
        let dir = TempDir::new().unwrap();
        let writer = SummaryWriter::new(dir.path(), jst());
        let written = writer.write_all(&Aggregates::default()).unwrap();

        assert_eq!(written.len(), 6);
        assert!(written.iter().all(|w| w.rows == 0));
        let users = fs::read_to_string(dir.path().join(USERS_SUMMARY)).unwrap();
        assert_eq!(users.trim_end(), UserSummaryRow::HEADERS.join(","));
    }

    #[test]
    fn test_missing_optionals_are_empty_fields() {
        let dir = TempDir::new().unwrap();
        let writer = SummaryWriter::new(dir.path(), jst());
        let mut row = summary();
        row.profile = None;
        row.first_seen = None;
        writer
            .write_table(&[UserSummaryRow::new(&row, jst())])
            .unwrap();

        let text = fs::read_to_string(dir.path().join(USERS_SUMMARY)).unwrap();
        let data_line = text.lines().nth(1).unwrap();
        assert!(data_line.starts_with("u1@keio.jp,,,,,2,"));
    }
}
