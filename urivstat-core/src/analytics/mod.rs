//! Analytics for urivstat
//!
//! Derives Layer 2 aggregates from a [`Normalized`] snapshot:
//! - Sessions (gap-based segmentation), see [`session`]
//! - Active days and streaks, see [`streak`]
//! - Domain-action roll-ups per identity, board and seller, see [`rollup`]
//! - Per-user engagement summaries and the admin cohort report, see [`engagement`]
//!
//! Everything is recomputed from scratch on each call; nothing is cached
//! between runs.

pub mod engagement;
pub mod rollup;
pub mod session;
pub mod streak;

pub use engagement::{admin_cohorts, summarize_identities, AdminCohortSummary, EngagementSummary};
pub use rollup::{
    actions_by_identity, board_summaries, seller_summaries, user_board_engagement, ActionCounts,
    BoardSummary, SellerSummary, UserBoardEngagement,
};
pub use session::{segment_identity, sessionize, split_by_gap};
pub use streak::{local_date, ActivityCalendar, StreakParams, StreakStats};

use crate::config::AnalyticsConfig;
use crate::error::Result;
use crate::identity::Identity;
use crate::ingest::Normalized;
use crate::types::Session;
use chrono::{DateTime, Duration, FixedOffset, Utc};

/// Resolved inputs of one aggregation run.
#[derive(Debug, Clone, Copy)]
pub struct AggregateParams {
    /// Inactivity threshold between sessions
    pub gap: Duration,
    /// Reference timezone for calendar dates
    pub offset: FixedOffset,
    /// Instant the run is computed as of
    pub as_of: DateTime<Utc>,
    pub streak: StreakParams,
    /// Report admin identities alongside everyone else
    pub include_admins: bool,
}

impl AggregateParams {
    pub fn from_config(config: &AnalyticsConfig, as_of: DateTime<Utc>) -> Result<Self> {
        config.validate()?;
        let offset = config.reference_offset()?;
        Ok(Self {
            gap: config.session_gap(),
            offset,
            as_of,
            streak: StreakParams {
                today: local_date(as_of, offset),
                anchor: config.current_streak,
                short_window_days: config.window_short_days,
                long_window_days: config.window_long_days,
            },
            include_admins: config.include_admins,
        })
    }

    /// Whether an identity belongs in the general (non-admin) outputs.
    pub fn includes(&self, identity: &Identity) -> bool {
        self.include_admins || !identity.is_admin()
    }
}

/// Every aggregate table of one run.
#[derive(Debug, Clone, Default)]
pub struct Aggregates {
    pub sessions: Vec<Session>,
    pub users: Vec<EngagementSummary>,
    pub user_boards: Vec<UserBoardEngagement>,
    pub boards: Vec<BoardSummary>,
    pub sellers: Vec<SellerSummary>,
    pub admin_cohorts: Vec<AdminCohortSummary>,
}

/// Compute all aggregates of a normalized snapshot.
///
/// Admin identities are left out of every table except `admin_cohorts`
/// unless `include_admins` is set. The admin cohort report always counts
/// admin rows, whatever the setting.
pub fn aggregate(data: &Normalized, params: &AggregateParams) -> Aggregates {
    let include = |identity: &Identity| params.includes(identity);

    let all_sessions = sessionize(&data.events, params.gap);

    let user_actions = actions_by_identity(data, include);
    let users = summarize_identities(
        data,
        &all_sessions,
        &user_actions,
        &params.streak,
        params.offset,
        include,
    );

    let all_actions = actions_by_identity(data, |_| true);
    let admins = summarize_identities(
        data,
        &all_sessions,
        &all_actions,
        &params.streak,
        params.offset,
        Identity::is_admin,
    );

    let aggregates = Aggregates {
        user_boards: user_board_engagement(data, include),
        boards: board_summaries(data, include),
        sellers: seller_summaries(data, include),
        admin_cohorts: admin_cohorts(&admins),
        sessions: all_sessions
            .into_iter()
            .filter(|s| include(&s.identity))
            .collect(),
        users,
    };

    tracing::info!(
        users = aggregates.users.len(),
        sessions = aggregates.sessions.len(),
        boards = aggregates.boards.len(),
        sellers = aggregates.sellers.len(),
        admins = admins.len(),
        include_admins = params.include_admins,
        "Computed aggregates"
    );
    aggregates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreakAnchor;
    use crate::identity::EmailRules;
    use crate::types::{Event, EventSource};

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn view(email: &str, at: &str) -> Event {
        Event {
            identity: EmailRules::builtin().identity(email).unwrap(),
            at: ts(at),
            resource_path: "/board/1".to_string(),
            source: EventSource::PageView,
            user_agent: None,
        }
    }

    #[test]
    fn test_params_from_config() {
        let config = AnalyticsConfig::default();
        // 2025-01-04T20:00Z is already 2025-01-05 in +09:00
        let params = AggregateParams::from_config(&config, ts("2025-01-04T20:00:00Z")).unwrap();
        assert_eq!(params.gap, Duration::minutes(30));
        assert_eq!(params.offset.local_minus_utc(), 9 * 3600);
        assert_eq!(params.streak.today.to_string(), "2025-01-05");
        assert_eq!(params.streak.anchor, StreakAnchor::Today);
        assert!(!params.include_admins);
    }

    #[test]
    fn test_aggregate_excludes_admins_by_default() {
        let mut data = Normalized::default();
        data.events = vec![
            view("u1@keio.jp", "2025-01-05T01:00:00Z"),
            view("master05@ac.jp", "2025-01-05T01:00:00Z"),
        ];
        let config = AnalyticsConfig::default();
        let params = AggregateParams::from_config(&config, ts("2025-01-05T12:00:00Z")).unwrap();

        let out = aggregate(&data, &params);
        assert_eq!(out.users.len(), 1);
        assert_eq!(out.sessions.len(), 1);
        assert_eq!(out.boards.len(), 1);
        assert_eq!(out.boards[0].unique_visitors, 1);
        assert_eq!(out.admin_cohorts[0].members, 1);

        let mut config = AnalyticsConfig::default();
        config.include_admins = true;
        let params = AggregateParams::from_config(&config, ts("2025-01-05T12:00:00Z")).unwrap();
        let out = aggregate(&data, &params);
        assert_eq!(out.users.len(), 2);
        assert_eq!(out.sessions.len(), 2);
        assert_eq!(out.admin_cohorts[0].members, 1);
    }

    #[test]
    fn test_aggregate_empty() {
        let params =
            AggregateParams::from_config(&AnalyticsConfig::default(), ts("2025-01-05T12:00:00Z"))
                .unwrap();
        let out = aggregate(&Normalized::default(), &params);
        assert!(out.users.is_empty());
        assert!(out.sessions.is_empty());
        assert!(out.boards.is_empty());
        assert_eq!(out.admin_cohorts.len(), 3);
    }
}
