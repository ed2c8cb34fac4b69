//! Per-identity engagement summaries and the admin cohort report

use super::rollup::ActionCounts;
use super::streak::{ActivityCalendar, StreakParams, StreakStats};
use crate::identity::{AdminCohort, Identity};
use crate::ingest::{Normalized, Profile};
use crate::types::Session;
use chrono::{DateTime, FixedOffset, Utc};
use std::collections::{BTreeMap, BTreeSet};

/// One row of the per-user summary.
#[derive(Debug, Clone, PartialEq)]
pub struct EngagementSummary {
    pub identity: Identity,
    /// Attributes joined from `users`, if the identity has an account row
    pub profile: Option<Profile>,
    pub streaks: StreakStats,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub events: u32,
    pub sessions: u32,
    /// Sum of session durations
    pub session_seconds: i64,
    pub actions: ActionCounts,
}

#[derive(Default)]
struct Activity {
    instants: Vec<DateTime<Utc>>,
    sessions: u32,
    session_seconds: i64,
}

/// Engagement summaries for every identity accepted by `include`.
///
/// An identity gets a row when it has at least one event or one counted
/// action. Rows are ordered by identity.
pub fn summarize_identities<F>(
    data: &Normalized,
    sessions: &[Session],
    actions: &BTreeMap<Identity, ActionCounts>,
    params: &StreakParams,
    offset: FixedOffset,
    include: F,
) -> Vec<EngagementSummary>
where
    F: Fn(&Identity) -> bool,
{
    let mut activity: BTreeMap<&Identity, Activity> = BTreeMap::new();
    for event in data.events.iter().filter(|e| include(&e.identity)) {
        activity
            .entry(&event.identity)
            .or_default()
            .instants
            .push(event.at);
    }
    for session in sessions.iter().filter(|s| include(&s.identity)) {
        let a = activity.entry(&session.identity).or_default();
        a.sessions += 1;
        a.session_seconds += session.duration().num_seconds();
    }

    let identities: BTreeSet<&Identity> = activity
        .keys()
        .copied()
        .chain(actions.keys().filter(|id| include(*id)))
        .collect();

    identities
        .into_iter()
        .map(|identity| {
            let a = activity.remove(identity).unwrap_or_default();
            let calendar = ActivityCalendar::from_instants(a.instants.iter().copied(), offset);
            EngagementSummary {
                identity: identity.clone(),
                profile: data.profiles.get(identity).cloned(),
                streaks: StreakStats::compute(&calendar, params),
                first_seen: a.instants.iter().min().copied(),
                last_seen: a.instants.iter().max().copied(),
                events: a.instants.len() as u32,
                sessions: a.sessions,
                session_seconds: a.session_seconds,
                actions: actions.get(identity).copied().unwrap_or_default(),
            }
        })
        .collect()
}

// ============================================
// Admin cohorts
// ============================================

/// Summed metrics of the admin identities in one numeric sub-range.
#[derive(Debug, Clone, PartialEq)]
pub struct AdminCohortSummary {
    pub cohort: AdminCohort,
    /// Admin identities with any activity in this cohort
    pub members: u32,
    pub events: u32,
    pub sessions: u32,
    pub session_seconds: i64,
    pub active_days_total: u32,
    pub active_days_long: u32,
    pub active_days_short: u32,
    pub actions: ActionCounts,
    pub last_seen: Option<DateTime<Utc>>,
}

impl AdminCohortSummary {
    fn empty(cohort: AdminCohort) -> Self {
        Self {
            cohort,
            members: 0,
            events: 0,
            sessions: 0,
            session_seconds: 0,
            active_days_total: 0,
            active_days_long: 0,
            active_days_short: 0,
            actions: ActionCounts::default(),
            last_seen: None,
        }
    }

    fn absorb(&mut self, summary: &EngagementSummary) {
        self.members += 1;
        self.events += summary.events;
        self.sessions += summary.sessions;
        self.session_seconds += summary.session_seconds;
        self.active_days_total += summary.streaks.active_days_total;
        self.active_days_long += summary.streaks.active_days_long;
        self.active_days_short += summary.streaks.active_days_short;
        self.actions.merge(&summary.actions);
        self.last_seen = self.last_seen.max(summary.last_seen);
    }
}

/// Fold admin summaries into the fixed cohorts.
///
/// Every cohort is reported, in order, even when it has no members.
/// Non-admin summaries are ignored.
pub fn admin_cohorts(summaries: &[EngagementSummary]) -> Vec<AdminCohortSummary> {
    let mut cohorts: Vec<AdminCohortSummary> = AdminCohort::ALL
        .iter()
        .map(|c| AdminCohortSummary::empty(*c))
        .collect();

    for summary in summaries {
        let Some(cohort) = summary.identity.admin_cohort() else {
            continue;
        };
        if let Some(row) = cohorts.iter_mut().find(|r| r.cohort == cohort) {
            row.absorb(summary);
        }
    }
    cohorts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::rollup::actions_by_identity;
    use crate::analytics::session::sessionize;
    use crate::config::StreakAnchor;
    use crate::identity::EmailRules;
    use crate::ingest::Post;
    use crate::types::{Event, EventSource};
    use chrono::{Duration, NaiveDate};

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn id(email: &str) -> Identity {
        EmailRules::builtin().identity(email).unwrap()
    }

    fn view(email: &str, at: &str) -> Event {
        Event {
            identity: id(email),
            at: ts(at),
            resource_path: "/home".to_string(),
            source: EventSource::PageView,
            user_agent: None,
        }
    }

    fn params() -> StreakParams {
        StreakParams {
            today: NaiveDate::from_ymd_opt(2025, 1, 5).unwrap(),
            anchor: StreakAnchor::Today,
            short_window_days: 7,
            long_window_days: 30,
        }
    }

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn non_admin(identity: &Identity) -> bool {
        !identity.is_admin()
    }

    #[test]
    fn test_admin_excluded_and_reported_in_cohort() {
        let mut data = Normalized::default();
        data.events = vec![
            view("u1@keio.jp", "2025-01-05T10:00:00Z"),
            view("master05@ac.jp", "2025-01-05T10:00:00Z"),
            view("master05@ac.jp", "2025-01-05T10:10:00Z"),
        ];
        let sessions = sessionize(&data.events, Duration::minutes(30));

        let user_actions = actions_by_identity(&data, non_admin);
        let users = summarize_identities(&data, &sessions, &user_actions, &params(), utc(), non_admin);
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].identity, id("u1@keio.jp"));

        let all_actions = actions_by_identity(&data, |_| true);
        let admins = summarize_identities(
            &data,
            &sessions,
            &all_actions,
            &params(),
            utc(),
            Identity::is_admin,
        );
        let cohorts = admin_cohorts(&admins);
        assert_eq!(cohorts.len(), 3);
        assert_eq!(cohorts[0].cohort.label(), "1-10");
        assert_eq!(cohorts[0].members, 1);
        assert_eq!(cohorts[0].events, 2);
        assert_eq!(cohorts[0].sessions, 1);
        assert_eq!(cohorts[0].session_seconds, 600);
        assert_eq!(cohorts[0].active_days_total, 1);
        assert_eq!(cohorts[1].members, 0);
        assert_eq!(cohorts[2].members, 0);
    }

    #[test]
    fn test_summary_fields() {
        let mut data = Normalized::default();
        data.events = vec![
            view("u1@keio.jp", "2025-01-01T10:00:00Z"),
            view("u1@keio.jp", "2025-01-02T10:00:00Z"),
            view("u1@keio.jp", "2025-01-03T10:00:00Z"),
            view("u1@keio.jp", "2025-01-05T10:00:00Z"),
            view("u1@keio.jp", "2025-01-05T10:20:00Z"),
        ];
        let sessions = sessionize(&data.events, Duration::minutes(30));
        let rows = summarize_identities(
            &data,
            &sessions,
            &BTreeMap::new(),
            &params(),
            utc(),
            non_admin,
        );

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.streaks.active_days_total, 4);
        assert_eq!(row.streaks.longest_streak_days, 3);
        assert_eq!(row.streaks.current_streak_days, 1);
        assert_eq!(row.sessions, 4);
        assert_eq!(row.session_seconds, 1200);
        assert_eq!(row.events, 5);
        assert_eq!(row.first_seen, Some(ts("2025-01-01T10:00:00Z")));
        assert_eq!(row.last_seen, Some(ts("2025-01-05T10:20:00Z")));
        assert!(row.profile.is_none());
    }

    #[test]
    fn test_action_only_identity_gets_row() {
        let mut data = Normalized::default();
        data.posts = vec![Post {
            id: 1,
            board_id: "3".to_string(),
            author: id("u2@keio.jp"),
            at: ts("2025-01-01T00:00:00Z"),
            content_len: 3,
        }];
        let actions = actions_by_identity(&data, non_admin);
        let rows = summarize_identities(&data, &[], &actions, &params(), utc(), non_admin);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].actions.posts, 1);
        assert_eq!(rows[0].streaks.active_days_total, 0);
    }

    #[test]
    fn test_empty_input_gives_no_rows() {
        let data = Normalized::default();
        let rows = summarize_identities(
            &data,
            &[],
            &BTreeMap::new(),
            &params(),
            utc(),
            non_admin,
        );
        assert!(rows.is_empty());
        assert!(admin_cohorts(&rows).iter().all(|c| c.members == 0));
    }
}
