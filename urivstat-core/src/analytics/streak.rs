//! Active days and streaks
//!
//! Activity is measured on the set of distinct calendar dates (in the
//! reference timezone) with at least one event; 50 events on one date count
//! once.

use crate::config::StreakAnchor;
use chrono::{DateTime, Days, Duration, FixedOffset, NaiveDate, Utc};
use std::collections::BTreeSet;

/// Calendar date of an instant in the reference timezone.
pub fn local_date(at: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    at.with_timezone(&offset).date_naive()
}

/// Distinct active dates of one identity (or cohort).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityCalendar {
    dates: BTreeSet<NaiveDate>,
}

impl ActivityCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calendar from event instants.
    pub fn from_instants(
        instants: impl IntoIterator<Item = DateTime<Utc>>,
        offset: FixedOffset,
    ) -> Self {
        Self {
            dates: instants
                .into_iter()
                .map(|at| local_date(at, offset))
                .collect(),
        }
    }

    pub fn insert(&mut self, date: NaiveDate) {
        self.dates.insert(date);
    }

    /// Number of distinct active dates.
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Active dates in `[today - (days - 1), today]`.
    pub fn active_in_window(&self, today: NaiveDate, days: u32) -> usize {
        if days == 0 {
            return 0;
        }
        let start = today
            .checked_sub_days(Days::new(u64::from(days - 1)))
            .unwrap_or(NaiveDate::MIN);
        self.dates.range(start..=today).count()
    }

    /// Longest run of consecutive dates as `(length, first, last)`.
    pub fn longest_streak(&self) -> (u32, Option<NaiveDate>, Option<NaiveDate>) {
        let mut longest = 0u32;
        let mut longest_start = None;
        let mut longest_end = None;
        let mut run = 0u32;
        let mut run_start: Option<NaiveDate> = None;
        let mut prev: Option<NaiveDate> = None;

        for &date in &self.dates {
            match prev {
                Some(p) if (date - p).num_days() == 1 => run += 1,
                _ => {
                    run = 1;
                    run_start = Some(date);
                }
            }
            if run > longest {
                longest = run;
                longest_start = run_start;
                longest_end = Some(date);
            }
            prev = Some(date);
        }

        (longest, longest_start, longest_end)
    }

    /// Consecutive active dates counted backward from the anchor.
    ///
    /// With [`StreakAnchor::Today`] the run must include `today`, otherwise it
    /// is zero. With [`StreakAnchor::LastActive`] the run ends at the most
    /// recent active date not after `today`. Dates after `today` are ignored.
    pub fn current_streak(&self, today: NaiveDate, anchor: StreakAnchor) -> u32 {
        let mut past = self.dates.range(..=today).rev();
        let Some(&latest) = past.next() else {
            return 0;
        };
        if anchor == StreakAnchor::Today && latest != today {
            return 0;
        }

        let mut streak = 1u32;
        let mut expected = latest;
        for &date in past {
            expected = expected - Duration::days(1);
            if date != expected {
                break;
            }
            streak += 1;
        }
        streak
    }

    pub fn first(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }
}

/// Active-day and streak figures for one identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreakStats {
    /// Distinct active dates overall
    pub active_days_total: u32,
    /// Distinct active dates in the long trailing window (30 days by default)
    pub active_days_long: u32,
    /// Distinct active dates in the short trailing window (7 days by default)
    pub active_days_short: u32,
    /// Current run of consecutive active days
    pub current_streak_days: u32,
    /// Longest run of consecutive active days
    pub longest_streak_days: u32,
    /// First date of the longest run
    pub longest_streak_start: Option<NaiveDate>,
    /// Last date of the longest run
    pub longest_streak_end: Option<NaiveDate>,
}

/// Inputs shared by every streak computation of one run.
#[derive(Debug, Clone, Copy)]
pub struct StreakParams {
    pub today: NaiveDate,
    pub anchor: StreakAnchor,
    pub short_window_days: u32,
    pub long_window_days: u32,
}

impl StreakStats {
    pub fn compute(calendar: &ActivityCalendar, params: &StreakParams) -> Self {
        let (longest, start, end) = calendar.longest_streak();
        Self {
            active_days_total: calendar.len() as u32,
            active_days_long: calendar.active_in_window(params.today, params.long_window_days)
                as u32,
            active_days_short: calendar.active_in_window(params.today, params.short_window_days)
                as u32,
            current_streak_days: calendar.current_streak(params.today, params.anchor),
            longest_streak_days: longest,
            longest_streak_start: start,
            longest_streak_end: end,
        }
    }
}
