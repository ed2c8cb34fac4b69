//! Session segmentation
//!
//! A session is a maximal run of one identity's events where consecutive
//! events are at most `gap` apart. Splitting is a single pass over the
//! instants once they are sorted.
//!
//! ## Example
//!
//! With a 30 minute gap, events at 10:00, 10:20 and 11:00 give two sessions:
//! `[10:00, 10:20]` (2 events) and `[11:00]` (1 event, zero duration).

use crate::identity::Identity;
use crate::types::{CategoryCounts, Event, Session};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::ops::Range;

/// Split sorted instants into runs whose internal gaps are all `<= gap`.
///
/// Returns contiguous index ranges covering `0..instants.len()` exactly once.
/// A new run starts wherever the distance to the previous instant exceeds `gap`.
pub fn split_by_gap(instants: &[DateTime<Utc>], gap: Duration) -> Vec<Range<usize>> {
    let mut runs = Vec::new();
    if instants.is_empty() {
        return runs;
    }

    let mut start = 0;
    for i in 1..instants.len() {
        if instants[i] - instants[i - 1] > gap {
            runs.push(start..i);
            start = i;
        }
    }
    runs.push(start..instants.len());
    runs
}

/// Sessions of a single identity.
///
/// `events` may be in any order; they are sorted by instant (stable on ties).
/// Events belonging to other identities are ignored.
pub fn segment_identity(identity: &Identity, events: &[&Event], gap: Duration) -> Vec<Session> {
    let mut ordered: Vec<&Event> = events
        .iter()
        .copied()
        .filter(|e| &e.identity == identity)
        .collect();
    ordered.sort_by_key(|e| e.at);

    let instants: Vec<DateTime<Utc>> = ordered.iter().map(|e| e.at).collect();
    split_by_gap(&instants, gap)
        .into_iter()
        .enumerate()
        .map(|(index, range)| build_session(identity, index, &ordered[range]))
        .collect()
}

fn build_session(identity: &Identity, index: usize, members: &[&Event]) -> Session {
    let mut categories = CategoryCounts::default();
    let mut resources = HashSet::new();
    for event in members {
        categories.record(&event.resource_path);
        resources.insert(event.resource_path.as_str());
    }

    Session {
        identity: identity.clone(),
        index,
        started_at: members[0].at,
        ended_at: members[members.len() - 1].at,
        event_count: members.len(),
        distinct_resources: resources.len(),
        categories,
    }
}

/// Sessions for every identity in an event stream.
///
/// Output is ordered by identity, then chronologically.
pub fn sessionize(events: &[Event], gap: Duration) -> Vec<Session> {
    let mut by_identity: std::collections::BTreeMap<&Identity, Vec<&Event>> =
        std::collections::BTreeMap::new();
    for event in events {
        by_identity.entry(&event.identity).or_default().push(event);
    }

    let sessions: Vec<Session> = by_identity
        .into_iter()
        .flat_map(|(identity, events)| segment_identity(identity, &events, gap))
        .collect();

    tracing::debug!(
        events = events.len(),
        sessions = sessions.len(),
        gap_minutes = gap.num_minutes(),
        "Segmented sessions"
    );
    sessions
}
