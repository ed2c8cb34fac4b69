//! Integration tests for the urivstat aggregation pipeline
//!
//! These tests run the full snapshot → summary flow over the CSV fixtures in
//! `tests/fixtures/snapshot/` (timestamps are naive, read as +09:00).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use urivstat_core::config::StreakAnchor;
use urivstat_core::pipeline::{self, aggregate_snapshot, MANIFEST};
use urivstat_core::summary::{
    ADMIN_COHORTS, BOARDS_SUMMARY, MARKET_SUMMARY, SESSIONS, USERS_SUMMARY,
    USER_BOARD_ENGAGEMENT,
};
use urivstat_core::{Config, Error};

/// Get the path to the fixture snapshot
fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/snapshot")
}

/// Read an output table into header → value maps
fn read_table(path: &Path) -> Vec<HashMap<String, String>> {
    let mut reader = csv::Reader::from_path(path).unwrap();
    let headers = reader.headers().unwrap().clone();
    reader
        .records()
        .map(|record| {
            let record = record.unwrap();
            headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| (h.to_string(), v.to_string()))
                .collect()
        })
        .collect()
}

fn row<'a>(
    rows: &'a [HashMap<String, String>],
    key: &str,
    value: &str,
) -> &'a HashMap<String, String> {
    rows.iter()
        .find(|r| r.get(key).map(String::as_str) == Some(value))
        .unwrap_or_else(|| panic!("no row with {key} = {value}"))
}

fn run(config: &Config, as_of: &str) -> (TempDir, pipeline::RunManifest) {
    let out = TempDir::new().unwrap();
    let offset = config.analytics.reference_offset().unwrap();
    let as_of = pipeline::resolve_as_of(Some(as_of), offset).unwrap();
    let manifest = aggregate_snapshot(&fixture_dir(), out.path(), config, as_of)
        .expect("aggregation should succeed");
    (out, manifest)
}

// ============================================
// Full pipeline
// ============================================

#[test]
fn test_users_summary() {
    let (out, manifest) = run(&Config::default(), "2025-01-05");
    let users = read_table(&out.path().join(USERS_SUMMARY));

    // alice's accounts fold into one identity; admin and unresolved users are absent
    assert_eq!(users.len(), 2);
    assert_eq!(manifest.rows(USERS_SUMMARY), Some(2));

    let alice = row(&users, "identity", "aliceb@gmail.com");
    assert_eq!(alice["user_ids"], "1;4");
    assert_eq!(alice["university"], "Keio");
    assert_eq!(alice["active_days_total"], "4");
    assert_eq!(alice["active_days_7d"], "4");
    assert_eq!(alice["longest_streak_days"], "3");
    assert_eq!(alice["longest_streak_start"], "2025-01-01");
    assert_eq!(alice["current_streak_days"], "1");
    assert_eq!(alice["events"], "11");
    assert_eq!(alice["sessions"], "5");
    assert_eq!(alice["session_seconds"], "1500");
    assert_eq!(alice["first_seen"], "2025-01-01T10:00:00+09:00");
    assert_eq!(alice["last_seen"], "2025-01-05T10:20:00+09:00");
    assert_eq!(alice["posts"], "1");
    assert_eq!(alice["replies"], "1");
    assert_eq!(alice["likes_given_posts"], "1");
    assert_eq!(alice["likes_given_replies"], "1");
    assert_eq!(alice["likes_given_items"], "1");
    // the admin's like on alice's post is not counted
    assert_eq!(alice["likes_received_posts"], "1");
    assert_eq!(alice["avg_post_length"], "11.0");

    let bob = row(&users, "identity", "bob@keio.jp");
    assert_eq!(bob["active_days_total"], "3");
    assert_eq!(bob["current_streak_days"], "3");
    assert_eq!(bob["longest_streak_days"], "3");
    assert_eq!(bob["listings"], "2");
    assert_eq!(bob["likes_received_posts"], "1");
    assert_eq!(bob["likes_received_replies"], "1");
    assert_eq!(bob["likes_received_items"], "1");
    assert_eq!(bob["sessions"], "4");
}

#[test]
fn test_boards_and_market() {
    let (out, _) = run(&Config::default(), "2025-01-05");

    let boards = read_table(&out.path().join(BOARDS_SUMMARY));
    let ids: Vec<&str> = boards.iter().map(|b| b["board_id"].as_str()).collect();
    assert_eq!(ids, vec!["1", "2"]);

    let board = row(&boards, "board_id", "1");
    assert_eq!(board["post_count"], "2");
    assert_eq!(board["reply_count"], "2");
    assert_eq!(board["post_likes"], "2");
    assert_eq!(board["reply_likes"], "1");
    assert_eq!(board["unique_visitors"], "2");
    assert_eq!(board["unique_posters"], "2");
    assert_eq!(board["latest_post"], "2025-01-05T10:10:00+09:00");

    // only the admin posted on board 2
    let board = row(&boards, "board_id", "2");
    assert_eq!(board["post_count"], "0");
    assert_eq!(board["unique_visitors"], "1");
    assert_eq!(board["latest_post"], "");

    let market = read_table(&out.path().join(MARKET_SUMMARY));
    assert_eq!(market.len(), 2);
    let bob = row(&market, "identity", "bob@keio.jp");
    assert_eq!(bob["items"], "2");
    assert_eq!(bob["sell_items"], "1");
    assert_eq!(bob["free_items"], "1");
    assert_eq!(bob["likes_received_items"], "1");

    let engagement = read_table(&out.path().join(USER_BOARD_ENGAGEMENT));
    let alice = engagement
        .iter()
        .find(|r| r["identity"] == "aliceb@gmail.com" && r["board_id"] == "1")
        .unwrap();
    assert_eq!(alice["posts"], "1");
    assert_eq!(alice["replies"], "1");
}

#[test]
fn test_sessions_and_admin_cohorts() {
    let (out, _) = run(&Config::default(), "2025-01-05");

    let sessions = read_table(&out.path().join(SESSIONS));
    assert_eq!(sessions.len(), 9);
    assert!(sessions.iter().all(|s| s["identity"] != "master05@ac.jp"));
    let longest = sessions
        .iter()
        .find(|s| s["identity"] == "aliceb@gmail.com" && s["duration_seconds"] == "1200")
        .unwrap();
    assert_eq!(longest["event_count"], "6");
    assert_eq!(longest["started_at"], "2025-01-05T10:00:00+09:00");

    let cohorts = read_table(&out.path().join(ADMIN_COHORTS));
    let labels: Vec<&str> = cohorts.iter().map(|c| c["cohort"].as_str()).collect();
    assert_eq!(labels, vec!["1-10", "11-20", "21-30"]);
    assert_eq!(cohorts[0]["members"], "1");
    assert_eq!(cohorts[0]["events"], "3");
    assert_eq!(cohorts[0]["posts"], "1");
    assert_eq!(cohorts[0]["likes_given"], "1");
    assert_eq!(cohorts[1]["members"], "0");
}

#[test]
fn test_normalize_report_in_manifest() {
    let (out, manifest) = run(&Config::default(), "2025-01-05");

    let page_views = &manifest.normalize.tables["page_views"];
    assert_eq!(page_views.rows_read, 10);
    assert_eq!(page_views.bad_timestamp, 1);
    assert_eq!(page_views.unresolved_identity, 1);
    assert_eq!(page_views.after_as_of, 1);
    assert_eq!(page_views.kept, 7);
    assert_eq!(manifest.normalize.tables["users"].unresolved_identity, 1);

    let text = fs::read_to_string(out.path().join(MANIFEST)).unwrap();
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json["today"], "2025-01-05");
    assert_eq!(json["analytics"]["session_gap_minutes"], 30);
    assert_eq!(json["outputs"].as_array().unwrap().len(), 6);
}

#[test]
fn test_overrides_change_results() {
    let mut config = Config::default();
    config.analytics.include_admins = true;
    config.analytics.current_streak = StreakAnchor::LastActive;
    config.analytics.session_gap_minutes = 5;

    // one day later: "today" is inactive for everyone
    let (out, _) = run(&config, "2025-01-06");
    let users = read_table(&out.path().join(USERS_SUMMARY));
    assert_eq!(users.len(), 3);

    let alice = row(&users, "identity", "aliceb@gmail.com");
    assert_eq!(alice["current_streak_days"], "1");
    // the 10:00..10:20 cluster splits at the 10-minute gap
    assert_eq!(alice["sessions"], "6");

    let mut config = Config::default();
    config.analytics.current_streak = StreakAnchor::Today;
    let (out, _) = run(&config, "2025-01-06");
    let users = read_table(&out.path().join(USERS_SUMMARY));
    let bob = row(&users, "identity", "bob@keio.jp");
    assert_eq!(bob["current_streak_days"], "0");
    assert_eq!(bob["longest_streak_days"], "3");
}

// ============================================
// Structural failures
// ============================================

fn copy_fixture(to: &Path) {
    fs::create_dir_all(to).unwrap();
    for entry in fs::read_dir(fixture_dir()).unwrap() {
        let entry = entry.unwrap();
        fs::copy(entry.path(), to.join(entry.file_name())).unwrap();
    }
}

#[test]
fn test_missing_required_column_is_fatal() {
    let tmp = TempDir::new().unwrap();
    let snapshot = tmp.path().join("snapshot");
    copy_fixture(&snapshot);
    fs::write(
        snapshot.join("board_posts.csv"),
        "id,board_id,created_at,content\n1,1,2025-01-05 10:10:00,Hello\n",
    )
    .unwrap();

    let result = aggregate_snapshot(
        &snapshot,
        &tmp.path().join("out"),
        &Config::default(),
        chrono::Utc::now(),
    );
    match result {
        Err(Error::MissingColumn { table, column }) => {
            assert_eq!(table, "board_posts");
            assert_eq!(column, "author_id");
        }
        other => panic!("expected missing column error, got {:?}", other.map(|m| m.run_id)),
    }
    assert!(!tmp.path().join("out").join(USERS_SUMMARY).exists());
}

#[test]
fn test_missing_tables_are_empty() {
    let tmp = TempDir::new().unwrap();
    let snapshot = tmp.path().join("snapshot");
    fs::create_dir_all(&snapshot).unwrap();
    fs::copy(fixture_dir().join("users.csv"), snapshot.join("users.csv")).unwrap();

    let out = tmp.path().join("out");
    let manifest =
        aggregate_snapshot(&snapshot, &out, &Config::default(), chrono::Utc::now()).unwrap();
    assert_eq!(manifest.rows(USERS_SUMMARY), Some(0));
    assert_eq!(manifest.rows(BOARDS_SUMMARY), Some(0));
    assert_eq!(manifest.rows(ADMIN_COHORTS), Some(3));
}
