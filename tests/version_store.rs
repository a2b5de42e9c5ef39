use chrono::{DateTime, Utc};
use tempfile::{tempdir, TempDir};

use corpus_loader::config::TrackerConfig;
use corpus_loader::version_store::{
    parse_version_timestamp, SqliteVersionStore, StoreError, VersionStore,
};

fn instant(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>().expect("test timestamp parses")
}

async fn store_in(dir: &TempDir) -> SqliteVersionStore {
    let config = TrackerConfig {
        db_path: dir.path().join("tracker.db"),
        table_name: "file_tracker".to_string(),
    };
    SqliteVersionStore::connect(&config)
        .await
        .expect("version store should connect")
}

#[test]
fn test_parse_version_timestamp_accepts_common_forms() {
    let zulu = parse_version_timestamp("2024-05-01T10:00:00Z").expect("Z suffix parses");
    let offset =
        parse_version_timestamp("2024-05-01T12:00:00+02:00").expect("explicit offset parses");
    assert_eq!(zulu, offset, "Same instant regardless of offset notation");

    let naive = parse_version_timestamp("2024-05-01T10:00:00").expect("naive datetime parses");
    assert_eq!(naive, zulu, "Naive datetimes are taken as UTC");

    let err = parse_version_timestamp("last tuesday").expect_err("junk must not parse");
    assert!(
        matches!(err, StoreError::InvalidTimestamp { .. }),
        "Expected InvalidTimestamp, got: {err:?}"
    );
}

#[tokio::test]
async fn test_unknown_name_has_no_marker_and_counts_as_new() {
    let dir = tempdir().expect("tempdir");
    let store = store_in(&dir).await;

    let marker = store
        .get_last_version("Never Seen")
        .await
        .expect("lookup should succeed");
    assert!(marker.is_none(), "Unknown names have no marker");

    let fresh = store
        .is_new_version_available("Never Seen", "2024-05-01T10:00:00Z")
        .await
        .expect("freshness check should succeed");
    assert!(fresh, "A missing marker means the candidate is new");
}

#[tokio::test]
async fn test_freshness_is_strictly_greater_than_marker() {
    let dir = tempdir().expect("tempdir");
    let store = store_in(&dir).await;

    store
        .set_last_version("Tracker Doc", instant("2024-05-01T10:00:00Z"))
        .await
        .expect("marker write should succeed");

    let equal = store
        .is_new_version_available("Tracker Doc", "2024-05-01T10:00:00Z")
        .await
        .expect("equal candidate check");
    assert!(!equal, "Equal timestamps are not new");

    let same_instant_other_offset = store
        .is_new_version_available("Tracker Doc", "2024-05-01T12:00:00+02:00")
        .await
        .expect("offset candidate check");
    assert!(
        !same_instant_other_offset,
        "Offset notation must not fake freshness"
    );

    let older = store
        .is_new_version_available("Tracker Doc", "2024-04-30T23:59:59Z")
        .await
        .expect("older candidate check");
    assert!(!older, "Older timestamps are not new");

    let newer = store
        .is_new_version_available("Tracker Doc", "2024-05-01T10:00:01Z")
        .await
        .expect("newer candidate check");
    assert!(newer, "Strictly greater timestamps are new");
}

#[tokio::test]
async fn test_marker_overwrite_keeps_latest_value() {
    let dir = tempdir().expect("tempdir");
    let store = store_in(&dir).await;

    store
        .set_last_version("Tracker Doc", instant("2024-05-01T10:00:00Z"))
        .await
        .expect("first marker write");
    store
        .set_last_version("Tracker Doc", instant("2024-06-01T10:00:00Z"))
        .await
        .expect("second marker write");

    let marker = store
        .get_last_version("Tracker Doc")
        .await
        .expect("lookup should succeed");
    assert_eq!(
        marker,
        Some(instant("2024-06-01T10:00:00Z")),
        "The later write wins"
    );
}

#[tokio::test]
async fn test_unparsable_candidate_is_an_error_not_a_skip() {
    let dir = tempdir().expect("tempdir");
    let store = store_in(&dir).await;

    store
        .set_last_version("Tracker Doc", instant("2024-05-01T10:00:00Z"))
        .await
        .expect("marker write");

    let err = store
        .is_new_version_available("Tracker Doc", "not-a-timestamp")
        .await
        .expect_err("unparsable candidate must surface as an error");
    assert!(
        matches!(err, StoreError::InvalidTimestamp { .. }),
        "Expected InvalidTimestamp, got: {err:?}"
    );
}

#[tokio::test]
async fn test_corrupt_stored_marker_surfaces_as_unavailable() {
    let dir = tempdir().expect("tempdir");
    let db_path = dir.path().join("tracker.db");
    let config = TrackerConfig {
        db_path: db_path.clone(),
        table_name: "file_tracker".to_string(),
    };
    let store = SqliteVersionStore::connect(&config)
        .await
        .expect("version store should connect");

    // Plant a marker the store itself would never write.
    let raw = libsql::Builder::new_local(&db_path)
        .build()
        .await
        .expect("open raw db");
    let conn = raw.connect().expect("raw connection");
    conn.execute(
        "INSERT INTO file_tracker (filename, tracker) VALUES (?1, ?2)",
        libsql::params!["Broken Doc", "definitely-not-a-timestamp"],
    )
    .await
    .expect("insert corrupt marker");

    let err = store
        .get_last_version("Broken Doc")
        .await
        .expect_err("corrupt marker must not be readable");
    assert!(
        matches!(err, StoreError::Unavailable { .. }),
        "Expected Unavailable, got: {err:?}"
    );
}
