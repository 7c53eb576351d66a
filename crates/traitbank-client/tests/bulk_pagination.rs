//! Bulk pager behavior: window ordering, streaming writes, bounded retry.

use std::time::Duration;

use traitbank_client::bulk::read_csv_records;
use traitbank_client::mock::{FlakyConnector, ScriptedConnector};
use traitbank_client::{BulkPager, CellValue, ResultSet};

fn window(rows: &[(i64, &str)]) -> ResultSet {
    ResultSet::new(
        &["page", "trait"],
        rows.iter()
            .map(|(page, pk)| vec![CellValue::int(*page), CellValue::string(*pk)])
            .collect(),
    )
}

#[test]
fn windows_run_in_order_and_stop_on_short_page() {
    let conn = ScriptedConnector::new()
        .on("SKIP 0 LIMIT 2", window(&[(1, "a"), (2, "a")]))
        .on("SKIP 2 LIMIT 2", window(&[(3, "b"), (4, "b")]))
        .on("SKIP 4 LIMIT 2", window(&[(5, "c")]));

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("assert.csv");
    let path = BulkPager::new(&conn)
        .page_size(2)
        .run("MATCH (d:Page) RETURN d.page_id AS page, t.resource_pk AS trait", &out)
        .unwrap();

    let queries = conn.queries();
    assert_eq!(queries.len(), 3);
    assert!(queries[0].ends_with("SKIP 0 LIMIT 2"));
    assert!(queries[1].ends_with("SKIP 2 LIMIT 2"));
    assert!(queries[2].ends_with("SKIP 4 LIMIT 2"));

    let records = read_csv_records(&path).unwrap();
    assert_eq!(records[0], vec!["page", "trait"]);
    assert_eq!(records.len(), 6);
    assert_eq!(records[5], vec!["5", "c"]);
}

#[test]
fn exact_multiple_issues_one_trailing_empty_window() {
    let conn = ScriptedConnector::new()
        .on("SKIP 0 LIMIT 2", window(&[(1, "a"), (2, "a")]));
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("assert.csv");
    BulkPager::new(&conn).page_size(2).run("MATCH (d) RETURN d.page_id AS page", &out).unwrap();
    // Second window returns empty (unscripted) and terminates the run.
    assert_eq!(conn.queries().len(), 2);
    assert_eq!(read_csv_records(&out).unwrap().len(), 3);
}

#[test]
fn transient_failures_retry_up_to_the_attempt_bound() {
    let inner = ScriptedConnector::new().on("SKIP 0 LIMIT 10", window(&[(1, "a")]));
    let conn = FlakyConnector::failing_first(inner, 2);
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.csv");
    let result = BulkPager::new(&conn)
        .page_size(10)
        .attempts(3, Duration::from_millis(1))
        .run("MATCH (d) RETURN d.page_id AS page", &out);
    assert!(result.is_ok());

    let conn = FlakyConnector::failing_first(ScriptedConnector::new(), 5);
    let result = BulkPager::new(&conn)
        .attempts(2, Duration::from_millis(1))
        .run("MATCH (d) RETURN d.page_id AS page", &dir.path().join("fail.csv"));
    assert!(result.is_err());
}

#[test]
fn pre_capped_queries_are_rejected() {
    let conn = ScriptedConnector::new();
    let dir = tempfile::tempdir().unwrap();
    let err = BulkPager::new(&conn)
        .run("MATCH (d) RETURN d LIMIT 10", &dir.path().join("x.csv"))
        .unwrap_err();
    assert!(matches!(err, traitbank_client::ClientError::CappedQuery(_)));
}

#[test]
fn a_fresh_run_truncates_the_previous_file() {
    let conn = ScriptedConnector::new().on("SKIP 0 LIMIT 2", window(&[(9, "z")]));
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("assert.csv");
    std::fs::write(&out, "stale,content\n1,2\n3,4\n5,6\n").unwrap();
    BulkPager::new(&conn).page_size(2).run("MATCH (d) RETURN d.page_id AS page", &out).unwrap();
    let records = read_csv_records(&out).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1], vec!["9", "z"]);
}
