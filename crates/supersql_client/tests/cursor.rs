mod common;

use std::time::Duration;

use common::memory_connection;
use supersql_client::memory::{MemoryEngine, Script};
use supersql_client::{ErrorKind, LogicalType, Params, SessionState, Value};
use supersql_protocol::{ColumnMeta, RawRow, TYPE_ARRAY};

fn three_batches() -> Script {
    Script::new()
        .column("id", LogicalType::Long)
        .column("name", LogicalType::Varchar)
        .batch(vec![
            vec![Value::Long(1), Value::Varchar("a".into())],
            vec![Value::Long(2), Value::Varchar("b".into())],
        ])
        .batch(vec![
            vec![Value::Long(3), Value::Null],
            vec![Value::Long(4), Value::Varchar("d".into())],
        ])
        .batch(vec![
            vec![Value::Long(5), Value::Varchar("e".into())],
            vec![Value::Long(6), Value::Varchar("f".into())],
        ])
}

#[tokio::test]
async fn test_fetchall_across_batches() {
    let engine = MemoryEngine::new();
    engine.script("SELECT id, name FROM users", three_batches());
    let conn = memory_connection(&engine);
    let mut cur = conn.cursor().unwrap();

    cur.execute("SELECT id, name FROM users", None).await.unwrap();
    let rows = cur.fetchall().await.unwrap();
    let ids: Vec<i64> = rows
        .iter()
        .filter_map(|r| r.get(0).and_then(Value::as_i64))
        .collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(rows[2].get_by_name("name"), Some(&Value::Null));
    assert_eq!(cur.rowcount(), 6);

    assert!(cur.fetchall().await.unwrap().is_empty());
    assert_eq!(cur.session().state(), SessionState::Finished);
}

#[tokio::test]
async fn test_fetchmany_batches() {
    let engine = MemoryEngine::new();
    engine.script("SELECT id, name FROM users", three_batches());
    let conn = memory_connection(&engine);
    let mut cur = conn.cursor().unwrap();
    cur.execute("SELECT id, name FROM users", None).await.unwrap();

    assert_eq!(cur.fetchmany(None).await.unwrap().len(), 1);
    assert_eq!(cur.fetchmany(Some(4)).await.unwrap().len(), 4);
    assert_eq!(cur.fetchmany(Some(4)).await.unwrap().len(), 1);
    assert!(cur.fetchmany(Some(4)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_close_twice_releases_once() {
    let engine = MemoryEngine::new();
    engine.script("SELECT id, name FROM users", three_batches());
    let conn = memory_connection(&engine);
    let mut cur = conn.cursor().unwrap();
    cur.execute("SELECT id, name FROM users", None).await.unwrap();
    cur.fetchone().await.unwrap();

    cur.close().await;
    cur.close().await;
    let stats = engine.stats();
    assert_eq!(stats.opened, 1);
    assert_eq!(stats.released, 1);
    assert_eq!(stats.cancelled.len(), 1);
}

#[tokio::test]
async fn test_close_after_error_is_safe() {
    let engine = MemoryEngine::new();
    let conn = memory_connection(&engine);
    let mut cur = conn.cursor().unwrap();
    let err = cur.execute("SELECT nothing", None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EngineFailure);
    cur.close().await;
    cur.close().await;
    assert_eq!(engine.stats().released, 1);
}

#[tokio::test]
async fn test_connection_close_invalidates_running_cursor() {
    let engine = MemoryEngine::new();
    engine.script("SELECT id, name FROM users", three_batches());
    let conn = memory_connection(&engine);

    let mut drained = conn.cursor().unwrap();
    drained.execute("SELECT id, name FROM users", None).await.unwrap();
    assert_eq!(drained.fetchall().await.unwrap().len(), 6);

    let mut running = conn.cursor().unwrap();
    running.execute("SELECT id, name FROM users", None).await.unwrap();
    assert_eq!(running.session().state(), SessionState::Running);

    conn.close();
    assert_eq!(
        running.fetchone().await.unwrap_err().kind(),
        ErrorKind::InvalidState
    );
    assert!(drained.fetchone().await.unwrap().is_none());
    assert!(drained.description().await.unwrap().is_some());

    running.close().await;
    assert_eq!(engine.stats().released, 2);
}

#[tokio::test]
async fn test_unknown_column_type_fails_decode() {
    let engine = MemoryEngine::new();
    engine.script(
        "SELECT id, tags FROM posts",
        Script::new()
            .column("id", LogicalType::Integer)
            .raw_column(ColumnMeta {
                name: "tags".into(),
                type_id: TYPE_ARRAY,
                type_name: "array(varchar)".into(),
            })
            .raw_batch(vec![RawRow::new(vec![
                Some(7i32.to_le_bytes().to_vec()),
                Some(b"[]".to_vec()),
            ])])
            .raw_batch(vec![RawRow::new(vec![Some(8i32.to_le_bytes().to_vec()), None])]),
    );
    let conn = memory_connection(&engine);
    let mut cur = conn.cursor().unwrap();
    cur.execute("SELECT id, tags FROM posts", None).await.unwrap();

    // metadata is still describable
    let desc = cur.description().await.unwrap().unwrap();
    assert_eq!(desc[1].type_code, "OTHER");

    let err = cur.fetchone().await.unwrap_err();
    let text = err.to_string();
    assert_eq!(err.kind(), ErrorKind::Decode);
    assert!(text.contains("column 1"), "{}", text);
    assert!(text.contains("'tags'"), "{}", text);
    assert_eq!(cur.session().state(), SessionState::Error);
    assert_eq!(cur.fetchone().await.unwrap_err().kind(), ErrorKind::Decode);
    // the rest of the running statement is abandoned
    assert_eq!(engine.stats().cancelled.len(), 1);
    cur.close().await;
    assert_eq!(engine.stats().opened, engine.stats().released);
}

#[tokio::test]
async fn test_bad_cell_in_final_page_is_not_skipped() {
    let engine = MemoryEngine::new();
    engine.script(
        "SELECT flag FROM t",
        Script::new()
            .column("flag", LogicalType::Boolean)
            .raw_batch(vec![
                RawRow::new(vec![Some(vec![0x07])]),
                RawRow::new(vec![Some(vec![0x01])]),
            ]),
    );
    let conn = memory_connection(&engine);
    let mut cur = conn.cursor().unwrap();
    cur.execute("SELECT flag FROM t", None).await.unwrap();
    cur.description().await.unwrap().unwrap();
    assert_eq!(cur.session().state(), SessionState::Finished);

    let err = cur.fetchone().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Decode);
    assert_eq!(cur.session().state(), SessionState::Error);

    // the row after the undecodable one is never handed out
    assert_eq!(cur.fetchone().await.unwrap_err().kind(), ErrorKind::Decode);
    assert_eq!(cur.fetchall().await.unwrap_err().kind(), ErrorKind::Decode);
    assert_eq!(cur.session().buffered_rows(), 0);
    assert!(engine.stats().cancelled.is_empty());
    cur.close().await;
}

#[tokio::test]
async fn test_description_timeout_leaves_running() {
    let engine = MemoryEngine::new();
    engine.script(
        "SELECT id, name FROM users",
        three_batches().stall_after(1),
    );
    let conn = memory_connection(&engine);
    let mut cur = conn.cursor().unwrap();
    cur.execute("SELECT id, name FROM users", None).await.unwrap();
    cur.set_describe_timeout(Duration::from_millis(30));

    let err = cur.description().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(cur.session().state(), SessionState::Running);

    // an abandoned wait does not disturb the session either
    let abandoned = tokio::time::timeout(Duration::from_millis(20), cur.fetchone()).await;
    assert!(abandoned.is_err());
    assert_eq!(cur.session().state(), SessionState::Running);
    cur.close().await;
    assert_eq!(engine.stats().cancelled.len(), 1);
}

#[tokio::test]
async fn test_named_parameters() {
    let engine = MemoryEngine::new();
    engine.script(
        "SELECT * FROM users WHERE id IN (1, 2) AND active = TRUE AND name LIKE 'a%'",
        Script::new().column("id", LogicalType::Long),
    );
    let conn = memory_connection(&engine);
    let mut cur = conn.cursor().unwrap();
    let params = Params::named([
        ("ids", supersql_client::SqlParam::from(vec![1i64, 2])),
        ("active", true.into()),
        ("pattern", "a%".into()),
    ]);
    cur.execute(
        "SELECT * FROM users WHERE id IN %(ids)s AND active = %(active)s AND name LIKE %(pattern)s",
        Some(&params),
    )
    .await
    .unwrap();
    assert!(cur.fetchall().await.unwrap().is_empty());
}
