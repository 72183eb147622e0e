mod common;

use common::{describe_script, memory_connection, names_script};
use supersql_client::memory::{MemoryEngine, Script};
use supersql_client::{ErrorKind, LogicalType};

#[tokio::test]
async fn test_list_schemas_and_tables() {
    let engine = MemoryEngine::new();
    engine.script("SHOW SCHEMAS", names_script("Schema", &["default", "web"]));
    engine.script("SHOW TABLES", names_script("Table", &["users"]));
    engine.script(
        "SHOW TABLES FROM \"web\"",
        names_script("Table", &["page_views", "sessions"]),
    );
    let inspector = memory_connection(&engine).introspector();

    assert_eq!(inspector.list_schemas().await.unwrap(), vec!["default", "web"]);
    assert_eq!(inspector.list_tables(None).await.unwrap(), vec!["users"]);
    assert_eq!(
        inspector.list_tables(Some("web")).await.unwrap(),
        vec!["page_views", "sessions"]
    );
    let stats = engine.stats();
    assert_eq!(stats.opened, 3);
    assert_eq!(stats.released, 3);
}

#[tokio::test]
async fn test_describe_columns() {
    let engine = MemoryEngine::new();
    engine.script(
        "DESCRIBE \"web\".\"users\"",
        describe_script(&[("id", "int", "pk"), ("name", "string", "")]),
    );
    let inspector = memory_connection(&engine).introspector();

    let columns = inspector.describe_columns("users", Some("web")).await.unwrap();
    assert_eq!(columns.len(), 2);
    assert_eq!(columns[0].name, "id");
    assert_eq!(columns[0].logical_type, LogicalType::Integer);
    assert!(columns[0].nullable);
    assert_eq!(columns[0].default, None);
    assert_eq!(columns[1].name, "name");
    assert_eq!(columns[1].logical_type, LogicalType::Varchar);
    assert!(columns[1].nullable);
    assert_eq!(columns[1].default, None);
}

#[tokio::test]
async fn test_describe_partitioned_table() {
    let engine = MemoryEngine::new();
    engine.script(
        "DESCRIBE \"events\"",
        describe_script(&[
            ("# col_name", "data_type", "comment"),
            ("", "", ""),
            ("ts", "timestamp", "event time"),
            ("payload", "map<string,string>", ""),
            ("ds", "string", ""),
            ("", "", ""),
            ("# Partition Information", "", ""),
            ("# col_name", "data_type", "comment"),
            ("", "", ""),
            ("ds", "string", ""),
        ]),
    );
    let inspector = memory_connection(&engine).introspector();

    let columns = inspector.describe_columns("events", None).await.unwrap();
    let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["ts", "payload", "ds"]);
    assert_eq!(columns[0].comment.as_deref(), Some("event time"));
    // unmapped types are reported, not fatal
    assert_eq!(columns[1].logical_type, LogicalType::Unknown);
    assert_eq!(columns[1].raw_type, "map<string,string>");
}

#[tokio::test]
async fn test_identifiers_are_quoted() {
    let engine = MemoryEngine::new();
    engine.script(
        "DESCRIBE \"odd\"\"schema\".\"select\"",
        describe_script(&[("x", "bigint", "")]),
    );
    let inspector = memory_connection(&engine).introspector();
    let columns = inspector
        .describe_columns("select", Some("odd\"schema"))
        .await
        .unwrap();
    assert_eq!(columns[0].logical_type, LogicalType::Long);
}

#[tokio::test]
async fn test_table_exists() {
    let engine = MemoryEngine::new();
    engine.script("DESCRIBE \"users\"", describe_script(&[("id", "int", "")]));
    engine.script(
        "DESCRIBE \"a.b(c)*\"",
        Script::new().fail_with(
            "TABLE_NOT_FOUND",
            "Table 'hive.default.a.b(c)*' does not exist",
        ),
    );
    engine.script(
        "DESCRIBE \"locked\"",
        Script::new().fail_with("PERMISSION_DENIED", "Access Denied: Cannot select from table locked"),
    );
    let inspector = memory_connection(&engine).introspector();

    assert!(inspector.table_exists("users", None).await.unwrap());
    assert!(!inspector.table_exists("a.b(c)*", None).await.unwrap());
    let err = inspector.table_exists("locked", None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EngineFailure);

    // every cursor was closed, failures included
    let stats = engine.stats();
    assert_eq!(stats.opened, stats.released);
}

#[tokio::test]
async fn test_not_found_for_other_table_propagates() {
    let engine = MemoryEngine::new();
    engine.script(
        "DESCRIBE \"v_users\"",
        Script::new().fail_with(
            "TABLE_NOT_FOUND",
            "Table 'hive.default.users_raw' does not exist",
        ),
    );
    let inspector = memory_connection(&engine).introspector();
    let err = inspector.table_exists("v_users", None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_catalog_statements_carry_session_properties() {
    let engine = MemoryEngine::new();
    engine.script("SHOW SCHEMAS", names_script("Schema", &["web"]));
    let properties = [("query_max_run_time".to_string(), "10m".to_string())]
        .into_iter()
        .collect();
    let inspector = memory_connection(&engine)
        .introspector()
        .with_session_properties(properties);

    assert_eq!(inspector.list_schemas().await.unwrap(), vec!["web"]);
    let sent = engine.stats().last_session_params;
    assert!(sent
        .iter()
        .any(|p| p.key == "query_max_run_time" && p.value == "10m"));
}
