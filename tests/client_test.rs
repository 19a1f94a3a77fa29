//! Integration tests for the database client, driven by a scripted handle.

mod common;

use common::{MockHandle, Step, describe_rows, name_rows, numbered_rows};
use mysql_mcp_server::db::{ClientConfig, DatabaseClient, QueryContext, Value};
use mysql_mcp_server::error::DbError;
use std::time::Duration;
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

fn client(handle: &MockHandle) -> DatabaseClient<MockHandle> {
    client_with(handle, 5, Duration::from_secs(5))
}

fn client_with(
    handle: &MockHandle,
    max_rows: usize,
    timeout: Duration,
) -> DatabaseClient<MockHandle> {
    let config = ClientConfig::new(max_rows, timeout).unwrap();
    DatabaseClient::with_handle(handle.clone(), config).unwrap()
}

// =============================================================================
// list_databases
// =============================================================================

#[tokio::test]
async fn test_list_databases() {
    let handle = MockHandle::new([Step::Rows(name_rows(
        "Database",
        &["information_schema", "app", "analytics"],
    ))]);
    let client = client(&handle);

    let names = assert_ok!(client.list_databases(&QueryContext::new()).await);

    assert_eq!(names, vec!["information_schema", "app", "analytics"]);
    assert_eq!(handle.statements(), vec!["SHOW DATABASES"]);
    assert_eq!(handle.acquired(), 1);
    assert_eq!(handle.returned(), 1);
    assert_eq!(handle.retired(), 0);
    handle.assert_all_consumed();
}

#[tokio::test]
async fn test_list_databases_empty() {
    let handle = MockHandle::new([Step::Rows(Vec::new())]);
    let client = client(&handle);

    let names = assert_ok!(client.list_databases(&QueryContext::new()).await);
    assert!(names.is_empty());
}

#[tokio::test]
async fn test_list_databases_acquire_failure() {
    let handle = MockHandle::failing_acquire("server went away");
    let client = client(&handle);

    // Connection errors are reserved for construction; at call time the
    // lost server is a failed statement
    let err = assert_err!(client.list_databases(&QueryContext::new()).await);
    assert!(matches!(err, DbError::Query { .. }));
    assert!(err.to_string().contains("server went away"));
    assert!(handle.statements().is_empty());
}

// =============================================================================
// list_tables
// =============================================================================

#[tokio::test]
async fn test_list_tables_selects_then_lists_on_one_session() {
    let handle = MockHandle::new([
        Step::Exec(Ok(0)),
        Step::Rows(name_rows("Tables_in_app", &["orders", "users"])),
    ]);
    let client = client(&handle);

    let tables = assert_ok!(client.list_tables(&QueryContext::new(), "app").await);

    assert_eq!(tables, vec!["orders", "users"]);
    assert_eq!(handle.statements(), vec!["USE `app`", "SHOW TABLES"]);
    assert_eq!(handle.acquired(), 1);
    // The session's default database changed, so it never goes back to the pool
    assert_eq!(handle.retired(), 1);
    assert_eq!(handle.returned(), 0);
    handle.assert_all_consumed();
}

#[tokio::test]
async fn test_list_tables_quotes_unusual_names() {
    let handle = MockHandle::new([Step::Exec(Ok(0)), Step::Rows(Vec::new())]);
    let client = client(&handle);

    let tables = assert_ok!(client.list_tables(&QueryContext::new(), "my db; DROP").await);

    assert!(tables.is_empty());
    assert_eq!(handle.statements()[0], "USE `my db; DROP`");
}

#[tokio::test]
async fn test_list_tables_requires_database() {
    let handle = MockHandle::default();
    let client = client(&handle);

    let err = assert_err!(client.list_tables(&QueryContext::new(), "").await);
    assert_eq!(err.to_string(), "database is required");
    assert!(err.is_caller_fault());
    assert_eq!(handle.acquired(), 0);
    assert!(handle.statements().is_empty());
}

#[tokio::test]
async fn test_list_tables_rejects_backtick() {
    let handle = MockHandle::default();
    let client = client(&handle);

    let err = assert_err!(client.list_tables(&QueryContext::new(), "app`; --").await);
    assert_eq!(err.to_string(), "invalid database name");
    assert!(handle.statements().is_empty());
}

#[tokio::test]
async fn test_list_tables_selection_failure_skips_listing() {
    let handle = MockHandle::new([Step::Exec(Err(DbError::query(
        "Unknown database 'missing'",
        Some("42000".to_string()),
        "check the name",
    )))]);
    let client = client(&handle);

    let err = assert_err!(client.list_tables(&QueryContext::new(), "missing").await);

    match err {
        DbError::Selection { database, message } => {
            assert_eq!(database, "missing");
            assert!(message.contains("Unknown database"));
        }
        other => panic!("expected selection error, got {:?}", other),
    }
    assert_eq!(handle.statements(), vec!["USE `missing`"]);
    assert_eq!(handle.retired(), 1);
    handle.assert_all_consumed();
}

#[tokio::test]
async fn test_list_tables_listing_failure_after_selection() {
    let handle = MockHandle::new([
        Step::Exec(Ok(0)),
        Step::Rows(vec![Err(DbError::query(
            "SHOW command denied to user",
            Some("42000".to_string()),
            "check privileges",
        ))]),
    ]);
    let client = client(&handle);

    let err = assert_err!(client.list_tables(&QueryContext::new(), "app").await);

    assert!(matches!(err, DbError::Query { .. }));
    assert!(err.to_string().contains("SHOW command denied"));
    assert_eq!(handle.statements(), vec!["USE `app`", "SHOW TABLES"]);
    assert_eq!(handle.retired(), 1);
    handle.assert_all_consumed();
}

// =============================================================================
// describe_table
// =============================================================================

#[tokio::test]
async fn test_describe_table() {
    let handle = MockHandle::new([Step::Exec(Ok(0)), Step::Rows(describe_rows())]);
    let client = client(&handle);

    let rows = assert_ok!(
        client
            .describe_table(&QueryContext::new(), "app", "users")
            .await
    );

    assert_eq!(handle.statements(), vec!["USE `app`", "DESCRIBE `users`"]);
    assert_eq!(rows.len(), 2);
    assert_eq!(
        rows[0].columns(),
        ["Field", "Type", "Null", "Key", "Default", "Extra"]
    );
    assert_eq!(rows[0].get("Field"), Some(&Value::Text("id".into())));
    assert_eq!(rows[0].get("Key"), Some(&Value::Text("PRI".into())));
    assert_eq!(rows[1].get("Type"), Some(&Value::Text("varchar(255)".into())));
    assert_eq!(rows[1].get("Default"), Some(&Value::Null));
    assert_eq!(handle.retired(), 1);
}

#[tokio::test]
async fn test_describe_table_selection_failure_skips_describe() {
    let handle = MockHandle::new([Step::Exec(Err(DbError::query(
        "Unknown database 'nope'",
        Some("42000".to_string()),
        "check the name",
    )))]);
    let client = client(&handle);

    let err = assert_err!(
        client
            .describe_table(&QueryContext::new(), "nope", "users")
            .await
    );

    match err {
        DbError::Selection { database, .. } => assert_eq!(database, "nope"),
        other => panic!("expected selection error, got {:?}", other),
    }
    assert_eq!(handle.statements(), vec!["USE `nope`"]);
    assert_eq!(handle.retired(), 1);
    handle.assert_all_consumed();
}

#[tokio::test]
async fn test_describe_table_failure_after_selection_is_query_error() {
    let handle = MockHandle::new([
        Step::Exec(Ok(0)),
        Step::Rows(vec![Err(DbError::query(
            "Table 'app.missing' doesn't exist",
            Some("42S02".to_string()),
            "check the table name",
        ))]),
    ]);
    let client = client(&handle);

    let err = assert_err!(
        client
            .describe_table(&QueryContext::new(), "app", "missing")
            .await
    );

    match err {
        DbError::Query { sql_state, .. } => assert_eq!(sql_state.as_deref(), Some("42S02")),
        other => panic!("expected query error, got {:?}", other),
    }
    assert_eq!(handle.statements(), vec!["USE `app`", "DESCRIBE `missing`"]);
    handle.assert_all_consumed();
}

#[tokio::test]
async fn test_describe_table_validates_database_first() {
    let handle = MockHandle::default();
    let client = client(&handle);
    let ctx = QueryContext::new();

    let err = assert_err!(client.describe_table(&ctx, "", "").await);
    assert_eq!(err.to_string(), "database is required");

    let err = assert_err!(client.describe_table(&ctx, "app", "").await);
    assert_eq!(err.to_string(), "table is required");

    let err = assert_err!(client.describe_table(&ctx, "app", "us`ers").await);
    assert_eq!(err.to_string(), "invalid table name");

    assert_eq!(handle.acquired(), 0);
}

// =============================================================================
// run_query
// =============================================================================

#[tokio::test]
async fn test_run_query_requires_sql() {
    let handle = MockHandle::default();
    let client = client(&handle);

    for sql in ["", "   ", "\n\t"] {
        let err = assert_err!(client.run_query(&QueryContext::new(), sql, 10).await);
        assert_eq!(err.to_string(), "sql is required");
    }
    assert_eq!(handle.acquired(), 0);
}

#[tokio::test]
async fn test_run_query_row_cap() {
    // Configured maximum is 5; each request reads from a 10-row result
    let cases = [(0, 5), (-1, 5), (2, 2), (5, 5), (100, 5)];
    let handle = MockHandle::new(cases.iter().map(|_| Step::Rows(numbered_rows(10))));
    let client = client(&handle);

    for (requested, expected) in cases {
        let rows = assert_ok!(
            client
                .run_query(&QueryContext::new(), "SELECT id, name FROM t", requested)
                .await
        );
        assert_eq!(rows.len(), expected, "requested {}", requested);
        assert_eq!(rows[0].get("id"), Some(&Value::Int(1)));
    }
    handle.assert_all_consumed();
}

#[tokio::test]
async fn test_run_query_short_result() {
    let handle = MockHandle::new([Step::Rows(numbered_rows(3))]);
    let client = client(&handle);

    let rows = assert_ok!(
        client
            .run_query(&QueryContext::new(), "SELECT * FROM t", 0)
            .await
    );

    assert_eq!(rows.len(), 3);
    assert_eq!(rows[2].get("name"), Some(&Value::Text("row3".into())));
    assert_eq!(handle.statements(), vec!["SELECT * FROM t"]);
    assert_eq!(handle.returned(), 1);
    assert_eq!(handle.retired(), 0);
}

#[tokio::test]
async fn test_run_query_passes_sql_through() {
    let sql = "  SELECT `a` FROM t WHERE b = 'x'  ";
    let handle = MockHandle::new([Step::Rows(Vec::new())]);
    let client = client(&handle);

    let rows = assert_ok!(client.run_query(&QueryContext::new(), sql, 0).await);
    assert!(rows.is_empty());
    assert_eq!(handle.statements(), vec![sql]);
}

#[tokio::test]
async fn test_run_query_error_before_rows_keeps_kind() {
    let handle = MockHandle::new([Step::Rows(vec![Err(DbError::query(
        "You have an error in your SQL syntax",
        Some("42000".to_string()),
        "check the syntax",
    ))])]);
    let client = client(&handle);

    let err = assert_err!(client.run_query(&QueryContext::new(), "SELEC 1", 0).await);
    assert!(matches!(err, DbError::Query { .. }));
}

#[tokio::test]
async fn test_run_query_lost_connection_is_query_error() {
    let reset = std::io::Error::new(
        std::io::ErrorKind::ConnectionReset,
        "connection reset by peer",
    );
    let handle = MockHandle::new([Step::Rows(vec![Err(sqlx::Error::Io(reset).into())])]);
    let client = client(&handle);

    let err = assert_err!(client.run_query(&QueryContext::new(), "SELECT 1", 0).await);

    match err {
        DbError::Query { message, .. } => assert!(message.contains("connection reset")),
        other => panic!("expected query error, got {:?}", other),
    }
    assert_eq!(handle.returned(), 1);
}

#[tokio::test]
async fn test_run_query_error_after_rows_is_decode_failure() {
    let mut items = numbered_rows(2);
    items.push(Err(DbError::query("connection reset", None, "retry")));
    let handle = MockHandle::new([Step::Rows(items)]);
    let client = client(&handle);

    let err = assert_err!(client.run_query(&QueryContext::new(), "SELECT 1", 0).await);
    assert!(matches!(err, DbError::Decode { .. }));
    assert_eq!(handle.returned(), 1);
}

// =============================================================================
// Deadlines and cancellation
// =============================================================================

#[tokio::test]
async fn test_query_timeout_releases_session() {
    let handle = MockHandle::new([Step::Hang]);
    let client = client_with(&handle, 5, Duration::from_millis(100));

    let started = std::time::Instant::now();
    let err = assert_err!(client.run_query(&QueryContext::new(), "SELECT SLEEP(60)", 0).await);

    assert!(matches!(err, DbError::Timeout { .. }));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(handle.acquired(), 1);
    assert_eq!(handle.returned(), 1);
}

#[tokio::test]
async fn test_caller_deadline_earlier_than_timeout() {
    let handle = MockHandle::new([Step::Exec(Ok(0)), Step::Hang]);
    let client = client_with(&handle, 5, Duration::from_secs(30));
    let ctx = QueryContext::new().with_timeout(Duration::from_millis(100));

    let err = assert_err!(client.list_tables(&ctx, "app").await);
    assert!(matches!(err, DbError::Timeout { .. }));
    assert_eq!(handle.retired(), 1);
}

#[tokio::test]
async fn test_expired_deadline_never_acquires() {
    let handle = MockHandle::default();
    let client = client(&handle);
    let ctx = QueryContext::new().with_deadline(Instant::now());

    let err = assert_err!(client.list_databases(&ctx).await);
    assert!(matches!(err, DbError::Timeout { .. }));

    let err = assert_err!(client.list_tables(&ctx, "app").await);
    assert!(matches!(err, DbError::Timeout { .. }));

    assert_eq!(handle.acquired(), 0);
}

#[tokio::test]
async fn test_cancelled_context_never_acquires() {
    let handle = MockHandle::default();
    let client = client(&handle);
    let token = CancellationToken::new();
    token.cancel();
    let ctx = QueryContext::new().with_cancellation(token);

    let err = assert_err!(client.run_query(&ctx, "SELECT 1", 0).await);
    assert!(matches!(err, DbError::Cancelled { .. }));
    assert_eq!(handle.acquired(), 0);
}

#[tokio::test]
async fn test_cancellation_during_query() {
    let handle = MockHandle::new([Step::Hang]);
    let client = client_with(&handle, 5, Duration::from_secs(30));
    let token = CancellationToken::new();
    let ctx = QueryContext::new().with_cancellation(token.clone());

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    let err = assert_err!(client.run_query(&ctx, "SELECT SLEEP(60)", 0).await);
    assert!(matches!(err, DbError::Cancelled { .. }));
    assert_eq!(handle.returned(), 1);
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_close_is_idempotent() {
    let handle = MockHandle::default();
    let client = client(&handle);

    client.close().await;
    client.close().await;

    assert!(client.is_closed());
    let err = assert_err!(client.list_databases(&QueryContext::new()).await);
    assert!(matches!(err, DbError::Closed));
    assert_eq!(handle.acquired(), 0);
}

#[tokio::test]
async fn test_validation_runs_before_closed_check() {
    let handle = MockHandle::default();
    let client = client(&handle);
    client.close().await;

    let err = assert_err!(client.run_query(&QueryContext::new(), "", 0).await);
    assert_eq!(err.to_string(), "sql is required");
}

#[tokio::test]
async fn test_with_handle_rejects_closed_handle() {
    let handle = MockHandle::default();
    handle.mark_closed();

    let err = assert_err!(DatabaseClient::with_handle(handle, ClientConfig::default()));
    assert!(matches!(err, DbError::Config { .. }));
}
