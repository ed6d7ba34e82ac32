//! Query executor integration tests.
//!
//! Runs approved statements against real SQLite databases. The PostgreSQL
//! tests need DATABASE_URL and are skipped without it.

use digiflow::config::ConnectionConfig;
use digiflow::db::{self, DatabaseClient, SqliteClient, Value};
use digiflow::error::DigiflowError;
use digiflow::persistence::{NewProject, OwnerId, ProjectStatus, ProjectStore};
use digiflow::query::{QueryExecutor, QueryLimits, QueryService, DEFAULT_MAX_ROWS};
use digiflow::safety::ReadOnlyQueryGuard;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::tempdir;

/// Numbers 1..=n without touching any table.
fn counting_query(n: usize) -> String {
    format!(
        "SELECT x FROM (WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c \
         WHERE x < {n}) SELECT x FROM c)"
    )
}

fn service_for(client: impl DatabaseClient + 'static) -> QueryService {
    QueryService::new(
        ReadOnlyQueryGuard::default(),
        QueryExecutor::new(Arc::new(client), QueryLimits::default()),
    )
}

fn memory_service() -> QueryService {
    service_for(SqliteClient::new("sqlite::memory:"))
}

#[tokio::test]
async fn test_simple_select() {
    let result = memory_service()
        .execute_read_only("SELECT 1 AS TestValue, 'hello' AS greeting")
        .await
        .unwrap();

    assert_eq!(result.columns.len(), 2);
    assert_eq!(result.columns[0].name, "TestValue");
    assert_eq!(result.row_count, 1);
    assert!(!result.was_truncated);
    assert_eq!(result.rows[0].get("TestValue"), Some(&Value::Int(1)));
    assert_eq!(
        result.rows[0].get("greeting"),
        Some(&Value::String("hello".to_string()))
    );
}

#[tokio::test]
async fn test_rows_are_capped_silently() {
    let result = memory_service()
        .execute_read_only(&counting_query(2500))
        .await
        .unwrap();

    assert_eq!(result.row_count, DEFAULT_MAX_ROWS);
    assert_eq!(result.rows.len(), DEFAULT_MAX_ROWS);
    assert!(result.was_truncated);
    assert_eq!(result.rows[0].get("x"), Some(&Value::Int(1)));
    assert_eq!(result.rows[999].get("x"), Some(&Value::Int(1000)));
}

#[tokio::test]
async fn test_exactly_the_cap_is_not_truncated() {
    let result = memory_service()
        .execute_read_only(&counting_query(DEFAULT_MAX_ROWS))
        .await
        .unwrap();

    assert_eq!(result.row_count, DEFAULT_MAX_ROWS);
    assert!(!result.was_truncated);
}

#[tokio::test]
async fn test_custom_row_cap() {
    let limits = QueryLimits::new(Duration::from_secs(5), 25).unwrap();
    let executor = QueryExecutor::new(Arc::new(SqliteClient::new("sqlite::memory:")), limits);
    let service = QueryService::new(ReadOnlyQueryGuard::default(), executor);

    let result = service.execute_read_only(&counting_query(100)).await.unwrap();
    assert_eq!(result.row_count, 25);
    assert!(result.was_truncated);
}

#[tokio::test]
async fn test_null_is_distinct_from_missing_column() {
    let result = memory_service()
        .execute_read_only("SELECT NULL AS nothing, 2.5 AS ratio, x'CAFE' AS raw")
        .await
        .unwrap();

    let row = &result.rows[0];
    assert_eq!(row.get("nothing"), Some(&Value::Null));
    assert_eq!(row.get("absent"), None);
    assert_eq!(row.get("ratio"), Some(&Value::Float(2.5)));
    assert_eq!(row.get("raw"), Some(&Value::Bytes(vec![0xCA, 0xFE])));
}

#[tokio::test]
async fn test_empty_result_keeps_no_rows() {
    let result = memory_service()
        .execute_read_only("SELECT 1 AS n WHERE 1 = 0")
        .await
        .unwrap();

    assert!(result.is_empty());
    assert_eq!(result.row_count, 0);
    assert!(!result.was_truncated);
}

#[tokio::test]
async fn test_engine_error_is_execution_failure() {
    let err = memory_service()
        .execute_read_only("SELECT * FROM NoSuchTable")
        .await
        .unwrap_err();

    assert!(matches!(err, DigiflowError::Query(_)));
    assert!(err.is_execution_failure());
    assert!(!err.is_rejection());
    assert!(!err.public_message().contains("NoSuchTable"));
}

#[tokio::test]
async fn test_runaway_statement_is_cancelled_at_the_limit() {
    let limit = Duration::from_millis(300);
    let executor = QueryExecutor::new(
        Arc::new(SqliteClient::new("sqlite::memory:")),
        QueryLimits::new(limit, DEFAULT_MAX_ROWS).unwrap(),
    );
    let service = QueryService::new(ReadOnlyQueryGuard::default(), executor);

    let started = Instant::now();
    let err = service
        .execute_read_only(
            "SELECT count(*) AS n FROM (WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL \
             SELECT x + 1 FROM c WHERE x < 300000000) SELECT x FROM c)",
        )
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, DigiflowError::Timeout(d) if d == limit));
    assert!(elapsed >= limit);
    assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");

    let result = service.execute_read_only("SELECT 1 AS n").await.unwrap();
    assert_eq!(result.rows[0].get("n"), Some(&Value::Int(1)));
}

#[tokio::test]
async fn test_unreachable_database_is_connection_error() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("missing").join("nothing.db");
    let service = service_for(SqliteClient::new(format!("sqlite:{}", missing.display())));

    let err = service.execute_read_only("SELECT 1").await.unwrap_err();
    assert!(matches!(err, DigiflowError::Connection(_)));
    assert!(!missing.exists());
}

#[tokio::test]
async fn test_queries_against_project_store_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("projects.db");
    let owner = OwnerId::new("u1");

    let store = ProjectStore::open(&path).await.unwrap();
    for title in ["Alpha rollout", "Beta rollout", "Gamma rollout"] {
        store
            .create_project(
                &NewProject::new(title, "Ada").with_status(ProjectStatus::InProgress),
                &owner,
            )
            .await
            .unwrap();
    }
    store.close().await;

    let connection = ConnectionConfig::sqlite_file(&path);
    let client: Arc<dyn DatabaseClient> =
        Arc::from(db::client_for(&connection, Duration::from_secs(5)));
    let service = QueryService::new(
        ReadOnlyQueryGuard::default(),
        QueryExecutor::new(client, QueryLimits::default()),
    );

    let result = service
        .execute_read_only("SELECT title, status FROM projects ORDER BY id")
        .await
        .unwrap();
    let titles: Vec<_> = result
        .rows
        .iter()
        .filter_map(|row| row.get("title").map(Value::to_display_string))
        .collect();
    assert_eq!(titles, ["Alpha rollout", "Beta rollout", "Gamma rollout"]);

    let err = service
        .execute_read_only("SELECT 1; DROP TABLE projects")
        .await
        .unwrap_err();
    assert!(err.is_rejection());

    let count = service
        .execute_read_only("SELECT COUNT(*) AS n FROM projects")
        .await
        .unwrap();
    assert_eq!(count.rows[0].get("n"), Some(&Value::Int(3)));

    // Approved by the keyword scan, but the session cannot write.
    let err = service
        .execute_read_only("SELECT 1; PRAGMA user_version = 42")
        .await
        .unwrap_err();
    assert!(matches!(err, DigiflowError::Query(_)));

    let version = service
        .execute_read_only("SELECT user_version FROM pragma_user_version")
        .await
        .unwrap();
    assert_eq!(version.rows[0].get("user_version"), Some(&Value::Int(0)));
}

fn postgres_url() -> Option<String> {
    std::env::var("DATABASE_URL")
        .ok()
        .filter(|url| url.starts_with("postgres"))
}

#[tokio::test]
async fn test_postgres_select_and_cap() {
    let Some(url) = postgres_url() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let connection = ConnectionConfig::from_url(&url).unwrap();
    let client: Arc<dyn DatabaseClient> =
        Arc::from(db::client_for(&connection, Duration::from_secs(10)));
    let service = QueryService::new(
        ReadOnlyQueryGuard::default(),
        QueryExecutor::new(client, QueryLimits::default()),
    );

    let result = service
        .execute_read_only("SELECT 1::int8 AS num, NULL::text AS missing")
        .await
        .unwrap();
    assert_eq!(result.rows[0].get("num"), Some(&Value::Int(1)));
    assert_eq!(result.rows[0].get("missing"), Some(&Value::Null));

    let result = service
        .execute_read_only("SELECT n FROM generate_series(1, 1500) AS n")
        .await
        .unwrap();
    assert_eq!(result.row_count, DEFAULT_MAX_ROWS);
    assert!(result.was_truncated);
}

#[tokio::test]
async fn test_postgres_timeout() {
    let Some(url) = postgres_url() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let connection = ConnectionConfig::from_url(&url).unwrap();
    let limits = QueryLimits::new(Duration::from_secs(1), DEFAULT_MAX_ROWS).unwrap();
    let client: Arc<dyn DatabaseClient> = Arc::from(db::client_for(&connection, limits.timeout));
    let service = QueryService::new(
        ReadOnlyQueryGuard::default(),
        QueryExecutor::new(client, limits),
    );

    let err = service
        .execute_read_only("SELECT pg_sleep(5)")
        .await
        .unwrap_err();
    assert!(err.is_execution_failure());
}
