//! SQLite database client implementation.
//!
//! Opens one read-only `SqliteConnection` per query using sqlx. A progress
//! handler interrupts the running statement once its deadline passes.

use crate::db::{
    distinct_column_names, ColumnInfo, DatabaseBackend, DatabaseClient, DatabaseSession,
    Deadline, FetchedRows, Row, Value,
};
use crate::error::{DigiflowError, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column as SqlxColumn, ConnectOptions, Connection, Row as SqlxRow, TypeInfo, ValueRef};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::debug;

/// How long SQLite waits on a locked database before failing the statement.
const BUSY_TIMEOUT_SECS: u64 = 5;

/// Virtual machine steps between deadline checks.
const PROGRESS_CHECK_OPS: i32 = 1000;

/// Extended result code of a statement stopped by the progress handler.
const SQLITE_INTERRUPT: &str = "9";

/// SQLite database client.
#[derive(Debug, Clone)]
pub struct SqliteClient {
    url: String,
}

impl SqliteClient {
    /// Creates a client for a `sqlite:` URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl DatabaseClient for SqliteClient {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Sqlite
    }

    async fn open(&self) -> Result<Box<dyn DatabaseSession>> {
        let options = SqliteConnectOptions::from_str(&self.url)
            .map_err(|e| DigiflowError::config(format!("Invalid SQLite URL: {e}")))?
            .busy_timeout(Duration::from_secs(BUSY_TIMEOUT_SECS))
            .read_only(true);

        let conn = options
            .connect()
            .await
            .map_err(|e| DigiflowError::connection(format!("Cannot open SQLite database: {e}")))?;

        debug!("Opened SQLite session");
        Ok(Box::new(SqliteSession { conn }))
    }
}

struct SqliteSession {
    conn: SqliteConnection,
}

#[async_trait]
impl DatabaseSession for SqliteSession {
    async fn fetch_rows(
        &mut self,
        sql: &str,
        max_rows: usize,
        deadline: Deadline,
    ) -> Result<FetchedRows> {
        let expires = deadline.instant();
        self.conn
            .lock_handle()
            .await
            .map_err(|e| DigiflowError::connection(format!("SQLite session unavailable: {e}")))?
            .set_progress_handler(PROGRESS_CHECK_OPS, move || Instant::now() < expires);

        let mut fetched = FetchedRows::default();
        let mut names = Vec::new();
        let mut stream = sqlx::query(sql).fetch(&mut self.conn);

        while let Some(row) = stream
            .try_next()
            .await
            .map_err(|e| map_query_error(e, &deadline))?
        {
            if fetched.rows.len() == max_rows {
                fetched.truncated = true;
                break;
            }
            if fetched.columns.is_empty() {
                names = distinct_column_names(row.columns().iter().map(|col| col.name()));
                fetched.columns = column_info(&row, &names);
            }
            fetched.rows.push(convert_row(&row, &names));
        }

        Ok(fetched)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn
            .close()
            .await
            .map_err(|e| DigiflowError::connection(format!("Failed to close SQLite session: {e}")))?;
        debug!("Closed SQLite session");
        Ok(())
    }
}

fn map_query_error(error: sqlx::Error, deadline: &Deadline) -> DigiflowError {
    let interrupted = error
        .as_database_error()
        .and_then(|db_error| db_error.code())
        .is_some_and(|code| code == SQLITE_INTERRUPT);

    if interrupted {
        debug!("SQLite statement interrupted at deadline");
        deadline.exceeded()
    } else {
        DigiflowError::query(error.to_string())
    }
}

fn column_info(row: &SqliteRow, names: &[String]) -> Vec<ColumnInfo> {
    row.columns()
        .iter()
        .zip(names)
        .map(|(col, name)| ColumnInfo::new(name.as_str(), col.type_info().name()))
        .collect()
}

/// Converts a sqlx SqliteRow to our Row type.
fn convert_row(row: &SqliteRow, names: &[String]) -> Row {
    let mut converted = Row::new();
    for ((i, col), name) in row.columns().iter().enumerate().zip(names) {
        converted.insert(name.as_str(), convert_value(row, i, col.type_info().name()));
    }
    converted
}

/// Converts a single value, preferring the declared column type and falling
/// back to the storage class of the value itself.
fn convert_value(row: &SqliteRow, index: usize, declared_type: &str) -> Value {
    let storage_class = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_uppercase(),
        Err(_) => return Value::Null,
    };

    if matches!(declared_type.to_uppercase().as_str(), "BOOLEAN" | "BOOL") {
        if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(index) {
            return Value::Bool(b);
        }
    }

    match storage_class.as_str() {
        "INTEGER" | "INT" | "BIGINT" | "INT8" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Int),
        "REAL" | "FLOAT" | "DOUBLE" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Float),
        "BLOB" => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bytes),
        _ => row
            .try_get::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(Value::String),
    }
    .unwrap_or_else(|| decode_unchecked(row, index))
}

/// Last-resort decoding when the typed path refuses the value.
fn decode_unchecked(row: &SqliteRow, index: usize) -> Value {
    if let Ok(Some(s)) = row.try_get_unchecked::<Option<String>, _>(index) {
        return Value::String(s);
    }
    row.try_get_unchecked::<Option<Vec<u8>>, _>(index)
        .ok()
        .flatten()
        .map(Value::Bytes)
        .unwrap_or(Value::Null)
}
