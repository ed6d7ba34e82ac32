//! PostgreSQL database client implementation.
//!
//! Opens one read-only `PgConnection` per query using sqlx. Before each
//! statement the server-side `statement_timeout` is narrowed to what is left
//! of the deadline, so PostgreSQL itself cancels a statement that runs over.

use crate::db::{
    distinct_column_names, ColumnInfo, DatabaseBackend, DatabaseClient, DatabaseSession,
    Deadline, FetchedRows, Row, Value,
};
use crate::error::{DigiflowError, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow, PgValueFormat};
use sqlx::{Column as SqlxColumn, ConnectOptions, Connection, Row as SqlxRow, TypeInfo, ValueRef};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// SQLSTATE `query_canceled`, raised when `statement_timeout` fires.
const QUERY_CANCELED: &str = "57014";

/// PostgreSQL database client.
#[derive(Debug, Clone)]
pub struct PostgresClient {
    url: String,
    statement_timeout: Option<Duration>,
}

impl PostgresClient {
    /// Creates a client for a `postgres://` URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            statement_timeout: None,
        }
    }

    /// Caps the server-side statement timeout of each session. A tighter
    /// deadline passed to `fetch_rows` still wins.
    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl DatabaseClient for PostgresClient {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Postgres
    }

    async fn open(&self) -> Result<Box<dyn DatabaseSession>> {
        let options = PgConnectOptions::from_str(&self.url)
            .map_err(|e| DigiflowError::config(format!("Invalid PostgreSQL URL: {e}")))?
            .options([("default_transaction_read_only", "on")]);

        let conn = options
            .connect()
            .await
            .map_err(|e| map_connection_error(e, &options))?;

        debug!("Opened PostgreSQL session");
        Ok(Box::new(PostgresSession {
            conn,
            statement_timeout: self.statement_timeout,
        }))
    }
}

struct PostgresSession {
    conn: PgConnection,
    statement_timeout: Option<Duration>,
}

#[async_trait]
impl DatabaseSession for PostgresSession {
    async fn fetch_rows(
        &mut self,
        sql: &str,
        max_rows: usize,
        deadline: Deadline,
    ) -> Result<FetchedRows> {
        let budget = match self.statement_timeout {
            Some(cap) => deadline.remaining().min(cap),
            None => deadline.remaining(),
        };
        // statement_timeout = 0 disables the limit, so never send less than 1ms.
        let budget_ms = budget.as_millis().max(1);
        sqlx::query("SELECT set_config('statement_timeout', $1, false)")
            .bind(format!("{budget_ms}ms"))
            .execute(&mut self.conn)
            .await
            .map_err(|e| DigiflowError::connection(format_query_error(e)))?;

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
                fetched.columns = row
                    .columns()
                    .iter()
                    .zip(&names)
                    .map(|(col, name)| ColumnInfo::new(name.as_str(), col.type_info().name()))
                    .collect();
            }
            fetched.rows.push(convert_row(&row, &names));
        }

        Ok(fetched)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn.close().await.map_err(|e| {
            DigiflowError::connection(format!("Failed to close PostgreSQL session: {e}"))
        })?;
        debug!("Closed PostgreSQL session");
        Ok(())
    }
}

/// Converts a sqlx PgRow to our Row type.
fn convert_row(row: &PgRow, names: &[String]) -> Row {
    let mut converted = Row::new();
    for ((i, col), name) in row.columns().iter().enumerate().zip(names) {
        converted.insert(name.as_str(), convert_value(row, i, col.type_info().name()));
    }
    converted
}

/// Converts a single column value from a PgRow to our Value type.
fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(_) => {}
        Err(_) => return Value::Null,
    }

    let type_name = type_name.to_uppercase();
    let decoded = match type_name.as_str() {
        "BOOL" | "BOOLEAN" => row.try_get::<bool, _>(index).ok().map(Value::Bool),
        "INT2" | "SMALLINT" => row
            .try_get::<i16, _>(index)
            .ok()
            .map(|v| Value::Int(v as i64)),
        "INT4" | "INT" | "INTEGER" => row
            .try_get::<i32, _>(index)
            .ok()
            .map(|v| Value::Int(v as i64)),
        "INT8" | "BIGINT" => row.try_get::<i64, _>(index).ok().map(Value::Int),
        "FLOAT4" | "REAL" => row
            .try_get::<f32, _>(index)
            .ok()
            .map(|v| Value::Float(v as f64)),
        "FLOAT8" | "DOUBLE PRECISION" => row.try_get::<f64, _>(index).ok().map(Value::Float),
        "BYTEA" => row.try_get::<Vec<u8>, _>(index).ok().map(Value::Bytes),
        "TIMESTAMPTZ" => row
            .try_get::<chrono::DateTime<chrono::Utc>, _>(index)
            .ok()
            .map(|v| Value::String(v.to_rfc3339())),
        "TIMESTAMP" => row
            .try_get::<chrono::NaiveDateTime, _>(index)
            .ok()
            .map(|v| Value::String(v.to_string())),
        "DATE" => row
            .try_get::<chrono::NaiveDate, _>(index)
            .ok()
            .map(|v| Value::String(v.to_string())),
        "TIME" => row
            .try_get::<chrono::NaiveTime, _>(index)
            .ok()
            .map(|v| Value::String(v.to_string())),
        "JSON" | "JSONB" => row
            .try_get::<serde_json::Value, _>(index)
            .ok()
            .map(|v| Value::String(v.to_string())),
        _ => row.try_get::<String, _>(index).ok().map(Value::String),
    };

    decoded.unwrap_or_else(|| decode_wire_value(row, index, &type_name))
}

/// Renders a value of a type without a typed mapping from its wire bytes.
///
/// NUMERIC and UUID have fixed binary layouts and are formatted the way the
/// server prints them. Other binary values that are valid UTF-8 (enums,
/// CITEXT, XML) are kept as text; anything else as raw bytes.
fn decode_wire_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    let Ok(raw) = row.try_get_raw(index) else {
        return Value::Null;
    };
    let format = raw.format();
    let Ok(bytes) = raw.as_bytes() else {
        return Value::Null;
    };

    if format == PgValueFormat::Text {
        return Value::String(String::from_utf8_lossy(bytes).into_owned());
    }

    let formatted = match type_name {
        "NUMERIC" => format_numeric(bytes),
        "UUID" => format_uuid(bytes),
        _ => None,
    };

    formatted
        .or_else(|| std::str::from_utf8(bytes).ok().map(str::to_string))
        .map(Value::String)
        .unwrap_or_else(|| Value::Bytes(bytes.to_vec()))
}

/// Formats a binary NUMERIC: a header of digit count, weight, sign and
/// display scale, followed by base-10000 digits.
fn format_numeric(bytes: &[u8]) -> Option<String> {
    let word = |i: usize| {
        bytes
            .get(i * 2..i * 2 + 2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
    };

    let ndigits = usize::from(word(0)?);
    let weight = i32::from(word(1)? as i16);
    let sign = word(2)?;
    let dscale = usize::from(word(3)?);

    match sign {
        0xC000 => return Some("NaN".to_string()),
        0xD000 => return Some("Infinity".to_string()),
        0xF000 => return Some("-Infinity".to_string()),
        _ => {}
    }

    let digits = (0..ndigits)
        .map(|i| word(4 + i))
        .collect::<Option<Vec<u16>>>()?;
    let digit = |group: i32| {
        usize::try_from(group)
            .ok()
            .and_then(|g| digits.get(g).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == 0x4000 {
        out.push('-');
    }

    if weight < 0 {
        out.push('0');
    } else {
        out.push_str(&digit(0).to_string());
        for group in 1..=weight {
            out.push_str(&format!("{:04}", digit(group)));
        }
    }

    if dscale > 0 {
        let mut fraction = String::new();
        let mut group = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", digit(group)));
            group += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }

    Some(out)
}

/// Formats 16 UUID bytes in the hyphenated form.
fn format_uuid(bytes: &[u8]) -> Option<String> {
    if bytes.len() != 16 {
        return None;
    }
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    Some(format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    ))
}

fn map_query_error(error: sqlx::Error, deadline: &Deadline) -> DigiflowError {
    let canceled = error
        .as_database_error()
        .and_then(|db_error| db_error.code())
        .is_some_and(|code| code == QUERY_CANCELED);

    if canceled && deadline.has_passed() {
        deadline.exceeded()
    } else {
        DigiflowError::query(format_query_error(error))
    }
}

/// Maps sqlx connection errors to user-friendly messages.
fn map_connection_error(error: sqlx::Error, options: &PgConnectOptions) -> DigiflowError {
    let host = options.get_host();
    let port = options.get_port();
    let user = options.get_username();
    let database = options.get_database().unwrap_or("unknown");

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        DigiflowError::connection(format!(
            "Cannot connect to {host}:{port}. Check that the server is running."
        ))
    } else if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
    {
        DigiflowError::connection(format!(
            "Authentication failed for user '{user}'. Check your credentials."
        ))
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        DigiflowError::connection(format!("Database '{database}' does not exist."))
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        DigiflowError::connection(format!(
            "Connection to {host}:{port} timed out. The server may be overloaded or unreachable."
        ))
    } else {
        DigiflowError::connection(error.to_string())
    }
}

/// Formats a query error with detail and hint if available.
fn format_query_error(error: sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut result = format!("ERROR: {}", db_error.message());

    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            result.push_str("\n  DETAIL: ");
            result.push_str(detail);
        }
        if let Some(hint) = pg_error.hint() {
            result.push_str("\n  HINT: ");
            result.push_str(hint);
        }
    }

    result
}
