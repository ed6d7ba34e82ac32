//! Database abstraction layer for DigiFlow.
//!
//! Provides a trait-based interface for running guarded queries, allowing
//! different database backends to be used interchangeably. A client hands
//! out one fresh session per query; sessions are never pooled or reused.

mod mock;
mod postgres;
mod sqlite;
mod types;

pub use mock::{MockDatabaseClient, SessionCounters};
pub use postgres::PostgresClient;
pub use sqlite::SqliteClient;
pub use types::{distinct_column_names, ColumnInfo, QueryResult, Row, Value};

use crate::config::ConnectionConfig;
use crate::error::{DigiflowError, Result};
use async_trait::async_trait;
use std::time::{Duration, Instant};

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    #[default]
    Sqlite,
    Postgres,
}

impl DatabaseBackend {
    /// Returns the backend as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
        }
    }

    /// Parses a backend from a URL scheme.
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_lowercase().as_str() {
            "sqlite" => Some(Self::Sqlite),
            "postgres" | "postgresql" => Some(Self::Postgres),
            _ => None,
        }
    }
}

/// Rows fetched by a session, before timing is attached.
#[derive(Debug, Clone, Default)]
pub struct FetchedRows {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Row>,
    /// True if at least one row beyond the cap was available.
    pub truncated: bool,
}

/// Wall-clock budget shared by opening a session and running its statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
    limit: Duration,
}

impl Deadline {
    /// Starts a budget of `limit` from now.
    pub fn after(limit: Duration) -> Self {
        Self {
            at: Instant::now() + limit,
            limit,
        }
    }

    /// The instant the budget runs out.
    pub fn instant(&self) -> Instant {
        self.at
    }

    /// The configured budget.
    pub fn limit(&self) -> Duration {
        self.limit
    }

    /// Time left; zero once the deadline has passed.
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn has_passed(&self) -> bool {
        Instant::now() >= self.at
    }

    /// The error reported when a statement is cancelled at the deadline.
    pub fn exceeded(&self) -> DigiflowError {
        DigiflowError::Timeout(self.limit)
    }
}

/// Creates a database client for the given configuration.
///
/// This is the central factory function for query connections.
/// `statement_timeout` is forwarded to backends that can enforce it on the
/// server side.
pub fn client_for(
    config: &ConnectionConfig,
    statement_timeout: Duration,
) -> Box<dyn DatabaseClient> {
    match config.backend {
        DatabaseBackend::Sqlite => Box::new(SqliteClient::new(config.url.clone())),
        DatabaseBackend::Postgres => Box::new(
            PostgresClient::new(config.url.clone()).with_statement_timeout(statement_timeout),
        ),
    }
}

/// Source of single-use database sessions.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// The backend this client talks to.
    fn backend(&self) -> DatabaseBackend;

    /// Opens a new connection for exactly one query.
    async fn open(&self) -> Result<Box<dyn DatabaseSession>>;
}

/// One open connection.
#[async_trait]
pub trait DatabaseSession: Send {
    /// Runs `sql` and collects at most `max_rows` rows.
    ///
    /// The statement is cancelled on the server once `deadline` passes and
    /// the call fails with [`DigiflowError::Timeout`].
    async fn fetch_rows(
        &mut self,
        sql: &str,
        max_rows: usize,
        deadline: Deadline,
    ) -> Result<FetchedRows>;

    /// Closes the connection.
    async fn close(self: Box<Self>) -> Result<()>;
}
