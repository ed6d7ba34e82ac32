//! Mock database client for testing.
//!
//! Serves canned rows and records every session it hands out, so tests can
//! check that sessions are released and that the exact approved text reached
//! the database.

use super::{
    ColumnInfo, DatabaseBackend, DatabaseClient, DatabaseSession, Deadline, FetchedRows, Row,
};
use crate::error::{DigiflowError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared bookkeeping for sessions created by a [`MockDatabaseClient`].
#[derive(Debug, Clone, Default)]
pub struct SessionCounters {
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    statements: Arc<Mutex<Vec<String>>>,
}

impl SessionCounters {
    /// Number of sessions opened so far.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Number of sessions closed so far.
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Statements received, in order.
    pub fn statements(&self) -> Vec<String> {
        self.statements
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    fn record(&self, sql: &str) {
        if let Ok(mut statements) = self.statements.lock() {
            statements.push(sql.to_string());
        }
    }
}

/// A mock database client that returns predefined results.
#[derive(Debug, Clone)]
pub struct MockDatabaseClient {
    columns: Vec<ColumnInfo>,
    rows: Option<Vec<Row>>,
    delay: Option<Duration>,
    query_error: Option<String>,
    open_error: Option<String>,
    counters: SessionCounters,
}

impl MockDatabaseClient {
    /// Creates a mock that echoes each statement back as a single row.
    pub fn new() -> Self {
        Self {
            columns: vec![ColumnInfo::new("result", "TEXT")],
            rows: None,
            delay: None,
            query_error: None,
            open_error: None,
            counters: SessionCounters::default(),
        }
    }

    /// Creates a mock that returns the given rows for every statement.
    pub fn with_rows(columns: Vec<ColumnInfo>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows: Some(rows),
            ..Self::new()
        }
    }

    /// Creates a mock with `count` rows of a single integer column `n`.
    pub fn with_row_count(count: usize) -> Self {
        let rows = (0..count).map(|n| Row::new().with("n", n as i64)).collect();
        Self::with_rows(vec![ColumnInfo::new("n", "INTEGER")], rows)
    }

    /// Delays every statement by `delay`. The delay ignores the deadline, like
    /// a backend that cannot cancel a running statement.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Makes every statement fail with an engine error.
    pub fn failing_queries(mut self, message: impl Into<String>) -> Self {
        self.query_error = Some(message.into());
        self
    }

    /// Makes every connection attempt fail.
    pub fn failing_connections(mut self, message: impl Into<String>) -> Self {
        self.open_error = Some(message.into());
        self
    }

    /// Returns the shared session counters.
    pub fn counters(&self) -> SessionCounters {
        self.counters.clone()
    }
}

impl Default for MockDatabaseClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Sqlite
    }

    async fn open(&self) -> Result<Box<dyn DatabaseSession>> {
        if let Some(message) = &self.open_error {
            return Err(DigiflowError::connection(message.clone()));
        }
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            client: self.clone(),
        }))
    }
}

struct MockSession {
    client: MockDatabaseClient,
}

#[async_trait]
impl DatabaseSession for MockSession {
    async fn fetch_rows(
        &mut self,
        sql: &str,
        max_rows: usize,
        _deadline: Deadline,
    ) -> Result<FetchedRows> {
        self.client.counters.record(sql);

        if let Some(delay) = self.client.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.client.query_error {
            return Err(DigiflowError::query(message.clone()));
        }

        let rows = match &self.client.rows {
            Some(rows) => rows.clone(),
            None => vec![Row::new().with("result", format!("Mock result for: {sql}"))],
        };

        Ok(FetchedRows {
            columns: self.client.columns.clone(),
            truncated: rows.len() > max_rows,
            rows: rows.into_iter().take(max_rows).collect(),
        })
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.client.counters.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
