//! Bounded execution of approved statements.
//!
//! Every call opens its own session, runs exactly one statement within a
//! single deadline that covers opening and fetching, keeps at most
//! `max_rows` rows, and closes the session before returning, whatever the
//! outcome.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::{timeout, timeout_at};
use tracing::{debug, warn};

use crate::db::{DatabaseClient, Deadline, QueryResult};
use crate::error::{DigiflowError, Result};
use crate::safety::ApprovedSql;

/// Default statement timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default row cap.
pub const DEFAULT_MAX_ROWS: usize = 1000;

/// Upper bound on how long closing a session may take.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// How long past the deadline a session gets to report its own cancellation
/// before the fetch is abandoned.
const CANCEL_GRACE: Duration = Duration::from_millis(250);

/// Resource limits applied to every execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryLimits {
    /// Wall-clock budget for the statement.
    pub timeout: Duration,
    /// Maximum number of rows returned.
    pub max_rows: usize,
}

impl QueryLimits {
    /// Creates limits, rejecting a zero timeout or a zero row cap.
    pub fn new(timeout: Duration, max_rows: usize) -> Result<Self> {
        if timeout.is_zero() {
            return Err(DigiflowError::config("Query timeout must be greater than zero"));
        }
        if max_rows == 0 {
            return Err(DigiflowError::config("Row cap must be greater than zero"));
        }
        Ok(Self { timeout, max_rows })
    }
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_rows: DEFAULT_MAX_ROWS,
        }
    }
}

/// Runs approved statements against a database client.
#[derive(Clone)]
pub struct QueryExecutor {
    client: Arc<dyn DatabaseClient>,
    limits: QueryLimits,
}

impl QueryExecutor {
    /// Creates an executor with the given client and limits.
    pub fn new(client: Arc<dyn DatabaseClient>, limits: QueryLimits) -> Self {
        Self { client, limits }
    }

    /// Returns the limits in effect.
    pub fn limits(&self) -> QueryLimits {
        self.limits
    }

    /// Executes an approved statement.
    ///
    /// Fails with `Connection` if no session could be opened, `Query` if the
    /// engine refused the statement, and `Timeout` if it ran past the limit.
    /// Nothing is retried.
    pub async fn run(&self, sql: &ApprovedSql) -> Result<QueryResult> {
        let start = Instant::now();
        let deadline = Deadline::after(self.limits.timeout);
        let expires = tokio::time::Instant::from_std(deadline.instant());

        let mut session = match timeout_at(expires, self.client.open()).await {
            Ok(opened) => opened?,
            Err(_) => {
                return Err(DigiflowError::connection(format!(
                    "No connection within {:?}",
                    self.limits.timeout
                )))
            }
        };

        let outcome = timeout_at(
            expires + CANCEL_GRACE,
            session.fetch_rows(sql.as_str(), self.limits.max_rows, deadline),
        )
        .await;

        match timeout(CLOSE_GRACE, session.close()).await {
            Ok(Ok(())) => debug!("Session released"),
            Ok(Err(e)) => warn!("Failed to close session: {e}"),
            Err(_) => warn!("Closing session exceeded {CLOSE_GRACE:?}"),
        }

        let fetched = match outcome {
            Ok(fetched) => fetched?,
            Err(_) => return Err(deadline.exceeded()),
        };

        let mut result = QueryResult::with_data(fetched.columns, fetched.rows)
            .with_execution_time(start.elapsed());
        result.was_truncated = fetched.truncated;
        Ok(result)
    }
}

impl std::fmt::Debug for QueryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryExecutor")
            .field("backend", &self.client.backend())
            .field("limits", &self.limits)
            .finish()
    }
}
