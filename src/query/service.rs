//! Guard-then-execute entry point used by the command line.

use tracing::{error, info, warn};

use crate::db::QueryResult;
use crate::error::Result;
use crate::query::QueryExecutor;
use crate::safety::{ApprovedSql, ReadOnlyQueryGuard};

/// Validates caller text and runs it when approved.
#[derive(Debug, Clone)]
pub struct QueryService {
    guard: ReadOnlyQueryGuard,
    executor: QueryExecutor,
}

impl QueryService {
    pub fn new(guard: ReadOnlyQueryGuard, executor: QueryExecutor) -> Self {
        Self { guard, executor }
    }

    pub fn guard(&self) -> &ReadOnlyQueryGuard {
        &self.guard
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    /// Runs the guard only. Rejections are logged at warn level.
    pub fn validate(&self, sql: &str) -> Result<ApprovedSql> {
        self.guard.validate(sql).map_err(|rejection| {
            warn!(kind = rejection.kind(), "Rejected query: {sql}");
            rejection.into()
        })
    }

    /// Validates and executes `sql`.
    ///
    /// Rejections come back as [`crate::error::DigiflowError::Rejected`];
    /// anything else is an execution failure from the executor.
    pub async fn execute_read_only(&self, sql: &str) -> Result<QueryResult> {
        let approved = self.validate(sql)?;
        info!("Executing read-only query: {approved}");

        match self.executor.run(&approved).await {
            Ok(result) => {
                info!(
                    rows = result.row_count,
                    truncated = result.was_truncated,
                    elapsed_ms = result.execution_time.as_millis() as u64,
                    "Query returned {} rows",
                    result.row_count
                );
                Ok(result)
            }
            Err(e) => {
                error!("Query failed: {e}. SQL: {approved}");
                Err(e)
            }
        }
    }
}
