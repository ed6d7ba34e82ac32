//! Error types for DigiFlow.
//!
//! Defines the main error enum used throughout the application.

use crate::safety::QueryRejection;
use std::time::Duration;
use thiserror::Error;

/// Main error type for DigiFlow operations.
#[derive(Error, Debug)]
pub enum DigiflowError {
    /// Database connection errors (host unreachable, auth failed, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution errors raised by the database engine.
    #[error("Query error: {0}")]
    Query(String),

    /// The statement did not finish within the configured timeout.
    #[error("Query timed out after {0:?}")]
    Timeout(Duration),

    /// The read-only guard refused the statement before execution.
    #[error("Query rejected: {0}")]
    Rejected(#[from] QueryRejection),

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Project store errors (SQLite access, migrations).
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Input that violates a field constraint.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The requested record does not exist for this owner.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Import/export format errors.
    #[error("Exchange error: {0}")]
    Exchange(String),

    /// Internal application errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DigiflowError {
    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a persistence error with the given message.
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Creates a validation error with the given message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Creates a not-found error with the given message.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Creates an exchange error with the given message.
    pub fn exchange(msg: impl Into<String>) -> Self {
        Self::Exchange(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Connection Error",
            Self::Query(_) => "Query Error",
            Self::Timeout(_) => "Timeout",
            Self::Rejected(_) => "Security Rejection",
            Self::Config(_) => "Configuration Error",
            Self::Persistence(_) => "Persistence Error",
            Self::Validation(_) => "Validation Error",
            Self::NotFound(_) => "Not Found",
            Self::Exchange(_) => "Exchange Error",
            Self::Internal(_) => "Internal Error",
        }
    }

    /// Returns true if the guard refused the statement.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// Returns true if the statement was approved but failed while running.
    pub fn is_execution_failure(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Query(_) | Self::Timeout(_)
        )
    }

    /// Message that is safe to show to an end user.
    ///
    /// Rejections are shown verbatim. Engine failures are reduced to a
    /// generic message so schema details do not leak; the full error is
    /// logged by the caller instead.
    pub fn public_message(&self) -> String {
        match self {
            Self::Rejected(rejection) => rejection.to_string(),
            Self::Timeout(limit) => format!("The query did not finish within {limit:?}."),
            Self::Connection(_) | Self::Query(_) => {
                "The query could not be executed.".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Result type alias using DigiflowError.
pub type Result<T> = std::result::Result<T, DigiflowError>;
