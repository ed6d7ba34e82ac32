//! Read-only query guard.
//!
//! Decides from SQL text alone whether a statement may run against the
//! database as a read-only query. The guard is a denylist-over-prefix
//! classifier, not a SQL parser: it accepts statements that start with
//! `SELECT` once leading comments are removed and that contain none of the
//! forbidden keywords anywhere in the original text.

mod guard;

pub use guard::ReadOnlyQueryGuard;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Keywords whose whole-word presence anywhere in a query causes rejection.
pub const DEFAULT_FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "TRUNCATE", "CREATE", "EXEC", "EXECUTE",
    "MERGE", "GRANT", "REVOKE", "DENY", "BACKUP", "RESTORE", "SHUTDOWN", "DBCC", "SP_", "XP_",
    "INTO",
];

/// Reason a statement was refused by the guard.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryRejection {
    /// Empty or whitespace-only input.
    #[error("SQL query must not be empty.")]
    EmptyQuery,

    /// The statement does not begin with SELECT once comments are stripped.
    #[error(
        "Only SELECT queries are allowed. Data-modifying operations are blocked for security reasons."
    )]
    NotASelect,

    /// A denylisted keyword was found in the original text.
    #[error(
        "The use of '{0}' is not allowed for security reasons. Only read-only SELECT queries are permitted."
    )]
    ForbiddenKeyword(String),
}

impl QueryRejection {
    /// Short machine-friendly name of the rejection kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyQuery => "empty_query",
            Self::NotASelect => "not_a_select",
            Self::ForbiddenKeyword(_) => "forbidden_keyword",
        }
    }
}

/// SQL text that passed every guard check.
///
/// Holds the caller's input byte for byte, comments included. It can only
/// be produced by [`ReadOnlyQueryGuard::validate`], so an executor that
/// accepts `&ApprovedSql` cannot be handed unchecked text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovedSql(String);

impl ApprovedSql {
    pub(crate) fn new(sql: &str) -> Self {
        Self(sql.to_string())
    }

    /// Returns the approved statement.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the wrapper, returning the approved statement.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for ApprovedSql {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApprovedSql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Denylist configuration for the guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardPolicy {
    /// Keywords matched case-insensitively on word boundaries, in order.
    pub forbidden_keywords: Vec<String>,
}

impl GuardPolicy {
    /// Creates a policy with a custom denylist.
    pub fn with_keywords<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            forbidden_keywords: keywords.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for GuardPolicy {
    fn default() -> Self {
        Self::with_keywords(DEFAULT_FORBIDDEN_KEYWORDS.iter().copied())
    }
}
