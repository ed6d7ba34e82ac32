//! Comment stripping, prefix check and keyword scan.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{DigiflowError, Result};

use super::{ApprovedSql, GuardPolicy, QueryRejection};

/// Whole lines whose first non-blank characters are `--`.
static LINE_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*--.*$").expect("line comment pattern is valid"));

/// `/* ... */`, shortest match, spanning newlines.
static BLOCK_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("block comment pattern is valid"));

const SELECT_PREFIX: &str = "SELECT";

/// Validates SQL text as a read-only SELECT statement.
///
/// Checks run in a fixed order and the first failure wins:
///
/// 1. empty or whitespace-only input is [`QueryRejection::EmptyQuery`];
/// 2. line and block comments are stripped from a scratch copy;
/// 3. the scratch copy must start with `SELECT` (any case), otherwise
///    [`QueryRejection::NotASelect`];
/// 4. the *original* text is scanned for every denylisted keyword as a whole
///    word, so keywords hidden in comments still reject, giving
///    [`QueryRejection::ForbiddenKeyword`].
///
/// The guard never rewrites the statement: an approved query is the input
/// exactly as given.
#[derive(Debug, Clone)]
pub struct ReadOnlyQueryGuard {
    keywords: Vec<(String, Regex)>,
}

impl ReadOnlyQueryGuard {
    /// Builds a guard for the given denylist.
    pub fn new(policy: &GuardPolicy) -> Result<Self> {
        let mut keywords = Vec::with_capacity(policy.forbidden_keywords.len());

        for keyword in &policy.forbidden_keywords {
            let keyword = keyword.trim().to_uppercase();
            if keyword.is_empty() {
                return Err(DigiflowError::config(
                    "Forbidden keyword list contains an empty entry",
                ));
            }

            let pattern = Regex::new(&format!(r"\b{}\b", regex::escape(&keyword))).map_err(
                |e| DigiflowError::config(format!("Invalid forbidden keyword '{keyword}': {e}")),
            )?;
            keywords.push((keyword, pattern));
        }

        Ok(Self { keywords })
    }

    /// Returns the denylist in scan order.
    pub fn forbidden_keywords(&self) -> impl Iterator<Item = &str> {
        self.keywords.iter().map(|(keyword, _)| keyword.as_str())
    }

    /// Approves or rejects `sql` as a whole.
    pub fn validate(&self, sql: &str) -> std::result::Result<ApprovedSql, QueryRejection> {
        let trimmed = sql.trim();
        if trimmed.is_empty() {
            return Err(QueryRejection::EmptyQuery);
        }

        let cleaned = strip_comments(trimmed);
        if !starts_with_ignore_case(&cleaned, SELECT_PREFIX) {
            return Err(QueryRejection::NotASelect);
        }

        if let Some(keyword) = self.find_forbidden_keyword(sql) {
            return Err(QueryRejection::ForbiddenKeyword(keyword.to_string()));
        }

        Ok(ApprovedSql::new(sql))
    }

    /// Returns the first denylisted keyword present in `sql`, if any.
    fn find_forbidden_keyword(&self, sql: &str) -> Option<&str> {
        let upper = sql.to_uppercase();
        self.keywords
            .iter()
            .find(|(_, pattern)| pattern.is_match(&upper))
            .map(|(keyword, _)| keyword.as_str())
    }
}

impl Default for ReadOnlyQueryGuard {
    fn default() -> Self {
        Self::new(&GuardPolicy::default()).expect("default denylist compiles")
    }
}

/// Removes leading-line `--` comments, then `/* */` comments, trimming after each pass.
fn strip_comments(sql: &str) -> String {
    let without_lines = LINE_COMMENT.replace_all(sql, "");
    let without_lines = without_lines.trim();
    BLOCK_COMMENT
        .replace_all(without_lines, "")
        .trim()
        .to_string()
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}
