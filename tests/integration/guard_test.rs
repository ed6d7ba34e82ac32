//! Read-only guard integration tests.
//!
//! Exercises the guard through the public API only.

use digiflow::safety::{GuardPolicy, QueryRejection, ReadOnlyQueryGuard};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn verdict(sql: &str) -> Result<String, QueryRejection> {
    ReadOnlyQueryGuard::default()
        .validate(sql)
        .map(|approved| approved.into_inner())
}

fn forbidden(keyword: &str) -> Result<String, QueryRejection> {
    Err(QueryRejection::ForbiddenKeyword(keyword.to_string()))
}

#[test]
fn test_documented_scenarios() {
    assert_eq!(
        verdict("SELECT 1 AS TestValue"),
        Ok("SELECT 1 AS TestValue".to_string())
    );
    assert_eq!(verdict("DROP TABLE Projects"), Err(QueryRejection::NotASelect));
    assert_eq!(verdict("DELETE FROM Projects"), Err(QueryRejection::NotASelect));
    assert_eq!(
        verdict("-- comment\nDROP TABLE Projects"),
        Err(QueryRejection::NotASelect)
    );
    assert_eq!(
        verdict("SELECT * INTO NewTable FROM Projects"),
        forbidden("INTO")
    );
    assert_eq!(
        verdict("EXEC sp_executesql N'DROP TABLE Projects'"),
        Err(QueryRejection::NotASelect)
    );
}

#[test]
fn test_blank_input_is_empty_query() {
    for sql in ["", "   ", "\n\t  \r\n"] {
        assert_eq!(verdict(sql), Err(QueryRejection::EmptyQuery), "input {sql:?}");
    }
}

#[test]
fn test_approved_text_keeps_comments_and_whitespace() {
    let sql = "  /* monthly report */\n-- owner: ops\nSELECT Title FROM Projects  \n";
    assert_eq!(verdict(sql), Ok(sql.to_string()));
}

#[test]
fn test_prefix_is_case_insensitive() {
    assert!(verdict("select id from projects").is_ok());
    assert!(verdict("SeLeCt 1").is_ok());
}

#[test]
fn test_prefix_check_runs_before_keyword_scan() {
    // Both checks would fail; the prefix check wins.
    assert_eq!(
        verdict("INSERT INTO Projects (Title) VALUES ('x')"),
        Err(QueryRejection::NotASelect)
    );
    assert_eq!(
        verdict("UPDATE Projects SET Title = 'x'"),
        Err(QueryRejection::NotASelect)
    );
}

#[test]
fn test_statement_hidden_behind_comments_is_not_a_select() {
    assert_eq!(
        verdict("/* SELECT */ DROP TABLE Projects"),
        Err(QueryRejection::NotASelect)
    );
    assert_eq!(
        verdict("-- SELECT\n-- SELECT\nTRUNCATE TABLE Projects"),
        Err(QueryRejection::NotASelect)
    );
}

#[test]
fn test_mixed_leading_comments_are_stripped() {
    assert!(verdict("-- first\n/* second\n spans lines */\nSELECT 1").is_ok());
}

#[test]
fn test_keyword_inside_comment_still_rejects() {
    assert_eq!(verdict("SELECT 1 -- then DROP everything"), forbidden("DROP"));
    assert_eq!(verdict("SELECT /* delete later */ 1"), forbidden("DELETE"));
}

#[test]
fn test_keyword_inside_string_literal_rejects() {
    assert_eq!(
        verdict("SELECT * FROM Projects WHERE Title = 'How to update'"),
        forbidden("UPDATE")
    );
}

#[test]
fn test_keywords_match_whole_words_only() {
    assert!(verdict("SELECT created_at, updated_by FROM Projects").is_ok());
    assert!(verdict("SELECT Id FROM Projects WHERE Description LIKE '%intonation%'").is_ok());
    assert!(verdict("SELECT executed FROM Jobs").is_ok());
}

#[test]
fn test_procedure_prefixes_match_whole_words_only() {
    assert_eq!(verdict("SELECT sp_ FROM t"), forbidden("SP_"));
    assert!(verdict("SELECT * FROM sp_who").is_ok());
    assert!(verdict("SELECT xp_cmdshell_flag FROM Settings").is_ok());
}

#[test]
fn test_first_keyword_in_denylist_order_is_reported() {
    assert_eq!(
        verdict("SELECT 1; DELETE FROM a; INSERT INTO b VALUES (1)"),
        forbidden("INSERT")
    );
}

#[test]
fn test_stacked_statement_is_rejected() {
    assert_eq!(verdict("SELECT 1; DROP TABLE Projects"), forbidden("DROP"));
    assert_eq!(verdict("SELECT 1; shutdown"), forbidden("SHUTDOWN"));
}

#[test]
fn test_validation_is_idempotent() {
    let guard = ReadOnlyQueryGuard::default();
    for sql in ["SELECT 1", "DROP TABLE x", "SELECT * INTO y FROM x", ""] {
        assert_eq!(guard.validate(sql), guard.validate(sql));
    }
}

#[test]
fn test_custom_policy() {
    let guard = ReadOnlyQueryGuard::new(&GuardPolicy::with_keywords(["pragma"])).unwrap();

    assert!(guard.validate("SELECT * INTO NewTable FROM Projects").is_ok());
    assert_eq!(
        guard.validate("SELECT 1; PRAGMA writable_schema = ON"),
        Err(QueryRejection::ForbiddenKeyword("PRAGMA".to_string()))
    );
    assert_eq!(guard.forbidden_keywords().collect::<Vec<_>>(), vec!["PRAGMA"]);
}

#[test]
fn test_empty_keyword_in_policy_is_config_error() {
    let err = ReadOnlyQueryGuard::new(&GuardPolicy::with_keywords(["DROP", "  "])).unwrap_err();
    assert_eq!(err.category(), "Configuration Error");
}

#[test]
fn test_guard_is_shareable_across_threads() {
    let guard = Arc::new(ReadOnlyQueryGuard::default());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let guard = Arc::clone(&guard);
            std::thread::spawn(move || {
                let sql = if i % 2 == 0 {
                    format!("SELECT {i}")
                } else {
                    format!("DELETE FROM t{i}")
                };
                (i, guard.validate(&sql).is_ok())
            })
        })
        .collect();

    for handle in handles {
        let (i, approved) = handle.join().unwrap();
        assert_eq!(approved, i % 2 == 0);
    }
}
