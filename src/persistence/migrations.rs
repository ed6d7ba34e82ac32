//! Schema versioning and migrations for the project store.
//!
//! Manages database schema evolution with forward-only migrations.

use crate::error::{DigiflowError, Result};
use sqlx::sqlite::SqlitePool;
use tracing::info;

const CURRENT_VERSION: i32 = 2;

/// Runs all pending migrations on the database.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    ensure_schema_versions_table(pool).await?;

    let current = get_current_version(pool).await?;

    if current > CURRENT_VERSION {
        return Err(DigiflowError::persistence(format!(
            "Database schema version ({current}) is newer than supported version \
             ({CURRENT_VERSION}). Please upgrade DigiFlow."
        )));
    }

    if current < CURRENT_VERSION {
        info!("Migrating project store from version {current} to {CURRENT_VERSION}");
        for version in (current + 1)..=CURRENT_VERSION {
            run_migration(pool, version).await?;
            record_version(pool, version).await?;
            info!("Applied migration v{version}");
        }
    }

    Ok(())
}

async fn ensure_schema_versions_table(pool: &SqlitePool) -> Result<()> {
    execute(
        pool,
        r#"
        CREATE TABLE IF NOT EXISTS schema_versions (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
        "create schema_versions table",
    )
    .await
}

async fn get_current_version(pool: &SqlitePool) -> Result<i32> {
    let row: Option<(Option<i32>,)> = sqlx::query_as("SELECT MAX(version) FROM schema_versions")
        .fetch_optional(pool)
        .await
        .map_err(|e| DigiflowError::persistence(format!("Failed to get schema version: {e}")))?;

    Ok(row.and_then(|(v,)| v).unwrap_or(0))
}

async fn record_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT INTO schema_versions (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await
        .map_err(|e| DigiflowError::persistence(format!("Failed to record migration: {e}")))?;
    Ok(())
}

async fn run_migration(pool: &SqlitePool, version: i32) -> Result<()> {
    match version {
        1 => migration_v1(pool).await,
        2 => migration_v2(pool).await,
        _ => Err(DigiflowError::persistence(format!(
            "Unknown migration version: {version}"
        ))),
    }
}

async fn execute(pool: &SqlitePool, sql: &str, what: &str) -> Result<()> {
    sqlx::query(sql)
        .execute(pool)
        .await
        .map_err(|e| DigiflowError::persistence(format!("Failed to {what}: {e}")))?;
    Ok(())
}

/// Migration v1: projects with their requirements and proposals.
async fn migration_v1(pool: &SqlitePool) -> Result<()> {
    execute(
        pool,
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'Planned',
            technology TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            completed_at TEXT,
            responsible TEXT NOT NULL,
            owner_id TEXT NOT NULL
        )
        "#,
        "create projects table",
    )
    .await?;

    execute(
        pool,
        r#"
        CREATE TABLE IF NOT EXISTS requirements (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            priority TEXT NOT NULL DEFAULT 'Medium',
            status TEXT NOT NULL DEFAULT 'Open',
            author TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
        )
        "#,
        "create requirements table",
    )
    .await?;

    execute(
        pool,
        r#"
        CREATE TABLE IF NOT EXISTS proposals (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            kind TEXT NOT NULL DEFAULT 'InHouse',
            rationale TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            accepted INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
        )
        "#,
        "create proposals table",
    )
    .await
}

/// Migration v2: lookup indexes for owner scoping and child loading.
async fn migration_v2(pool: &SqlitePool) -> Result<()> {
    execute(
        pool,
        "CREATE INDEX IF NOT EXISTS idx_projects_owner ON projects(owner_id, created_at)",
        "create projects index",
    )
    .await?;
    execute(
        pool,
        "CREATE INDEX IF NOT EXISTS idx_requirements_project ON requirements(project_id)",
        "create requirements index",
    )
    .await?;
    execute(
        pool,
        "CREATE INDEX IF NOT EXISTS idx_proposals_project ON proposals(project_id)",
        "create proposals index",
    )
    .await
}
