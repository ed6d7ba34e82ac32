//! Persistence layer for DigiFlow.
//!
//! Manages the local SQLite project store: projects with their requirements
//! and digitalization proposals, always scoped to one owner.

mod migrations;
mod models;
mod projects;
mod proposals;
mod requirements;

pub use models::{
    NewProject, NewProposal, NewRequirement, OwnerId, Page, Priority, Project, ProjectQuery,
    ProjectStatus, Proposal, ProposalKind, Requirement, RequirementStatus,
};

use crate::error::{DigiflowError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

const MAX_RETRY_ATTEMPTS: u32 = 3;
const RETRY_DELAY_MS: u64 = 100;

/// Tenant-scoped access to projects, requirements and proposals.
#[derive(Debug, Clone)]
pub struct ProjectStore {
    pool: SqlitePool,
    db_path: Option<PathBuf>,
}

impl ProjectStore {
    /// Opens or creates the store at the specified path.
    pub async fn open(path: &Path) -> Result<Self> {
        Self::ensure_parent_dirs(path)?;

        let mut last_error = None;
        for attempt in 0..MAX_RETRY_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS * 2u64.pow(attempt)))
                    .await;
            }

            match Self::connect(path).await {
                Ok(pool) => {
                    migrations::run_migrations(&pool).await?;
                    info!("Project store opened at {}", path.display());
                    return Ok(Self {
                        pool,
                        db_path: Some(path.to_path_buf()),
                    });
                }
                Err(e) => {
                    warn!("Opening project store failed (attempt {}): {e}", attempt + 1);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            DigiflowError::persistence("Failed to open project store after retries")
        }))
    }

    /// Opens a private in-memory store. Everything is lost on close.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| DigiflowError::persistence(format!("Invalid database URL: {e}")))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| DigiflowError::persistence(format!("Failed to open in-memory store: {e}")))?;

        migrations::run_migrations(&pool).await?;
        Ok(Self {
            pool,
            db_path: None,
        })
    }

    async fn connect(path: &Path) -> Result<SqlitePool> {
        let conn_str = format!("sqlite:{}?mode=rwc", path.display());
        let options = SqliteConnectOptions::from_str(&conn_str)
            .map_err(|e| DigiflowError::persistence(format!("Invalid database path: {e}")))?
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true)
            .create_if_missing(true);

        SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| {
                DigiflowError::persistence(format!("Failed to connect to project store: {e}"))
            })
    }

    fn ensure_parent_dirs(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                DigiflowError::persistence(format!(
                    "Failed to create directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        Ok(())
    }

    /// Returns the file backing the store, if any.
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Closes the database connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn list_projects(&self, owner: &OwnerId) -> Result<Vec<Project>> {
        projects::list_projects(&self.pool, owner).await
    }

    pub async fn get_project(&self, id: i64, owner: &OwnerId) -> Result<Option<Project>> {
        projects::get_project(&self.pool, id, owner).await
    }

    pub async fn create_project(&self, project: &NewProject, owner: &OwnerId) -> Result<Project> {
        projects::create_project(&self.pool, project, owner).await
    }

    pub async fn update_project(
        &self,
        id: i64,
        project: &NewProject,
        owner: &OwnerId,
    ) -> Result<Project> {
        projects::update_project(&self.pool, id, project, owner).await
    }

    pub async fn delete_project(&self, id: i64, owner: &OwnerId) -> Result<bool> {
        projects::delete_project(&self.pool, id, owner).await
    }

    pub async fn projects_by_status(
        &self,
        status: ProjectStatus,
        owner: &OwnerId,
    ) -> Result<Vec<Project>> {
        projects::projects_by_status(&self.pool, status, owner).await
    }

    pub async fn search_projects(&self, term: &str, owner: &OwnerId) -> Result<Vec<Project>> {
        projects::search_projects(&self.pool, term, owner).await
    }

    pub async fn create_projects_batch(
        &self,
        batch: &[NewProject],
        owner: &OwnerId,
    ) -> Result<Vec<Project>> {
        projects::create_projects_batch(&self.pool, batch, owner).await
    }

    pub async fn list_projects_paginated(
        &self,
        owner: &OwnerId,
        query: &ProjectQuery,
    ) -> Result<Page<Project>> {
        projects::list_projects_paginated(&self.pool, owner, query).await
    }

    pub async fn add_requirement(
        &self,
        project_id: i64,
        requirement: &NewRequirement,
        owner: &OwnerId,
    ) -> Result<Requirement> {
        requirements::add_requirement(&self.pool, project_id, requirement, owner).await
    }

    pub async fn update_requirement_status(
        &self,
        id: i64,
        status: RequirementStatus,
        owner: &OwnerId,
    ) -> Result<()> {
        requirements::update_requirement_status(&self.pool, id, status, owner).await
    }

    pub async fn delete_requirement(&self, id: i64, owner: &OwnerId) -> Result<bool> {
        requirements::delete_requirement(&self.pool, id, owner).await
    }

    pub async fn add_proposal(
        &self,
        project_id: i64,
        proposal: &NewProposal,
        owner: &OwnerId,
    ) -> Result<Proposal> {
        proposals::add_proposal(&self.pool, project_id, proposal, owner).await
    }

    pub async fn set_proposal_accepted(
        &self,
        id: i64,
        accepted: bool,
        owner: &OwnerId,
    ) -> Result<()> {
        proposals::set_proposal_accepted(&self.pool, id, accepted, owner).await
    }

    pub async fn delete_proposal(&self, id: i64, owner: &OwnerId) -> Result<bool> {
        proposals::delete_proposal(&self.pool, id, owner).await
    }
}
