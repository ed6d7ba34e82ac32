//! Requirement persistence.

use crate::error::{DigiflowError, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnection, SqlitePool};
use sqlx::FromRow;
use tracing::info;

use super::models::{NewRequirement, OwnerId, Priority, Requirement, RequirementStatus};
use super::projects;

/// Raw database row for a requirement.
#[derive(Debug, Clone, FromRow)]
struct RequirementRow {
    id: i64,
    project_id: i64,
    title: String,
    description: String,
    priority: String,
    status: String,
    author: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<RequirementRow> for Requirement {
    type Error = DigiflowError;

    fn try_from(row: RequirementRow) -> Result<Self> {
        let corrupt = |what: &str, value: &str| {
            DigiflowError::persistence(format!(
                "Requirement {} has unknown {what} '{value}'",
                row.id
            ))
        };
        let priority = row
            .priority
            .parse::<Priority>()
            .map_err(|_| corrupt("priority", &row.priority))?;
        let status = row
            .status
            .parse::<RequirementStatus>()
            .map_err(|_| corrupt("status", &row.status))?;

        Ok(Self {
            id: row.id,
            project_id: row.project_id,
            title: row.title,
            description: row.description,
            priority,
            status,
            author: row.author,
            created_at: row.created_at,
        })
    }
}

/// Lists the requirements of a project, oldest first.
pub(crate) async fn list_for_project(pool: &SqlitePool, project_id: i64) -> Result<Vec<Requirement>> {
    let rows: Vec<RequirementRow> = sqlx::query_as(
        r#"
        SELECT id, project_id, title, description, priority, status, author, created_at
        FROM requirements
        WHERE project_id = ?
        ORDER BY id
        "#,
    )
    .bind(project_id)
    .fetch_all(pool)
    .await
    .map_err(|e| DigiflowError::persistence(format!("Failed to list requirements: {e}")))?;

    rows.into_iter().map(Requirement::try_from).collect()
}

pub(crate) async fn insert_requirement(
    conn: &mut SqliteConnection,
    project_id: i64,
    requirement: &NewRequirement,
    created_at: DateTime<Utc>,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO requirements (project_id, title, description, priority, status, author, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(project_id)
    .bind(&requirement.title)
    .bind(&requirement.description)
    .bind(requirement.priority.as_str())
    .bind(requirement.status.as_str())
    .bind(&requirement.author)
    .bind(created_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| DigiflowError::persistence(format!("Failed to create requirement: {e}")))?;

    Ok(result.last_insert_rowid())
}

/// Adds a requirement to a project owned by `owner`.
pub async fn add_requirement(
    pool: &SqlitePool,
    project_id: i64,
    requirement: &NewRequirement,
    owner: &OwnerId,
) -> Result<Requirement> {
    requirement.validate()?;
    if !projects::is_owned(pool, project_id, owner).await? {
        return Err(DigiflowError::not_found(format!(
            "Project {project_id} was not found"
        )));
    }

    let mut conn = pool
        .acquire()
        .await
        .map_err(|e| DigiflowError::persistence(format!("Failed to acquire connection: {e}")))?;
    let id = insert_requirement(&mut *conn, project_id, requirement, Utc::now()).await?;
    drop(conn);
    info!("Added requirement {id} to project {project_id} for {owner}");

    list_for_project(pool, project_id)
        .await?
        .into_iter()
        .find(|r| r.id == id)
        .ok_or_else(|| DigiflowError::internal(format!("Requirement {id} vanished after write")))
}

/// Moves a requirement to a new status.
pub async fn update_requirement_status(
    pool: &SqlitePool,
    id: i64,
    status: RequirementStatus,
    owner: &OwnerId,
) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE requirements SET status = ?
        WHERE id = ? AND project_id IN (SELECT id FROM projects WHERE owner_id = ?)
        "#,
    )
    .bind(status.as_str())
    .bind(id)
    .bind(owner.as_str())
    .execute(pool)
    .await
    .map_err(|e| DigiflowError::persistence(format!("Failed to update requirement: {e}")))?;

    if result.rows_affected() == 0 {
        return Err(DigiflowError::not_found(format!("Requirement {id} was not found")));
    }
    info!("Requirement {id} is now {status} ({owner})");
    Ok(())
}

/// Deletes a requirement. Returns false if `owner` has no such requirement.
pub async fn delete_requirement(pool: &SqlitePool, id: i64, owner: &OwnerId) -> Result<bool> {
    let result = sqlx::query(
        "DELETE FROM requirements \
         WHERE id = ? AND project_id IN (SELECT id FROM projects WHERE owner_id = ?)",
    )
    .bind(id)
    .bind(owner.as_str())
    .execute(pool)
    .await
    .map_err(|e| DigiflowError::persistence(format!("Failed to delete requirement: {e}")))?;

    Ok(result.rows_affected() > 0)
}
