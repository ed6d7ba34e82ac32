//! Digitalization proposal persistence.

use crate::error::{DigiflowError, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnection, SqlitePool};
use sqlx::FromRow;
use tracing::info;

use super::models::{NewProposal, OwnerId, Proposal, ProposalKind};
use super::projects;

#[derive(Debug, Clone, FromRow)]
struct ProposalRow {
    id: i64,
    project_id: i64,
    title: String,
    description: String,
    kind: String,
    rationale: String,
    created_at: DateTime<Utc>,
    accepted: bool,
}

impl TryFrom<ProposalRow> for Proposal {
    type Error = DigiflowError;

    fn try_from(row: ProposalRow) -> Result<Self> {
        let kind = row.kind.parse::<ProposalKind>().map_err(|_| {
            DigiflowError::persistence(format!(
                "Proposal {} has unknown kind '{}'",
                row.id, row.kind
            ))
        })?;

        Ok(Self {
            id: row.id,
            project_id: row.project_id,
            title: row.title,
            description: row.description,
            kind,
            rationale: row.rationale,
            created_at: row.created_at,
            accepted: row.accepted,
        })
    }
}

/// Lists the proposals of a project, oldest first.
pub(crate) async fn list_for_project(pool: &SqlitePool, project_id: i64) -> Result<Vec<Proposal>> {
    let rows: Vec<ProposalRow> = sqlx::query_as(
        r#"
        SELECT id, project_id, title, description, kind, rationale, created_at, accepted
        FROM proposals
        WHERE project_id = ?
        ORDER BY id
        "#,
    )
    .bind(project_id)
    .fetch_all(pool)
    .await
    .map_err(|e| DigiflowError::persistence(format!("Failed to list proposals: {e}")))?;

    rows.into_iter().map(Proposal::try_from).collect()
}

pub(crate) async fn insert_proposal(
    conn: &mut SqliteConnection,
    project_id: i64,
    proposal: &NewProposal,
    created_at: DateTime<Utc>,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO proposals (project_id, title, description, kind, rationale, created_at, accepted)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(project_id)
    .bind(&proposal.title)
    .bind(&proposal.description)
    .bind(proposal.kind.as_str())
    .bind(&proposal.rationale)
    .bind(created_at)
    .bind(proposal.accepted)
    .execute(&mut *conn)
    .await
    .map_err(|e| DigiflowError::persistence(format!("Failed to create proposal: {e}")))?;

    Ok(result.last_insert_rowid())
}

/// Adds a proposal to a project owned by `owner`.
pub async fn add_proposal(
    pool: &SqlitePool,
    project_id: i64,
    proposal: &NewProposal,
    owner: &OwnerId,
) -> Result<Proposal> {
    proposal.validate()?;
    if !projects::is_owned(pool, project_id, owner).await? {
        return Err(DigiflowError::not_found(format!(
            "Project {project_id} was not found"
        )));
    }

    let mut conn = pool
        .acquire()
        .await
        .map_err(|e| DigiflowError::persistence(format!("Failed to acquire connection: {e}")))?;
    let id = insert_proposal(&mut *conn, project_id, proposal, Utc::now()).await?;
    drop(conn);
    info!("Added proposal {id} to project {project_id} for {owner}");

    list_for_project(pool, project_id)
        .await?
        .into_iter()
        .find(|p| p.id == id)
        .ok_or_else(|| DigiflowError::internal(format!("Proposal {id} vanished after write")))
}

/// Marks a proposal as accepted or not.
pub async fn set_proposal_accepted(
    pool: &SqlitePool,
    id: i64,
    accepted: bool,
    owner: &OwnerId,
) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE proposals SET accepted = ?
        WHERE id = ? AND project_id IN (SELECT id FROM projects WHERE owner_id = ?)
        "#,
    )
    .bind(accepted)
    .bind(id)
    .bind(owner.as_str())
    .execute(pool)
    .await
    .map_err(|e| DigiflowError::persistence(format!("Failed to update proposal: {e}")))?;

    if result.rows_affected() == 0 {
        return Err(DigiflowError::not_found(format!("Proposal {id} was not found")));
    }
    info!("Proposal {id} accepted={accepted} ({owner})");
    Ok(())
}

/// Deletes a proposal. Returns false if `owner` has no such proposal.
pub async fn delete_proposal(pool: &SqlitePool, id: i64, owner: &OwnerId) -> Result<bool> {
    let result = sqlx::query(
        "DELETE FROM proposals \
         WHERE id = ? AND project_id IN (SELECT id FROM projects WHERE owner_id = ?)",
    )
    .bind(id)
    .bind(owner.as_str())
    .execute(pool)
    .await
    .map_err(|e| DigiflowError::persistence(format!("Failed to delete proposal: {e}")))?;

    Ok(result.rows_affected() > 0)
}
