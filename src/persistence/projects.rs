//! Project persistence.
//!
//! Every query is filtered by owner: a project belonging to someone else
//! behaves exactly like one that does not exist.

use crate::error::{DigiflowError, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnection, SqlitePool};
use sqlx::FromRow;
use tracing::{debug, info, warn};

use super::models::{NewProject, OwnerId, Page, Project, ProjectQuery, ProjectStatus};
use super::{proposals, requirements};

/// Raw database row for a project (without children).
#[derive(Debug, Clone, FromRow)]
struct ProjectRow {
    id: i64,
    title: String,
    description: String,
    status: String,
    technology: String,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    responsible: String,
    owner_id: String,
}

const PROJECT_COLUMNS: &str = "id, title, description, status, technology, \
                               created_at, completed_at, responsible, owner_id";

/// Optional narrowing applied on top of the owner filter.
#[derive(Debug, Default)]
struct ProjectFilter<'a> {
    status: Option<ProjectStatus>,
    search: Option<&'a str>,
}

impl ProjectFilter<'_> {
    /// Builds the WHERE clause and its bindings, in placeholder order.
    fn where_clause(&self, owner: &OwnerId) -> (String, Vec<String>) {
        let mut conditions = vec!["owner_id = ?".to_string()];
        let mut bindings = vec![owner.as_str().to_string()];

        if let Some(status) = self.status {
            conditions.push("status = ?".to_string());
            bindings.push(status.as_str().to_string());
        }

        if let Some(term) = self.search.map(str::trim).filter(|t| !t.is_empty()) {
            conditions.push(
                "(title LIKE ? ESCAPE '\\' OR description LIKE ? ESCAPE '\\' \
                 OR technology LIKE ? ESCAPE '\\' OR responsible LIKE ? ESCAPE '\\')"
                    .to_string(),
            );
            let pattern = format!("%{}%", escape_like(term));
            bindings.extend(std::iter::repeat(pattern).take(4));
        }

        (conditions.join(" AND "), bindings)
    }
}

/// Escapes LIKE wildcards so the term matches literally.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

async fn fetch_rows(
    pool: &SqlitePool,
    owner: &OwnerId,
    filter: &ProjectFilter<'_>,
    paging: Option<(i64, i64)>,
) -> Result<Vec<Project>> {
    let (where_clause, bindings) = filter.where_clause(owner);
    let limit = paging
        .map(|(limit, offset)| format!("LIMIT {limit} OFFSET {offset}"))
        .unwrap_or_default();
    let query = format!(
        "SELECT {PROJECT_COLUMNS} FROM projects WHERE {where_clause} \
         ORDER BY created_at DESC, id DESC {limit}"
    );

    let mut sqlx_query = sqlx::query_as::<_, ProjectRow>(&query);
    for binding in &bindings {
        sqlx_query = sqlx_query.bind(binding);
    }

    let rows = sqlx_query
        .fetch_all(pool)
        .await
        .map_err(|e| DigiflowError::persistence(format!("Failed to list projects: {e}")))?;

    let mut projects = Vec::with_capacity(rows.len());
    for row in rows {
        projects.push(load_children(pool, row).await?);
    }
    Ok(projects)
}

async fn count_rows(pool: &SqlitePool, owner: &OwnerId, filter: &ProjectFilter<'_>) -> Result<u64> {
    let (where_clause, bindings) = filter.where_clause(owner);
    let query = format!("SELECT COUNT(*) FROM projects WHERE {where_clause}");

    let mut sqlx_query = sqlx::query_as::<_, (i64,)>(&query);
    for binding in &bindings {
        sqlx_query = sqlx_query.bind(binding);
    }

    let (count,) = sqlx_query
        .fetch_one(pool)
        .await
        .map_err(|e| DigiflowError::persistence(format!("Failed to count projects: {e}")))?;

    Ok(count.max(0) as u64)
}

async fn load_children(pool: &SqlitePool, row: ProjectRow) -> Result<Project> {
    let requirements = requirements::list_for_project(pool, row.id).await?;
    let proposals = proposals::list_for_project(pool, row.id).await?;
    let status = row.status.parse::<ProjectStatus>().map_err(|_| {
        DigiflowError::persistence(format!(
            "Project {} has unknown status '{}'",
            row.id, row.status
        ))
    })?;

    Ok(Project {
        id: row.id,
        title: row.title,
        description: row.description,
        status,
        technology: row.technology,
        created_at: row.created_at,
        completed_at: row.completed_at,
        responsible: row.responsible,
        owner_id: OwnerId::new(row.owner_id),
        requirements,
        proposals,
    })
}

/// Inserts a project and its children on an open connection.
async fn insert_project(
    conn: &mut SqliteConnection,
    project: &NewProject,
    owner: &OwnerId,
    created_at: DateTime<Utc>,
) -> Result<i64> {
    let id = sqlx::query(
        r#"
        INSERT INTO projects
            (title, description, status, technology, created_at, completed_at, responsible, owner_id)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&project.title)
    .bind(&project.description)
    .bind(project.status.as_str())
    .bind(&project.technology)
    .bind(created_at)
    .bind(project.completed_at)
    .bind(&project.responsible)
    .bind(owner.as_str())
    .execute(&mut *conn)
    .await
    .map_err(|e| DigiflowError::persistence(format!("Failed to create project: {e}")))?
    .last_insert_rowid();

    for requirement in &project.requirements {
        requirements::insert_requirement(&mut *conn, id, requirement, created_at).await?;
    }
    for proposal in &project.proposals {
        proposals::insert_proposal(&mut *conn, id, proposal, created_at).await?;
    }

    Ok(id)
}

/// Returns true if `owner` owns project `id`.
pub(crate) async fn is_owned(pool: &SqlitePool, id: i64, owner: &OwnerId) -> Result<bool> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM projects WHERE id = ? AND owner_id = ?")
        .bind(id)
        .bind(owner.as_str())
        .fetch_optional(pool)
        .await
        .map_err(|e| DigiflowError::persistence(format!("Failed to look up project: {e}")))?;
    Ok(row.is_some())
}

/// Lists all projects of `owner`, newest first.
pub async fn list_projects(pool: &SqlitePool, owner: &OwnerId) -> Result<Vec<Project>> {
    debug!("Loading all projects for {owner}");
    fetch_rows(pool, owner, &ProjectFilter::default(), None).await
}

/// Gets a project by ID.
pub async fn get_project(pool: &SqlitePool, id: i64, owner: &OwnerId) -> Result<Option<Project>> {
    debug!("Loading project {id} for {owner}");
    let row: Option<ProjectRow> = sqlx::query_as(&format!(
        "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ? AND owner_id = ?"
    ))
    .bind(id)
    .bind(owner.as_str())
    .fetch_optional(pool)
    .await
    .map_err(|e| DigiflowError::persistence(format!("Failed to get project: {e}")))?;

    match row {
        Some(row) => Ok(Some(load_children(pool, row).await?)),
        None => Ok(None),
    }
}

/// Creates a project, stamping the creation time and the owner.
pub async fn create_project(
    pool: &SqlitePool,
    project: &NewProject,
    owner: &OwnerId,
) -> Result<Project> {
    project.validate()?;

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| DigiflowError::persistence(format!("Failed to begin transaction: {e}")))?;
    let id = insert_project(&mut *tx, project, owner, Utc::now()).await?;
    tx.commit()
        .await
        .map_err(|e| DigiflowError::persistence(format!("Failed to commit project: {e}")))?;

    info!("Created project '{}' (id {id}) for {owner}", project.title);
    reload(pool, id, owner).await
}

/// Replaces the editable fields of a project.
///
/// Requirements and proposals are left untouched.
pub async fn update_project(
    pool: &SqlitePool,
    id: i64,
    project: &NewProject,
    owner: &OwnerId,
) -> Result<Project> {
    project.validate()?;

    let result = sqlx::query(
        r#"
        UPDATE projects
        SET title = ?, description = ?, status = ?, technology = ?,
            responsible = ?, completed_at = ?
        WHERE id = ? AND owner_id = ?
        "#,
    )
    .bind(&project.title)
    .bind(&project.description)
    .bind(project.status.as_str())
    .bind(&project.technology)
    .bind(&project.responsible)
    .bind(project.completed_at)
    .bind(id)
    .bind(owner.as_str())
    .execute(pool)
    .await
    .map_err(|e| DigiflowError::persistence(format!("Failed to update project: {e}")))?;

    if result.rows_affected() == 0 {
        warn!("Project {id} not found for {owner}");
        return Err(DigiflowError::not_found(format!("Project {id} was not found")));
    }

    info!("Updated project '{}' (id {id}) for {owner}", project.title);
    reload(pool, id, owner).await
}

/// Deletes a project with its requirements and proposals.
///
/// Returns false if no such project belongs to `owner`.
pub async fn delete_project(pool: &SqlitePool, id: i64, owner: &OwnerId) -> Result<bool> {
    let result = sqlx::query("DELETE FROM projects WHERE id = ? AND owner_id = ?")
        .bind(id)
        .bind(owner.as_str())
        .execute(pool)
        .await
        .map_err(|e| DigiflowError::persistence(format!("Failed to delete project: {e}")))?;

    if result.rows_affected() == 0 {
        warn!("Project {id} not found for deletion ({owner})");
        return Ok(false);
    }

    info!("Deleted project {id} for {owner}");
    Ok(true)
}

/// Lists the projects of `owner` with the given status, newest first.
pub async fn projects_by_status(
    pool: &SqlitePool,
    status: ProjectStatus,
    owner: &OwnerId,
) -> Result<Vec<Project>> {
    debug!("Loading {status} projects for {owner}");
    let filter = ProjectFilter {
        status: Some(status),
        search: None,
    };
    fetch_rows(pool, owner, &filter, None).await
}

/// Searches title, description, technology and responsible.
///
/// A blank term returns every project of `owner`.
pub async fn search_projects(pool: &SqlitePool, term: &str, owner: &OwnerId) -> Result<Vec<Project>> {
    debug!("Searching projects for '{term}' ({owner})");
    let filter = ProjectFilter {
        status: None,
        search: Some(term),
    };
    fetch_rows(pool, owner, &filter, None).await
}

/// Creates several projects in one transaction. Either all are stored or none.
pub async fn create_projects_batch(
    pool: &SqlitePool,
    projects: &[NewProject],
    owner: &OwnerId,
) -> Result<Vec<Project>> {
    for (index, project) in projects.iter().enumerate() {
        project.validate().map_err(|e| match e {
            DigiflowError::Validation(msg) => {
                DigiflowError::validation(format!("project {}: {msg}", index + 1))
            }
            other => other,
        })?;
    }

    let now = Utc::now();
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| DigiflowError::persistence(format!("Failed to begin transaction: {e}")))?;
    let mut ids = Vec::with_capacity(projects.len());
    for project in projects {
        ids.push(insert_project(&mut *tx, project, owner, now).await?);
    }
    tx.commit()
        .await
        .map_err(|e| DigiflowError::persistence(format!("Failed to commit batch: {e}")))?;

    info!("Created {} projects by batch for {owner}", ids.len());

    let mut created = Vec::with_capacity(ids.len());
    for id in ids {
        created.push(reload(pool, id, owner).await?);
    }
    Ok(created)
}

/// Returns one page of projects, optionally filtered by status and search term.
pub async fn list_projects_paginated(
    pool: &SqlitePool,
    owner: &OwnerId,
    query: &ProjectQuery,
) -> Result<Page<Project>> {
    let page = query.page.max(1);
    let page_size = query.page_size.max(1);
    debug!("Loading page {page} (size {page_size}) of projects for {owner}");

    let filter = ProjectFilter {
        status: query.status,
        search: query.search.as_deref(),
    };

    let total_count = count_rows(pool, owner, &filter).await?;
    let offset = (i64::from(page) - 1) * i64::from(page_size);
    let items = fetch_rows(pool, owner, &filter, Some((i64::from(page_size), offset))).await?;

    Ok(Page {
        items,
        total_count,
        page,
        page_size,
    })
}

async fn reload(pool: &SqlitePool, id: i64, owner: &OwnerId) -> Result<Project> {
    get_project(pool, id, owner)
        .await?
        .ok_or_else(|| DigiflowError::internal(format!("Project {id} vanished after write")))
}
