//! DigiFlow - project tracking with guarded read-only SQL access.

mod cli;

use cli::{Cli, Command, ProjectCommand};
use digiflow::config::Config;
use digiflow::db::{self, ColumnInfo, DatabaseClient, MockDatabaseClient, QueryResult, Row};
use digiflow::error::{DigiflowError, Result};
use digiflow::exchange::{self, render_result, ResultFormat};
use digiflow::logging;
use digiflow::persistence::{NewProject, OwnerId, Project, ProjectQuery, ProjectStore};
use digiflow::query::{QueryExecutor, QueryService};
use digiflow::safety::ReadOnlyQueryGuard;
use std::sync::Arc;
use tracing::{debug, info};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse_args();

    if cli.log_file {
        logging::init_file_logging();
    } else {
        logging::init_stderr_logging();
    }

    if let Err(e) = run(cli).await {
        debug!("{}: {}", e.category(), e);
        eprintln!("{}: {}", e.category(), e.public_message());
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let config = Config::load_from_file(&config_path)?;

    match &cli.command {
        Command::Check { sql } => check(&config, sql),
        Command::Query { sql, format } => query(&cli, &config, sql, *format).await,
        Command::Projects(command) => {
            let store = ProjectStore::open(cli.store_path(&config)).await?;
            let result = projects(&store, command, &cli.owner()).await;
            store.close().await;
            result
        }
        Command::Export { format, output } => {
            let store = ProjectStore::open(cli.store_path(&config)).await?;
            let projects = store.list_projects(&cli.owner()).await;
            store.close().await;

            let content = exchange::export_projects(&projects?, *format)?;
            match output {
                Some(path) => {
                    std::fs::write(path, content).map_err(|e| {
                        DigiflowError::exchange(format!(
                            "Failed to write {}: {e}",
                            path.display()
                        ))
                    })?;
                    println!("Exported to {}", path.display());
                }
                None => print!("{content}"),
            }
            Ok(())
        }
        Command::Import { format, path } => {
            let format = cli::import_format(*format, path)?;
            let content = std::fs::read_to_string(path).map_err(|e| {
                DigiflowError::exchange(format!("Failed to read {}: {e}", path.display()))
            })?;
            let imported = exchange::import_projects(&content, format)?;
            let batch: Vec<NewProject> = imported.iter().map(Into::into).collect();

            let store = ProjectStore::open(cli.store_path(&config)).await?;
            let created = store.create_projects_batch(&batch, &cli.owner()).await;
            store.close().await;

            println!("Imported {} projects", created?.len());
            Ok(())
        }
    }
}

fn check(config: &Config, sql: &str) -> Result<()> {
    let guard = ReadOnlyQueryGuard::new(&config.query.guard_policy())?;
    let approved = guard.validate(sql)?;
    info!("Statement approved ({} chars)", approved.as_str().len());
    println!("approved");
    Ok(())
}

async fn query(cli: &Cli, config: &Config, sql: &str, format: ResultFormat) -> Result<()> {
    let limits = config.query.limits()?;
    let guard = ReadOnlyQueryGuard::new(&config.query.guard_policy())?;

    let client: Arc<dyn DatabaseClient> = if cli.mock_db {
        info!("Using mock database");
        Arc::new(MockDatabaseClient::new())
    } else {
        let connection = config.resolve_connection(cli.database_url.as_deref())?;
        info!("Connection: {}", connection.display_string());
        Arc::from(db::client_for(&connection, limits.timeout))
    };

    let service = QueryService::new(guard, QueryExecutor::new(client, limits));
    let result = service.execute_read_only(sql).await?;
    print!("{}", render_result(&result, format)?);
    Ok(())
}

async fn projects(store: &ProjectStore, command: &ProjectCommand, owner: &OwnerId) -> Result<()> {
    match command {
        ProjectCommand::List {
            status,
            page,
            page_size,
        } => {
            let query = ProjectQuery {
                page: *page,
                page_size: *page_size,
                status: *status,
                search: None,
            };
            let page = store.list_projects_paginated(owner, &query).await?;
            print!("{}", render_result(&projects_table(&page.items), ResultFormat::Table)?);
            println!(
                "Page {} of {} ({} projects)",
                page.page,
                page.total_pages().max(1),
                page.total_count
            );
        }
        ProjectCommand::Show { id } => {
            let project = store
                .get_project(*id, owner)
                .await?
                .ok_or_else(|| DigiflowError::not_found(format!("Project {id}")))?;
            print!("{}", describe_project(&project));
        }
        ProjectCommand::Search { term } => {
            let found = store.search_projects(term, owner).await?;
            print!("{}", render_result(&projects_table(&found), ResultFormat::Table)?);
        }
        ProjectCommand::Create(create) => {
            let project = store.create_project(&create.to_new_project(), owner).await?;
            println!("Created project {}: {}", project.id, project.title);
        }
        ProjectCommand::Delete { id } => {
            if !store.delete_project(*id, owner).await? {
                return Err(DigiflowError::not_found(format!("Project {id}")));
            }
            println!("Deleted project {id}");
        }
    }
    Ok(())
}

/// Lays projects out as a result set so they share the query table renderer.
fn projects_table(projects: &[Project]) -> QueryResult {
    let columns = ["id", "title", "status", "technology", "responsible", "created_at"]
        .into_iter()
        .map(|name| ColumnInfo::new(name, "TEXT"))
        .collect();

    let rows = projects
        .iter()
        .map(|p| {
            Row::new()
                .with("id", p.id)
                .with("title", p.title.as_str())
                .with("status", p.status.display_name())
                .with("technology", p.technology.as_str())
                .with("responsible", p.responsible.as_str())
                .with("created_at", p.created_at.format("%Y-%m-%d %H:%M").to_string())
        })
        .collect();

    QueryResult::with_data(columns, rows)
}

fn describe_project(project: &Project) -> String {
    let mut out = format!(
        "#{} {}\nStatus:      {}\nResponsible: {}\nTechnology:  {}\nCreated:     {}\n",
        project.id,
        project.title,
        project.status.display_name(),
        project.responsible,
        project.technology,
        project.created_at.format("%Y-%m-%d %H:%M"),
    );
    if let Some(completed) = project.completed_at {
        out.push_str(&format!("Completed:   {}\n", completed.format("%Y-%m-%d %H:%M")));
    }
    if !project.description.is_empty() {
        out.push_str(&format!("\n{}\n", project.description));
    }

    if !project.requirements.is_empty() {
        out.push_str("\nRequirements:\n");
        for r in &project.requirements {
            out.push_str(&format!(
                "  [{}] {} ({}, {}, by {})\n",
                r.id,
                r.title,
                r.priority.display_name(),
                r.status.display_name(),
                r.author
            ));
        }
    }

    if !project.proposals.is_empty() {
        out.push_str("\nProposals:\n");
        for p in &project.proposals {
            let mark = if p.accepted { "accepted" } else { "open" };
            out.push_str(&format!(
                "  [{}] {} ({}, {mark})\n",
                p.id,
                p.title,
                p.kind.display_name()
            ));
        }
    }

    out
}
