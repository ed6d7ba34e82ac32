//! Command-line argument parsing for DigiFlow.

use clap::{Args, Parser, Subcommand};
use digiflow::config::Config;
use digiflow::exchange::{ExportFormat, ImportFormat, ResultFormat};
use digiflow::persistence::{NewProject, OwnerId, ProjectStatus};
use std::path::{Path, PathBuf};

/// Project tracking with guarded read-only SQL access.
#[derive(Parser, Debug)]
#[command(name = "digiflow")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Database for ad-hoc queries (sqlite:PATH or postgres://...)
    #[arg(long, global = true, value_name = "URL")]
    pub database_url: Option<String>,

    /// Config file path
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Project store file (overrides the config file)
    #[arg(long, global = true, value_name = "PATH")]
    pub store: Option<PathBuf>,

    /// Owner whose projects are accessed
    #[arg(long, global = true, env = "DIGIFLOW_OWNER", default_value = "local")]
    pub owner: String,

    /// Use mock database for queries (for testing)
    #[arg(long, global = true)]
    pub mock_db: bool,

    /// Write logs to the state directory instead of stderr
    #[arg(long, global = true)]
    pub log_file: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check a statement against the read-only guard without running it
    Check {
        /// SQL text
        sql: String,
    },

    /// Run a read-only query
    Query {
        /// SQL text
        sql: String,

        /// Output format: table, json, or csv
        #[arg(long, short = 'f', default_value = "table")]
        format: ResultFormat,
    },

    /// Manage projects
    #[command(subcommand)]
    Projects(ProjectCommand),

    /// Export all projects
    Export {
        /// Output format: json, csv, or xml
        #[arg(long, short = 'f', default_value = "json")]
        format: ExportFormat,

        /// Write to a file instead of stdout
        #[arg(long, short = 'o', value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Import projects from a file
    Import {
        /// Input format: json or csv (default: from the file extension)
        #[arg(long, short = 'f')]
        format: Option<ImportFormat>,

        /// File to import
        path: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    /// List projects, newest first
    List {
        /// Only projects with this status
        #[arg(long)]
        status: Option<ProjectStatus>,

        /// Page number (1-based)
        #[arg(long, default_value_t = 1)]
        page: u32,

        /// Projects per page
        #[arg(long, default_value_t = 20)]
        page_size: u32,
    },

    /// Show one project with its requirements and proposals
    Show { id: i64 },

    /// Search title, description, technology and responsible
    Search { term: String },

    /// Create a project
    Create(CreateProject),

    /// Delete a project with its requirements and proposals
    Delete { id: i64 },
}

#[derive(Args, Debug)]
pub struct CreateProject {
    /// Project title
    pub title: String,

    /// Person responsible
    #[arg(long, short = 'r')]
    pub responsible: String,

    #[arg(long, short = 'd', default_value = "")]
    pub description: String,

    #[arg(long, short = 't', default_value = "")]
    pub technology: String,

    #[arg(long, short = 's', default_value = "Planned")]
    pub status: ProjectStatus,
}

impl CreateProject {
    pub fn to_new_project(&self) -> NewProject {
        NewProject::new(&self.title, &self.responsible)
            .with_description(&self.description)
            .with_technology(&self.technology)
            .with_status(self.status)
    }
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Returns the project store path: `--store`, else the config file's.
    pub fn store_path<'a>(&'a self, config: &'a Config) -> &'a Path {
        self.store.as_deref().unwrap_or(&config.store.path)
    }

    pub fn owner(&self) -> OwnerId {
        OwnerId::new(self.owner.clone())
    }
}

/// Picks the import format from the flag or the file extension.
pub fn import_format(flag: Option<ImportFormat>, path: &Path) -> digiflow::error::Result<ImportFormat> {
    if let Some(format) = flag {
        return Ok(format);
    }
    path.extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .parse()
}
