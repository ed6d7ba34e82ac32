//! Configuration management for DigiFlow.
//!
//! Handles loading configuration from TOML files and environment variables.
//! The query database URL is resolved with this precedence: command line,
//! `DIGIFLOW_DATABASE_URL`, `DATABASE_URL`, config file, and finally the
//! project store's own SQLite file.

use crate::db::DatabaseBackend;
use crate::error::{DigiflowError, Result};
use crate::query::{QueryLimits, DEFAULT_MAX_ROWS};
use crate::safety::GuardPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Environment variables consulted for the query database URL, in order.
pub const DATABASE_URL_VARS: &[&str] = &["DIGIFLOW_DATABASE_URL", "DATABASE_URL"];

/// Main configuration structure for DigiFlow.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Database used for ad-hoc queries.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Limits and policy for ad-hoc queries.
    #[serde(default)]
    pub query: QueryConfig,

    /// Project store settings.
    #[serde(default)]
    pub store: StoreConfig,
}

/// `[database]` section.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DatabaseConfig {
    /// `sqlite:` or `postgres://` URL.
    pub url: Option<String>,
}

/// `[query]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryConfig {
    /// Statement timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum number of rows returned per query.
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,

    /// Replaces the built-in denylist when set.
    #[serde(default)]
    pub forbidden_keywords: Option<Vec<String>>,
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_rows() -> usize {
    DEFAULT_MAX_ROWS
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_rows: default_max_rows(),
            forbidden_keywords: None,
        }
    }
}

impl QueryConfig {
    /// Builds validated executor limits.
    pub fn limits(&self) -> Result<QueryLimits> {
        QueryLimits::new(Duration::from_secs(self.timeout_secs), self.max_rows)
    }

    /// Returns the guard policy: the configured denylist or the default one.
    pub fn guard_policy(&self) -> GuardPolicy {
        match &self.forbidden_keywords {
            Some(keywords) => GuardPolicy::with_keywords(keywords.iter().cloned()),
            None => GuardPolicy::default(),
        }
    }
}

/// `[store]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// Path of the SQLite file holding projects.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("data").join("digiflow.db")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

/// A resolved database connection target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub backend: DatabaseBackend,
    pub url: String,
}

impl ConnectionConfig {
    /// Parses a connection URL.
    ///
    /// Accepted schemes: `sqlite`, `postgres`, `postgresql`.
    pub fn from_url(url: &str) -> Result<Self> {
        let parsed = Url::parse(url)
            .map_err(|e| DigiflowError::config(format!("Invalid database URL: {e}")))?;

        let backend = DatabaseBackend::from_scheme(parsed.scheme()).ok_or_else(|| {
            DigiflowError::config(format!(
                "Invalid scheme '{}'. Expected 'sqlite', 'postgres' or 'postgresql'",
                parsed.scheme()
            ))
        })?;

        Ok(Self {
            backend,
            url: url.to_string(),
        })
    }

    /// Targets an SQLite file.
    pub fn sqlite_file(path: &Path) -> Self {
        Self {
            backend: DatabaseBackend::Sqlite,
            url: format!("sqlite:{}", path.display()),
        }
    }

    /// Returns a display-safe string (no password).
    pub fn display_string(&self) -> String {
        match self.backend {
            DatabaseBackend::Sqlite => self
                .url
                .strip_prefix("sqlite://")
                .or_else(|| self.url.strip_prefix("sqlite:"))
                .unwrap_or(&self.url)
                .to_string(),
            DatabaseBackend::Postgres => match Url::parse(&self.url) {
                Ok(url) => {
                    let host = url.host_str().unwrap_or("localhost");
                    let port = url.port().unwrap_or(5432);
                    let database = url.path().trim_start_matches('/');
                    let database = if database.is_empty() { "unknown" } else { database };
                    format!("{database} @ {host}:{port}")
                }
                Err(_) => "postgres".to_string(),
            },
        }
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("digiflow")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file. A missing file yields defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| DigiflowError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            DigiflowError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Resolves the query database from the command line, the environment
    /// and this file.
    pub fn resolve_connection(&self, cli_url: Option<&str>) -> Result<ConnectionConfig> {
        self.resolve_connection_with(cli_url, env_database_url())
    }

    /// Like [`Config::resolve_connection`] with an explicit environment value.
    pub fn resolve_connection_with(
        &self,
        cli_url: Option<&str>,
        env_url: Option<String>,
    ) -> Result<ConnectionConfig> {
        let url = cli_url
            .map(str::to_string)
            .or(env_url)
            .or_else(|| self.database.url.clone());

        match url {
            Some(url) => ConnectionConfig::from_url(&url),
            None => Ok(ConnectionConfig::sqlite_file(&self.store.path)),
        }
    }
}

/// Reads the first non-empty database URL from the environment.
pub fn env_database_url() -> Option<String> {
    DATABASE_URL_VARS
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.trim().is_empty())
}
