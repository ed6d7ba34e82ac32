//! JSON exchange format.

use crate::error::{DigiflowError, Result};
use crate::persistence::Project;
use tracing::info;

/// Pretty-printed JSON array of projects, children included.
pub fn export_json(projects: &[Project]) -> Result<String> {
    info!("Exporting {} projects as JSON", projects.len());
    serde_json::to_string_pretty(projects)
        .map_err(|e| DigiflowError::exchange(format!("Failed to serialize projects: {e}")))
}

/// Parses a JSON array of projects. Missing fields take their defaults and
/// `null` is read as an empty list.
pub fn import_json(content: &str) -> Result<Vec<Project>> {
    let projects: Option<Vec<Project>> = serde_json::from_str(content)
        .map_err(|e| DigiflowError::exchange(format!("Invalid project JSON: {e}")))?;
    let projects = projects.unwrap_or_default();
    info!("Imported {} projects from JSON", projects.len());
    Ok(projects)
}
