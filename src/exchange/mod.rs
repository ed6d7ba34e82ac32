//! Import and export of projects, and rendering of query results.
//!
//! Projects can be exported as JSON, CSV or XML and imported from JSON or
//! CSV. Imported projects carry no id or owner; they are stored through
//! [`crate::persistence::ProjectStore::create_projects_batch`].

mod csv;
mod json;
mod results;
mod xml;

pub use self::csv::{export_csv, import_csv, CSV_HEADER};
pub use json::{export_json, import_json};
pub use results::{render_result, ResultFormat};
pub use xml::export_xml;

use crate::error::{DigiflowError, Result};
use crate::persistence::Project;
use std::str::FromStr;

/// Formats projects can be exported to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
    Xml,
}

impl ExportFormat {
    /// Conventional file extension.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Xml => "xml",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = DigiflowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "xml" => Ok(Self::Xml),
            _ => Err(DigiflowError::exchange(format!(
                "Invalid export format: {s}. Expected: json, csv, or xml"
            ))),
        }
    }
}

/// Formats projects can be imported from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    Json,
    Csv,
}

impl FromStr for ImportFormat {
    type Err = DigiflowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "xml" => Err(DigiflowError::exchange("XML is supported for export only")),
            _ => Err(DigiflowError::exchange(format!(
                "Invalid import format: {s}. Expected: json or csv"
            ))),
        }
    }
}

/// Serializes projects in the given format.
pub fn export_projects(projects: &[Project], format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => export_json(projects),
        ExportFormat::Csv => Ok(export_csv(projects)),
        ExportFormat::Xml => Ok(export_xml(projects)),
    }
}

/// Parses projects from the given format.
pub fn import_projects(content: &str, format: ImportFormat) -> Result<Vec<Project>> {
    match format {
        ImportFormat::Json => import_json(content),
        ImportFormat::Csv => import_csv(content),
    }
}
