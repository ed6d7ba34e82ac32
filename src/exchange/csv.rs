//! Semicolon-separated CSV exchange format.
//!
//! Export writes one row per project without children. Import is driven by
//! the header row: unknown columns are ignored, missing ones take defaults,
//! and a status or date that cannot be parsed leaves the default in place.

use std::borrow::Cow;
use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tracing::{debug, info};

use crate::error::{DigiflowError, Result};
use crate::persistence::{Project, ProjectStatus};

/// Header row written by [`export_csv`].
pub const CSV_HEADER: &str =
    "Id;Title;Description;Status;Technology;CreatedAt;CompletedAt;Responsible";

const DELIMITER: char = ';';
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Exports projects as CSV, one line per project.
pub fn export_csv(projects: &[Project]) -> String {
    info!("Exporting {} projects as CSV", projects.len());

    let mut output = String::from(CSV_HEADER);
    output.push('\n');

    for project in projects {
        let completed = project
            .completed_at
            .map(|t| t.format(TIMESTAMP_FORMAT).to_string())
            .unwrap_or_default();
        let fields = [
            project.id.to_string(),
            project.title.clone(),
            project.description.clone(),
            project.status.as_str().to_string(),
            project.technology.clone(),
            project.created_at.format(TIMESTAMP_FORMAT).to_string(),
            completed,
            project.responsible.clone(),
        ];
        let line: Vec<Cow<'_, str>> = fields.iter().map(|f| quote_field(f, DELIMITER)).collect();
        output.push_str(&line.join(";"));
        output.push('\n');
    }

    output
}

/// Imports projects from CSV with a header row.
pub fn import_csv(content: &str) -> Result<Vec<Project>> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut records = parse_records(content, DELIMITER)?.into_iter();

    let Some(header) = records.next() else {
        return Ok(Vec::new());
    };
    let columns: HashMap<String, usize> = header
        .iter()
        .enumerate()
        .map(|(i, name)| (name.trim().to_lowercase(), i))
        .collect();

    let field = |record: &[String], name: &str| -> Option<String> {
        columns
            .get(name)
            .and_then(|&i| record.get(i))
            .map(|v| v.to_string())
    };

    let mut projects = Vec::new();
    for record in records {
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }

        let mut project = Project {
            title: field(&record, "title").unwrap_or_default(),
            description: field(&record, "description").unwrap_or_default(),
            technology: field(&record, "technology").unwrap_or_default(),
            responsible: field(&record, "responsible").unwrap_or_default(),
            ..Project::default()
        };

        if let Some(status) = field(&record, "status") {
            match status.parse::<ProjectStatus>() {
                Ok(status) => project.status = status,
                Err(_) => debug!("Keeping default status for unparsable '{status}'"),
            }
        }
        if let Some(created) = field(&record, "createdat").as_deref().and_then(parse_timestamp) {
            project.created_at = created;
        }
        project.completed_at = field(&record, "completedat")
            .as_deref()
            .and_then(parse_timestamp);

        projects.push(project);
    }

    info!("Imported {} projects from CSV", projects.len());
    Ok(projects)
}

/// Quotes a field if it contains the delimiter, a quote, a line break, or
/// surrounding whitespace.
pub(crate) fn quote_field(value: &str, delimiter: char) -> Cow<'_, str> {
    let needs_quotes = value.contains(delimiter)
        || value.contains(['"', '\r', '\n'])
        || value.starts_with(char::is_whitespace)
        || value.ends_with(char::is_whitespace);

    if needs_quotes {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

/// Accepts the export format, RFC 3339, or a bare date. Naive values are UTC.
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT) {
        return Some(t.and_utc());
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
}

/// Splits CSV text into records, honouring quoted fields that contain
/// delimiters, doubled quotes, or line breaks.
fn parse_records(content: &str, delimiter: char) -> Result<Vec<Vec<String>>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => in_quotes = true,
            c if c == delimiter => record.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(DigiflowError::exchange("Unterminated quoted field in CSV"));
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }

    Ok(records)
}
