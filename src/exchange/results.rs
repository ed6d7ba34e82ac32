//! Rendering of query results for the command line.

use std::str::FromStr;

use super::csv::quote_field;
use crate::db::{QueryResult, Row, Value};
use crate::error::{DigiflowError, Result};

/// Maximum width of a table cell before it is cut.
const MAX_CELL_WIDTH: usize = 40;

/// Output format for query results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResultFormat {
    #[default]
    Table,
    Json,
    Csv,
}

impl FromStr for ResultFormat {
    type Err = DigiflowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            _ => Err(DigiflowError::exchange(format!(
                "Invalid output format: {s}. Expected: table, json, or csv"
            ))),
        }
    }
}

/// Renders a result in the requested format.
pub fn render_result(result: &QueryResult, format: ResultFormat) -> Result<String> {
    match format {
        ResultFormat::Table => Ok(render_table(result)),
        ResultFormat::Json => render_json(result),
        ResultFormat::Csv => Ok(render_csv(result)),
    }
}

fn column_names(result: &QueryResult) -> Vec<String> {
    if !result.columns.is_empty() {
        return result.columns.iter().map(|c| c.name.clone()).collect();
    }
    result
        .rows
        .first()
        .map(|row| row.columns().map(str::to_string).collect())
        .unwrap_or_default()
}

fn cell(row: &Row, column: &str) -> String {
    row.get(column)
        .map(Value::to_display_string)
        .unwrap_or_default()
}

fn truncate(value: &str, max_width: usize) -> String {
    let value = value.replace(['\r', '\n'], " ");
    if value.chars().count() <= max_width {
        return value;
    }
    let cut: String = value.chars().take(max_width.saturating_sub(3)).collect();
    format!("{cut}...")
}

fn render_table(result: &QueryResult) -> String {
    let columns = column_names(result);
    if columns.is_empty() {
        return "(0 rows)\n".to_string();
    }

    let cells: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|c| truncate(&cell(row, c), MAX_CELL_WIDTH))
                .collect()
        })
        .collect();

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            cells
                .iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let format_line = |values: &[String]| -> String {
        let padded: Vec<String> = values
            .iter()
            .zip(&widths)
            .map(|(v, &w)| format!("{v:<w$}"))
            .collect();
        format!("| {} |\n", padded.join(" | "))
    };
    let separator = format!(
        "+-{}-+\n",
        widths
            .iter()
            .map(|&w| "-".repeat(w))
            .collect::<Vec<_>>()
            .join("-+-")
    );

    let mut output = separator.clone();
    output.push_str(&format_line(&columns));
    output.push_str(&separator);
    for row in &cells {
        output.push_str(&format_line(row));
    }
    output.push_str(&separator);

    let noun = if result.row_count == 1 { "row" } else { "rows" };
    output.push_str(&format!(
        "({} {noun}, {} ms)\n",
        result.row_count,
        result.execution_time.as_millis()
    ));
    if let Some(warning) = result.truncation_warning() {
        output.push_str(&warning);
        output.push('\n');
    }
    output
}

fn render_json(result: &QueryResult) -> Result<String> {
    serde_json::to_string_pretty(&result.rows)
        .map_err(|e| DigiflowError::exchange(format!("Failed to serialize result: {e}")))
}

fn render_csv(result: &QueryResult) -> String {
    let columns = column_names(result);
    if columns.is_empty() {
        return String::new();
    }

    let header: Vec<_> = columns.iter().map(|c| quote_field(c, ',')).collect();
    let mut output = header.join(",");
    output.push('\n');

    for row in &result.rows {
        let values: Vec<String> = columns
            .iter()
            .map(|c| match row.get(c) {
                Some(Value::Null) | None => String::new(),
                Some(v) => quote_field(&v.to_display_string(), ',').into_owned(),
            })
            .collect();
        output.push_str(&values.join(","));
        output.push('\n');
    }
    output
}
