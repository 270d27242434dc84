//! Output table model and the tabular summarization wire format.
//!
//! Summaries come back from the model as CSV with one header row. A synthetic index
//! column is prepended to the requested columns so each row can be tied back to the
//! item it describes, whatever order (or subset) the model answers in.

use crate::error::{Result, ScrapeError};
use crate::model::strip_code_fence;
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Name of the synthetic column linking a summary row to its input item
pub const INDEX_COLUMN: &str = "__index";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Text,
    Number,
    Link,
    Image,
}

/// One output column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Column {
    /// Column header, unique within a table
    pub name: String,

    #[serde(rename = "type")]
    pub column_type: ColumnType,

    /// What the column holds
    pub description: String,

    /// Extra extraction instruction for this column
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type,
            description: description.into(),
            prompt: None,
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }
}

/// Reject empty, reserved or duplicate column names
pub fn validate_columns(columns: &[Column]) -> Result<()> {
    if columns.is_empty() {
        return Err(ScrapeError::InvalidConfig("at least one column is required".to_string()));
    }
    let mut seen = HashSet::new();
    for column in columns {
        let name = column.name.trim();
        if name.is_empty() {
            return Err(ScrapeError::InvalidConfig("column names must not be empty".to_string()));
        }
        if name.eq_ignore_ascii_case(INDEX_COLUMN) {
            return Err(ScrapeError::InvalidConfig(format!("column name '{}' is reserved", INDEX_COLUMN)));
        }
        if !seen.insert(name.to_lowercase()) {
            return Err(ScrapeError::InvalidConfig(format!("duplicate column name '{}'", name)));
        }
    }
    Ok(())
}

/// A summarized item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRow {
    /// Content hash of the source item
    pub hash: String,

    /// Column name to value, in declared column order
    pub values: IndexMap<String, String>,
}

/// Rows produced by one claimed batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryBatch {
    /// Unique per stream, assigned at claim time; not an output ordering
    pub batch_id: u64,
    pub items: Vec<SummaryRow>,
}

/// Render the requested schema, index column first, for the summarization prompt
pub fn describe_columns(columns: &[Column]) -> String {
    let mut lines = vec![format!(
        "- {} (number): the [index] of the item the row describes",
        INDEX_COLUMN
    )];
    for column in columns {
        let mut line = format!(
            "- {} ({}): {}",
            column.name,
            serde_json::to_value(column.column_type)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default(),
            column.description
        );
        if let Some(prompt) = &column.prompt {
            line.push_str(&format!(" Instruction: {}", prompt));
        }
        lines.push(line);
    }
    lines.join("\n")
}

/// Header row the model is asked to produce
pub fn expected_header(columns: &[Column]) -> String {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(Vec::new());
    let mut names = vec![INDEX_COLUMN];
    names.extend(columns.iter().map(|c| c.name.as_str()));
    if writer.write_record(&names).is_err() {
        return names.join(",");
    }
    writer
        .into_inner()
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .map(|s| s.trim_end().to_string())
        .unwrap_or_else(|| names.join(","))
}

fn parse_index(raw: &str) -> Option<usize> {
    raw.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim()
        .parse()
        .ok()
}

/// Parse a CSV summary reply for a batch whose items have the given `hashes`.
///
/// Rows are matched to items through the index column; rows with an unknown or repeated
/// index are dropped. Missing columns become empty strings. The result is ordered by
/// item index and never holds more rows than `hashes`.
pub fn parse_summary_table(reply: &str, columns: &[Column], hashes: &[String]) -> Result<Vec<SummaryRow>> {
    let body = strip_code_fence(reply);
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    let index_pos = headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case(INDEX_COLUMN))
        .or_else(|| headers.iter().position(|h| h.eq_ignore_ascii_case("index")))
        .ok_or_else(|| ScrapeError::MalformedResponse(format!("missing {} column in header {:?}", INDEX_COLUMN, headers)))?;

    let column_positions: Vec<Option<usize>> = columns
        .iter()
        .map(|column| {
            headers
                .iter()
                .position(|h| h == &column.name)
                .or_else(|| headers.iter().position(|h| h.eq_ignore_ascii_case(&column.name)))
        })
        .collect();

    let mut rows: Vec<(usize, SummaryRow)> = Vec::new();
    let mut claimed = HashSet::new();
    for record in reader.records() {
        let record = record?;
        let Some(index) = record.get(index_pos).and_then(parse_index) else {
            continue;
        };
        if index >= hashes.len() || !claimed.insert(index) {
            continue;
        }

        let values = columns
            .iter()
            .zip(&column_positions)
            .map(|(column, position)| {
                let value = position.and_then(|p| record.get(p)).unwrap_or("").to_string();
                (column.name.clone(), value)
            })
            .collect();
        rows.push((
            index,
            SummaryRow {
                hash: hashes[index].clone(),
                values,
            },
        ));
    }

    rows.sort_by_key(|(index, _)| *index);
    Ok(rows.into_iter().map(|(_, row)| row).collect())
}
