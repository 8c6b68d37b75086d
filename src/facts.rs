//! Dataset source and fact flattening
//!
//! A dataset is a table whose first column identifies the line item
//! (e.g. "Revenue") and whose remaining columns are reporting periods.
//! Every (row, period) cell becomes one fact sentence.

use crate::error::RagError;
use crate::models::Fact;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::info;

/// Rendering used for empty or missing cells
pub const MISSING_CELL: &str = "nan";

/// Tabular financial data: one identifier column followed by period columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Dataset {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        if columns.is_empty() {
            return Err(RagError::Dataset(
                "dataset needs at least an identifier column".to_string(),
            ));
        }
        Ok(Self { columns, rows })
    }

    /// Parse a `{ "columns": [...], "rows": [[...], ...] }` document
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let dataset: Dataset = serde_json::from_str(raw)?;
        Self::new(dataset.columns, dataset.rows)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RagError::Dataset(format!("failed to read {}: {}", path.display(), e))
        })?;
        let dataset = Self::from_json_str(&raw)?;

        info!(
            path = %path.display(),
            rows = dataset.rows.len(),
            periods = dataset.period_columns().len(),
            "Dataset loaded"
        );

        Ok(dataset)
    }

    pub fn period_columns(&self) -> &[String] {
        &self.columns[1..]
    }
}

/// Flatten every (row, period) cell into a fact, row-major.
///
/// Fact ids follow traversal order. Nothing is deduplicated or skipped.
pub fn flatten(dataset: &Dataset) -> Vec<Fact> {
    let periods = dataset.period_columns();
    let mut facts = Vec::with_capacity(dataset.rows.len() * periods.len());

    for row in &dataset.rows {
        let identifier = render_cell(row.first());

        for (offset, period) in periods.iter().enumerate() {
            let value = render_cell(row.get(offset + 1));
            facts.push(Fact {
                id: facts.len(),
                text: fact_sentence(&identifier, period, &value),
            });
        }
    }

    facts
}

pub fn fact_sentence(identifier: &str, period: &str, value: &str) -> String {
    format!("{} - year {} is: {}", identifier, period, value)
}

fn render_cell(cell: Option<&Value>) -> String {
    match cell {
        None | Some(Value::Null) => MISSING_CELL.to_string(),
        Some(Value::String(s)) if s.trim().is_empty() => MISSING_CELL.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
