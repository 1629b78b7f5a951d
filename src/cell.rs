//! Cell Model
//!
//! A cell is the artifact of one ask (or one edited-SQL re-run): the question,
//! the SQL, its result, the chart and the narrative. Cells are replaced
//! wholesale, never patched field by field (the title is the one exception).

use crate::diagnostics::Diagnostic;
use crate::viz::theme::THEME_NAME;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// One result row, keyed by column name.
pub type Row = Map<String, Value>;

/// `cell_` followed by 8 hex chars.
pub fn generate_cell_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("cell_{}", &hex[..8])
}

/// SHA-256 hex digest of rows serialized as compact JSON.
///
/// Object keys come out sorted because `serde_json::Map` is ordered; row
/// order is preserved.
pub fn compute_data_hash(rows: &[Row]) -> String {
    let canonical = serde_json::to_string(rows).unwrap_or_default();
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellContext {
    #[serde(default)]
    pub parent_cell_id: Option<String>,
    #[serde(default)]
    pub refinement_of: Option<String>,
    #[serde(default)]
    pub conversation_position: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellSql {
    pub query: String,
    #[serde(default = "default_generated_by")]
    pub generated_by: String,
    #[serde(default)]
    pub edited_by_user: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_sql_override: Option<String>,
}

impl CellSql {
    pub fn generated(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            generated_by: default_generated_by(),
            edited_by_user: false,
            user_sql_override: None,
        }
    }
}

fn default_generated_by() -> String {
    "llm".to_string()
}

/// Rows and metadata of an executed query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellResult {
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub column_types: Vec<String>,
    #[serde(default)]
    pub row_count: usize,
    #[serde(default)]
    pub data_hash: String,
    #[serde(default)]
    pub data: Vec<Row>,
    #[serde(default)]
    pub truncated: bool,
    #[serde(default)]
    pub execution_time_ms: u64,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellChart {
    #[serde(default)]
    pub spec: Value,
    #[serde(default)]
    pub auto_detected: bool,
    #[serde(default = "default_theme")]
    pub theme: String,
}

fn default_theme() -> String {
    THEME_NAME.to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataReference {
    #[serde(default)]
    pub ref_id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub source: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellNarrative {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub data_references: Vec<DataReference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhatIfMetadata {
    pub technique: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub caveats: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellMetadata {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub schema_version: String,
    #[serde(default)]
    pub agent_steps: Vec<String>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whatif: Option<WhatIfMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub context: CellContext,
    #[serde(default)]
    pub sql: Option<CellSql>,
    #[serde(default)]
    pub result: Option<CellResult>,
    #[serde(default)]
    pub chart: Option<CellChart>,
    #[serde(default)]
    pub narrative: Option<CellNarrative>,
    #[serde(default)]
    pub metadata: CellMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Cell {
    /// Fresh cell with a new id and the current time.
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            id: generate_cell_id(),
            created_at: Utc::now(),
            question: question.into(),
            context: CellContext::default(),
            sql: None,
            result: None,
            chart: None,
            narrative: None,
            metadata: CellMetadata::default(),
            title: None,
        }
    }

    pub fn query(&self) -> Option<&str> {
        self.sql.as_ref().map(|s| s.query.as_str())
    }

    pub fn narrative_text(&self) -> Option<&str> {
        self.narrative
            .as_ref()
            .map(|n| n.text.as_str())
            .filter(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_cell_id_format() {
        let id = generate_cell_id();
        assert_eq!(id.len(), 13);
        assert!(id.starts_with("cell_"));
        assert!(id[5..].chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, generate_cell_id());
    }

    #[test]
    fn test_data_hash_ignores_key_order() {
        let a = vec![row(json!({"b": 2, "a": 1}))];
        let b = vec![row(json!({"a": 1, "b": 2}))];
        assert_eq!(compute_data_hash(&a), compute_data_hash(&b));
        assert_eq!(compute_data_hash(&a).len(), 64);
    }

    #[test]
    fn test_data_hash_keeps_row_order() {
        let a = vec![row(json!({"a": 1})), row(json!({"a": 2}))];
        let b = vec![row(json!({"a": 2})), row(json!({"a": 1}))];
        assert_ne!(compute_data_hash(&a), compute_data_hash(&b));
    }

    #[test]
    fn test_data_hash_matches_canonical_json() {
        let rows = vec![row(json!({"region": "EU", "total": 10}))];
        let expected = hex::encode(Sha256::digest(br#"[{"region":"EU","total":10}]"#));
        assert_eq!(compute_data_hash(&rows), expected);
    }

    #[test]
    fn test_cell_json_shape() {
        let mut cell = Cell::new("How many orders?");
        cell.sql = Some(CellSql::generated("SELECT count(*) FROM orders"));
        let value = serde_json::to_value(&cell).unwrap();
        assert_eq!(value["sql"]["generated_by"], "llm");
        assert_eq!(value["sql"]["edited_by_user"], false);
        assert_eq!(value["context"]["conversation_position"], 0);
        assert!(value.get("title").is_none());

        let back: Cell = serde_json::from_value(value).unwrap();
        assert_eq!(back, cell);
    }
}
