//! Schema snapshot and enriched schema models.

use crate::schema::roles::ColumnRole;
use serde::{Deserialize, Serialize};

/// Raw column facts as read from the database catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnSnapshot {
    pub name: String,
    pub data_type: String,
    #[serde(default = "default_true")]
    pub is_nullable: bool,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub is_primary_key: bool,
    /// `table.column` when the column is a foreign key.
    #[serde(default)]
    pub foreign_key: Option<String>,
    #[serde(default)]
    pub distinct_estimate: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableSnapshot {
    pub name: String,
    #[serde(default)]
    pub row_count: i64,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub columns: Vec<ColumnSnapshot>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub database: String,
    pub schema_name: String,
    pub introspected_at: String,
    #[serde(default)]
    pub tables: Vec<TableSnapshot>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichedColumn {
    pub name: String,
    pub data_type: String,
    #[serde(default = "default_true")]
    pub is_nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default)]
    pub role: ColumnRole,
    #[serde(default)]
    pub is_primary_key: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distinct_estimate: Option<i64>,
    /// `sum` or `avg`, only set for measure candidates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_agg: Option<String>,
}

impl EnrichedColumn {
    pub fn new(name: &str, data_type: &str, role: ColumnRole) -> Self {
        Self {
            name: name.to_string(),
            data_type: data_type.to_string(),
            is_nullable: true,
            role,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichedTable {
    pub name: String,
    #[serde(default)]
    pub row_count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default)]
    pub columns: Vec<EnrichedColumn>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedSchema {
    #[serde(default)]
    pub database: String,
    #[serde(default = "default_schema_name")]
    pub schema_name: String,
    #[serde(default)]
    pub introspected_at: String,
    #[serde(default)]
    pub tables: Vec<EnrichedTable>,
}

impl Default for EnrichedSchema {
    fn default() -> Self {
        Self {
            database: String::new(),
            schema_name: default_schema_name(),
            introspected_at: String::new(),
            tables: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_schema_name() -> String {
    "public".to_string()
}
