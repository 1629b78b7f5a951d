//! Schema context handed to the planner: the enriched schema, optional
//! free-form documentation, and a content hash used for cache staleness.

use crate::schema::roles::ColumnRole;
use crate::schema::snapshot::{EnrichedColumn, EnrichedSchema, EnrichedTable};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaContext {
    #[serde(rename = "schema", alias = "enriched")]
    pub schema: EnrichedSchema,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub augmented_docs: Option<String>,
    #[serde(default)]
    pub hash: String,
}

impl SchemaContext {
    /// Build a context and stamp it with its content hash.
    pub fn new(schema: EnrichedSchema, augmented_docs: Option<String>) -> Self {
        let mut ctx = Self {
            schema,
            augmented_docs,
            hash: String::new(),
        };
        ctx.hash = compute_hash(&ctx);
        ctx
    }

    /// Column name to role. When two tables share a column name the first
    /// table listed wins.
    pub fn role_map(&self) -> HashMap<String, ColumnRole> {
        let mut roles = HashMap::new();
        for table in &self.schema.tables {
            for col in &table.columns {
                roles.entry(col.name.clone()).or_insert(col.role);
            }
        }
        roles
    }

    pub fn to_xml(&self) -> String {
        let s = &self.schema;
        let mut lines = vec![format!(
            "<schema database=\"{}\" introspected_at=\"{}\">",
            escape_attr(&s.database),
            escape_attr(&s.introspected_at)
        )];

        for table in &s.tables {
            lines.push(table_xml(table));
        }

        if let Some(docs) = self.augmented_docs.as_deref().filter(|d| !d.is_empty()) {
            lines.push("  <augmented_docs>".to_string());
            lines.push(format!("    {}", escape_xml(docs)));
            lines.push("  </augmented_docs>".to_string());
        }

        lines.push("</schema>".to_string());
        lines.join("\n")
    }
}

fn table_xml(table: &EnrichedTable) -> String {
    let mut attrs = vec![
        format!("name=\"{}\"", escape_attr(&table.name)),
        format!("rows=\"~{}\"", table.row_count),
    ];
    if let Some(comment) = table.comment.as_deref().filter(|c| !c.is_empty()) {
        attrs.push(format!("description=\"{}\"", escape_attr(comment)));
    }

    let mut lines = vec![format!("  <table {}>", attrs.join(" "))];
    for col in &table.columns {
        lines.push(format!("    {}", column_xml(col)));
    }
    lines.push("  </table>".to_string());
    lines.join("\n")
}

fn column_xml(col: &EnrichedColumn) -> String {
    let mut attrs = vec![
        format!("name=\"{}\"", escape_attr(&col.name)),
        format!("type=\"{}\"", escape_attr(&col.data_type)),
    ];

    if col.role != ColumnRole::Other {
        attrs.push(format!("role=\"{}\"", col.role));
    }
    if col.is_primary_key {
        attrs.push("pk=\"true\"".to_string());
    }
    if let Some(fk) = &col.foreign_key {
        attrs.push(format!("fk=\"{}\"", escape_attr(fk)));
    }
    if let (Some(distinct), ColumnRole::Categorical) = (col.distinct_estimate, col.role) {
        attrs.push(format!("distinct_count=\"{}\"", distinct));
    }
    if let Some(agg) = &col.suggested_agg {
        attrs.push(format!("suggested_agg=\"{}\"", escape_attr(agg)));
    }
    if let Some(comment) = col.comment.as_deref().filter(|c| !c.is_empty()) {
        attrs.push(format!("description=\"{}\"", escape_attr(comment)));
    }

    format!("<column {}/>", attrs.join(" "))
}

/// Escape `&`, `<` and `>`.
pub fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(text: &str) -> String {
    escape_xml(text).replace('"', "&quot;")
}

/// Deterministic `sha256:<hex>` digest of the enriched schema.
///
/// `serde_json::Value` objects keep keys sorted, and `None` fields are skipped
/// at serialization, so the digest only changes when the schema does.
pub fn compute_hash(ctx: &SchemaContext) -> String {
    let canonical = serde_json::to_value(&ctx.schema)
        .map(|v| v.to_string())
        .unwrap_or_default();
    let digest = Sha256::digest(canonical.as_bytes());
    format!("sha256:{}", hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_schema() -> EnrichedSchema {
        let mut id = EnrichedColumn::new("id", "integer", ColumnRole::Key);
        id.is_primary_key = true;
        let mut status = EnrichedColumn::new("status", "text", ColumnRole::Categorical);
        status.distinct_estimate = Some(4);
        let mut total = EnrichedColumn::new("total", "numeric", ColumnRole::MeasureCandidate);
        total.suggested_agg = Some("sum".to_string());

        EnrichedSchema {
            database: "shop".to_string(),
            schema_name: "public".to_string(),
            introspected_at: "2024-05-01T00:00:00Z".to_string(),
            tables: vec![
                EnrichedTable {
                    name: "orders".to_string(),
                    row_count: 1200,
                    comment: Some("Customer <orders>".to_string()),
                    columns: vec![id, status, total],
                },
                EnrichedTable {
                    name: "refunds".to_string(),
                    row_count: 10,
                    comment: None,
                    columns: vec![EnrichedColumn::new("status", "text", ColumnRole::Other)],
                },
            ],
        }
    }

    #[test]
    fn test_to_xml_renders_tables_and_columns() {
        let ctx = SchemaContext::new(sample_schema(), Some("Revenue is net of tax".to_string()));
        let xml = ctx.to_xml();
        assert!(xml.starts_with("<schema database=\"shop\""));
        assert!(xml.contains("<table name=\"orders\" rows=\"~1200\" description=\"Customer &lt;orders&gt;\">"));
        assert!(xml.contains("<column name=\"id\" type=\"integer\" role=\"key\" pk=\"true\"/>"));
        assert!(xml.contains("role=\"categorical\" distinct_count=\"4\""));
        assert!(xml.contains("suggested_agg=\"sum\""));
        assert!(xml.contains("<augmented_docs>"));
        assert!(xml.ends_with("</schema>"));
    }

    #[test]
    fn test_hash_is_stable_and_content_sensitive() {
        let a = SchemaContext::new(sample_schema(), None);
        let b = SchemaContext::new(sample_schema(), None);
        assert_eq!(a.hash, b.hash);
        assert!(a.hash.starts_with("sha256:"));

        let mut changed = sample_schema();
        changed.tables[0].row_count = 1;
        assert_ne!(SchemaContext::new(changed, None).hash, a.hash);
    }

    #[test]
    fn test_role_map_first_table_wins() {
        let ctx = SchemaContext::new(sample_schema(), None);
        let roles = ctx.role_map();
        assert_eq!(roles.get("status"), Some(&ColumnRole::Categorical));
        assert_eq!(roles.get("total"), Some(&ColumnRole::MeasureCandidate));
    }

    #[test]
    fn test_serializes_schema_key() {
        let ctx = SchemaContext::new(sample_schema(), None);
        let value = serde_json::to_value(&ctx).unwrap();
        assert!(value.get("schema").is_some());
        let back: SchemaContext = serde_json::from_value(value).unwrap();
        assert_eq!(back, ctx);
    }
}
