//! Schema Augmentation
//!
//! Optional documentation dropped next to the schema cache in a project
//! directory is merged into one text block for the planner prompt:
//!
//! - `schema.yml`: dbt `models[]` and `sources[].tables[]` descriptions
//! - `docs.md`: free-form markdown, capped at [`MARKDOWN_MAX_CHARS`]
//! - `dictionary.csv`: `table,column,description` rows
//!
//! Unreadable files are logged and skipped.

use crate::schema::snapshot::EnrichedSchema;
use csv::ReaderBuilder;
use serde_yaml::Value as Yaml;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

pub const DBT_SCHEMA_FILE: &str = "schema.yml";
pub const MARKDOWN_FILE: &str = "docs.md";
pub const DICTIONARY_FILE: &str = "dictionary.csv";
pub const MARKDOWN_MAX_CHARS: usize = 5000;

/// Insertion-ordered name → description pairs. Re-inserting a name replaces
/// its description in place.
type Described = Vec<(String, String)>;

fn upsert(entries: &mut Described, name: &str, description: &str) {
    match entries.iter_mut().find(|(n, _)| n == name) {
        Some(entry) => entry.1 = description.to_string(),
        None => entries.push((name.to_string(), description.to_string())),
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct TableDoc {
    name: String,
    description: String,
    columns: Described,
}

/// Merged documentation for `schema`, or `None` when the project has no
/// usable doc files.
pub fn augment_schema(project_dir: &Path, schema: &EnrichedSchema) -> Option<String> {
    if !project_dir.is_dir() {
        return None;
    }

    let dbt = read_optional(&project_dir.join(DBT_SCHEMA_FILE))
        .map(|text| parse_dbt_yml(&text))
        .unwrap_or_default();
    let markdown = read_optional(&project_dir.join(MARKDOWN_FILE))
        .map(|text| truncate_markdown(&text))
        .unwrap_or_default();
    let dictionary = read_optional(&project_dir.join(DICTIONARY_FILE))
        .map(|text| parse_csv_dictionary(&text))
        .unwrap_or_default();

    if dbt.is_empty() && markdown.is_empty() && dictionary.is_empty() {
        return None;
    }
    debug!(
        "Augmenting schema: {} dbt tables, {} dictionary tables, {} markdown chars",
        dbt.len(),
        dictionary.len(),
        markdown.chars().count()
    );

    let docs = format_docs(&dbt, &markdown, &dictionary, schema);
    (!docs.is_empty()).then_some(docs)
}

fn read_optional(path: &Path) -> Option<String> {
    if !path.exists() {
        return None;
    }
    match fs::read_to_string(path) {
        Ok(text) => Some(text),
        Err(e) => {
            warn!("Cannot read {}: {}", path.display(), e);
            None
        }
    }
}

fn yaml_str<'a>(value: &'a Yaml, key: &str) -> &'a str {
    value.get(key).and_then(Yaml::as_str).unwrap_or_default()
}

fn parse_dbt_yml(text: &str) -> Vec<TableDoc> {
    let root: Yaml = match serde_yaml::from_str(text) {
        Ok(root) => root,
        Err(e) => {
            warn!("Failed to parse dbt schema YAML: {}", e);
            return Vec::new();
        }
    };

    let sequence = |value: Option<&Yaml>| -> Vec<Yaml> {
        value
            .and_then(Yaml::as_sequence)
            .cloned()
            .unwrap_or_default()
    };

    let models = sequence(root.get("models"));
    let source_tables = sequence(root.get("sources"))
        .iter()
        .flat_map(|source| sequence(source.get("tables")))
        .collect::<Vec<_>>();

    let mut docs: Vec<TableDoc> = Vec::new();
    for entry in models.iter().chain(source_tables.iter()) {
        let name = yaml_str(entry, "name");
        if name.is_empty() {
            continue;
        }
        let mut columns = Described::new();
        for column in sequence(entry.get("columns")) {
            let (col, desc) = (yaml_str(&column, "name"), yaml_str(&column, "description"));
            if !col.is_empty() && !desc.is_empty() {
                upsert(&mut columns, col, desc);
            }
        }
        let doc = TableDoc {
            name: name.to_string(),
            description: yaml_str(entry, "description").to_string(),
            columns,
        };
        match docs.iter_mut().find(|d| d.name == doc.name) {
            Some(existing) => *existing = doc,
            None => docs.push(doc),
        }
    }
    docs
}

fn truncate_markdown(text: &str) -> String {
    if text.chars().count() > MARKDOWN_MAX_CHARS {
        let head: String = text.chars().take(MARKDOWN_MAX_CHARS).collect();
        format!("{}\n... (truncated)", head)
    } else {
        text.to_string()
    }
}

/// `table` → column descriptions, in file order. Rows missing any of the
/// three fields are skipped; a malformed file yields nothing.
fn parse_csv_dictionary(text: &str) -> Vec<(String, Described)> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = match rdr.headers() {
        Ok(headers) => headers.iter().map(str::to_lowercase).collect::<Vec<_>>(),
        Err(e) => {
            warn!("Failed to parse CSV dictionary: {}", e);
            return Vec::new();
        }
    };
    let position = |name: &str| headers.iter().position(|h| h == name);
    let (Some(t), Some(c), Some(d)) = (position("table"), position("column"), position("description")) else {
        warn!("CSV dictionary needs table, column and description headers");
        return Vec::new();
    };

    let mut tables: Vec<(String, Described)> = Vec::new();
    for record in rdr.records() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!("Failed to parse CSV dictionary: {}", e);
                return Vec::new();
            }
        };
        let field = |i: usize| record.get(i).unwrap_or("");
        let (table, column, description) = (field(t), field(c), field(d));
        if table.is_empty() || column.is_empty() || description.is_empty() {
            continue;
        }
        match tables.iter_mut().find(|(name, _)| name == table) {
            Some((_, columns)) => upsert(columns, column, description),
            None => tables.push((table.to_string(), vec![(column.to_string(), description.to_string())])),
        }
    }
    tables
}

fn push_table(lines: &mut Vec<String>, name: &str, description: &str, columns: &Described) {
    lines.push(format!("## Table: {}", name));
    if !description.is_empty() {
        lines.push(description.to_string());
    }
    lines.extend(columns.iter().map(|(col, desc)| format!("- {}: {}", col, desc)));
    lines.push(String::new());
}

fn format_docs(
    dbt: &[TableDoc],
    markdown: &str,
    dictionary: &[(String, Described)],
    schema: &EnrichedSchema,
) -> String {
    let mut lines = Vec::new();

    for table in &schema.tables {
        let dbt_doc = dbt.iter().find(|d| d.name == table.name);
        let description = dbt_doc.map(|d| d.description.as_str()).unwrap_or_default();
        let mut columns = dbt_doc.map(|d| d.columns.clone()).unwrap_or_default();
        // Dictionary entries win over dbt descriptions.
        if let Some((_, extra)) = dictionary.iter().find(|(name, _)| *name == table.name) {
            for (col, desc) in extra {
                upsert(&mut columns, col, desc);
            }
        }
        if description.is_empty() && columns.is_empty() {
            continue;
        }
        push_table(&mut lines, &table.name, description, &columns);
    }

    // dbt tables the database did not report are still useful context.
    for doc in dbt {
        if schema.tables.iter().any(|t| t.name == doc.name) {
            continue;
        }
        push_table(&mut lines, &doc.name, &doc.description, &doc.columns);
    }

    if !markdown.is_empty() {
        lines.push("## Additional Documentation".to_string());
        lines.push(markdown.to_string());
        lines.push(String::new());
    }

    lines.join("\n").trim().to_string()
}
