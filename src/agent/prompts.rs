//! Prompt templates and tool definitions for the planner and narrator.

use crate::agent::history::{build_conversation_context, build_refinement_context, MAX_TURNS};
use crate::cell::{Cell, CellResult};
use crate::schema::context::SchemaContext;
use serde_json::{json, Value};

pub const PLAN_TOOL_NAME: &str = "plan_query";
pub const NARRATE_TOOL_NAME: &str = "narrate_results";

/// Rows shown to the narrator.
pub const PREVIEW_ROWS: usize = 50;

pub fn plan_tool() -> Value {
    json!({
        "name": PLAN_TOOL_NAME,
        "description": "Plan and generate a SQL query to answer the user's question, along with a Vega-Lite chart specification for visualizing the results.",
        "input_schema": {
            "type": "object",
            "properties": {
                "reasoning": {
                    "type": "string",
                    "description": "Step-by-step reasoning about how to answer the question using the available schema."
                },
                "sql": {
                    "type": "string",
                    "description": "A single Postgres SELECT statement. Must be read-only. Use CTEs for clarity. Include ORDER BY and LIMIT where appropriate."
                },
                "chart_spec": {
                    "type": "object",
                    "description": "A Vega-Lite v5 specification object. Must include 'mark' and 'encoding'. Use field names that match the SQL SELECT column aliases. Set width to 'container'."
                },
                "whatif": {
                    "type": "object",
                    "description": "Optional projection request. Only set when the user asks about future values or trends.",
                    "properties": {
                        "technique": {"type": "string", "enum": ["trend_extrapolation"]},
                        "time_field": {"type": "string", "description": "Time column alias in the SQL result."},
                        "measure": {"type": "string", "description": "Numeric column alias to project."},
                        "periods_ahead": {"type": "integer", "minimum": 1, "maximum": 24},
                        "period_interval": {
                            "type": "string",
                            "enum": ["day", "week", "month", "quarter", "year"]
                        }
                    },
                    "required": ["technique", "time_field", "measure"]
                }
            },
            "required": ["reasoning", "sql", "chart_spec"]
        }
    })
}

pub fn narrate_tool() -> Value {
    json!({
        "name": NARRATE_TOOL_NAME,
        "description": "Generate a concise narrative insight from the query results, with data references.",
        "input_schema": {
            "type": "object",
            "properties": {
                "narrative": {
                    "type": "string",
                    "description": "A 2-4 sentence insight about the data. Reference specific values. Be direct and analytical, not generic."
                },
                "data_references": {
                    "type": "array",
                    "description": "Specific data points referenced in the narrative.",
                    "items": {
                        "type": "object",
                        "properties": {
                            "ref_id": {"type": "string", "description": "Unique ID like 'r1', 'r2'"},
                            "text": {
                                "type": "string",
                                "description": "The exact text substring from the narrative that references this data point."
                            },
                            "source": {
                                "type": "string",
                                "description": "Where this value comes from (e.g., 'row 1, revenue column')."
                            }
                        },
                        "required": ["ref_id", "text", "source"]
                    }
                }
            },
            "required": ["narrative", "data_references"]
        }
    })
}

/// System prompt for the planner.
pub fn build_system_prompt(
    schema: &SchemaContext,
    cells: &[Cell],
    parent: Option<&Cell>,
) -> String {
    let mut parts = vec![
        "You are Lumen, an expert data analyst. You answer questions about data by writing SQL queries and creating visualizations.".to_string(),
        String::new(),
        "## Database Schema".to_string(),
        schema.to_xml(),
        String::new(),
        "## Rules".to_string(),
        "1. Write a single Postgres SELECT statement. Never write INSERT, UPDATE, DELETE, DROP, or any DDL/DML.".to_string(),
        "2. Use CTEs (WITH clauses) for complex queries to improve readability.".to_string(),
        "3. Always include ORDER BY for meaningful ordering.".to_string(),
        "4. Include LIMIT when returning individual records (default LIMIT 100).".to_string(),
        "5. Use aggregate functions (SUM, AVG, COUNT, etc.) when the question implies aggregation.".to_string(),
        "6. Alias columns with clear, readable names using AS.".to_string(),
        "7. For the chart_spec: use Vega-Lite v5. Field names must exactly match SQL column aliases.".to_string(),
        "8. Set chart width to 'container'. Choose appropriate mark types (bar, line, point, etc.).".to_string(),
        "9. For bar charts with categorical data, sort by the measure descending (sort: '-y').".to_string(),
        "10. When the user asks to forecast or project a trend, write the SQL for the historical series (one time column, one measure) and set whatif with technique 'trend_extrapolation'.".to_string(),
    ];

    let conversation = build_conversation_context(cells, MAX_TURNS);
    if !conversation.is_empty() {
        parts.push(String::new());
        parts.push("## Conversation So Far".to_string());
        parts.push(conversation);
    }

    if let Some(parent) = parent {
        parts.push(String::new());
        parts.push("## Refinement Context".to_string());
        parts.push(
            "The user is refining a previous question. Use the parent cell context below to understand what was previously asked and build upon it."
                .to_string(),
        );
        parts.push(build_refinement_context(parent));
    }

    parts.join("\n")
}

/// System prompt for the narrator.
pub fn build_narrate_prompt(
    question: &str,
    sql: &str,
    result: &CellResult,
    caveats: Option<&[String]>,
) -> String {
    let mut parts = vec![
        "You are Lumen, an expert data analyst. Based on the query results below, write a concise narrative insight.".to_string(),
        String::new(),
        format!("## Question: {}", question),
        String::new(),
        format!("## SQL Query\n```sql\n{}\n```", sql),
        String::new(),
        format!(
            "## Results ({} rows)\n{}",
            result.row_count,
            format_result_for_llm(result)
        ),
    ];

    let caveats = caveats.filter(|c| !c.is_empty());
    if let Some(caveats) = caveats {
        parts.push(String::new());
        parts.push("## Assumptions & Caveats".to_string());
        parts.extend(caveats.iter().map(|c| format!("- {}", c)));
    }

    parts.push(String::new());
    parts.push("## Instructions".to_string());
    parts.push("1. Write 2-4 sentences highlighting the key findings.".to_string());
    parts.push("2. Reference specific data values (numbers, names) from the results.".to_string());
    parts.push(
        "3. Be analytical and direct: state what the data shows, not generic observations.".to_string(),
    );
    parts.push("4. Include data_references for each specific value you mention.".to_string());
    if caveats.is_some() {
        parts.push(
            "5. Rows with period_type 'projected' are estimates. Say so and mention the key caveat."
                .to_string(),
        );
    }

    parts.join("\n")
}

/// Text table of the first rows of a result.
pub fn format_result_for_llm(result: &CellResult) -> String {
    if result.data.is_empty() {
        return "(no data)".to_string();
    }
    if result.columns.is_empty() {
        return "(no columns)".to_string();
    }

    let mut lines = vec![
        result.columns.join(" | "),
        result.columns.iter().map(|_| "---").collect::<Vec<_>>().join(" | "),
    ];

    for row in result.data.iter().take(PREVIEW_ROWS) {
        let values: Vec<String> = result
            .columns
            .iter()
            .map(|col| match row.get(col) {
                None => String::new(),
                Some(Value::Null) => "NULL".to_string(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            })
            .collect();
        lines.push(values.join(" | "));
    }

    if result.row_count > PREVIEW_ROWS {
        lines.push(format!("... ({} more rows)", result.row_count - PREVIEW_ROWS));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Row;
    use crate::schema::snapshot::EnrichedSchema;

    fn result_with_rows(n: usize) -> CellResult {
        let data: Vec<Row> = (0..n)
            .map(|i| {
                let mut row = Row::new();
                row.insert("region".to_string(), json!(format!("r{}", i)));
                row.insert("total".to_string(), json!(i * 10));
                row
            })
            .collect();
        CellResult {
            columns: vec!["region".to_string(), "total".to_string()],
            column_types: vec!["text".to_string(), "int8".to_string()],
            row_count: n,
            data,
            ..Default::default()
        }
    }

    #[test]
    fn test_format_result_table() {
        let text = format_result_for_llm(&result_with_rows(2));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "region | total");
        assert_eq!(lines[1], "--- | ---");
        assert_eq!(lines[2], "r0 | 0");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_format_result_truncates_preview() {
        let text = format_result_for_llm(&result_with_rows(60));
        assert!(text.ends_with("... (10 more rows)"));
        assert_eq!(text.lines().count(), 2 + PREVIEW_ROWS + 1);
        assert_eq!(format_result_for_llm(&CellResult::default()), "(no data)");
    }

    #[test]
    fn test_system_prompt_sections() {
        let schema = SchemaContext::new(EnrichedSchema::default(), None);
        let prompt = build_system_prompt(&schema, &[], None);
        assert!(prompt.starts_with("You are Lumen"));
        assert!(prompt.contains("<schema database="));
        assert!(!prompt.contains("## Conversation So Far"));
        assert!(!prompt.contains("## Refinement Context"));

        let parent = Cell::new("top regions");
        let prompt = build_system_prompt(&schema, std::slice::from_ref(&parent), Some(&parent));
        assert!(prompt.contains("<conversation_so_far>"));
        assert!(prompt.contains("<parent_cell>"));
    }

    #[test]
    fn test_narrate_prompt_with_caveats() {
        let caveats = vec!["Assumes the trend continues.".to_string()];
        let prompt = build_narrate_prompt("q", "SELECT 1", &result_with_rows(1), Some(caveats.as_slice()));
        assert!(prompt.contains("## Assumptions & Caveats\n- Assumes the trend continues."));
        assert!(prompt.contains("```sql\nSELECT 1\n```"));

        let plain = build_narrate_prompt("q", "SELECT 1", &result_with_rows(1), None);
        assert!(!plain.contains("Caveats"));
    }

    #[test]
    fn test_tool_names() {
        assert_eq!(plan_tool()["name"], PLAN_TOOL_NAME);
        assert_eq!(narrate_tool()["name"], NARRATE_TOOL_NAME);
        assert!(plan_tool()["input_schema"]["properties"]["whatif"].is_object());
    }
}
