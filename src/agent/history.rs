//! Conversation context built from earlier cells.

use crate::cell::Cell;
use crate::schema::context::escape_xml;

pub const MAX_TURNS: usize = 5;

/// `<conversation_so_far>` block with the question, SQL, row count and
/// insight of the last `max_turns` cells. Empty when there are no cells.
pub fn build_conversation_context(cells: &[Cell], max_turns: usize) -> String {
    if cells.is_empty() {
        return String::new();
    }

    let recent = &cells[cells.len().saturating_sub(max_turns)..];
    let mut lines = vec!["<conversation_so_far>".to_string()];

    for (i, cell) in recent.iter().enumerate() {
        lines.push(format!("<turn number=\"{}\">", i + 1));
        lines.push(format!("  <question>{}</question>", escape_xml(&cell.question)));
        if let Some(query) = cell.query() {
            lines.push(format!("  <sql>{}</sql>", escape_xml(query)));
        }
        if let Some(result) = &cell.result {
            lines.push(format!("  <row_count>{}</row_count>", result.row_count));
        }
        if let Some(text) = cell.narrative_text() {
            lines.push(format!("  <insight>{}</insight>", escape_xml(text)));
        }
        lines.push("</turn>".to_string());
    }

    lines.push("</conversation_so_far>".to_string());
    lines.join("\n")
}

/// `<parent_cell>` block describing the cell being refined.
pub fn build_refinement_context(parent: &Cell) -> String {
    let mut lines = vec!["<parent_cell>".to_string()];
    lines.push(format!("  <question>{}</question>", escape_xml(&parent.question)));

    if let Some(query) = parent.query() {
        lines.push(format!("  <sql>{}</sql>", escape_xml(query)));
    }
    if let Some(result) = &parent.result {
        lines.push(format!(
            "  <columns>{}</columns>",
            escape_xml(&result.columns.join(", "))
        ));
        lines.push(format!("  <row_count>{}</row_count>", result.row_count));
    }
    if let Some(text) = parent.narrative_text() {
        lines.push(format!("  <insight>{}</insight>", escape_xml(text)));
    }

    lines.push("</parent_cell>".to_string());
    lines.join("\n")
}
