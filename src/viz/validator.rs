//! Structural Vega-Lite spec validation.

use crate::diagnostics::{DiagCode, Outcome};
use serde_json::Value;
use std::collections::HashSet;

pub const VALID_MARK_TYPES: [&str; 10] = [
    "bar", "line", "point", "area", "rect", "text", "arc", "circle", "square", "tick",
];

pub const VALID_ENCODING_TYPES: [&str; 4] = ["nominal", "ordinal", "quantitative", "temporal"];

/// Validate a chart spec against the columns of the result it will render.
///
/// A `layer` spec validates every layer with the same rules and merges the
/// diagnostics. Field checks are skipped when `columns` is empty.
pub fn validate_chart_spec(spec: &Value, columns: &[String]) -> Outcome<()> {
    let mut outcome = Outcome::new();

    if is_empty_spec(spec) {
        outcome.error(DiagCode::ChartEmpty, "Chart spec is empty");
        return outcome;
    }

    let column_set: HashSet<&str> = columns.iter().map(String::as_str).collect();

    match spec.get("layer") {
        Some(Value::Array(layers)) => {
            for (index, layer) in layers.iter().enumerate() {
                let mut layer_outcome = Outcome::<()>::new();
                validate_single(layer, columns, &column_set, &mut layer_outcome);
                for mut diag in layer_outcome.diagnostics {
                    diag.message = format!("layer {}: {}", index, diag.message);
                    outcome.push(diag);
                }
            }
        }
        _ => validate_single(spec, columns, &column_set, &mut outcome),
    }

    if outcome.ok() {
        outcome.data = Some(());
    }
    outcome
}

fn is_empty_spec(spec: &Value) -> bool {
    match spec {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn validate_single(
    spec: &Value,
    columns: &[String],
    column_set: &HashSet<&str>,
    outcome: &mut Outcome<()>,
) {
    match spec.get("mark") {
        None | Some(Value::Null) => outcome.error(DiagCode::ChartNoMark, "Chart spec missing 'mark'"),
        Some(mark) => {
            let mark_type = match mark {
                Value::String(s) => Some(s.as_str()),
                Value::Object(obj) => obj.get("type").and_then(Value::as_str),
                _ => None,
            };
            if let Some(mark_type) = mark_type {
                if !VALID_MARK_TYPES.contains(&mark_type) {
                    outcome.error(
                        DiagCode::ChartInvalidMark,
                        format!("Invalid mark type: {}", mark_type),
                    );
                }
            }
        }
    }

    let encoding = match spec.get("encoding") {
        None | Some(Value::Null) => {
            outcome.error(DiagCode::ChartNoEncoding, "Chart spec missing 'encoding'");
            return;
        }
        Some(Value::Object(encoding)) => encoding,
        Some(_) => {
            outcome.error(DiagCode::ChartInvalidEncoding, "Encoding must be an object");
            return;
        }
    };

    for (channel, definition) in encoding {
        let Value::Object(definition) = definition else {
            continue;
        };
        if let Some(field) = definition.get("field").and_then(Value::as_str) {
            if !field.is_empty() && !column_set.is_empty() && !column_set.contains(field) {
                outcome.error(
                    DiagCode::ChartUnknownField,
                    format!(
                        "Field '{}' in {} not in result columns: {:?}",
                        field, channel, columns
                    ),
                );
            }
        }
        if let Some(enc_type) = definition.get("type").and_then(Value::as_str) {
            if !enc_type.is_empty() && !VALID_ENCODING_TYPES.contains(&enc_type) {
                outcome.error(
                    DiagCode::ChartInvalidType,
                    format!("Invalid encoding type '{}' in {}", enc_type, channel),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn codes(outcome: &Outcome<()>) -> Vec<DiagCode> {
        outcome.diagnostics.iter().map(|d| d.code).collect()
    }

    fn bar_spec() -> Value {
        json!({
            "mark": {"type": "bar"},
            "encoding": {
                "x": {"field": "name", "type": "nominal"},
                "y": {"field": "revenue", "type": "quantitative"}
            }
        })
    }

    #[test]
    fn test_valid_spec() {
        let r = validate_chart_spec(&bar_spec(), &cols(&["name", "revenue"]));
        assert!(r.ok());
    }

    #[test]
    fn test_empty_spec() {
        let r = validate_chart_spec(&json!({}), &cols(&["a"]));
        assert_eq!(codes(&r), vec![DiagCode::ChartEmpty]);
    }

    #[test]
    fn test_missing_mark_and_bad_type_are_both_reported() {
        let spec = json!({"encoding": {"x": {"field": "name", "type": "weird"}}});
        let r = validate_chart_spec(&spec, &cols(&["name"]));
        assert_eq!(codes(&r), vec![DiagCode::ChartNoMark, DiagCode::ChartInvalidType]);
    }

    #[test]
    fn test_invalid_mark_type() {
        let spec = json!({"mark": "sunburst", "encoding": {}});
        let r = validate_chart_spec(&spec, &cols(&["a"]));
        assert_eq!(codes(&r), vec![DiagCode::ChartInvalidMark]);
    }

    #[test]
    fn test_missing_and_invalid_encoding() {
        let r = validate_chart_spec(&json!({"mark": "bar"}), &cols(&["a"]));
        assert_eq!(codes(&r), vec![DiagCode::ChartNoEncoding]);
        let r = validate_chart_spec(&json!({"mark": "bar", "encoding": []}), &cols(&["a"]));
        assert_eq!(codes(&r), vec![DiagCode::ChartInvalidEncoding]);
    }

    #[test]
    fn test_unknown_field() {
        let r = validate_chart_spec(&bar_spec(), &cols(&["name", "total"]));
        assert_eq!(codes(&r), vec![DiagCode::ChartUnknownField]);
        assert!(r.diagnostics[0].message.contains("'revenue'"));
    }

    #[test]
    fn test_empty_columns_skips_field_check() {
        let r = validate_chart_spec(&bar_spec(), &[]);
        assert!(r.ok());
    }

    #[test]
    fn test_value_encoding_without_field() {
        let spec = json!({"mark": "bar", "encoding": {"color": {"value": "#fff"}, "x": {"field": "a"}}});
        assert!(validate_chart_spec(&spec, &cols(&["a"])).ok());
    }

    #[test]
    fn test_layers_are_validated_independently() {
        let spec = json!({
            "layer": [
                {"mark": "line", "encoding": {"x": {"field": "month", "type": "temporal"}}},
                {"mark": "line", "encoding": {"x": {"field": "missing", "type": "temporal"}}},
                {"encoding": {}}
            ]
        });
        let r = validate_chart_spec(&spec, &cols(&["month"]));
        assert_eq!(codes(&r), vec![DiagCode::ChartUnknownField, DiagCode::ChartNoMark]);
        assert!(r.diagnostics[0].message.starts_with("layer 1:"));
        assert!(r.diagnostics[1].message.starts_with("layer 2:"));
    }
}
