//! Chart auto-detection from result shape.
//!
//! Used whenever the planner's chart spec does not validate, and for every
//! edited-SQL re-run. Columns are classified by schema role when the lookup
//! knows them, otherwise by the executor's type tag.

use crate::schema::roles::{ColumnRole, RoleLookup};
use crate::viz::theme::{apply_theme, PRIMARY};
use serde_json::{json, Value};

const TIME_TYPES: &[&str] = &["date", "datetime", "timestamp", "timestamptz"];
const NUMERIC_TYPES: &[&str] = &[
    "int",
    "integer",
    "bigint",
    "smallint",
    "int2",
    "int4",
    "int8",
    "float",
    "float4",
    "float8",
    "real",
    "double precision",
    "decimal",
    "numeric",
    "int64",
    "float64",
];
const CATEGORICAL_TYPES: &[&str] = &[
    "str", "string", "text", "varchar", "bpchar", "char", "name", "bool", "boolean",
];

/// Role inferred from a runtime type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeRole {
    Time,
    Numeric,
    Categorical,
    Other,
}

fn infer_from_type(column_type: &str) -> TypeRole {
    let lower = column_type.to_lowercase();
    let lower = lower.as_str();
    if TIME_TYPES.contains(&lower) {
        TypeRole::Time
    } else if NUMERIC_TYPES.contains(&lower) {
        TypeRole::Numeric
    } else if CATEGORICAL_TYPES.contains(&lower) {
        TypeRole::Categorical
    } else {
        TypeRole::Other
    }
}

#[derive(Debug, Default)]
struct Classified<'a> {
    time: Vec<&'a str>,
    categorical: Vec<&'a str>,
    measures: Vec<&'a str>,
    numeric: Vec<&'a str>,
}

fn classify<'a>(
    columns: &'a [String],
    column_types: &[String],
    roles: &dyn RoleLookup,
) -> Classified<'a> {
    let mut out = Classified::default();

    for (index, column) in columns.iter().enumerate() {
        let column = column.as_str();
        let type_role = column_types
            .get(index)
            .map(|t| infer_from_type(t))
            .unwrap_or(TypeRole::Other);

        match (roles.role_of(column), type_role) {
            (Some(ColumnRole::TimeDimension), _) | (None, TypeRole::Time) => out.time.push(column),
            (Some(ColumnRole::Categorical), _)
            | (Some(ColumnRole::Key), _)
            | (None, TypeRole::Categorical) => out.categorical.push(column),
            (Some(ColumnRole::MeasureCandidate), _)
            | (None, TypeRole::Numeric)
            | (Some(ColumnRole::Other), TypeRole::Numeric) => {
                out.measures.push(column);
                out.numeric.push(column);
            }
            _ => out.categorical.push(column),
        }
    }

    out
}

/// Pick a chart for the result shape and return a themed Vega-Lite spec.
///
/// First matching rule wins:
/// 1. no dimensions and one measure: single value
/// 2. time and two or more measures: stacked area over folded measures
/// 3. time and a measure: line
/// 4. a categorical dimension and a measure: bar sorted by value
/// 5. two numerics: scatter
/// 6. two or more columns: bar on the first two
/// 7. one column: single value; none: empty text mark
pub fn auto_detect_chart(
    columns: &[String],
    column_types: &[String],
    roles: &dyn RoleLookup,
) -> Value {
    let c = classify(columns, column_types, roles);

    let spec = if c.time.is_empty() && c.categorical.is_empty() && c.measures.len() == 1 {
        kpi_spec(c.measures[0])
    } else if !c.time.is_empty() && c.measures.len() >= 2 {
        stacked_area_spec(c.time[0], &c.measures)
    } else if !c.time.is_empty() && !c.measures.is_empty() {
        line_spec(c.time[0], c.measures[0])
    } else if !c.categorical.is_empty() && !c.measures.is_empty() {
        bar_spec(c.categorical[0], c.measures[0])
    } else if c.numeric.len() >= 2 {
        scatter_spec(c.numeric[0], c.numeric[1])
    } else if columns.len() >= 2 {
        bar_spec(&columns[0], &columns[1])
    } else if let Some(only) = columns.first() {
        kpi_spec(only)
    } else {
        json!({"mark": "text", "encoding": {}})
    };

    apply_theme(spec)
}

fn bar_spec(x: &str, y: &str) -> Value {
    json!({
        "mark": {"type": "bar", "cornerRadiusEnd": 3},
        "encoding": {
            "x": {"field": x, "type": "nominal", "sort": "-y"},
            "y": {"field": y, "type": "quantitative"},
            "color": {"value": PRIMARY}
        },
        "width": "container",
        "height": 300
    })
}

fn line_spec(x: &str, y: &str) -> Value {
    json!({
        "mark": {"type": "line", "point": true},
        "encoding": {
            "x": {"field": x, "type": "temporal"},
            "y": {"field": y, "type": "quantitative"},
            "color": {"value": PRIMARY}
        },
        "width": "container",
        "height": 300
    })
}

fn scatter_spec(x: &str, y: &str) -> Value {
    json!({
        "mark": {"type": "point", "filled": true},
        "encoding": {
            "x": {"field": x, "type": "quantitative"},
            "y": {"field": y, "type": "quantitative"},
            "color": {"value": PRIMARY}
        },
        "width": "container",
        "height": 300
    })
}

fn stacked_area_spec(time: &str, measures: &[&str]) -> Value {
    json!({
        "transform": [{"fold": measures, "as": ["metric", "value"]}],
        "mark": {"type": "area", "opacity": 0.7, "line": true},
        "encoding": {
            "x": {"field": time, "type": "temporal"},
            "y": {"field": "value", "type": "quantitative", "stack": "zero"},
            "color": {"field": "metric", "type": "nominal"}
        },
        "width": "container",
        "height": 300
    })
}

fn kpi_spec(field: &str) -> Value {
    json!({
        "mark": {"type": "text", "fontSize": 48, "fontWeight": 700, "color": PRIMARY},
        "encoding": {
            "text": {"field": field, "type": "quantitative", "format": ",.2~f"}
        },
        "width": "container",
        "height": 80
    })
}
