//! Lumen Vega-Lite theme.

use serde_json::{json, Map, Value};

pub const THEME_NAME: &str = "lumen-default";

pub const VEGA_LITE_SCHEMA: &str = "https://vega.github.io/schema/vega-lite/v5.json";

pub const PALETTE: [&str; 8] = [
    "#3b5998", "#c67a3c", "#5a9e6f", "#8b6caf", "#c75a5a", "#4a9cc2", "#d4a843", "#7d7d7d",
];

pub const PRIMARY: &str = PALETTE[0];
pub const SECONDARY: &str = PALETTE[1];

const FONT: &str = "Inter, system-ui, sans-serif";

/// Default `config` block merged into every spec.
pub fn theme_config() -> Value {
    json!({
        "font": FONT,
        "axis": {
            "labelFont": FONT,
            "titleFont": FONT,
            "labelFontSize": 11,
            "titleFontSize": 12,
            "titleFontWeight": 600,
            "gridDash": [3, 3],
            "gridColor": "#e0e0e0",
            "domainColor": "#ccc",
            "tickColor": "#ccc",
            "labelLimit": 150,
            "titlePadding": 12
        },
        "legend": {
            "labelFont": FONT,
            "titleFont": FONT,
            "labelFontSize": 11,
            "titleFontSize": 12
        },
        "title": {
            "font": FONT,
            "fontSize": 14,
            "fontWeight": 600
        },
        "bar": { "cornerRadiusEnd": 3 },
        "line": { "strokeWidth": 2, "point": { "size": 40 } },
        "point": { "size": 60, "opacity": 0.7 },
        "area": { "opacity": 0.7, "line": true },
        "range": { "category": PALETTE },
        "view": { "strokeWidth": 0 },
        "padding": { "row": 10, "column": 10 },
        "background": "transparent"
    })
}

/// Merge the theme into a spec without overwriting anything the spec sets.
///
/// Top-level keys of the spec are kept as-is. Inside `config`, missing keys
/// take the theme default, and nested objects are merged key by key with the
/// spec's entries winning. `$schema` is only added when absent. Non-object
/// specs are returned unchanged.
pub fn apply_theme(spec: Value) -> Value {
    let Value::Object(mut themed) = spec else {
        return spec;
    };

    let mut config = match themed.remove("config") {
        Some(Value::Object(existing)) => existing,
        _ => Map::new(),
    };
    if let Value::Object(defaults) = theme_config() {
        for (key, default) in defaults {
            match config.get_mut(&key) {
                None => {
                    config.insert(key, default);
                }
                Some(Value::Object(existing)) => {
                    if let Value::Object(default_entries) = default {
                        for (k, v) in default_entries {
                            existing.entry(k).or_insert(v);
                        }
                    }
                }
                Some(_) => {}
            }
        }
    }
    themed.insert("config".to_string(), Value::Object(config));

    themed
        .entry("$schema")
        .or_insert_with(|| Value::String(VEGA_LITE_SCHEMA.to_string()));

    Value::Object(themed)
}
