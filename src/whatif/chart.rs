use crate::viz::theme::{apply_theme, PRIMARY, SECONDARY};
use serde_json::{json, Value};

/// Layered spec for a trend projection: solid actuals, dashed projections.
///
/// Both layers filter on the `period_type` column produced by the trend query.
pub fn build_trend_chart(time_field: &str, measure: &str) -> Value {
    let encoding = |color: &str| {
        json!({
            "x": {"field": time_field, "type": "temporal"},
            "y": {"field": measure, "type": "quantitative"},
            "color": {"value": color}
        })
    };

    let spec = json!({
        "layer": [
            {
                "transform": [{"filter": "datum.period_type === 'actual'"}],
                "mark": {
                    "type": "line",
                    "point": {"shape": "circle", "size": 40},
                    "strokeWidth": 2
                },
                "encoding": encoding(PRIMARY)
            },
            {
                "transform": [{"filter": "datum.period_type === 'projected'"}],
                "mark": {
                    "type": "line",
                    "point": {"shape": "diamond", "size": 50},
                    "strokeWidth": 2,
                    "strokeDash": [6, 4]
                },
                "encoding": encoding(SECONDARY)
            }
        ],
        "width": "container",
        "height": 300
    });

    apply_theme(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viz::validate_chart_spec;

    #[test]
    fn test_trend_chart_layers() {
        let spec = build_trend_chart("month", "revenue");
        let layers = spec["layer"].as_array().unwrap();
        assert_eq!(layers.len(), 2);
        assert_eq!(layers[0]["mark"]["point"]["shape"], "circle");
        assert_eq!(layers[1]["mark"]["strokeDash"], json!([6, 4]));
        assert_eq!(layers[1]["encoding"]["y"]["field"], "revenue");
        assert!(spec.get("$schema").is_some());
    }

    #[test]
    fn test_trend_chart_is_structurally_valid() {
        let columns = vec!["month".to_string(), "revenue".to_string(), "period_type".to_string()];
        assert!(validate_chart_spec(&build_trend_chart("month", "revenue"), &columns).ok());
    }
}
