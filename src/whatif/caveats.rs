//! Deterministic caveats per what-if technique.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// What-if technique requested by the planner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Technique {
    TrendExtrapolation,
    Unknown(String),
}

impl Technique {
    pub fn as_str(&self) -> &str {
        match self {
            Technique::TrendExtrapolation => "trend_extrapolation",
            Technique::Unknown(name) => name,
        }
    }

    /// Assumption statements shown next to a projection. Pure, no LLM.
    pub fn caveats(&self, parameters: &Value) -> Vec<String> {
        match self {
            Technique::TrendExtrapolation => {
                let periods = parameters
                    .get("periods_ahead")
                    .and_then(Value::as_i64)
                    .unwrap_or(3);
                let interval = parameters
                    .get("period_interval")
                    .and_then(Value::as_str)
                    .unwrap_or("month");
                vec![
                    format!(
                        "Projects {} {}(s) ahead using linear regression on historical data.",
                        periods, interval
                    ),
                    "Assumes the historical trend continues unchanged; external shocks are not modeled."
                        .to_string(),
                    "R-squared (R\u{b2}) indicates fit quality: values below 0.5 suggest weak predictive power."
                        .to_string(),
                    "Extrapolation beyond observed data ranges carries increasing uncertainty.".to_string(),
                ]
            }
            Technique::Unknown(_) => {
                vec!["Unknown technique: no specific caveats available.".to_string()]
            }
        }
    }
}

impl From<String> for Technique {
    fn from(value: String) -> Self {
        match value.as_str() {
            "trend_extrapolation" => Technique::TrendExtrapolation,
            _ => Technique::Unknown(value),
        }
    }
}

impl From<Technique> for String {
    fn from(value: Technique) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Technique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
