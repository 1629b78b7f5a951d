//! Trend extrapolation SQL.
//!
//! Wraps an already-validated baseline query with a linear regression over
//! the time axis and appends projected future periods.

use crate::diagnostics::{DiagCode, Diagnostic, Outcome};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MAX_PERIODS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodInterval {
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl PeriodInterval {
    /// Sorted alphabetically, as listed in hints.
    pub const ALL: [PeriodInterval; 5] = [
        PeriodInterval::Day,
        PeriodInterval::Month,
        PeriodInterval::Quarter,
        PeriodInterval::Week,
        PeriodInterval::Year,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodInterval::Day => "day",
            PeriodInterval::Week => "week",
            PeriodInterval::Month => "month",
            PeriodInterval::Quarter => "quarter",
            PeriodInterval::Year => "year",
        }
    }
}

impl fmt::Display for PeriodInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeriodInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PeriodInterval::ALL
            .into_iter()
            .find(|interval| interval.as_str() == s)
            .ok_or_else(|| format!("Invalid period_interval '{}'", s))
    }
}

/// Parameters requested by the planner. Kept loosely typed so that bad
/// values reach [`build_trend_sql`] and come back as diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendParams {
    pub time_field: String,
    pub measure: String,
    #[serde(default = "default_periods_ahead")]
    pub periods_ahead: i64,
    #[serde(default = "default_period_interval")]
    pub period_interval: String,
}

fn default_periods_ahead() -> i64 {
    3
}

fn default_period_interval() -> String {
    "month".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSql {
    pub sql: String,
    pub baseline_sql: String,
    pub time_field: String,
    pub measure: String,
    pub periods_ahead: i64,
    pub period_interval: PeriodInterval,
}

/// Double-quote an identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Build the regression + projection query around `baseline_sql`.
///
/// The interval is checked before the period count; only the first failing
/// check is reported.
pub fn build_trend_sql(baseline_sql: &str, params: &TrendParams) -> Outcome<TrendSql> {
    let interval = match params.period_interval.parse::<PeriodInterval>() {
        Ok(interval) => interval,
        Err(message) => {
            let valid: Vec<&str> = PeriodInterval::ALL.iter().map(PeriodInterval::as_str).collect();
            return Outcome::failure(
                Diagnostic::error(DiagCode::TrendInvalidInterval, message)
                    .with_hint(format!("Must be one of: {}", valid.join(", "))),
            );
        }
    };

    let periods = params.periods_ahead;
    if !(1..=MAX_PERIODS).contains(&periods) {
        return Outcome::failure(Diagnostic::error(
            DiagCode::TrendInvalidPeriods,
            format!("periods_ahead must be 1-{}, got {}", MAX_PERIODS, periods),
        ));
    }

    let baseline = baseline_sql.trim().trim_end_matches(';').trim_end();
    let t = quote_ident(&params.time_field);
    let m = quote_ident(&params.measure);

    let epoch = format!("EXTRACT(EPOCH FROM {}::timestamp) / 86400.0", t);
    let measure_cast = format!("{}::double precision", m);
    let future_ts = format!("lp.max_time + (gs.n * INTERVAL '1 {}')", interval);
    let future_epoch = format!("EXTRACT(EPOCH FROM ({})::timestamp) / 86400.0", future_ts);
    let bridge_epoch = "EXTRACT(EPOCH FROM lp.max_time::timestamp) / 86400.0";

    let sql = format!(
        "WITH baseline AS (SELECT * FROM ({baseline}) AS _b),
regression AS (
  SELECT
    regr_slope({measure_cast}, {epoch}) AS slope,
    regr_intercept({measure_cast}, {epoch}) AS intercept,
    regr_r2({measure_cast}, {epoch}) AS r_squared,
    COUNT(*) AS n_points
  FROM baseline
  WHERE {m} IS NOT NULL AND {t} IS NOT NULL
),
actuals AS (
  SELECT
    {t},
    {m},
    'actual' AS period_type
  FROM baseline
),
last_period AS (
  SELECT MAX({t}::timestamp) AS max_time FROM baseline
),
bridge AS (
  SELECT
    lp.max_time AS {t},
    r.slope * ({bridge_epoch}) + r.intercept AS {m},
    'projected' AS period_type
  FROM last_period lp
  CROSS JOIN regression r
  WHERE lp.max_time IS NOT NULL
),
future_periods AS (
  SELECT
    ({future_ts})::timestamp AS {t},
    r.slope * ({future_epoch}) + r.intercept AS {m},
    'projected' AS period_type
  FROM generate_series(1, {periods}) AS gs(n)
  CROSS JOIN regression r
  CROSS JOIN last_period lp
)
SELECT * FROM actuals
UNION ALL
SELECT * FROM bridge
UNION ALL
SELECT * FROM future_periods
ORDER BY {t}"
    );

    Outcome::success(TrendSql {
        sql,
        baseline_sql: baseline.to_string(),
        time_field: params.time_field.clone(),
        measure: params.measure.clone(),
        periods_ahead: periods,
        period_interval: interval,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::validate_sql;

    fn params(periods: i64, interval: &str) -> TrendParams {
        TrendParams {
            time_field: "month".to_string(),
            measure: "revenue".to_string(),
            periods_ahead: periods,
            period_interval: interval.to_string(),
        }
    }

    const BASELINE: &str = "SELECT date_trunc('month', created_at) AS month, SUM(total) AS revenue FROM orders GROUP BY 1;";

    #[test]
    fn test_builds_projection_query() {
        let outcome = build_trend_sql(BASELINE, &params(3, "month"));
        assert!(outcome.ok());
        let trend = outcome.data.unwrap();
        assert_eq!(trend.sql.matches("generate_series(1, 3)").count(), 1);
        assert!(trend.sql.contains("'actual' AS period_type"));
        assert!(trend.sql.contains("'projected' AS period_type"));
        assert!(trend.sql.contains("INTERVAL '1 month'"));
        assert!(trend.sql.trim_end().ends_with("ORDER BY \"month\""));
        assert!(!trend.sql.contains(";)"));
        assert_eq!(trend.period_interval, PeriodInterval::Month);
    }

    #[test]
    fn test_generated_sql_passes_validator() {
        let trend = build_trend_sql(BASELINE, &params(6, "quarter")).data.unwrap();
        assert!(validate_sql(&trend.sql).ok());
    }

    #[test]
    fn test_rejects_out_of_range_periods() {
        for periods in [0, 25, -1] {
            let outcome = build_trend_sql(BASELINE, &params(periods, "month"));
            assert!(!outcome.ok());
            assert_eq!(outcome.diagnostics[0].code, DiagCode::TrendInvalidPeriods);
        }
        assert!(build_trend_sql(BASELINE, &params(24, "year")).ok());
    }

    #[test]
    fn test_rejects_unknown_interval_first() {
        let outcome = build_trend_sql(BASELINE, &params(0, "decade"));
        assert_eq!(outcome.diagnostics.len(), 1);
        let diag = &outcome.diagnostics[0];
        assert_eq!(diag.code, DiagCode::TrendInvalidInterval);
        assert_eq!(diag.hint.as_deref(), Some("Must be one of: day, month, quarter, week, year"));
    }

    #[test]
    fn test_identifiers_are_escaped() {
        let p = TrendParams {
            time_field: "wk\"start".to_string(),
            measure: "total".to_string(),
            periods_ahead: 2,
            period_interval: "week".to_string(),
        };
        let trend = build_trend_sql("SELECT 1", &p).data.unwrap();
        assert!(trend.sql.contains("\"wk\"\"start\""));
    }

    #[test]
    fn test_params_defaults() {
        let p: TrendParams = serde_json::from_str(r#"{"time_field": "d", "measure": "m"}"#).unwrap();
        assert_eq!(p.periods_ahead, 3);
        assert_eq!(p.period_interval, "month");
    }
}
