//! What-if scenarios. Only trend extrapolation is implemented.

pub mod caveats;
pub mod chart;
pub mod trend;

pub use caveats::Technique;
pub use chart::build_trend_chart;
pub use trend::{build_trend_sql, PeriodInterval, TrendParams, TrendSql};
