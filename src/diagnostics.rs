//! Diagnostics
//!
//! Structured diagnostics and the `Outcome` container returned by validators,
//! the trend rewriter and the query executor. These functions never fail with
//! an error for bad input; they report what is wrong through diagnostics.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// Machine-readable diagnostic codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagCode {
    ConfigError,
    SqlParseError,
    ValidationError,
    SqlError,
    SqlTimeout,
    EmptyResult,
    ResultTruncated,
    TrendInvalidInterval,
    TrendInvalidPeriods,
    ChartEmpty,
    ChartNoMark,
    ChartInvalidMark,
    ChartNoEncoding,
    ChartInvalidEncoding,
    ChartUnknownField,
    ChartInvalidType,
    NotFound,
    LoadError,
    ParseError,
    ApiError,
}

impl DiagCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagCode::ConfigError => "CONFIG_ERROR",
            DiagCode::SqlParseError => "SQL_PARSE_ERROR",
            DiagCode::ValidationError => "VALIDATION_ERROR",
            DiagCode::SqlError => "SQL_ERROR",
            DiagCode::SqlTimeout => "SQL_TIMEOUT",
            DiagCode::EmptyResult => "EMPTY_RESULT",
            DiagCode::ResultTruncated => "RESULT_TRUNCATED",
            DiagCode::TrendInvalidInterval => "TREND_INVALID_INTERVAL",
            DiagCode::TrendInvalidPeriods => "TREND_INVALID_PERIODS",
            DiagCode::ChartEmpty => "CHART_EMPTY",
            DiagCode::ChartNoMark => "CHART_NO_MARK",
            DiagCode::ChartInvalidMark => "CHART_INVALID_MARK",
            DiagCode::ChartNoEncoding => "CHART_NO_ENCODING",
            DiagCode::ChartInvalidEncoding => "CHART_INVALID_ENCODING",
            DiagCode::ChartUnknownField => "CHART_UNKNOWN_FIELD",
            DiagCode::ChartInvalidType => "CHART_INVALID_TYPE",
            DiagCode::NotFound => "NOT_FOUND",
            DiagCode::LoadError => "LOAD_ERROR",
            DiagCode::ParseError => "PARSE_ERROR",
            DiagCode::ApiError => "API_ERROR",
        }
    }
}

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured diagnostic message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl Diagnostic {
    pub fn error(code: DiagCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
            hint: None,
        }
    }

    pub fn warning(code: DiagCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: message.into(),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Output paired with diagnostics.
///
/// `data` is only meaningful when [`Outcome::ok`] is true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

impl<T> Default for Outcome<T> {
    fn default() -> Self {
        Self {
            data: None,
            diagnostics: Vec::new(),
        }
    }
}

impl<T> Outcome<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            diagnostics: Vec::new(),
        }
    }

    /// Single-error outcome.
    pub fn failure(diagnostic: Diagnostic) -> Self {
        Self {
            data: None,
            diagnostics: vec![diagnostic],
        }
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn ok(&self) -> bool {
        !self.has_errors()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn error(&mut self, code: DiagCode, message: impl Into<String>) {
        self.push(Diagnostic::error(code, message));
    }

    pub fn warning(&mut self, code: DiagCode, message: impl Into<String>) {
        self.push(Diagnostic::warning(code, message));
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    /// Error messages joined with `"; "`.
    pub fn error_summary(&self) -> String {
        self.errors().map(|d| d.message.as_str()).join("; ")
    }

    /// Hints of all diagnostics joined with `"; "`.
    pub fn hint_summary(&self) -> String {
        self.diagnostics
            .iter()
            .filter_map(|d| d.hint.as_deref())
            .join("; ")
    }

    /// Takes the data of a successful outcome.
    pub fn into_data(self) -> Option<T> {
        if self.ok() {
            self.data
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warnings_do_not_fail_outcome() {
        let mut outcome = Outcome::success(1);
        outcome.warning(DiagCode::EmptyResult, "Query returned no rows");
        assert!(outcome.ok());
        assert_eq!(outcome.into_data(), Some(1));
    }

    #[test]
    fn test_error_summary_joins_messages() {
        let mut outcome: Outcome<()> = Outcome::new();
        outcome.error(DiagCode::ValidationError, "first");
        outcome.push(Diagnostic::error(DiagCode::SqlError, "second").with_hint("check it"));
        outcome.warning(DiagCode::ResultTruncated, "ignored");
        assert!(!outcome.ok());
        assert_eq!(outcome.error_summary(), "first; second");
        assert_eq!(outcome.hint_summary(), "check it");
    }

    #[test]
    fn test_code_serializes_screaming_snake() {
        let json = serde_json::to_string(&DiagCode::TrendInvalidInterval).unwrap();
        assert_eq!(json, "\"TREND_INVALID_INTERVAL\"");
        assert_eq!(DiagCode::SqlParseError.to_string(), "SQL_PARSE_ERROR");
    }
}
