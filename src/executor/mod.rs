//! Query Execution
//!
//! The orchestrator talks to the database through two seams: a
//! `QueryExecutor` bound to one connection, and the `QuerySession` it opens
//! for the duration of a single ask.

pub mod postgres;

use crate::cell::CellResult;
use crate::config::SettingsConfig;
use crate::diagnostics::Outcome;
use crate::error::Result;
use async_trait::async_trait;

pub use postgres::{PgExecutor, PgSession};

/// Per-statement limits applied by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    pub timeout_seconds: u64,
    pub max_rows: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            max_rows: 1000,
        }
    }
}

impl From<&SettingsConfig> for ExecutionLimits {
    fn from(settings: &SettingsConfig) -> Self {
        Self {
            timeout_seconds: settings.statement_timeout_seconds,
            max_rows: settings.max_result_rows,
        }
    }
}

/// Opens sessions on the connection it was built for.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn open_session(&self) -> Result<Box<dyn QuerySession>>;
}

/// A borrowed database session. Released when dropped.
#[async_trait]
pub trait QuerySession: Send {
    /// Run one read-only statement.
    ///
    /// Database failures come back as diagnostics: `SQL_TIMEOUT` when the
    /// statement timeout fires, `SQL_ERROR` otherwise. Zero rows attach an
    /// `EMPTY_RESULT` warning and more than `max_rows` rows a
    /// `RESULT_TRUNCATED` warning.
    async fn execute(&mut self, sql: &str, limits: ExecutionLimits) -> Outcome<CellResult>;
}

/// Best-effort hint for a database error message.
pub fn suggest_fix(message: &str) -> Option<&'static str> {
    let lower = message.to_lowercase();
    if lower.contains("column") && lower.contains("does not exist") {
        Some("Check column names against the schema")
    } else if lower.contains("relation") && lower.contains("does not exist") {
        Some("Check table names against the schema")
    } else if lower.contains("syntax error") {
        Some("Check SQL syntax")
    } else if lower.contains("permission denied") {
        Some("The database user lacks permissions for this operation")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suggest_fix() {
        assert_eq!(
            suggest_fix("column \"revnue\" does not exist"),
            Some("Check column names against the schema")
        );
        assert_eq!(
            suggest_fix("relation \"order\" does not exist"),
            Some("Check table names against the schema")
        );
        assert_eq!(suggest_fix("syntax error at or near \"FORM\""), Some("Check SQL syntax"));
        assert_eq!(
            suggest_fix("permission denied for table salaries"),
            Some("The database user lacks permissions for this operation")
        );
        assert_eq!(suggest_fix("division by zero"), None);
    }

    #[test]
    fn test_limits_from_settings() {
        let settings = SettingsConfig {
            max_result_rows: 50,
            statement_timeout_seconds: 5,
            ..Default::default()
        };
        let limits = ExecutionLimits::from(&settings);
        assert_eq!(limits.max_rows, 50);
        assert_eq!(limits.timeout_seconds, 5);
    }
}
