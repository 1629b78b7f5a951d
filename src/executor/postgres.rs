//! PostgreSQL executor using sqlx
//!
//! Every statement runs inside its own read-only transaction with a local
//! statement timeout, and the transaction is always rolled back.

use crate::cell::{compute_data_hash, CellResult, Row};
use crate::config::ConnectionConfig;
use crate::diagnostics::{DiagCode, Diagnostic, Outcome};
use crate::error::{LumenError, Result};
use crate::executor::{suggest_fix, ExecutionLimits, QueryExecutor, QuerySession};
use crate::schema::introspect::introspect;
use crate::schema::snapshot::SchemaSnapshot;
use async_trait::async_trait;
use futures::TryStreamExt;
use serde_json::{Number, Value};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow, Postgres};
use sqlx::{Column, Connection, Decode, Row as _, Type, TypeInfo};
use std::time::{Duration, Instant};
use tracing::{debug, info};

const QUERY_CANCELED: &str = "57014";

pub struct PgExecutor {
    pool: PgPool,
    schema_name: String,
}

impl PgExecutor {
    /// Build an executor for `connection`. No connection is made until the
    /// first session is opened.
    pub fn new(connection: &ConnectionConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .connect_lazy(&connection.dsn)
            .map_err(|e| LumenError::Config(format!("Invalid DSN: {}", e)))?;
        Ok(Self {
            pool,
            schema_name: connection.schema_name.clone(),
        })
    }

    pub async fn introspect(&self) -> Result<SchemaSnapshot> {
        introspect(&self.pool, &self.schema_name).await
    }
}

#[async_trait]
impl QueryExecutor for PgExecutor {
    async fn open_session(&self) -> Result<Box<dyn QuerySession>> {
        let mut conn = self.pool.acquire().await?;
        let search_path = format!(
            "SET search_path TO \"{}\", public",
            self.schema_name.replace('"', "\"\"")
        );
        sqlx::query(&search_path).execute(&mut *conn).await?;
        debug!("Opened database session");
        Ok(Box::new(PgSession { conn }))
    }
}

pub struct PgSession {
    conn: PoolConnection<Postgres>,
}

struct Fetched {
    rows: Vec<PgRow>,
    truncated: bool,
}

impl PgSession {
    async fn fetch_limited(
        &mut self,
        sql: &str,
        limits: ExecutionLimits,
    ) -> std::result::Result<Fetched, sqlx::Error> {
        let mut tx = self.conn.begin().await?;
        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await?;
        let timeout = format!(
            "SET LOCAL statement_timeout = {}",
            limits.timeout_seconds.saturating_mul(1000)
        );
        sqlx::query(&timeout).execute(&mut *tx).await?;

        let mut rows = Vec::new();
        let mut truncated = false;
        {
            let mut stream = sqlx::query(sql).fetch(&mut *tx);
            while let Some(row) = stream.try_next().await? {
                if rows.len() >= limits.max_rows {
                    truncated = true;
                    break;
                }
                rows.push(row);
            }
        }

        tx.rollback().await?;
        Ok(Fetched { rows, truncated })
    }
}

#[async_trait]
impl QuerySession for PgSession {
    async fn execute(&mut self, sql: &str, limits: ExecutionLimits) -> Outcome<CellResult> {
        let start = Instant::now();
        let fetched = self.fetch_limited(sql, limits).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match fetched {
            Ok(fetched) => {
                let outcome = build_result(fetched, elapsed_ms, limits.max_rows);
                if let Some(result) = &outcome.data {
                    info!(
                        "Query returned {} rows in {}ms{}",
                        result.row_count,
                        elapsed_ms,
                        if result.truncated { " (truncated)" } else { "" }
                    );
                }
                outcome
            }
            Err(e) => Outcome::failure(error_diagnostic(&e, limits.timeout_seconds)),
        }
    }
}

fn build_result(fetched: Fetched, elapsed_ms: u64, max_rows: usize) -> Outcome<CellResult> {
    let (columns, type_names): (Vec<String>, Vec<String>) = match fetched.rows.first() {
        Some(first) => first
            .columns()
            .iter()
            .map(|c| (c.name().to_string(), c.type_info().name().to_string()))
            .unzip(),
        None => (Vec::new(), Vec::new()),
    };

    let data: Vec<Row> = fetched
        .rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .zip(&type_names)
                .enumerate()
                .map(|(index, (name, type_name))| (name.clone(), decode_value(row, index, type_name)))
                .collect()
        })
        .collect();

    assemble_result(columns, &type_names, data, fetched.truncated, elapsed_ms, max_rows)
}

/// Wrap decoded rows in a result, attaching the empty and truncation
/// warnings to both the outcome and the result.
fn assemble_result(
    columns: Vec<String>,
    type_names: &[String],
    data: Vec<Row>,
    truncated: bool,
    elapsed_ms: u64,
    max_rows: usize,
) -> Outcome<CellResult> {
    let mut warnings = Vec::new();
    if data.is_empty() {
        warnings.push(Diagnostic::warning(DiagCode::EmptyResult, "Query returned no rows"));
    }
    if truncated {
        warnings.push(
            Diagnostic::warning(
                DiagCode::ResultTruncated,
                format!("Results truncated to {} rows", max_rows),
            )
            .with_hint("Add a LIMIT clause to your query"),
        );
    }

    let result = CellResult {
        columns,
        column_types: type_names.iter().map(|t| t.to_lowercase()).collect(),
        row_count: data.len(),
        data_hash: compute_data_hash(&data),
        data,
        truncated,
        execution_time_ms: elapsed_ms,
        diagnostics: warnings.clone(),
    };

    Outcome {
        data: Some(result),
        diagnostics: warnings,
    }
}

fn error_diagnostic(error: &sqlx::Error, timeout_seconds: u64) -> Diagnostic {
    match error {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(QUERY_CANCELED) => {
            Diagnostic::error(
                DiagCode::SqlTimeout,
                format!("Query exceeded {}s timeout", timeout_seconds),
            )
            .with_hint("Simplify the query or add filters")
        }
        sqlx::Error::Database(db) => {
            let diag = Diagnostic::error(DiagCode::SqlError, format!("SQL execution error: {}", db));
            match suggest_fix(db.message()) {
                Some(hint) => diag.with_hint(hint),
                None => diag,
            }
        }
        other => Diagnostic::error(DiagCode::SqlError, format!("Unexpected error: {}", other)),
    }
}

fn get<'r, T>(row: &'r PgRow, index: usize) -> Option<T>
where
    T: Decode<'r, Postgres> + Type<Postgres>,
{
    row.try_get::<Option<T>, _>(index).ok().flatten()
}

fn float(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

/// Convert one cell to JSON by Postgres type name. Unknown types are read as
/// text when the driver allows it, otherwise null.
fn decode_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    let value = match type_name {
        "BOOL" => get::<bool>(row, index).map(Value::Bool),
        "INT2" => get::<i16>(row, index).map(Value::from),
        "INT4" => get::<i32>(row, index).map(Value::from),
        "INT8" => get::<i64>(row, index).map(Value::from),
        "FLOAT4" => get::<f32>(row, index).map(|v| float(v as f64)),
        "FLOAT8" => get::<f64>(row, index).map(float),
        "NUMERIC" => get::<sqlx::types::Decimal>(row, index)
            .and_then(|d| d.to_string().parse::<f64>().ok())
            .map(float),
        "DATE" => get::<chrono::NaiveDate>(row, index).map(|d| Value::String(d.to_string())),
        "TIMESTAMP" => get::<chrono::NaiveDateTime>(row, index)
            .map(|t| Value::String(t.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        "TIMESTAMPTZ" => get::<chrono::DateTime<chrono::Utc>>(row, index)
            .map(|t| Value::String(t.to_rfc3339())),
        "UUID" => get::<uuid::Uuid>(row, index).map(|u| Value::String(u.to_string())),
        "JSON" | "JSONB" => get::<Value>(row, index),
        _ => get::<String>(row, index).map(Value::String),
    };
    value.unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_conversion_handles_nan() {
        assert_eq!(float(1.5), Value::from(1.5));
        assert_eq!(float(f64::NAN), Value::Null);
    }

    #[test]
    fn test_empty_fetch_is_warning_not_error() {
        let outcome = build_result(Fetched { rows: Vec::new(), truncated: false }, 3, 10);
        assert!(outcome.ok());
        assert_eq!(outcome.diagnostics[0].code, DiagCode::EmptyResult);
        let result = outcome.data.unwrap();
        assert!(result.columns.is_empty());
        assert_eq!(result.row_count, 0);
        assert_eq!(result.execution_time_ms, 3);
    }

    #[test]
    fn test_truncated_fetch_warns_in_outcome_and_result() {
        let max_rows = 2;
        let data: Vec<Row> = (0..max_rows)
            .map(|i| {
                let mut row = Row::new();
                row.insert("n".to_string(), Value::from(i as i64));
                row
            })
            .collect();
        let outcome = assemble_result(vec!["n".to_string()], &["INT8".to_string()], data, true, 7, max_rows);

        assert!(outcome.ok());
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(outcome.diagnostics[0].code, DiagCode::ResultTruncated);
        assert_eq!(outcome.diagnostics[0].message, "Results truncated to 2 rows");

        let result = outcome.data.unwrap();
        assert!(result.truncated);
        assert_eq!(result.row_count, max_rows);
        assert_eq!(result.column_types, vec!["int8"]);
        assert_eq!(result.diagnostics, outcome.diagnostics);
    }

    #[test]
    fn test_full_page_without_overflow_is_clean() {
        let mut row = Row::new();
        row.insert("n".to_string(), Value::from(1));
        let outcome = assemble_result(vec!["n".to_string()], &["INT4".to_string()], vec![row], false, 1, 1);
        assert!(outcome.diagnostics.is_empty());
        assert!(!outcome.data.unwrap().truncated);
    }

    #[test]
    fn test_non_database_error_is_unexpected() {
        let diag = error_diagnostic(&sqlx::Error::PoolTimedOut, 30);
        assert_eq!(diag.code, DiagCode::SqlError);
        assert!(diag.message.starts_with("Unexpected error:"));
    }
}
