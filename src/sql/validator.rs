//! SQL Validator
//!
//! Read-only allow-list over the parsed SQL AST. Only a single SELECT (or
//! WITH ... SELECT) statement passes. Mutating statements are rejected wherever
//! they appear in the tree, including inside CTEs and subqueries.

use crate::diagnostics::{DiagCode, Outcome};
use sqlparser::ast::{visit_statements, Statement};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::keywords::Keyword;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer};
use std::fmt;
use std::ops::ControlFlow;

/// Statement kinds that are never allowed anywhere in a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForbiddenStatement {
    Insert,
    Update,
    Delete,
    CreateTable,
    CreateTableAs,
    Drop,
    AlterTable,
    Truncate,
    Grant,
    Revoke,
    CreateFunction,
    CreateRole,
    Copy,
    CreateSchema,
}

impl ForbiddenStatement {
    pub fn classify(stmt: &Statement) -> Option<Self> {
        let kind = match stmt {
            Statement::Insert { .. } => Self::Insert,
            Statement::Update { .. } => Self::Update,
            Statement::Delete { .. } => Self::Delete,
            Statement::CreateTable { query, .. } => {
                if query.is_some() {
                    Self::CreateTableAs
                } else {
                    Self::CreateTable
                }
            }
            Statement::Drop { .. } => Self::Drop,
            Statement::AlterTable { .. } => Self::AlterTable,
            Statement::Truncate { .. } => Self::Truncate,
            Statement::Grant { .. } => Self::Grant,
            Statement::Revoke { .. } => Self::Revoke,
            Statement::CreateFunction { .. } => Self::CreateFunction,
            Statement::CreateRole { .. } => Self::CreateRole,
            Statement::Copy { .. } => Self::Copy,
            Statement::CreateSchema { .. } => Self::CreateSchema,
            _ => return None,
        };
        Some(kind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::CreateTable => "CREATE TABLE",
            Self::CreateTableAs => "CREATE TABLE AS",
            Self::Drop => "DROP",
            Self::AlterTable => "ALTER TABLE",
            Self::Truncate => "TRUNCATE",
            Self::Grant => "GRANT",
            Self::Revoke => "REVOKE",
            Self::CreateFunction => "CREATE FUNCTION",
            Self::CreateRole => "CREATE ROLE",
            Self::Copy => "COPY",
            Self::CreateSchema => "CREATE SCHEMA",
        }
    }
}

impl fmt::Display for ForbiddenStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validate that `sql` is a single, read-only SELECT statement.
///
/// On success the outcome carries the input with surrounding whitespace
/// removed. All forbidden nodes are reported, not only the first one, so a
/// corrective LLM turn sees every problem at once.
pub fn validate_sql(sql: &str) -> Outcome<String> {
    let mut outcome = Outcome::new();

    let statements = match Parser::parse_sql(&PostgreSqlDialect {}, sql) {
        Ok(statements) => statements,
        Err(e) => {
            // The parser rejects data-modifying CTE bodies it does not model
            // (e.g. DELETE). Report those as forbidden rather than as syntax.
            let in_ctes = forbidden_cte_bodies(sql);
            if in_ctes.is_empty() {
                outcome.error(DiagCode::SqlParseError, format!("SQL parse error: {}", e));
            }
            for kind in in_ctes {
                outcome.error(
                    DiagCode::ValidationError,
                    format!("Forbidden statement type: {}", kind),
                );
            }
            return outcome;
        }
    };

    if statements.len() != 1 {
        outcome.error(
            DiagCode::ValidationError,
            format!("Expected 1 statement, got {}", statements.len()),
        );
        return outcome;
    }

    if !matches!(statements[0], Statement::Query(_)) {
        outcome.error(
            DiagCode::ValidationError,
            format!(
                "Only SELECT statements allowed, got {}",
                statement_kind(&statements[0])
            ),
        );
        return outcome;
    }

    let mut forbidden = Vec::new();
    let _ = visit_statements(&statements, |stmt| {
        if let Some(kind) = ForbiddenStatement::classify(stmt) {
            forbidden.push(kind);
        }
        ControlFlow::<()>::Continue(())
    });
    for kind in forbidden {
        outcome.error(
            DiagCode::ValidationError,
            format!("Forbidden statement type: {}", kind),
        );
    }

    if outcome.ok() {
        outcome.data = Some(sql.trim().to_string());
    }
    outcome
}

/// Token-level scan for `AS [NOT] [MATERIALIZED] ( <DML>` CTE bodies.
fn forbidden_cte_bodies(sql: &str) -> Vec<ForbiddenStatement> {
    let dialect = PostgreSqlDialect {};
    let Ok(tokens) = Tokenizer::new(&dialect, sql).tokenize() else {
        return Vec::new();
    };
    let tokens: Vec<&Token> = tokens
        .iter()
        .filter(|t| !matches!(t, Token::Whitespace(_)))
        .collect();

    let keyword = |t: &Token| match t {
        Token::Word(w) if w.quote_style.is_none() => Some(w.keyword),
        _ => None,
    };

    let mut found = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        if keyword(*token) != Some(Keyword::AS) {
            continue;
        }
        let mut j = i + 1;
        while j < tokens.len()
            && matches!(keyword(tokens[j]), Some(Keyword::NOT) | Some(Keyword::MATERIALIZED))
        {
            j += 1;
        }
        if !matches!(tokens.get(j), Some(Token::LParen)) {
            continue;
        }
        let kind = match tokens.get(j + 1).and_then(|t| keyword(*t)) {
            Some(Keyword::DELETE) => ForbiddenStatement::Delete,
            Some(Keyword::INSERT) => ForbiddenStatement::Insert,
            Some(Keyword::UPDATE) => ForbiddenStatement::Update,
            _ => continue,
        };
        found.push(kind);
    }
    found
}

/// Human-readable kind of a top-level statement.
fn statement_kind(stmt: &Statement) -> String {
    if let Some(kind) = ForbiddenStatement::classify(stmt) {
        return kind.to_string();
    }
    // Variant name from the Debug form, e.g. `Explain { .. }` -> `Explain`.
    let debug = format!("{:?}", stmt);
    debug
        .split(|c: char| !c.is_alphanumeric())
        .next()
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codes(outcome: &Outcome<String>) -> Vec<DiagCode> {
        outcome.diagnostics.iter().map(|d| d.code).collect()
    }

    #[test]
    fn test_valid_simple_select() {
        let r = validate_sql("SELECT 1");
        assert!(r.ok());
        assert_eq!(r.data.as_deref(), Some("SELECT 1"));
    }

    #[test]
    fn test_strips_whitespace() {
        let r = validate_sql("  SELECT 1  ");
        assert!(r.ok());
        assert!(r.diagnostics.is_empty());
        assert_eq!(r.data.as_deref(), Some("SELECT 1"));
    }

    #[test]
    fn test_valid_select_with_cte_and_subquery() {
        let sql = "WITH totals AS (SELECT name, SUM(revenue) AS revenue FROM customers GROUP BY name) \
                   SELECT * FROM totals WHERE revenue > (SELECT AVG(revenue) FROM totals) ORDER BY revenue DESC";
        let r = validate_sql(sql);
        assert!(r.ok(), "{:?}", r.diagnostics);
    }

    #[test]
    fn test_reject_top_level_mutations() {
        for sql in [
            "INSERT INTO users (name) VALUES ('x')",
            "UPDATE users SET name = 'x'",
            "DELETE FROM users",
            "DROP TABLE users",
            "CREATE TABLE t (id INT)",
            "TRUNCATE users",
        ] {
            let r = validate_sql(sql);
            assert!(!r.ok(), "{} should be rejected", sql);
            assert_eq!(codes(&r), vec![DiagCode::ValidationError], "{}", sql);
            assert!(r.diagnostics[0].message.starts_with("Only SELECT statements allowed"));
        }
    }

    #[test]
    fn test_reject_insert_after_with_clause() {
        let r = validate_sql("WITH x AS (SELECT 1 AS a) INSERT INTO t SELECT a FROM x");
        assert!(!r.ok());
        assert!(r
            .diagnostics
            .iter()
            .any(|d| d.code == DiagCode::ValidationError && d.message.contains("INSERT")));
    }

    #[test]
    fn test_reject_dml_in_cte() {
        let r = validate_sql("WITH x AS (INSERT INTO users (name) VALUES ('x') RETURNING *) SELECT * FROM x");
        assert!(!r.ok());
        assert!(r
            .diagnostics
            .iter()
            .any(|d| d.code == DiagCode::ValidationError && d.message == "Forbidden statement type: INSERT"));
    }

    #[test]
    fn test_reject_delete_in_cte() {
        let r = validate_sql("WITH d AS (DELETE FROM users RETURNING *) SELECT * FROM d");
        assert_eq!(codes(&r), vec![DiagCode::ValidationError]);
        assert_eq!(r.diagnostics[0].message, "Forbidden statement type: DELETE");

        let r = validate_sql(
            "WITH d AS MATERIALIZED (DELETE FROM users RETURNING id) SELECT count(*) FROM d",
        );
        assert_eq!(codes(&r), vec![DiagCode::ValidationError]);
    }

    #[test]
    fn test_cte_scan_ignores_string_literals() {
        let r = validate_sql("SELECT 'AS (DELETE' AS note FROM");
        assert_eq!(codes(&r), vec![DiagCode::SqlParseError]);
    }

    #[test]
    fn test_reject_multiple_statements() {
        let r = validate_sql("SELECT 1; SELECT 2");
        assert_eq!(codes(&r), vec![DiagCode::ValidationError]);
        assert_eq!(r.diagnostics[0].message, "Expected 1 statement, got 2");
    }

    #[test]
    fn test_reject_syntax_error() {
        let r = validate_sql("SELECTTTT 1");
        assert_eq!(codes(&r), vec![DiagCode::SqlParseError]);
        assert!(r.data.is_none());
    }

    #[test]
    fn test_empty_input_has_zero_statements() {
        let r = validate_sql("   ");
        assert!(!r.ok());
        assert_eq!(r.diagnostics[0].message, "Expected 1 statement, got 0");
    }

    #[test]
    fn test_create_table_as_is_named() {
        let r = validate_sql("CREATE TABLE t AS SELECT 1");
        assert!(!r.ok());
        assert!(r.diagnostics[0].message.contains("CREATE TABLE AS"));
    }
}
