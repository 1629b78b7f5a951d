//! PostgreSQL schema introspection using sqlx

use crate::error::Result;
use crate::schema::snapshot::{ColumnSnapshot, SchemaSnapshot, TableSnapshot};
use chrono::Utc;
use sqlx::PgPool;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Read tables, columns, keys and statistics of one schema.
pub async fn introspect(pool: &PgPool, schema_name: &str) -> Result<SchemaSnapshot> {
    let (database,): (String,) = sqlx::query_as("SELECT current_database()::text")
        .fetch_one(pool)
        .await?;

    let table_rows: Vec<(String, f32, Option<String>)> = sqlx::query_as(
        r#"
        SELECT c.relname::text, c.reltuples, obj_description(c.oid, 'pg_class')
        FROM pg_class c
        JOIN pg_namespace n ON n.oid = c.relnamespace
        WHERE n.nspname = $1 AND c.relkind IN ('r', 'v', 'm', 'p')
        "#,
    )
    .bind(schema_name)
    .fetch_all(pool)
    .await?;

    let mut tables: BTreeMap<String, TableSnapshot> = table_rows
        .into_iter()
        .map(|(name, reltuples, comment)| {
            let table = TableSnapshot {
                name: name.clone(),
                row_count: reltuples.max(0.0) as i64,
                comment,
                columns: Vec::new(),
            };
            (name, table)
        })
        .collect();

    let column_rows: Vec<(String, String, String, String, Option<String>)> = sqlx::query_as(
        r#"
        SELECT cols.table_name::text,
               cols.column_name::text,
               cols.data_type::text,
               cols.is_nullable::text,
               col_description(c.oid, cols.ordinal_position::int)
        FROM information_schema.columns cols
        JOIN pg_namespace n ON n.nspname = cols.table_schema
        JOIN pg_class c ON c.relnamespace = n.oid AND c.relname = cols.table_name
        WHERE cols.table_schema = $1
        ORDER BY cols.table_name, cols.ordinal_position
        "#,
    )
    .bind(schema_name)
    .fetch_all(pool)
    .await?;

    for (table_name, column_name, data_type, is_nullable, comment) in column_rows {
        let table = tables
            .entry(table_name.clone())
            .or_insert_with(|| TableSnapshot {
                name: table_name,
                ..Default::default()
            });
        table.columns.push(ColumnSnapshot {
            name: column_name,
            data_type,
            is_nullable: is_nullable == "YES",
            comment,
            ..Default::default()
        });
    }

    let constraint_rows: Vec<(String, String, String, Option<String>, Option<String>)> =
        sqlx::query_as(
            r#"
            SELECT tc.table_name::text,
                   kcu.column_name::text,
                   tc.constraint_type::text,
                   ccu.table_name::text,
                   ccu.column_name::text
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
              ON kcu.constraint_name = tc.constraint_name AND kcu.table_schema = tc.table_schema
            LEFT JOIN information_schema.constraint_column_usage ccu
              ON ccu.constraint_name = tc.constraint_name AND ccu.table_schema = tc.table_schema
            WHERE tc.table_schema = $1
              AND tc.constraint_type IN ('PRIMARY KEY', 'FOREIGN KEY')
            "#,
        )
        .bind(schema_name)
        .fetch_all(pool)
        .await?;

    for (table_name, column_name, constraint_type, foreign_table, foreign_column) in constraint_rows {
        let Some(col) = find_column(&mut tables, &table_name, &column_name) else {
            continue;
        };
        match constraint_type.as_str() {
            "PRIMARY KEY" => col.is_primary_key = true,
            "FOREIGN KEY" => {
                if let (Some(ft), Some(fc)) = (foreign_table, foreign_column) {
                    col.foreign_key = Some(format!("{}.{}", ft, fc));
                }
            }
            _ => {}
        }
    }

    // Negative n_distinct is a fraction of the row count.
    let stats_rows: Vec<(String, String, f32)> = sqlx::query_as(
        r#"
        SELECT tablename::text, attname::text, n_distinct
        FROM pg_stats
        WHERE schemaname = $1
        "#,
    )
    .bind(schema_name)
    .fetch_all(pool)
    .await?;

    for (table_name, column_name, n_distinct) in stats_rows {
        let row_count = tables.get(&table_name).map(|t| t.row_count).unwrap_or(0);
        let Some(col) = find_column(&mut tables, &table_name, &column_name) else {
            continue;
        };
        col.distinct_estimate = Some(distinct_from_stats(n_distinct, row_count));
    }

    let snapshot = SchemaSnapshot {
        database,
        schema_name: schema_name.to_string(),
        introspected_at: Utc::now().to_rfc3339(),
        tables: tables.into_values().collect(),
    };

    info!(
        "Introspected {} tables from {}.{}",
        snapshot.tables.len(),
        snapshot.database,
        schema_name
    );
    Ok(snapshot)
}

fn find_column<'a>(
    tables: &'a mut BTreeMap<String, TableSnapshot>,
    table: &str,
    column: &str,
) -> Option<&'a mut ColumnSnapshot> {
    let found = tables
        .get_mut(table)?
        .columns
        .iter_mut()
        .find(|c| c.name == column);
    if found.is_none() {
        debug!("Skipping catalog entry for unknown column {}.{}", table, column);
    }
    found
}

fn distinct_from_stats(n_distinct: f32, row_count: i64) -> i64 {
    if n_distinct >= 0.0 {
        n_distinct as i64
    } else {
        (-n_distinct as f64 * row_count as f64).round() as i64
    }
}
