//! Schema Enrichment
//!
//! Tags every column of a snapshot with a role (key, time dimension,
//! categorical, measure candidate, other) from its type, name and cardinality.
//! Measure candidates also get a suggested aggregation.

use crate::schema::roles::ColumnRole;
use crate::schema::snapshot::{
    ColumnSnapshot, EnrichedColumn, EnrichedSchema, EnrichedTable, SchemaSnapshot, TableSnapshot,
};
use regex::Regex;
use std::sync::OnceLock;

const DATE_TYPES: &[&str] = &["date"];
const TIMESTAMP_TYPES: &[&str] = &[
    "timestamp",
    "timestamp without time zone",
    "timestamp with time zone",
    "timestamptz",
    "datetime",
];
const NUMERIC_TYPES: &[&str] = &[
    "integer",
    "int",
    "int2",
    "int4",
    "int8",
    "bigint",
    "smallint",
    "tinyint",
    "float",
    "double",
    "real",
    "decimal",
    "numeric",
    "double precision",
    "float4",
    "float8",
];
const BOOLEAN_TYPES: &[&str] = &["boolean", "bool"];
const STRING_TYPES: &[&str] = &["varchar", "character varying", "text", "char", "bpchar", "string"];

const HIGH_CARDINALITY_RATIO: f64 = 0.9;
const LOW_CARDINALITY_THRESHOLD: i64 = 200;

fn dimension_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)(_type|_status|_code|_name|_category|_class|_group|_level|_band|_zone|_region|_country|_descr|_acronym|_text|_label|_lang|_nl|_fr|_de|_en|is_|has_)$",
        )
        .expect("dimension pattern is a valid regex")
    })
}

fn measure_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (r"(?i)(amount|revenue|price|cost|total|fee|salary|capital)", "sum"),
            (r"(?i)(qty|quantity|count|num_|number_of)", "sum"),
            (r"(?i)(score|rating|rank|percentage|pct|ratio|rate)", "avg"),
            (r"(?i)(weight|duration|distance|size|length|height|width)", "avg"),
        ]
        .into_iter()
        .map(|(pattern, agg)| (Regex::new(pattern).expect("measure pattern is a valid regex"), agg))
        .collect()
    })
}

/// Enrich a snapshot with inferred column roles.
pub fn enrich(snapshot: &SchemaSnapshot) -> EnrichedSchema {
    EnrichedSchema {
        database: snapshot.database.clone(),
        schema_name: snapshot.schema_name.clone(),
        introspected_at: snapshot.introspected_at.clone(),
        tables: snapshot.tables.iter().map(enrich_table).collect(),
    }
}

fn enrich_table(table: &TableSnapshot) -> EnrichedTable {
    let columns = table
        .columns
        .iter()
        .map(|col| {
            let role = classify_role(col, table.row_count);
            let suggested_agg = (role == ColumnRole::MeasureCandidate)
                .then(|| suggested_aggregation(&col.name).to_string());
            EnrichedColumn {
                name: col.name.clone(),
                data_type: col.data_type.clone(),
                is_nullable: col.is_nullable,
                comment: col.comment.clone(),
                role,
                is_primary_key: col.is_primary_key,
                foreign_key: col.foreign_key.clone(),
                distinct_estimate: col.distinct_estimate,
                suggested_agg,
            }
        })
        .collect();

    EnrichedTable {
        name: table.name.clone(),
        row_count: table.row_count,
        comment: table.comment.clone(),
        columns,
    }
}

/// Strip type modifiers, e.g. `numeric(10,2)` -> `numeric`.
fn normalize_type(data_type: &str) -> String {
    let base = match data_type.find('(') {
        Some(open) => {
            let close = data_type[open..].find(')').map(|i| open + i + 1).unwrap_or(data_type.len());
            format!("{}{}", &data_type[..open], &data_type[close..])
        }
        None => data_type.to_string(),
    };
    base.trim().to_lowercase()
}

pub fn classify_role(col: &ColumnSnapshot, row_count: i64) -> ColumnRole {
    let norm = normalize_type(&col.data_type);
    let norm = norm.as_str();

    if col.is_primary_key || col.foreign_key.is_some() {
        return ColumnRole::Key;
    }
    if is_likely_key(col, row_count) {
        return ColumnRole::Key;
    }
    if DATE_TYPES.contains(&norm) || TIMESTAMP_TYPES.contains(&norm) {
        return ColumnRole::TimeDimension;
    }
    if BOOLEAN_TYPES.contains(&norm) {
        return ColumnRole::Categorical;
    }

    if STRING_TYPES.contains(&norm) || norm.starts_with("character") {
        if dimension_pattern().is_match(&col.name) {
            return ColumnRole::Categorical;
        }
        if let Some(distinct) = col.distinct_estimate {
            if distinct <= LOW_CARDINALITY_THRESHOLD {
                return ColumnRole::Categorical;
            }
            if row_count > 0 && (distinct as f64 / row_count as f64) < HIGH_CARDINALITY_RATIO {
                return ColumnRole::Categorical;
            }
        }
        return ColumnRole::Other;
    }

    if NUMERIC_TYPES.contains(&norm) {
        if col.name.ends_with("_id") {
            return ColumnRole::Key;
        }
        return ColumnRole::MeasureCandidate;
    }

    ColumnRole::Other
}

/// `*_id` columns are keys unless statistics show low cardinality.
fn is_likely_key(col: &ColumnSnapshot, row_count: i64) -> bool {
    if !col.name.ends_with("_id") {
        return false;
    }
    match col.distinct_estimate {
        Some(distinct) if row_count > 0 => distinct as f64 / row_count as f64 > HIGH_CARDINALITY_RATIO,
        _ => true,
    }
}

pub fn suggested_aggregation(column_name: &str) -> &'static str {
    measure_patterns()
        .iter()
        .find(|(pattern, _)| pattern.is_match(column_name))
        .map(|(_, agg)| *agg)
        .unwrap_or("sum")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, data_type: &str) -> ColumnSnapshot {
        ColumnSnapshot {
            name: name.to_string(),
            data_type: data_type.to_string(),
            is_nullable: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_primary_and_foreign_keys() {
        let mut pk = col("id", "integer");
        pk.is_primary_key = true;
        assert_eq!(classify_role(&pk, 100), ColumnRole::Key);

        let mut fk = col("customer", "integer");
        fk.foreign_key = Some("customers.id".to_string());
        assert_eq!(classify_role(&fk, 100), ColumnRole::Key);
    }

    #[test]
    fn test_id_suffix_with_low_cardinality_is_not_key() {
        let mut c = col("region_id", "text");
        c.distinct_estimate = Some(5);
        assert_eq!(classify_role(&c, 1000), ColumnRole::Categorical);
        assert_eq!(classify_role(&col("order_id", "text"), 1000), ColumnRole::Key);
    }

    #[test]
    fn test_time_numeric_and_boolean_roles() {
        assert_eq!(classify_role(&col("created_at", "timestamp with time zone"), 10), ColumnRole::TimeDimension);
        assert_eq!(classify_role(&col("day", "date"), 10), ColumnRole::TimeDimension);
        assert_eq!(classify_role(&col("revenue", "numeric(12,2)"), 10), ColumnRole::MeasureCandidate);
        assert_eq!(classify_role(&col("active", "boolean"), 10), ColumnRole::Categorical);
    }

    #[test]
    fn test_string_roles_by_name_and_cardinality() {
        assert_eq!(classify_role(&col("order_status", "character varying(20)"), 10), ColumnRole::Categorical);
        let mut email = col("email", "text");
        email.distinct_estimate = Some(9_900);
        assert_eq!(classify_role(&email, 10_000), ColumnRole::Other);
        let mut city = col("city", "text");
        city.distinct_estimate = Some(150);
        assert_eq!(classify_role(&city, 10_000), ColumnRole::Categorical);
    }

    #[test]
    fn test_suggested_aggregation() {
        assert_eq!(suggested_aggregation("total_revenue"), "sum");
        assert_eq!(suggested_aggregation("avg_rating"), "avg");
        assert_eq!(suggested_aggregation("widgets"), "sum");
    }

    #[test]
    fn test_enrich_sets_agg_only_for_measures() {
        let snapshot = SchemaSnapshot {
            database: "shop".to_string(),
            schema_name: "public".to_string(),
            introspected_at: "2024-01-01T00:00:00Z".to_string(),
            tables: vec![TableSnapshot {
                name: "orders".to_string(),
                row_count: 10,
                comment: None,
                columns: vec![col("price", "numeric"), col("placed_at", "date")],
            }],
        };
        let enriched = enrich(&snapshot);
        let columns = &enriched.tables[0].columns;
        assert_eq!(columns[0].suggested_agg.as_deref(), Some("sum"));
        assert_eq!(columns[1].suggested_agg, None);
        assert_eq!(enriched.database, "shop");
    }
}
