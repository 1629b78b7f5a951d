//! Column roles and the role lookup consumed by chart auto-detection.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Semantic role of a column, inferred during schema enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    Key,
    TimeDimension,
    Categorical,
    MeasureCandidate,
    #[default]
    Other,
}

impl ColumnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnRole::Key => "key",
            ColumnRole::TimeDimension => "time_dimension",
            ColumnRole::Categorical => "categorical",
            ColumnRole::MeasureCandidate => "measure_candidate",
            ColumnRole::Other => "other",
        }
    }
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only map from column name to role.
pub trait RoleLookup {
    fn role_of(&self, column: &str) -> Option<ColumnRole>;
}

impl RoleLookup for HashMap<String, ColumnRole> {
    fn role_of(&self, column: &str) -> Option<ColumnRole> {
        self.get(column).copied()
    }
}

/// Lookup that knows no roles; everything falls back to type inference.
pub struct NoRoles;

impl RoleLookup for NoRoles {
    fn role_of(&self, _column: &str) -> Option<ColumnRole> {
        None
    }
}
