//! Notebooks: ordered cells persisted as one JSON file per notebook.

pub mod store;

use crate::cell::Cell;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use store::NotebookStore;

/// `nb_` followed by 12 hex chars.
pub fn generate_notebook_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("nb_{}", &hex[..12])
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notebook {
    #[serde(default = "generate_notebook_id")]
    pub id: String,
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub connection_name: String,
    #[serde(default)]
    pub cells: Vec<Cell>,
}

fn default_name() -> String {
    "Untitled".to_string()
}

impl Notebook {
    pub fn new(connection_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: generate_notebook_id(),
            name: default_name(),
            created_at: now,
            updated_at: now,
            connection_name: connection_name.into(),
            cells: Vec::new(),
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Default for Notebook {
    fn default() -> Self {
        Self::new("")
    }
}
