//! Schema Module
//!
//! Snapshot of a database schema, enrichment with column roles, the context
//! rendered into planner prompts, project documentation merged into that
//! context, and its on-disk cache.

pub mod augment;
pub mod cache;
pub mod context;
pub mod enrich;
pub mod introspect;
pub mod roles;
pub mod snapshot;

pub use augment::augment_schema;
pub use context::SchemaContext;
pub use enrich::enrich;
pub use roles::{ColumnRole, NoRoles, RoleLookup};
pub use snapshot::{
    ColumnSnapshot, EnrichedColumn, EnrichedSchema, EnrichedTable, SchemaSnapshot, TableSnapshot,
};
