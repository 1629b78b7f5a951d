//! Lumen: ask questions of a PostgreSQL database in plain language and get
//! back notebook cells holding the SQL, the result, a chart and a short
//! narrative.

pub mod agent;
pub mod cell;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod executor;
pub mod logging;
pub mod notebook;
pub mod schema;
pub mod sql;
pub mod viz;
pub mod whatif;

pub use error::{LumenError, Result};
