//! On-disk schema cache, one `schema_cache.json` per project directory.

use crate::error::Result;
use crate::schema::context::SchemaContext;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CACHE_FILE: &str = "schema_cache.json";

pub fn cache_path(project_dir: &Path) -> PathBuf {
    project_dir.join(CACHE_FILE)
}

/// Load the cached context, `None` when nothing was cached yet.
pub fn load_cached(project_dir: &Path) -> Result<Option<SchemaContext>> {
    let path = cache_path(project_dir);
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(&path)?;
    let ctx: SchemaContext = serde_json::from_str(&text)?;
    debug!("Loaded schema cache from {}", path.display());
    Ok(Some(ctx))
}

pub fn save_cache(project_dir: &Path, ctx: &SchemaContext) -> Result<()> {
    fs::create_dir_all(project_dir)?;
    let path = cache_path(project_dir);
    let mut text = serde_json::to_string_pretty(ctx)?;
    text.push('\n');
    fs::write(&path, text)?;
    debug!("Saved schema cache to {}", path.display());
    Ok(())
}

/// True when there is no cache or its hash differs from `current_hash`.
pub fn is_stale(project_dir: &Path, current_hash: &str) -> Result<bool> {
    Ok(match load_cached(project_dir)? {
        Some(cached) => cached.hash != current_hash,
        None => true,
    })
}
