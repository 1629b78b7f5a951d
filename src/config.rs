//! Configuration
//!
//! `LumenConfig` lives in `<home>/config.json`, where home is `$LUMEN_HOME`
//! or `~/.lumen`. Every helper takes the home directory explicitly so callers
//! (and tests) decide where state lives.

use crate::error::{LumenError, Result};
use crate::viz::theme::THEME_NAME;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const HOME_ENV: &str = "LUMEN_HOME";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(rename = "type", default = "default_connection_type")]
    pub kind: String,
    #[serde(default)]
    pub dsn: String,
    #[serde(default = "default_schema_name")]
    pub schema_name: String,
}

impl ConnectionConfig {
    pub fn postgres(dsn: impl Into<String>, schema_name: impl Into<String>) -> Self {
        Self {
            kind: default_connection_type(),
            dsn: dsn.into(),
            schema_name: schema_name.into(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::postgres("", default_schema_name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            timeout_seconds: default_llm_timeout(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsConfig {
    #[serde(default = "default_max_result_rows")]
    pub max_result_rows: usize,
    #[serde(default = "default_statement_timeout")]
    pub statement_timeout_seconds: u64,
    #[serde(default = "default_theme")]
    pub theme: String,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            max_result_rows: default_max_result_rows(),
            statement_timeout_seconds: default_statement_timeout(),
            theme: default_theme(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LumenConfig {
    #[serde(default)]
    pub connections: BTreeMap<String, ConnectionConfig>,
    #[serde(default)]
    pub active_connection: Option<String>,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
}

impl LumenConfig {
    /// The active connection, falling back to the first configured one.
    pub fn active_connection(&self) -> Option<(&str, &ConnectionConfig)> {
        if let Some(name) = &self.active_connection {
            if let Some(conn) = self.connections.get(name) {
                return Some((name.as_str(), conn));
            }
        }
        self.connections
            .iter()
            .next()
            .map(|(name, conn)| (name.as_str(), conn))
    }

    pub fn require_active_connection(&self) -> Result<(&str, &ConnectionConfig)> {
        self.active_connection().ok_or_else(|| {
            LumenError::Config("No connection configured. Run `lumen connect <dsn>` first.".to_string())
        })
    }
}

fn default_connection_type() -> String {
    "postgresql".to_string()
}

fn default_schema_name() -> String {
    "public".to_string()
}

fn default_provider() -> String {
    "anthropic".to_string()
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_max_result_rows() -> usize {
    1000
}

fn default_statement_timeout() -> u64 {
    30
}

fn default_theme() -> String {
    THEME_NAME.to_string()
}

/// `$LUMEN_HOME`, else `~/.lumen`.
pub fn lumen_home() -> Result<PathBuf> {
    if let Ok(home) = std::env::var(HOME_ENV) {
        if !home.is_empty() {
            return Ok(PathBuf::from(home));
        }
    }
    dirs::home_dir()
        .map(|home| home.join(".lumen"))
        .ok_or_else(|| LumenError::Config("Cannot determine home directory".to_string()))
}

pub fn config_path(home: &Path) -> PathBuf {
    home.join(CONFIG_FILE)
}

pub fn notebooks_dir(home: &Path) -> PathBuf {
    home.join("notebooks")
}

pub fn projects_dir(home: &Path) -> PathBuf {
    home.join("projects")
}

pub fn project_dir(home: &Path, name: &str) -> PathBuf {
    projects_dir(home).join(name)
}

pub fn ensure_dirs(home: &Path) -> Result<()> {
    fs::create_dir_all(notebooks_dir(home))?;
    fs::create_dir_all(projects_dir(home))?;
    Ok(())
}

/// Load the config, returning defaults when the file does not exist.
pub fn load_config(home: &Path) -> Result<LumenConfig> {
    let path = config_path(home);
    if !path.exists() {
        return Ok(LumenConfig::default());
    }
    let text = fs::read_to_string(&path)?;
    serde_json::from_str(&text)
        .map_err(|e| LumenError::Config(format!("Invalid config {}: {}", path.display(), e)))
}

pub fn save_config(home: &Path, config: &LumenConfig) -> Result<()> {
    ensure_dirs(home)?;
    let mut text = serde_json::to_string_pretty(config)?;
    text.push('\n');
    fs::write(config_path(home), text)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(dir.path()).unwrap();
        assert_eq!(config.settings.max_result_rows, 1000);
        assert_eq!(config.settings.statement_timeout_seconds, 30);
        assert_eq!(config.llm.api_key_env, "ANTHROPIC_API_KEY");
        assert_eq!(config.llm.timeout_seconds, 60);
        assert!(config.active_connection().is_none());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            config_path(dir.path()),
            r#"{"connections": {"prod": {"dsn": "postgresql://localhost/prod"}}, "llm": {"model": "m"}}"#,
        )
        .unwrap();
        let config = load_config(dir.path()).unwrap();
        let (name, conn) = config.active_connection().unwrap();
        assert_eq!(name, "prod");
        assert_eq!(conn.kind, "postgresql");
        assert_eq!(conn.schema_name, "public");
        assert_eq!(config.llm.model, "m");
        assert_eq!(config.llm.provider, "anthropic");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = LumenConfig::default();
        config
            .connections
            .insert("a".to_string(), ConnectionConfig::postgres("postgresql://a", "public"));
        config
            .connections
            .insert("b".to_string(), ConnectionConfig::postgres("postgresql://b", "sales"));
        config.active_connection = Some("b".to_string());
        save_config(dir.path(), &config).unwrap();

        assert!(notebooks_dir(dir.path()).is_dir());
        let loaded = load_config(dir.path()).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.active_connection().unwrap().1.schema_name, "sales");
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(config_path(dir.path()), "{not json").unwrap();
        let err = load_config(dir.path()).unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }
}
