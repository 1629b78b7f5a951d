//! Starter questions generated from the schema, cached per schema hash in
//! `<project>/suggestions_cache.json`.

use crate::agent::llm::LanguageModel;
use crate::diagnostics::{DiagCode, Outcome};
use crate::error::{LumenError, Result};
use crate::schema::SchemaContext;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

pub const SUGGESTIONS_CACHE_FILE: &str = "suggestions_cache.json";
pub const MAX_SUGGESTIONS: usize = 10;

const SUGGESTIONS_MAX_TOKENS: u32 = 1024;
const SUGGESTIONS_TEMPERATURE: f32 = 0.7;
const SUGGESTIONS_REQUEST: &str = "Generate 10 suggestion questions.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionsCache {
    pub schema_hash: String,
    pub suggestions: Vec<String>,
}

fn cache_path(project_dir: &Path) -> PathBuf {
    project_dir.join(SUGGESTIONS_CACHE_FILE)
}

/// Cached suggestions, `None` when absent or unreadable.
pub fn load_cached_suggestions(project_dir: &Path) -> Option<SuggestionsCache> {
    let path = cache_path(project_dir);
    let text = fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&text) {
        Ok(cache) => Some(cache),
        Err(e) => {
            warn!("Ignoring unreadable suggestions cache {}: {}", path.display(), e);
            None
        }
    }
}

pub fn save_suggestions_cache(project_dir: &Path, cache: &SuggestionsCache) -> Result<()> {
    fs::create_dir_all(project_dir)?;
    let mut text = serde_json::to_string_pretty(cache)?;
    text.push('\n');
    fs::write(cache_path(project_dir), text)?;
    Ok(())
}

pub fn build_suggestions_prompt(ctx: &SchemaContext) -> String {
    format!(
        "You are a data analyst assistant. Given the database schema below, generate 10 diverse, \
natural-language questions that a business user might ask about this data.

{}

## Rules
1. Each question must be specific to the schema: reference real tables and concepts.
2. Vary question types: trends, comparisons, top-N, aggregations, distributions, outliers.
3. Use natural language a non-technical person would use. No SQL syntax or column names.
4. Keep each question under 60 characters.
5. Return a JSON array of 10 strings, nothing else.",
        ctx.to_xml()
    )
}

fn strip_fences(text: &str) -> String {
    static OPEN: OnceLock<Regex> = OnceLock::new();
    static CLOSE: OnceLock<Regex> = OnceLock::new();
    let open = OPEN
        .get_or_init(|| Regex::new(r"^```(?:json)?\s*\n?").expect("fence pattern is a valid regex"));
    let close = CLOSE
        .get_or_init(|| Regex::new(r"\n?```\s*$").expect("fence pattern is a valid regex"));

    let text = open.replace(text.trim(), "");
    close.replace(text.trim(), "").into_owned()
}

/// Parse a model reply into at most [`MAX_SUGGESTIONS`] questions.
/// Markdown code fences around the JSON array are tolerated.
pub fn parse_suggestions(text: &str) -> Outcome<Vec<String>> {
    let mut outcome = Outcome::new();
    if text.trim().is_empty() {
        outcome.error(DiagCode::ParseError, "LLM returned no text content");
        return outcome;
    }

    match serde_json::from_str::<Value>(&strip_fences(text)) {
        Ok(Value::Array(items)) => {
            let questions = items
                .into_iter()
                .take(MAX_SUGGESTIONS)
                .map(|item| match item {
                    Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect();
            outcome.data = Some(questions);
        }
        Ok(_) => outcome.error(DiagCode::ParseError, "LLM response is not a JSON array"),
        Err(e) => outcome.error(
            DiagCode::ParseError,
            format!("Failed to parse LLM response as JSON: {}", e),
        ),
    }
    outcome
}

/// Ask the model for fresh suggestions. Nothing is cached here.
pub async fn generate_suggestions(llm: &dyn LanguageModel, ctx: &SchemaContext) -> Outcome<Vec<String>> {
    let mut outcome = Outcome::new();
    if let Err(e) = llm.ensure_credentials() {
        outcome.error(DiagCode::ConfigError, e.to_string());
        return outcome;
    }

    let prompt = build_suggestions_prompt(ctx);
    match llm
        .complete_text(&prompt, SUGGESTIONS_REQUEST, SUGGESTIONS_TEMPERATURE, SUGGESTIONS_MAX_TOKENS)
        .await
    {
        Ok(text) => parse_suggestions(&text),
        Err(LumenError::Config(message)) => {
            outcome.error(DiagCode::ConfigError, message);
            outcome
        }
        Err(e) => {
            outcome.error(DiagCode::ApiError, format!("Anthropic API error: {}", e));
            outcome
        }
    }
}

/// Suggestions for `ctx`: the cached list when its schema hash still
/// matches, otherwise freshly generated and written back to the cache.
pub async fn suggestions(
    project_dir: &Path,
    llm: &dyn LanguageModel,
    ctx: &SchemaContext,
) -> Outcome<Vec<String>> {
    if let Some(cache) = load_cached_suggestions(project_dir) {
        if cache.schema_hash == ctx.hash && !cache.suggestions.is_empty() {
            debug!("Using cached suggestions for {}", ctx.hash);
            return Outcome::success(cache.suggestions);
        }
    }

    let mut outcome = generate_suggestions(llm, ctx).await;
    if let Some(questions) = outcome.data.clone().filter(|q| !q.is_empty()) {
        let cache = SuggestionsCache {
            schema_hash: ctx.hash.clone(),
            suggestions: questions,
        };
        match save_suggestions_cache(project_dir, &cache) {
            Ok(()) => info!("Cached {} suggestions", cache.suggestions.len()),
            Err(e) => outcome.warning(
                DiagCode::ConfigError,
                format!("Failed to cache suggestions: {}", e),
            ),
        }
    }
    outcome
}
