//! Language model seam and the Anthropic Messages API client.

use crate::agent::prompts::{narrate_tool, plan_tool, NARRATE_TOOL_NAME, PLAN_TOOL_NAME};
use crate::cell::DataReference;
use crate::config::LlmConfig;
use crate::error::{LumenError, Result};
use crate::whatif::{Technique, TrendParams};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const NARRATE_MAX_TOKENS: u32 = 1024;

/// What-if projection requested alongside a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhatIfRequest {
    pub technique: Technique,
    #[serde(default)]
    pub time_field: String,
    #[serde(default)]
    pub measure: String,
    #[serde(default = "default_periods_ahead")]
    pub periods_ahead: i64,
    #[serde(default = "default_period_interval")]
    pub period_interval: String,
}

fn default_periods_ahead() -> i64 {
    3
}

fn default_period_interval() -> String {
    "month".to_string()
}

impl WhatIfRequest {
    pub fn trend_params(&self) -> TrendParams {
        TrendParams {
            time_field: self.time_field.clone(),
            measure: self.measure.clone(),
            periods_ahead: self.periods_ahead,
            period_interval: self.period_interval.clone(),
        }
    }
}

/// Output of one planner call.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanResult {
    pub reasoning: String,
    pub sql: String,
    pub chart_spec: Value,
    pub whatif: Option<WhatIfRequest>,
    /// Tool input as received, echoed back in correction turns.
    pub raw_input: Value,
}

impl PlanResult {
    /// Read a `plan_query` tool input. Missing fields default to empty; a
    /// malformed `whatif` block is dropped rather than failing the plan.
    pub fn from_tool_input(input: Value) -> Self {
        let text = |key: &str| {
            input
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let whatif = match input.get("whatif") {
            None | Some(Value::Null) => None,
            Some(raw) => match serde_json::from_value::<WhatIfRequest>(raw.clone()) {
                Ok(request) => Some(request),
                Err(e) => {
                    warn!("Ignoring malformed whatif request: {}", e);
                    None
                }
            },
        };
        Self {
            reasoning: text("reasoning"),
            sql: text("sql"),
            chart_spec: input.get("chart_spec").cloned().unwrap_or(Value::Null),
            whatif,
            raw_input: input,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Narration {
    #[serde(default)]
    pub narrative: String,
    #[serde(default)]
    pub data_references: Vec<DataReference>,
}

/// One turn of the planning conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationTurn {
    User(String),
    /// A previous `plan_query` call by the model.
    PlanAttempt { id: String, input: Value },
    /// Corrective feedback answering a plan attempt.
    Feedback { tool_use_id: String, content: String },
}

impl ConversationTurn {
    fn to_message(&self) -> Value {
        match self {
            ConversationTurn::User(text) => json!({"role": "user", "content": text}),
            ConversationTurn::PlanAttempt { id, input } => json!({
                "role": "assistant",
                "content": [{"type": "tool_use", "id": id, "name": PLAN_TOOL_NAME, "input": input}]
            }),
            ConversationTurn::Feedback { tool_use_id, content } => json!({
                "role": "user",
                "content": [{"type": "tool_result", "tool_use_id": tool_use_id, "content": content}]
            }),
        }
    }
}

/// Planner and narrator.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model(&self) -> &str;

    /// Fails with a config error when no credentials are available.
    fn ensure_credentials(&self) -> Result<()> {
        Ok(())
    }

    async fn plan(&self, system_prompt: &str, conversation: &[ConversationTurn]) -> Result<PlanResult>;

    async fn narrate(&self, system_prompt: &str) -> Result<Narration>;

    /// Free-form text reply to a single user message.
    async fn complete_text(
        &self,
        _system_prompt: &str,
        _user_message: &str,
        _temperature: f32,
        _max_tokens: u32,
    ) -> Result<String> {
        Err(LumenError::Llm(format!(
            "{} does not support text completion",
            self.model()
        )))
    }
}

pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: Option<String>,
    api_key_env: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    /// Build a client, reading the API key from the variable named by
    /// `api_key_env`. A missing key is reported by `ensure_credentials`.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.is_empty());
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            http,
            api_key,
            api_key_env: config.api_key_env.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    async fn call_tool(
        &self,
        system_prompt: &str,
        messages: Vec<Value>,
        tool: Value,
        tool_name: &str,
        max_tokens: u32,
    ) -> Result<Value> {
        let body = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "temperature": 0,
            "system": system_prompt,
            "messages": messages,
            "tools": [tool],
            "tool_choice": {"type": "tool", "name": tool_name}
        });

        let response_json = self.send(&body).await?;
        extract_tool_input(&response_json, tool_name)
            .ok_or_else(|| LumenError::Llm(format!("LLM did not return a {} tool call", tool_name)))
    }

    async fn send(&self, body: &Value) -> Result<Value> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| self.missing_key_error())?;

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| LumenError::Llm(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LumenError::Llm(format!("LLM API returned {}: {}", status, text)));
        }

        response
            .json()
            .await
            .map_err(|e| LumenError::Llm(format!("Failed to parse LLM response: {}", e)))
    }

    fn missing_key_error(&self) -> LumenError {
        LumenError::Config(format!(
            "Missing API key: set {} environment variable",
            self.api_key_env
        ))
    }
}

/// Input of the first `tool_use` block named `tool_name`.
fn extract_tool_input(response: &Value, tool_name: &str) -> Option<Value> {
    response
        .get("content")?
        .as_array()?
        .iter()
        .find(|block| {
            block.get("type").and_then(Value::as_str) == Some("tool_use")
                && block.get("name").and_then(Value::as_str) == Some(tool_name)
        })
        .and_then(|block| block.get("input").cloned())
}

/// Text of the first `text` block.
fn extract_text(response: &Value) -> Option<String> {
    response
        .get("content")?
        .as_array()?
        .iter()
        .find(|block| block.get("type").and_then(Value::as_str) == Some("text"))
        .and_then(|block| block.get("text")?.as_str().map(str::to_string))
}

#[async_trait]
impl LanguageModel for AnthropicClient {
    fn model(&self) -> &str {
        &self.model
    }

    fn ensure_credentials(&self) -> Result<()> {
        match self.api_key {
            Some(_) => Ok(()),
            None => Err(self.missing_key_error()),
        }
    }

    async fn plan(&self, system_prompt: &str, conversation: &[ConversationTurn]) -> Result<PlanResult> {
        let messages = conversation.iter().map(ConversationTurn::to_message).collect();
        let input = self
            .call_tool(system_prompt, messages, plan_tool(), PLAN_TOOL_NAME, self.max_tokens)
            .await?;
        let plan = PlanResult::from_tool_input(input);
        debug!("Planner returned sql ({} chars)", plan.sql.len());
        Ok(plan)
    }

    async fn narrate(&self, system_prompt: &str) -> Result<Narration> {
        let messages = vec![json!({"role": "user", "content": "Generate the narrative insight."})];
        let input = self
            .call_tool(
                system_prompt,
                messages,
                narrate_tool(),
                NARRATE_TOOL_NAME,
                NARRATE_MAX_TOKENS,
            )
            .await?;
        serde_json::from_value(input)
            .map_err(|e| LumenError::Llm(format!("Malformed narrate_results input: {}", e)))
    }

    async fn complete_text(
        &self,
        system_prompt: &str,
        user_message: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String> {
        let body = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "temperature": temperature,
            "system": system_prompt,
            "messages": [{"role": "user", "content": user_message}],
        });
        let response_json = self.send(&body).await?;
        extract_text(&response_json)
            .ok_or_else(|| LumenError::Llm("LLM response contained no text block".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_from_tool_input() {
        let plan = PlanResult::from_tool_input(json!({
            "reasoning": "sum by month",
            "sql": "SELECT 1",
            "chart_spec": {"mark": "bar"},
            "whatif": {"technique": "trend_extrapolation", "time_field": "month", "measure": "revenue"}
        }));
        assert_eq!(plan.sql, "SELECT 1");
        assert_eq!(plan.chart_spec["mark"], "bar");
        let whatif = plan.whatif.unwrap();
        assert_eq!(whatif.technique, Technique::TrendExtrapolation);
        assert_eq!(whatif.periods_ahead, 3);
        assert_eq!(whatif.trend_params().period_interval, "month");
    }

    #[test]
    fn test_plan_tolerates_missing_and_malformed_fields() {
        let plan = PlanResult::from_tool_input(json!({"sql": "SELECT 1", "whatif": "soon"}));
        assert_eq!(plan.reasoning, "");
        assert_eq!(plan.chart_spec, Value::Null);
        assert!(plan.whatif.is_none());
    }

    #[test]
    fn test_narration_keeps_text_with_partial_references() {
        let narration: Narration = serde_json::from_value(json!({
            "narrative": "West leads with 300.",
            "data_references": [{"ref_id": "r1", "text": "300"}]
        }))
        .unwrap();
        assert_eq!(narration.narrative, "West leads with 300.");
        assert_eq!(narration.data_references[0].ref_id, "r1");
        assert_eq!(narration.data_references[0].source, "");
    }

    #[test]
    fn test_extract_tool_input() {
        let response = json!({
            "content": [
                {"type": "text", "text": "thinking"},
                {"type": "tool_use", "name": "plan_query", "id": "t1", "input": {"sql": "SELECT 2"}}
            ]
        });
        assert_eq!(
            extract_tool_input(&response, "plan_query"),
            Some(json!({"sql": "SELECT 2"}))
        );
        assert_eq!(extract_tool_input(&response, "narrate_results"), None);
    }

    #[test]
    fn test_extract_first_text_block() {
        let response = json!({
            "content": [
                {"type": "tool_use", "name": "plan_query", "id": "t1", "input": {}},
                {"type": "text", "text": "[\"a\"]"},
                {"type": "text", "text": "second"}
            ]
        });
        assert_eq!(extract_text(&response).as_deref(), Some("[\"a\"]"));
        assert_eq!(extract_text(&json!({"content": []})), None);
    }

    #[test]
    fn test_conversation_messages() {
        let turns = [
            ConversationTurn::User("q".to_string()),
            ConversationTurn::PlanAttempt {
                id: "retry_0".to_string(),
                input: json!({"sql": "bad"}),
            },
            ConversationTurn::Feedback {
                tool_use_id: "retry_0".to_string(),
                content: "fix it".to_string(),
            },
        ];
        let messages: Vec<Value> = turns.iter().map(ConversationTurn::to_message).collect();
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[1]["content"][0]["type"], "tool_use");
        assert_eq!(messages[1]["content"][0]["name"], "plan_query");
        assert_eq!(messages[2]["content"][0]["tool_use_id"], "retry_0");
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let config = LlmConfig {
            api_key_env: "LUMEN_TEST_KEY_THAT_IS_NOT_SET".to_string(),
            ..Default::default()
        };
        let client = AnthropicClient::from_config(&config).unwrap();
        let err = client.ensure_credentials().unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
        assert!(err.to_string().contains("LUMEN_TEST_KEY_THAT_IS_NOT_SET"));
    }
}
