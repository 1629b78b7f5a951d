//! Ask Orchestrator
//!
//! Drives one question end to end: plan, validate, execute (with bounded
//! self-correction), optional trend projection, chart resolution and
//! narration. Progress is streamed through an [`EventSink`]; every run ends
//! with exactly one artifact or error event, unless the receiver went away.

use crate::agent::events::{channel, AgentEvent, EventSink, Stage};
use crate::agent::llm::{ConversationTurn, LanguageModel, Narration, PlanResult, WhatIfRequest};
use crate::agent::prompts::{build_narrate_prompt, build_system_prompt};
use crate::cell::{
    Cell, CellChart, CellContext, CellMetadata, CellNarrative, CellResult, CellSql, WhatIfMetadata,
};
use crate::config::LumenConfig;
use crate::diagnostics::{DiagCode, Diagnostic, Outcome};
use crate::error::{LumenError, Result};
use crate::executor::{ExecutionLimits, QueryExecutor, QuerySession};
use crate::schema::context::SchemaContext;
use crate::schema::roles::ColumnRole;
use crate::sql::validate_sql;
use crate::viz::{apply_theme, auto_detect_chart, validate_chart_spec};
use crate::whatif::{build_trend_chart, build_trend_sql, Technique, TrendSql};
use futures::FutureExt;
use serde_json::{json, Map, Value};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Corrections allowed after the first plan, shared by validation and
/// execution failures.
pub const MAX_RETRIES: u32 = 3;

const EVENT_CAPACITY: usize = 16;

/// A natural-language question plus the notebook context it is asked in.
#[derive(Debug, Clone)]
pub struct AskRequest {
    pub question: String,
    pub prior_cells: Vec<Cell>,
    pub parent_cell_id: Option<String>,
}

impl AskRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            prior_cells: Vec::new(),
            parent_cell_id: None,
        }
    }
}

/// Re-run of a cell with SQL written by the user.
#[derive(Debug, Clone)]
pub struct EditRequest {
    pub sql: String,
    pub original: Cell,
}

/// Why an attempt failed, fed back to the planner.
enum AttemptFailure {
    Validation(String),
    Execution { messages: String, hints: String },
}

impl AttemptFailure {
    fn feedback(&self) -> String {
        match self {
            AttemptFailure::Validation(messages) => {
                format!("SQL validation failed: {}. Please fix and try again.", messages)
            }
            AttemptFailure::Execution { messages, hints } if hints.is_empty() => {
                format!("SQL execution error: {}", messages)
            }
            AttemptFailure::Execution { messages, hints } => {
                format!("SQL execution error: {}\nHints: {}", messages, hints)
            }
        }
    }

    fn into_error(self) -> LumenError {
        match self {
            AttemptFailure::Validation(messages) => {
                LumenError::Validation(format!("{} (after {} retries)", messages, MAX_RETRIES))
            }
            AttemptFailure::Execution { messages, .. } => {
                LumenError::Execution(format!("{} (after {} retries)", messages, MAX_RETRIES))
            }
        }
    }
}

/// Lazily opened database session, released when the slot is dropped.
struct SessionSlot<'a> {
    executor: &'a dyn QueryExecutor,
    session: Option<Box<dyn QuerySession>>,
}

impl<'a> SessionSlot<'a> {
    fn new(executor: &'a dyn QueryExecutor) -> Self {
        Self {
            executor,
            session: None,
        }
    }

    /// Open the session if needed, then execute. A failed open is reported
    /// like any other execution error and retried on the next call.
    async fn execute(&mut self, sql: &str, limits: ExecutionLimits) -> Outcome<CellResult> {
        if self.session.is_none() {
            match self.executor.open_session().await {
                Ok(session) => self.session = Some(session),
                Err(e) => {
                    return Outcome::failure(Diagnostic::error(
                        DiagCode::SqlError,
                        format!("Connection failed: {}", e),
                    ))
                }
            }
        }
        match self.session.as_mut() {
            Some(session) => session.execute(sql, limits).await,
            None => Outcome::failure(Diagnostic::error(DiagCode::SqlError, "No database session")),
        }
    }
}

pub struct Orchestrator {
    llm: Arc<dyn LanguageModel>,
    executor: Arc<dyn QueryExecutor>,
    schema: SchemaContext,
    roles: HashMap<String, ColumnRole>,
    config: LumenConfig,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        executor: Arc<dyn QueryExecutor>,
        schema: SchemaContext,
        config: LumenConfig,
    ) -> Self {
        let roles = schema.role_map();
        Self {
            llm,
            executor,
            schema,
            roles,
            config,
        }
    }

    fn limits(&self) -> ExecutionLimits {
        ExecutionLimits::from(&self.config.settings)
    }

    fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.config.llm.timeout_seconds)
    }

    /// Run an ask on a background task and return its event stream.
    pub fn spawn_ask(self: Arc<Self>, request: AskRequest) -> mpsc::Receiver<AgentEvent> {
        let (sink, rx) = channel(EVENT_CAPACITY);
        tokio::spawn(async move { self.ask(request, sink).await });
        rx
    }

    /// Run an edited-SQL re-run on a background task.
    pub fn spawn_edited(self: Arc<Self>, request: EditRequest) -> mpsc::Receiver<AgentEvent> {
        let (sink, rx) = channel(EVENT_CAPACITY);
        tokio::spawn(async move { self.run_edited(request, sink).await });
        rx
    }

    pub async fn ask(&self, request: AskRequest, events: EventSink) {
        let result = guarded(self.ask_flow(&request, &events)).await;
        events.finish(result).await;
    }

    pub async fn run_edited(&self, request: EditRequest, events: EventSink) {
        let result = guarded(self.edited_flow(&request, &events)).await;
        events.finish(result).await;
    }

    async fn ask_flow(&self, request: &AskRequest, events: &EventSink) -> Result<Cell> {
        self.llm.ensure_credentials()?;

        let parent = request
            .parent_cell_id
            .as_deref()
            .and_then(|id| request.prior_cells.iter().find(|c| c.id == id));
        info!(
            "ask: model={} question={:?} parent={:?}",
            self.llm.model(),
            request.question,
            request.parent_cell_id
        );

        events.stage(Stage::Thinking).await?;
        let mut steps = vec![Stage::Thinking];

        let system_prompt = build_system_prompt(&self.schema, &request.prior_cells, parent);
        let mut conversation = vec![ConversationTurn::User(request.question.clone())];
        let mut session = SessionSlot::new(self.executor.as_ref());
        let limits = self.limits();
        let mut retry_count = 0;
        let mut attempt = 0;

        let (plan, mut sql, mut result) = loop {
            let plan = self.plan(&system_prompt, &conversation).await?;
            let validation = validate_sql(&plan.sql);

            let failure = if validation.ok() {
                let sql = validation
                    .data
                    .unwrap_or_else(|| plan.sql.trim().to_string());
                events.stage(Stage::Executing).await?;
                steps.push(Stage::Executing);

                let outcome = session.execute(&sql, limits).await;
                if outcome.ok() {
                    let result = outcome.data.ok_or_else(|| {
                        LumenError::Internal("No result data from execution".to_string())
                    })?;
                    info!("Query executed: rows={} time={}ms", result.row_count, result.execution_time_ms);
                    break (plan, sql, result);
                }
                let failure = AttemptFailure::Execution {
                    messages: outcome.error_summary(),
                    hints: outcome.hint_summary(),
                };
                warn!("SQL error (attempt {}): {}", attempt, outcome.error_summary());
                failure
            } else {
                warn!("SQL rejected (attempt {}): {}", attempt, validation.error_summary());
                AttemptFailure::Validation(validation.error_summary())
            };

            if attempt >= MAX_RETRIES {
                return Err(failure.into_error());
            }

            events.stage(Stage::Correcting).await?;
            steps.push(Stage::Correcting);
            retry_count += 1;

            let id = format!("retry_{}", attempt);
            conversation.push(ConversationTurn::PlanAttempt {
                id: id.clone(),
                input: plan.raw_input.clone(),
            });
            conversation.push(ConversationTurn::Feedback {
                tool_use_id: id,
                content: failure.feedback(),
            });
            attempt += 1;
        };

        let mut whatif = None;
        let mut caveats = Vec::new();
        let mut trend_chart = None;

        if let Some(whatif_request) = plan
            .whatif
            .as_ref()
            .filter(|w| w.technique == Technique::TrendExtrapolation)
        {
            events.stage(Stage::Projecting).await?;
            steps.push(Stage::Projecting);

            match self.project(&mut session, &sql, whatif_request, limits).await {
                Ok((trend, trend_result)) => {
                    let parameters = trend_parameters(&trend);
                    caveats = whatif_request.technique.caveats(&Value::Object(parameters.clone()));
                    whatif = Some(WhatIfMetadata {
                        technique: whatif_request.technique.to_string(),
                        parameters,
                        caveats: caveats.clone(),
                    });
                    trend_chart = Some(build_trend_chart(&trend.time_field, &trend.measure));
                    sql = trend.sql;
                    result = trend_result;
                    info!("Trend projection applied: rows={}", result.row_count);
                }
                Err(reason) => warn!("Trend projection failed, keeping baseline: {}", reason),
            }
        }
        drop(session);

        let chart = match trend_chart {
            Some(spec) => self.chart(spec, true),
            None => self.resolve_chart(plan.chart_spec.clone(), &result),
        };

        events.stage(Stage::Narrating).await?;
        steps.push(Stage::Narrating);
        let narration = self
            .narrate(&request.question, &sql, &result, Some(caveats.as_slice()))
            .await;

        let mut cell = Cell::new(request.question.clone());
        cell.context = CellContext {
            parent_cell_id: request.parent_cell_id.clone(),
            refinement_of: request.parent_cell_id.clone(),
            conversation_position: 0,
        };
        cell.sql = Some(CellSql::generated(sql));
        cell.result = Some(result);
        cell.chart = Some(chart);
        cell.narrative = Some(narrative(narration));
        cell.metadata = CellMetadata {
            model: self.llm.model().to_string(),
            schema_version: self.schema.hash.clone(),
            agent_steps: steps.iter().map(|s| s.to_string()).collect(),
            retry_count,
            reasoning: plan.reasoning,
            whatif,
        };

        info!("Cell built: id={} retries={}", cell.id, retry_count);
        Ok(cell)
    }

    async fn edited_flow(&self, request: &EditRequest, events: &EventSink) -> Result<Cell> {
        self.llm.ensure_credentials()?;
        let original = &request.original;

        events.stage(Stage::Thinking).await?;
        let validation = validate_sql(&request.sql);
        if !validation.ok() {
            return Err(LumenError::Validation(validation.error_summary()));
        }
        let sql = validation
            .data
            .unwrap_or_else(|| request.sql.trim().to_string());

        events.stage(Stage::Executing).await?;
        let mut session = SessionSlot::new(self.executor.as_ref());
        let outcome = session.execute(&sql, self.limits()).await;
        drop(session);
        if !outcome.ok() {
            return Err(LumenError::Execution(outcome.error_summary()));
        }
        let result = outcome
            .data
            .ok_or_else(|| LumenError::Internal("No result data from execution".to_string()))?;

        let spec = auto_detect_chart(&result.columns, &result.column_types, &self.roles);

        events.stage(Stage::Narrating).await?;
        let narration = self.narrate(&original.question, &sql, &result, None).await;

        let mut sql_block = CellSql::generated(sql.clone());
        sql_block.edited_by_user = true;
        sql_block.user_sql_override = Some(sql);

        info!("Edited cell re-run: id={} rows={}", original.id, result.row_count);
        Ok(Cell {
            id: original.id.clone(),
            created_at: original.created_at,
            question: original.question.clone(),
            context: original.context.clone(),
            sql: Some(sql_block),
            result: Some(result),
            chart: Some(self.chart(spec, true)),
            narrative: Some(narrative(narration)),
            metadata: CellMetadata {
                model: self.llm.model().to_string(),
                schema_version: self.schema.hash.clone(),
                agent_steps: vec![Stage::Executing.to_string(), Stage::Narrating.to_string()],
                retry_count: 0,
                reasoning: original.metadata.reasoning.clone(),
                whatif: None,
            },
            title: original.title.clone(),
        })
    }

    /// One planner call, bounded by the LLM timeout. Every failure is an
    /// agent error.
    async fn plan(&self, system_prompt: &str, conversation: &[ConversationTurn]) -> Result<PlanResult> {
        let secs = self.config.llm.timeout_seconds;
        match tokio::time::timeout(self.llm_timeout(), self.llm.plan(system_prompt, conversation)).await {
            Ok(Ok(plan)) => Ok(plan),
            Ok(Err(e @ LumenError::Llm(_))) => Err(e),
            Ok(Err(e)) => Err(LumenError::Llm(e.to_string())),
            Err(_) => Err(LumenError::Llm(format!("Planner timed out after {}s", secs))),
        }
    }

    /// Narration never fails the ask; errors and timeouts give an empty
    /// narrative.
    async fn narrate(
        &self,
        question: &str,
        sql: &str,
        result: &CellResult,
        caveats: Option<&[String]>,
    ) -> Narration {
        let prompt = build_narrate_prompt(question, sql, result, caveats);
        match tokio::time::timeout(self.llm_timeout(), self.llm.narrate(&prompt)).await {
            Ok(Ok(narration)) => narration,
            Ok(Err(e)) => {
                warn!("Narration failed: {}", e);
                Narration::default()
            }
            Err(_) => {
                warn!("Narration timed out after {}s", self.config.llm.timeout_seconds);
                Narration::default()
            }
        }
    }

    async fn project(
        &self,
        session: &mut SessionSlot<'_>,
        baseline_sql: &str,
        request: &WhatIfRequest,
        limits: ExecutionLimits,
    ) -> std::result::Result<(TrendSql, CellResult), String> {
        let built = build_trend_sql(baseline_sql, &request.trend_params());
        if !built.ok() {
            return Err(built.error_summary());
        }
        let trend = built
            .data
            .ok_or_else(|| "trend builder returned no SQL".to_string())?;

        let outcome = session.execute(&trend.sql, limits).await;
        if !outcome.ok() {
            return Err(outcome.error_summary());
        }
        let result = outcome
            .data
            .ok_or_else(|| "trend query returned no result".to_string())?;
        Ok((trend, result))
    }

    /// The planner's spec when it validates against the result, otherwise an
    /// auto-detected one.
    fn resolve_chart(&self, spec: Value, result: &CellResult) -> CellChart {
        let validation = validate_chart_spec(&spec, &result.columns);
        if validation.ok() {
            self.chart(apply_theme(spec), false)
        } else {
            warn!("Chart spec rejected, auto-detecting: {}", validation.error_summary());
            let spec = auto_detect_chart(&result.columns, &result.column_types, &self.roles);
            self.chart(spec, true)
        }
    }

    fn chart(&self, spec: Value, auto_detected: bool) -> CellChart {
        CellChart {
            spec,
            auto_detected,
            theme: self.config.settings.theme.clone(),
        }
    }
}

fn trend_parameters(trend: &TrendSql) -> Map<String, Value> {
    let mut parameters = Map::new();
    parameters.insert("time_field".to_string(), json!(trend.time_field));
    parameters.insert("measure".to_string(), json!(trend.measure));
    parameters.insert("periods_ahead".to_string(), json!(trend.periods_ahead));
    parameters.insert("period_interval".to_string(), json!(trend.period_interval));
    parameters
}

fn narrative(narration: Narration) -> CellNarrative {
    CellNarrative {
        text: narration.narrative,
        data_references: narration.data_references,
    }
}

/// Run a flow, turning a panic into an internal error.
async fn guarded<F>(flow: F) -> Result<Cell>
where
    F: Future<Output = Result<Cell>>,
{
    match AssertUnwindSafe(flow).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(LumenError::Internal(panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic in ask flow".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feedback_messages() {
        let v = AttemptFailure::Validation("Forbidden statement type: DELETE".to_string());
        assert_eq!(
            v.feedback(),
            "SQL validation failed: Forbidden statement type: DELETE. Please fix and try again."
        );

        let e = AttemptFailure::Execution {
            messages: "SQL execution error: column \"x\" does not exist".to_string(),
            hints: "Check column names against the schema".to_string(),
        };
        assert!(e.feedback().ends_with("\nHints: Check column names against the schema"));

        let bare = AttemptFailure::Execution {
            messages: "boom".to_string(),
            hints: String::new(),
        };
        assert_eq!(bare.feedback(), "SQL execution error: boom");
    }

    #[test]
    fn test_exhausted_errors_map_to_codes() {
        assert_eq!(AttemptFailure::Validation("x".into()).into_error().code(), "VALIDATION_ERROR");
        let exec = AttemptFailure::Execution {
            messages: "x".into(),
            hints: String::new(),
        };
        assert_eq!(exec.into_error().code(), "SQL_ERROR");
    }

    #[tokio::test]
    async fn test_guarded_catches_panics() {
        let result = guarded(async {
            if true {
                panic!("kaboom");
            }
            Ok(Cell::new("unreachable"))
        })
        .await;
        match result {
            Err(LumenError::Internal(message)) => assert_eq!(message, "kaboom"),
            other => panic!("unexpected: {:?}", other.map(|c| c.id)),
        }
    }
}
