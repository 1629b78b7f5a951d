//! Agent: planner/narrator model access, prompts, the ask orchestrator and
//! schema-based question suggestions.

pub mod events;
pub mod history;
pub mod llm;
pub mod orchestrator;
pub mod prompts;
pub mod suggestions;

pub use events::{channel, AgentEvent, EventSink, Stage};
pub use llm::{AnthropicClient, ConversationTurn, LanguageModel, Narration, PlanResult, WhatIfRequest};
pub use orchestrator::{AskRequest, EditRequest, Orchestrator, MAX_RETRIES};
pub use suggestions::suggestions;
