//! Stage events streamed to the caller of an ask.

use crate::cell::Cell;
use crate::error::{LumenError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Thinking,
    Correcting,
    Executing,
    Projecting,
    Narrating,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Thinking => "thinking",
            Stage::Correcting => "correcting",
            Stage::Executing => "executing",
            Stage::Projecting => "projecting",
            Stage::Narrating => "narrating",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum AgentEvent {
    Stage(Stage),
    Artifact(Box<Cell>),
    Error { code: String, message: String },
}

impl AgentEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AgentEvent::Stage(_))
    }
}

/// Sending half of an ask's event stream.
///
/// `finish` consumes the sink, so nothing can be sent after the terminal
/// event.
pub struct EventSink {
    tx: mpsc::Sender<AgentEvent>,
}

/// Bounded event channel.
pub fn channel(capacity: usize) -> (EventSink, mpsc::Receiver<AgentEvent>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSink { tx }, rx)
}

impl EventSink {
    /// Emit a stage. Fails with `Cancelled` once the receiver is gone.
    pub async fn stage(&self, stage: Stage) -> Result<()> {
        debug!("stage: {}", stage);
        self.tx
            .send(AgentEvent::Stage(stage))
            .await
            .map_err(|_| LumenError::Cancelled)
    }

    /// Emit the terminal artifact or error. A cancelled flow emits nothing.
    pub async fn finish(self, result: Result<Cell>) {
        let event = match result {
            Ok(cell) => AgentEvent::Artifact(Box::new(cell)),
            Err(LumenError::Cancelled) => {
                debug!("Receiver dropped; ask cancelled");
                return;
            }
            Err(e) => {
                error!("Ask failed [{}]: {}", e.code(), e);
                AgentEvent::Error {
                    code: e.code().to_string(),
                    message: e.to_string(),
                }
            }
        };
        if self.tx.send(event).await.is_err() {
            debug!("Receiver dropped before the terminal event");
        }
    }
}
