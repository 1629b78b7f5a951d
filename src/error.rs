use thiserror::Error;

#[derive(Error, Debug)]
pub enum LumenError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("SQL validation failed: {0}")]
    Validation(String),

    #[error("SQL execution failed: {0}")]
    Execution(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Request cancelled by the caller")]
    Cancelled,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LumenError {
    /// Code reported in a terminal `error` event.
    pub fn code(&self) -> &'static str {
        match self {
            LumenError::Config(_) => "CONFIG_ERROR",
            LumenError::Validation(_) => "VALIDATION_ERROR",
            LumenError::Execution(_) | LumenError::Database(_) => "SQL_ERROR",
            LumenError::Llm(_) | LumenError::Http(_) => "AGENT_ERROR",
            LumenError::NotFound(_) => "NOT_FOUND",
            LumenError::Internal(_)
            | LumenError::Cancelled
            | LumenError::Io(_)
            | LumenError::Json(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, LumenError>;
