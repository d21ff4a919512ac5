//! Agent-level error taxonomy.

/// Errors crossing the orchestration boundary.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("model error: {0}")]
    Model(String),

    #[error("validation pipeline error: {0}")]
    Validation(String),

    #[error("session store error: {0}")]
    Store(String),

    #[error("aborted: {0}")]
    Aborted(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl AgentError {
    /// Whether this error reads as a cancellation or timeout rather than
    /// a real failure. Abort-like errors at attempt scope synthesize
    /// timeout diagnostics instead of failing the run.
    pub fn is_abort_like(&self) -> bool {
        match self {
            AgentError::Aborted(_) => true,
            AgentError::Model(msg) | AgentError::Validation(msg) => {
                let lower = msg.to_ascii_lowercase();
                lower.contains("abort") || lower.contains("timeout") || lower.contains("timed out")
            }
            AgentError::Http(err) => err.is_timeout(),
            _ => false,
        }
    }
}

/// Result type for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;
