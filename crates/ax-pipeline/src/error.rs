use thiserror::Error as ThisError;

/// Errors the completion pipeline raises itself, distinct from the
/// component-level errors (`ax_queue::QueueError`, `ax_sandbox::SandboxError`,
/// …) it wraps via `From`. Every variant maps onto one of the seven buckets
/// in `ax_core::error::ErrorCategory` through `category()`.
#[derive(Debug, ThisError)]
pub enum PipelineError {
    #[error("message {0} was not pending (already claimed by another completion or unknown)")]
    MessageNotPending(String),

    #[error("{0}")]
    Credential(String),

    #[error("agent process failed: {0}")]
    AgentFailure(String),

    #[error("queue error: {0}")]
    Queue(#[from] ax_queue::QueueError),

    #[error("store error: {0}")]
    Store(#[from] ax_store::StoreError),

    #[error("sandbox error: {0}")]
    Sandbox(#[from] ax_sandbox::SandboxError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal processing error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn category(&self) -> ax_core::ErrorCategory {
        use ax_core::ErrorCategory::*;
        match self {
            PipelineError::MessageNotPending(_) => Validation,
            PipelineError::Credential(_) => Credential,
            PipelineError::AgentFailure(_) => AgentFailure,
            PipelineError::Queue(_) | PipelineError::Store(_) | PipelineError::Sandbox(_) | PipelineError::Io(_) | PipelineError::Internal(_) => Internal,
        }
    }

    /// Short, actionable text with no host paths or stack traces, per the
    /// error handling design's "user-visible failures are short and
    /// actionable" rule.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::Credential(_) => {
                "No API credentials configured. Run `configure` to set up authentication.".to_string()
            }
            PipelineError::AgentFailure(_) => "The agent could not complete this request.".to_string(),
            PipelineError::MessageNotPending(_) => "This message has already been handled.".to_string(),
            _ => "Internal processing error.".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
