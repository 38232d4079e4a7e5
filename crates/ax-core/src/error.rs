use thiserror::Error;

/// The seven error categories the error-handling design groups every failure
/// into, regardless of which component raised it. The completion pipeline
/// and the IPC server both classify on this rather than matching variant
/// names, so the classification logic lives in one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    PolicyBlock,
    Credential,
    TransientUpstream,
    AgentFailure,
    CanaryLeak,
    Internal,
}

#[derive(Debug, Error)]
pub enum AxError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Request blocked: {0}")]
    PolicyBlock(String),

    #[error("{0}")]
    Credential(String),

    #[error("Upstream error: status {status}, {message}")]
    Upstream { status: u16, message: String },

    #[error("Agent process failed: {0}")]
    AgentFailure(String),

    #[error("Canary token leaked into agent output")]
    CanaryLeak,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Request timeout after {ms}ms")]
    Timeout { ms: u64 },

    #[error("Internal processing error: {0}")]
    Internal(String),
}

impl AxError {
    /// Short SCREAMING_SNAKE_CASE code sent to IPC/HTTP clients.
    pub fn code(&self) -> &'static str {
        match self {
            AxError::Config(_) => "CONFIG_ERROR",
            AxError::Validation(_) => "VALIDATION_ERROR",
            AxError::UnknownAction(_) => "UNKNOWN_ACTION",
            AxError::PolicyBlock(_) => "POLICY_BLOCK",
            AxError::Credential(_) => "CREDENTIAL_ERROR",
            AxError::Upstream { .. } => "UPSTREAM_ERROR",
            AxError::AgentFailure(_) => "AGENT_FAILURE",
            AxError::CanaryLeak => "CANARY_LEAK",
            AxError::Database(_) => "DATABASE_ERROR",
            AxError::Serialization(_) => "SERIALIZATION_ERROR",
            AxError::Io(_) => "IO_ERROR",
            AxError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            AxError::Timeout { .. } => "TIMEOUT",
            AxError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            AxError::Validation(_) | AxError::UnknownAction(_) | AxError::PayloadTooLarge { .. } => {
                ErrorCategory::Validation
            }
            AxError::PolicyBlock(_) => ErrorCategory::PolicyBlock,
            AxError::Credential(_) => ErrorCategory::Credential,
            AxError::Upstream { .. } | AxError::Timeout { .. } => ErrorCategory::TransientUpstream,
            AxError::AgentFailure(_) => ErrorCategory::AgentFailure,
            AxError::CanaryLeak => ErrorCategory::CanaryLeak,
            AxError::Config(_)
            | AxError::Database(_)
            | AxError::Serialization(_)
            | AxError::Io(_)
            | AxError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Short, actionable user-visible text with no host paths or stack traces.
    pub fn user_message(&self) -> String {
        match self {
            AxError::Credential(_) => {
                "No API credentials configured. Run `configure` to set up authentication."
                    .to_string()
            }
            AxError::PolicyBlock(reason) => format!("Request blocked: {reason}"),
            AxError::CanaryLeak => {
                "This response was withheld because it echoed protected content.".to_string()
            }
            AxError::AgentFailure(_) => "The agent could not complete this request.".to_string(),
            AxError::Internal(_) => "Internal processing error.".to_string(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AxError>;
