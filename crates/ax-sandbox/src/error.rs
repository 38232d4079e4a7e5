use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("sandbox spawn failed: {0}")]
    Spawn(String),

    #[error("sandbox process timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("sandbox backend does not support this platform")]
    Unsupported,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SandboxError>;
