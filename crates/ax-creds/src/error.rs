use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredsError {
    #[error("no refresh token configured")]
    MissingRefreshToken,

    #[error("refresh request failed: {0}")]
    Refresh(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CredsError>;
