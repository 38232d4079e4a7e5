use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("request body too large: {size} bytes (max {max})")]
    BodyTooLarge { size: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, ProxyError>;
