use thiserror::Error;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("invalid upstream address: {0}")]
    InvalidUpstream(String),

    #[error("no route for session: {0}")]
    NoRoute(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GateError>;
