use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChorusError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<redis::RedisError> for ChorusError {
    fn from(error: redis::RedisError) -> Self {
        ChorusError::Store(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ChorusError>;
