use thiserror::Error;

#[derive(Error, Debug)]
pub enum SolDocsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Invalid IDL: {0}")]
    InvalidIdl(String),

    #[error("{0}")]
    Webhook(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, SolDocsError>;
