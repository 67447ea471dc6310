use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlockchainError {
    #[error("invalid chain: {0}")]
    InvalidChain(String),

    #[error("operation error: {0}")]
    Operation(#[from] fc_operation::OperationError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
