use thiserror::Error;

#[derive(Debug, Error)]
pub enum OperationError {
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("empty operation payload")]
    Empty,
}
