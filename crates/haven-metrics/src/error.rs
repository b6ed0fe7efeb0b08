use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("metrics I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
