use thiserror::Error;

#[derive(Debug, Error)]
pub enum HavenError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl HavenError {
    /// Short error code, used to correlate log lines with metrics events.
    pub fn code(&self) -> &'static str {
        match self {
            HavenError::Config(_) => "CONFIG_ERROR",
            HavenError::Serialization(_) => "SERIALIZATION_ERROR",
            HavenError::Io(_) => "IO_ERROR",
            HavenError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, HavenError>;
