use thiserror::Error;

#[derive(Debug, Error)]
pub enum CronError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("haven-core error: {0}")]
    Core(#[from] haven_core::HavenError),

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("job not found: {id}")]
    JobNotFound { id: String },

    #[error("calendar source error: {0}")]
    CalendarSource(String),
}

pub type Result<T> = std::result::Result<T, CronError>;
