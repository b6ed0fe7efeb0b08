use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("provider error: {0}")]
    Provider(#[from] haven_providers::ProviderError),

    #[error("session store error: {0}")]
    Session(#[from] crate::session::SessionError),

    #[error("memory error: {0}")]
    Memory(#[from] haven_memory::MemoryError),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] haven_checkpoint::CheckpointError),

    #[error("tool iteration limit ({0}) reached without a final answer")]
    IterationLimitReached(u32),
}

pub type Result<T> = std::result::Result<T, AgentError>;
