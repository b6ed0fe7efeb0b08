pub mod error;
pub mod store;
pub mod types;

pub use error::MemoryError;
pub use store::MemoryStore;
pub use types::{FactRecord, FactStatus, MemoryScope, RecallItem, RememberOutcome, RememberStatus};
