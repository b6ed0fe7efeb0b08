pub mod atomic;
pub mod config;
pub mod error;
pub mod retry;
pub mod types;

pub use config::HavenConfig;
pub use error::{HavenError, Result};
pub use retry::RetryPolicy;
pub use types::{
    InboundAttachment, InboundMessage, MediaType, OutboundMessage, SessionKey, SessionRole,
    SessionTurn,
};
