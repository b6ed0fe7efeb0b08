//! Concrete channel adapters, one module per channel (or stub cluster),
//! matching the teacher's per-channel crate layout folded into one module
//! here since this workspace ships no real wire bindings.

pub mod cli;
pub mod stub;
pub mod webhook;

pub use cli::CliChannel;
pub use stub::StubChannel;
pub use webhook::WebhookChannel;
