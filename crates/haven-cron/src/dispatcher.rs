//! Seam into the agent loop's `process_direct`, mirroring
//! `haven-tools::builtin::SubagentDispatcher` so this crate never needs a
//! dependency on `haven-agent`: the binary that owns both hands the engine
//! a concrete implementation after constructing the agent loop.

use async_trait::async_trait;

/// Implemented by the agent loop. A self-dispatch job calls through this to
/// run its `action` as a one-shot turn and get back the model's reply,
/// rather than round-tripping through the inbound bus.
#[async_trait]
pub trait CronDispatcher: Send + Sync {
    async fn process_direct(&self, prompt: &str) -> Result<String, String>;
}
