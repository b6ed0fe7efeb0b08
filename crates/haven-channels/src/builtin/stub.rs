//! Named-but-unimplemented wire bindings: Telegram, WhatsApp, Discord,
//! Feishu, Slack, and email each get a real `Channel` value so the channel
//! set is fully enumerable from config, but none actually speaks its
//! platform's protocol — that integration work is out of scope for this
//! workspace. `start`/`send` always fail with `ChannelError::Unavailable`
//! so the supervisor's retry/backoff loop surfaces a clear, named error
//! instead of silently dropping messages.

use async_trait::async_trait;

use haven_core::config::ChannelEntry;
use haven_core::OutboundMessage;

use crate::channel::Channel;
use crate::error::ChannelError;
use crate::types::is_allowed;

pub struct StubChannel {
    name: &'static str,
    enabled: bool,
    allow_from: Vec<String>,
}

impl StubChannel {
    pub fn new(name: &'static str, entry: &ChannelEntry) -> Self {
        Self {
            name,
            enabled: entry.enabled && !entry.credentials.is_empty(),
            allow_from: entry.allow_from.clone(),
        }
    }

    /// Whether config both enabled this channel and supplied at least one
    /// credential. Informational only — a wire binding never runs to
    /// confirm the credential actually works.
    pub fn enabled(&self) -> bool {
        self.enabled
    }
}

#[async_trait]
impl Channel for StubChannel {
    fn name(&self) -> &str {
        self.name
    }

    async fn start(&self) -> Result<(), ChannelError> {
        Err(ChannelError::Unavailable(self.name.to_string()))
    }

    async fn stop(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn send(&self, _msg: &OutboundMessage) -> Result<(), ChannelError> {
        Err(ChannelError::Unavailable(self.name.to_string()))
    }

    fn is_running(&self) -> bool {
        false
    }

    fn is_allowed(&self, sender_id: &str) -> bool {
        is_allowed(&self.allow_from, sender_id)
    }
}
