use async_trait::async_trait;

use haven_core::OutboundMessage;

use crate::error::ChannelError;

/// Common interface implemented by every channel adapter (Telegram,
/// WhatsApp, Discord, Feishu, email, Slack, plus plugin-provided channels).
///
/// Polymorphic over `{start, stop, send, is_running, is_allowed}` per §4.2.
/// Implementations must be `Send + Sync` so they can be driven by the
/// manager's per-channel supervisor task.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Stable lowercase identifier for this channel (e.g. `"telegram"`), used
    /// as the key inside [`ChannelManager`](crate::manager::ChannelManager).
    fn name(&self) -> &str;

    /// Run the channel's connect-and-receive loop until it returns or
    /// errors. The supervisor calls this in a loop, backing off between
    /// attempts — `start` itself should not retry internally.
    async fn start(&self) -> Result<(), ChannelError>;

    /// Gracefully tear down the connection. Called once by the supervisor
    /// on clean shutdown.
    async fn stop(&self) -> Result<(), ChannelError>;

    /// Deliver a single outbound message. `&self` so a connected adapter
    /// can send concurrently without a mutable borrow.
    async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError>;

    /// Whether `start`'s loop is currently running.
    fn is_running(&self) -> bool;

    /// Whether `sender_id` is permitted to reach this channel, per the
    /// channel's own `allow_from` list and the identity-variant rule in
    /// `crate::types::is_allowed`.
    fn is_allowed(&self, sender_id: &str) -> bool;
}
