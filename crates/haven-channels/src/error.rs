use thiserror::Error;

/// Errors that can occur within any channel adapter or the outbound
/// dispatcher.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The underlying transport could not be established.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A message could not be delivered to the remote endpoint.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// The channel rejected the supplied credentials or token.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// An operation exceeded its allowed time budget.
    #[error("Operation timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// The channel-specific configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The outbound dispatcher was asked to send to a channel that was
    /// never registered with the manager.
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    /// A named-but-unimplemented channel adapter (its wire binding is out
    /// of scope for this workspace).
    #[error("{0} channel has no wire binding in this build")]
    Unavailable(String),
}

impl ChannelError {
    /// Whether the outbound dispatcher should retry a send after this
    /// error, per §7's transient/permanent classification: auth, config,
    /// and unavailable-binding errors are permanent, everything else is
    /// treated as transient.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ChannelError::AuthFailed(_) | ChannelError::ConfigError(_) | ChannelError::Unavailable(_)
        )
    }
}
