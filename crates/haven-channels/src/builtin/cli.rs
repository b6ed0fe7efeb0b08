//! Local stdio channel: one inbound message per line of stdin, outbound
//! content printed to stdout. The reference adapter proving the trait
//! needs no network I/O and no configuration to run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use haven_bus::MessageBus;
use haven_core::{InboundMessage, OutboundMessage};

use crate::channel::Channel;
use crate::error::ChannelError;
use crate::types::is_allowed;

const CHAT_ID: &str = "local";
const SENDER_ID: &str = "local";

pub struct CliChannel {
    bus: Arc<MessageBus>,
    allow_from: Vec<String>,
    running: AtomicBool,
}

impl CliChannel {
    pub fn new(bus: Arc<MessageBus>, allow_from: Vec<String>) -> Self {
        Self {
            bus,
            allow_from,
            running: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<(), ChannelError> {
        self.running.store(true, Ordering::SeqCst);
        info!("cli channel reading from stdin");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    self.running.store(false, Ordering::SeqCst);
                    return Err(ChannelError::ConnectionFailed(e.to_string()));
                }
            };

            let content = line.trim().to_string();
            if content.is_empty() || !self.is_allowed(SENDER_ID) {
                continue;
            }

            self.bus.publish_inbound(InboundMessage {
                channel: self.name().to_string(),
                sender_id: SENDER_ID.to_string(),
                chat_id: CHAT_ID.to_string(),
                content,
                media: Vec::new(),
                metadata: Default::default(),
            });
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ChannelError> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError> {
        println!("{}", msg.content);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn is_allowed(&self, sender_id: &str) -> bool {
        is_allowed(&self.allow_from, sender_id)
    }
}
