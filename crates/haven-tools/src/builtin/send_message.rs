//! `send_message` tool — publish an outbound message to the bus so any
//! connected channel supervisor can deliver it.

use std::sync::Arc;

use async_trait::async_trait;
use haven_bus::MessageBus;
use haven_core::OutboundMessage;

use crate::tool::{Tool, ToolResult};

pub struct SendMessageTool {
    bus: Arc<MessageBus>,
}

impl SendMessageTool {
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl Tool for SendMessageTool {
    fn name(&self) -> &str {
        "send_message"
    }

    fn description(&self) -> &str {
        "Send a message to a connected channel. Use this to reach a chat \
         other than the one currently being replied to, or to deliver a \
         proactive notification."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "channel": {
                    "type": "string",
                    "description": "Target channel name, e.g. 'telegram' or 'discord'."
                },
                "chat_id": {
                    "type": "string",
                    "description": "Channel-specific chat/conversation identifier."
                },
                "message": {
                    "type": "string",
                    "description": "The text message to send."
                },
                "media_type": {
                    "type": "string",
                    "enum": ["image", "voice", "audio", "sticker", "document"],
                    "description": "Deliver as this media kind instead of plain text, when the channel supports it. Omit for a plain text message."
                }
            },
            "required": ["channel", "chat_id", "message"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let channel = match input.get("channel").and_then(|v| v.as_str()) {
            Some(c) if !c.is_empty() => c,
            _ => return ToolResult::error("missing or empty 'channel' parameter"),
        };
        let chat_id = match input.get("chat_id").and_then(|v| v.as_str()) {
            Some(c) if !c.is_empty() => c,
            _ => return ToolResult::error("missing or empty 'chat_id' parameter"),
        };
        let message = match input.get("message").and_then(|v| v.as_str()) {
            Some(m) if !m.is_empty() => m,
            _ => return ToolResult::error("missing or empty 'message' parameter"),
        };

        let mut outbound = OutboundMessage::text(channel, chat_id, message);
        if let Some(media_type) = input.get("media_type").and_then(|v| v.as_str()) {
            outbound
                .metadata
                .insert("media_type".to_string(), serde_json::Value::String(media_type.to_string()));
        }
        self.bus.publish_outbound(outbound);

        ToolResult::success(format!("message sent to {channel}:{chat_id}"))
    }
}
