use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Session key derived from the originating channel and chat id.
///
/// Format: `"{channel}:{chat_id}"`. Unlike a user-centric key this does not
/// unify the same human across channels — the runtime is single-tenant and
/// scopes everything (sessions, policy, allowlists) per channel+chat.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey(pub String);

impl SessionKey {
    pub fn new(channel: &str, chat_id: &str) -> Self {
        Self(format!("{channel}:{chat_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File-safe name for this key, used for `sessions/{channel}_{chat_id}.jsonl`.
    pub fn file_stem(&self) -> String {
        self.0.replace(':', "_")
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An attachment carried on an inbound message (already materialized to a
/// local file by the channel supervisor before publishing).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundAttachment {
    #[serde(rename = "type")]
    pub kind: String,
    pub path: String,
    pub mime: Option<String>,
    pub caption: Option<String>,
    pub source_channel: Option<String>,
}

/// A message ingested from a channel supervisor, normalized for the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub channel: String,
    pub sender_id: String,
    pub chat_id: String,
    pub content: String,
    #[serde(default)]
    pub media: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl InboundMessage {
    pub fn session_key(&self) -> SessionKey {
        SessionKey::new(&self.channel, &self.chat_id)
    }

    pub fn from_me(&self) -> bool {
        self.metadata
            .get("from_me")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn attachments(&self) -> Vec<InboundAttachment> {
        self.metadata
            .get("attachments")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }
}

/// Media kind carried on an outbound message, per the outbound media envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Image,
    Voice,
    Audio,
    Sticker,
    Document,
}

/// A message produced by the agent loop or cron engine, bound for a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub channel: String,
    pub chat_id: String,
    pub content: String,
    #[serde(default)]
    pub media: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl OutboundMessage {
    pub fn text(channel: impl Into<String>, chat_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            chat_id: chat_id.into(),
            content: content.into(),
            media: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn idempotency_key(&self) -> Option<&str> {
        self.metadata.get("idempotency_key").and_then(|v| v.as_str())
    }

    pub fn media_type(&self) -> Option<MediaType> {
        self.metadata
            .get("media_type")
            .and_then(|v| v.as_str())
            .and_then(|s| match s {
                "image" => Some(MediaType::Image),
                "voice" => Some(MediaType::Voice),
                "audio" => Some(MediaType::Audio),
                "sticker" => Some(MediaType::Sticker),
                "document" => Some(MediaType::Document),
                _ => None,
            })
    }
}

/// Role of a single turn in a session's externally-visible history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionRole {
    User,
    Assistant,
    Tool,
    System,
}

/// One persisted turn in `sessions/{channel}_{chat_id}.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTurn {
    pub role: SessionRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub created_at: String,
}
