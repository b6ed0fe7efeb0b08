//! Generic inbound/outbound HTTP channel: a local listener accepts one
//! JSON POST per inbound message, and outbound messages are POSTed to a
//! configured `target_url`. Inbound parsing is hand-rolled rather than
//! built on a full HTTP server crate, matching `haven-metrics::http`'s
//! minimal responder — the entire inbound contract is "parse one POST,
//! check the secret, publish".

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

use haven_bus::MessageBus;
use haven_core::{InboundMessage, OutboundMessage};

use crate::channel::Channel;
use crate::error::ChannelError;
use crate::types::is_allowed;

#[derive(Deserialize)]
struct WebhookPayload {
    sender_id: String,
    chat_id: String,
    content: String,
}

pub struct WebhookChannel {
    bus: Arc<MessageBus>,
    host: String,
    port: u16,
    secret: Option<String>,
    target_url: Option<String>,
    allow_from: Vec<String>,
    client: reqwest::Client,
    running: AtomicBool,
}

impl WebhookChannel {
    pub fn new(
        bus: Arc<MessageBus>,
        host: String,
        port: u16,
        secret: Option<String>,
        target_url: Option<String>,
        allow_from: Vec<String>,
    ) -> Self {
        Self {
            bus,
            host,
            port,
            secret,
            target_url,
            allow_from,
            client: reqwest::Client::new(),
            running: AtomicBool::new(false),
        }
    }

    async fn handle(&self, mut stream: TcpStream) {
        let mut buf = [0u8; 8192];
        let n = match stream.read(&mut buf).await {
            Ok(n) => n,
            Err(_) => return,
        };
        let request = String::from_utf8_lossy(&buf[..n]).to_string();
        let response = self.route(&request);
        let _ = stream.write_all(&response).await;
        let _ = stream.shutdown().await;
    }

    fn route(&self, request: &str) -> Vec<u8> {
        let mut sections = request.splitn(2, "\r\n\r\n");
        let head = sections.next().unwrap_or("");
        let body = sections.next().unwrap_or("");

        let method = head.lines().next().unwrap_or("").split_whitespace().next().unwrap_or("");
        if method != "POST" {
            return http_response(405, "method not allowed\n");
        }

        if let Some(expected) = &self.secret {
            let supplied = head
                .lines()
                .find(|line| line.to_ascii_lowercase().starts_with("x-webhook-secret:"))
                .and_then(|line| line.split_once(':'))
                .map(|(_, value)| value.trim().to_string());
            if supplied.as_deref() != Some(expected.as_str()) {
                return http_response(401, "unauthorized\n");
            }
        }

        let payload: WebhookPayload = match serde_json::from_str(body.trim()) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "webhook channel: invalid payload");
                return http_response(400, "bad request\n");
            }
        };

        if !is_allowed(&self.allow_from, &payload.sender_id) {
            return http_response(403, "forbidden\n");
        }

        self.bus.publish_inbound(InboundMessage {
            channel: self.name().to_string(),
            sender_id: payload.sender_id,
            chat_id: payload.chat_id,
            content: payload.content,
            media: Vec::new(),
            metadata: Default::default(),
        });
        http_response(200, "ok\n")
    }
}

#[async_trait]
impl Channel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn start(&self) -> Result<(), ChannelError> {
        let listener = TcpListener::bind((self.host.as_str(), self.port))
            .await
            .map_err(|e| ChannelError::ConnectionFailed(e.to_string()))?;
        self.running.store(true, Ordering::SeqCst);
        info!(host = %self.host, port = self.port, "webhook channel listening");

        loop {
            match listener.accept().await {
                Ok((stream, _)) => self.handle(stream).await,
                Err(e) => {
                    self.running.store(false, Ordering::SeqCst);
                    return Err(ChannelError::ConnectionFailed(e.to_string()));
                }
            }
        }
    }

    async fn stop(&self) -> Result<(), ChannelError> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError> {
        let Some(url) = &self.target_url else {
            return Err(ChannelError::ConfigError("webhook target_url is not configured".to_string()));
        };

        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({ "chat_id": msg.chat_id, "content": msg.content }))
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::SendFailed(format!("target returned status {}", response.status())))
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn is_allowed(&self, sender_id: &str) -> bool {
        is_allowed(&self.allow_from, sender_id)
    }
}

fn http_response(status: u16, body: &str) -> Vec<u8> {
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        405 => "Method Not Allowed",
        _ => "OK",
    };
    let data = body.as_bytes();
    let headers = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        data.len()
    );
    let mut out = headers.into_bytes();
    out.extend_from_slice(data);
    out
}
