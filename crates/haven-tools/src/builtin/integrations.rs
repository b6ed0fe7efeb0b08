//! `slack_webhook`, `send_email`, `create_calendar_event` — outward-facing
//! integration tools, each gated by its own config section under
//! `integrations.*`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use uuid::Uuid;

use haven_core::config::SmtpConfig;

use crate::tool::{Tool, ToolResult};

pub struct SlackWebhookTool {
    webhook_url: Option<String>,
}

impl SlackWebhookTool {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self { webhook_url }
    }
}

#[async_trait]
impl Tool for SlackWebhookTool {
    fn name(&self) -> &str {
        "slack_webhook"
    }

    fn description(&self) -> &str {
        "Post a message to the configured Slack incoming webhook."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let Some(url) = self.webhook_url.as_deref() else {
            return ToolResult::error("slack is not configured: set integrations.slack.webhookUrl");
        };
        let text = match input.get("text").and_then(|v| v.as_str()) {
            Some(t) if !t.is_empty() => t,
            _ => return ToolResult::error("missing required parameter: text"),
        };

        let client = reqwest::Client::new();
        match client.post(url).json(&serde_json::json!({ "text": text })).send().await {
            Ok(resp) if resp.status().is_success() => ToolResult::success("posted to Slack"),
            Ok(resp) => ToolResult::error(format!("Slack webhook returned status {}", resp.status())),
            Err(e) => ToolResult::error(format!("failed to post to Slack: {e}")),
        }
    }
}

pub struct SendEmailTool {
    smtp: SmtpConfig,
}

impl SendEmailTool {
    pub fn new(smtp: SmtpConfig) -> Self {
        Self { smtp }
    }
}

#[async_trait]
impl Tool for SendEmailTool {
    fn name(&self) -> &str {
        "send_email"
    }

    fn description(&self) -> &str {
        "Send an email via the configured SMTP server."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "to": { "type": "string" },
                "subject": { "type": "string" },
                "body": { "type": "string" }
            },
            "required": ["to", "subject", "body"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let (host, port, username, password, from) = match (
            self.smtp.host.as_deref(),
            self.smtp.port,
            self.smtp.username.as_deref(),
            self.smtp.password.as_deref(),
            self.smtp.from_email.as_deref(),
        ) {
            (Some(h), Some(p), Some(u), Some(pw), Some(f)) => (h, p, u, pw, f),
            _ => return ToolResult::error("SMTP is not fully configured under integrations.smtp"),
        };

        let to = match input.get("to").and_then(|v| v.as_str()) {
            Some(t) => t,
            None => return ToolResult::error("missing required parameter: to"),
        };
        let subject = match input.get("subject").and_then(|v| v.as_str()) {
            Some(s) => s,
            None => return ToolResult::error("missing required parameter: subject"),
        };
        let body = match input.get("body").and_then(|v| v.as_str()) {
            Some(b) => b,
            None => return ToolResult::error("missing required parameter: body"),
        };

        let email = match Message::builder()
            .from(match from.parse() {
                Ok(addr) => addr,
                Err(e) => return ToolResult::error(format!("invalid from address: {e}")),
            })
            .to(match to.parse() {
                Ok(addr) => addr,
                Err(e) => return ToolResult::error(format!("invalid to address: {e}")),
            })
            .subject(subject)
            .body(body.to_string())
        {
            Ok(m) => m,
            Err(e) => return ToolResult::error(format!("failed to build email: {e}")),
        };

        let creds = Credentials::new(username.to_string(), password.to_string());
        let transport = if self.smtp.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        };
        let transport = match transport {
            Ok(t) => t.port(port).credentials(creds).build(),
            Err(e) => return ToolResult::error(format!("failed to configure SMTP transport: {e}")),
        };

        match transport.send(email).await {
            Ok(_) => ToolResult::success(format!("email sent to {to}")),
            Err(e) => ToolResult::error(format!("failed to send email: {e}")),
        }
    }
}

pub struct CreateCalendarEventTool {
    ics_dir: std::path::PathBuf,
}

impl CreateCalendarEventTool {
    pub fn new(ics_dir: std::path::PathBuf) -> Self {
        Self { ics_dir }
    }
}

#[async_trait]
impl Tool for CreateCalendarEventTool {
    fn name(&self) -> &str {
        "create_calendar_event"
    }

    fn description(&self) -> &str {
        "Create a calendar event as a local .ics file. Use google_workspace \
         instead when the event needs to land on a connected Google Calendar."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "summary": { "type": "string" },
                "start": { "type": "string", "description": "RFC3339 start time." },
                "end": { "type": "string", "description": "RFC3339 end time." },
                "description": { "type": "string" }
            },
            "required": ["summary", "start", "end"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let summary = match input.get("summary").and_then(|v| v.as_str()) {
            Some(s) => s,
            None => return ToolResult::error("missing required parameter: summary"),
        };
        let start = match input.get("start").and_then(|v| v.as_str()).and_then(parse_rfc3339) {
            Some(s) => s,
            None => return ToolResult::error("missing or invalid 'start' (RFC3339 required)"),
        };
        let end = match input.get("end").and_then(|v| v.as_str()).and_then(parse_rfc3339) {
            Some(e) => e,
            None => return ToolResult::error("missing or invalid 'end' (RFC3339 required)"),
        };
        let description = input.get("description").and_then(|v| v.as_str()).unwrap_or("");

        let uid = Uuid::new_v4();
        let ics = render_vevent(&uid.to_string(), summary, description, start, end);

        if let Err(e) = std::fs::create_dir_all(&self.ics_dir) {
            return ToolResult::error(format!("failed to create ics directory: {e}"));
        }
        let path = self.ics_dir.join(format!("{uid}.ics"));
        match std::fs::write(&path, ics) {
            Ok(()) => ToolResult::success(format!("wrote event to {}", path.display())),
            Err(e) => ToolResult::error(format!("failed to write ics file: {e}")),
        }
    }
}

fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|d| d.with_timezone(&Utc))
}

fn ics_stamp(dt: DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

fn render_vevent(uid: &str, summary: &str, description: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    format!(
        "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//haven//calendar//EN\r\nBEGIN:VEVENT\r\nUID:{uid}\r\nDTSTAMP:{now}\r\nDTSTART:{start}\r\nDTEND:{end}\r\nSUMMARY:{summary}\r\nDESCRIPTION:{description}\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n",
        now = ics_stamp(Utc::now()),
        start = ics_stamp(start),
        end = ics_stamp(end),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vevent_contains_required_fields() {
        let start = Utc::now();
        let end = start + chrono::Duration::hours(1);
        let ics = render_vevent("abc", "Standup", "daily sync", start, end);
        assert!(ics.contains("BEGIN:VEVENT"));
        assert!(ics.contains("SUMMARY:Standup"));
        assert!(ics.contains("UID:abc"));
    }

    #[tokio::test]
    async fn slack_without_config_is_an_error() {
        let tool = SlackWebhookTool::new(None);
        let result = tool.execute(serde_json::json!({"text": "hi"})).await;
        assert!(result.is_error);
    }
}
