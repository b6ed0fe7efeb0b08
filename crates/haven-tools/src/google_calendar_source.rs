//! `CalendarSource` adapter backing the proactive engine's calendar watch.
//! Shares the OAuth refresh-cache idiom with `google_workspace.rs` but
//! stays read-only and self-contained: the proactive engine only ever
//! needs `events.list`, not the full action surface a model can invoke.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use haven_core::config::GoogleConfig;
use haven_cron::{CalendarEvent, CalendarSource};

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

struct Credentials {
    access_token: String,
    refresh_token: String,
    client_id: String,
    client_secret: String,
    expiry_unix_ms: i64,
}

#[derive(Deserialize)]
struct TokenRefreshResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Deserialize)]
struct EventsListResponse {
    #[serde(default)]
    items: Vec<EventItem>,
}

#[derive(Deserialize)]
struct EventItem {
    id: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    start: Option<EventDateTime>,
}

#[derive(Deserialize)]
struct EventDateTime {
    #[serde(rename = "dateTime")]
    date_time: Option<DateTime<Utc>>,
}

/// Polls the Google Calendar `events.list` endpoint for one calendar.
/// Returns an empty list (rather than erroring the scan) when
/// `integrations.google` is unconfigured, matching the engine's
/// suppress-don't-fail posture toward a missing integration.
pub struct GoogleCalendarSource {
    client: reqwest::Client,
    credentials: Option<Arc<RwLock<Credentials>>>,
    calendar_id: String,
}

impl GoogleCalendarSource {
    pub fn new(config: &GoogleConfig) -> Self {
        let credentials = match (
            &config.client_id,
            &config.client_secret,
            &config.refresh_token,
        ) {
            (Some(client_id), Some(client_secret), Some(refresh_token)) => {
                Some(Arc::new(RwLock::new(Credentials {
                    access_token: config.access_token.clone().unwrap_or_default(),
                    refresh_token: refresh_token.clone(),
                    client_id: client_id.clone(),
                    client_secret: client_secret.clone(),
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

    async fn ensure_token(&self, creds_lock: &Arc<RwLock<Credentials>>) -> Result<String, String> {
        let now = Utc::now().timestamp_millis();
        {
            let creds = creds_lock.read().await;
            if now + 60_000 < creds.expiry_unix_ms {
                return Ok(creds.access_token.clone());
            }
        }

        let mut creds = creds_lock.write().await;
        let now = Utc::now().timestamp_millis();
        if now + 60_000 < creds.expiry_unix_ms {
            return Ok(creds.access_token.clone());
        }

        info!("refreshing Google OAuth access token for calendar watch");
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
            .map_err(|e| e.to_string())?;

        if !resp.status().is_success() {
            return Err(resp.text().await.unwrap_or_default());
        }

        let refreshed: TokenRefreshResponse = resp.json().await.map_err(|e| e.to_string())?;
        creds.access_token = refreshed.access_token.clone();
        creds.expiry_unix_ms = now + refreshed.expires_in * 1000;
        Ok(refreshed.access_token)
    }
}

#[async_trait]
impl CalendarSource for GoogleCalendarSource {
    async fn upcoming_events(&self, horizon_minutes: u32) -> haven_cron::Result<Vec<CalendarEvent>> {
        let Some(creds_lock) = &self.credentials else {
            return Ok(Vec::new());
        };

        let token = match self.ensure_token(creds_lock).await {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "calendar watch token refresh failed");
                return Err(haven_cron::CronError::CalendarSource(e));
            }
        };

        let now = Utc::now();
        let time_max = now + chrono::Duration::minutes(horizon_minutes as i64);
        let url = format!(
            "https://www.googleapis.com/calendar/v3/calendars/{}/events?singleEvents=true&orderBy=startTime&timeMin={}&timeMax={}",
            urlencoding::encode(&self.calendar_id),
            urlencoding::encode(&now.to_rfc3339()),
            urlencoding::encode(&time_max.to_rfc3339()),
        );

        let resp = self
            .client
            .get(&url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| haven_cron::CronError::CalendarSource(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(haven_cron::CronError::CalendarSource(format!("{status}: {text}")));
        }

        let parsed: EventsListResponse = resp
            .json()
            .await
            .map_err(|e| haven_cron::CronError::CalendarSource(e.to_string()))?;

        Ok(parsed
            .items
            .into_iter()
            .map(|item| CalendarEvent {
                id: item.id,
                summary: item.summary,
                start: item.start.and_then(|s| s.date_time),
            })
            .collect())
    }
}
