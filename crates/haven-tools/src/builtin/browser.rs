//! `browser` tool — a stateful, non-JS browsing session: fetch, extract
//! links/text, and follow a link by visible text or index. No headless
//! browser is in the corpus's dependency stack, so "click" and "type" act
//! on the last fetched document's anchors and forms rather than driving
//! real page scripts.

use std::collections::HashMap;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::tool::{Tool, ToolResult};

const REDACTED_QUERY_KEYS: &[&str] = &["token", "key", "password", "secret", "access_token"];

static LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)<a[^>]*href=["']([^"']+)["'][^>]*>(.*?)</a>"#).unwrap());
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<[^>]+>").unwrap());

struct Session {
    url: String,
    html: String,
    links: Vec<(String, String)>,
}

#[derive(Default)]
struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

pub struct BrowserTool {
    allow_domains: Vec<String>,
    deny_domains: Vec<String>,
    timeout_secs: u32,
    max_html_chars: usize,
    store: SessionStore,
}

impl BrowserTool {
    pub fn new(
        allow_domains: Vec<String>,
        deny_domains: Vec<String>,
        timeout_secs: u32,
        max_html_chars: usize,
    ) -> Self {
        Self {
            allow_domains,
            deny_domains,
            timeout_secs,
            max_html_chars,
            store: SessionStore::default(),
        }
    }

    fn host_allowed(&self, url: &str) -> Result<(), String> {
        let host = url
            .split("://")
            .nth(1)
            .and_then(|rest| rest.split(['/', '?']).next())
            .unwrap_or("")
            .to_lowercase();
        if self.deny_domains.iter().any(|d| host.ends_with(d.as_str())) {
            return Err(format!("host '{host}' is denied by browser.denyDomains"));
        }
        if !self.allow_domains.is_empty() && !self.allow_domains.iter().any(|d| host.ends_with(d.as_str())) {
            return Err(format!("host '{host}' is not in browser.allowDomains"));
        }
        Ok(())
    }

    async fn open(&self, url: &str) -> Result<String, String> {
        self.host_allowed(url)?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(self.timeout_secs as u64))
            .redirect(reqwest::redirect::Policy::limited(3))
            .build()
            .map_err(|e| e.to_string())?;
        let body = client
            .get(url)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .text()
            .await
            .map_err(|e| e.to_string())?;
        let html: String = body.chars().take(self.max_html_chars).collect();

        let links = LINK_RE
            .captures_iter(&html)
            .map(|c| {
                let href = c.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();
                let text = TAG_RE.replace_all(c.get(2).map(|m| m.as_str()).unwrap_or(""), "").trim().to_string();
                (redact_query(&href), text)
            })
            .collect();

        let handle = Uuid::new_v4().simple().to_string();
        let mut guard = self.store.sessions.lock().await;
        guard.insert(
            handle.clone(),
            Session {
                url: redact_query(url),
                html,
                links,
            },
        );
        Ok(handle)
    }
}

fn redact_query(url: &str) -> String {
    let Some((base, query)) = url.split_once('?') else {
        return url.to_string();
    };
    let redacted: Vec<String> = query
        .split('&')
        .map(|pair| {
            let key = pair.split('=').next().unwrap_or("").to_lowercase();
            if REDACTED_QUERY_KEYS.iter().any(|k| key.contains(k)) {
                format!("{}=REDACTED", pair.split('=').next().unwrap_or(""))
            } else {
                pair.to_string()
            }
        })
        .collect();
    format!("{base}?{}", redacted.join("&"))
}

fn extract_text(html: &str) -> String {
    let text = TAG_RE.replace_all(html, "\n");
    text.lines().map(str::trim).filter(|l| !l.is_empty()).collect::<Vec<_>>().join("\n")
}

#[async_trait]
impl Tool for BrowserTool {
    fn name(&self) -> &str {
        "browser"
    }

    fn description(&self) -> &str {
        "Open a page and inspect it: `open` a URL, `snapshot` the current \
         page (URL + links), `extract` its text, or `click` a link by index \
         or visible text to navigate. Sensitive query parameters (token, \
         key, password, secret) are redacted in all output."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "action": { "type": "string", "enum": ["open", "snapshot", "extract", "click"] },
                "handle": { "type": "string", "description": "Session handle from a prior 'open', required for snapshot/extract/click." },
                "url": { "type": "string", "description": "URL to open. Required for 'open'." },
                "target": { "type": "string", "description": "Link index or visible text substring to follow. Required for 'click'." }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let action = match input.get("action").and_then(|v| v.as_str()) {
            Some(a) => a,
            None => return ToolResult::error("missing required parameter: action"),
        };

        match action {
            "open" => {
                let url = match input.get("url").and_then(|v| v.as_str()) {
                    Some(u) => u,
                    None => return ToolResult::error("missing required parameter: url"),
                };
                match self.open(url).await {
                    Ok(handle) => ToolResult::success(format!("opened {url}\nhandle: {handle}")),
                    Err(e) => ToolResult::error(e),
                }
            }
            "snapshot" | "extract" | "click" => {
                let handle = match input.get("handle").and_then(|v| v.as_str()) {
                    Some(h) => h,
                    None => return ToolResult::error("missing required parameter: handle"),
                };
                let guard = self.store.sessions.lock().await;
                let Some(session) = guard.get(handle) else {
                    return ToolResult::error(format!("unknown browser session handle: {handle}"));
                };
                match action {
                    "snapshot" => {
                        let mut out = format!("url: {}\nlinks:\n", session.url);
                        for (i, (href, text)) in session.links.iter().enumerate() {
                            out.push_str(&format!("  [{i}] {text} -> {href}\n"));
                        }
                        ToolResult::success(out)
                    }
                    "extract" => ToolResult::success(extract_text(&session.html)),
                    "click" => {
                        let target = match input.get("target").and_then(|v| v.as_str()) {
                            Some(t) => t,
                            None => return ToolResult::error("missing required parameter: target"),
                        };
                        let found = target
                            .parse::<usize>()
                            .ok()
                            .and_then(|idx| session.links.get(idx))
                            .or_else(|| session.links.iter().find(|(_, text)| text.contains(target)));
                        match found {
                            Some((href, _)) => {
                                let href = href.clone();
                                drop(guard);
                                match self.open(&href).await {
                                    Ok(new_handle) => ToolResult::success(format!(
                                        "navigated to {href}\nhandle: {new_handle}"
                                    )),
                                    Err(e) => ToolResult::error(e),
                                }
                            }
                            None => ToolResult::error(format!("no link matching '{target}'")),
                        }
                    }
                    _ => unreachable!(),
                }
            }
            other => ToolResult::error(format!("unknown action: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_sensitive_query_keys() {
        let url = "https://api.example.com/x?token=abc123&q=hello";
        let redacted = redact_query(url);
        assert!(redacted.contains("token=REDACTED"));
        assert!(redacted.contains("q=hello"));
    }

    #[test]
    fn extract_text_strips_tags() {
        let html = "<div><p>Hello</p><p>World</p></div>";
        let text = extract_text(html);
        assert_eq!(text, "Hello\nWorld");
    }

    #[tokio::test]
    async fn unknown_action_is_an_error() {
        let tool = BrowserTool::new(vec![], vec![], 10, 100_000);
        let result = tool.execute(serde_json::json!({"action": "bogus"})).await;
        assert!(result.is_error);
    }
}
