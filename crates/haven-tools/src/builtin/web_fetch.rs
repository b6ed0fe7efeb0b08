//! `web_fetch` tool — fetch a URL and return readable text, HTML tags
//! stripped.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::tool::{Tool, ToolResult};

const DEFAULT_MAX_CHARS: usize = 50_000;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<script.*?</script>|<style.*?</style>|<[^>]+>").unwrap());
static BLANK_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

pub struct WebFetchTool;

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch a URL over HTTP(S) and return its content as plain text. \
         HTML is stripped of tags; JSON is pretty-printed. Read-only, no \
         authentication support, limited to 3 redirects."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "The URL to fetch (http or https)." },
                "max_chars": { "type": "integer", "description": "Maximum characters to return (default 50000)." }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let url = match input.get("url").and_then(|v| v.as_str()) {
            Some(u) if u.starts_with("http://") || u.starts_with("https://") => u,
            _ => return ToolResult::error("missing or invalid 'url' parameter (must be http/https)"),
        };
        let max_chars = input
            .get("max_chars")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_MAX_CHARS as u64) as usize;

        match fetch_url(url, max_chars).await {
            Ok(content) => ToolResult::success(content),
            Err(e) => ToolResult::error(format!("fetch error: {e}")),
        }
    }
}

async fn fetch_url(url: &str, max_chars: usize) -> Result<String, String> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .redirect(reqwest::redirect::Policy::limited(3))
        .build()
        .map_err(|e| e.to_string())?;

    let response = client.get(url).send().await.map_err(|e| e.to_string())?;
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_lowercase();
    let body = response.text().await.map_err(|e| e.to_string())?;

    let content = if content_type.contains("html") {
        html_to_text(&body)
    } else if content_type.contains("json") {
        serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| serde_json::to_string_pretty(&v).ok())
            .unwrap_or(body)
    } else {
        body
    };

    Ok(if content.len() > max_chars {
        format!(
            "{}...[truncated at {max_chars} chars; total {} chars]",
            &content[..max_chars],
            content.len()
        )
    } else {
        content
    })
}

fn html_to_text(html: &str) -> String {
    let stripped = TAG_RE.replace_all(html, "\n");
    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    BLANK_RUN_RE.replace_all(decoded.trim(), "\n\n").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_to_text_strips_tags() {
        let html = "<html><body><h1>Hello</h1><p>World</p></body></html>";
        let text = html_to_text(html);
        assert!(text.contains("Hello"));
        assert!(text.contains("World"));
        assert!(!text.contains("<h1>"));
    }

    #[tokio::test]
    async fn rejects_non_http_urls() {
        let tool = WebFetchTool;
        let result = tool.execute(serde_json::json!({"url": "file:///etc/passwd"})).await;
        assert!(result.is_error);
    }
}
