//! `web_search` tool — Brave Search API, keyed by `tools.web.search.apiKey`.

use async_trait::async_trait;
use serde_json::Value;

use crate::tool::{Tool, ToolResult};

pub struct WebSearchTool {
    api_key: Option<String>,
    max_results: u32,
}

impl WebSearchTool {
    pub fn new(api_key: Option<String>, max_results: u32) -> Self {
        Self { api_key, max_results }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web and return titles, URLs, and snippets for the top \
         results. Always cite sources in the final answer."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query." },
                "count": { "type": "integer", "description": "Number of results (default/max per config)." }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let Some(api_key) = self.api_key.as_deref() else {
            return ToolResult::error(
                "web search is not configured: set tools.web.search.apiKey",
            );
        };
        let query = match input.get("query").and_then(|v| v.as_str()) {
            Some(q) if !q.is_empty() => q,
            _ => return ToolResult::error("missing required parameter: query"),
        };
        let count = input
            .get("count")
            .and_then(|v| v.as_u64())
            .map(|n| n as u32)
            .unwrap_or(self.max_results)
            .min(self.max_results)
            .max(1);

        match brave_search(query, count, api_key).await {
            Ok(results) => ToolResult::success(results),
            Err(e) => ToolResult::error(format!("search error: {e}")),
        }
    }
}

async fn brave_search(query: &str, count: u32, api_key: &str) -> Result<String, String> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(15))
        .build()
        .map_err(|e| e.to_string())?;

    let url = format!(
        "https://api.search.brave.com/res/v1/web/search?q={}&count={}",
        urlencoding::encode(query),
        count
    );

    let resp = client
        .get(&url)
        .header("Accept", "application/json")
        .header("X-Subscription-Token", api_key)
        .send()
        .await
        .map_err(|e| e.to_string())?;

    if !resp.status().is_success() {
        return Err(format!("Brave API returned status {}", resp.status()));
    }

    let json: Value = resp.json().await.map_err(|e| e.to_string())?;
    let results = json
        .get("web")
        .and_then(|w| w.get("results"))
        .and_then(|r| r.as_array())
        .cloned()
        .unwrap_or_default();

    if results.is_empty() {
        return Ok("(no results)".to_string());
    }

    let mut out = Vec::new();
    for (i, r) in results.iter().enumerate().take(count as usize) {
        let title = r.get("title").and_then(|v| v.as_str()).unwrap_or("(no title)");
        let url = r.get("url").and_then(|v| v.as_str()).unwrap_or("");
        let desc = r.get("description").and_then(|v| v.as_str()).unwrap_or("");
        out.push(format!("{}. {title}\n   {url}\n   {desc}", i + 1));
    }
    Ok(out.join("\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_api_key_returns_an_error() {
        let tool = WebSearchTool::new(None, 5);
        let result = tool.execute(serde_json::json!({"query": "rust"})).await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn missing_query_returns_an_error() {
        let tool = WebSearchTool::new(Some("key".to_string()), 5);
        let result = tool.execute(serde_json::json!({})).await;
        assert!(result.is_error);
    }
}
