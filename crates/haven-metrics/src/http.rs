//! Minimal `/metrics` + `/health` HTTP responder, deliberately not built on
//! axum: the entire contract is "parse the request line, respond GET-only,
//! close the connection" and a full HTTP stack would be the wrong tool for
//! a four-route, GET-only, single-shot responder. Grounded on the reference
//! `MetricsHttpServer`.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::store::MetricsStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Prometheus,
    Json,
    DashboardJson,
}

impl OutputFormat {
    fn normalize(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "prom" | "prometheus" | "text" => OutputFormat::Prometheus,
            "dashboard" | "dashboard_json" | "flat" => OutputFormat::DashboardJson,
            "json" => OutputFormat::Json,
            _ => OutputFormat::Prometheus,
        }
    }
}

pub struct MetricsHttpServer {
    store: Arc<MetricsStore>,
    path: String,
    default_hours: u32,
    default_format: OutputFormat,
}

impl MetricsHttpServer {
    pub fn new(store: Arc<MetricsStore>, path: &str, default_hours: u32, default_format: &str) -> Self {
        let raw = path.trim();
        let path = if raw.starts_with('/') { raw.to_string() } else { format!("/{raw}") };
        Self {
            store,
            path,
            default_hours: default_hours.max(1),
            default_format: OutputFormat::normalize(default_format),
        }
    }

    /// Accept connections until `shutdown` fires, serving one request per
    /// connection and then closing it.
    pub async fn serve(
        &self,
        listener: TcpListener,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let Ok((stream, _)) = accepted else { continue };
                    self.handle_client(stream).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }

    async fn handle_client(&self, mut stream: TcpStream) {
        let mut buf = [0u8; 8192];
        let n = match stream.read(&mut buf).await {
            Ok(n) => n,
            Err(_) => return,
        };
        let request = String::from_utf8_lossy(&buf[..n]);
        let response = self.route(&request);
        let _ = stream.write_all(&response).await;
        let _ = stream.shutdown().await;
    }

    fn route(&self, request: &str) -> Vec<u8> {
        let line = request.lines().next().unwrap_or("").trim();
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 2 {
            return http_response(400, "bad request\n", "text/plain; charset=utf-8");
        }
        let method = parts[0].to_uppercase();
        let target = parts[1];
        if method != "GET" {
            return http_response(405, "method not allowed\n", "text/plain; charset=utf-8");
        }

        let (path, query) = match target.split_once('?') {
            Some((p, q)) => (p, q),
            None => (target, ""),
        };
        if path == "/health" {
            return http_response(200, "ok\n", "text/plain; charset=utf-8");
        }
        if path != self.path {
            return http_response(404, "not found\n", "text/plain; charset=utf-8");
        }

        let params = parse_query(query);
        let hours = params
            .get("hours")
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(self.default_hours);
        let format = params
            .get("format")
            .map(|v| OutputFormat::normalize(v))
            .unwrap_or(self.default_format);

        let (body, content_type) = match format {
            OutputFormat::Prometheus => (
                self.store.prometheus_text(hours),
                "text/plain; version=0.0.4; charset=utf-8".to_string(),
            ),
            OutputFormat::DashboardJson => (
                serde_json::to_string_pretty(&self.store.dashboard_summary(hours, 5)).unwrap_or_default() + "\n",
                "application/json; charset=utf-8".to_string(),
            ),
            OutputFormat::Json => (
                serde_json::to_string_pretty(&self.store.snapshot(hours)).unwrap_or_default() + "\n",
                "application/json; charset=utf-8".to_string(),
            ),
        };
        http_response(200, &body, &content_type)
    }
}

fn parse_query(query: &str) -> std::collections::HashMap<String, String> {
    let mut out = std::collections::HashMap::new();
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = urlencoding::decode(key).map(|c| c.into_owned()).unwrap_or_else(|_| key.to_string());
        let value = urlencoding::decode(value).map(|c| c.into_owned()).unwrap_or_else(|_| value.to_string());
        out.insert(key, value);
    }
    out
}

fn http_response(status: u16, body: &str, content_type: &str) -> Vec<u8> {
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        _ => "OK",
    };
    let data = body.as_bytes();
    let headers = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        data.len()
    );
    let mut out = headers.into_bytes();
    out.extend_from_slice(data);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn server() -> (tempfile::TempDir, MetricsHttpServer) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MetricsStore::new(dir.path().join("events.jsonl")).unwrap());
        let server = MetricsHttpServer::new(store, "/metrics", 24, "prometheus");
        (dir, server)
    }

    #[test]
    fn health_path_returns_200() {
        let (_dir, server) = server();
        let response = server.route("GET /health HTTP/1.1\r\n\r\n");
        let text = String::from_utf8_lossy(&response);
        assert!(text.starts_with("HTTP/1.1 200 OK"));
    }

    #[test]
    fn unknown_path_returns_404() {
        let (_dir, server) = server();
        let response = server.route("GET /nope HTTP/1.1\r\n\r\n");
        let text = String::from_utf8_lossy(&response);
        assert!(text.starts_with("HTTP/1.1 404"));
    }

    #[test]
    fn non_get_returns_405() {
        let (_dir, server) = server();
        let response = server.route("POST /metrics HTTP/1.1\r\n\r\n");
        let text = String::from_utf8_lossy(&response);
        assert!(text.starts_with("HTTP/1.1 405"));
    }

    #[test]
    fn metrics_path_honors_format_query() {
        let (_dir, server) = server();
        let response = server.route("GET /metrics?format=json HTTP/1.1\r\n\r\n");
        let text = String::from_utf8_lossy(&response);
        assert!(text.contains("application/json"));
    }
}
