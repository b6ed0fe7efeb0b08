use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

use haven_core::atomic::{append_line, ensure_dir};

use crate::error::MetricsError;
use crate::types::{
    AlertCheck, AlertCompact, AlertState, AlertSummary, CronStats, ExportResult, LlmStats,
    PruneResult, RecallStats, Snapshot, ToolStat, ToolStats, Totals,
};

fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

fn to_iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

fn parse_iso(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(trimmed)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn pct(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        ((numerator as f64 / denominator as f64) * 100.0 * 100.0).round() / 100.0
    }
}

fn p95(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut data: Vec<f64> = values.to_vec();
    data.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let index = (0.95 * (data.len() - 1) as f64) as usize;
    (data[index] * 100.0).round() / 100.0
}

fn escape_label(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\n', "\\n").replace('"', "\\\"")
}

fn as_str(event: &Value, key: &str) -> String {
    event.get(key).and_then(Value::as_str).unwrap_or("").to_string()
}

fn as_bool(event: &Value, key: &str) -> bool {
    event.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn as_f64(event: &Value, key: &str) -> f64 {
    event.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

fn as_u64(event: &Value, key: &str) -> u64 {
    event.get(key).and_then(Value::as_u64).unwrap_or(0)
}

struct Thresholds {
    llm_success_rate_min: f64,
    llm_latency_p95_max: f64,
    tool_success_rate_min: f64,
    tool_latency_p95_max: f64,
    cron_success_rate_min: f64,
    cron_latency_p95_max: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            llm_success_rate_min: 90.0,
            llm_latency_p95_max: 8000.0,
            tool_success_rate_min: 80.0,
            tool_latency_p95_max: 5000.0,
            cron_success_rate_min: 80.0,
            cron_latency_p95_max: 10000.0,
        }
    }
}

impl Thresholds {
    fn with_overrides(overrides: &HashMap<String, f64>) -> Self {
        let mut t = Self::default();
        if let Some(v) = overrides.get("llm_success_rate_min") {
            t.llm_success_rate_min = *v;
        }
        if let Some(v) = overrides.get("llm_latency_p95_max") {
            t.llm_latency_p95_max = *v;
        }
        if let Some(v) = overrides.get("tool_success_rate_min") {
            t.tool_success_rate_min = *v;
        }
        if let Some(v) = overrides.get("tool_latency_p95_max") {
            t.tool_latency_p95_max = *v;
        }
        if let Some(v) = overrides.get("cron_success_rate_min") {
            t.cron_success_rate_min = *v;
        }
        if let Some(v) = overrides.get("cron_latency_p95_max") {
            t.cron_latency_p95_max = *v;
        }
        t
    }
}

fn min_check(key: &str, applicable: bool, value: f64, threshold: f64) -> AlertCheck {
    let status = if !applicable {
        AlertState::Na
    } else if value >= threshold {
        AlertState::Ok
    } else {
        AlertState::Warn
    };
    AlertCheck {
        key: key.to_string(),
        status,
        value,
        threshold,
        message: format!("{key}: {value} (min {threshold})"),
    }
}

fn max_check(key: &str, applicable: bool, value: f64, threshold: f64) -> AlertCheck {
    let status = if !applicable {
        AlertState::Na
    } else if value <= threshold {
        AlertState::Ok
    } else {
        AlertState::Warn
    };
    AlertCheck {
        key: key.to_string(),
        status,
        value,
        threshold,
        message: format!("{key}: {value} (max {threshold})"),
    }
}

/// Append-only JSONL event log with aggregated snapshots, grounded on the
/// reference `MetricsStore`. Every event is one line written via
/// `haven_core::atomic::append_line` — a single `write_all` is already
/// atomic enough for the single-writer-per-process model this runtime
/// assumes, so events never go through the temp-file+rename path that
/// whole-file stores (cron jobs, the fact index) require.
pub struct MetricsStore {
    events_path: PathBuf,
}

impl MetricsStore {
    pub fn new(events_path: PathBuf) -> Result<Self, MetricsError> {
        if let Some(parent) = events_path.parent() {
            ensure_dir(parent).map_err(|_| {
                MetricsError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "failed to create metrics directory",
                ))
            })?;
        }
        Ok(Self { events_path })
    }

    fn append(&self, mut payload: Map<String, Value>) -> bool {
        if !payload.contains_key("ts") {
            payload.insert("ts".to_string(), Value::String(to_iso(now_utc())));
        }
        let line = match serde_json::to_string(&payload) {
            Ok(s) => s,
            Err(_) => return false,
        };
        append_line(&self.events_path, &line).is_ok()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn record_llm_call(
        &self,
        model: &str,
        success: bool,
        latency_ms: f64,
        prompt_tokens: u64,
        completion_tokens: u64,
        error: &str,
    ) -> bool {
        let mut payload = Map::new();
        payload.insert("type".into(), json!("llm_call"));
        payload.insert("model".into(), json!(model.trim()));
        payload.insert("success".into(), json!(success));
        payload.insert("latency_ms".into(), json!((latency_ms * 100.0).round() / 100.0));
        payload.insert("prompt_tokens".into(), json!(prompt_tokens));
        payload.insert("completion_tokens".into(), json!(completion_tokens));
        payload.insert("error".into(), json!(error.trim().chars().take(500).collect::<String>()));
        self.append(payload)
    }

    pub fn record_tool_call(
        &self,
        tool: &str,
        success: bool,
        latency_ms: f64,
        attempts: u32,
        retry_kind: &str,
        error: &str,
    ) -> bool {
        let mut payload = Map::new();
        payload.insert("type".into(), json!("tool_call"));
        payload.insert("tool".into(), json!(tool.trim()));
        payload.insert("success".into(), json!(success));
        payload.insert("latency_ms".into(), json!((latency_ms * 100.0).round() / 100.0));
        payload.insert("attempts".into(), json!(attempts.max(1)));
        payload.insert("retry_kind".into(), json!(retry_kind.trim()));
        payload.insert("error".into(), json!(error.trim().chars().take(500).collect::<String>()));
        self.append(payload)
    }

    pub fn record_recall(&self, query: &str, hits: u64, scopes: &[String]) -> bool {
        let mut payload = Map::new();
        payload.insert("type".into(), json!("memory_recall"));
        payload.insert("query".into(), json!(query.trim().chars().take(500).collect::<String>()));
        payload.insert("hits".into(), json!(hits));
        payload.insert("hit".into(), json!(hits > 0));
        payload.insert(
            "scopes".into(),
            json!(scopes.iter().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect::<Vec<_>>()),
        );
        self.append(payload)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn record_cron_run(
        &self,
        name: &str,
        payload_kind: &str,
        success: bool,
        latency_ms: f64,
        delivered: bool,
        proactive: bool,
        error: &str,
    ) -> bool {
        let mut payload = Map::new();
        payload.insert("type".into(), json!("cron_run"));
        payload.insert("name".into(), json!(name.trim()));
        payload.insert("payload_kind".into(), json!(payload_kind.trim()));
        payload.insert("success".into(), json!(success));
        payload.insert("latency_ms".into(), json!((latency_ms * 100.0).round() / 100.0));
        payload.insert("delivered".into(), json!(delivered));
        payload.insert("proactive".into(), json!(proactive));
        payload.insert("error".into(), json!(error.trim().chars().take(500).collect::<String>()));
        self.append(payload)
    }

    fn iter_events(&self, since: Option<DateTime<Utc>>) -> Vec<Value> {
        let Ok(contents) = std::fs::read_to_string(&self.events_path) else {
            return Vec::new();
        };
        let mut items = Vec::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Ok(event) = serde_json::from_str::<Value>(line) else {
                continue;
            };
            if !event.is_object() {
                continue;
            }
            if let Some(cutoff) = since {
                match parse_iso(&as_str(&event, "ts")) {
                    Some(ts) if ts >= cutoff => {}
                    _ => continue,
                }
            }
            items.push(event);
        }
        items
    }

    pub fn snapshot(&self, hours: u32) -> Snapshot {
        let window_hours = hours.max(1);
        let since = now_utc() - chrono::Duration::hours(window_hours as i64);
        let events = self.iter_events(Some(since));

        let llm_events: Vec<&Value> = events.iter().filter(|e| as_str(e, "type") == "llm_call").collect();
        let tool_events: Vec<&Value> = events.iter().filter(|e| as_str(e, "type") == "tool_call").collect();
        let recall_events: Vec<&Value> =
            events.iter().filter(|e| as_str(e, "type") == "memory_recall").collect();
        let cron_events: Vec<&Value> = events.iter().filter(|e| as_str(e, "type") == "cron_run").collect();

        let llm_success = llm_events.iter().filter(|e| as_bool(e, "success")).count() as u64;
        let tool_success = tool_events.iter().filter(|e| as_bool(e, "success")).count() as u64;
        let cron_success = cron_events.iter().filter(|e| as_bool(e, "success")).count() as u64;
        let recall_hit = recall_events.iter().filter(|e| as_bool(e, "hit")).count() as u64;

        let mut tool_stats: HashMap<String, (u64, u64)> = HashMap::new();
        for item in &tool_events {
            let name = as_str(item, "tool");
            let name = if name.is_empty() { "unknown".to_string() } else { name };
            let entry = tool_stats.entry(name).or_insert((0, 0));
            entry.0 += 1;
            if !as_bool(item, "success") {
                entry.1 += 1;
            }
        }
        let mut top: Vec<(String, u64, u64)> =
            tool_stats.into_iter().map(|(tool, (calls, errors))| (tool, calls, errors)).collect();
        top.sort_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)).then(a.0.cmp(&b.0)));
        let top_tools: Vec<ToolStat> = top
            .into_iter()
            .take(10)
            .map(|(tool, calls, errors)| ToolStat { tool, calls, errors })
            .collect();

        let llm_latencies: Vec<f64> = llm_events.iter().map(|e| as_f64(e, "latency_ms")).collect();
        let tool_latencies: Vec<f64> = tool_events.iter().map(|e| as_f64(e, "latency_ms")).collect();
        let cron_latencies: Vec<f64> = cron_events.iter().map(|e| as_f64(e, "latency_ms")).collect();

        let total_hits: u64 = recall_events.iter().map(|e| as_u64(e, "hits")).sum();
        let proactive_cron = cron_events.iter().filter(|e| as_bool(e, "proactive")).count() as u64;

        Snapshot {
            window_hours,
            generated_at: to_iso(now_utc()),
            events_file: self.events_path.to_string_lossy().to_string(),
            totals: Totals { events: events.len() as u64 },
            llm: LlmStats {
                calls: llm_events.len() as u64,
                success: llm_success,
                errors: llm_events.len() as u64 - llm_success,
                success_rate: pct(llm_success, llm_events.len() as u64),
                latency_ms_p95: p95(&llm_latencies),
            },
            tools: ToolStats {
                calls: tool_events.len() as u64,
                success: tool_success,
                errors: tool_events.len() as u64 - tool_success,
                success_rate: pct(tool_success, tool_events.len() as u64),
                latency_ms_p95: p95(&tool_latencies),
                top_tools,
            },
            recall: RecallStats {
                queries: recall_events.len() as u64,
                hit_queries: recall_hit,
                hit_rate: pct(recall_hit, recall_events.len() as u64),
                avg_hits: if recall_events.is_empty() {
                    0.0
                } else {
                    (total_hits as f64 / recall_events.len() as f64 * 100.0).round() / 100.0
                },
            },
            cron: CronStats {
                runs: cron_events.len() as u64,
                success: cron_success,
                errors: cron_events.len() as u64 - cron_success,
                success_rate: pct(cron_success, cron_events.len() as u64),
                latency_ms_p95: p95(&cron_latencies),
                proactive_runs: proactive_cron,
            },
        }
    }

    fn alert_checks(&self, hours: u32, thresholds: &Thresholds) -> Vec<AlertCheck> {
        let snap = self.snapshot(hours);
        vec![
            min_check(
                "llm_success_rate",
                snap.llm.calls > 0,
                snap.llm.success_rate,
                thresholds.llm_success_rate_min,
            ),
            max_check(
                "llm_latency_p95_ms",
                snap.llm.calls > 0,
                snap.llm.latency_ms_p95,
                thresholds.llm_latency_p95_max,
            ),
            min_check(
                "tool_success_rate",
                snap.tools.calls > 0,
                snap.tools.success_rate,
                thresholds.tool_success_rate_min,
            ),
            max_check(
                "tool_latency_p95_ms",
                snap.tools.calls > 0,
                snap.tools.latency_ms_p95,
                thresholds.tool_latency_p95_max,
            ),
            min_check(
                "cron_success_rate",
                snap.cron.runs > 0,
                snap.cron.success_rate,
                thresholds.cron_success_rate_min,
            ),
            max_check(
                "cron_latency_p95_ms",
                snap.cron.runs > 0,
                snap.cron.latency_ms_p95,
                thresholds.cron_latency_p95_max,
            ),
        ]
    }

    pub fn alert_summary(&self, hours: u32, thresholds: Option<HashMap<String, f64>>) -> AlertSummary {
        let thresholds = match thresholds {
            Some(map) => Thresholds::with_overrides(&map),
            None => Thresholds::default(),
        };
        let checks = self.alert_checks(hours, &thresholds);
        let warn_count = checks.iter().filter(|c| c.status == AlertState::Warn).count() as u32;
        let ok_count = checks.iter().filter(|c| c.status == AlertState::Ok).count() as u32;
        let na_count = checks.iter().filter(|c| c.status == AlertState::Na).count() as u32;
        let overall = if warn_count > 0 {
            AlertState::Warn
        } else if ok_count > 0 {
            AlertState::Ok
        } else {
            AlertState::Na
        };
        AlertSummary { overall, warn_count, ok_count, na_count, checks }
    }

    pub fn alert_compact(&self, hours: u32) -> AlertCompact {
        let summary = self.alert_summary(hours, None);
        let mut warn_checks: Vec<&AlertCheck> =
            summary.checks.iter().filter(|c| c.status == AlertState::Warn).collect();
        warn_checks.sort_by(|a, b| {
            let a_margin = (a.value - a.threshold).abs();
            let b_margin = (b.value - b.threshold).abs();
            b_margin.partial_cmp(&a_margin).unwrap()
        });
        let top_warn_checks: Vec<String> = warn_checks.iter().take(5).map(|c| c.key.clone()).collect();
        let brief = format!(
            "{}: {} check(s) warn, {} ok, {} n/a",
            summary.overall.as_str(),
            summary.warn_count,
            summary.ok_count,
            summary.na_count
        );
        AlertCompact { overall: summary.overall, brief, top_warn_checks }
    }

    pub fn dashboard_summary(&self, hours: u32, top_n_tools: usize) -> Map<String, Value> {
        let snapshot = self.snapshot(hours);
        let alerts = self.alert_summary(hours, None);
        let triggered: Vec<String> = alerts
            .checks
            .iter()
            .filter(|c| c.status == AlertState::Warn)
            .map(|c| c.key.clone())
            .collect();
        let compact = self.alert_compact(hours);

        let mut out = Map::new();
        out.insert("generated_at".into(), json!(snapshot.generated_at));
        out.insert("window_hours".into(), json!(snapshot.window_hours));
        out.insert("events_file".into(), json!(snapshot.events_file));
        out.insert("events_total".into(), json!(snapshot.totals.events));
        out.insert("llm_calls".into(), json!(snapshot.llm.calls));
        out.insert("llm_success".into(), json!(snapshot.llm.success));
        out.insert("llm_errors".into(), json!(snapshot.llm.errors));
        out.insert("llm_success_rate_pct".into(), json!(snapshot.llm.success_rate));
        out.insert("llm_latency_p95_ms".into(), json!(snapshot.llm.latency_ms_p95));
        out.insert("tool_calls".into(), json!(snapshot.tools.calls));
        out.insert("tool_success".into(), json!(snapshot.tools.success));
        out.insert("tool_errors".into(), json!(snapshot.tools.errors));
        out.insert("tool_success_rate_pct".into(), json!(snapshot.tools.success_rate));
        out.insert("tool_latency_p95_ms".into(), json!(snapshot.tools.latency_ms_p95));
        out.insert("recall_queries".into(), json!(snapshot.recall.queries));
        out.insert("recall_hit_queries".into(), json!(snapshot.recall.hit_queries));
        out.insert("recall_hit_rate_pct".into(), json!(snapshot.recall.hit_rate));
        out.insert("recall_avg_hits".into(), json!(snapshot.recall.avg_hits));
        out.insert("cron_runs".into(), json!(snapshot.cron.runs));
        out.insert("cron_success".into(), json!(snapshot.cron.success));
        out.insert("cron_errors".into(), json!(snapshot.cron.errors));
        out.insert("cron_success_rate_pct".into(), json!(snapshot.cron.success_rate));
        out.insert("cron_latency_p95_ms".into(), json!(snapshot.cron.latency_ms_p95));
        out.insert("cron_proactive_runs".into(), json!(snapshot.cron.proactive_runs));
        for (index, item) in snapshot.tools.top_tools.iter().take(top_n_tools).enumerate() {
            let n = index + 1;
            out.insert(format!("top_tool_{n}_name"), json!(item.tool));
            out.insert(format!("top_tool_{n}_calls"), json!(item.calls));
            out.insert(format!("top_tool_{n}_errors"), json!(item.errors));
        }
        out.insert("alerts_overall".into(), json!(alerts.overall.as_str()));
        out.insert("alerts_warn_count".into(), json!(alerts.warn_count));
        out.insert("alerts_triggered_checks".into(), json!(triggered));
        out.insert("alerts_top_warn_checks".into(), json!(compact.top_warn_checks));
        out.insert("alerts_brief".into(), json!(compact.brief));
        out
    }

    pub fn prometheus_text(&self, hours: u32) -> String {
        let snapshot = self.snapshot(hours);
        let alerts = self.alert_summary(hours, None);
        let mut lines = vec![
            "# HELP agent_events_total Total recorded events in snapshot window".to_string(),
            "# TYPE agent_events_total gauge".to_string(),
            format!("agent_events_total {}", snapshot.totals.events),
            "# HELP agent_llm_calls_total LLM calls in snapshot window".to_string(),
            "# TYPE agent_llm_calls_total gauge".to_string(),
            format!("agent_llm_calls_total {}", snapshot.llm.calls),
            format!("agent_llm_success_total {}", snapshot.llm.success),
            format!("agent_llm_errors_total {}", snapshot.llm.errors),
            format!("agent_llm_success_rate_pct {}", snapshot.llm.success_rate),
            format!("agent_llm_latency_p95_ms {}", snapshot.llm.latency_ms_p95),
            "# HELP agent_tool_calls_total Tool calls in snapshot window".to_string(),
            "# TYPE agent_tool_calls_total gauge".to_string(),
            format!("agent_tool_calls_total {}", snapshot.tools.calls),
            format!("agent_tool_success_total {}", snapshot.tools.success),
            format!("agent_tool_errors_total {}", snapshot.tools.errors),
            format!("agent_tool_success_rate_pct {}", snapshot.tools.success_rate),
            format!("agent_tool_latency_p95_ms {}", snapshot.tools.latency_ms_p95),
            format!("agent_recall_queries_total {}", snapshot.recall.queries),
            format!("agent_recall_hit_queries_total {}", snapshot.recall.hit_queries),
            format!("agent_recall_hit_rate_pct {}", snapshot.recall.hit_rate),
            format!("agent_recall_avg_hits {}", snapshot.recall.avg_hits),
            format!("agent_cron_runs_total {}", snapshot.cron.runs),
            format!("agent_cron_success_total {}", snapshot.cron.success),
            format!("agent_cron_errors_total {}", snapshot.cron.errors),
            format!("agent_cron_success_rate_pct {}", snapshot.cron.success_rate),
            format!("agent_cron_latency_p95_ms {}", snapshot.cron.latency_ms_p95),
            format!("agent_cron_proactive_runs_total {}", snapshot.cron.proactive_runs),
        ];
        for item in &snapshot.tools.top_tools {
            let tool = escape_label(&item.tool);
            lines.push(format!("agent_top_tool_calls{{tool=\"{tool}\"}} {}", item.calls));
            lines.push(format!("agent_top_tool_errors{{tool=\"{tool}\"}} {}", item.errors));
        }
        lines.push(format!("agent_alerts_warn_count {}", alerts.warn_count));
        lines.push(format!(
            "agent_alerts_overall{{state=\"{}\"}} 1",
            alerts.overall.as_str()
        ));
        for check in &alerts.checks {
            if check.status == AlertState::Warn {
                lines.push(format!(
                    "agent_alert_check_warn{{check=\"{}\"}} 1",
                    escape_label(&check.key)
                ));
            }
        }
        lines.join("\n") + "\n"
    }

    pub fn export_snapshot(&self, output_path: &Path, hours: u32, output_format: &str) -> ExportResult {
        let fmt = self.resolve_format(output_path, output_format);

        let content = match fmt.as_str() {
            "prometheus" => self.prometheus_text(hours),
            "dashboard_json" => match serde_json::to_string_pretty(&self.dashboard_summary(hours, 5)) {
                Ok(s) => s + "\n",
                Err(e) => return ExportResult { ok: false, path: None, format: None, bytes: None, error: Some(e.to_string()) },
            },
            "json" => match serde_json::to_string_pretty(&self.snapshot(hours)) {
                Ok(s) => s + "\n",
                Err(e) => return ExportResult { ok: false, path: None, format: None, bytes: None, error: Some(e.to_string()) },
            },
            other => {
                return ExportResult {
                    ok: false,
                    path: None,
                    format: None,
                    bytes: None,
                    error: Some(format!("Unknown output format: {other}")),
                }
            }
        };

        if let Some(parent) = output_path.parent() {
            if ensure_dir(parent).is_err() {
                return ExportResult {
                    ok: false,
                    path: None,
                    format: None,
                    bytes: None,
                    error: Some("failed to create export directory".to_string()),
                };
            }
        }
        if let Err(e) = std::fs::write(output_path, &content) {
            return ExportResult { ok: false, path: None, format: None, bytes: None, error: Some(e.to_string()) };
        }

        ExportResult {
            ok: true,
            path: Some(output_path.to_string_lossy().to_string()),
            format: Some(fmt),
            bytes: Some(content.as_bytes().len() as u64),
            error: None,
        }
    }

    fn resolve_format(&self, output_path: &Path, output_format: &str) -> String {
        let requested = output_format.trim().to_lowercase();
        if requested != "auto" {
            return requested;
        }
        let name = output_path.file_name().and_then(|n| n.to_str()).unwrap_or("").to_lowercase();
        let suffix = output_path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();
        if suffix == "prom" {
            "prometheus".to_string()
        } else if name.ends_with(".dashboard.json") || suffix == "djson" {
            "dashboard_json".to_string()
        } else {
            "json".to_string()
        }
    }

    /// Trim the event log by age and by a hard cap on line count. `dry_run`
    /// reports the counts that would change without touching the file.
    pub fn prune_events(&self, keep_hours: u32, max_events: usize, dry_run: bool) -> PruneResult {
        let all_lines: Vec<String> = match std::fs::read_to_string(&self.events_path) {
            Ok(contents) => contents.lines().map(|l| l.to_string()).filter(|l| !l.trim().is_empty()).collect(),
            Err(_) => Vec::new(),
        };
        let before = all_lines.len() as u64;

        let cutoff = now_utc() - chrono::Duration::hours(keep_hours.max(1) as i64);
        let kept_by_age: Vec<String> = all_lines
            .into_iter()
            .filter(|line| {
                let Ok(event) = serde_json::from_str::<Value>(line) else {
                    return false;
                };
                match parse_iso(&as_str(&event, "ts")) {
                    Some(ts) => ts >= cutoff,
                    None => true,
                }
            })
            .collect();
        let removed_by_age = before - kept_by_age.len() as u64;

        let after_age = kept_by_age.len();
        let kept: Vec<String> = if after_age > max_events {
            kept_by_age[after_age - max_events..].to_vec()
        } else {
            kept_by_age
        };
        let removed_by_cap = after_age as u64 - kept.len() as u64;
        let after = kept.len() as u64;
        let removed_total = before - after;

        if !dry_run {
            let content = if kept.is_empty() { String::new() } else { kept.join("\n") + "\n" };
            if std::fs::write(&self.events_path, content).is_err() {
                return PruneResult { ok: false, before, after: before, removed_by_age: 0, removed_by_cap: 0, removed_total: 0 };
            }
        }

        PruneResult { ok: true, before, after, removed_by_age, removed_by_cap, removed_total }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, MetricsStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MetricsStore::new(dir.path().join("events.jsonl")).unwrap();
        (dir, store)
    }

    #[test]
    fn snapshot_counts_events_by_type() {
        let (_dir, store) = store();
        store.record_llm_call("gemini", true, 800.0, 0, 0, "");
        store.record_llm_call("gemini", false, 1200.0, 0, 0, "timeout");
        store.record_tool_call("web_search", true, 300.0, 1, "", "");
        store.record_tool_call("web_search", false, 900.0, 2, "", "429");
        store.record_recall("timezone", 1, &[]);
        store.record_recall("random", 0, &[]);
        store.record_cron_run("calendar-watch", "system_event", true, 220.0, true, true, "");

        let snap = store.snapshot(24);
        assert_eq!(snap.totals.events, 7);
        assert_eq!(snap.llm.calls, 2);
        assert_eq!(snap.tools.calls, 2);
        assert_eq!(snap.recall.queries, 2);
        assert_eq!(snap.cron.runs, 1);
        assert_eq!(snap.tools.top_tools[0].tool, "web_search");
    }

    #[test]
    fn dashboard_summary_flattens_top_tools() {
        let (_dir, store) = store();
        store.record_llm_call("gemini-3", true, 450.0, 0, 0, "");
        store.record_tool_call("web_search\"prod\"", false, 700.0, 2, "", "429");
        store.record_recall("timezone", 2, &[]);
        store.record_cron_run("daily-digest", "digest", true, 180.0, true, true, "");

        let dashboard = store.dashboard_summary(24, 3);
        assert_eq!(dashboard["events_total"], json!(4));
        assert_eq!(dashboard["top_tool_1_name"], json!("web_search\"prod\""));
    }

    #[test]
    fn export_snapshot_round_trips_json() {
        let (dir, store) = store();
        store.record_llm_call("gemini", true, 100.0, 0, 0, "");
        let path = dir.path().join("exports").join("metrics.json");
        let result = store.export_snapshot(&path, 24, "auto");
        assert!(result.ok);
        assert_eq!(result.format.as_deref(), Some("json"));
        let contents = std::fs::read_to_string(&path).unwrap();
        let parsed: Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed["llm"]["calls"], json!(1));
    }

    #[test]
    fn export_snapshot_rejects_unknown_format() {
        let (dir, store) = store();
        let path = dir.path().join("exports").join("metrics.unknown");
        let result = store.export_snapshot(&path, 24, "yaml");
        assert!(!result.ok);
        assert!(result.error.unwrap().contains("Unknown output format"));
    }

    #[test]
    fn alert_summary_flags_low_success_rate_and_high_latency() {
        let (_dir, store) = store();
        store.record_llm_call("gemini", true, 300.0, 0, 0, "");
        store.record_llm_call("gemini", false, 900.0, 0, 0, "timeout");
        store.record_tool_call("web_search", true, 400.0, 1, "", "");
        store.record_cron_run("morning-brief", "digest", false, 12000.0, false, true, "timeout");
        store.record_recall("timezone", 0, &[]);

        let mut thresholds = HashMap::new();
        thresholds.insert("llm_success_rate_min".to_string(), 90.0);
        thresholds.insert("cron_success_rate_min".to_string(), 80.0);
        thresholds.insert("cron_latency_p95_max".to_string(), 5000.0);
        let alerts = store.alert_summary(24, Some(thresholds));

        assert_eq!(alerts.overall, AlertState::Warn);
        assert!(alerts.warn_count >= 2);
        let warned: Vec<&str> = alerts
            .checks
            .iter()
            .filter(|c| c.status == AlertState::Warn)
            .map(|c| c.key.as_str())
            .collect();
        assert!(warned.contains(&"llm_success_rate"));
        assert!(warned.contains(&"cron_success_rate"));
        assert!(warned.contains(&"cron_latency_p95_ms"));
    }

    #[test]
    fn alert_summary_empty_window_is_na() {
        let (_dir, store) = store();
        let alerts = store.alert_summary(24, None);
        assert_eq!(alerts.overall, AlertState::Na);
        assert_eq!(alerts.warn_count, 0);
        assert!(alerts.na_count > 0);
    }

    #[test]
    fn prune_events_applies_retention_then_cap() {
        let (_dir, store) = store();
        let old_ts = to_iso(now_utc() - chrono::Duration::hours(48));
        let fresh_ts = to_iso(now_utc() - chrono::Duration::hours(1));
        for _ in 0..5 {
            let mut p = Map::new();
            p.insert("type".into(), json!("llm_call"));
            p.insert("success".into(), json!(true));
            p.insert("latency_ms".into(), json!(100));
            p.insert("ts".into(), json!(old_ts));
            store.append(p);
        }
        for _ in 0..5 {
            let mut p = Map::new();
            p.insert("type".into(), json!("tool_call"));
            p.insert("success".into(), json!(true));
            p.insert("latency_ms".into(), json!(200));
            p.insert("ts".into(), json!(fresh_ts));
            store.append(p);
        }

        let dry = store.prune_events(24, 3, true);
        assert!(dry.ok);
        assert_eq!(dry.before, 10);
        assert_eq!(dry.after, 3);
        assert_eq!(dry.removed_by_age, 5);
        assert_eq!(dry.removed_by_cap, 2);
        assert_eq!(std::fs::read_to_string(&store.events_path).unwrap().lines().count(), 10);

        let result = store.prune_events(24, 3, false);
        assert!(result.ok);
        assert_eq!(result.removed_total, 7);
        assert_eq!(std::fs::read_to_string(&store.events_path).unwrap().lines().count(), 3);
    }
}
