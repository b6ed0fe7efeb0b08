use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Totals {
    pub events: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LlmStats {
    pub calls: u64,
    pub success: u64,
    pub errors: u64,
    pub success_rate: f64,
    pub latency_ms_p95: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolStat {
    pub tool: String,
    pub calls: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolStats {
    pub calls: u64,
    pub success: u64,
    pub errors: u64,
    pub success_rate: f64,
    pub latency_ms_p95: f64,
    pub top_tools: Vec<ToolStat>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecallStats {
    pub queries: u64,
    pub hit_queries: u64,
    pub hit_rate: f64,
    pub avg_hits: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CronStats {
    pub runs: u64,
    pub success: u64,
    pub errors: u64,
    pub success_rate: f64,
    pub latency_ms_p95: f64,
    pub proactive_runs: u64,
}

/// Aggregated view over one `snapshot(hours)` window.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub window_hours: u32,
    pub generated_at: String,
    pub events_file: String,
    pub totals: Totals,
    pub llm: LlmStats,
    pub tools: ToolStats,
    pub recall: RecallStats,
    pub cron: CronStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    Ok,
    Warn,
    Na,
}

impl AlertState {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertState::Ok => "ok",
            AlertState::Warn => "warn",
            AlertState::Na => "na",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertCheck {
    pub key: String,
    pub status: AlertState,
    pub value: f64,
    pub threshold: f64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertSummary {
    pub overall: AlertState,
    pub warn_count: u32,
    pub ok_count: u32,
    pub na_count: u32,
    pub checks: Vec<AlertCheck>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertCompact {
    pub overall: AlertState,
    pub brief: String,
    pub top_warn_checks: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PruneResult {
    pub ok: bool,
    pub before: u64,
    pub after: u64,
    pub removed_by_age: u64,
    pub removed_by_cap: u64,
    pub removed_total: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
