use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Json},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{HavenError, Result};

/// Top-level configuration (`<data_dir>/config.json` + `AGENT_*` env
/// overrides). Every nested struct is `camelCase` on disk via
/// `rename_all`, keeping Rust field names snake_case.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct HavenConfig {
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub integrations: IntegrationsConfig,
    #[serde(default)]
    pub proactive: ProactiveConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Selfie/speech generation. Parsed so config round-trips, never acted
    /// on — visual identity generation is out of scope for this runtime.
    #[serde(default)]
    pub visual: Option<VisualConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentsConfig {
    #[serde(default)]
    pub defaults: AgentDefaults,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            defaults: AgentDefaults::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDefaults {
    #[serde(default = "default_workspace")]
    pub workspace: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: u32,
    #[serde(default = "bool_true")]
    pub enable_reflection: bool,
    #[serde(default = "default_summary_interval")]
    pub summary_interval: u32,
    #[serde(default)]
    pub routing: RoutingConfig,
    /// Resolves the Open Question on voice/media auto-recovery (§9):
    /// `rewrite` emits a text fallback explaining capability, `suppress`
    /// leaves the model's denial intact.
    #[serde(default)]
    pub voice_recovery_mode: VoiceRecoveryMode,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            max_tool_iterations: default_max_tool_iterations(),
            enable_reflection: true,
            summary_interval: default_summary_interval(),
            routing: RoutingConfig::default(),
            voice_recovery_mode: VoiceRecoveryMode::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum VoiceRecoveryMode {
    #[default]
    Rewrite,
    Suppress,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingConfig {
    #[serde(default)]
    pub mode: RoutingMode,
    #[serde(default)]
    pub fallback_models: Vec<String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            mode: RoutingMode::default(),
            fallback_models: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RoutingMode {
    #[default]
    Auto,
    Proxy,
    Direct,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsConfig {
    #[serde(default)]
    pub telegram: ChannelEntry,
    #[serde(default)]
    pub whatsapp: ChannelEntry,
    #[serde(default)]
    pub discord: ChannelEntry,
    #[serde(default)]
    pub feishu: ChannelEntry,
    #[serde(default)]
    pub email: ChannelEntry,
    #[serde(default)]
    pub slack: ChannelEntry,
    #[serde(default)]
    pub cli: ChannelEntry,
    #[serde(default)]
    pub webhook: WebhookChannelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChannelEntry {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub allow_from: Vec<String>,
    #[serde(default)]
    pub credentials: std::collections::HashMap<String, String>,
    #[serde(default)]
    pub bridge_url: Option<String>,
    #[serde(default)]
    pub bridge_token: Option<String>,
}

/// Config for the generic inbound/outbound HTTP channel. Kept as its own
/// typed struct rather than squeezed into `ChannelEntry`'s generic
/// `credentials` map since a listener needs a real host/port, not
/// free-form string pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookChannelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_webhook_host")]
    pub host: String,
    #[serde(default = "default_webhook_port")]
    pub port: u16,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub target_url: Option<String>,
    #[serde(default)]
    pub allow_from: Vec<String>,
}

impl Default for WebhookChannelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_webhook_host(),
            port: default_webhook_port(),
            secret: None,
            target_url: None,
            allow_from: Vec::new(),
        }
    }
}

fn default_webhook_host() -> String {
    "127.0.0.1".to_string()
}

fn default_webhook_port() -> u16 {
    8089
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProvidersConfig {
    #[serde(default, flatten)]
    pub entries: std::collections::HashMap<String, ProviderEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderEntry {
    pub api_key: Option<String>,
    pub api_base: Option<String>,
    #[serde(default)]
    pub extra_headers: std::collections::HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsConfig {
    #[serde(default)]
    pub restrict_to_workspace: bool,
    #[serde(default)]
    pub policy: std::collections::HashMap<String, String>,
    #[serde(default = "default_risky_tools")]
    pub risky_tools: Vec<String>,
    #[serde(default)]
    pub approval_mode: ApprovalMode,
    #[serde(default)]
    pub web: WebToolsConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub exec: ExecConfig,
    #[serde(default)]
    pub plugins: PluginsConfig,
    /// Recursion guard for `spawn_subagent`: the deepest a chain of
    /// subagent-spawns-subagent calls may go before being refused.
    #[serde(default = "default_max_subagent_depth")]
    pub max_subagent_depth: u32,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            restrict_to_workspace: false,
            policy: std::collections::HashMap::new(),
            risky_tools: default_risky_tools(),
            approval_mode: ApprovalMode::default(),
            web: WebToolsConfig::default(),
            browser: BrowserConfig::default(),
            exec: ExecConfig::default(),
            plugins: PluginsConfig::default(),
            max_subagent_depth: default_max_subagent_depth(),
        }
    }
}

fn default_max_subagent_depth() -> u32 {
    3
}

fn default_risky_tools() -> Vec<String> {
    vec![
        "execute_command".to_string(),
        "bash_session".to_string(),
        "send_email".to_string(),
        "google_workspace".to_string(),
        "browser".to_string(),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalMode {
    #[default]
    Off,
    Confirm,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct WebToolsConfig {
    #[serde(default)]
    pub search: WebSearchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct WebSearchConfig {
    pub api_key: Option<String>,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

fn default_max_results() -> u32 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserConfig {
    #[serde(default)]
    pub allow_domains: Vec<String>,
    #[serde(default)]
    pub deny_domains: Vec<String>,
    #[serde(default = "default_browser_timeout")]
    pub timeout_seconds: u32,
    #[serde(default = "default_max_html_chars")]
    pub max_html_chars: usize,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            allow_domains: Vec::new(),
            deny_domains: Vec::new(),
            timeout_seconds: default_browser_timeout(),
            max_html_chars: default_max_html_chars(),
        }
    }
}

fn default_browser_timeout() -> u32 {
    20
}
fn default_max_html_chars() -> usize {
    50_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecConfig {
    #[serde(default = "default_exec_timeout")]
    pub timeout: u32,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            timeout: default_exec_timeout(),
        }
    }
}

fn default_exec_timeout() -> u32 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PluginsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationsConfig {
    #[serde(default)]
    pub slack: SlackIntegrationConfig,
    #[serde(default)]
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub google: GoogleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SlackIntegrationConfig {
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SmtpConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_email: Option<String>,
    #[serde(default = "bool_true")]
    pub use_tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GoogleConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub access_token: Option<String>,
    pub calendar_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProactiveConfig {
    #[serde(default)]
    pub quiet_hours: QuietHoursConfig,
    #[serde(default)]
    pub calendar_watch_enabled: bool,
    #[serde(default = "default_calendar_watch_every_minutes")]
    pub calendar_watch_every_minutes: u32,
    #[serde(default = "default_calendar_watch_horizon_minutes")]
    pub calendar_watch_horizon_minutes: u32,
    #[serde(default = "default_lead_minutes")]
    pub calendar_watch_lead_minutes: Vec<u32>,
    /// Channel/chat pair proactive reminders are delivered to. Defaults
    /// to the local CLI channel so a fresh install has somewhere to show
    /// reminders without extra configuration.
    #[serde(default = "default_notify_channel")]
    pub notify_channel: String,
    #[serde(default = "default_notify_chat_id")]
    pub notify_chat_id: String,
}

impl Default for ProactiveConfig {
    fn default() -> Self {
        Self {
            quiet_hours: QuietHoursConfig::default(),
            calendar_watch_enabled: false,
            calendar_watch_every_minutes: default_calendar_watch_every_minutes(),
            calendar_watch_horizon_minutes: default_calendar_watch_horizon_minutes(),
            calendar_watch_lead_minutes: default_lead_minutes(),
            notify_channel: default_notify_channel(),
            notify_chat_id: default_notify_chat_id(),
        }
    }
}

fn default_notify_channel() -> String {
    "cli".to_string()
}
fn default_notify_chat_id() -> String {
    "local".to_string()
}

fn default_calendar_watch_every_minutes() -> u32 {
    5
}
fn default_calendar_watch_horizon_minutes() -> u32 {
    180
}
fn default_lead_minutes() -> Vec<u32> {
    vec![30, 10]
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct QuietHoursConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_host")]
    pub host: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
        }
    }
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}
fn default_gateway_port() -> u16 {
    18791
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualConfig {
    #[serde(default)]
    pub enabled: bool,
    pub reference_image: Option<String>,
    pub physical_description: Option<String>,
    pub image_gen: Option<serde_json::Value>,
    pub prompt_templates: Option<serde_json::Value>,
    #[serde(default)]
    pub mirror_keywords: Vec<String>,
    #[serde(default)]
    pub direct_keywords: Vec<String>,
    pub default_format: Option<String>,
}

fn bool_true() -> bool {
    true
}
fn default_workspace() -> String {
    "workspace".to_string()
}
fn default_model() -> String {
    "gpt-4o".to_string()
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tool_iterations() -> u32 {
    20
}
fn default_summary_interval() -> u32 {
    12
}

/// Resolve the data directory: an absolute override is used as-is, a
/// relative one is rooted under `$HOME`, and the unset default is
/// `$HOME/.haven`.
pub fn resolve_data_dir(env_override: Option<&str>) -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    match env_override {
        None => PathBuf::from(home).join(".haven"),
        Some(raw) => {
            let p = PathBuf::from(raw);
            if p.is_absolute() {
                p
            } else {
                PathBuf::from(home).join(p)
            }
        }
    }
}

impl HavenConfig {
    /// Load `<data_dir>/config.json`, overridden by `AGENT_*` env vars
    /// (double-underscore-delimited path segments, matching the teacher's
    /// `Env::prefixed(..).split(..)` idiom).
    pub fn load(data_dir: &std::path::Path) -> Result<Self> {
        let path = data_dir.join("config.json");
        let mut figment = Figment::new();
        if path.exists() {
            figment = figment.merge(Json::file(&path));
        }
        figment = figment.merge(Env::prefixed("AGENT_").split("__"));
        figment
            .extract()
            .map_err(|e| HavenError::Config(e.to_string()))
    }

    pub fn workspace_path(&self, data_dir: &std::path::Path) -> PathBuf {
        let ws = &self.agents.defaults.workspace;
        let p = PathBuf::from(ws);
        if p.is_absolute() {
            p
        } else {
            data_dir.join(p)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_data_dir_relative_is_rooted_under_home() {
        std::env::set_var("HOME", "/home/tester");
        let dir = resolve_data_dir(Some("myagent"));
        assert_eq!(dir, PathBuf::from("/home/tester/myagent"));
    }

    #[test]
    fn resolve_data_dir_absolute_is_used_as_is() {
        let dir = resolve_data_dir(Some("/srv/agent-data"));
        assert_eq!(dir, PathBuf::from("/srv/agent-data"));
    }

    #[test]
    fn config_round_trips_through_camel_case_json() {
        let mut cfg = HavenConfig::default();
        cfg.channels.telegram.enabled = true;
        cfg.channels.telegram.allow_from = vec!["123".to_string()];
        cfg.providers.entries.insert(
            "openai".to_string(),
            ProviderEntry {
                api_key: Some("sk-test".to_string()),
                api_base: None,
                extra_headers: Default::default(),
            },
        );
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"allowFrom\""));
        let reparsed: HavenConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(reparsed.channels.telegram.allow_from, vec!["123".to_string()]);
        assert_eq!(
            reparsed.providers.entries.get("openai").unwrap().api_key,
            Some("sk-test".to_string())
        );
    }
}
