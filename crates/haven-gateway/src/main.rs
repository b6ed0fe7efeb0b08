use std::collections::HashMap;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing::info;

use haven_agent::AgentLoop;
use haven_channels::ChannelManager;
use haven_checkpoint::TaskCheckpointStore;
use haven_core::config::{HavenConfig, IntegrationsConfig, RoutingMode as ConfigRoutingMode, ToolsConfig};
use haven_core::resolve_data_dir;
use haven_cron::{CronDispatcher, CronEngine, CronStore, ProactiveEngine, ProactiveStateStore};
use haven_memory::MemoryStore;
use haven_metrics::{MetricsHttpServer, MetricsStore};
use haven_providers::{AnthropicProvider, LlmProvider, OllamaProvider, OpenAiProvider, Router, RoutingMode};
use haven_tools::builtin::{
    BashSessionTool, BrowserTool, CreateCalendarEventTool, CronCreateTool, CronDeleteTool,
    CronListTool, CronSetEnabledTool, ExecuteCommandTool, GoogleWorkspaceTool, ListFilesTool,
    LogFeedbackTool, PatchFileTool, ReadFileTool, RecallTool, RememberTool, SearchFilesTool,
    SendEmailTool, SendMessageTool, SlackWebhookTool, SpawnSubagentTool, SubagentDispatcher,
    UpdateProfileTool, WebFetchTool, WebSearchTool, WriteFileTool,
};
use haven_tools::{GoogleCalendarSource, ToolRegistry};

/// A self-hosted personal assistant runtime: one agent loop, a channel
/// supervisor per configured channel, a cron/proactive engine, and a
/// `/metrics` HTTP responder, all sharing one shutdown signal.
#[derive(Parser, Debug)]
#[command(name = "haven-gateway", version)]
struct Cli {
    /// Overrides the data directory (default: `$HOME/.haven`).
    #[arg(long)]
    data_dir: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "haven_gateway=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let env_override = cli.data_dir.or_else(|| std::env::var("AGENT_DATA_DIR").ok());
    let data_dir = resolve_data_dir(env_override.as_deref());
    std::fs::create_dir_all(&data_dir)?;
    info!(data_dir = %data_dir.display(), "resolved data directory");

    let config = HavenConfig::load(&data_dir)?;
    let workspace = config.workspace_path(&data_dir);
    std::fs::create_dir_all(&workspace)?;

    let memory = Arc::new(MemoryStore::open(&workspace)?);
    let sessions = haven_agent::session::SessionStore::open(&workspace)?;
    let checkpoints = TaskCheckpointStore::open(&workspace)?;
    let cron_store = Arc::new(CronStore::open(&workspace)?);
    let metrics = Arc::new(MetricsStore::new(workspace.join("metrics").join("events.jsonl"))?);

    let bus = haven_bus::MessageBus::new();
    let mut router = build_router(&config);
    let prompt = haven_agent::prompt::PromptBuilder::load(None, workspace.to_str());

    let plugins = Arc::new(haven_plugins::filter_plugins(Vec::new(), &config.tools.plugins));
    let plugin_context = Arc::new(haven_plugins::PluginContext {
        workspace: workspace.clone(),
    });
    haven_plugins::register_provider_plugins(&plugins, router.providers_mut(), &plugin_context);

    // Two engines sharing the same store and bus: one is moved into the
    // tick loop, the other is handed to the cron management tools.
    let cron_engine_for_run = CronEngine::new(cron_store.clone(), bus.clone());
    let cron_engine_for_tools = Arc::new(CronEngine::new(cron_store.clone(), bus.clone()));

    let workspace_for_factory = workspace.clone();
    let tools_config_for_factory = config.tools.clone();
    let integrations_for_factory = config.integrations.clone();
    let memory_for_factory = memory.clone();
    let bus_for_factory = bus.clone();
    let cron_for_factory = cron_engine_for_tools.clone();
    let plugins_for_factory = plugins.clone();
    let plugin_context_for_factory = plugin_context.clone();

    let registry_factory = move |depth: u32, dispatcher: Box<dyn SubagentDispatcher>| {
        let mut registry = build_registry(
            depth,
            dispatcher,
            &workspace_for_factory,
            &tools_config_for_factory,
            &integrations_for_factory,
            memory_for_factory.clone(),
            bus_for_factory.clone(),
            cron_for_factory.clone(),
        );
        haven_plugins::register_tool_plugins(
            &plugins_for_factory,
            &mut registry,
            &plugin_context_for_factory,
        );
        registry
    };

    let agent_loop = AgentLoop::new(
        bus.clone(),
        memory.clone(),
        sessions,
        checkpoints,
        metrics.clone(),
        Arc::new(router) as Arc<dyn LlmProvider>,
        prompt,
        registry_factory,
        config.agents.defaults.clone(),
        config.tools.clone(),
        workspace.clone(),
    );
    cron_engine_for_run.set_dispatcher(Arc::new(AgentLoopCronDispatcher(agent_loop.clone())));

    let mut channel_manager = ChannelManager::new(bus.clone());

    // The local stdio surface is always available, independent of the
    // plugin seam and of any channel config: it needs no credentials and
    // gives every deployment at least one working inbound/outbound path.
    channel_manager.register(Arc::new(haven_channels::builtin::CliChannel::new(
        bus.clone(),
        config.channels.cli.allow_from.clone(),
    )));

    if config.channels.webhook.enabled {
        channel_manager.register(Arc::new(haven_channels::builtin::WebhookChannel::new(
            bus.clone(),
            config.channels.webhook.host.clone(),
            config.channels.webhook.port,
            config.channels.webhook.secret.clone(),
            config.channels.webhook.target_url.clone(),
            config.channels.webhook.allow_from.clone(),
        )));
    }

    let named_stub_channels: [(&'static str, &haven_core::config::ChannelEntry); 6] = [
        ("telegram", &config.channels.telegram),
        ("whatsapp", &config.channels.whatsapp),
        ("discord", &config.channels.discord),
        ("feishu", &config.channels.feishu),
        ("slack", &config.channels.slack),
        ("email", &config.channels.email),
    ];
    for (name, entry) in named_stub_channels {
        if entry.enabled {
            channel_manager.register(Arc::new(haven_channels::builtin::StubChannel::new(name, entry)));
        }
    }

    let mut plugin_channels: HashMap<String, Arc<dyn haven_channels::Channel>> = HashMap::new();
    haven_plugins::register_channel_plugins(&plugins, &mut plugin_channels, &plugin_context);
    for (_, channel) in plugin_channels {
        channel_manager.register(channel);
    }
    let channel_manager = Arc::new(channel_manager);

    let metrics_http = MetricsHttpServer::new(metrics.clone(), "/metrics", 24, "prometheus");
    let listener =
        tokio::net::TcpListener::bind((config.gateway.host.as_str(), config.gateway.port)).await?;
    info!(host = %config.gateway.host, port = config.gateway.port, "metrics server listening");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let agent_task = tokio::spawn(agent_loop.run(shutdown_rx.clone()));
    let channels_task = tokio::spawn(channel_manager.run(shutdown_rx.clone()));
    let cron_task = tokio::spawn(cron_engine_for_run.run(shutdown_rx.clone()));
    let metrics_rx = shutdown_rx.clone();
    let metrics_task = tokio::spawn(async move { metrics_http.serve(listener, metrics_rx).await });

    let proactive_task = if config.proactive.calendar_watch_enabled {
        let proactive_rx = shutdown_rx.clone();
        let proactive = build_proactive_engine(&config, &workspace)?;
        let bus_for_proactive = bus.clone();
        let proactive_cfg = config.proactive.clone();
        Some(tokio::spawn(run_proactive_watch(
            proactive,
            bus_for_proactive,
            proactive_cfg,
            proactive_rx,
        )))
    } else {
        None
    };

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    let _ = tokio::join!(agent_task, channels_task, cron_task, metrics_task);
    if let Some(task) = proactive_task {
        let _ = task.await;
    }
    info!("haven-gateway stopped");
    Ok(())
}

/// Adapts the agent loop's `process_direct` to the `CronDispatcher` seam,
/// mirroring `haven_agent::agent_loop::LoopDispatcher`'s
/// `SubagentDispatcher` impl one layer up.
struct AgentLoopCronDispatcher(Arc<AgentLoop>);

#[async_trait::async_trait]
impl CronDispatcher for AgentLoopCronDispatcher {
    async fn process_direct(&self, prompt: &str) -> Result<String, String> {
        self.0.process_direct(prompt, 0).await.map_err(|e| e.to_string())
    }
}

fn build_proactive_engine(
    config: &HavenConfig,
    workspace: &std::path::Path,
) -> anyhow::Result<ProactiveEngine> {
    let calendar = Box::new(GoogleCalendarSource::new(&config.integrations.google));
    let state = ProactiveStateStore::open(workspace)?;
    let p = &config.proactive;
    Ok(ProactiveEngine::new(
        calendar,
        state,
        p.calendar_watch_lead_minutes.clone(),
        p.calendar_watch_every_minutes,
        p.calendar_watch_horizon_minutes,
        p.quiet_hours.enabled,
        p.quiet_hours.start.clone().unwrap_or_else(|| "22:00".to_string()),
        p.quiet_hours.end.clone().unwrap_or_else(|| "06:00".to_string()),
    ))
}

/// Reminder dedupe state is pruned of entries older than this many days,
/// roughly once a day of watch ticks regardless of scan cadence.
const PROACTIVE_RETENTION_DAYS: i64 = 21;

/// Wakes every `calendar_watch_every_minutes`, scans for due calendar
/// reminders, and publishes each as an outbound message to the
/// configured notify target. Also prunes the reminder dedupe state once a
/// day so it doesn't grow unboundedly over a long-running deployment.
async fn run_proactive_watch(
    engine: ProactiveEngine,
    bus: Arc<haven_bus::MessageBus>,
    config: haven_core::config::ProactiveConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(
        config.calendar_watch_every_minutes as u64 * 60,
    ));
    let ticks_per_day = (1440 / config.calendar_watch_every_minutes.max(1)).max(1);
    let mut ticks_since_prune: u32 = 0;
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
                continue;
            }
        }

        match engine.scan_once(chrono::Utc::now()).await {
            Ok(reminders) => {
                for reminder in reminders {
                    let text = format!(
                        "Upcoming: {} in {} minutes",
                        reminder.summary, reminder.minutes_to_start
                    );
                    bus.publish_outbound(haven_core::OutboundMessage::text(
                        config.notify_channel.clone(),
                        config.notify_chat_id.clone(),
                        text,
                    ));
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "calendar watch scan failed");
            }
        }

        ticks_since_prune += 1;
        if ticks_since_prune >= ticks_per_day {
            ticks_since_prune = 0;
            if let Err(e) = engine.prune_state(PROACTIVE_RETENTION_DAYS) {
                tracing::warn!(error = %e, "proactive state prune failed");
            }
        }
    }
}

/// Registers a concrete provider per configured entry and wires the local
/// OpenAI-compatible gateway (if present under the `proxy` key) as the
/// router's proxy target.
fn build_router(config: &HavenConfig) -> Router {
    let mode = match config.agents.defaults.routing.mode {
        ConfigRoutingMode::Auto => RoutingMode::Auto,
        ConfigRoutingMode::Proxy => RoutingMode::Proxy,
        ConfigRoutingMode::Direct => RoutingMode::Direct,
    };
    let mut router = Router::new(mode, config.agents.defaults.routing.fallback_models.clone());

    for (name, entry) in &config.providers.entries {
        let api_key = entry.api_key.clone().unwrap_or_default();
        let provider: Arc<dyn LlmProvider> = match name.as_str() {
            "anthropic" => Arc::new(AnthropicProvider::new(api_key, entry.api_base.clone())),
            "ollama" => Arc::new(OllamaProvider::new(entry.api_base.clone())),
            _ => {
                let base_url = entry
                    .api_base
                    .clone()
                    .or_else(|| haven_providers::lookup(name).map(|known| known.base_url.to_string()));
                Arc::new(OpenAiProvider::new(api_key, base_url))
            }
        };
        if name == "proxy" {
            router.set_proxy(provider);
        } else {
            router.register(name.clone(), provider);
        }
    }

    router
}

/// Builds one turn's tool registry. Called fresh by the agent loop on
/// every turn so `depth` and the subagent dispatcher can vary per call
/// while every other tool stays shared.
#[allow(clippy::too_many_arguments)]
fn build_registry(
    depth: u32,
    dispatcher: Box<dyn SubagentDispatcher>,
    workspace: &std::path::Path,
    tools_config: &ToolsConfig,
    integrations: &IntegrationsConfig,
    memory: Arc<MemoryStore>,
    bus: Arc<haven_bus::MessageBus>,
    cron_engine: Arc<CronEngine>,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(Box::new(ListFilesTool));
    registry.register(Box::new(ReadFileTool));
    registry.register(Box::new(SearchFilesTool));
    registry.register(Box::new(PatchFileTool));
    registry.register(Box::new(WriteFileTool));
    registry.register(Box::new(WebFetchTool));

    registry.register(Box::new(ExecuteCommandTool::new(tools_config.exec.timeout)));
    registry.register(Box::new(BashSessionTool::new(
        Arc::new(workspace.to_path_buf()),
        tools_config.exec.timeout,
    )));
    registry.register(Box::new(BrowserTool::new(
        tools_config.browser.allow_domains.clone(),
        tools_config.browser.deny_domains.clone(),
        tools_config.browser.timeout_seconds,
        tools_config.browser.max_html_chars,
    )));
    registry.register(Box::new(WebSearchTool::new(
        tools_config.web.search.api_key.clone(),
        tools_config.web.search.max_results,
    )));

    registry.register(Box::new(RecallTool::new(memory.clone())));
    registry.register(Box::new(RememberTool::new(memory.clone())));
    registry.register(Box::new(UpdateProfileTool::new(memory.clone())));
    registry.register(Box::new(LogFeedbackTool::new(memory)));

    registry.register(Box::new(SendMessageTool::new(bus)));

    registry.register(Box::new(CronCreateTool::new(cron_engine.clone())));
    registry.register(Box::new(CronListTool::new(cron_engine.clone())));
    registry.register(Box::new(CronDeleteTool::new(cron_engine.clone())));
    registry.register(Box::new(CronSetEnabledTool::new(cron_engine)));

    registry.register(Box::new(SpawnSubagentTool::new(
        dispatcher,
        tools_config.max_subagent_depth,
        depth,
    )));

    if integrations.slack.webhook_url.is_some() {
        registry.register(Box::new(SlackWebhookTool::new(integrations.slack.webhook_url.clone())));
    }
    if integrations.smtp.host.is_some() {
        registry.register(Box::new(SendEmailTool::new(integrations.smtp.clone())));
    }
    if integrations.google.client_id.is_some() {
        registry.register(Box::new(GoogleWorkspaceTool::new(&integrations.google)));
        registry.register(Box::new(CreateCalendarEventTool::new(workspace.to_path_buf())));
    }

    registry
}
