//! The 11-step turn pipeline: the single serial worker that turns an
//! `InboundMessage` (or a direct subagent invocation) into a reply,
//! wiring together the prompt, memory, tools, cron, and checkpoint crates.
//!
//! Mirrors the teacher's `pipeline::process_message_non_streaming` +
//! `tools::tool_loop::run_tool_loop` shape: one pipeline function shared by
//! every entry point, a tool-call loop around `provider.send`, turns
//! persisted to the session store afterward. `process_message` (bus
//! dispatch) and `process_direct` (cron self-dispatch, `spawn_subagent`)
//! both delegate to `run_pipeline`; only origin routing and the final
//! publish-vs-return step differ between them.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};

use haven_bus::MessageBus;
use haven_checkpoint::TaskCheckpointStore;
use haven_core::config::{AgentDefaults, ToolsConfig};
use haven_core::types::{SessionKey, SessionRole};
use haven_core::{InboundMessage, OutboundMessage, RetryPolicy};
use haven_memory::MemoryStore;
use haven_metrics::MetricsStore;
use haven_providers::{ChatRequest, LlmProvider};
use haven_tools::builtin::SubagentDispatcher;
use haven_tools::{resolve_policy, Decision, ToolRegistry};

use crate::approval::extract_approval_intent;
use crate::error::{AgentError, Result};
use crate::markers::MEDIA_REQUEST_MARKERS;
use crate::postprocess::{
    align_memory_claims, build_session_summary, enforce_memory_truth, extract_remember_fact,
    is_explicit_remember_request, recover_media_denial, reflect_response, should_reflect,
};
use crate::prompt::{PromptBuilder, SessionInfo};
use crate::session::{SessionMeta, SessionStore};
use crate::workflow_pack::{build_workflow_pack_prompt, resolve_workflow_pack_request};

/// Builds the full tool set for a given subagent-recursion `depth`,
/// wiring in the dispatcher so `spawn_subagent` can recurse. Supplied by
/// the binary that wires `AgentLoop` together (it alone knows about every
/// concrete tool's dependencies — memory store, cron engine, web search
/// key, SMTP config, ...).
pub type RegistryFactory =
    dyn Fn(u32, Box<dyn SubagentDispatcher>) -> ToolRegistry + Send + Sync;

/// The agent loop. One instance per runtime; `run` is the single serial
/// worker consuming the bus's inbound queue.
pub struct AgentLoop {
    bus: Arc<MessageBus>,
    memory: Arc<MemoryStore>,
    sessions: SessionStore,
    checkpoints: TaskCheckpointStore,
    metrics: Arc<MetricsStore>,
    provider: Arc<dyn LlmProvider>,
    prompt: Mutex<PromptBuilder>,
    registry_factory: Box<RegistryFactory>,
    defaults: AgentDefaults,
    tools_config: ToolsConfig,
    workspace: std::path::PathBuf,
    /// Self-reference handed to `spawn_subagent`'s dispatcher seam. Set by
    /// `Arc::new_cyclic` at construction; a dead weak means the loop's own
    /// `Arc` has already been dropped (shutdown), so recursive spawns just
    /// fail instead of resurrecting the loop.
    me: Weak<AgentLoop>,
}

impl AgentLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bus: Arc<MessageBus>,
        memory: Arc<MemoryStore>,
        sessions: SessionStore,
        checkpoints: TaskCheckpointStore,
        metrics: Arc<MetricsStore>,
        provider: Arc<dyn LlmProvider>,
        prompt: PromptBuilder,
        registry_factory: impl Fn(u32, Box<dyn SubagentDispatcher>) -> ToolRegistry + Send + Sync + 'static,
        defaults: AgentDefaults,
        tools_config: ToolsConfig,
        workspace: std::path::PathBuf,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            bus,
            memory,
            sessions,
            checkpoints,
            metrics,
            provider,
            prompt: Mutex::new(prompt),
            registry_factory: Box::new(registry_factory),
            defaults,
            tools_config,
            workspace,
            me: me.clone(),
        })
    }

    /// Single serial worker: consume one inbound message at a time until
    /// the shutdown flag flips. `MessageBus::consume_inbound` already polls
    /// the cancellation closure at its own ~1s cadence, so no extra
    /// `tokio::select!` is needed here.
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        info!("agent loop started");
        loop {
            let cancelled = || *shutdown.borrow();
            match self.bus.consume_inbound(cancelled).await {
                Some(msg) => {
                    if let Err(e) = self.process_message(msg).await {
                        error!(error = %e, "agent turn failed");
                    }
                }
                None => {
                    info!("agent loop shutting down");
                    break;
                }
            }
        }
    }

    /// Entry point for a bus-dispatched inbound message. Resolves step 1's
    /// `system` channel routing, runs the pipeline, and publishes the
    /// result (or an apology on failure) per the catch-all exception
    /// policy — the worker never propagates a panic out of a single turn.
    pub async fn process_message(&self, msg: InboundMessage) -> Result<()> {
        let (channel, chat_id) = resolve_reply_target(&msg);
        match self
            .run_pipeline(&channel, &chat_id, &msg.sender_id, &msg.content, 0)
            .await
        {
            Ok(outbound) => {
                self.bus.publish_outbound(outbound);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, channel = %channel, chat_id = %chat_id, "agent turn failed, sending apology");
                self.bus.publish_outbound(OutboundMessage::text(
                    channel,
                    chat_id,
                    "Sorry, something went wrong handling that message. Please try again.",
                ));
                Err(e)
            }
        }
    }

    /// Entry point for direct invocation: cron self-dispatch and
    /// `spawn_subagent` both land here through the `SubagentDispatcher`
    /// seam. Runs the same pipeline as `process_message` but returns the
    /// final text instead of publishing it, in an isolated, disposable
    /// session keyed by recursion depth.
    pub async fn process_direct(&self, prompt_text: &str, depth: u32) -> Result<String> {
        let chat_id = format!("{depth}-{}", uuid::Uuid::new_v4().simple());
        let outbound = self
            .run_pipeline("subagent", &chat_id, "subagent", prompt_text, depth)
            .await?;
        Ok(outbound.content)
    }

    /// Steps 2 through 10 of the agent loop, wrapped in checkpoint
    /// lifecycle tracking. Returns the `OutboundMessage` the caller either
    /// publishes (`process_message`) or unwraps (`process_direct`).
    async fn run_pipeline(
        &self,
        channel: &str,
        chat_id: &str,
        sender_id: &str,
        raw_content: &str,
        depth: u32,
    ) -> Result<OutboundMessage> {
        let session_key = SessionKey::new(channel, chat_id);

        if let Some(prior) = self.checkpoints.latest_running_for_session(session_key.as_str()) {
            let _ = self.checkpoints.mark_resumed(&prior.task_id);
        }

        let mut meta = self.sessions.meta(&session_key)?;
        apply_approval_intent(raw_content, &mut meta);

        let effective_content = match resolve_workflow_pack_request(raw_content) {
            Some((pack_name, pack_context)) => build_workflow_pack_prompt(pack_name, &pack_context),
            None => raw_content.to_string(),
        };

        let task_id = self.checkpoints.start(
            "agent_turn",
            session_key.as_str(),
            channel,
            chat_id,
            sender_id,
            &effective_content,
            HashMap::new(),
        )?;

        let outcome = self
            .run_turn(&session_key, channel, &effective_content, raw_content, &mut meta, depth)
            .await;

        self.sessions.save_meta(&session_key, &meta)?;

        match outcome {
            Ok((final_content, iterations)) => {
                let mut cp_meta = HashMap::new();
                cp_meta.insert("iterations".to_string(), serde_json::json!(iterations));
                let _ = self.checkpoints.complete(&task_id, &final_content, Some(cp_meta));
                Ok(OutboundMessage::text(channel, chat_id, final_content))
            }
            Err(e) => {
                let _ = self.checkpoints.fail(&task_id, &e.to_string(), None);
                Err(e)
            }
        }
    }

    /// Steps 4 through 10: build the prompt, run the tool-call loop, post
    /// process the draft, log and persist the turn. Returns the final
    /// reply text and the iteration count the tool loop used.
    async fn run_turn(
        &self,
        session_key: &SessionKey,
        channel: &str,
        effective_content: &str,
        raw_user_content: &str,
        meta: &mut SessionMeta,
        depth: u32,
    ) -> Result<(String, u32)> {
        let dispatcher: Box<dyn SubagentDispatcher> = Box::new(LoopDispatcher(self.me.clone()));
        let registry = (self.registry_factory)(depth, dispatcher);

        let turn_count = self.sessions.turn_count(session_key)?;
        let memory_context = if turn_count == 0 {
            self.memory.full_context()
        } else {
            self.memory.relevant_context(Some(effective_content))
        };
        self.metrics.record_recall(
            effective_content,
            u64::from(!memory_context.trim().is_empty()),
            &[],
        );

        let now = chrono::Utc::now();
        let session_info = SessionInfo {
            session_key: session_key.as_str().to_string(),
            turn_count,
            timestamp: now.format("%Y-%m-%d %H:%M UTC").to_string(),
        };

        let system_prompt = {
            let prompt_builder = self.prompt.lock().await;
            prompt_builder.build_prompt(Some(&memory_context), Some(&session_info))
        };
        let plain_system = system_prompt.to_plain_text();

        self.memory
            .append_today(&format!("[{channel}] user: {}", compact_note(raw_user_content)))?;

        let history = self.sessions.recent_history(session_key, 40)?;
        let mut raw_messages: Vec<serde_json::Value> = history
            .iter()
            .map(|turn| serde_json::json!({ "role": api_role(turn.role), "content": turn.content }))
            .collect();
        raw_messages.push(serde_json::json!({ "role": "user", "content": effective_content }));

        let approved_tools: HashSet<String> = meta
            .extra
            .get("approved_tools")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();

        let base_request = ChatRequest {
            model: self.defaults.model.clone(),
            system: plain_system,
            system_prompt: Some(system_prompt),
            messages: Vec::new(),
            max_tokens: self.defaults.max_tokens,
            stream: false,
            thinking: None,
            tools: registry.definitions(),
            raw_messages: None,
        };

        let mut used_tools = false;
        let mut tool_results: Vec<(String, String)> = Vec::new();
        let mut final_content: Option<String> = None;
        let mut iterations: u32 = 0;

        for iteration in 0..self.defaults.max_tool_iterations {
            iterations = iteration + 1;
            let mut req = base_request.clone();
            req.raw_messages = Some(raw_messages.clone());

            let started = Instant::now();
            let response = self.provider.send(&req).await;
            let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
            let response = match response {
                Ok(r) => {
                    self.metrics.record_llm_call(
                        &r.model,
                        true,
                        latency_ms,
                        u64::from(r.tokens_in),
                        u64::from(r.tokens_out),
                        "",
                    );
                    r
                }
                Err(e) => {
                    self.metrics
                        .record_llm_call(&self.defaults.model, false, latency_ms, 0, 0, &e.to_string());
                    return Err(e.into());
                }
            };

            if response.tool_calls.is_empty() || response.stop_reason != "tool_use" {
                final_content = Some(response.content);
                break;
            }

            used_tools = true;
            let mut assistant_content: Vec<serde_json::Value> = Vec::new();
            if !response.content.is_empty() {
                assistant_content.push(serde_json::json!({ "type": "text", "text": response.content }));
            }
            for call in &response.tool_calls {
                assistant_content.push(serde_json::json!({
                    "type": "tool_use",
                    "id": call.id,
                    "name": call.name,
                    "input": call.input,
                }));
            }
            raw_messages.push(serde_json::json!({ "role": "assistant", "content": assistant_content }));

            let mut tool_result_content: Vec<serde_json::Value> = Vec::new();
            for call in &response.tool_calls {
                let result = self
                    .execute_tool_with_policy(
                        &registry,
                        channel,
                        session_key.as_str(),
                        &call.name,
                        call.input.clone(),
                        meta.approved_all,
                        &approved_tools,
                    )
                    .await;
                tool_results.push((call.name.clone(), result.content.clone()));
                tool_result_content.push(serde_json::json!({
                    "type": "tool_result",
                    "tool_use_id": call.id,
                    "content": result.content,
                    "is_error": result.is_error,
                }));
            }
            raw_messages.push(serde_json::json!({ "role": "user", "content": tool_result_content }));
        }

        let Some(mut final_content) = final_content else {
            return Err(AgentError::IterationLimitReached(self.defaults.max_tool_iterations));
        };

        // Step 7: post-process the draft.
        if should_reflect(raw_user_content, used_tools, &final_content, self.defaults.enable_reflection) {
            final_content =
                reflect_response(self.provider.as_ref(), &self.defaults.model, raw_user_content, &final_content)
                    .await;
        }
        final_content = enforce_memory_truth(&final_content, &self.workspace);

        if is_explicit_remember_request(raw_user_content)
            && !tool_results
                .iter()
                .any(|(name, _)| name == "remember" || name == "update_profile")
        {
            if let Some(fact) = extract_remember_fact(raw_user_content) {
                if let Ok(outcome) = self.memory.remember_fact(&fact, "general", "auto_remember", None) {
                    if outcome.ok {
                        final_content.push_str("\n\n(Noted \u{2014} saved to memory.)");
                        tool_results.push(("remember".to_string(), "added".to_string()));
                    }
                }
            }
        }

        final_content = align_memory_claims(&final_content, &tool_results, &self.workspace);

        let requested_media = requested_media_delivery(raw_user_content);
        final_content = recover_media_denial(&final_content, requested_media, self.defaults.voice_recovery_mode);

        // Step 8: log the assistant turn into the daily note.
        self.memory
            .append_today(&format!("[{channel}] assistant: {}", compact_note(&final_content)))?;

        // Step 9: persist the turn pair.
        self.sessions
            .append_turn(session_key, SessionRole::User, raw_user_content, None, None)?;
        self.sessions
            .append_turn(session_key, SessionRole::Assistant, final_content.clone(), None, None)?;

        // Step 10: periodic session summarization.
        if self.defaults.summary_interval > 0 {
            let assistant_turn_index = (self.sessions.turn_count(session_key)?) / 2;
            if assistant_turn_index > 0
                && assistant_turn_index % self.defaults.summary_interval == 0
                && meta.last_summary_turn != assistant_turn_index
            {
                let turns = self.sessions.recent_history(session_key, (self.defaults.summary_interval as usize) * 2)?;
                let summary = build_session_summary(&turns, self.defaults.summary_interval as usize);
                if !summary.is_empty() {
                    let _ = self.memory.append_session_summary(session_key.as_str(), &summary);
                }
                meta.last_summary_turn = assistant_turn_index;
            }
        }

        Ok((final_content, iterations))
    }

    /// Resolves the policy decision for one tool call, honors a session's
    /// standing approvals, and retries once on a transient tool failure
    /// per the single-retry rule shared with the other two retry call
    /// sites (outbound dispatch, provider fallback).
    async fn execute_tool_with_policy(
        &self,
        registry: &ToolRegistry,
        channel: &str,
        sender_id: &str,
        tool_name: &str,
        args: serde_json::Value,
        approved_all: bool,
        approved_tools: &HashSet<String>,
    ) -> haven_tools::ToolResult {
        use haven_tools::ToolResult;

        let decision = resolve_policy(
            &self.tools_config.policy,
            channel,
            sender_id,
            tool_name,
            self.tools_config.approval_mode,
            &self.tools_config.risky_tools,
        );
        let decision = match decision {
            Decision::Ask if approved_all || approved_tools.contains(tool_name) => Decision::Allow,
            other => other,
        };

        match decision {
            Decision::Deny => return ToolResult::error(format!("tool '{tool_name}' is denied by policy")),
            Decision::Ask => {
                return ToolResult::error(format!(
                    "tool '{tool_name}' requires approval \u{2014} reply 'approve {tool_name}' or 'approve all' to proceed"
                ));
            }
            Decision::Allow => {}
        }

        if !registry.has(tool_name) {
            return ToolResult::error(format!("unknown tool: {tool_name}"));
        }

        let retry_policy = RetryPolicy::single_retry(Duration::from_millis(300));
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            let started = Instant::now();
            let result = registry.execute(tool_name, args.clone()).await;
            let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

            if !result.is_error || !retry_policy.should_retry(attempts) {
                let retry_kind = if attempts > 1 { "retried" } else { "none" };
                self.metrics.record_tool_call(
                    tool_name,
                    !result.is_error,
                    latency_ms,
                    attempts,
                    retry_kind,
                    if result.is_error { &result.content } else { "" },
                );
                return result;
            }

            tokio::time::sleep(retry_policy.delay_for_attempt(attempts - 1)).await;
        }
    }
}

/// Dispatcher seam handed to `spawn_subagent`: upgrades the loop's own weak
/// self-reference and re-enters `process_direct` one level deeper.
struct LoopDispatcher(Weak<AgentLoop>);

#[async_trait]
impl SubagentDispatcher for LoopDispatcher {
    async fn process_direct(&self, prompt: &str, depth: u32) -> std::result::Result<String, String> {
        let Some(agent) = self.0.upgrade() else {
            return Err("agent loop is shutting down".to_string());
        };
        agent.process_direct(prompt, depth).await.map_err(|e| e.to_string())
    }
}

/// Step 1: `system`-channel messages carry their real destination in
/// `chat_id` as `"{origin_channel}:{origin_chat_id}"` so the reply reaches
/// the actual origin instead of a literal "system" channel.
fn resolve_reply_target(msg: &InboundMessage) -> (String, String) {
    if msg.channel == "system" {
        if let Some((origin_channel, origin_chat_id)) = msg.chat_id.split_once(':') {
            return (origin_channel.to_string(), origin_chat_id.to_string());
        }
    }
    (msg.channel.clone(), msg.chat_id.clone())
}

/// Parses `approve <tool>` / `approve all` out of the current turn and
/// folds it into session metadata, one-shot, at the top of the pipeline.
fn apply_approval_intent(raw_content: &str, meta: &mut SessionMeta) {
    let (named, approve_all) = extract_approval_intent(raw_content);
    if approve_all {
        meta.approved_all = true;
        return;
    }
    if named.is_empty() {
        return;
    }
    let mut existing: Vec<String> = meta
        .extra
        .get("approved_tools")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();
    for tool in named {
        if !existing.contains(&tool) {
            existing.push(tool);
        }
    }
    meta.extra
        .insert("approved_tools".to_string(), serde_json::json!(existing));
}

fn requested_media_delivery(content: &str) -> bool {
    let lowered = content.to_lowercase();
    MEDIA_REQUEST_MARKERS.iter().any(|m| lowered.contains(m))
}

fn api_role(role: SessionRole) -> &'static str {
    match role {
        SessionRole::User => "user",
        SessionRole::Assistant => "assistant",
        SessionRole::Tool => "user",
        SessionRole::System => "user",
    }
}

fn compact_note(text: &str) -> String {
    let joined = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if joined.chars().count() > 400 {
        let truncated: String = joined.chars().take(400).collect();
        format!("{truncated}...")
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_channel_routes_by_chat_id_convention() {
        let msg = InboundMessage {
            channel: "system".to_string(),
            sender_id: "cron".to_string(),
            chat_id: "telegram:12345".to_string(),
            content: "reminder".to_string(),
            media: Vec::new(),
            metadata: HashMap::new(),
        };
        let (channel, chat_id) = resolve_reply_target(&msg);
        assert_eq!(channel, "telegram");
        assert_eq!(chat_id, "12345");
    }

    #[test]
    fn non_system_channel_passes_through_unchanged() {
        let msg = InboundMessage {
            channel: "discord".to_string(),
            sender_id: "u1".to_string(),
            chat_id: "c1".to_string(),
            content: "hi".to_string(),
            media: Vec::new(),
            metadata: HashMap::new(),
        };
        let (channel, chat_id) = resolve_reply_target(&msg);
        assert_eq!(channel, "discord");
        assert_eq!(chat_id, "c1");
    }

    #[test]
    fn approve_all_sets_session_flag() {
        let mut meta = SessionMeta::default();
        apply_approval_intent("approve all", &mut meta);
        assert!(meta.approved_all);
    }

    #[test]
    fn approve_named_tool_is_recorded_without_duplicates() {
        let mut meta = SessionMeta::default();
        apply_approval_intent("approve execute_command", &mut meta);
        apply_approval_intent("approve execute_command", &mut meta);
        let tools: Vec<String> =
            serde_json::from_value(meta.extra.get("approved_tools").unwrap().clone()).unwrap();
        assert_eq!(tools, vec!["execute_command".to_string()]);
    }

    #[test]
    fn media_request_detected_from_free_text() {
        assert!(requested_media_delivery("send me a voice message about this"));
        assert!(!requested_media_delivery("what's the weather like"));
    }
}
