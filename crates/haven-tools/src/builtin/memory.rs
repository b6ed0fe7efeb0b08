//! `remember`/`recall`/`update_profile`/`log_feedback` — thin wrappers over
//! [`haven_memory::MemoryStore`], grouped the way the teacher pairs its
//! related knowledge-base tools in one file.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use haven_memory::{MemoryScope, MemoryStore};

use crate::tool::{Tool, ToolResult};

pub struct RememberTool {
    memory: Arc<MemoryStore>,
}

impl RememberTool {
    pub fn new(memory: Arc<MemoryStore>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for RememberTool {
    fn name(&self) -> &str {
        "remember"
    }

    fn description(&self) -> &str {
        "Persist a durable fact about the user or world. Superseding and \
         deduplication are handled automatically — just state the fact."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "fact": { "type": "string" },
                "category": { "type": "string", "description": "e.g. preference, relationship, project (default 'general')." },
                "confidence": { "type": "number" }
            },
            "required": ["fact"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let fact = match input.get("fact").and_then(|v| v.as_str()) {
            Some(f) if !f.trim().is_empty() => f,
            _ => return ToolResult::error("missing required parameter: fact"),
        };
        let category = input.get("category").and_then(|v| v.as_str()).unwrap_or("general");
        let confidence = input.get("confidence").and_then(|v| v.as_f64());

        match self.memory.remember_fact(fact, category, "remember_tool", confidence) {
            Ok(outcome) => ToolResult::success(format!("{:?}", outcome.status)),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

pub struct RecallTool {
    memory: Arc<MemoryStore>,
}

impl RecallTool {
    pub fn new(memory: Arc<MemoryStore>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for RecallTool {
    fn name(&self) -> &str {
        "recall"
    }

    fn description(&self) -> &str {
        "Search remembered facts and notes by lexical query, ranked by \
         relevance, confidence, and recency."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" },
                "max_items": { "type": "integer", "default": 10 },
                "lookback_days": { "type": "integer", "default": 90 },
                "explain": { "type": "boolean", "default": false, "description": "Include each result's score breakdown (overlap terms, lexical ratio, semantic similarity, recency/source bonuses)." }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let query = match input.get("query").and_then(|v| v.as_str()) {
            Some(q) if !q.trim().is_empty() => q,
            _ => return ToolResult::error("missing required parameter: query"),
        };
        let max_items = input.get("max_items").and_then(|v| v.as_u64()).unwrap_or(10) as usize;
        let lookback_days = input.get("lookback_days").and_then(|v| v.as_i64()).unwrap_or(90);
        let explain = input.get("explain").and_then(|v| v.as_bool()).unwrap_or(false);

        let scopes: HashSet<MemoryScope> = MemoryScope::all().into_iter().collect();
        let items = self.memory.recall(query, max_items, lookback_days, &scopes, explain);
        if items.is_empty() {
            return ToolResult::success("(no matching memories)");
        }
        let lines: Vec<String> = items
            .iter()
            .map(|i| match &i.why {
                Some(why) => format!(
                    "[{} score={}] {} (overlap={:?} lexical_ratio={:.2} semantic_similarity={:.2} confidence={:.2} age_days={} source_bonus={:.1} recency_bonus={:.1})",
                    i.source,
                    i.score,
                    i.text,
                    why.overlap_terms,
                    why.lexical_ratio,
                    why.semantic_similarity,
                    why.confidence,
                    why.age_days,
                    why.source_bonus,
                    why.recency_bonus,
                ),
                None => format!("[{} score={}] {}", i.source, i.score, i.text),
            })
            .collect();
        ToolResult::success(lines.join("\n"))
    }
}

pub struct UpdateProfileTool {
    memory: Arc<MemoryStore>,
}

impl UpdateProfileTool {
    pub fn new(memory: Arc<MemoryStore>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for UpdateProfileTool {
    fn name(&self) -> &str {
        "update_profile"
    }

    fn description(&self) -> &str {
        "Set or update a single field in a named profile section, e.g. \
         section='Preferences', key='Timezone', value='America/Chicago'."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "section": { "type": "string" },
                "key": { "type": "string" },
                "value": { "type": "string" }
            },
            "required": ["section", "key", "value"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let section = match input.get("section").and_then(|v| v.as_str()) {
            Some(s) => s,
            None => return ToolResult::error("missing required parameter: section"),
        };
        let key = match input.get("key").and_then(|v| v.as_str()) {
            Some(k) => k,
            None => return ToolResult::error("missing required parameter: key"),
        };
        let value = input.get("value").and_then(|v| v.as_str()).unwrap_or("");

        match self.memory.upsert_profile_field(section, key, value) {
            Ok(true) => ToolResult::success(format!("updated {section}.{key}")),
            Ok(false) => ToolResult::error("key was empty after trimming; nothing updated"),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

pub struct LogFeedbackTool {
    memory: Arc<MemoryStore>,
}

impl LogFeedbackTool {
    pub fn new(memory: Arc<MemoryStore>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for LogFeedbackTool {
    fn name(&self) -> &str {
        "log_feedback"
    }

    fn description(&self) -> &str {
        "Record a lesson learned from a correction or mistake, so future \
         turns avoid repeating it."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "lesson": { "type": "string" },
                "source": { "type": "string", "default": "self_reflection" },
                "severity": { "type": "string", "default": "minor" }
            },
            "required": ["lesson"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let lesson = match input.get("lesson").and_then(|v| v.as_str()) {
            Some(l) if !l.trim().is_empty() => l,
            _ => return ToolResult::error("missing required parameter: lesson"),
        };
        let source = input.get("source").and_then(|v| v.as_str()).unwrap_or("self_reflection");
        let severity = input.get("severity").and_then(|v| v.as_str()).unwrap_or("minor");

        match self.memory.append_lesson(lesson, source, severity) {
            Ok(true) => ToolResult::success("lesson recorded"),
            Ok(false) => ToolResult::error("lesson was empty after trimming; nothing recorded"),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}
