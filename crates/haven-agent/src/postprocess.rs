//! Post-processing passes applied to the model's draft answer before it is
//! logged and published: memory-truth enforcement, auto-remember, memory
//! claim alignment, reflection, and session summarization.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use haven_core::config::VoiceRecoveryMode;
use haven_core::types::SessionTurn;
use haven_providers::{ChatRequest, LlmProvider, Message, Role};

use crate::markers::{
    MEMORY_DENIAL_MARKERS, PROFILE_CLAIM_MARKERS, REMEMBER_LEADING_FILLER_PATTERNS,
    REMEMBER_REQUEST_PATTERNS, REMEMBER_SKIP_MARKERS,
};

/// Rewrites a denial of persistent memory into a pointer at the actual
/// on-disk memory files, when the draft contains one of the known markers.
pub fn enforce_memory_truth(content: &str, workspace: &Path) -> String {
    let text = content.trim();
    if text.is_empty() {
        return text.to_string();
    }
    let lowered = text.to_lowercase();
    if !MEMORY_DENIAL_MARKERS.iter().any(|m| lowered.contains(m)) {
        return text.to_string();
    }

    let workspace_path = workspace.display();
    format!(
        "I keep persistent memory across sessions.\n\
         It lives under:\n\
         - {workspace_path}/memory/MEMORY.md\n\
         - {workspace_path}/memory/PROFILE.md\n\
         - {workspace_path}/memory/RELATIONSHIPS.md\n\
         - {workspace_path}/memory/PROJECTS.md\n\
         - {workspace_path}/memory/LESSONS.md\n\
         - {workspace_path}/memory/YYYY-MM-DD.md"
    )
}

static REMEMBER_PATTERNS_COMPILED: Lazy<Vec<Regex>> = Lazy::new(|| {
    REMEMBER_REQUEST_PATTERNS
        .iter()
        .map(|p| Regex::new(p).expect("valid regex"))
        .collect()
});
static REMEMBER_FILLER_COMPILED: Lazy<Vec<Regex>> = Lazy::new(|| {
    REMEMBER_LEADING_FILLER_PATTERNS
        .iter()
        .map(|p| Regex::new(&format!("(?i){p}")).expect("valid regex"))
        .collect()
});

/// Detects an explicit request to durably remember something (e.g. "remember
/// that I prefer tea", "ingatin ya aku suka kopi").
pub fn is_explicit_remember_request(content: &str) -> bool {
    let text = content.trim().to_lowercase();
    if text.is_empty() {
        return false;
    }
    if REMEMBER_SKIP_MARKERS.iter().any(|m| text.contains(m)) {
        return false;
    }
    REMEMBER_PATTERNS_COMPILED.iter().any(|re| re.is_match(&text))
}

/// Strips the remember/ingat-style prefix off a request, returning the
/// durable fact payload. `None` when nothing usable remains.
pub fn extract_remember_fact(content: &str) -> Option<String> {
    let mut fact = content.trim().to_string();
    if fact.is_empty() {
        return None;
    }
    for re in REMEMBER_FILLER_COMPILED.iter() {
        fact = re.replace(&fact, "").to_string();
    }
    let fact = fact.trim_matches(|c: char| c.is_whitespace() || "\"'`".contains(c));
    if fact.len() < 4 {
        return None;
    }
    if fact.len() > 500 {
        let mut truncated = fact[..500].trim_end().to_string();
        truncated.push_str("...");
        return Some(truncated);
    }
    Some(fact.to_string())
}

/// Corrects a claim that a fact was saved to the profile when the tools
/// actually executed this turn say otherwise.
pub fn align_memory_claims(content: &str, tool_results: &[(String, String)], workspace: &Path) -> String {
    let text = content.trim();
    if text.is_empty() {
        return text.to_string();
    }
    let lowered = text.to_lowercase();
    if !PROFILE_CLAIM_MARKERS.iter().any(|m| lowered.contains(m)) {
        return text.to_string();
    }

    let profile_saved = tool_results.iter().any(|(name, result)| {
        name == "update_profile" && result.to_lowercase().contains("updated")
    });
    if profile_saved {
        return text.to_string();
    }

    let memory_saved = tool_results
        .iter()
        .any(|(name, result)| name == "remember" && !result.to_lowercase().contains("error"));

    let workspace_path = workspace.display();
    if memory_saved {
        format!(
            "{}\n\nNote: this fact was saved to `{workspace_path}/memory/MEMORY.md`, not PROFILE.md.",
            text.trim_end()
        )
    } else {
        format!(
            "{}\n\nNote: profile storage wasn't confirmed this turn; use an explicit update_profile call \
             (e.g. name/timezone/preference) to persist it there.",
            text.trim_end()
        )
    }
}

const REFLECTION_COMPLEX_KEYWORDS: &[&str] = &[
    "plan", "roadmap", "step", "debug", "error", "fix", "why", "compare", "analyze", "implement", "design",
];

/// Decides whether a reflection pass is worth the extra model call.
pub fn should_reflect(user_content: &str, used_tools: bool, draft: &str, enable_reflection: bool) -> bool {
    if !enable_reflection || draft.trim().is_empty() {
        return false;
    }
    let text = user_content.to_lowercase();
    let is_complex = text.len() >= 120 || REFLECTION_COMPLEX_KEYWORDS.iter().any(|k| text.contains(k));
    used_tools || is_complex
}

/// Runs a lightweight reviewer pass over the draft; returns the draft
/// unchanged on `KEEP`, on an empty response, or on a provider error.
pub async fn reflect_response(provider: &dyn LlmProvider, model: &str, user_content: &str, draft: &str) -> String {
    let review_prompt = "You are a response reviewer. Improve the draft answer for correctness, clarity, \
         and directness. Keep it concise. If the draft is already good, return exactly KEEP.";
    let review_input = format!(
        "User message:\n{user_content}\n\nDraft answer:\n{draft}\n\nOutput either KEEP or a revised final answer."
    );

    let request = ChatRequest {
        model: model.to_string(),
        system: review_prompt.to_string(),
        system_prompt: None,
        messages: vec![Message {
            role: Role::User,
            content: review_input,
        }],
        max_tokens: (draft.len() as u32 / 2 + 200).clamp(256, 1200),
        stream: false,
        thinking: None,
        tools: Vec::new(),
        raw_messages: None,
    };

    match provider.send(&request).await {
        Ok(resp) => {
            let reviewed = resp.content.trim();
            if reviewed.is_empty() || reviewed.eq_ignore_ascii_case("keep") {
                draft.to_string()
            } else {
                reviewed.to_string()
            }
        }
        Err(_) => draft.to_string(),
    }
}

fn compact(text: &str, limit: usize) -> String {
    let joined = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if joined.len() > limit {
        format!("{}...", &joined[..limit])
    } else {
        joined
    }
}

/// Builds a compact heuristic summary from the tail of a session's turns,
/// deduped and capped, for periodic session summarization.
pub fn build_session_summary(turns: &[SessionTurn], max_pairs: usize) -> String {
    let recent = if turns.len() > max_pairs * 2 {
        &turns[turns.len() - max_pairs * 2..]
    } else {
        turns
    };

    let mut user_items: Vec<String> = Vec::new();
    let mut assistant_items: Vec<String> = Vec::new();
    for turn in recent {
        let content = compact(&turn.content, 180);
        if content.is_empty() {
            continue;
        }
        match turn.role {
            haven_core::types::SessionRole::User if !user_items.contains(&content) => user_items.push(content),
            haven_core::types::SessionRole::Assistant if !assistant_items.contains(&content) => {
                assistant_items.push(content)
            }
            _ => {}
        }
    }

    if user_items.is_empty() && assistant_items.is_empty() {
        return String::new();
    }

    let mut parts = Vec::new();
    if !user_items.is_empty() {
        let preview = user_items[user_items.len().saturating_sub(2)..].join(" | ");
        parts.push(format!("user: {preview}"));
    }
    if !assistant_items.is_empty() {
        let preview = assistant_items[assistant_items.len().saturating_sub(2)..].join(" | ");
        parts.push(format!("assistant: {preview}"));
    }
    parts.join(" || ")
}

/// Substrings indicating the model refused to produce voice/image/sticker
/// media it was actually asked to deliver through `send_message`.
const MEDIA_DENIAL_MARKERS: &[&str] = &[
    "i can't generate audio",
    "i cannot generate audio",
    "i can't create a voice message",
    "i cannot create a voice message",
    "i can't generate an image",
    "i cannot generate an image",
    "i don't have the ability to create images",
    "i can't make a sticker",
    "i cannot make a sticker",
];

/// When the model was asked to deliver voice/image/sticker media but its
/// draft denies the capability instead of just describing the content to
/// hand to `send_message`, recover according to the configured mode: strip
/// the denial sentence (`Suppress`) or replace it with a short redirect
/// toward actually calling the tool (`Rewrite`, the default).
pub fn recover_media_denial(draft: &str, requested_media: bool, mode: VoiceRecoveryMode) -> String {
    if !requested_media {
        return draft.to_string();
    }
    let lowered = draft.to_lowercase();
    if !MEDIA_DENIAL_MARKERS.iter().any(|m| lowered.contains(m)) {
        return draft.to_string();
    }

    match mode {
        VoiceRecoveryMode::Suppress => {
            let mut out = draft.to_string();
            for marker in MEDIA_DENIAL_MARKERS {
                if let Some(idx) = out.to_lowercase().find(marker) {
                    let end = out[idx..]
                        .find('.')
                        .map(|i| idx + i + 1)
                        .unwrap_or(out.len());
                    out.replace_range(idx..end, "");
                }
            }
            out.trim().to_string()
        }
        VoiceRecoveryMode::Rewrite => format!(
            "{}\n\nUse the `send_message` tool with the requested `media_type` to deliver this \
             content directly — it does not need to be generated here first.",
            draft.trim_end()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enforce_memory_truth_rewrites_known_denial() {
        let out = enforce_memory_truth(
            "I don't have long-term memory, sorry!",
            Path::new("/ws"),
        );
        assert!(out.contains("/ws/memory/MEMORY.md"));
    }

    #[test]
    fn enforce_memory_truth_passes_through_unrelated_text() {
        let out = enforce_memory_truth("Sure, here's the weather.", Path::new("/ws"));
        assert_eq!(out, "Sure, here's the weather.");
    }

    #[test]
    fn remember_request_detected_and_skip_marker_vetoes() {
        assert!(is_explicit_remember_request("please remember that I like tea"));
        assert!(!is_explicit_remember_request("don't remember this"));
        assert!(!is_explicit_remember_request("what's 2+2"));
    }

    #[test]
    fn extract_remember_fact_strips_prefix() {
        let fact = extract_remember_fact("remember that I prefer dark mode").unwrap();
        assert_eq!(fact, "I prefer dark mode");
    }

    #[test]
    fn extract_remember_fact_rejects_too_short() {
        assert!(extract_remember_fact("remember hi").is_none());
    }

    #[test]
    fn align_memory_claims_notes_mismatch_when_no_tool_confirms() {
        let out = align_memory_claims("Saved to profile!", &[], Path::new("/ws"));
        assert!(out.contains("profile storage wasn't confirmed"));
    }

    #[test]
    fn align_memory_claims_leaves_confirmed_profile_save_alone() {
        let results = vec![("update_profile".to_string(), "updated Preferences.Timezone".to_string())];
        let out = align_memory_claims("Saved to profile!", &results, Path::new("/ws"));
        assert_eq!(out, "Saved to profile!");
    }

    #[test]
    fn should_reflect_triggers_on_tool_use_or_complexity() {
        assert!(should_reflect("hi", true, "draft", true));
        assert!(should_reflect("please debug this error for me", false, "draft", true));
        assert!(!should_reflect("hi", false, "draft", true));
        assert!(!should_reflect("hi", true, "draft", false));
    }

    #[test]
    fn build_session_summary_dedupes_and_caps() {
        use haven_core::types::SessionRole;
        let turns = vec![
            SessionTurn { role: SessionRole::User, content: "hi".into(), tool_call_id: None, name: None, created_at: "t".into() },
            SessionTurn { role: SessionRole::Assistant, content: "hello".into(), tool_call_id: None, name: None, created_at: "t".into() },
        ];
        let summary = build_session_summary(&turns, 4);
        assert!(summary.contains("user: hi"));
        assert!(summary.contains("assistant: hello"));
    }

    #[test]
    fn recover_media_denial_rewrite_mode_redirects_to_tool() {
        let out = recover_media_denial(
            "I can't generate audio for you.",
            true,
            VoiceRecoveryMode::Rewrite,
        );
        assert!(out.contains("send_message"));
    }

    #[test]
    fn recover_media_denial_ignored_when_media_not_requested() {
        let out = recover_media_denial("I can't generate audio for you.", false, VoiceRecoveryMode::Rewrite);
        assert_eq!(out, "I can't generate audio for you.");
    }
}
