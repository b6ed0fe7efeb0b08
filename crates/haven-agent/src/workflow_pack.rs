//! Predefined workflow packs: multi-step, multi-tool tasks the user can
//! trigger by name (`/pack daily`, `run workflow pack meeting ...`) instead
//! of describing the whole task by hand.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

struct PackSpec {
    objective: &'static str,
    instructions: &'static [&'static str],
}

static PACK_ALIASES: Lazy<Vec<(&'static str, &'static str)>> = Lazy::new(|| {
    vec![
        ("daily", "daily_brief"),
        ("brief", "daily_brief"),
        ("dailybrief", "daily_brief"),
        ("meeting", "meeting_prep"),
        ("prep", "meeting_prep"),
        ("inbox", "inbox_zero_batch"),
        ("inboxzero", "inbox_zero_batch"),
        ("inboxzerobatch", "inbox_zero_batch"),
    ]
});

fn pack_spec(name: &str) -> Option<PackSpec> {
    match name {
        "daily_brief" => Some(PackSpec {
            objective: "Prepare a concise daily execution brief from calendar, inbox, and memory.",
            instructions: &[
                "Call `calendar_list_events` for today's schedule and key meetings.",
                "Call `gmail_list_threads` for unread/high-priority threads.",
                "Call `recall` for relevant priorities, blockers, and commitments.",
                "If needed, call `web_search` for one external context check.",
                "Output format: Top 3 priorities, schedule risks, inbox actions, next focus block.",
            ],
        }),
        "meeting_prep" => Some(PackSpec {
            objective: "Assemble a focused meeting prep note with agenda, risks, and follow-ups.",
            instructions: &[
                "Call `calendar_list_events` and identify the target meeting from provided context.",
                "Call `gmail_list_threads` and `gmail_read_thread` for related discussion context.",
                "Call `recall` for prior decisions, relationship notes, and open commitments.",
                "Output format: Meeting goal, talking points, decisions needed, red flags, follow-up checklist.",
            ],
        }),
        "inbox_zero_batch" => Some(PackSpec {
            objective: "Create a practical inbox-zero batch plan with reply priorities.",
            instructions: &[
                "Call `gmail_list_threads` for unread threads and cluster by urgency.",
                "Call `gmail_read_thread` only for top priority threads to reduce latency.",
                "Use `recall` for sender context and existing commitments before drafting actions.",
                "Optionally call `gmail_draft` for top 3 replies if user asks to proceed.",
                "Output format: Urgent-now, Today, Delegate/Later, Suggested reply drafts.",
            ],
        }),
        _ => None,
    }
}

fn normalize_pack_name(name: &str) -> String {
    static NORMALIZE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"));
    let raw = name.trim().to_lowercase();
    if raw.is_empty() {
        return String::new();
    }
    NORMALIZE_RE.replace_all(&raw, "_").trim_matches('_').to_string()
}

fn canonical_pack_name(name: &str) -> Option<&'static str> {
    let normalized = normalize_pack_name(name);
    if normalized.is_empty() {
        return None;
    }
    if let Some(spec_name) = ["daily_brief", "meeting_prep", "inbox_zero_batch"]
        .iter()
        .find(|n| **n == normalized)
    {
        return Some(spec_name);
    }
    PACK_ALIASES
        .iter()
        .find(|(alias, _)| *alias == normalized)
        .map(|(_, canonical)| *canonical)
}

static PACK_SLASH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^/pack\s+([a-zA-Z0-9_\-]+)(?:\s+(.+))?$").expect("valid regex"));
static PACK_RUN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:run|jalankan|jalanin)\s+(?:workflow\s+)?pack\s+([a-zA-Z0-9_\-]+)(?:\s+(.+))?$")
        .expect("valid regex")
});
static PACK_WORKFLOW_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^workflow(?:\s+pack)?\s+([a-zA-Z0-9_\-]+)(?:\s+(.+))?$").expect("valid regex")
});

/// Parses an explicit workflow-pack invocation out of a user message.
/// Returns `(canonical_pack_name, remaining_user_context)`.
pub fn resolve_workflow_pack_request(content: &str) -> Option<(&'static str, String)> {
    let text = content.trim();
    if text.is_empty() {
        return None;
    }
    for re in [&*PACK_SLASH_RE, &*PACK_RUN_RE, &*PACK_WORKFLOW_RE] {
        let Some(caps) = re.captures(text) else { continue };
        let pack_name = canonical_pack_name(caps.get(1).map(|m| m.as_str()).unwrap_or(""))?;
        let user_context = caps.get(2).map(|m| m.as_str().trim().to_string()).unwrap_or_default();
        return Some((pack_name, user_context));
    }
    None
}

/// Builds the full execution prompt handed to the model for a resolved pack.
pub fn build_workflow_pack_prompt(pack_name: &str, user_context: &str) -> String {
    let Some(canonical) = canonical_pack_name(pack_name) else {
        return String::new();
    };
    let spec = pack_spec(canonical).expect("canonical name always has a spec");
    let (cleaned_context, flags) = extract_pack_flags(user_context);

    let mut lines = vec![
        format!("Workflow Pack: {canonical}"),
        format!("Objective: {}", spec.objective),
        String::new(),
        "Execution rules:".to_string(),
        "- Use available tools directly; do not ask for permission unless policy blocks a tool.".to_string(),
        "- If a required tool is unavailable, continue with best-effort fallback and state the gap.".to_string(),
        "- Be concise and action-oriented.".to_string(),
        String::new(),
        "Steps:".to_string(),
    ];
    lines.extend(spec.instructions.iter().map(|i| format!("- {i}")));

    let delivery_modes = select_delivery_modes(&flags);
    if !delivery_modes.is_empty() {
        lines.push(String::new());
        lines.push("Delivery mode:".to_string());
        if delivery_modes.len() == 1 {
            let mode = delivery_modes[0];
            lines.push(format!("- {} requested.", delivery_mode_label(mode)));
            lines.push("- After preparing the brief, call `send_message` tool exactly once with:".to_string());
            lines.push(format!("  1) {}", delivery_mode_instruction(mode)));
        } else {
            let labels = delivery_modes
                .iter()
                .map(|m| format!("`--{m}`"))
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!("- Multi mode requested ({labels})."));
            lines.push(format!(
                "- After preparing the brief, call `send_message` tool exactly {} times:",
                delivery_modes.len()
            ));
            for (index, mode) in delivery_modes.iter().enumerate() {
                lines.push(format!("  {}) {}", index + 1, delivery_mode_instruction(mode)));
            }
        }
        lines.push(
            "- If any media generation/policy block happens, return text fallback and explain which mode failed."
                .to_string(),
        );
        if flags.contains("silent") {
            lines.push(
                "- Silent mode requested (`--silent`): avoid extra narrative text once media delivery succeeds."
                    .to_string(),
            );
        }
    } else if flags.contains("silent") {
        lines.push(String::new());
        lines.push("Delivery mode:".to_string());
        lines.push(
            "- `--silent` was requested without media mode; ignore silent mode and return normal text brief."
                .to_string(),
        );
    }

    if !cleaned_context.is_empty() {
        lines.push(String::new());
        lines.push(format!("User context: {cleaned_context}"));
    }
    lines.push(String::new());
    lines.push("Return a final brief with clear next actions.".to_string());
    lines.join("\n")
}

/// Strips `--voice`/`--image`/`--sticker`/`--silent` tokens out of free text,
/// returning the cleaned text plus the set of flags found.
pub fn extract_pack_flags(user_context: &str) -> (String, HashSet<&'static str>) {
    let text = user_context.trim();
    if text.is_empty() {
        return (String::new(), HashSet::new());
    }
    let mut flags = HashSet::new();
    let mut tokens = Vec::new();
    for token in text.split_whitespace() {
        match token.to_lowercase().as_str() {
            "--voice" => {
                flags.insert("voice");
            }
            "--image" => {
                flags.insert("image");
            }
            "--sticker" => {
                flags.insert("sticker");
            }
            "--silent" => {
                flags.insert("silent");
            }
            _ => tokens.push(token),
        }
    }
    (tokens.join(" ").trim().to_string(), flags)
}

fn select_delivery_modes(flags: &HashSet<&'static str>) -> Vec<&'static str> {
    ["sticker", "image", "voice"]
        .into_iter()
        .filter(|m| flags.contains(m))
        .collect()
}

fn delivery_mode_label(mode: &str) -> String {
    match mode {
        "voice" => "Voice mode (`--voice`)".to_string(),
        "image" => "Image mode (`--image`)".to_string(),
        "sticker" => "Sticker mode (`--sticker`)".to_string(),
        other => format!("Mode (`--{other}`)"),
    }
}

fn delivery_mode_instruction(mode: &str) -> String {
    match mode {
        "voice" => "`media_type`: `voice` with concise spoken summary (<= 120 words).".to_string(),
        "image" => {
            "`media_type`: `image` with short card text (headline + key bullets, <= 140 words).".to_string()
        }
        "sticker" => "`media_type`: `sticker` with very short punchline (<= 16 words).".to_string(),
        other => format!("`media_type`: `{other}` with concise summary."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slash_pack_resolves_alias() {
        let (name, ctx) = resolve_workflow_pack_request("/pack daily focus on work").unwrap();
        assert_eq!(name, "daily_brief");
        assert_eq!(ctx, "focus on work");
    }

    #[test]
    fn run_workflow_pack_resolves() {
        let (name, _) = resolve_workflow_pack_request("run workflow pack meeting").unwrap();
        assert_eq!(name, "meeting_prep");
    }

    #[test]
    fn unknown_pack_name_returns_none() {
        assert!(resolve_workflow_pack_request("/pack bogus").is_none());
    }

    #[test]
    fn non_pack_text_returns_none() {
        assert!(resolve_workflow_pack_request("what's the weather today").is_none());
    }

    #[test]
    fn flags_are_stripped_and_ordered_sticker_image_voice() {
        let prompt = build_workflow_pack_prompt("daily", "--voice --sticker extra context");
        assert!(prompt.contains("Multi mode requested"));
        let sticker_pos = prompt.find("sticker").unwrap();
        let voice_pos = prompt.find("voice").unwrap();
        assert!(sticker_pos < voice_pos);
        assert!(prompt.contains("User context: extra context"));
    }

    #[test]
    fn silent_without_media_mode_is_ignored() {
        let prompt = build_workflow_pack_prompt("inbox", "--silent");
        assert!(prompt.contains("ignore silent mode"));
    }
}
