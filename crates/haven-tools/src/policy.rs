use std::collections::HashMap;

use haven_core::config::ApprovalMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Ask,
    Deny,
}

/// Resolve a policy decision for one tool call, in key order:
/// `{channel}:{sender_id}:{tool} -> {channel}:*:{tool} -> {channel}:{tool}
/// -> {tool} -> "*"`. Falls back to `ask` for a `risky_tools` member under
/// `confirm` approval mode when no rule matches, else `allow`.
pub fn resolve_policy(
    policy_map: &HashMap<String, String>,
    channel: &str,
    sender_id: &str,
    tool: &str,
    approval_mode: ApprovalMode,
    risky_tools: &[String],
) -> Decision {
    let keys = [
        format!("{channel}:{sender_id}:{tool}"),
        format!("{channel}:*:{tool}"),
        format!("{channel}:{tool}"),
        tool.to_string(),
        "*".to_string(),
    ];
    for key in &keys {
        if let Some(decision) = policy_map.get(key) {
            match decision.as_str() {
                "allow" => return Decision::Allow,
                "ask" => return Decision::Ask,
                "deny" => return Decision::Deny,
                _ => {}
            }
        }
    }
    if approval_mode == ApprovalMode::Confirm && risky_tools.iter().any(|t| t == tool) {
        return Decision::Ask;
    }
    Decision::Allow
}

#[cfg(test)]
mod tests {
    use super::*;

    fn risky() -> Vec<String> {
        vec!["execute_command".to_string()]
    }

    #[test]
    fn most_specific_key_wins() {
        let mut map = HashMap::new();
        map.insert("telegram:alice:execute_command".to_string(), "deny".to_string());
        map.insert("execute_command".to_string(), "allow".to_string());
        let d = resolve_policy(&map, "telegram", "alice", "execute_command", ApprovalMode::Off, &risky());
        assert_eq!(d, Decision::Deny);
    }

    #[test]
    fn wildcard_sender_key_matches() {
        let mut map = HashMap::new();
        map.insert("telegram:*:execute_command".to_string(), "ask".to_string());
        let d = resolve_policy(&map, "telegram", "bob", "execute_command", ApprovalMode::Off, &risky());
        assert_eq!(d, Decision::Ask);
    }

    #[test]
    fn confirm_mode_defaults_risky_tools_to_ask() {
        let map = HashMap::new();
        let d = resolve_policy(&map, "cli", "self", "execute_command", ApprovalMode::Confirm, &risky());
        assert_eq!(d, Decision::Ask);
    }

    #[test]
    fn unmatched_non_risky_tool_defaults_to_allow() {
        let map = HashMap::new();
        let d = resolve_policy(&map, "cli", "self", "read_file", ApprovalMode::Confirm, &risky());
        assert_eq!(d, Decision::Allow);
    }

    #[test]
    fn global_wildcard_key_applies_last() {
        let mut map = HashMap::new();
        map.insert("*".to_string(), "deny".to_string());
        let d = resolve_policy(&map, "cli", "self", "read_file", ApprovalMode::Off, &[]);
        assert_eq!(d, Decision::Deny);
    }
}
