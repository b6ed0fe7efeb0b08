//! Parses `approve <tool>` / `approve all` out of a user turn so a tool
//! gated at `ask` can be let through for the rest of the session.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::markers::APPROVAL_SKIP_WORDS;

static APPROVE_ALL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bapprove\s*[:=]?\s*all\b").expect("valid regex"));
static APPROVE_NAMED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bapprove\s*[:=]?\s*([a-z0-9_\-, ]+)").expect("valid regex"));
static SPLIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,\s]+").expect("valid regex"));

/// Returns `(named_tools, approve_all)`. `approve_all` takes priority: when
/// set, `named_tools` is always empty.
pub fn extract_approval_intent(text: &str) -> (HashSet<String>, bool) {
    let lowered = text.trim().to_lowercase();
    if lowered.is_empty() {
        return (HashSet::new(), false);
    }
    if APPROVE_ALL_RE.is_match(&lowered) {
        return (HashSet::new(), true);
    }

    let Some(caps) = APPROVE_NAMED_RE.captures(&lowered) else {
        return (HashSet::new(), false);
    };
    let raw = caps.get(1).map(|m| m.as_str()).unwrap_or("");
    let names = SPLIT_RE
        .split(raw)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty() && !APPROVAL_SKIP_WORDS.contains(s))
        .map(|s| s.to_string())
        .collect();
    (names, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approve_all_wins_over_named() {
        let (names, all) = extract_approval_intent("approve all please");
        assert!(all);
        assert!(names.is_empty());
    }

    #[test]
    fn approve_named_tools_splits_on_comma_and_space() {
        let (names, all) = extract_approval_intent("approve: execute_command, send_email");
        assert!(!all);
        assert_eq!(names.len(), 2);
        assert!(names.contains("execute_command"));
        assert!(names.contains("send_email"));
    }

    #[test]
    fn no_approval_phrase_returns_empty() {
        let (names, all) = extract_approval_intent("what's the weather");
        assert!(!all);
        assert!(names.is_empty());
    }

    #[test]
    fn skip_words_are_filtered_out() {
        let (names, _) = extract_approval_intent("approve tool execute_command and send_email please");
        assert!(!names.contains("tool"));
        assert!(!names.contains("and"));
        assert!(!names.contains("please"));
        assert!(names.contains("execute_command"));
    }
}
