/// 3-tier system prompt for Anthropic prompt caching.
///
/// TIER 1 (static): workspace identity files + safety + tool defs — identical
///   for ALL sessions. → `cache_control: {type: "ephemeral"}` — high hit rate.
/// TIER 2 (per-user): memory context + permissions + channel adaptation.
///   → `cache_control: {type: "ephemeral"}` — hits when the same user
///   continues.
/// TIER 3 (volatile): session info + turn count + timestamp.
///   → NO cache — always changes, placed LAST so it doesn't break the
///   cached prefix.
#[derive(Debug, Clone)]
pub struct SystemPrompt {
    pub static_tier: String,
    pub user_tier: String,
    pub volatile_tier: String,
}

impl SystemPrompt {
    /// Flatten all tiers into a single string, for providers without caching.
    pub fn to_plain_text(&self) -> String {
        let mut out = self.static_tier.clone();
        if !self.user_tier.is_empty() {
            out.push_str("\n\n");
            out.push_str(&self.user_tier);
        }
        if !self.volatile_tier.is_empty() {
            out.push_str("\n\n");
            out.push_str(&self.volatile_tier);
        }
        out
    }

    /// Convert to Anthropic API format with 2 cache breakpoints.
    pub fn to_anthropic_blocks(&self) -> Vec<serde_json::Value> {
        let mut blocks = Vec::with_capacity(3);

        blocks.push(serde_json::json!({
            "type": "text",
            "text": self.static_tier,
            "cache_control": { "type": "ephemeral" }
        }));

        if !self.user_tier.is_empty() {
            blocks.push(serde_json::json!({
                "type": "text",
                "text": self.user_tier,
                "cache_control": { "type": "ephemeral" }
            }));
        }

        if !self.volatile_tier.is_empty() {
            blocks.push(serde_json::json!({
                "type": "text",
                "text": self.volatile_tier,
            }));
        }

        blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_joins_non_empty_tiers() {
        let prompt = SystemPrompt {
            static_tier: "static".into(),
            user_tier: "user".into(),
            volatile_tier: String::new(),
        };
        assert_eq!(prompt.to_plain_text(), "static\n\nuser");
    }

    #[test]
    fn anthropic_blocks_cache_static_and_user_tiers_only() {
        let prompt = SystemPrompt {
            static_tier: "static".into(),
            user_tier: "user".into(),
            volatile_tier: "volatile".into(),
        };
        let blocks = prompt.to_anthropic_blocks();
        assert_eq!(blocks.len(), 3);
        assert!(blocks[0]["cache_control"].is_object());
        assert!(blocks[1]["cache_control"].is_object());
        assert!(blocks[2].get("cache_control").is_none());
    }
}
