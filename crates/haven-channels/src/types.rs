use haven_core::InboundMessage;

/// Identity variants derived from a raw sender identifier for allowlist
/// matching: the literal value, each `|`-separated alternative, the prefix
/// before `@`, a digits-only form, and (for Indonesian phone numbers) the
/// cross-derived `0…`/`62…` form.
pub fn identity_variants(raw: &str) -> Vec<String> {
    let mut variants = Vec::new();
    let mut push = |v: String| {
        if !v.is_empty() && !variants.contains(&v) {
            variants.push(v);
        }
    };

    for part in raw.split('|') {
        let part = part.trim();
        push(part.to_string());

        if let Some((prefix, _)) = part.split_once('@') {
            push(prefix.to_string());
        }

        let digits: String = part.chars().filter(|c| c.is_ascii_digit()).collect();
        if !digits.is_empty() {
            push(digits.clone());
            if let Some(rest) = digits.strip_prefix('0') {
                push(format!("62{rest}"));
            } else if let Some(rest) = digits.strip_prefix("62") {
                push(format!("0{rest}"));
            }
        }
    }

    variants
}

/// Whether `sender_id` is permitted by an `allow_from` list, per §4.2's
/// identity-variant intersection rule. If no allow list is configured,
/// everyone is allowed — a freshly configured channel with an empty list
/// is the common single-user default, not a lockout.
pub fn is_allowed(allow_from: &[String], sender_id: &str) -> bool {
    if allow_from.is_empty() {
        return true;
    }
    let sender_variants = identity_variants(sender_id);
    allow_from.iter().any(|allowed| {
        identity_variants(allowed)
            .iter()
            .any(|v| sender_variants.contains(v))
    })
}

/// Whether an already-normalized inbound message should bypass the
/// allowlist check entirely (self-authored echoes from the platform).
pub fn bypasses_allowlist(msg: &InboundMessage) -> bool {
    msg.from_me()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indonesian_phone_forms_cross_derive() {
        let variants = identity_variants("081234567890");
        assert!(variants.contains(&"081234567890".to_string()));
        assert!(variants.contains(&"6281234567890".to_string()));
    }

    #[test]
    fn pipe_separated_alternatives_all_considered() {
        assert!(is_allowed(
            &["alice@example.com".to_string()],
            "bob|alice@example.com"
        ));
    }

    #[test]
    fn empty_allowlist_allows_everyone() {
        assert!(is_allowed(&[], "anyone"));
    }

    #[test]
    fn unmatched_sender_is_denied() {
        assert!(!is_allowed(&["628111".to_string()], "628222"));
    }
}
