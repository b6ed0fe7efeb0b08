//! Phrase tables used by post-processing to catch the model contradicting
//! its own persistent-memory capabilities, and to detect explicit
//! remember/forget requests. Bilingual (English + Indonesian) to match the
//! workspace population these phrases were drawn from.

/// Substrings that indicate the model denied having persistent memory.
pub const MEMORY_DENIAL_MARKERS: &[&str] = &[
    "i don't have long-term memory",
    "i do not have long-term memory",
    "i don't have persistent memory",
    "i do not have persistent memory",
    "only remember this conversation",
    "only within this conversation",
    "saya tidak punya memory jangka panjang",
    "saya tidak memiliki memory jangka panjang",
    "hanya bisa mengingat percakapan ini",
];

/// Substrings that veto an otherwise-matching remember request ("don't save this").
pub const REMEMBER_SKIP_MARKERS: &[&str] = &[
    "jangan ingat",
    "jgn ingat",
    "jangan simpan",
    "do not remember",
    "don't remember",
];

/// Regex patterns (case-insensitive) that indicate an explicit request to
/// durably remember something.
pub const REMEMBER_REQUEST_PATTERNS: &[&str] = &[
    r"^\s*(tolong|please)?\s*(ingat(?:in)?|catat|simpan)\b",
    r"\b(ingat(?:in)?|catat|simpan)\s+(bahwa|ini|ya|dong)\b",
    r"\bingat\s+ya\b",
    r"^\s*(please\s+)?(remember|save|note)\b",
    r"\bremember\s+that\b",
    r"\bsave\s+this\b",
    r"\bnote\s+this\b",
];

/// Leading filler stripped from the front of a remember request before the
/// fact payload is extracted.
pub const REMEMBER_LEADING_FILLER_PATTERNS: &[&str] = &[
    r"^\s*(tolong|please)\s+",
    r"^\s*(ingat(?:in)?|catat|simpan)\s*(bahwa|ini|ya|dong|:)?\s*",
    r"^\s*(remember|save|note)\s*(that|this|:)?\s*",
];

/// Substrings that mean the model claimed a fact was saved to the profile.
pub const PROFILE_CLAIM_MARKERS: &[&str] = &[
    "saved to profile",
    "saved in profile",
    "simpan di profile",
    "tersimpan di profile",
    "user profile",
    "profile.md",
];

/// Words dropped from the comma/space-separated list after `approve`.
pub const APPROVAL_SKIP_WORDS: &[&str] = &["tool", "tools", "and", "please", "pls"];

/// Substrings indicating the user asked for voice/image/sticker delivery
/// in plain prose, as opposed to an explicit `--voice`/`--image` workflow
/// pack flag.
pub const MEDIA_REQUEST_MARKERS: &[&str] = &[
    "voice message",
    "voice note",
    "send me a voice",
    "as a voice message",
    "send a sticker",
    "as a sticker",
    "sticker of",
    "send me an image",
    "as an image",
    "picture of",
    "image of",
    "pesan suara",
    "kirim suara",
    "kirim stiker",
    "kirim gambar",
];
