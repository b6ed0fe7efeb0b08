use serde::{Deserialize, Serialize};

/// One entry in the machine-readable fact index (`memory/FACTS.md`, JSON
/// Lines). Mirrors the schema the reference memory store writes, including
/// supersession bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactRecord {
    pub id: String,
    pub text: String,
    pub normalized: String,
    #[serde(rename = "type")]
    pub fact_type: String,
    pub confidence: f64,
    pub source: String,
    pub created_at: String,
    pub last_seen: String,
    pub fact_key: String,
    #[serde(default)]
    pub supersedes: Vec<String>,
    pub status: FactStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactStatus {
    Active,
    Superseded,
}

/// Outcome of a `remember_fact` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RememberOutcome {
    pub ok: bool,
    pub status: RememberStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fact_id: Option<String>,
    #[serde(default)]
    pub superseded_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RememberStatus {
    Added,
    Duplicate,
    Superseded,
    Empty,
    WriteError,
}

/// A ranked memory snippet returned from `recall`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecallItem {
    pub source: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub score: i64,
    pub text: String,
    pub confidence: f64,
    pub age_days: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fact_id: Option<String>,
    /// Score breakdown, present only when `recall` was called with
    /// `explain=true`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub why: Option<RecallExplanation>,
}

/// The components `recall`'s score is built from, for one item. Mirrors the
/// reference implementation's `why` dict field-for-field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecallExplanation {
    pub overlap_terms: Vec<String>,
    pub overlap_count: usize,
    pub lexical_ratio: f64,
    pub semantic_similarity: f64,
    pub confidence: f64,
    pub age_days: i64,
    pub source_bonus: f64,
    pub recency_bonus: f64,
}

/// Which memory scopes `recall` searches. Defaults to all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryScope {
    Profile,
    Relationships,
    Projects,
    LongTerm,
    Lessons,
    Custom,
    Summary,
    Daily,
}

impl MemoryScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Profile => "profile",
            Self::Relationships => "relationships",
            Self::Projects => "projects",
            Self::LongTerm => "long-term",
            Self::Lessons => "lessons",
            Self::Custom => "custom",
            Self::Summary => "summary",
            Self::Daily => "daily",
        }
    }

    pub fn all() -> Vec<MemoryScope> {
        vec![
            Self::Profile,
            Self::Relationships,
            Self::Projects,
            Self::LongTerm,
            Self::Lessons,
            Self::Custom,
            Self::Summary,
            Self::Daily,
        ]
    }
}
