use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use sha1::{Digest, Sha1};

use haven_core::atomic::{atomic_write, read_optional};

use crate::error::MemoryError;
use crate::types::{
    FactRecord, FactStatus, MemoryScope, RecallExplanation, RecallItem, RememberOutcome, RememberStatus,
};

const MAX_CACHE_FILES: usize = 8;
const MAX_CHARS_PER_CUSTOM_FILE: usize = 2800;

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "and", "for", "with", "that", "this", "from", "have", "your", "you", "are", "was",
        "were", "will", "can", "not", "just", "buat", "yang", "dan", "dari", "atau", "itu", "ini",
        "aja", "saya", "aku", "gua", "kamu", "nya",
    ]
    .into_iter()
    .collect()
});

fn source_weight(source_type: &str) -> i64 {
    match source_type {
        "profile" => 240,
        "relationships" => 210,
        "projects" => 190,
        "long-term" => 170,
        "lessons" => 150,
        "custom" => 145,
        "summary" => 130,
        "daily" => 110,
        _ => 100,
    }
}

fn default_confidence_for_source_type(source_type: &str) -> f64 {
    match source_type {
        "profile" => 0.95,
        "relationships" => 0.9,
        "projects" => 0.85,
        "long-term" => 0.8,
        "lessons" => 0.78,
        "custom" => 0.74,
        "summary" => 0.7,
        "daily" => 0.64,
        _ => 0.72,
    }
}

fn default_confidence_for_category(category: &str) -> f64 {
    match category {
        "identity" | "profile" => 0.95,
        "preference" | "preferences" => 0.9,
        "relationship" | "relationships" => 0.88,
        "project" | "projects" => 0.82,
        "lesson" | "lessons" => 0.78,
        _ => 0.75,
    }
}

fn clamp_confidence(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

fn normalize_for_dedup(text: &str) -> String {
    static WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
    WS.replace_all(text.trim(), " ").to_lowercase()
}

fn tokenize(text: &str) -> HashSet<String> {
    static TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-zA-Z0-9]{3,}").unwrap());
    let normalized = text.to_lowercase().replace('_', " ");
    TOKEN
        .find_iter(&normalized)
        .map(|m| m.as_str().to_string())
        .filter(|t| !STOPWORDS.contains(t.as_str()))
        .collect()
}

fn build_fact_id(text: &str, fact_type: &str, created_at: &str) -> String {
    let seed = format!("{fact_type}|{}|{created_at}", normalize_for_dedup(text));
    let digest = Sha1::digest(seed.as_bytes());
    let hex = hex::encode(digest);
    format!("fact_{}", &hex[..16])
}

fn extract_fact_key(text: &str) -> String {
    static HEAD_TOKENS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z0-9]{2,}").unwrap());
    static DIRECT_KEY: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"^(?:my|i|i'm|i am|saya|aku|gua)\s+(name|timezone|language|email|phone|location|goal|focus)\s+(?:is|are|adalah)\b",
        )
        .unwrap()
    });

    let raw = text.trim().to_lowercase();
    if raw.is_empty() {
        return String::new();
    }
    for sep in [':', '='] {
        if let Some(idx) = raw.find(sep) {
            let head = raw[..idx].trim();
            let tokens: Vec<&str> = HEAD_TOKENS.find_iter(head).map(|m| m.as_str()).collect();
            if (1..=7).contains(&tokens.len()) {
                return tokens.join(" ");
            }
        }
    }
    if let Some(caps) = DIRECT_KEY.captures(&raw) {
        return caps[1].to_string();
    }
    String::new()
}

fn now_iso() -> String {
    Utc::now()
        .with_nanosecond(0)
        .unwrap_or_else(Utc::now)
        .to_rfc3339()
}

use chrono::Timelike;

fn age_days(iso_value: Option<&str>) -> i64 {
    let Some(raw) = iso_value else { return 30 };
    match DateTime::parse_from_rfc3339(raw) {
        Ok(parsed) => {
            let delta = Utc::now().signed_duration_since(parsed.with_timezone(&Utc));
            delta.num_seconds().max(0) / 86400
        }
        Err(_) => 30,
    }
}

/// Flat-file memory store rooted at `<workspace>/memory/`. Every write goes
/// through `haven_core::atomic::atomic_write`, so a crash mid-write never
/// corrupts a memory file.
pub struct MemoryStore {
    memory_dir: PathBuf,
}

impl MemoryStore {
    pub fn open(workspace: &Path) -> Result<Self, MemoryError> {
        let memory_dir = workspace.join("memory");
        let store = Self { memory_dir };
        store.ensure_scaffold()?;
        Ok(store)
    }

    fn path(&self, name: &str) -> PathBuf {
        self.memory_dir.join(name)
    }

    fn safe_read(&self, name: &str) -> String {
        read_optional(&self.path(name)).ok().flatten().unwrap_or_default()
    }

    fn safe_write(&self, name: &str, content: &str) -> Result<(), MemoryError> {
        atomic_write(&self.path(name), content)?;
        Ok(())
    }

    fn ensure_scaffold(&self) -> Result<(), MemoryError> {
        std::fs::create_dir_all(&self.memory_dir)?;
        let templates: &[(&str, &str)] = &[
            (
                "MEMORY.md",
                "# Long-term Memory\n\nDurable facts to keep across sessions.\n",
            ),
            (
                "PROFILE.md",
                "# Profile\n\n## Identity\n- name: \n- timezone: \n- language: \n\n## Preferences\n- communication_style: \n- notification_style: \n",
            ),
            (
                "RELATIONSHIPS.md",
                "# Relationships\n\n- [name] role, context, preference\n",
            ),
            (
                "PROJECTS.md",
                "# Projects\n\n## Active\n- [project] status: ; next: \n\n## Backlog\n",
            ),
            (
                "FACTS.md",
                "# Fact Index (Machine-readable)\n\nJSON lines with fields: id, type, confidence, source, last_seen, supersedes.\n",
            ),
        ];
        for (name, content) in templates {
            if self.path(name).exists() {
                continue;
            }
            self.safe_write(name, content)?;
        }
        Ok(())
    }

    pub fn today_file_name() -> String {
        format!("{}.md", Utc::now().format("%Y-%m-%d"))
    }

    pub fn read_today(&self) -> String {
        self.safe_read(&Self::today_file_name())
    }

    /// Append a line to today's daily note, creating the file (with a
    /// date header) if this is the first write of the day.
    pub fn append_today(&self, content: &str) -> Result<(), MemoryError> {
        let file = Self::today_file_name();
        let existing = self.safe_read(&file);
        let updated = if existing.is_empty() {
            format!("# {}\n\n{}", Utc::now().format("%Y-%m-%d"), content)
        } else {
            format!("{existing}\n{content}")
        };
        self.safe_write(&file, &updated)
    }

    pub fn read_long_term(&self) -> String {
        self.safe_read("MEMORY.md")
    }

    pub fn read_profile(&self) -> String {
        self.safe_read("PROFILE.md")
    }

    pub fn read_relationships(&self) -> String {
        self.safe_read("RELATIONSHIPS.md")
    }

    pub fn read_projects(&self) -> String {
        self.safe_read("PROJECTS.md")
    }

    pub fn read_summaries(&self) -> String {
        self.safe_read("SUMMARIES.md")
    }

    pub fn read_lessons(&self) -> String {
        self.safe_read("LESSONS.md")
    }

    /// Upsert a `key: value` field under `## {section}` in PROFILE.md,
    /// creating the section if absent and replacing a matching field line
    /// (case-insensitive key match) if present.
    pub fn upsert_profile_field(&self, section: &str, key: &str, value: &str) -> Result<bool, MemoryError> {
        let section_name = title_case(section.trim());
        let field = key.trim();
        if field.is_empty() {
            return Ok(false);
        }
        let val = value.trim();

        let content = {
            let c = self.read_profile();
            if c.is_empty() {
                "# Profile\n\n".to_string()
            } else {
                c
            }
        };

        let mut lines: Vec<String> = content.lines().map(|s| s.to_string()).collect();
        let section_header = format!("## {section_name}");

        let field_re = Regex::new(&format!(r"(?i)^\s*-\s*{}\s*:\s*", regex::escape(field))).unwrap();

        if let Some(start) = lines.iter().position(|l| l == &section_header) {
            let mut end = lines.len();
            for idx in (start + 1)..lines.len() {
                if lines[idx].starts_with("## ") {
                    end = idx;
                    break;
                }
            }
            for idx in (start + 1)..end {
                if field_re.is_match(&lines[idx]) {
                    lines[idx] = format!("- {field}: {val}");
                    let out = lines.join("\n").trim_end().to_string() + "\n";
                    self.safe_write("PROFILE.md", &out)?;
                    return Ok(true);
                }
            }
            lines.insert(end, format!("- {field}: {val}"));
        } else {
            if lines.last().is_some_and(|l| !l.trim().is_empty()) {
                lines.push(String::new());
            }
            lines.push(section_header);
            lines.push(format!("- {field}: {val}"));
        }

        let out = lines.join("\n").trim_end().to_string() + "\n";
        self.safe_write("PROFILE.md", &out)?;
        Ok(true)
    }

    fn load_fact_index(&self) -> Vec<FactRecord> {
        let raw = self.safe_read("FACTS.md");
        let mut records = Vec::new();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Ok(record) = serde_json::from_str::<FactRecord>(line) {
                records.push(record);
            }
        }
        if !records.is_empty() {
            return records;
        }
        self.bootstrap_fact_index_from_long_term()
    }

    fn bootstrap_fact_index_from_long_term(&self) -> Vec<FactRecord> {
        static ENTRY_RE: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"^\[([^\]]+)\]\s*(?:\(([^)]*)\))?\s*(.+)$").unwrap());
        let baseline = now_iso();
        let mut records: Vec<FactRecord> = Vec::new();
        let mut by_normalized: HashMap<String, usize> = HashMap::new();
        let mut active_by_key: HashMap<String, usize> = HashMap::new();

        for raw in self.read_long_term().lines() {
            let mut line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(rest) = line.strip_prefix("- ") {
                line = rest.trim();
            }
            if line.is_empty() {
                continue;
            }

            let (timestamp_label, meta_blob, text) = match ENTRY_RE.captures(line) {
                Some(caps) => (
                    caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default(),
                    caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default(),
                    caps.get(3).map(|m| m.as_str().to_string()).unwrap_or_default(),
                ),
                None => (String::new(), String::new(), line.to_string()),
            };
            if text.is_empty() || text.starts_with('#') {
                continue;
            }

            let mut fact_type = "general".to_string();
            let mut source = "legacy_import".to_string();
            let mut confidence = default_confidence_for_category(&fact_type);
            if !meta_blob.is_empty() {
                if meta_blob.contains('=') {
                    let mut meta: HashMap<String, String> = HashMap::new();
                    for pair in meta_blob.split([';', ',']) {
                        if let Some((k, v)) = pair.split_once('=') {
                            meta.insert(k.trim().to_lowercase(), v.trim().to_string());
                        }
                    }
                    fact_type = meta
                        .get("type")
                        .or_else(|| meta.get("category"))
                        .cloned()
                        .unwrap_or(fact_type)
                        .to_lowercase();
                    if let Some(src) = meta.get("source") {
                        source = src.clone();
                    }
                    confidence = meta
                        .get("confidence")
                        .and_then(|v| v.parse::<f64>().ok())
                        .map(clamp_confidence)
                        .unwrap_or_else(|| default_confidence_for_category(&fact_type));
                } else {
                    fact_type = meta_blob.to_lowercase();
                    confidence = default_confidence_for_category(&fact_type);
                }
            }

            let created_at = DateTime::parse_from_rfc3339(&timestamp_label)
                .map(|d| d.with_timezone(&Utc).to_rfc3339())
                .unwrap_or_else(|_| baseline.clone());
            let normalized = normalize_for_dedup(&text);
            if normalized.is_empty() {
                continue;
            }

            if let Some(&idx) = by_normalized.get(&normalized) {
                records[idx].last_seen = created_at;
                continue;
            }

            let fact_key = extract_fact_key(&text);
            let id = build_fact_id(&text, &fact_type, &created_at);
            let mut supersedes = Vec::new();
            if !fact_key.is_empty() {
                if let Some(&prev_idx) = active_by_key.get(&fact_key) {
                    records[prev_idx].status = FactStatus::Superseded;
                    records[prev_idx].superseded_by = Some(id.clone());
                    records[prev_idx].last_seen = created_at.clone();
                    supersedes.push(records[prev_idx].id.clone());
                }
            }

            let record = FactRecord {
                id,
                text,
                normalized: normalized.clone(),
                fact_type,
                confidence,
                source,
                created_at: created_at.clone(),
                last_seen: created_at,
                fact_key: fact_key.clone(),
                supersedes,
                status: FactStatus::Active,
                superseded_by: None,
            };
            records.push(record);
            let new_idx = records.len() - 1;
            by_normalized.insert(normalized, new_idx);
            if !fact_key.is_empty() {
                active_by_key.insert(fact_key, new_idx);
            }
        }
        records
    }

    fn write_fact_index(&self, records: &[FactRecord]) -> Result<(), MemoryError> {
        let mut lines = vec![
            "# Fact Index (Machine-readable)\n".to_string(),
            "JSON lines with fields: id, type, confidence, source, last_seen, supersedes.\n"
                .to_string(),
        ];
        for record in records {
            lines.push(serde_json::to_string(record)?);
        }
        let payload = lines.join("\n").trim_end().to_string() + "\n";
        self.safe_write("FACTS.md", &payload)
    }

    /// Persist a durable fact with supersede/dedup rules, mirroring the
    /// reference implementation's schema exactly.
    pub fn remember_fact(
        &self,
        fact: &str,
        category: &str,
        source: &str,
        confidence: Option<f64>,
    ) -> Result<RememberOutcome, MemoryError> {
        let text = fact.trim();
        if text.is_empty() {
            return Ok(RememberOutcome {
                ok: false,
                status: RememberStatus::Empty,
                fact_id: None,
                superseded_ids: vec![],
            });
        }
        let fact_type = if category.trim().is_empty() {
            "general".to_string()
        } else {
            category.trim().to_lowercase()
        };
        let source_label = if source.trim().is_empty() {
            "remember_tool".to_string()
        } else {
            source.trim().to_string()
        };

        let mut records = self.load_fact_index();
        let now = now_iso();
        let normalized = normalize_for_dedup(text);
        let fact_key = extract_fact_key(text);
        let confidence_value =
            clamp_confidence(confidence.unwrap_or_else(|| default_confidence_for_category(&fact_type)));

        if let Some(existing) = records
            .iter_mut()
            .find(|r| r.status == FactStatus::Active && r.normalized == normalized)
        {
            existing.last_seen = now.clone();
            existing.confidence = clamp_confidence(existing.confidence).max(confidence_value);
            if existing.source.is_empty() {
                existing.source = source_label;
            }
            let fact_id = existing.id.clone();
            self.write_fact_index(&records)?;
            return Ok(RememberOutcome {
                ok: true,
                status: RememberStatus::Duplicate,
                fact_id: Some(fact_id),
                superseded_ids: vec![],
            });
        }

        let fact_id = build_fact_id(text, &fact_type, &now);
        let mut superseded_ids = Vec::new();
        if !fact_key.is_empty() {
            for item in records
                .iter_mut()
                .filter(|r| r.status == FactStatus::Active && r.fact_key == fact_key && r.normalized != normalized)
            {
                item.status = FactStatus::Superseded;
                item.superseded_by = Some(fact_id.clone());
                item.last_seen = now.clone();
                superseded_ids.push(item.id.clone());
            }
        }

        records.push(FactRecord {
            id: fact_id.clone(),
            text: text.to_string(),
            normalized,
            fact_type: fact_type.clone(),
            confidence: confidence_value,
            source: source_label.clone(),
            created_at: now.clone(),
            last_seen: now.clone(),
            fact_key,
            supersedes: superseded_ids.clone(),
            status: FactStatus::Active,
            superseded_by: None,
        });
        self.write_fact_index(&records)?;

        let mut current = self.read_long_term();
        if current.is_empty() {
            current = "# Long-term Memory\n\nDurable facts to keep across sessions.\n".to_string();
        }
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M");
        let mut metadata = format!(
            "type={fact_type}; confidence={confidence_value:.2}; source={source_label}"
        );
        if !superseded_ids.is_empty() {
            metadata.push_str(&format!("; supersedes={}", superseded_ids.join(",")));
        }
        let entry = format!("- [{timestamp}] ({metadata}) {text}");
        let updated = current.trim_end().to_string() + "\n" + &entry + "\n";
        self.safe_write("MEMORY.md", &updated)?;

        let status = if superseded_ids.is_empty() {
            RememberStatus::Added
        } else {
            RememberStatus::Superseded
        };
        Ok(RememberOutcome {
            ok: true,
            status,
            fact_id: Some(fact_id),
            superseded_ids,
        })
    }

    pub fn append_lesson(&self, lesson: &str, source: &str, severity: &str) -> Result<bool, MemoryError> {
        let text = lesson.trim();
        if text.is_empty() {
            return Ok(false);
        }
        let mut existing = self.read_lessons();
        if existing.is_empty() {
            existing = "# Lessons Learned\n\nActionable feedback and mistakes to avoid repeating.\n\n"
                .to_string();
        }
        if normalize_for_dedup(&existing).contains(&normalize_for_dedup(text)) {
            return Ok(false);
        }
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M");
        let entry = format!("- [{timestamp}] ({severity}/{source}) {text}");
        self.safe_write("LESSONS.md", &(existing.trim_end().to_string() + "\n" + &entry + "\n"))?;
        Ok(true)
    }

    pub fn append_session_summary(&self, session_key: &str, summary: &str) -> Result<bool, MemoryError> {
        let text = summary.trim();
        if text.is_empty() {
            return Ok(false);
        }
        let mut existing = self.read_summaries();
        if existing.is_empty() {
            existing = "# Session Summaries\n\n".to_string();
        }
        if normalize_for_dedup(&existing).contains(&normalize_for_dedup(text)) {
            return Ok(false);
        }
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M");
        let entry = format!("## {timestamp} ({session_key})\n- {text}");
        self.safe_write(
            "SUMMARIES.md",
            &(existing.trim_end().to_string() + "\n" + &entry + "\n"),
        )?;
        Ok(true)
    }

    fn list_custom_memory_files(&self) -> Vec<PathBuf> {
        static DATE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}\.md$").unwrap());
        const CORE: &[&str] = &[
            "MEMORY.md",
            "LESSONS.md",
            "PROFILE.md",
            "RELATIONSHIPS.md",
            "PROJECTS.md",
            "SUMMARIES.md",
            "FACTS.md",
        ];
        let Ok(entries) = std::fs::read_dir(&self.memory_dir) else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("md"))
            .filter(|p| {
                let name = p.file_name().and_then(|n| n.to_str()).unwrap_or("");
                !CORE.contains(&name) && !DATE_NAME.is_match(name)
            })
            .collect();
        files.sort();
        files
    }

    fn read_custom_memory_sections(&self) -> String {
        let mut sections = Vec::new();
        for path in self.list_custom_memory_files().into_iter().take(MAX_CACHE_FILES) {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("").to_string();
            let mut content = read_optional(&path).ok().flatten().unwrap_or_default();
            content = content.trim().to_string();
            if content.is_empty() {
                continue;
            }
            if content.len() > MAX_CHARS_PER_CUSTOM_FILE {
                content = content[..MAX_CHARS_PER_CUSTOM_FILE].trim_end().to_string() + "\n...";
            }
            sections.push(format!("### {name}\n{content}"));
        }
        sections.join("\n\n")
    }

    fn iter_memory_candidates(&self, lookback_days: i64, scopes: &HashSet<MemoryScope>) -> Vec<Candidate> {
        let mut out = Vec::new();
        let has = |s: MemoryScope| scopes.is_empty() || scopes.contains(&s);

        let mut add = |source: &str, text: &str, age: i64, kind: &str, confidence: Option<f64>| {
            static LABEL_ONLY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_ \-]+:\s*$").unwrap());
            let clean = text.trim().trim_start_matches(['-', '*', ' ']).trim();
            if clean.is_empty() || clean.starts_with('#') || LABEL_ONLY.is_match(clean) {
                return;
            }
            out.push(Candidate {
                source: source.to_string(),
                text: clean.to_string(),
                age_days: age.max(0),
                kind: kind.to_string(),
                confidence: clamp_confidence(confidence.unwrap_or_else(|| default_confidence_for_source_type(kind))),
                fact_id: None,
            });
        };

        if has(MemoryScope::Profile) {
            for line in self.read_profile().lines() {
                add("profile", line, 0, "profile", None);
            }
        }
        if has(MemoryScope::Relationships) {
            for line in self.read_relationships().lines() {
                add("relationships", line, 0, "relationships", None);
            }
        }
        if has(MemoryScope::Projects) {
            for line in self.read_projects().lines() {
                add("projects", line, 0, "projects", None);
            }
        }
        if has(MemoryScope::LongTerm) {
            for item in self.load_fact_index() {
                if item.status != FactStatus::Active || item.text.trim().is_empty() {
                    continue;
                }
                if item.text.trim().is_empty() {
                    continue;
                }
                let age = age_days(Some(&item.last_seen));
                out.push(Candidate {
                    source: "long-term".to_string(),
                    text: item.text.clone(),
                    age_days: age,
                    kind: "long-term".to_string(),
                    confidence: clamp_confidence(item.confidence),
                    fact_id: Some(item.id.clone()),
                });
            }
        }
        if has(MemoryScope::Lessons) {
            for line in self.read_lessons().lines() {
                add("lessons", line, 0, "lessons", None);
            }
        }
        if has(MemoryScope::Summary) {
            for line in self.read_summaries().lines() {
                add("summary", line, 0, "summary", None);
            }
        }
        if has(MemoryScope::Custom) {
            for path in self.list_custom_memory_files() {
                let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("custom").to_string();
                let content = read_optional(&path).ok().flatten().unwrap_or_default();
                for line in content.lines() {
                    add(&name, line, 0, "custom", None);
                }
            }
        }
        if has(MemoryScope::Daily) {
            for i in 0..lookback_days {
                let date = Utc::now() - chrono::Duration::days(i);
                let name = date.format("%Y-%m-%d").to_string();
                let content = self.safe_read(&format!("{name}.md"));
                if content.is_empty() {
                    continue;
                }
                for line in content.lines() {
                    add(&name, line, i, "daily", None);
                }
            }
        }
        out
    }

    /// Ranked recall against a lexical query, scored by term overlap,
    /// confidence, recency and a per-scope source bonus — matching the
    /// reference implementation's heuristic (not embeddings-based). With
    /// `explain=true`, each item carries its score breakdown (`why`).
    pub fn recall(
        &self,
        query: &str,
        max_items: usize,
        lookback_days: i64,
        scopes: &HashSet<MemoryScope>,
        explain: bool,
    ) -> Vec<RecallItem> {
        let query_terms = tokenize(query);
        if query_terms.is_empty() {
            return Vec::new();
        }

        let mut scored = Vec::new();
        let mut seen = HashSet::new();

        for candidate in self.iter_memory_candidates(lookback_days, scopes) {
            let normalized = normalize_for_dedup(&candidate.text);
            if normalized.is_empty() || seen.contains(&normalized) {
                continue;
            }
            let text_terms = tokenize(&candidate.text);
            let mut overlap_terms: Vec<String> = query_terms.intersection(&text_terms).cloned().collect();
            overlap_terms.sort();
            let overlap = overlap_terms.len();
            if overlap == 0 {
                continue;
            }
            seen.insert(normalized);

            let source_bonus = source_weight(&candidate.kind) as f64;
            let lexical_ratio = overlap as f64 / query_terms.len().max(1) as f64;
            let union = query_terms.union(&text_terms).count().max(1);
            let semantic_similarity = overlap as f64 / union as f64;
            let recency_bonus = (40.0 - candidate.age_days as f64 * 1.5).max(0.0);

            let score = (overlap as f64 * 90.0
                + lexical_ratio * 70.0
                + semantic_similarity * 80.0
                + candidate.confidence * 70.0
                + recency_bonus
                + source_bonus * 0.2) as i64;

            let why = explain.then(|| RecallExplanation {
                overlap_terms,
                overlap_count: overlap,
                lexical_ratio,
                semantic_similarity,
                confidence: candidate.confidence,
                age_days: candidate.age_days,
                source_bonus,
                recency_bonus,
            });

            scored.push(RecallItem {
                source: candidate.source,
                kind: candidate.kind,
                score,
                text: candidate.text,
                confidence: candidate.confidence,
                age_days: candidate.age_days,
                fact_id: candidate.fact_id,
                why,
            });
        }

        scored.sort_by(|a, b| b.score.cmp(&a.score));
        scored.truncate(max_items);
        scored
    }

    /// Full memory context (all sections, untruncated) — used when
    /// assembling the volatile prompt tier for a fresh session.
    pub fn full_context(&self) -> String {
        let mut parts = Vec::new();
        push_section(&mut parts, "Profile", self.read_profile());
        push_section(&mut parts, "Relationships", self.read_relationships());
        push_section(&mut parts, "Projects", self.read_projects());
        push_section(&mut parts, "Long-term Memory", self.read_long_term());
        push_section(&mut parts, "Lessons Learned", self.read_lessons());
        push_section(&mut parts, "Additional Memory Files", self.read_custom_memory_sections());
        push_section(&mut parts, "Today's Notes", self.read_today());
        parts.join("\n\n")
    }

    /// Query-scoped memory context — recalled snippets plus recent
    /// activity/lessons/summaries, used on subsequent turns in a session.
    pub fn relevant_context(&self, query: Option<&str>) -> String {
        let mut parts = Vec::new();
        if let Some(q) = query {
            let items = self.recall(q, 12, 30, &HashSet::new(), false);
            if !items.is_empty() {
                let lines: Vec<String> = items.iter().map(|i| format!("- [{}] {}", i.source, i.text)).collect();
                push_section(&mut parts, "Relevant Memories", lines.join("\n"));
            }
        }
        push_section(&mut parts, "Recent Activity", recent_lines(&self.read_today(), 10));
        push_section(&mut parts, "Recent Lessons", recent_dash_lines(&self.read_lessons(), 8));
        push_section(&mut parts, "Recent Session Summaries", recent_dash_lines(&self.read_summaries(), 6));
        parts.join("\n\n")
    }
}

struct Candidate {
    source: String,
    text: String,
    age_days: i64,
    kind: String,
    confidence: f64,
    fact_id: Option<String>,
}

fn push_section(parts: &mut Vec<String>, title: &str, body: String) {
    if !body.trim().is_empty() {
        parts.push(format!("## {title}\n{body}"));
    }
}

fn recent_lines(text: &str, limit: usize) -> String {
    let entries: Vec<&str> = text
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .collect();
    if entries.is_empty() {
        return String::new();
    }
    let start = entries.len().saturating_sub(limit);
    entries[start..].join("\n")
}

fn recent_dash_lines(text: &str, limit: usize) -> String {
    let entries: Vec<&str> = text.lines().map(|l| l.trim()).filter(|l| l.starts_with("- ")).collect();
    if entries.is_empty() {
        return String::new();
    }
    let start = entries.len().saturating_sub(limit);
    entries[start..].join("\n")
}

fn title_case(s: &str) -> String {
    if s.is_empty() {
        return "Preferences".to_string();
    }
    let mut out = String::new();
    let mut capitalize_next = true;
    for c in s.chars() {
        if c.is_whitespace() {
            capitalize_next = true;
            out.push(c);
        } else if capitalize_next {
            out.extend(c.to_uppercase());
            capitalize_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, MemoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn scaffold_creates_core_files() {
        let (dir, _store) = store();
        for name in ["MEMORY.md", "PROFILE.md", "RELATIONSHIPS.md", "PROJECTS.md", "FACTS.md"] {
            assert!(dir.path().join("memory").join(name).exists());
        }
    }

    #[test]
    fn remember_fact_then_duplicate_is_detected() {
        let (_dir, store) = store();
        let first = store.remember_fact("the user prefers dark mode", "preference", "remember_tool", None).unwrap();
        assert_eq!(first.status, RememberStatus::Added);
        let second = store.remember_fact("the user prefers dark mode", "preference", "remember_tool", None).unwrap();
        assert_eq!(second.status, RememberStatus::Duplicate);
        assert_eq!(second.fact_id, first.fact_id);
    }

    #[test]
    fn remember_fact_supersedes_same_key() {
        let (_dir, store) = store();
        store.remember_fact("my name is Alex", "identity", "remember_tool", None).unwrap();
        let second = store.remember_fact("my name is Sam", "identity", "remember_tool", None).unwrap();
        assert_eq!(second.status, RememberStatus::Superseded);
        assert_eq!(second.superseded_ids.len(), 1);
    }

    #[test]
    fn upsert_profile_field_creates_section_and_field() {
        let (_dir, store) = store();
        store.upsert_profile_field("Preferences", "timezone", "Asia/Jakarta").unwrap();
        let profile = store.read_profile();
        assert!(profile.contains("- timezone: Asia/Jakarta"));
        store.upsert_profile_field("Preferences", "timezone", "UTC").unwrap();
        let updated = store.read_profile();
        assert!(updated.contains("- timezone: UTC"));
        assert!(!updated.contains("Asia/Jakarta"));
    }

    #[test]
    fn recall_ranks_by_term_overlap() {
        let (_dir, store) = store();
        store.remember_fact("the user's favorite language is Rust", "fact", "remember_tool", None).unwrap();
        store.remember_fact("the user enjoys hiking on weekends", "fact", "remember_tool", None).unwrap();
        let results = store.recall("what programming language does the user like", 5, 30, &HashSet::new(), false);
        assert!(!results.is_empty());
        assert!(results[0].text.contains("Rust"));
    }

    #[test]
    fn append_lesson_dedups_existing_text() {
        let (_dir, store) = store();
        assert!(store.append_lesson("always confirm before deleting files", "user", "high").unwrap());
        assert!(!store.append_lesson("always confirm before deleting files", "user", "high").unwrap());
    }
}
