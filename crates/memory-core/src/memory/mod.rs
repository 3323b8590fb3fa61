//! The memory entity model — tier/scope axes, access events, and behavioural
//! patterns (data model, §3).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Residency tier. `Core` is small and always-resident; `Longterm` is
/// unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Core,
    Longterm,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Core => "core",
            Tier::Longterm => "longterm",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "core" => Some(Tier::Core),
            "longterm" => Some(Tier::Longterm),
            _ => None,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Partitioning axis: cross-project (`global`) vs. project-bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Global,
    Project,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Global => "global",
            Scope::Project => "project",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "global" => Some(Scope::Global),
            "project" => Some(Scope::Project),
            _ => None,
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Maximum content size for a `core`-tier memory (I2).
pub const CORE_MAX_CONTENT_BYTES: usize = 2048;

/// Aggregate core-tier size warning threshold for a (scope, project_id)
/// partition (I3) — non-fatal.
pub const CORE_PARTITION_WARN_BYTES: i64 = 20_480;

/// The primary entity: a single stored memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    pub id: String,
    pub content: String,
    pub tier: Tier,
    pub scope: Scope,
    pub project_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub content_size: i64,
    pub created_at: DateTime<Utc>,
    pub accessed_at: DateTime<Utc>,
    pub access_count: i64,
}

/// How a search hit matched the query (§4.1.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Exact,
    Semantic,
    Fuzzy,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Exact => "exact",
            MatchType::Semantic => "semantic",
            MatchType::Fuzzy => "fuzzy",
        }
    }
}

/// A scored search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    #[serde(flatten)]
    pub memory: Memory,
    pub score: f64,
    pub match_type: MatchType,
}

/// Input accepted by `store` — deliberately rejects unknown fields so a
/// malformed or malicious caller fails fast rather than silently dropping
/// data (mirrors the teacher's ingest-input convention).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StoreInput {
    pub content: String,
    pub tier: Tier,
    pub scope: Scope,
    pub project_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Filters accepted by `search` (§4.1).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilter {
    pub tier: Option<Tier>,
    pub scope: Option<Scope>,
    pub project_id: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

/// An append-only access-log event (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessType {
    Read,
    SearchMatch,
    ContextLoad,
    Update,
}

impl AccessType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessType::Read => "read",
            AccessType::SearchMatch => "search_match",
            AccessType::ContextLoad => "context_load",
            AccessType::Update => "update",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "read" => Some(AccessType::Read),
            "search_match" => Some(AccessType::SearchMatch),
            "context_load" => Some(AccessType::ContextLoad),
            "update" => Some(AccessType::Update),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessEvent {
    pub memory_id: String,
    pub access_type: AccessType,
    pub timestamp: DateTime<Utc>,
    pub context_type: Option<String>,
    #[serde(default)]
    pub query_terms: Vec<String>,
    pub relevance_score: Option<f64>,
    pub session_id: Option<String>,
    pub performance_ms: Option<f64>,
}

/// Derived behavioural pattern for a memory (§4.4), updated opportunistically
/// once a memory has accumulated at least 5 access-log entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehavioralPattern {
    pub memory_id: String,
    pub access_frequency_score: f64,
    pub access_regularity_score: f64,
    pub predicted_next_access: Option<DateTime<Utc>>,
    pub tier_optimization_score: f64,
    pub archival_probability: f64,
    pub last_analysis_timestamp: DateTime<Utc>,
    pub analysis_confidence: f64,
}

/// A logical session grouping access events (§6 supplement).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub start_timestamp: DateTime<Utc>,
    pub session_type: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Pure aggregate counters (§4.1).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub total_memories: i64,
    pub core_count: i64,
    pub longterm_count: i64,
    pub global_count: i64,
    pub project_count: i64,
    pub total_content_bytes: i64,
    pub average_content_bytes: f64,
}

/// Richer aggregate analytics (§4.1).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    pub tier_distribution: HashMap<String, i64>,
    pub scope_distribution: HashMap<String, i64>,
    pub most_accessed: Vec<Memory>,
    pub least_accessed: Vec<Memory>,
    pub recently_accessed: Vec<Memory>,
    pub total_size_bytes: i64,
    pub average_size_bytes: f64,
    pub created_today: i64,
    pub created_this_week: i64,
    pub top_tags: Vec<(String, i64)>,
    pub active_projects: Vec<String>,
    /// Reported ratio of aggregate core-tier bytes to the 20 KiB heuristic
    /// cap (design notes §9) — never enforced as a hard error, only
    /// surfaced for visibility.
    pub core_tier_utilization: HashMap<String, f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_roundtrips_through_str() {
        assert_eq!(Tier::parse(Tier::Core.as_str()), Some(Tier::Core));
        assert_eq!(Tier::parse(Tier::Longterm.as_str()), Some(Tier::Longterm));
        assert_eq!(Tier::parse("bogus"), None);
    }

    #[test]
    fn scope_roundtrips_through_str() {
        assert_eq!(Scope::parse(Scope::Global.as_str()), Some(Scope::Global));
        assert_eq!(Scope::parse(Scope::Project.as_str()), Some(Scope::Project));
    }

    #[test]
    fn store_input_rejects_unknown_fields() {
        let json = r#"{"content":"x","tier":"core","scope":"global","projectId":null,"tags":[],"metadata":{}}"#;
        let parsed: Result<StoreInput, _> = serde_json::from_str(json);
        assert!(parsed.is_ok());

        let with_unknown = r#"{"content":"x","tier":"core","scope":"global","projectId":null,"evil":true}"#;
        let parsed: Result<StoreInput, _> = serde_json::from_str(with_unknown);
        assert!(parsed.is_err());
    }
}
