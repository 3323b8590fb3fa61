//! The unified memory Store — CRUD, tier/scope invariants, duplicate
//! detection, migration, and aggregate analytics (§4.1).

pub mod schema;

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::config::Config;
use crate::error::{MemoryError, Result};
use crate::id;
use crate::memory::{
    AccessEvent, AccessType, Analytics, MatchType, Memory, MemoryStats, Scope, SearchFilter,
    SearchHit, Session, StoreInput, Tier, CORE_MAX_CONTENT_BYTES, CORE_PARTITION_WARN_BYTES,
};

/// Result of `store`: the new id plus any non-fatal I3 warnings.
#[derive(Debug, Clone)]
pub struct StoreResult {
    pub id: String,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DeleteResult {
    pub deleted: bool,
    pub related_deleted: Vec<String>,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct DuplicateCheck {
    pub is_duplicate: bool,
    pub duplicates: Vec<Memory>,
    pub recommendation: String,
}

#[derive(Debug, Clone)]
pub struct MigrateResult {
    pub migrated: bool,
    pub from_tier: Tier,
    pub to_tier: Tier,
    pub message: String,
}

/// The unified memory store.
///
/// Holds separate reader/writer connections over the same file (design
/// notes §9: readers share a pooled read interface backed by WAL; writers
/// are serialized through an exclusive mutex). All methods take `&self`,
/// so the store is `Send + Sync` and callers wrap it in `Arc<Store>` rather
/// than `Arc<Mutex<Store>>`.
pub struct Store {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

impl Store {
    pub fn open(config: &Config) -> Result<Self> {
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let writer_conn = Connection::open(&config.db_path)?;
        Self::configure_connection(&writer_conn)?;
        schema::apply_migrations(&writer_conn)?;

        let reader_conn = Connection::open(&config.db_path)?;
        Self::configure_connection(&reader_conn)?;

        #[cfg(unix)]
        if config.db_path.exists() {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(&config.db_path, perms);
        }

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let writer_conn = Connection::open_in_memory()?;
        Self::configure_connection(&writer_conn)?;
        schema::apply_migrations(&writer_conn)?;
        // A single shared in-memory connection stands in for reader+writer
        // in tests; SQLite in-memory databases are per-connection, so we
        // cannot open a second handle onto the same database.
        let reader_conn = Connection::open_in_memory()?;
        Self::configure_connection(&reader_conn)?;
        schema::apply_migrations(&reader_conn)?;
        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
        })
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Direct access to the writer connection, for the BM25/Semantic engines
    /// that need to read the full corpus under the same lock discipline.
    pub(crate) fn with_reader<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .reader
            .lock()
            .map_err(|_| MemoryError::Validation("reader lock poisoned".into()))?;
        f(&conn)
    }

    fn with_writer<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .writer
            .lock()
            .map_err(|_| MemoryError::Validation("writer lock poisoned".into()))?;
        f(&conn)
    }

    // ------------------------------------------------------------------
    // store
    // ------------------------------------------------------------------

    pub fn store(&self, input: StoreInput) -> Result<StoreResult> {
        if input.content.is_empty() {
            return Err(MemoryError::Validation("content must not be empty".into()));
        }
        if input.scope == Scope::Project && input.project_id.is_none() {
            return Err(MemoryError::Validation(
                "project scope requires a project_id".into(),
            ));
        }
        let content_size = input.content.len() as i64;
        if input.tier == Tier::Core && content_size > CORE_MAX_CONTENT_BYTES as i64 {
            return Err(MemoryError::Validation(format!(
                "core tier content exceeds {}-byte limit",
                CORE_MAX_CONTENT_BYTES
            )));
        }

        let mut warnings = Vec::new();
        if input.tier == Tier::Core {
            let used = self.core_partition_bytes(input.scope, input.project_id.as_deref())?;
            if used + content_size > CORE_PARTITION_WARN_BYTES {
                warnings.push(format!(
                    "core tier usage for this partition would reach {} bytes, exceeding the {}-byte guideline",
                    used + content_size,
                    CORE_PARTITION_WARN_BYTES
                ));
            }
        }

        let id = id::generate(input.tier, input.scope);
        let now = Utc::now();
        let tags_json = serde_json::to_string(&input.tags)?;
        let metadata_json = serde_json::to_string(&input.metadata)?;

        self.with_writer(|conn| {
            conn.execute(
                "INSERT INTO unified_memories
                 (id, content, tier, scope, project_id, tags, metadata, content_size, created_at, accessed_at, access_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9, 0)",
                params![
                    id,
                    input.content,
                    input.tier.as_str(),
                    input.scope.as_str(),
                    input.project_id,
                    tags_json,
                    metadata_json,
                    content_size,
                    now.to_rfc3339(),
                ],
            )?;
            Ok(())
        })?;

        Ok(StoreResult { id, warnings })
    }

    fn core_partition_bytes(&self, scope: Scope, project_id: Option<&str>) -> Result<i64> {
        self.with_reader(|conn| {
            let sql = "SELECT COALESCE(SUM(content_size), 0) FROM unified_memories
                       WHERE tier = 'core' AND scope = ?1 AND (project_id IS ?2)";
            let total: i64 = conn.query_row(sql, params![scope.as_str(), project_id], |row| {
                row.get(0)
            })?;
            Ok(total)
        })
    }

    // ------------------------------------------------------------------
    // search
    // ------------------------------------------------------------------

    /// Baseline keyword search (§4.1.1, §4.1.2): substring/glob matching
    /// over content and tags. Used standalone and as the BM25 engine's
    /// fallback when its FTS query errors.
    pub fn search(&self, query: &str, filter: &SearchFilter) -> Result<Vec<SearchHit>> {
        let limit = match filter.limit {
            Some(n) if n < 0 => 10,
            Some(n) => n,
            None => 10,
        };
        if limit == 0 {
            return Ok(Vec::new());
        }

        let rows = self.with_reader(|conn| {
            let mut sql = String::from("SELECT * FROM unified_memories WHERE 1=1");
            let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
            if let Some(tier) = filter.tier {
                sql.push_str(" AND tier = ?");
                args.push(Box::new(tier.as_str().to_string()));
            }
            if let Some(scope) = filter.scope {
                sql.push_str(" AND scope = ?");
                args.push(Box::new(scope.as_str().to_string()));
            }
            if let Some(ref project_id) = filter.project_id {
                sql.push_str(" AND project_id = ?");
                args.push(Box::new(project_id.clone()));
            }
            let mut stmt = conn.prepare(&sql)?;
            let param_refs: Vec<&dyn rusqlite::ToSql> =
                args.iter().map(|b| b.as_ref()).collect();
            let memories = stmt
                .query_map(param_refs.as_slice(), row_to_memory)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(memories)
        })?;

        let query_lower = query.to_lowercase();
        let query_tokens: Vec<&str> = query_lower.split_whitespace().collect();
        let now = Utc::now();

        let mut hits: Vec<SearchHit> = rows
            .into_iter()
            .filter_map(|memory| {
                let content_lower = memory.content.to_lowercase();
                let tag_match = memory
                    .tags
                    .iter()
                    .any(|t| t.to_lowercase().contains(&query_lower));
                let content_match = content_lower.contains(&query_lower);
                if query.is_empty() {
                    return None;
                }
                let token_hit_ratio = if query_tokens.is_empty() {
                    0.0
                } else {
                    let hits = query_tokens
                        .iter()
                        .filter(|t| content_lower.contains(*t))
                        .count();
                    hits as f64 / query_tokens.len() as f64
                };
                if !content_match && !tag_match && token_hit_ratio == 0.0 {
                    return None;
                }

                let match_type = if content_match || tag_match {
                    MatchType::Exact
                } else if token_hit_ratio >= 0.6 {
                    MatchType::Semantic
                } else {
                    MatchType::Fuzzy
                };

                let days_since_access = (now - memory.accessed_at).num_seconds() as f64 / 86400.0;
                let score = 100.0 * (content_match as i32 as f64)
                    + 80.0 * (tag_match as i32 as f64)
                    + 50.0 * ((memory.tier == Tier::Core) as i32 as f64)
                    + (30.0 - days_since_access).max(0.0)
                    + (memory.access_count.min(20)) as f64;

                Some(SearchHit {
                    memory,
                    score,
                    match_type,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.memory.accessed_at.cmp(&a.memory.accessed_at))
        });
        hits.truncate(limit as usize);

        let ids: Vec<String> = hits.iter().map(|h| h.memory.id.clone()).collect();
        self.record_hits(&ids, query)?;
        // Reflect the access-count bump performed by record_hits so the
        // caller observes the post-update state without a second query.
        for hit in &mut hits {
            hit.memory.access_count += 1;
            hit.memory.accessed_at = now;
        }

        Ok(hits)
    }

    /// Cross-cutting policy (§4.5): every memory a search returns has its
    /// `access_count` incremented, `accessed_at` bumped, and an access
    /// event logged. A failure here is logged but never fails the read.
    /// `pub(crate)` so the BM25 engine's successful-match path can reuse it.
    pub(crate) fn record_hits(&self, ids: &[String], query: &str) -> Result<()> {
        let result = self.with_writer(|conn| {
            let now = Utc::now().to_rfc3339();
            for id in ids {
                conn.execute(
                    "UPDATE unified_memories SET access_count = access_count + 1, accessed_at = ?1 WHERE id = ?2",
                    params![now, id],
                )?;
                conn.execute(
                    "INSERT INTO memory_access_log (memory_id, access_type, access_timestamp, context_type, query_terms, relevance_score, session_id, user_metadata)
                     VALUES (?1, ?2, ?3, NULL, ?4, NULL, NULL, '{}')",
                    params![id, AccessType::SearchMatch.as_str(), now, serde_json::to_string(&vec![query.to_string()])?],
                )?;
            }
            Ok(())
        });
        if let Err(ref e) = result {
            tracing::warn!(error = %e, "failed to update access metadata after search");
        }
        Ok(())
    }

    /// Appends a single access-log event without mutating access_count
    /// (used by `analyzer.record_access` for externally observed reads).
    pub fn log_access(&self, event: &AccessEvent) -> Result<()> {
        self.with_writer(|conn| {
            conn.execute(
                "INSERT INTO memory_access_log (memory_id, access_type, access_timestamp, context_type, query_terms, relevance_score, session_id, user_metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, '{}')",
                params![
                    event.memory_id,
                    event.access_type.as_str(),
                    event.timestamp.to_rfc3339(),
                    event.context_type,
                    serde_json::to_string(&event.query_terms)?,
                    event.relevance_score,
                    event.session_id,
                ],
            )?;
            Ok(())
        })
    }

    pub fn start_session(&self, session_type: Option<String>) -> Result<String> {
        let session = Session {
            id: uuid::Uuid::new_v4().to_string(),
            start_timestamp: Utc::now(),
            session_type,
            metadata: HashMap::new(),
        };
        self.with_writer(|conn| {
            conn.execute(
                "INSERT INTO memory_sessions (id, start_timestamp, session_type, session_metadata) VALUES (?1, ?2, ?3, '{}')",
                params![session.id, session.start_timestamp.to_rfc3339(), session.session_type],
            )?;
            Ok(())
        })?;
        Ok(session.id)
    }

    // ------------------------------------------------------------------
    // get / delete / duplicate / migrate
    // ------------------------------------------------------------------

    pub fn get(&self, id: &str) -> Result<Memory> {
        self.with_reader(|conn| {
            conn.query_row(
                "SELECT * FROM unified_memories WHERE id = ?1",
                params![id],
                row_to_memory,
            )
            .optional()?
            .ok_or_else(|| MemoryError::NotFound(id.to_string()))
        })
    }

    /// Deletes a memory, optionally cascading to similar memories first
    /// (§4.1). Cascade deletion is not transactional across sub-deletions;
    /// the primary is removed last so a failure mid-cascade leaves the
    /// primary intact (design notes §9).
    pub fn delete(&self, id: &str, related_ids: &[String]) -> Result<DeleteResult> {
        let mut related_deleted = Vec::new();
        for related_id in related_ids {
            match self.delete_one(related_id) {
                Ok(true) => related_deleted.push(related_id.clone()),
                Ok(false) => {}
                Err(e) => {
                    return Ok(DeleteResult {
                        deleted: false,
                        related_deleted,
                        message: format!("cascade delete failed on {related_id}: {e}"),
                    });
                }
            }
        }

        let deleted = self.delete_one(id)?;
        if !deleted {
            return Err(MemoryError::NotFound(id.to_string()));
        }

        Ok(DeleteResult {
            deleted: true,
            related_deleted,
            message: "deleted".to_string(),
        })
    }

    fn delete_one(&self, id: &str) -> Result<bool> {
        let affected = self.with_writer(|conn| {
            Ok(conn.execute("DELETE FROM unified_memories WHERE id = ?1", params![id])?)
        })?;
        Ok(affected > 0)
    }

    pub fn check_duplicate(
        &self,
        candidates: Vec<(Memory, f64)>,
        threshold: f64,
    ) -> Result<DuplicateCheck> {
        let duplicates: Vec<Memory> = candidates
            .into_iter()
            .filter(|(_, similarity)| *similarity >= threshold)
            .map(|(memory, _)| memory)
            .collect();
        let is_duplicate = !duplicates.is_empty();
        let recommendation = if is_duplicate {
            "existing memory with similar content found; consider reusing it instead of storing a new one".to_string()
        } else {
            "no sufficiently similar memory found; safe to store".to_string()
        };
        Ok(DuplicateCheck {
            is_duplicate,
            duplicates,
            recommendation,
        })
    }

    pub fn migrate(&self, id: &str, target_tier: Tier, reason: Option<String>) -> Result<MigrateResult> {
        let memory = self.get(id)?;
        if memory.tier == target_tier {
            return Ok(MigrateResult {
                migrated: false,
                from_tier: memory.tier,
                to_tier: target_tier,
                message: format!("memory is already in the {target_tier} tier"),
            });
        }

        if target_tier == Tier::Core {
            if memory.content_size > CORE_MAX_CONTENT_BYTES as i64 {
                return Ok(MigrateResult {
                    migrated: false,
                    from_tier: memory.tier,
                    to_tier: target_tier,
                    message: format!(
                        "content exceeds the {}-byte 2KB limit for the core tier",
                        CORE_MAX_CONTENT_BYTES
                    ),
                });
            }
            let used = self.core_partition_bytes(memory.scope, memory.project_id.as_deref())?;
            if used + memory.content_size > CORE_PARTITION_WARN_BYTES {
                tracing::warn!(
                    memory_id = %id,
                    "core partition usage exceeds the 20KiB guideline after migration"
                );
            }
        }

        let mut metadata = memory.metadata.clone();
        metadata.insert(
            "migration_reason".to_string(),
            serde_json::Value::String(reason.clone().unwrap_or_default()),
        );
        metadata.insert(
            "migrated_at".to_string(),
            serde_json::Value::String(Utc::now().to_rfc3339()),
        );
        metadata.insert(
            "migrated_from".to_string(),
            serde_json::Value::String(memory.tier.as_str().to_string()),
        );
        let metadata_json = serde_json::to_string(&metadata)?;

        self.with_writer(|conn| {
            conn.execute(
                "UPDATE unified_memories SET tier = ?1, metadata = ?2 WHERE id = ?3",
                params![target_tier.as_str(), metadata_json, id],
            )?;
            Ok(())
        })?;

        Ok(MigrateResult {
            migrated: true,
            from_tier: memory.tier,
            to_tier: target_tier,
            message: format!("migrated from {} to {target_tier}", memory.tier),
        })
    }

    // ------------------------------------------------------------------
    // aggregates
    // ------------------------------------------------------------------

    pub fn stats(&self) -> Result<MemoryStats> {
        self.with_reader(|conn| {
            let total_memories: i64 =
                conn.query_row("SELECT COUNT(*) FROM unified_memories", [], |r| r.get(0))?;
            let core_count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM unified_memories WHERE tier = 'core'",
                [],
                |r| r.get(0),
            )?;
            let global_count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM unified_memories WHERE scope = 'global'",
                [],
                |r| r.get(0),
            )?;
            let total_content_bytes: i64 = conn.query_row(
                "SELECT COALESCE(SUM(content_size), 0) FROM unified_memories",
                [],
                |r| r.get(0),
            )?;
            let average_content_bytes = if total_memories > 0 {
                total_content_bytes as f64 / total_memories as f64
            } else {
                0.0
            };
            Ok(MemoryStats {
                total_memories,
                core_count,
                longterm_count: total_memories - core_count,
                global_count,
                project_count: total_memories - global_count,
                total_content_bytes,
                average_content_bytes,
            })
        })
    }

    pub fn analytics(&self) -> Result<Analytics> {
        self.with_reader(|conn| {
            let all: Vec<Memory> = conn
                .prepare("SELECT * FROM unified_memories")?
                .query_map([], row_to_memory)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut tier_distribution = HashMap::new();
            let mut scope_distribution = HashMap::new();
            let mut tag_counts: HashMap<String, i64> = HashMap::new();
            let mut projects = std::collections::HashSet::new();
            let mut core_partition_bytes: HashMap<String, i64> = HashMap::new();
            let now = Utc::now();
            let today_start = now.date_naive().and_hms_opt(0, 0, 0).unwrap();
            let week_start = now - chrono::Duration::days(7);

            let mut created_today = 0i64;
            let mut created_this_week = 0i64;
            let mut total_size_bytes = 0i64;

            for memory in &all {
                *tier_distribution.entry(memory.tier.as_str().to_string()).or_insert(0) += 1;
                *scope_distribution.entry(memory.scope.as_str().to_string()).or_insert(0) += 1;
                for tag in &memory.tags {
                    *tag_counts.entry(tag.clone()).or_insert(0) += 1;
                }
                if let Some(ref project_id) = memory.project_id {
                    projects.insert(project_id.clone());
                }
                total_size_bytes += memory.content_size;
                if memory.created_at.naive_utc() >= today_start {
                    created_today += 1;
                }
                if memory.created_at >= week_start {
                    created_this_week += 1;
                }
                if memory.tier == Tier::Core {
                    let key = format!(
                        "{}:{}",
                        memory.scope.as_str(),
                        memory.project_id.clone().unwrap_or_default()
                    );
                    *core_partition_bytes.entry(key).or_insert(0) += memory.content_size;
                }
            }

            let mut by_access_count = all.clone();
            by_access_count.sort_by(|a, b| b.access_count.cmp(&a.access_count));
            let most_accessed = by_access_count.iter().take(10).cloned().collect();
            let least_accessed = by_access_count.iter().rev().take(10).cloned().collect();

            let mut by_recency = all.clone();
            by_recency.sort_by(|a, b| b.accessed_at.cmp(&a.accessed_at));
            let recently_accessed = by_recency.into_iter().take(10).collect();

            let mut top_tags: Vec<(String, i64)> = tag_counts.into_iter().collect();
            top_tags.sort_by(|a, b| b.1.cmp(&a.1));
            top_tags.truncate(10);

            let core_tier_utilization = core_partition_bytes
                .into_iter()
                .map(|(key, bytes)| (key, bytes as f64 / CORE_PARTITION_WARN_BYTES as f64))
                .collect();

            Ok(Analytics {
                tier_distribution,
                scope_distribution,
                most_accessed,
                least_accessed,
                recently_accessed,
                total_size_bytes,
                average_size_bytes: if all.is_empty() {
                    0.0
                } else {
                    total_size_bytes as f64 / all.len() as f64
                },
                created_today,
                created_this_week,
                top_tags,
                active_projects: projects.into_iter().collect(),
                core_tier_utilization,
            })
        })
    }

    /// Raw access-log entries for a memory since a given timestamp, newest
    /// first — the Analyzer's input for frequency/regularity scoring.
    pub fn access_log_since(
        &self,
        memory_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<(DateTime<Utc>, Option<f64>)>> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare(
                "SELECT access_timestamp, relevance_score FROM memory_access_log
                 WHERE memory_id = ?1 AND access_timestamp >= ?2
                 ORDER BY access_timestamp DESC",
            )?;
            let rows = stmt
                .query_map(params![memory_id, since.to_rfc3339()], |row| {
                    let ts: String = row.get(0)?;
                    let relevance: Option<f64> = row.get(1)?;
                    Ok((parse_timestamp(&ts), relevance))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn access_log_count(&self, memory_id: &str) -> Result<i64> {
        self.with_reader(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM memory_access_log WHERE memory_id = ?1",
                params![memory_id],
                |r| r.get(0),
            )?)
        })
    }

    pub fn all_memories(&self) -> Result<Vec<Memory>> {
        self.with_reader(|conn| {
            let memories = conn
                .prepare("SELECT * FROM unified_memories")?
                .query_map([], row_to_memory)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(memories)
        })
    }

    pub fn upsert_behavioral_pattern(&self, pattern: &crate::memory::BehavioralPattern) -> Result<()> {
        self.with_writer(|conn| {
            conn.execute(
                "INSERT INTO memory_behavioral_patterns
                 (memory_id, access_frequency_score, access_regularity_score, predicted_next_access,
                  tier_optimization_score, archival_probability, last_analysis_timestamp, analysis_confidence)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(memory_id) DO UPDATE SET
                    access_frequency_score = excluded.access_frequency_score,
                    access_regularity_score = excluded.access_regularity_score,
                    predicted_next_access = excluded.predicted_next_access,
                    tier_optimization_score = excluded.tier_optimization_score,
                    archival_probability = excluded.archival_probability,
                    last_analysis_timestamp = excluded.last_analysis_timestamp,
                    analysis_confidence = excluded.analysis_confidence",
                params![
                    pattern.memory_id,
                    pattern.access_frequency_score,
                    pattern.access_regularity_score,
                    pattern.predicted_next_access.map(|t| t.to_rfc3339()),
                    pattern.tier_optimization_score,
                    pattern.archival_probability,
                    pattern.last_analysis_timestamp.to_rfc3339(),
                    pattern.analysis_confidence,
                ],
            )?;
            Ok(())
        })
    }

    pub fn behavioral_patterns(&self) -> Result<Vec<crate::memory::BehavioralPattern>> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM memory_behavioral_patterns")?;
            let rows = stmt
                .query_map([], |row| {
                    let predicted: Option<String> = row.get("predicted_next_access")?;
                    let last_analysis: String = row.get("last_analysis_timestamp")?;
                    Ok(crate::memory::BehavioralPattern {
                        memory_id: row.get("memory_id")?,
                        access_frequency_score: row.get("access_frequency_score")?,
                        access_regularity_score: row.get("access_regularity_score")?,
                        predicted_next_access: predicted.map(|s| parse_timestamp(&s)),
                        tier_optimization_score: row.get("tier_optimization_score")?,
                        archival_probability: row.get("archival_probability")?,
                        last_analysis_timestamp: parse_timestamp(&last_analysis),
                        analysis_confidence: row.get("analysis_confidence")?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Records an operational metric row (ambient observability supplement,
    /// see SPEC_FULL.md "Supplemented features").
    pub fn record_performance_metric(
        &self,
        metric_type: &str,
        duration: std::time::Duration,
        rows_touched: usize,
    ) -> Result<()> {
        let duration_ms = duration.as_secs_f64() * 1000.0;
        let efficiency_score = if duration_ms > 0.0 {
            (rows_touched as f64 / duration_ms).min(1.0)
        } else {
            1.0
        };
        self.with_writer(|conn| {
            conn.execute(
                "INSERT INTO system_performance_metrics (metric_type, operation_duration_ms, efficiency_score, timestamp)
                 VALUES (?1, ?2, ?3, ?4)",
                params![metric_type, duration_ms, efficiency_score, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
    }
}

pub(crate) fn row_to_memory(row: &rusqlite::Row) -> rusqlite::Result<Memory> {
    let tags_json: String = row.get("tags")?;
    let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();
    let metadata_json: String = row.get("metadata")?;
    let metadata = serde_json::from_str(&metadata_json).unwrap_or_default();

    let tier_str: String = row.get("tier")?;
    let scope_str: String = row.get("scope")?;
    let created_at: String = row.get("created_at")?;
    let accessed_at: String = row.get("accessed_at")?;

    Ok(Memory {
        id: row.get("id")?,
        content: row.get("content")?,
        tier: Tier::parse(&tier_str).unwrap_or(Tier::Longterm),
        scope: Scope::parse(&scope_str).unwrap_or(Scope::Global),
        project_id: row.get("project_id")?,
        tags,
        metadata,
        content_size: row.get("content_size")?,
        created_at: parse_timestamp(&created_at),
        accessed_at: parse_timestamp(&accessed_at),
        access_count: row.get("access_count")?,
    })
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::StoreInput;

    fn store_input(content: &str, tier: Tier, scope: Scope, project_id: Option<&str>) -> StoreInput {
        StoreInput {
            content: content.to_string(),
            tier,
            scope,
            project_id: project_id.map(|s| s.to_string()),
            tags: vec![],
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn store_and_search_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        let result = store
            .store(store_input(
                "User prefers dark theme",
                Tier::Core,
                Scope::Global,
                None,
            ))
            .unwrap();
        assert!(result.warnings.is_empty());

        let hits = store.search("dark", &SearchFilter::default()).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].memory.id, result.id);
        assert_eq!(hits[0].memory.access_count, 1);
    }

    #[test]
    fn project_scope_requires_project_id() {
        let store = Store::open_in_memory().unwrap();
        let err = store
            .store(store_input("x", Tier::Longterm, Scope::Project, None))
            .unwrap_err();
        assert!(matches!(err, MemoryError::Validation(_)));
    }

    #[test]
    fn core_tier_rejects_oversized_content() {
        let store = Store::open_in_memory().unwrap();
        let big = "x".repeat(2049);
        let err = store
            .store(store_input(&big, Tier::Core, Scope::Global, None))
            .unwrap_err();
        assert!(matches!(err, MemoryError::Validation(_)));

        let ok = store.store(store_input(&big, Tier::Longterm, Scope::Global, None));
        assert!(ok.is_ok());
    }

    #[test]
    fn exactly_2048_bytes_succeeds_2049_fails() {
        let store = Store::open_in_memory().unwrap();
        let at_limit = "x".repeat(2048);
        assert!(store
            .store(store_input(&at_limit, Tier::Core, Scope::Global, None))
            .is_ok());
        let over_limit = "x".repeat(2049);
        assert!(store
            .store(store_input(&over_limit, Tier::Core, Scope::Global, None))
            .is_err());
    }

    #[test]
    fn limit_zero_returns_empty() {
        let store = Store::open_in_memory().unwrap();
        store
            .store(store_input("hello world", Tier::Core, Scope::Global, None))
            .unwrap();
        let filter = SearchFilter {
            limit: Some(0),
            ..Default::default()
        };
        let hits = store.search("hello", &filter).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn project_filter_isolates_results() {
        let store = Store::open_in_memory().unwrap();
        store
            .store(store_input(
                "Project uses TypeScript strict mode",
                Tier::Longterm,
                Scope::Project,
                Some("/p1"),
            ))
            .unwrap();

        let wrong_project = SearchFilter {
            project_id: Some("/p2".to_string()),
            ..Default::default()
        };
        assert!(store.search("typescript", &wrong_project).unwrap().is_empty());

        let right_project = SearchFilter {
            project_id: Some("/p1".to_string()),
            ..Default::default()
        };
        assert_eq!(store.search("typescript", &right_project).unwrap().len(), 1);
    }

    #[test]
    fn deleted_memory_disappears_from_search() {
        let store = Store::open_in_memory().unwrap();
        let id = store
            .store(store_input("ephemeral note", Tier::Core, Scope::Global, None))
            .unwrap()
            .id;
        let result = store.delete(&id, &[]).unwrap();
        assert!(result.deleted);
        assert!(store.search("ephemeral", &SearchFilter::default()).unwrap().is_empty());
        assert!(matches!(store.get(&id), Err(MemoryError::NotFound(_))));
    }

    #[test]
    fn migrate_is_idempotent_and_enforces_core_limit() {
        let store = Store::open_in_memory().unwrap();
        let big = "x".repeat(3000);
        let id = store
            .store(store_input(&big, Tier::Longterm, Scope::Global, None))
            .unwrap()
            .id;

        let result = store.migrate(&id, Tier::Core, None).unwrap();
        assert!(!result.migrated);
        assert!(result.message.contains("2KB"));

        let noop = store.migrate(&id, Tier::Longterm, None).unwrap();
        assert!(!noop.migrated);
        assert!(noop.message.contains("already"));
    }
}
