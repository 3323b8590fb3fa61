//! Database schema and versioned migrations for the unified memory store.

/// A single versioned migration.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static str,
}

/// All migrations, applied in order against a fresh or existing database.
pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "Initial unified memory schema with BM25 full-text index",
    up: MIGRATION_V1_UP,
}];

const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS unified_memories (
    id TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    tier TEXT NOT NULL CHECK (tier IN ('core', 'longterm')),
    scope TEXT NOT NULL CHECK (scope IN ('global', 'project')),
    project_id TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    metadata TEXT NOT NULL DEFAULT '{}',
    content_size INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    accessed_at TEXT NOT NULL,
    access_count INTEGER NOT NULL DEFAULT 0,
    CHECK ((scope = 'project' AND project_id IS NOT NULL) OR (scope = 'global'))
);

CREATE INDEX IF NOT EXISTS idx_memories_tier_scope ON unified_memories(tier, scope);
CREATE INDEX IF NOT EXISTS idx_memories_project ON unified_memories(project_id);
CREATE INDEX IF NOT EXISTS idx_memories_content_lower ON unified_memories(lower(content));
CREATE INDEX IF NOT EXISTS idx_memories_tags_lower ON unified_memories(lower(tags));
CREATE INDEX IF NOT EXISTS idx_memories_tier_access ON unified_memories(tier, access_count, accessed_at);
CREATE INDEX IF NOT EXISTS idx_memories_tier_size ON unified_memories(tier, content_size);

CREATE TABLE IF NOT EXISTS memory_access_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    memory_id TEXT NOT NULL,
    access_type TEXT NOT NULL CHECK (access_type IN ('read', 'search_match', 'context_load', 'update')),
    access_timestamp TEXT NOT NULL,
    context_type TEXT,
    query_terms TEXT NOT NULL DEFAULT '[]',
    relevance_score REAL,
    session_id TEXT,
    user_metadata TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_access_log_memory ON memory_access_log(memory_id);
CREATE INDEX IF NOT EXISTS idx_access_log_timestamp ON memory_access_log(access_timestamp);

CREATE TABLE IF NOT EXISTS memory_behavioral_patterns (
    memory_id TEXT PRIMARY KEY REFERENCES unified_memories(id) ON DELETE CASCADE,
    access_frequency_score REAL NOT NULL DEFAULT 0.0,
    access_regularity_score REAL NOT NULL DEFAULT 0.0,
    predicted_next_access TEXT,
    tier_optimization_score REAL NOT NULL DEFAULT 0.0,
    archival_probability REAL NOT NULL DEFAULT 0.0,
    last_analysis_timestamp TEXT NOT NULL,
    analysis_confidence REAL NOT NULL DEFAULT 0.5
);

CREATE TABLE IF NOT EXISTS memory_sessions (
    id TEXT PRIMARY KEY,
    start_timestamp TEXT NOT NULL,
    session_type TEXT,
    session_metadata TEXT NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS system_performance_metrics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    metric_type TEXT NOT NULL,
    operation_duration_ms REAL NOT NULL,
    efficiency_score REAL NOT NULL,
    timestamp TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);

-- Virtual full-text index mirroring unified_memories, kept in sync by
-- triggers. External-content column names must match unified_memories'
-- own column names so 'rebuild' can regenerate the index by name.
CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
    id UNINDEXED,
    content,
    tags,
    metadata,
    tier UNINDEXED,
    project_id UNINDEXED,
    created_at UNINDEXED,
    accessed_at UNINDEXED,
    access_count UNINDEXED,
    content='unified_memories',
    content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS memories_ai AFTER INSERT ON unified_memories BEGIN
    INSERT INTO memories_fts(rowid, id, content, tags, metadata, tier, project_id, created_at, accessed_at, access_count)
    VALUES (NEW.rowid, NEW.id, NEW.content, NEW.tags, NEW.metadata, NEW.tier, NEW.project_id, NEW.created_at, NEW.accessed_at, NEW.access_count);
END;

CREATE TRIGGER IF NOT EXISTS memories_ad AFTER DELETE ON unified_memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, id, content, tags, metadata, tier, project_id, created_at, accessed_at, access_count)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.content, OLD.tags, OLD.metadata, OLD.tier, OLD.project_id, OLD.created_at, OLD.accessed_at, OLD.access_count);
END;

CREATE TRIGGER IF NOT EXISTS memories_au AFTER UPDATE ON unified_memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, id, content, tags, metadata, tier, project_id, created_at, accessed_at, access_count)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.content, OLD.tags, OLD.metadata, OLD.tier, OLD.project_id, OLD.created_at, OLD.accessed_at, OLD.access_count);
    INSERT INTO memories_fts(rowid, id, content, tags, metadata, tier, project_id, created_at, accessed_at, access_count)
    VALUES (NEW.rowid, NEW.id, NEW.content, NEW.tags, NEW.metadata, NEW.tier, NEW.project_id, NEW.created_at, NEW.accessed_at, NEW.access_count);
END;
"#;

/// Returns the currently applied schema version, 0 if the database is fresh.
pub fn current_version(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    let table_exists: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version'",
            [],
            |_| Ok(true),
        )
        .unwrap_or(false);
    if !table_exists {
        return Ok(0);
    }
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
}

/// Applies every migration with a version greater than the current one.
pub fn apply_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    let current = current_version(conn)?;
    for migration in MIGRATIONS {
        if migration.version <= current {
            continue;
        }
        conn.execute_batch(migration.up)?;
        conn.execute(
            "INSERT INTO schema_version(version) VALUES (?1)",
            [migration.version],
        )?;
        tracing::debug!(
            version = migration.version,
            description = migration.description,
            "applied schema migration"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn fresh_database_starts_at_version_zero() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(current_version(&conn).unwrap(), 0);
    }

    #[test]
    fn apply_migrations_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();
        apply_migrations(&conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), 1);
    }
}
