//! Unified memory tool — merges `store`, `search`, `delete`,
//! `check_duplicate`, `migrate`, `stats`, and `analytics` into a single
//! action-dispatched tool (§6 collaborator surface).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Deserialize;
use serde_json::Value;

use memory_core::memory::{Scope, StoreInput, Tier};
use memory_core::search::{Bm25Engine, Bm25Query, SemanticEngine};
use memory_core::storage::Store;

const DEFAULT_CASCADE_THRESHOLD: f64 = 0.7;
const DEFAULT_DUPLICATE_THRESHOLD: f64 = 0.8;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "action": {
                "type": "string",
                "enum": ["store", "search", "delete", "check_duplicate", "migrate", "stats", "analytics"]
            },
            "id": { "type": "string", "description": "Memory id. Required for 'delete' and 'migrate'." },
            "content": { "type": "string", "description": "Required for 'store' and 'check_duplicate'." },
            "tier": { "type": "string", "enum": ["core", "longterm"] },
            "scope": { "type": "string", "enum": ["global", "project"] },
            "projectId": { "type": "string" },
            "tags": { "type": "array", "items": { "type": "string" } },
            "metadata": { "type": "object" },
            "query": { "type": "string", "description": "Required for 'search'." },
            "limit": { "type": "integer" },
            "cascadeRelated": { "type": "boolean", "description": "For 'delete': also remove similar memories." },
            "threshold": { "type": "number" },
            "targetTier": { "type": "string", "enum": ["core", "longterm"], "description": "Required for 'migrate'." },
            "reason": { "type": "string" }
        },
        "required": ["action"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MemoryArgs {
    action: String,
    id: Option<String>,
    content: Option<String>,
    tier: Option<String>,
    scope: Option<String>,
    project_id: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    metadata: HashMap<String, Value>,
    query: Option<String>,
    limit: Option<i64>,
    cascade_related: Option<bool>,
    threshold: Option<f64>,
    target_tier: Option<String>,
    reason: Option<String>,
}

pub async fn execute(
    store: &Arc<Store>,
    semantic: &Arc<Mutex<SemanticEngine>>,
    args: Option<Value>,
) -> Result<Value, String> {
    let args: MemoryArgs = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| format!("Invalid arguments: {e}"))?,
        None => return Err("Missing arguments".to_string()),
    };

    match args.action.as_str() {
        "store" => execute_store(store, args),
        "search" => execute_search(store, args),
        "delete" => execute_delete(store, semantic, args),
        "check_duplicate" => execute_check_duplicate(store, semantic, args),
        "migrate" => execute_migrate(store, args),
        "stats" => execute_stats(store),
        "analytics" => execute_analytics(store),
        other => Err(format!(
            "Invalid action '{other}'. Must be one of: store, search, delete, check_duplicate, migrate, stats, analytics"
        )),
    }
}

fn parse_tier(s: &str) -> Result<Tier, String> {
    Tier::parse(s).ok_or_else(|| format!("invalid tier '{s}', expected 'core' or 'longterm'"))
}

fn parse_scope(s: &str) -> Result<Scope, String> {
    Scope::parse(s).ok_or_else(|| format!("invalid scope '{s}', expected 'global' or 'project'"))
}

/// Rebuilds the semantic index against the current corpus when stale. The
/// store is the source of truth; the index is a derived, disposable cache
/// (§4.3).
fn refresh_semantic_index(store: &Store, semantic: &Mutex<SemanticEngine>) -> Result<(), String> {
    let memories = store.all_memories().map_err(|e| e.to_string())?;
    let mut engine = semantic.lock().map_err(|_| "semantic index lock poisoned".to_string())?;
    if engine.needs_rebuild(memories.len()) {
        engine.build_index(memories);
    }
    Ok(())
}

fn execute_store(store: &Arc<Store>, args: MemoryArgs) -> Result<Value, String> {
    let content = args.content.ok_or("Missing 'content' field")?;
    let tier = parse_tier(&args.tier.ok_or("Missing 'tier' field")?)?;
    let scope = parse_scope(&args.scope.ok_or("Missing 'scope' field")?)?;

    let result = store
        .store(StoreInput {
            content,
            tier,
            scope,
            project_id: args.project_id,
            tags: args.tags,
            metadata: args.metadata,
        })
        .map_err(|e| e.to_string())?;

    Ok(serde_json::json!({
        "action": "store",
        "id": result.id,
        "warnings": result.warnings,
    }))
}

fn execute_search(store: &Arc<Store>, args: MemoryArgs) -> Result<Value, String> {
    let query = args.query.ok_or("Missing 'query' field")?;
    let tier = args.tier.as_deref().map(parse_tier).transpose()?;

    let mut bm25_query = Bm25Query::new(&query);
    bm25_query.tier = tier;
    bm25_query.project_id = args.project_id.as_deref();
    bm25_query.limit = args.limit.unwrap_or(10);

    let engine = Bm25Engine::new(store);
    let hits = engine.search(&bm25_query).map_err(|e| e.to_string())?;

    Ok(serde_json::json!({
        "action": "search",
        "query": query,
        "hits": hits,
    }))
}

fn execute_delete(
    store: &Arc<Store>,
    semantic: &Arc<Mutex<SemanticEngine>>,
    args: MemoryArgs,
) -> Result<Value, String> {
    let id = args.id.ok_or("Missing 'id' field")?;
    let cascade = args.cascade_related.unwrap_or(false);
    let threshold = args.threshold.unwrap_or(DEFAULT_CASCADE_THRESHOLD);

    let related_ids = if cascade {
        refresh_semantic_index(store, semantic)?;
        let engine = semantic.lock().map_err(|_| "semantic index lock poisoned".to_string())?;
        let all = store.all_memories().map_err(|e| e.to_string())?;
        all.into_iter()
            .filter(|m| m.id != id)
            .filter(|m| engine.similarity(&id, &m.id) >= threshold)
            .map(|m| m.id)
            .collect()
    } else {
        Vec::new()
    };

    let result = store.delete(&id, &related_ids).map_err(|e| e.to_string())?;
    Ok(serde_json::json!({
        "action": "delete",
        "deleted": result.deleted,
        "relatedDeleted": result.related_deleted,
        "message": result.message,
    }))
}

fn execute_check_duplicate(
    store: &Arc<Store>,
    semantic: &Arc<Mutex<SemanticEngine>>,
    args: MemoryArgs,
) -> Result<Value, String> {
    let content = args.content.ok_or("Missing 'content' field")?;
    let threshold = args.threshold.unwrap_or(DEFAULT_DUPLICATE_THRESHOLD);

    refresh_semantic_index(store, semantic)?;
    let engine = semantic.lock().map_err(|_| "semantic index lock poisoned".to_string())?;

    let candidates: Vec<(memory_core::memory::Memory, f64)> = store
        .all_memories()
        .map_err(|e| e.to_string())?
        .into_iter()
        .filter(|m| {
            args.project_id.is_none() || m.project_id.as_deref() == args.project_id.as_deref()
        })
        .map(|m| {
            let similarity = engine.similarity_to_content(&content, &args.tags, &m.id);
            (m, similarity)
        })
        .collect();
    drop(engine);

    let result = store.check_duplicate(candidates, threshold).map_err(|e| e.to_string())?;
    Ok(serde_json::json!({
        "action": "check_duplicate",
        "isDuplicate": result.is_duplicate,
        "duplicates": result.duplicates,
        "recommendation": result.recommendation,
    }))
}

fn execute_migrate(store: &Arc<Store>, args: MemoryArgs) -> Result<Value, String> {
    let id = args.id.ok_or("Missing 'id' field")?;
    let target_tier = parse_tier(&args.target_tier.ok_or("Missing 'targetTier' field")?)?;

    let result = store.migrate(&id, target_tier, args.reason).map_err(|e| e.to_string())?;
    Ok(serde_json::json!({
        "action": "migrate",
        "migrated": result.migrated,
        "fromTier": result.from_tier.as_str(),
        "toTier": result.to_tier.as_str(),
        "message": result.message,
    }))
}

fn execute_stats(store: &Arc<Store>) -> Result<Value, String> {
    let stats = store.stats().map_err(|e| e.to_string())?;
    serde_json::to_value(stats).map_err(|e| e.to_string())
}

fn execute_analytics(store: &Arc<Store>) -> Result<Value, String> {
    let analytics = store.analytics().map_err(|e| e.to_string())?;
    serde_json::to_value(analytics).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (Arc<Store>, tempfile::TempDir) {
        let dir = tempfile::TempDir::new().unwrap();
        let store = Store::open(&memory_core::config::Config::new(dir.path().join("test.db"))).unwrap();
        (Arc::new(store), dir)
    }

    fn test_semantic() -> Arc<Mutex<SemanticEngine>> {
        Arc::new(Mutex::new(SemanticEngine::new()))
    }

    #[tokio::test]
    async fn store_then_search_finds_it() {
        let (store, _dir) = test_store();
        let semantic = test_semantic();

        let store_args = serde_json::json!({
            "action": "store",
            "content": "User prefers dark theme",
            "tier": "core",
            "scope": "global",
        });
        let result = execute(&store, &semantic, Some(store_args)).await.unwrap();
        assert!(result["id"].is_string());

        let search_args = serde_json::json!({ "action": "search", "query": "dark theme" });
        let result = execute(&store, &semantic, Some(search_args)).await.unwrap();
        let hits = result["hits"].as_array().unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn missing_arguments_fails() {
        let (store, _dir) = test_store();
        let semantic = test_semantic();
        let result = execute(&store, &semantic, None).await;
        assert!(result.unwrap_err().contains("Missing arguments"));
    }

    #[tokio::test]
    async fn invalid_action_fails() {
        let (store, _dir) = test_store();
        let semantic = test_semantic();
        let args = serde_json::json!({ "action": "bogus" });
        let result = execute(&store, &semantic, Some(args)).await;
        assert!(result.unwrap_err().contains("Invalid action"));
    }

    #[tokio::test]
    async fn store_rejects_oversized_core_content() {
        let (store, _dir) = test_store();
        let semantic = test_semantic();
        let args = serde_json::json!({
            "action": "store",
            "content": "x".repeat(4000),
            "tier": "core",
            "scope": "global",
        });
        let result = execute(&store, &semantic, Some(args)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn delete_removes_memory() {
        let (store, _dir) = test_store();
        let semantic = test_semantic();
        let store_args = serde_json::json!({
            "action": "store", "content": "ephemeral", "tier": "core", "scope": "global",
        });
        let id = execute(&store, &semantic, Some(store_args)).await.unwrap()["id"]
            .as_str()
            .unwrap()
            .to_string();

        let delete_args = serde_json::json!({ "action": "delete", "id": id });
        let result = execute(&store, &semantic, Some(delete_args)).await.unwrap();
        assert_eq!(result["deleted"], true);
    }

    #[tokio::test]
    async fn check_duplicate_flags_near_identical_content() {
        let (store, _dir) = test_store();
        let semantic = test_semantic();
        let store_args = serde_json::json!({
            "action": "store", "content": "project uses typescript strict mode", "tier": "longterm", "scope": "global",
        });
        execute(&store, &semantic, Some(store_args)).await.unwrap();

        let dup_args = serde_json::json!({
            "action": "check_duplicate",
            "content": "project uses typescript strict mode",
            "threshold": 0.5,
        });
        let result = execute(&store, &semantic, Some(dup_args)).await.unwrap();
        assert_eq!(result["isDuplicate"], true);
    }

    #[tokio::test]
    async fn migrate_moves_between_tiers() {
        let (store, _dir) = test_store();
        let semantic = test_semantic();
        let store_args = serde_json::json!({
            "action": "store", "content": "small note", "tier": "longterm", "scope": "global",
        });
        let id = execute(&store, &semantic, Some(store_args)).await.unwrap()["id"]
            .as_str()
            .unwrap()
            .to_string();

        let migrate_args = serde_json::json!({ "action": "migrate", "id": id, "targetTier": "core" });
        let result = execute(&store, &semantic, Some(migrate_args)).await.unwrap();
        assert_eq!(result["migrated"], true);
        assert_eq!(result["toTier"], "core");
    }

    #[tokio::test]
    async fn stats_reports_total_memories() {
        let (store, _dir) = test_store();
        let semantic = test_semantic();
        let store_args = serde_json::json!({
            "action": "store", "content": "one", "tier": "core", "scope": "global",
        });
        execute(&store, &semantic, Some(store_args)).await.unwrap();

        let stats_args = serde_json::json!({ "action": "stats" });
        let result = execute(&store, &semantic, Some(stats_args)).await.unwrap();
        assert_eq!(result["totalMemories"], 1);
    }
}
