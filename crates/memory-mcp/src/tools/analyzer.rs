//! Behavioural analyzer tool — `start_session`, `record_access`, `analyze`
//! (§6 collaborator surface).

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;

use memory_core::analyzer::BehavioralAnalyzer;
use memory_core::memory::{AccessEvent, AccessType};
use memory_core::storage::Store;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "action": {
                "type": "string",
                "enum": ["start_session", "record_access", "analyze"]
            },
            "sessionType": { "type": "string", "description": "For 'start_session'." },
            "id": { "type": "string", "description": "Memory id. Required for 'record_access' and 'analyze'." },
            "type": {
                "type": "string",
                "enum": ["read", "search_match", "context_load", "update"],
                "description": "Access type. Required for 'record_access'."
            },
            "context": { "type": "string", "description": "Free-form context label for 'record_access'." },
            "sessionId": { "type": "string" },
            "queryTerms": { "type": "array", "items": { "type": "string" } },
            "relevanceScore": { "type": "number" },
            "performanceMs": { "type": "number" }
        },
        "required": ["action"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzerArgs {
    action: String,
    session_type: Option<String>,
    id: Option<String>,
    #[serde(rename = "type")]
    access_type: Option<String>,
    context: Option<String>,
    session_id: Option<String>,
    #[serde(default)]
    query_terms: Vec<String>,
    relevance_score: Option<f64>,
    performance_ms: Option<f64>,
}

pub async fn execute(store: &Arc<Store>, args: Option<Value>) -> Result<Value, String> {
    let args: AnalyzerArgs = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| format!("Invalid arguments: {e}"))?,
        None => return Err("Missing arguments".to_string()),
    };

    match args.action.as_str() {
        "start_session" => execute_start_session(store, args),
        "record_access" => execute_record_access(store, args),
        "analyze" => execute_analyze(store, args),
        other => Err(format!(
            "Invalid action '{other}'. Must be one of: start_session, record_access, analyze"
        )),
    }
}

fn execute_start_session(store: &Arc<Store>, args: AnalyzerArgs) -> Result<Value, String> {
    let session_id = store.start_session(args.session_type).map_err(|e| e.to_string())?;
    Ok(serde_json::json!({
        "action": "start_session",
        "sessionId": session_id,
    }))
}

fn execute_record_access(store: &Arc<Store>, args: AnalyzerArgs) -> Result<Value, String> {
    let memory_id = args.id.ok_or("Missing 'id' field")?;
    let access_type_raw = args.access_type.ok_or("Missing 'type' field")?;
    let access_type = AccessType::parse(&access_type_raw).ok_or_else(|| {
        format!("invalid access type '{access_type_raw}', expected one of: read, search_match, context_load, update")
    })?;

    let analyzer = BehavioralAnalyzer::new(store);
    let event = AccessEvent {
        memory_id: memory_id.clone(),
        access_type,
        timestamp: Utc::now(),
        context_type: args.context,
        query_terms: args.query_terms,
        relevance_score: args.relevance_score,
        session_id: args.session_id,
        performance_ms: args.performance_ms,
    };
    analyzer.record_access(&event).map_err(|e| e.to_string())?;

    Ok(serde_json::json!({
        "action": "record_access",
        "memoryId": memory_id,
        "recorded": true,
    }))
}

fn execute_analyze(store: &Arc<Store>, args: AnalyzerArgs) -> Result<Value, String> {
    let memory_id = args.id.ok_or("Missing 'id' field")?;
    let analyzer = BehavioralAnalyzer::new(store);
    let insights = analyzer.analyze(&memory_id).map_err(|e| e.to_string())?;

    Ok(serde_json::json!({
        "action": "analyze",
        "pattern": insights.pattern,
        "learningPhase": insights.learning_phase.as_str(),
        "optimalTier": insights.optimal_tier.as_str(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (Arc<Store>, tempfile::TempDir) {
        let dir = tempfile::TempDir::new().unwrap();
        let store = Store::open(&memory_core::config::Config::new(dir.path().join("test.db"))).unwrap();
        (Arc::new(store), dir)
    }

    async fn store_memory(store: &Arc<Store>) -> String {
        store
            .store(memory_core::memory::StoreInput {
                content: "tracked memory".to_string(),
                tier: memory_core::memory::Tier::Core,
                scope: memory_core::memory::Scope::Global,
                project_id: None,
                tags: Vec::new(),
                metadata: Default::default(),
            })
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn start_session_returns_an_id() {
        let (store, _dir) = test_store();
        let args = serde_json::json!({ "action": "start_session", "sessionType": "chat" });
        let result = execute(&store, Some(args)).await.unwrap();
        assert!(result["sessionId"].as_str().unwrap().len() > 0);
    }

    #[tokio::test]
    async fn record_access_accepts_valid_type() {
        let (store, _dir) = test_store();
        let id = store_memory(&store).await;
        let args = serde_json::json!({ "action": "record_access", "id": id, "type": "read" });
        let result = execute(&store, Some(args)).await.unwrap();
        assert_eq!(result["recorded"], true);
    }

    #[tokio::test]
    async fn record_access_rejects_invalid_type() {
        let (store, _dir) = test_store();
        let id = store_memory(&store).await;
        let args = serde_json::json!({ "action": "record_access", "id": id, "type": "bogus" });
        let result = execute(&store, Some(args)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn analyze_returns_bootstrap_phase_before_five_accesses() {
        let (store, _dir) = test_store();
        let id = store_memory(&store).await;
        let args = serde_json::json!({ "action": "analyze", "id": id });
        let result = execute(&store, Some(args)).await.unwrap();
        assert_eq!(result["learningPhase"], "bootstrap");
    }
}
