//! Lifecycle tool — runs the promote/demote/archive optimization pass
//! (`lifecycle.optimize`, §6 collaborator surface).

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use memory_core::lifecycle::LifecycleManager;
use memory_core::storage::Store;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "dryRun": {
                "type": "boolean",
                "description": "When true, returns recommendations without mutating any memory's tier."
            }
        }
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LifecycleArgs {
    #[serde(default)]
    dry_run: bool,
}

pub async fn execute(store: &Arc<Store>, args: Option<Value>) -> Result<Value, String> {
    let args: LifecycleArgs = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| format!("Invalid arguments: {e}"))?,
        None => LifecycleArgs::default(),
    };

    let manager = LifecycleManager::new(store);
    let report = manager.optimize(args.dry_run).map_err(|e| e.to_string())?;

    let recommendations: Vec<Value> = report
        .recommendations
        .iter()
        .map(|r| {
            serde_json::json!({
                "memoryId": r.memory_id,
                "action": r.action,
                "currentTier": r.current_tier.as_str(),
                "optimalTier": r.optimal_tier.as_str(),
                "archivalProbability": r.archival_probability,
                "confidence": r.confidence,
            })
        })
        .collect();

    Ok(serde_json::json!({
        "dryRun": args.dry_run,
        "promoted": report.promoted,
        "demoted": report.demoted,
        "archived": report.archived,
        "recommendations": recommendations,
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

    #[tokio::test]
    async fn optimize_with_no_patterns_returns_empty_report() {
        let (store, _dir) = test_store();
        let args = serde_json::json!({ "dryRun": true });
        let result = execute(&store, Some(args)).await.unwrap();
        assert_eq!(result["promoted"].as_array().unwrap().len(), 0);
        assert_eq!(result["demoted"].as_array().unwrap().len(), 0);
        assert_eq!(result["archived"].as_array().unwrap().len(), 0);
        assert_eq!(result["recommendations"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn missing_arguments_defaults_to_non_dry_run() {
        let (store, _dir) = test_store();
        let result = execute(&store, None).await.unwrap();
        assert_eq!(result["dryRun"], false);
    }

    #[tokio::test]
    async fn dry_run_does_not_mutate_tiers() {
        let (store, _dir) = test_store();
        let id = store
            .store(memory_core::memory::StoreInput {
                content: "rarely used note".to_string(),
                tier: memory_core::memory::Tier::Core,
                scope: memory_core::memory::Scope::Global,
                project_id: None,
                tags: Vec::new(),
                metadata: Default::default(),
            })
            .unwrap()
            .id;

        let analyzer = memory_core::analyzer::BehavioralAnalyzer::new(&store);
        analyzer.analyze(&id).unwrap();

        let args = serde_json::json!({ "dryRun": true });
        execute(&store, Some(args)).await.unwrap();

        let memory = store.get(&id).unwrap();
        assert_eq!(memory.tier, memory_core::memory::Tier::Core);
    }
}
