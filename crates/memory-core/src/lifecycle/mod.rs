//! Lifecycle Manager (§4.4, design notes §9): batch traversal that applies
//! the Analyzer's recommendations — promote/demote/archive, with a
//! dry-run mode.
//!
//! Owns the Analyzer (not vice versa), per design notes §9's explicit
//! resolution of the cyclic-reference concern.

use crate::analyzer::BehavioralAnalyzer;
use crate::error::Result;
use crate::memory::{AccessEvent, AccessType, Tier};
use crate::storage::Store;

const ARCHIVAL_THRESHOLD: f64 = 0.8;
const CONFIDENCE_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone)]
pub struct Recommendation {
    pub memory_id: String,
    pub action: String,
    pub current_tier: Tier,
    pub optimal_tier: Tier,
    pub archival_probability: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default)]
pub struct LifecycleReport {
    pub promoted: Vec<String>,
    pub demoted: Vec<String>,
    pub archived: Vec<String>,
    pub recommendations: Vec<Recommendation>,
}

pub struct LifecycleManager<'s> {
    store: &'s Store,
    analyzer: BehavioralAnalyzer<'s>,
}

impl<'s> LifecycleManager<'s> {
    pub fn new(store: &'s Store) -> Self {
        Self {
            store,
            analyzer: BehavioralAnalyzer::new(store),
        }
    }

    /// Traverses every memory with a stored behavioural pattern, recomputes
    /// fresh insights, and applies the resulting recommendation. `dry_run`
    /// returns the recommendation list without mutating state or logging.
    pub fn optimize(&self, dry_run: bool) -> Result<LifecycleReport> {
        let existing_patterns = self.store.behavioral_patterns()?;
        let mut report = LifecycleReport::default();

        for pattern in existing_patterns {
            let memory = match self.store.get(&pattern.memory_id) {
                Ok(m) => m,
                Err(_) => continue, // deleted since the pattern was recorded
            };
            let insights = self.analyzer.analyze(&pattern.memory_id)?;

            let archival_probability = insights.pattern.archival_probability;
            let confidence = insights.pattern.analysis_confidence;
            let optimal_tier = insights.optimal_tier;

            let action = if archival_probability > ARCHIVAL_THRESHOLD && confidence > CONFIDENCE_THRESHOLD {
                "archive"
            } else if optimal_tier != memory.tier && confidence > CONFIDENCE_THRESHOLD {
                if optimal_tier == Tier::Core {
                    "promote"
                } else {
                    "demote"
                }
            } else {
                "none"
            };

            report.recommendations.push(Recommendation {
                memory_id: memory.id.clone(),
                action: action.to_string(),
                current_tier: memory.tier,
                optimal_tier,
                archival_probability,
                confidence,
            });

            if dry_run || action == "none" {
                continue;
            }

            match action {
                "archive" => {
                    self.archive(&memory.id, memory.tier)?;
                    report.archived.push(memory.id.clone());
                }
                "promote" => {
                    self.migrate_and_log(&memory.id, memory.tier, Tier::Core)?;
                    report.promoted.push(memory.id.clone());
                }
                "demote" => {
                    self.migrate_and_log(&memory.id, memory.tier, Tier::Longterm)?;
                    report.demoted.push(memory.id.clone());
                }
                _ => {}
            }
        }

        Ok(report)
    }

    fn migrate_and_log(&self, id: &str, from: Tier, to: Tier) -> Result<()> {
        let result = self.store.migrate(id, to, Some("lifecycle_optimize".to_string()))?;
        if result.migrated {
            self.store.log_access(&AccessEvent {
                memory_id: id.to_string(),
                access_type: AccessType::Update,
                timestamp: chrono::Utc::now(),
                context_type: Some(format!("tier_migration_{from}_to_{to}")),
                query_terms: vec![],
                relevance_score: None,
                session_id: None,
                performance_ms: None,
            })?;
        }
        Ok(())
    }

    /// Archival removes a memory from the hot (core) tier rather than
    /// deleting it outright — the spec's glossary frames archival
    /// probability as "should be removed from hot tiers", and `delete` is
    /// a separate, explicitly destructive operation. A memory already in
    /// `longterm` is left in place and only flagged.
    fn archive(&self, id: &str, current_tier: Tier) -> Result<()> {
        if current_tier == Tier::Core {
            self.migrate_and_log(id, Tier::Core, Tier::Longterm)?;
        }
        self.store.log_access(&AccessEvent {
            memory_id: id.to_string(),
            access_type: AccessType::Update,
            timestamp: chrono::Utc::now(),
            context_type: Some("archival".to_string()),
            query_terms: vec![],
            relevance_score: None,
            session_id: None,
            performance_ms: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Scope, StoreInput, Tier};
    use std::collections::HashMap;

    #[test]
    fn dry_run_produces_recommendations_without_mutating() {
        let store = Store::open_in_memory().unwrap();
        let id = store
            .store(StoreInput {
                content: "frequently used note".to_string(),
                tier: Tier::Longterm,
                scope: Scope::Global,
                project_id: None,
                tags: vec![],
                metadata: HashMap::new(),
            })
            .unwrap()
            .id;

        let analyzer = BehavioralAnalyzer::new(&store);
        analyzer.analyze(&id).unwrap();

        let manager = LifecycleManager::new(&store);
        let before = store.get(&id).unwrap().tier;
        let report = manager.optimize(true).unwrap();
        let after = store.get(&id).unwrap().tier;

        assert_eq!(before, after);
        assert_eq!(report.promoted.len() + report.demoted.len() + report.archived.len(), 0);
    }

    #[test]
    fn optimize_with_no_patterns_is_a_noop() {
        let store = Store::open_in_memory().unwrap();
        let manager = LifecycleManager::new(&store);
        let report = manager.optimize(false).unwrap();
        assert!(report.recommendations.is_empty());
    }
}
