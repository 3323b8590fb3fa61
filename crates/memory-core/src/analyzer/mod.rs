//! Access Log & Analyzer (§4.4): frequency/regularity scoring, tier
//! recommendation, archival probability, and next-access prediction.
//!
//! The Analyzer depends only on the Store (not on the Lifecycle Manager —
//! design notes §9 are explicit that ownership runs the other way), so its
//! scoring logic can be exercised directly against an in-memory store.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::memory::{AccessEvent, BehavioralPattern, Memory, Tier};
use crate::storage::Store;

const FREQUENCY_WINDOW_DAYS: i64 = 30;
const REGULARITY_WINDOW_DAYS: i64 = 7;
const FREQUENCY_DECAY_GAMMA: f64 = 0.95;
const MIN_ANALYSIS_ACCESS_COUNT: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearningPhase {
    Bootstrap,
    Declining,
    Stable,
    Learning,
}

impl LearningPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            LearningPhase::Bootstrap => "bootstrap",
            LearningPhase::Declining => "declining",
            LearningPhase::Stable => "stable",
            LearningPhase::Learning => "learning",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BehavioralInsights {
    pub pattern: BehavioralPattern,
    pub learning_phase: LearningPhase,
    pub optimal_tier: Tier,
}

pub struct BehavioralAnalyzer<'s> {
    store: &'s Store,
}

impl<'s> BehavioralAnalyzer<'s> {
    pub fn new(store: &'s Store) -> Self {
        Self { store }
    }

    pub fn record_access(&self, event: &AccessEvent) -> Result<()> {
        self.store.log_access(event)
    }

    /// `frequency_score(id)` — §4.4.
    pub fn frequency_score(&self, memory_id: &str) -> Result<f64> {
        let since = Utc::now() - chrono::Duration::days(FREQUENCY_WINDOW_DAYS);
        let events = self.store.access_log_since(memory_id, since)?;
        if events.is_empty() {
            return Ok(0.0);
        }
        let now = Utc::now();
        let mut weight_sum = 0.0;
        let mut weighted_relevance_sum = 0.0;
        for (timestamp, relevance) in &events {
            let age_hours = (now - *timestamp).num_seconds() as f64 / 3600.0;
            let weight = FREQUENCY_DECAY_GAMMA.powf(age_hours.max(0.0));
            let relevance_bonus = 0.5 + 0.5 * relevance.unwrap_or(0.0);
            weight_sum += weight;
            weighted_relevance_sum += weight * relevance_bonus;
        }
        if weight_sum == 0.0 {
            return Ok(0.0);
        }
        let mean_weighted_relevance = weighted_relevance_sum / weight_sum;
        let n = events.len() as f64;
        let scale = (2.0f64).min(1.0 + (n.log10()) / 2.0);
        Ok((mean_weighted_relevance * scale).min(1.0))
    }

    /// `regularity_score(id)` — §4.4.
    pub fn regularity_score(&self, memory_id: &str) -> Result<f64> {
        let since = Utc::now() - chrono::Duration::days(REGULARITY_WINDOW_DAYS);
        let mut events = self.store.access_log_since(memory_id, since)?;
        if events.len() < 3 {
            return Ok(0.0);
        }
        events.sort_by_key(|(ts, _)| *ts);
        let intervals: Vec<f64> = events
            .windows(2)
            .map(|pair| (pair[1].0 - pair[0].0).num_seconds() as f64)
            .collect();
        let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;
        if mean == 0.0 {
            return Ok(0.0);
        }
        let variance =
            intervals.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / intervals.len() as f64;
        let std_dev = variance.sqrt();
        Ok((1.0 - (std_dev / mean).min(1.0)).max(0.0))
    }

    /// `predicted_next_access(id)` — §4.4.
    pub fn predicted_next_access(
        &self,
        memory_id: &str,
        regularity: f64,
    ) -> Result<Option<DateTime<Utc>>> {
        let since = Utc::now() - chrono::Duration::days(REGULARITY_WINDOW_DAYS);
        let mut events = self.store.access_log_since(memory_id, since)?;
        if regularity < 0.5 || events.len() < 3 {
            return Ok(None);
        }
        events.sort_by_key(|(ts, _)| *ts);
        let intervals: Vec<f64> = events
            .windows(2)
            .map(|pair| (pair[1].0 - pair[0].0).num_seconds() as f64)
            .collect();
        let mean_interval_secs = intervals.iter().sum::<f64>() / intervals.len() as f64;
        let last_access = events.last().map(|(ts, _)| *ts).unwrap();
        Ok(Some(
            last_access + chrono::Duration::seconds((regularity * mean_interval_secs) as i64),
        ))
    }

    pub fn learning_phase(&self, frequency: f64, regularity: f64, access_count: i64) -> LearningPhase {
        if access_count < MIN_ANALYSIS_ACCESS_COUNT {
            LearningPhase::Bootstrap
        } else if frequency < 0.1 && access_count > 20 {
            LearningPhase::Declining
        } else if regularity > 0.7 && access_count > 10 {
            LearningPhase::Stable
        } else {
            LearningPhase::Learning
        }
    }

    /// Additive rule-based tier recommendation (§4.4 rules R1-R6).
    pub fn recommend_tier(
        &self,
        memory: &Memory,
        frequency: f64,
        regularity: f64,
    ) -> (Tier, f64, f64) {
        let mut score = 0.5;
        let mut confidence = 0.5;
        let days_since_access =
            (Utc::now() - memory.accessed_at).num_seconds() as f64 / 86400.0;

        if frequency > 0.7 && memory.content_size < 1024 {
            score += 0.30;
            confidence += 0.20;
        }
        if memory.access_count > 50 {
            score += 0.20;
            confidence += 0.15;
        }
        if regularity > 0.6 {
            score += 0.15;
            confidence += 0.10;
        }
        if memory.content_size > 2048 && frequency < 0.3 {
            score -= 0.40;
            confidence += 0.20;
        }
        if days_since_access > 7.0 {
            score -= 0.20;
            confidence += 0.10;
        }
        if memory.scope == crate::memory::Scope::Project && frequency < 0.4 {
            score -= 0.10;
        }

        let optimal_tier = if score > 0.6 { Tier::Core } else { Tier::Longterm };
        if optimal_tier == memory.tier {
            confidence += 0.10;
        }
        confidence = confidence.clamp(0.1, 1.0);

        (optimal_tier, score, confidence)
    }

    /// Archival probability heuristic (§4.4).
    pub fn archival_probability(&self, memory: &Memory, frequency: f64) -> f64 {
        let mut prob = 0.0;
        let age_days = (Utc::now() - memory.created_at).num_seconds() as f64 / 86400.0;
        let days_since_access =
            (Utc::now() - memory.accessed_at).num_seconds() as f64 / 86400.0;

        if age_days > 90.0 {
            prob += 0.3;
        }
        if age_days > 180.0 {
            prob += 0.2;
        }
        if frequency < 0.1 {
            prob += 0.4;
        }
        if frequency < 0.05 {
            prob += 0.2;
        }
        if days_since_access > 30.0 {
            prob += 0.3;
        }
        if days_since_access > 60.0 {
            prob += 0.2;
        }
        if memory.content_size > 5000 && frequency < 0.2 {
            prob += 0.2;
        }
        prob.min(1.0)
    }

    /// Full analysis for a single memory, opportunistically computed once
    /// it has accumulated at least 5 access-log entries (§3).
    pub fn analyze(&self, memory_id: &str) -> Result<BehavioralInsights> {
        let memory = self.store.get(memory_id)?;
        let frequency = self.frequency_score(memory_id)?;
        let regularity = self.regularity_score(memory_id)?;
        let predicted_next_access = self.predicted_next_access(memory_id, regularity)?;
        let (optimal_tier, tier_score, confidence) =
            self.recommend_tier(&memory, frequency, regularity);
        let archival_probability = self.archival_probability(&memory, frequency);
        let learning_phase = self.learning_phase(frequency, regularity, memory.access_count);

        let pattern = BehavioralPattern {
            memory_id: memory_id.to_string(),
            access_frequency_score: frequency,
            access_regularity_score: regularity,
            predicted_next_access,
            tier_optimization_score: tier_score.clamp(0.0, 1.0),
            archival_probability,
            last_analysis_timestamp: Utc::now(),
            analysis_confidence: confidence,
        };
        self.store.upsert_behavioral_pattern(&pattern)?;

        Ok(BehavioralInsights {
            pattern,
            learning_phase,
            optimal_tier,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{AccessType, Scope, StoreInput, Tier};
    use std::collections::HashMap;

    fn store_with_memory() -> (Store, String) {
        let store = Store::open_in_memory().unwrap();
        let id = store
            .store(StoreInput {
                content: "item 3".to_string(),
                tier: Tier::Core,
                scope: Scope::Global,
                project_id: None,
                tags: vec![],
                metadata: HashMap::new(),
            })
            .unwrap()
            .id;
        (store, id)
    }

    #[test]
    fn frequency_score_is_zero_with_no_accesses() {
        let (store, id) = store_with_memory();
        let analyzer = BehavioralAnalyzer::new(&store);
        assert_eq!(analyzer.frequency_score(&id).unwrap(), 0.0);
    }

    #[test]
    fn frequency_score_rises_with_recorded_accesses() {
        let (store, id) = store_with_memory();
        let analyzer = BehavioralAnalyzer::new(&store);
        for _ in 0..5 {
            analyzer
                .record_access(&AccessEvent {
                    memory_id: id.clone(),
                    access_type: AccessType::Read,
                    timestamp: Utc::now(),
                    context_type: None,
                    query_terms: vec![],
                    relevance_score: Some(1.0),
                    session_id: None,
                    performance_ms: None,
                })
                .unwrap();
        }
        let frequency = analyzer.frequency_score(&id).unwrap();
        assert!(frequency > 0.0);
        assert!(frequency <= 1.0);
    }

    #[test]
    fn regularity_requires_at_least_three_events() {
        let (store, id) = store_with_memory();
        let analyzer = BehavioralAnalyzer::new(&store);
        assert_eq!(analyzer.regularity_score(&id).unwrap(), 0.0);
    }

    #[test]
    fn recommend_tier_favors_core_for_small_frequent_memory() {
        let (store, id) = store_with_memory();
        let analyzer = BehavioralAnalyzer::new(&store);
        let memory = store.get(&id).unwrap();
        let (tier, _score, confidence) = analyzer.recommend_tier(&memory, 0.9, 0.8);
        assert_eq!(tier, Tier::Core);
        assert!(confidence > 0.5);
    }
}
