//! BM25 full-text engine layered over the `memories_fts` virtual table
//! (§4.2).

use chrono::Utc;
use rusqlite::params;

use crate::error::Result;
use crate::memory::{MatchType, Memory, Scope, SearchHit, Tier};
use crate::storage::Store;

const K1: f64 = 1.2;
const B: f64 = 0.75;
const AVG_FIELD_LEN: f64 = 50.0;
const DEFAULT_MIN_SCORE: f64 = 0.1;

#[derive(Debug, Clone, Copy)]
pub struct FieldWeights {
    pub content: f64,
    pub tags: f64,
    pub metadata: f64,
}

impl Default for FieldWeights {
    fn default() -> Self {
        Self {
            content: 1.0,
            tags: 0.8,
            metadata: 0.3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Bm25Query<'a> {
    pub query: &'a str,
    pub tier: Option<Tier>,
    pub project_id: Option<&'a str>,
    pub limit: i64,
    pub min_score: f64,
    pub weights: FieldWeights,
}

impl<'a> Bm25Query<'a> {
    pub fn new(query: &'a str) -> Self {
        Self {
            query,
            tier: None,
            project_id: None,
            limit: 10,
            min_score: DEFAULT_MIN_SCORE,
            weights: FieldWeights::default(),
        }
    }
}

/// Strips FTS5 metacharacters and builds a disjunctive match expression
/// (§4.2 step 1). Grounded on the fallback/sanitize pattern the teacher's
/// keyword search relies on before calling `MATCH`.
pub fn sanitize_fts5_query(query: &str) -> String {
    let cleaned: String = query
        .chars()
        .filter(|c| *c != '\'' && *c != '"' && *c != '*')
        .collect();
    let normalized: String = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let words: Vec<&str> = normalized.split_whitespace().collect();
    if words.is_empty() {
        return String::new();
    }
    if words.len() == 1 {
        return format!("\"{}\"", words[0]);
    }
    let disjuncts: Vec<String> = words.iter().map(|w| format!("\"{w}\"")).collect();
    format!("(\"{normalized}\") OR ({})", disjuncts.join(" OR "))
}

/// Tier/layer ranking prior (§4.2, §8 "Tier-prior monotonicity"): `core` is
/// always-resident and priority-boosted over `longterm`; a caller-supplied
/// layer hint (preference/system/project/prompt) refines within that.
fn tier_prior(tier: Tier, layer_hint: Option<&str>) -> f64 {
    match layer_hint {
        Some("preference") => 1.3,
        Some("system") => 1.2,
        Some("project") => 1.0,
        Some("prompt") => 0.9,
        Some(_) => 1.0,
        None => match tier {
            Tier::Core => 1.2,
            Tier::Longterm => 1.0,
        },
    }
}

pub struct Bm25Engine<'s> {
    store: &'s Store,
}

impl<'s> Bm25Engine<'s> {
    pub fn new(store: &'s Store) -> Self {
        Self { store }
    }

    pub fn search(&self, q: &Bm25Query) -> Result<Vec<SearchHit>> {
        match self.search_inner(q) {
            Ok(hits) => Ok(hits),
            Err(e) => {
                tracing::warn!(error = %e, "bm25 fts query failed, falling back to substring search");
                self.fallback_search(q)
            }
        }
    }

    fn search_inner(&self, q: &Bm25Query) -> Result<Vec<SearchHit>> {
        let sanitized = sanitize_fts5_query(q.query);
        if sanitized.is_empty() {
            return Ok(Vec::new());
        }
        let match_expr = if q.weights.metadata > 0.0 {
            format!("content:{sanitized} OR tags:{sanitized} OR metadata:{sanitized}")
        } else {
            format!("content:{sanitized} OR tags:{sanitized}")
        };

        let rows = self.store.with_reader(|conn| {
            // The bm25() weight list is positional over every fts5 column,
            // including UNINDEXED ones — the leading 0.0 covers the `id`
            // column so ?2/?3/?4 land on content/tags/metadata, not id/
            // content/tags (§4.2 step 4's {content:1.0, tags:0.8,
            // metadata:0.3} weighting).
            let mut sql = String::from(
                "SELECT m.*, bm25(memories_fts, 0.0, ?2, ?3, ?4) AS raw_score
                 FROM unified_memories m
                 JOIN memories_fts fts ON m.rowid = fts.rowid
                 WHERE memories_fts MATCH ?1",
            );
            let mut args: Vec<Box<dyn rusqlite::ToSql>> = vec![
                Box::new(match_expr.clone()),
                Box::new(q.weights.content),
                Box::new(q.weights.tags),
                Box::new(q.weights.metadata),
            ];
            if let Some(tier) = q.tier {
                sql.push_str(" AND m.tier = ?");
                args.push(Box::new(tier.as_str().to_string()));
            }
            if let Some(project_id) = q.project_id {
                sql.push_str(" AND m.project_id = ?");
                args.push(Box::new(project_id.to_string()));
            }
            sql.push_str(" ORDER BY raw_score LIMIT ?");
            args.push(Box::new(q.limit.max(1) * 4));

            let mut stmt = conn.prepare(&sql)?;
            let param_refs: Vec<&dyn rusqlite::ToSql> = args.iter().map(|b| b.as_ref()).collect();
            let rows: Vec<(Memory, f64)> = stmt
                .query_map(param_refs.as_slice(), |row| {
                    let memory = crate::storage::row_to_memory(row)?;
                    let raw_score: f64 = row.get("raw_score")?;
                    Ok((memory, raw_score))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        let now = Utc::now();
        let mut hits: Vec<SearchHit> = rows
            .into_iter()
            .map(|(memory, raw_score)| {
                // The engine returns negative scores by convention.
                let native = raw_score.abs().max(0.0001);
                let days_since_access =
                    (now - memory.accessed_at).num_seconds() as f64 / 86400.0;
                let recency_prior = 1.0 + 0.2 * (-days_since_access / 30.0).exp();
                let frequency_prior =
                    1.0 + 0.1 * (memory.access_count as f64 + 1.0).log10();
                let layer_prior = tier_prior(memory.tier, None);

                let mut score = native * recency_prior * frequency_prior * layer_prior;
                // field-weighted component, using k1/b/avg-field-len per §4.2
                // on top of the native score (additive-combination decision,
                // see SPEC_FULL.md "BM25 Engine" open question).
                let field_len = memory.content.split_whitespace().count().max(1) as f64;
                let length_norm = 1.0 - B + B * (field_len / AVG_FIELD_LEN);
                let saturation = (K1 + 1.0) / (K1 * length_norm + 1.0);
                score *= saturation;

                let content_match = memory.content.to_lowercase().contains(&q.query.to_lowercase());
                let match_type = if content_match {
                    MatchType::Exact
                } else {
                    MatchType::Semantic
                };

                SearchHit {
                    memory,
                    score,
                    match_type,
                }
            })
            .filter(|hit| hit.score >= q.min_score)
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(q.limit.max(0) as usize);

        // Query hit update (§4.5): every returned memory gets its access
        // metadata bumped and a search_match event logged, same as the
        // substring fallback's own record_hits call.
        let ids: Vec<String> = hits.iter().map(|h| h.memory.id.clone()).collect();
        self.store.record_hits(&ids, q.query)?;
        for hit in &mut hits {
            hit.memory.access_count += 1;
            hit.memory.accessed_at = now;
        }

        Ok(hits)
    }

    fn fallback_search(&self, q: &Bm25Query) -> Result<Vec<SearchHit>> {
        let filter = crate::memory::SearchFilter {
            tier: q.tier,
            scope: None::<Scope>,
            project_id: q.project_id.map(|s| s.to_string()),
            limit: Some(q.limit),
        };
        let mut hits = self.store.search(q.query, &filter)?;
        for hit in &mut hits {
            hit.match_type = MatchType::Fuzzy;
        }
        Ok(hits)
    }

    /// Runs the engine's optimize pragma to compact the FTS index.
    pub fn optimize(&self) -> Result<()> {
        self.store
            .with_reader(|conn| {
                conn.execute_batch("INSERT INTO memories_fts(memories_fts) VALUES('optimize');")?;
                Ok(())
            })
            .or_else(|e| {
                tracing::warn!(error = %e, "bm25 optimize failed");
                Ok(())
            })
    }

    /// Drops and reinserts every row (full rebuild).
    pub fn rebuild(&self) -> Result<()> {
        self.store.with_reader(|conn| {
            conn.execute_batch(
                "INSERT INTO memories_fts(memories_fts) VALUES('rebuild');",
            )?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_single_word() {
        assert_eq!(sanitize_fts5_query("dark"), "\"dark\"");
    }

    #[test]
    fn sanitize_multi_word_builds_disjunction() {
        let result = sanitize_fts5_query("dark theme");
        assert!(result.contains("OR"));
        assert!(result.contains("\"dark\""));
        assert!(result.contains("\"theme\""));
    }

    #[test]
    fn sanitize_strips_metacharacters() {
        let result = sanitize_fts5_query("te'st\"*");
        assert!(!result.contains('\''));
        assert!(!result.contains('*'));
    }

    #[test]
    fn empty_query_sanitizes_to_empty() {
        assert_eq!(sanitize_fts5_query("   "), "");
    }

    #[test]
    fn tier_priors_match_spec_values() {
        assert_eq!(tier_prior(Tier::Core, Some("preference")), 1.3);
        assert_eq!(tier_prior(Tier::Core, Some("system")), 1.2);
        assert_eq!(tier_prior(Tier::Core, Some("project")), 1.0);
        assert_eq!(tier_prior(Tier::Core, Some("prompt")), 0.9);
        assert_eq!(tier_prior(Tier::Core, Some("unknown-layer")), 1.0);
    }

    #[test]
    fn tier_prior_without_layer_hint_favors_core_over_longterm() {
        assert!(tier_prior(Tier::Core, None) > tier_prior(Tier::Longterm, None));
    }
}
