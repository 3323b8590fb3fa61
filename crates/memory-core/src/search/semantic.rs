//! Local TF-IDF / n-gram semantic search engine (§4.3).
//!
//! Runs entirely in-process against a snapshot of the corpus — no external
//! embedding model is used (non-goal, §1). The design notes explicitly
//! permit swapping the spec's naive "oldest 20%" cache eviction for a
//! proper LRU without changing externally observable behaviour, so the
//! caches here use the `lru` crate directly.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use lru::LruCache;

use crate::memory::{MatchType, Memory, SearchHit, Tier};

const CACHE_CAPACITY: usize = 1000;
const INDEX_STALE_AFTER: chrono::Duration = chrono::Duration::minutes(5);
const FAST_MODE_CAP: usize = 100;
const FAST_MODE_EARLY_EXIT: f64 = 0.05;

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "if", "then", "else", "of", "to", "in", "on", "at",
    "for", "with", "by", "from", "as", "is", "are", "was", "were", "be", "been", "being", "have",
    "has", "had", "do", "does", "did", "will", "would", "shall", "should", "may", "might",
    "must", "can", "could", "this", "that", "these", "those", "it", "its",
];

fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let normalized: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    normalized
        .split_whitespace()
        .filter(|t| t.len() > 2 && !STOPWORDS.contains(t))
        .map(|t| t.to_string())
        .collect()
}

fn ngrams(tokens: &[String], n: usize) -> HashSet<String> {
    if tokens.len() < n {
        return HashSet::new();
    }
    tokens
        .windows(n)
        .map(|w| w.join(" "))
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

#[derive(Debug, Clone)]
struct DocVector {
    memory: Memory,
    vector: HashMap<String, f64>,
    magnitude: f64,
    tokens: Vec<String>,
}

/// Core is always-resident and priority-boosted in ranking (glossary,
/// §8 "Tier-prior monotonicity") — strictly greater than longterm's prior.
fn tier_prior(tier: Tier) -> f64 {
    match tier {
        Tier::Core => 1.2,
        Tier::Longterm => 1.0,
    }
}

pub struct SemanticEngine {
    documents: HashMap<String, DocVector>,
    idf_scores: HashMap<String, f64>,
    ngram_index: HashMap<String, HashSet<String>>,
    vector_cache: Mutex<LruCache<String, HashMap<String, f64>>>,
    query_cache: Mutex<LruCache<String, Vec<SearchHit>>>,
    last_index_update: DateTime<Utc>,
    corpus_size: usize,
}

impl Default for SemanticEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SemanticEngine {
    pub fn new() -> Self {
        Self {
            documents: HashMap::new(),
            idf_scores: HashMap::new(),
            ngram_index: HashMap::new(),
            vector_cache: Mutex::new(LruCache::new(NonZeroUsize::new(CACHE_CAPACITY).unwrap())),
            query_cache: Mutex::new(LruCache::new(NonZeroUsize::new(CACHE_CAPACITY).unwrap())),
            last_index_update: Utc::now() - chrono::Duration::hours(1),
            corpus_size: 0,
        }
    }

    pub fn needs_rebuild(&self, current_corpus_size: usize) -> bool {
        current_corpus_size != self.corpus_size
            || Utc::now() - self.last_index_update > INDEX_STALE_AFTER
    }

    /// Recomputes the vocabulary, IDF scores, n-gram index, and per-document
    /// TF-IDF vectors from scratch (§4.3 "Indexing").
    pub fn build_index(&mut self, memories: Vec<Memory>) {
        self.documents.clear();
        self.idf_scores.clear();
        self.ngram_index.clear();
        self.vector_cache.lock().unwrap().clear();
        self.query_cache.lock().unwrap().clear();

        let tokenized: Vec<(Memory, Vec<String>)> = memories
            .into_iter()
            .map(|m| {
                let tokens = tokenize(&m.content);
                (m, tokens)
            })
            .collect();

        let n = tokenized.len().max(1);
        let mut document_frequency: HashMap<String, usize> = HashMap::new();
        for (_, tokens) in &tokenized {
            let unique: HashSet<&String> = tokens.iter().collect();
            for term in unique {
                *document_frequency.entry(term.clone()).or_insert(0) += 1;
            }
        }
        for (term, df) in &document_frequency {
            self.idf_scores
                .insert(term.clone(), ((n as f64) / (1.0 + *df as f64)).ln());
        }

        for (memory, tokens) in tokenized {
            let mut term_counts: HashMap<String, usize> = HashMap::new();
            for t in &tokens {
                *term_counts.entry(t.clone()).or_insert(0) += 1;
            }
            let doc_len = tokens.len().max(1) as f64;
            let mut vector = HashMap::new();
            for (term, count) in &term_counts {
                let tf = *count as f64 / doc_len;
                let idf = self.idf_scores.get(term).copied().unwrap_or(0.0);
                vector.insert(term.clone(), tf * idf);
            }
            let magnitude = vector.values().map(|v| v * v).sum::<f64>().sqrt();

            for size in [2usize, 3usize] {
                for gram in ngrams(&tokens, size) {
                    self.ngram_index
                        .entry(gram)
                        .or_default()
                        .insert(memory.id.clone());
                }
            }

            self.documents.insert(
                memory.id.clone(),
                DocVector {
                    memory,
                    vector,
                    magnitude,
                    tokens,
                },
            );
        }

        self.corpus_size = self.documents.len();
        self.last_index_update = Utc::now();
    }

    fn query_vector(&self, query_tokens: &[String]) -> (HashMap<String, f64>, f64) {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for t in query_tokens {
            *counts.entry(t.clone()).or_insert(0) += 1;
        }
        let len = query_tokens.len().max(1) as f64;
        let mut vector = HashMap::new();
        for (term, count) in counts {
            let tf = count as f64 / len;
            let idf = self.idf_scores.get(&term).copied().unwrap_or(0.0);
            vector.insert(term, tf * idf);
        }
        let magnitude = vector.values().map(|v| v * v).sum::<f64>().sqrt();
        (vector, magnitude)
    }

    fn cosine(a: &HashMap<String, f64>, a_mag: f64, b: &HashMap<String, f64>, b_mag: f64) -> f64 {
        if a_mag == 0.0 || b_mag == 0.0 {
            return 0.0;
        }
        let (smaller, larger) = if a.len() < b.len() { (a, b) } else { (b, a) };
        let dot: f64 = smaller
            .iter()
            .filter_map(|(term, v)| larger.get(term).map(|w| v * w))
            .sum();
        dot / (a_mag * b_mag)
    }

    /// Runs a semantic query against the current index (§4.3 "Query").
    pub fn search(
        &self,
        query: &str,
        limit: usize,
        min_score: f64,
        use_ngrams: bool,
        fast_mode: bool,
    ) -> Vec<SearchHit> {
        let cache_key = format!("{query}|{limit}|{min_score}|{use_ngrams}|{fast_mode}|{}", self.corpus_size);
        if let Some(cached) = self.query_cache.lock().unwrap().get(&cache_key) {
            return cached.clone();
        }

        let query_tokens = tokenize(query);
        let cached_vector = self.vector_cache.lock().unwrap().get(query).cloned();
        let (q_vector, q_mag) = match cached_vector {
            Some(v) => {
                let mag = v.values().map(|x| x * x).sum::<f64>().sqrt();
                (v, mag)
            }
            None => {
                let computed = self.query_vector(&query_tokens);
                self.vector_cache
                    .lock()
                    .unwrap()
                    .put(query.to_string(), computed.0.clone());
                computed
            }
        };
        let q_ngrams2 = ngrams(&query_tokens, 2);
        let q_ngrams3 = ngrams(&query_tokens, 3);
        let now = Utc::now();

        let mut candidates: Vec<&DocVector> = self.documents.values().collect();
        if fast_mode && candidates.len() > FAST_MODE_CAP {
            candidates.truncate(FAST_MODE_CAP);
        }

        let mut scored: Vec<SearchHit> = Vec::new();
        for doc in candidates {
            let cosine = Self::cosine(&q_vector, q_mag, &doc.vector, doc.magnitude);
            if fast_mode && cosine < FAST_MODE_EARLY_EXIT {
                continue;
            }
            let mut score = 100.0 * cosine;

            if use_ngrams && cosine > 0.1 {
                let d_ngrams2 = ngrams(&doc.tokens, 2);
                let d_ngrams3 = ngrams(&doc.tokens, 3);
                let mean_jaccard =
                    (jaccard(&q_ngrams2, &d_ngrams2) + jaccard(&q_ngrams3, &d_ngrams3)) / 2.0;
                score += 50.0 * mean_jaccard;
            }

            let content_lower = doc.memory.content.to_lowercase();
            let query_lower = query.to_lowercase();
            let exact_occurrences = if query_lower.is_empty() {
                0
            } else {
                content_lower.matches(&query_lower).count()
            };
            score += 25.0 * exact_occurrences as f64;

            let tag_tokens: HashSet<String> = doc
                .memory
                .tags
                .iter()
                .flat_map(|t| tokenize(t))
                .collect();
            let overlap = if query_tokens.is_empty() {
                0.0
            } else {
                query_tokens.iter().filter(|t| tag_tokens.contains(*t)).count() as f64
                    / query_tokens.len() as f64
            };
            score += 30.0 * overlap;

            let days_since_access =
                (now - doc.memory.accessed_at).num_seconds() as f64 / 86400.0;
            let recency = 1.0 + 0.2 * (1.0 - days_since_access / 30.0).max(0.0);
            let frequency = 1.0 + 0.1 * (doc.memory.access_count as f64 + 1.0).log10();
            score *= tier_prior(doc.memory.tier) * recency * frequency;

            if score < min_score {
                continue;
            }

            let match_type = if exact_occurrences > 0 {
                MatchType::Exact
            } else if cosine > 0.3 {
                MatchType::Semantic
            } else {
                MatchType::Fuzzy
            };

            scored.push(SearchHit {
                memory: doc.memory.clone(),
                score,
                match_type,
            });
        }

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        self.query_cache.lock().unwrap().put(cache_key, scored.clone());
        scored
    }

    /// Drops vocabulary terms appearing in fewer than 2% of documents
    /// (minimum 1 document), then clears caches.
    pub fn optimize(&mut self) {
        let n = self.documents.len().max(1);
        let threshold = ((n as f64) * 0.02).max(1.0) as usize;

        let mut document_frequency: HashMap<String, usize> = HashMap::new();
        for doc in self.documents.values() {
            let unique: HashSet<&String> = doc.tokens.iter().collect();
            for term in unique {
                *document_frequency.entry(term.clone()).or_insert(0) += 1;
            }
        }
        let sparse_terms: HashSet<String> = document_frequency
            .into_iter()
            .filter(|(_, df)| *df < threshold)
            .map(|(term, _)| term)
            .collect();

        self.idf_scores.retain(|term, _| !sparse_terms.contains(term));
        for doc in self.documents.values_mut() {
            doc.vector.retain(|term, _| !sparse_terms.contains(term));
            doc.magnitude = doc.vector.values().map(|v| v * v).sum::<f64>().sqrt();
        }

        self.vector_cache.lock().unwrap().clear();
        self.query_cache.lock().unwrap().clear();
    }

    /// Content/tag similarity between two already-indexed memories, used by
    /// cascade delete (content weight 0.7, tag weight 0.3, §4.1).
    pub fn similarity(&self, a_id: &str, b_id: &str) -> f64 {
        let (Some(a), Some(b)) = (self.documents.get(a_id), self.documents.get(b_id)) else {
            return 0.0;
        };
        Self::weighted_similarity(&a.vector, a.magnitude, &a.memory.tags, &b.vector, b.magnitude, &b.memory.tags)
    }

    /// Same content/tag-weighted similarity as [`Self::similarity`], but
    /// against content/tags that are not yet indexed (used by
    /// `check_duplicate`, which runs before the candidate would be stored).
    pub fn similarity_to_content(&self, content: &str, tags: &[String], other_id: &str) -> f64 {
        let Some(other) = self.documents.get(other_id) else {
            return 0.0;
        };
        let tokens = tokenize(content);
        let (vector, magnitude) = self.query_vector(&tokens);
        Self::weighted_similarity(&vector, magnitude, tags, &other.vector, other.magnitude, &other.memory.tags)
    }

    fn weighted_similarity(
        a_vector: &HashMap<String, f64>,
        a_magnitude: f64,
        a_tags: &[String],
        b_vector: &HashMap<String, f64>,
        b_magnitude: f64,
        b_tags: &[String],
    ) -> f64 {
        let content_sim = Self::cosine(a_vector, a_magnitude, b_vector, b_magnitude);
        let a_tags: HashSet<&String> = a_tags.iter().collect();
        let b_tags: HashSet<&String> = b_tags.iter().collect();
        let tag_sim = if a_tags.is_empty() && b_tags.is_empty() {
            0.0
        } else {
            let inter = a_tags.intersection(&b_tags).count() as f64;
            let union = a_tags.union(&b_tags).count() as f64;
            if union == 0.0 { 0.0 } else { inter / union }
        };
        0.7 * content_sim + 0.3 * tag_sim
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn memory(id: &str, content: &str) -> Memory {
        Memory {
            id: id.to_string(),
            content: content.to_string(),
            tier: Tier::Core,
            scope: crate::memory::Scope::Global,
            project_id: None,
            tags: vec![],
            metadata: Map::new(),
            content_size: content.len() as i64,
            created_at: Utc::now(),
            accessed_at: Utc::now(),
            access_count: 0,
        }
    }

    #[test]
    fn tokenize_drops_stopwords_and_short_tokens() {
        let tokens = tokenize("The cat is on a mat");
        assert!(!tokens.contains(&"the".to_string()));
        assert!(!tokens.contains(&"is".to_string()));
        assert!(!tokens.contains(&"on".to_string()));
        assert!(tokens.contains(&"cat".to_string()));
        assert!(tokens.contains(&"mat".to_string()));
    }

    #[test]
    fn identical_queries_return_identical_ordering() {
        let mut engine = SemanticEngine::new();
        engine.build_index(vec![
            memory("1", "rust programming language patterns"),
            memory("2", "python scripting for automation"),
        ]);
        let first = engine.search("rust programming", 10, 0.0, true, false);
        let second = engine.search("rust programming", 10, 0.0, true, false);
        let first_ids: Vec<_> = first.iter().map(|h| h.memory.id.clone()).collect();
        let second_ids: Vec<_> = second.iter().map(|h| h.memory.id.clone()).collect();
        assert_eq!(first_ids, second_ids);
    }

    #[test]
    fn optimize_drops_rare_terms() {
        let mut engine = SemanticEngine::new();
        let docs: Vec<Memory> = (0..10)
            .map(|i| memory(&i.to_string(), "common shared term appears everywhere"))
            .collect();
        engine.build_index(docs);
        engine.optimize();
        // "common" appears in all docs, so it must survive the 2% cutoff.
        assert!(engine.idf_scores.contains_key("common"));
    }

    #[test]
    fn jaccard_is_symmetric_and_bounded() {
        let a: HashSet<String> = ["a b", "b c"].iter().map(|s| s.to_string()).collect();
        let b: HashSet<String> = ["b c", "c d"].iter().map(|s| s.to_string()).collect();
        let score = jaccard(&a, &b);
        assert!((0.0..=1.0).contains(&score));
        assert_eq!(jaccard(&a, &b), jaccard(&b, &a));
    }
}
