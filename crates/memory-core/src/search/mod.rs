//! Search subsystems: the BM25 full-text engine (§4.2) and the local
//! TF-IDF/n-gram semantic engine (§4.3).

pub mod bm25;
pub mod semantic;

pub use bm25::{sanitize_fts5_query, Bm25Engine, Bm25Query, FieldWeights};
pub use semantic::SemanticEngine;
