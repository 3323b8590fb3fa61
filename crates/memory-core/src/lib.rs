//! # Unified Memory Store
//!
//! A persistent, content-addressable memory store for AI coding assistants.
//! Memories are organized along two orthogonal axes:
//!
//! - **Tier**: `core` (small, always-resident, ≤2 KiB per item) or
//!   `longterm` (unbounded).
//! - **Scope**: `global` (cross-project) or `project` (bound to a single
//!   project).
//!
//! Four subsystems compose the engine:
//!
//! - [`storage::Store`] — CRUD, tier/scope invariants, duplicate detection,
//!   migration, and aggregate analytics.
//! - [`search::Bm25Engine`] — a BM25 full-text index layered over a virtual
//!   FTS table, with field weighting and recency/frequency/tier priors.
//! - [`search::SemanticEngine`] — a local TF-IDF/n-gram index with an
//!   in-process inverted index and query/result caches. No external
//!   embedding model is used.
//! - [`analyzer::BehavioralAnalyzer`] and [`lifecycle::LifecycleManager`] —
//!   access-log-driven frequency/regularity scoring, tier recommendation,
//!   and promote/demote/archive actions.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use memory_core::config::Config;
//! use memory_core::memory::{Scope, StoreInput, Tier};
//! use memory_core::storage::Store;
//! use std::collections::HashMap;
//!
//! let config = Config::default_for_home()?;
//! let store = Store::open(&config)?;
//! let result = store.store(StoreInput {
//!     content: "User prefers dark theme".to_string(),
//!     tier: Tier::Core,
//!     scope: Scope::Global,
//!     project_id: None,
//!     tags: vec!["theme".to_string()],
//!     metadata: HashMap::new(),
//! })?;
//! println!("stored {}", result.id);
//! # Ok::<(), memory_core::error::MemoryError>(())
//! ```

pub mod analyzer;
pub mod config;
pub mod error;
pub mod id;
pub mod lifecycle;
pub mod memory;
pub mod search;
pub mod storage;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports for consumers of this crate.
pub mod prelude {
    pub use crate::analyzer::{BehavioralAnalyzer, BehavioralInsights, LearningPhase};
    pub use crate::config::Config;
    pub use crate::error::{MemoryError, Result};
    pub use crate::lifecycle::{LifecycleManager, LifecycleReport};
    pub use crate::memory::{
        AccessEvent, AccessType, Analytics, BehavioralPattern, MatchType, Memory, MemoryStats,
        Scope, SearchFilter, SearchHit, StoreInput, Tier,
    };
    pub use crate::search::{Bm25Engine, Bm25Query, SemanticEngine};
    pub use crate::storage::Store;
}
