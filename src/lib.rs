//! Trellis: an embedded retrieval core for AI agents.
//!
//! Everything lives in one SQLite database: chunk text with FTS5 keyword
//! and [sqlite-vec](https://github.com/asg017/sqlite-vec) vector indexes,
//! a TTL+LRU embedding cache, and closure-table hierarchies over the
//! chunks. On top sit a deterministic ranking pipeline (weighted
//! reciprocal-rank fusion, temporal decay, MMR diversity) and a
//! strict-priority token budget for context assembly.
//!
//! # Modules
//!
//! - [`config`] — Configuration loading from TOML files and environment variables
//! - [`db`] — SQLite initialization, schema, and migrations
//! - [`chunk`] — Semantic chunk store: FTS, vector, and hybrid search
//! - [`embedding`] — Provider trait and the persistent embedding cache
//! - [`rank`] — Fusion, decay, and diversity ranking stages
//! - [`tree`] — Closure-table hierarchies and structure-aware search
//! - [`budget`] — Token estimation and layered budget allocation
//! - [`manager`] — [`KnowledgeManager`], the composition root
//!
//! [`manager::KnowledgeManager`] is the intended entry point; the
//! submodules are public for callers composing the pieces themselves.

pub mod budget;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod manager;
pub mod rank;
pub mod tree;

pub use config::TrellisConfig;
pub use error::{Error, Result};
pub use manager::KnowledgeManager;
