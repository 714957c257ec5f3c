//! Closure-table tree index over semantic chunks.
//!
//! Hierarchies (code, doc, event, task) are stored as nodes plus a closure
//! table holding one row per (ancestor, descendant) pair, so subtree and
//! ancestor-chain queries are single indexed scans. Content nodes link to
//! rows in the chunk store via `chunk_id`; [`search`] scopes chunk search
//! results to tree structure.

pub mod path;
pub mod search;
pub mod store;
pub mod types;
