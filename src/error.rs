//! Error taxonomy for the core.
//!
//! Recoverable conditions (missing nodes, duplicate paths) get their own
//! variants so callers can branch on them; storage failures are wrapped and
//! propagated. Embedding failures never appear here — they are recovered at
//! the [`crate::manager`] boundary by degrading to FTS-only search.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A tree root id that does not exist in `tree_roots`.
    #[error("tree root not found: {0}")]
    RootNotFound(String),

    /// A tree node id that does not exist in `tree_nodes`.
    #[error("tree node not found: {0}")]
    NodeNotFound(String),

    /// A chunk id that does not exist in `chunks`.
    #[error("chunk not found: {0}")]
    ChunkNotFound(String),

    /// A node insert or subtree move would collide with an existing
    /// `(tree_root_id, path)` pair. Callers may retry with a different path
    /// or treat this as an upsert.
    #[error("duplicate path in tree {root_id}: {path}")]
    DuplicatePath { root_id: String, path: String },

    /// An embedding whose length does not match the dimension the vector
    /// table was created with. Rejected before any row is written.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A subtree move that would create a cycle (new parent is inside the
    /// moved subtree) or cross tree roots.
    #[error("invalid subtree move: {0}")]
    InvalidMove(String),

    /// A name or path filter that is not a valid regular expression.
    #[error("invalid search pattern: {0}")]
    InvalidPattern(String),

    /// Underlying storage failure. Fatal for the current operation, not for
    /// the process.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Malformed JSON in a metadata or tags column.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Map a rusqlite error to [`Error::DuplicatePath`] when it is a UNIQUE
    /// constraint violation on `tree_nodes(tree_root_id, path)`.
    pub(crate) fn from_node_insert(e: rusqlite::Error, root_id: &str, path: &str) -> Self {
        if let rusqlite::Error::SqliteFailure(ref err, _) = e {
            if err.code == rusqlite::ErrorCode::ConstraintViolation {
                return Error::DuplicatePath {
                    root_id: root_id.to_string(),
                    path: path.to_string(),
                };
            }
        }
        Error::Database(e)
    }
}
