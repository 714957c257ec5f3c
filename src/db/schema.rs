//! SQL DDL for all trellis tables.
//!
//! Defines the `chunks`, `chunks_fts` (FTS5), `chunks_vec` (vec0),
//! `embedding_cache`, `tree_roots`, `tree_nodes`, `tree_closure`, and
//! `schema_meta` tables. All DDL uses `IF NOT EXISTS` for idempotent
//! initialization. The vec0 table dimension is fixed at init time from
//! configuration and recorded in `schema_meta`.

use rusqlite::Connection;

/// All schema DDL statements for the core tables.
const SCHEMA_SQL: &str = r#"
-- Semantic chunk storage
CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    timestamp TEXT NOT NULL,
    text TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '[]',
    session_id TEXT,
    source_event_id TEXT,
    source_type TEXT,
    has_embedding INTEGER NOT NULL DEFAULT 0,
    metadata TEXT
);

CREATE INDEX IF NOT EXISTS idx_chunks_timestamp ON chunks(timestamp);
CREATE INDEX IF NOT EXISTS idx_chunks_session ON chunks(session_id);

-- Full-text search (BM25)
CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
    text,
    id UNINDEXED,
    content='chunks',
    content_rowid='rowid'
);

-- Embedding cache, keyed by (sha256(text), provider, model)
CREATE TABLE IF NOT EXISTS embedding_cache (
    hash TEXT NOT NULL,
    provider TEXT NOT NULL,
    model TEXT NOT NULL,
    embedding BLOB NOT NULL,
    dimensions INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    accessed_at TEXT NOT NULL,
    PRIMARY KEY (hash, provider, model)
);

CREATE INDEX IF NOT EXISTS idx_cache_accessed ON embedding_cache(accessed_at);
CREATE INDEX IF NOT EXISTS idx_cache_created ON embedding_cache(created_at);

-- Tree roots: one per logical hierarchy (a repo, a document, a task plan)
CREATE TABLE IF NOT EXISTS tree_roots (
    id TEXT PRIMARY KEY,
    tree_type TEXT NOT NULL CHECK(tree_type IN ('code','doc','event','task')),
    name TEXT NOT NULL,
    root_path TEXT NOT NULL,
    metadata TEXT,
    created_at TEXT NOT NULL
);

-- Tree nodes: structural (no chunk) or content (chunk_id set)
CREATE TABLE IF NOT EXISTS tree_nodes (
    id TEXT PRIMARY KEY,
    tree_root_id TEXT NOT NULL REFERENCES tree_roots(id) ON DELETE CASCADE,
    node_type TEXT NOT NULL,
    name TEXT NOT NULL,
    path TEXT NOT NULL,
    parent_id TEXT,
    depth INTEGER NOT NULL,
    sort_order INTEGER NOT NULL DEFAULT 0,
    chunk_id TEXT,
    metadata TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (tree_root_id, path)
);

CREATE INDEX IF NOT EXISTS idx_nodes_root ON tree_nodes(tree_root_id);
CREATE INDEX IF NOT EXISTS idx_nodes_parent ON tree_nodes(parent_id);
CREATE INDEX IF NOT EXISTS idx_nodes_chunk ON tree_nodes(chunk_id);

-- Closure table: every (ancestor, descendant) pair including depth=0 self-pairs
CREATE TABLE IF NOT EXISTS tree_closure (
    ancestor_id TEXT NOT NULL,
    descendant_id TEXT NOT NULL,
    depth INTEGER NOT NULL,
    PRIMARY KEY (ancestor_id, descendant_id)
);

CREATE INDEX IF NOT EXISTS idx_closure_descendant ON tree_closure(descendant_id);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
///
/// `embedding_dim` fixes the vec0 table width; it is recorded in
/// `schema_meta` so later opens can detect a mismatched configuration.
pub fn init_schema(conn: &Connection, embedding_dim: usize) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // vec0 virtual table must be created separately (sqlite-vec syntax)
    conn.execute_batch(&format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS chunks_vec USING vec0(\n\
         id TEXT PRIMARY KEY,\n\
         embedding FLOAT[{embedding_dim}]\n\
         );"
    ))?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('embedding_dimensions', ?1)",
        [embedding_dim.to_string()],
    )?;

    Ok(())
}

/// Read the embedding dimension the vec table was created with.
pub fn embedding_dimensions(conn: &Connection) -> rusqlite::Result<usize> {
    conn.query_row(
        "SELECT value FROM schema_meta WHERE key = 'embedding_dimensions'",
        [],
        |row| {
            let val: String = row.get(0)?;
            Ok(val.parse::<usize>().unwrap_or(0))
        },
    )
}
