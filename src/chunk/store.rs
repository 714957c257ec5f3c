//! Semantic chunk store — CRUD plus full-text and vector search.
//!
//! The write path runs inside a transaction: insert into `chunks`, sync the
//! FTS5 index against the same rowid, and insert the embedding into the vec0
//! table when one is present. Search returns transient
//! [`SemanticSearchResult`] views; fusion of the FTS and vector signals is
//! deferred to [`crate::rank`].

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;

use crate::chunk::types::{MatchType, NewChunk, SemanticChunk, SemanticSearchResult};
use crate::chunk::{embedding_to_bytes, l2_to_cosine};
use crate::error::{Error, Result};

/// Query-time filters and limits, applied after candidate retrieval.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Require every listed tag to be present on the chunk. Empty = no filter.
    pub tags: Vec<String>,
    /// Restrict to chunks from one session.
    pub session_id: Option<String>,
    /// Maximum results per engine.
    pub limit: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            tags: Vec::new(),
            session_id: None,
            limit: 10,
        }
    }
}

/// Insert a new chunk. Assigns a UUID v7 id and timestamp, persists text,
/// tags, metadata, and the optional embedding — all in one transaction.
///
/// An embedding whose length differs from `expected_dim` is rejected before
/// any row is written.
pub fn add_chunk(
    conn: &mut Connection,
    input: NewChunk,
    expected_dim: usize,
) -> Result<SemanticChunk> {
    if let Some(ref emb) = input.embedding {
        if emb.len() != expected_dim {
            return Err(Error::DimensionMismatch {
                expected: expected_dim,
                actual: emb.len(),
            });
        }
    }

    let id = uuid::Uuid::now_v7().to_string();
    let timestamp = input
        .timestamp
        .clone()
        .unwrap_or_else(|| chrono::Utc::now().to_rfc3339());
    let tags_json = serde_json::to_string(&input.tags)?;
    let metadata_json = input
        .metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    let tx = conn.transaction()?;

    tx.execute(
        "INSERT INTO chunks (id, timestamp, text, tags, session_id, source_event_id, \
         source_type, has_embedding, metadata) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            id,
            timestamp,
            input.text,
            tags_json,
            input.session_id,
            input.source_event_id,
            input.source_type,
            input.embedding.is_some(),
            metadata_json,
        ],
    )?;
    let rowid = tx.last_insert_rowid();

    // FTS5 external-content sync must use the same rowid as the chunks row
    tx.execute(
        "INSERT INTO chunks_fts (rowid, text, id) VALUES (?1, ?2, ?3)",
        params![rowid, input.text, id],
    )?;

    if let Some(ref emb) = input.embedding {
        tx.execute(
            "INSERT INTO chunks_vec (id, embedding) VALUES (?1, ?2)",
            params![id, embedding_to_bytes(emb)],
        )?;
    }

    tx.commit()?;

    tracing::debug!(chunk_id = %id, embedded = input.embedding.is_some(), "chunk added");

    Ok(SemanticChunk {
        id,
        timestamp,
        text: input.text,
        tags: input.tags,
        session_id: input.session_id,
        source_event_id: input.source_event_id,
        source_type: input.source_type,
        embedding: input.embedding,
        metadata: input.metadata,
    })
}

/// Fetch a single chunk by id, including its embedding if one is stored.
pub fn get_chunk(conn: &Connection, id: &str) -> Result<Option<SemanticChunk>> {
    let ids = [id];
    let mut map = fetch_chunks(conn, &ids)?;
    Ok(map.remove(id))
}

/// Patch a chunk's metadata. The only mutation allowed after embedding;
/// text, tags, and the embedding itself are immutable.
pub fn patch_metadata(
    conn: &Connection,
    id: &str,
    metadata: &serde_json::Value,
) -> Result<()> {
    let rows = conn.execute(
        "UPDATE chunks SET metadata = ?1 WHERE id = ?2",
        params![serde_json::to_string(metadata)?, id],
    )?;
    if rows == 0 {
        return Err(Error::ChunkNotFound(id.to_string()));
    }
    Ok(())
}

/// FTS5 BM25 keyword search.
///
/// FTS5 rank is negative (more negative = better); scores are negated so
/// higher is better, matching the vector path.
pub fn search_fts(
    conn: &Connection,
    query: &str,
    options: &SearchOptions,
) -> Result<Vec<SemanticSearchResult>> {
    let escaped = escape_fts_query(query);
    if escaped.is_empty() {
        return Ok(Vec::new());
    }

    // Over-fetch so post-filters don't starve the result set
    let candidate_limit = options.limit * 3;
    let mut stmt = conn.prepare(
        "SELECT id, rank FROM chunks_fts WHERE chunks_fts MATCH ?1 ORDER BY rank LIMIT ?2",
    )?;
    let ranked: Vec<(String, f64)> = stmt
        .query_map(params![escaped, candidate_limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    hydrate_and_filter(conn, ranked, options, MatchType::Fts, |rank| -rank)
}

/// Vector KNN search via sqlite-vec, scored by cosine similarity.
pub fn search_vector(
    conn: &Connection,
    embedding: &[f32],
    options: &SearchOptions,
) -> Result<Vec<SemanticSearchResult>> {
    let expected = crate::db::schema::embedding_dimensions(conn)?;
    if embedding.len() != expected {
        return Err(Error::DimensionMismatch {
            expected,
            actual: embedding.len(),
        });
    }

    let candidate_limit = options.limit * 3;
    let mut stmt = conn.prepare(
        "SELECT id, distance FROM chunks_vec WHERE embedding MATCH ?1 \
         ORDER BY distance LIMIT ?2",
    )?;
    let ranked: Vec<(String, f64)> = stmt
        .query_map(
            params![embedding_to_bytes(embedding), candidate_limit as i64],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)),
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    hydrate_and_filter(conn, ranked, options, MatchType::Vector, l2_to_cosine)
}

/// Hybrid search: run FTS and (when a query embedding is supplied) vector
/// search, and return the union tagged [`MatchType::Hybrid`].
///
/// Duplicate ids keep the higher raw score and prefer the variant carrying
/// an embedding. No fusion happens here — that is [`crate::rank::fuse`]'s
/// job on the separately retrieved lists, or the ranking pipeline's on this
/// union.
pub fn search_hybrid(
    conn: &Connection,
    query: &str,
    query_embedding: Option<&[f32]>,
    options: &SearchOptions,
) -> Result<Vec<SemanticSearchResult>> {
    let mut results = search_fts(conn, query, options)?;
    if let Some(emb) = query_embedding {
        results.extend(search_vector(conn, emb, options)?);
    }

    let mut by_id: HashMap<String, SemanticSearchResult> = HashMap::new();
    for mut result in results {
        result.match_type = MatchType::Hybrid;
        match by_id.get_mut(&result.chunk.id) {
            None => {
                by_id.insert(result.chunk.id.clone(), result);
            }
            Some(existing) => {
                if result.score > existing.score {
                    existing.score = result.score;
                }
                if existing.chunk.embedding.is_none() && result.chunk.embedding.is_some() {
                    existing.chunk.embedding = result.chunk.embedding;
                }
            }
        }
    }

    let mut union: Vec<SemanticSearchResult> = by_id.into_values().collect();
    union.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    Ok(union)
}

/// Delete every chunk belonging to a session, including FTS and vector rows.
/// Returns the number of chunks removed.
pub fn delete_by_session(conn: &mut Connection, session_id: &str) -> Result<usize> {
    let tx = conn.transaction()?;

    let doomed: Vec<(i64, String, String)> = {
        let mut stmt = tx.prepare(
            "SELECT rowid, id, text FROM chunks WHERE session_id = ?1",
        )?;
        let rows = stmt
            .query_map(params![session_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows
    };

    for (rowid, id, text) in &doomed {
        // External-content FTS5 requires the special 'delete' insert
        tx.execute(
            "INSERT INTO chunks_fts(chunks_fts, rowid, text, id) VALUES('delete', ?1, ?2, ?3)",
            params![rowid, text, id],
        )?;
        tx.execute("DELETE FROM chunks_vec WHERE id = ?1", params![id])?;
        tx.execute("DELETE FROM chunks WHERE id = ?1", params![id])?;
    }

    tx.commit()?;
    tracing::debug!(session_id, count = doomed.len(), "session chunks deleted");
    Ok(doomed.len())
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Hydrate ranked (id, raw) pairs into full results, apply tag/session
/// post-filters, convert raw scores, and truncate to the option limit.
fn hydrate_and_filter(
    conn: &Connection,
    ranked: Vec<(String, f64)>,
    options: &SearchOptions,
    match_type: MatchType,
    to_score: impl Fn(f64) -> f64,
) -> Result<Vec<SemanticSearchResult>> {
    let ids: Vec<&str> = ranked.iter().map(|(id, _)| id.as_str()).collect();
    let mut chunks = fetch_chunks(conn, &ids)?;

    let mut results = Vec::new();
    for (id, raw) in &ranked {
        let Some(chunk) = chunks.remove(id.as_str()) else {
            continue;
        };
        if let Some(ref session) = options.session_id {
            if chunk.session_id.as_deref() != Some(session.as_str()) {
                continue;
            }
        }
        if !options.tags.iter().all(|t| chunk.tags.contains(t)) {
            continue;
        }
        results.push(SemanticSearchResult {
            chunk,
            score: to_score(*raw),
            match_type,
        });
        if results.len() >= options.limit {
            break;
        }
    }
    Ok(results)
}

/// Batch-fetch chunk records by ids, embeddings included.
pub(crate) fn fetch_chunks(
    conn: &Connection,
    ids: &[&str],
) -> Result<HashMap<String, SemanticChunk>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "SELECT id, timestamp, text, tags, session_id, source_event_id, source_type, \
         has_embedding, metadata FROM chunks WHERE id IN ({})",
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let sql_params: Vec<&dyn rusqlite::types::ToSql> =
        ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();

    let rows = stmt
        .query_map(sql_params.as_slice(), |row| {
            let tags_json: String = row.get(3)?;
            let metadata_str: Option<String> = row.get(8)?;
            Ok(SemanticChunk {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                text: row.get(2)?,
                tags: serde_json::from_str(&tags_json).unwrap_or_default(),
                session_id: row.get(4)?,
                source_event_id: row.get(5)?,
                source_type: row.get(6)?,
                embedding: if row.get::<_, bool>(7)? { Some(Vec::new()) } else { None },
                metadata: metadata_str.and_then(|s| serde_json::from_str(&s).ok()),
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut map = HashMap::new();
    for mut chunk in rows {
        if chunk.embedding.is_some() {
            chunk.embedding = fetch_embedding(conn, &chunk.id)?;
        }
        map.insert(chunk.id.clone(), chunk);
    }
    Ok(map)
}

fn fetch_embedding(conn: &Connection, id: &str) -> Result<Option<Vec<f32>>> {
    let blob: Option<Vec<u8>> = conn
        .query_row(
            "SELECT embedding FROM chunks_vec WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(blob.map(|b| crate::chunk::bytes_to_embedding(&b)))
}

/// Escape a user query for FTS5 MATCH syntax.
///
/// Wraps each whitespace-delimited word in double quotes and joins with spaces
/// so FTS5 treats them as individual terms (implicit AND). Strips empty tokens.
pub(crate) fn escape_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|word| {
            let clean = word.replace('"', "");
            format!("\"{clean}\"")
        })
        .filter(|w| w != "\"\"")
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    const DIM: usize = 8;

    fn test_db() -> Connection {
        db::open_memory_database(DIM).unwrap()
    }

    fn spike(dim: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; DIM];
        v[dim % DIM] = 1.0;
        v
    }

    fn add(conn: &mut Connection, text: &str, emb: Option<Vec<f32>>) -> SemanticChunk {
        let mut input = NewChunk::text(text);
        input.embedding = emb;
        add_chunk(conn, input, DIM).unwrap()
    }

    #[test]
    fn add_and_get_round_trip() {
        let mut conn = test_db();
        let mut input = NewChunk::text("apple pie recipe");
        input.tags = vec!["food".into()];
        input.session_id = Some("s1".into());
        input.embedding = Some(spike(0));
        input.metadata = Some(serde_json::json!({"lang": "en"}));

        let chunk = add_chunk(&mut conn, input, DIM).unwrap();
        let fetched = get_chunk(&conn, &chunk.id).unwrap().unwrap();

        assert_eq!(fetched.text, "apple pie recipe");
        assert_eq!(fetched.tags, vec!["food".to_string()]);
        assert_eq!(fetched.session_id.as_deref(), Some("s1"));
        assert_eq!(fetched.embedding.unwrap(), spike(0));
        assert_eq!(fetched.metadata.unwrap()["lang"], "en");
    }

    #[test]
    fn get_missing_chunk_returns_none() {
        let conn = test_db();
        assert!(get_chunk(&conn, "nope").unwrap().is_none());
    }

    #[test]
    fn rejects_wrong_dimension_before_insert() {
        let mut conn = test_db();
        let mut input = NewChunk::text("bad embedding");
        input.embedding = Some(vec![1.0; DIM + 1]);

        let err = add_chunk(&mut conn, input, DIM).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 8, actual: 9 }));

        // Nothing was written
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn fts_search_finds_keywords() {
        let mut conn = test_db();
        let hit = add(&mut conn, "rocket launch schedule", None);
        add(&mut conn, "apple pie recipe", None);

        let results = search_fts(&conn, "rocket", &SearchOptions::default()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.id, hit.id);
        assert_eq!(results[0].match_type, MatchType::Fts);
        assert!(results[0].score > 0.0, "negated BM25 rank should be positive");
    }

    #[test]
    fn vector_search_orders_by_similarity() {
        let mut conn = test_db();
        let near = add(&mut conn, "near", Some(spike(0)));
        let far = add(&mut conn, "far", Some(spike(4)));

        let results = search_vector(&conn, &spike(0), &SearchOptions::default()).unwrap();
        assert_eq!(results[0].chunk.id, near.id);
        assert!(results[0].score > 0.99);
        let far_score = results.iter().find(|r| r.chunk.id == far.id).unwrap().score;
        assert!(far_score < 0.01);
    }

    #[test]
    fn vector_search_rejects_wrong_dimension() {
        let conn = test_db();
        let err = search_vector(&conn, &[1.0; 3], &SearchOptions::default()).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
    }

    #[test]
    fn tag_and_session_filters_apply() {
        let mut conn = test_db();
        let mut a = NewChunk::text("tagged chunk about rust");
        a.tags = vec!["code".into(), "rust".into()];
        a.session_id = Some("s1".into());
        let a = add_chunk(&mut conn, a, DIM).unwrap();

        let mut b = NewChunk::text("untagged chunk about rust");
        b.session_id = Some("s2".into());
        add_chunk(&mut conn, b, DIM).unwrap();

        let options = SearchOptions {
            tags: vec!["rust".into()],
            session_id: Some("s1".into()),
            limit: 10,
        };
        let results = search_fts(&conn, "rust", &options).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.id, a.id);
    }

    #[test]
    fn hybrid_union_tags_and_dedupes() {
        let mut conn = test_db();
        // Matches both engines
        let both = add(&mut conn, "apple pie recipe", Some(spike(0)));
        // FTS only (no embedding)
        let fts_only = add(&mut conn, "apple tart", None);
        // Vector only (no keyword overlap)
        let vec_only = add(&mut conn, "rocket launch", Some(spike(1)));

        let results =
            search_hybrid(&conn, "apple", Some(&spike(0)), &SearchOptions::default()).unwrap();

        let ids: Vec<&str> = results.iter().map(|r| r.chunk.id.as_str()).collect();
        assert!(ids.contains(&both.id.as_str()));
        assert!(ids.contains(&fts_only.id.as_str()));
        assert!(ids.contains(&vec_only.id.as_str()));
        // One entry per id, all tagged hybrid
        assert_eq!(ids.len(), 3);
        assert!(results.iter().all(|r| r.match_type == MatchType::Hybrid));
    }

    #[test]
    fn hybrid_without_embedding_is_fts_only() {
        let mut conn = test_db();
        add(&mut conn, "apple pie recipe", Some(spike(0)));
        let results =
            search_hybrid(&conn, "apple", None, &SearchOptions::default()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].match_type, MatchType::Hybrid);
    }

    #[test]
    fn delete_by_session_removes_all_rows() {
        let mut conn = test_db();
        let mut a = NewChunk::text("session chunk one");
        a.session_id = Some("doomed".into());
        a.embedding = Some(spike(0));
        add_chunk(&mut conn, a, DIM).unwrap();
        let mut b = NewChunk::text("session chunk two");
        b.session_id = Some("doomed".into());
        add_chunk(&mut conn, b, DIM).unwrap();
        let keep = add(&mut conn, "survivor chunk", Some(spike(2)));

        let deleted = delete_by_session(&mut conn, "doomed").unwrap();
        assert_eq!(deleted, 2);

        let remaining: i64 = conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |r| r.get(0))
            .unwrap();
        assert_eq!(remaining, 1);
        let vec_rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM chunks_vec", [], |r| r.get(0))
            .unwrap();
        assert_eq!(vec_rows, 1); // only the survivor's embedding remains
        assert!(get_chunk(&conn, &keep.id).unwrap().is_some());

        // FTS rows are gone too
        let fts_hits = search_fts(&conn, "session", &SearchOptions::default()).unwrap();
        assert!(fts_hits.is_empty());
    }

    #[test]
    fn patch_metadata_updates_only_metadata() {
        let mut conn = test_db();
        let chunk = add(&mut conn, "patchable", None);
        patch_metadata(&conn, &chunk.id, &serde_json::json!({"reviewed": true})).unwrap();

        let fetched = get_chunk(&conn, &chunk.id).unwrap().unwrap();
        assert_eq!(fetched.metadata.unwrap()["reviewed"], true);
        assert_eq!(fetched.text, "patchable");

        let err = patch_metadata(&conn, "missing", &serde_json::json!({})).unwrap_err();
        assert!(matches!(err, Error::ChunkNotFound(_)));
    }

    #[test]
    fn escape_fts_query_quotes_terms() {
        assert_eq!(escape_fts_query("hello world"), "\"hello\" \"world\"");
        assert_eq!(escape_fts_query("rust OR python"), "\"rust\" \"OR\" \"python\"");
        assert_eq!(escape_fts_query("  spaces  "), "\"spaces\"");
        assert_eq!(escape_fts_query(""), "");
    }
}
