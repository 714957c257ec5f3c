//! Hash-keyed embedding cache with TTL + LRU eviction.
//!
//! Keyed by `(sha256(text), provider, model)` so identical text always
//! collides regardless of call site. TTL is checked lazily on read — an
//! expired row is deleted and treated as a miss. [`prune`] does the eager
//! sweep: expired rows first, then oldest-`accessed_at` rows until the table
//! is back at `max_entries`. [`set`] auto-prunes once the table exceeds
//! `max_entries * 1.10`, amortizing eviction across many writes.
//!
//! The cache is a pure cost optimization: a caller that skips it must still
//! get correct behavior, only with more real embedding calls.

use chrono::{Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::chunk::{bytes_to_embedding, embedding_to_bytes};
use crate::config::CacheConfig;
use crate::error::Result;

/// Counts reported by [`prune`].
#[derive(Debug, Serialize)]
pub struct PruneResult {
    pub expired: usize,
    pub evicted: usize,
}

/// Snapshot reported by [`stats`].
#[derive(Debug, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub oldest_access: Option<String>,
    pub newest_access: Option<String>,
}

/// Hex SHA-256 of the raw text — the first component of the cache key.
pub fn text_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

fn expiry_cutoff(config: &CacheConfig) -> String {
    (Utc::now() - Duration::milliseconds(config.ttl_ms)).to_rfc3339()
}

/// Look up a cached embedding. Expired rows are deleted and reported as a
/// miss; hits get their `accessed_at` bumped.
pub fn get(
    conn: &Connection,
    text: &str,
    provider: &str,
    model: &str,
    config: &CacheConfig,
) -> Result<Option<Vec<f32>>> {
    let hash = text_hash(text);
    let row: Option<(Vec<u8>, String)> = conn
        .query_row(
            "SELECT embedding, created_at FROM embedding_cache \
             WHERE hash = ?1 AND provider = ?2 AND model = ?3",
            params![hash, provider, model],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let Some((blob, created_at)) = row else {
        return Ok(None);
    };

    if created_at < expiry_cutoff(config) {
        conn.execute(
            "DELETE FROM embedding_cache WHERE hash = ?1 AND provider = ?2 AND model = ?3",
            params![hash, provider, model],
        )?;
        return Ok(None);
    }

    conn.execute(
        "UPDATE embedding_cache SET accessed_at = ?1 \
         WHERE hash = ?2 AND provider = ?3 AND model = ?4",
        params![Utc::now().to_rfc3339(), hash, provider, model],
    )?;
    Ok(Some(bytes_to_embedding(&blob)))
}

/// Store an embedding. Replaces any live row for the same key, then prunes
/// if the table has grown past `max_entries * 1.10`.
pub fn set(
    conn: &mut Connection,
    text: &str,
    embedding: &[f32],
    provider: &str,
    model: &str,
    config: &CacheConfig,
) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT OR REPLACE INTO embedding_cache \
         (hash, provider, model, embedding, dimensions, created_at, accessed_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![
            text_hash(text),
            provider,
            model,
            embedding_to_bytes(embedding),
            embedding.len() as i64,
            now,
        ],
    )?;

    maybe_prune(conn, config)?;
    Ok(())
}

/// Batch lookup: hashes every input up front and issues one bulk read.
/// Output order matches input order; expired rows are misses.
pub fn get_batch(
    conn: &Connection,
    texts: &[&str],
    provider: &str,
    model: &str,
    config: &CacheConfig,
) -> Result<Vec<Option<Vec<f32>>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let hashes: Vec<String> = texts.iter().map(|t| text_hash(t)).collect();
    let placeholders: Vec<String> = (3..3 + hashes.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "SELECT hash, embedding, created_at FROM embedding_cache \
         WHERE provider = ?1 AND model = ?2 AND hash IN ({})",
        placeholders.join(", ")
    );

    let mut sql_params: Vec<&dyn rusqlite::types::ToSql> = vec![&provider, &model];
    for h in &hashes {
        sql_params.push(h);
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows: Vec<(String, Vec<u8>, String)> = stmt
        .query_map(sql_params.as_slice(), |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let cutoff = expiry_cutoff(config);
    let now = Utc::now().to_rfc3339();
    let mut live: HashMap<String, Vec<f32>> = HashMap::new();
    for (hash, blob, created_at) in rows {
        if created_at < cutoff {
            conn.execute(
                "DELETE FROM embedding_cache WHERE hash = ?1 AND provider = ?2 AND model = ?3",
                params![hash, provider, model],
            )?;
        } else {
            conn.execute(
                "UPDATE embedding_cache SET accessed_at = ?1 \
                 WHERE hash = ?2 AND provider = ?3 AND model = ?4",
                params![now, hash, provider, model],
            )?;
            live.insert(hash, bytes_to_embedding(&blob));
        }
    }

    Ok(hashes.iter().map(|h| live.get(h).cloned()).collect())
}

/// Batch store inside a single transaction, followed by at most one prune.
pub fn set_batch(
    conn: &mut Connection,
    entries: &[(&str, &[f32])],
    provider: &str,
    model: &str,
    config: &CacheConfig,
) -> Result<()> {
    if entries.is_empty() {
        return Ok(());
    }

    let now = Utc::now().to_rfc3339();
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO embedding_cache \
             (hash, provider, model, embedding, dimensions, created_at, accessed_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        )?;
        for (text, embedding) in entries {
            stmt.execute(params![
                text_hash(text),
                provider,
                model,
                embedding_to_bytes(embedding),
                embedding.len() as i64,
                now,
            ])?;
        }
    }
    tx.commit()?;

    maybe_prune(conn, config)?;
    Ok(())
}

/// Direct existence check — no TTL logic, no access bump.
pub fn has(conn: &Connection, text: &str, provider: &str, model: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM embedding_cache \
         WHERE hash = ?1 AND provider = ?2 AND model = ?3",
        params![text_hash(text), provider, model],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Direct delete. Returns whether a row was removed.
pub fn delete(conn: &Connection, text: &str, provider: &str, model: &str) -> Result<bool> {
    let rows = conn.execute(
        "DELETE FROM embedding_cache WHERE hash = ?1 AND provider = ?2 AND model = ?3",
        params![text_hash(text), provider, model],
    )?;
    Ok(rows > 0)
}

/// Eager sweep: delete all rows older than the TTL, then evict
/// oldest-`accessed_at` rows until the table is back at `max_entries`.
pub fn prune(conn: &mut Connection, config: &CacheConfig) -> Result<PruneResult> {
    let tx = conn.transaction()?;

    let expired = tx.execute(
        "DELETE FROM embedding_cache WHERE created_at < ?1",
        params![expiry_cutoff(config)],
    )?;

    let remaining: i64 =
        tx.query_row("SELECT COUNT(*) FROM embedding_cache", [], |r| r.get(0))?;
    let excess = (remaining as usize).saturating_sub(config.max_entries);
    let evicted = if excess > 0 {
        tx.execute(
            "DELETE FROM embedding_cache WHERE rowid IN \
             (SELECT rowid FROM embedding_cache ORDER BY accessed_at ASC LIMIT ?1)",
            params![excess as i64],
        )?
    } else {
        0
    };

    tx.commit()?;

    if expired > 0 || evicted > 0 {
        tracing::debug!(expired, evicted, "embedding cache pruned");
    }
    Ok(PruneResult { expired, evicted })
}

/// Current entry count and access-time bounds.
pub fn stats(conn: &Connection) -> Result<CacheStats> {
    let (entries, oldest_access, newest_access) = conn.query_row(
        "SELECT COUNT(*), MIN(accessed_at), MAX(accessed_at) FROM embedding_cache",
        [],
        |row| {
            Ok((
                row.get::<_, i64>(0)? as usize,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        },
    )?;
    Ok(CacheStats {
        entries,
        oldest_access,
        newest_access,
    })
}

/// Prune only once the table exceeds `max_entries * 1.10`.
fn maybe_prune(conn: &mut Connection, config: &CacheConfig) -> Result<()> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM embedding_cache", [], |r| r.get(0))?;
    let high_water = (config.max_entries as f64 * 1.10) as i64;
    if count > high_water {
        prune(conn, config)?;
    }
    Ok(())
}
