//! Closure-table tree storage.
//!
//! Every node insert writes one self-entry plus one closure row per ancestor
//! of its parent — O(depth) write amplification purchased so that ancestor
//! and descendant queries become single indexed range scans instead of
//! recursive traversal. All multi-row mutations (node insert, subtree move,
//! deletes) run inside one transaction; a node without its closure entries
//! is an invariant violation, not a recoverable state.

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::tree::path::{join_path, normalize_path, reparent_path};
use crate::tree::types::{NewNode, NewRoot, NodePatch, TreeNode, TreeRoot, TreeType};

// ── Roots ─────────────────────────────────────────────────────────────────────

/// Create a new tree root.
pub fn create_root(conn: &Connection, input: NewRoot) -> Result<TreeRoot> {
    let id = uuid::Uuid::now_v7().to_string();
    let created_at = chrono::Utc::now().to_rfc3339();
    let metadata_json = input.metadata.as_ref().map(serde_json::to_string).transpose()?;

    conn.execute(
        "INSERT INTO tree_roots (id, tree_type, name, root_path, metadata, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            id,
            input.tree_type.as_str(),
            input.name,
            input.root_path,
            metadata_json,
            created_at,
        ],
    )?;

    tracing::debug!(root_id = %id, tree_type = %input.tree_type, "tree root created");

    Ok(TreeRoot {
        id,
        tree_type: input.tree_type,
        name: input.name,
        root_path: input.root_path,
        metadata: input.metadata,
        created_at,
    })
}

pub fn get_root(conn: &Connection, id: &str) -> Result<Option<TreeRoot>> {
    conn.query_row(
        "SELECT id, tree_type, name, root_path, metadata, created_at \
         FROM tree_roots WHERE id = ?1",
        params![id],
        map_root,
    )
    .optional()
    .map_err(Error::from)
}

/// List roots, optionally filtered by tree type.
pub fn list_roots(conn: &Connection, tree_type: Option<TreeType>) -> Result<Vec<TreeRoot>> {
    let mut stmt = conn.prepare(
        "SELECT id, tree_type, name, root_path, metadata, created_at FROM tree_roots \
         WHERE (?1 IS NULL OR tree_type = ?1) ORDER BY created_at",
    )?;
    let roots = stmt
        .query_map(params![tree_type.map(|t| t.as_str())], map_root)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(roots)
}

/// Delete a root with all its nodes and closure entries. Returns the number
/// of nodes removed.
pub fn delete_root(conn: &mut Connection, id: &str) -> Result<usize> {
    let tx = conn.transaction()?;

    let exists: bool = tx.query_row(
        "SELECT COUNT(*) > 0 FROM tree_roots WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(Error::RootNotFound(id.to_string()));
    }

    // Closure rows have no FK; clear them before the node cascade
    tx.execute(
        "DELETE FROM tree_closure WHERE descendant_id IN \
         (SELECT id FROM tree_nodes WHERE tree_root_id = ?1)",
        params![id],
    )?;
    let nodes = tx.execute("DELETE FROM tree_nodes WHERE tree_root_id = ?1", params![id])?;
    tx.execute("DELETE FROM tree_roots WHERE id = ?1", params![id])?;

    tx.commit()?;
    tracing::debug!(root_id = id, nodes, "tree root deleted");
    Ok(nodes)
}

// ── Nodes ─────────────────────────────────────────────────────────────────────

/// Create a node under a root. Computes `depth` from the parent and
/// atomically inserts the self-closure entry plus one closure entry per
/// ancestor of the parent.
pub fn create_node(conn: &mut Connection, root_id: &str, input: NewNode) -> Result<TreeNode> {
    let tx = conn.transaction()?;

    let root_exists: bool = tx.query_row(
        "SELECT COUNT(*) > 0 FROM tree_roots WHERE id = ?1",
        params![root_id],
        |row| row.get(0),
    )?;
    if !root_exists {
        return Err(Error::RootNotFound(root_id.to_string()));
    }

    let depth = match input.parent_id.as_deref() {
        None => 0,
        Some(parent_id) => {
            let parent_depth: Option<u32> = tx
                .query_row(
                    "SELECT depth FROM tree_nodes WHERE id = ?1 AND tree_root_id = ?2",
                    params![parent_id, root_id],
                    |row| row.get(0),
                )
                .optional()?;
            match parent_depth {
                Some(d) => d + 1,
                None => return Err(Error::NodeNotFound(parent_id.to_string())),
            }
        }
    };

    let id = uuid::Uuid::now_v7().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    let path = normalize_path(&input.path);
    let metadata_json = input.metadata.as_ref().map(serde_json::to_string).transpose()?;

    tx.execute(
        "INSERT INTO tree_nodes (id, tree_root_id, node_type, name, path, parent_id, \
         depth, sort_order, chunk_id, metadata, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
        params![
            id,
            root_id,
            input.node_type,
            input.name,
            path,
            input.parent_id,
            depth,
            input.sort_order,
            input.chunk_id,
            metadata_json,
            now,
        ],
    )
    .map_err(|e| Error::from_node_insert(e, root_id, &path))?;

    // Self-entry, then one row per ancestor of the parent (parent included)
    tx.execute(
        "INSERT INTO tree_closure (ancestor_id, descendant_id, depth) VALUES (?1, ?1, 0)",
        params![id],
    )?;
    if let Some(parent_id) = input.parent_id.as_deref() {
        tx.execute(
            "INSERT INTO tree_closure (ancestor_id, descendant_id, depth) \
             SELECT ancestor_id, ?1, depth + 1 FROM tree_closure WHERE descendant_id = ?2",
            params![id, parent_id],
        )?;
    }

    tx.commit()?;

    Ok(TreeNode {
        id,
        tree_root_id: root_id.to_string(),
        node_type: input.node_type,
        name: input.name,
        path,
        parent_id: input.parent_id,
        depth,
        sort_order: input.sort_order,
        chunk_id: input.chunk_id,
        metadata: input.metadata,
        created_at: now.clone(),
        updated_at: now,
    })
}

pub fn get_node(conn: &Connection, id: &str) -> Result<Option<TreeNode>> {
    conn.query_row(
        &format!("{NODE_COLUMNS} WHERE id = ?1"),
        params![id],
        map_node,
    )
    .optional()
    .map_err(Error::from)
}

pub fn get_node_by_path(conn: &Connection, root_id: &str, path: &str) -> Result<Option<TreeNode>> {
    conn.query_row(
        &format!("{NODE_COLUMNS} WHERE tree_root_id = ?1 AND path = ?2"),
        params![root_id, normalize_path(path)],
        map_node,
    )
    .optional()
    .map_err(Error::from)
}

/// Direct children, ordered by `sort_order` then name.
pub fn get_children(conn: &Connection, parent_id: &str) -> Result<Vec<TreeNode>> {
    let mut stmt = conn.prepare(&format!(
        "{NODE_COLUMNS} WHERE parent_id = ?1 ORDER BY sort_order, name"
    ))?;
    let nodes = stmt
        .query_map(params![parent_id], map_node)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(nodes)
}

/// Patch a node's mutable fields (name, chunk link, metadata, sort order).
/// Structural fields are immutable post-creation.
pub fn update_node(conn: &Connection, id: &str, patch: NodePatch) -> Result<TreeNode> {
    let Some(mut node) = get_node(conn, id)? else {
        return Err(Error::NodeNotFound(id.to_string()));
    };

    if let Some(name) = patch.name {
        node.name = name;
    }
    if let Some(chunk_id) = patch.chunk_id {
        node.chunk_id = chunk_id;
    }
    if let Some(metadata) = patch.metadata {
        node.metadata = Some(metadata);
    }
    if let Some(sort_order) = patch.sort_order {
        node.sort_order = sort_order;
    }
    node.updated_at = chrono::Utc::now().to_rfc3339();

    let metadata_json = node.metadata.as_ref().map(serde_json::to_string).transpose()?;
    conn.execute(
        "UPDATE tree_nodes SET name = ?1, chunk_id = ?2, metadata = ?3, sort_order = ?4, \
         updated_at = ?5 WHERE id = ?6",
        params![node.name, node.chunk_id, metadata_json, node.sort_order, node.updated_at, id],
    )?;

    Ok(node)
}

/// Delete a single node and every closure entry referencing it.
///
/// Does NOT cascade to children: deleting an internal node orphans its
/// subtree (the children keep a dangling `parent_id` and lose their
/// ancestor chain). Callers wanting the cascade use [`delete_subtree`].
pub fn delete_node(conn: &mut Connection, id: &str) -> Result<()> {
    let tx = conn.transaction()?;

    let exists: bool = tx.query_row(
        "SELECT COUNT(*) > 0 FROM tree_nodes WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(Error::NodeNotFound(id.to_string()));
    }

    let children: i64 = tx.query_row(
        "SELECT COUNT(*) FROM tree_nodes WHERE parent_id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    if children > 0 {
        tracing::warn!(node_id = id, children, "deleting node orphans its subtree");
    }

    tx.execute(
        "DELETE FROM tree_closure WHERE ancestor_id = ?1 OR descendant_id = ?1",
        params![id],
    )?;
    tx.execute("DELETE FROM tree_nodes WHERE id = ?1", params![id])?;

    tx.commit()?;
    Ok(())
}

/// Delete a node together with all its descendants and their closure rows.
/// Returns the number of nodes removed.
pub fn delete_subtree(conn: &mut Connection, id: &str) -> Result<usize> {
    let tx = conn.transaction()?;

    let mut ids = descendant_ids_tx(&tx, id)?;
    if get_node_tx(&tx, id)?.is_none() {
        return Err(Error::NodeNotFound(id.to_string()));
    }
    ids.push(id.to_string());

    for node_id in &ids {
        tx.execute(
            "DELETE FROM tree_closure WHERE ancestor_id = ?1 OR descendant_id = ?1",
            params![node_id],
        )?;
        tx.execute("DELETE FROM tree_nodes WHERE id = ?1", params![node_id])?;
    }

    tx.commit()?;
    Ok(ids.len())
}

/// All strict ancestors of a node, root-first. A single indexed query
/// against the closure table — the payoff of the closure design.
pub fn get_ancestor_ids(conn: &Connection, id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT ancestor_id FROM tree_closure \
         WHERE descendant_id = ?1 AND depth > 0 ORDER BY depth DESC",
    )?;
    let ids = stmt
        .query_map(params![id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// All strict descendants of a node, nearest-first.
pub fn get_descendant_ids(conn: &Connection, id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT descendant_id FROM tree_closure \
         WHERE ancestor_id = ?1 AND depth > 0 ORDER BY depth",
    )?;
    let ids = stmt
        .query_map(params![id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Move a subtree under a new parent (or to the top level with `None`).
///
/// Single transaction: cycle/root guards, closure rows linking outside
/// ancestors to subtree members are deleted, the cross-join against the new
/// ancestor chain is reinserted, node depths shift by the parent delta, and
/// paths are rewritten under the new parent — a half-migrated tree is never
/// observable.
pub fn move_subtree(
    conn: &mut Connection,
    node_id: &str,
    new_parent_id: Option<&str>,
) -> Result<()> {
    let tx = conn.transaction()?;

    let Some(node) = get_node_tx(&tx, node_id)? else {
        return Err(Error::NodeNotFound(node_id.to_string()));
    };

    let (new_parent_depth, new_parent_path) = match new_parent_id {
        None => (None, "/".to_string()),
        Some(parent_id) => {
            let Some(parent) = get_node_tx(&tx, parent_id)? else {
                return Err(Error::NodeNotFound(parent_id.to_string()));
            };
            if parent.tree_root_id != node.tree_root_id {
                return Err(Error::InvalidMove(format!(
                    "node {node_id} and parent {parent_id} belong to different trees"
                )));
            }
            if parent_id == node_id {
                return Err(Error::InvalidMove("cannot move a node under itself".into()));
            }
            let in_subtree: bool = tx.query_row(
                "SELECT COUNT(*) > 0 FROM tree_closure \
                 WHERE ancestor_id = ?1 AND descendant_id = ?2",
                params![node_id, parent_id],
                |row| row.get(0),
            )?;
            if in_subtree {
                return Err(Error::InvalidMove(format!(
                    "cannot move {node_id} under its own descendant {parent_id}"
                )));
            }
            (Some(parent.depth), parent.path)
        }
    };

    // Rewrite paths in Rust so the uniqueness check can exclude the moved set
    let new_base = join_path(&new_parent_path, &node.name);
    let mut moved: Vec<(String, String)> = vec![(node.id.clone(), new_base.clone())];
    for descendant_id in descendant_ids_tx(&tx, node_id)? {
        let Some(descendant) = get_node_tx(&tx, &descendant_id)? else {
            continue;
        };
        let Some(new_path) = reparent_path(&descendant.path, &node.path, &new_base) else {
            continue;
        };
        moved.push((descendant_id, new_path));
    }
    for (moved_id, new_path) in &moved {
        let conflict: Option<String> = tx
            .query_row(
                "SELECT id FROM tree_nodes WHERE tree_root_id = ?1 AND path = ?2 AND id != ?3",
                params![node.tree_root_id, new_path, moved_id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(conflict_id) = conflict {
            if !moved.iter().any(|(id, _)| id == &conflict_id) {
                return Err(Error::DuplicatePath {
                    root_id: node.tree_root_id.clone(),
                    path: new_path.clone(),
                });
            }
        }
    }

    // Drop closure rows linking ancestors outside the subtree to its members
    tx.execute(
        "DELETE FROM tree_closure WHERE descendant_id IN \
         (SELECT descendant_id FROM tree_closure WHERE ancestor_id = ?1) \
         AND ancestor_id IN \
         (SELECT ancestor_id FROM tree_closure WHERE descendant_id = ?1 AND ancestor_id != ?1)",
        params![node_id],
    )?;

    // Reattach: cross-join the new parent's ancestor chain with the subtree
    if let Some(parent_id) = new_parent_id {
        tx.execute(
            "INSERT INTO tree_closure (ancestor_id, descendant_id, depth) \
             SELECT sup.ancestor_id, sub.descendant_id, sup.depth + sub.depth + 1 \
             FROM tree_closure AS sup, tree_closure AS sub \
             WHERE sup.descendant_id = ?1 AND sub.ancestor_id = ?2",
            params![parent_id, node_id],
        )?;
    }

    let new_depth = new_parent_depth.map(|d| d + 1).unwrap_or(0);
    let delta = new_depth as i64 - node.depth as i64;
    let now = chrono::Utc::now().to_rfc3339();
    for (moved_id, new_path) in &moved {
        tx.execute(
            "UPDATE tree_nodes SET depth = depth + ?1, path = ?2, updated_at = ?3 WHERE id = ?4",
            params![delta, new_path, now, moved_id],
        )?;
    }
    tx.execute(
        "UPDATE tree_nodes SET parent_id = ?1 WHERE id = ?2",
        params![new_parent_id, node_id],
    )?;

    tx.commit()?;
    tracing::debug!(node_id, new_parent = ?new_parent_id, moved = moved.len(), "subtree moved");
    Ok(())
}

// ── Row mapping ───────────────────────────────────────────────────────────────

const NODE_COLUMNS: &str = "SELECT id, tree_root_id, node_type, name, path, parent_id, depth, \
                            sort_order, chunk_id, metadata, created_at, updated_at FROM tree_nodes";

fn map_root(row: &rusqlite::Row<'_>) -> rusqlite::Result<TreeRoot> {
    let tree_type_str: String = row.get(1)?;
    let metadata_str: Option<String> = row.get(4)?;
    Ok(TreeRoot {
        id: row.get(0)?,
        tree_type: TreeType::from_str(&tree_type_str).unwrap_or(TreeType::Doc),
        name: row.get(2)?,
        root_path: row.get(3)?,
        metadata: metadata_str.and_then(|s| serde_json::from_str(&s).ok()),
        created_at: row.get(5)?,
    })
}

pub(crate) fn map_node(row: &rusqlite::Row<'_>) -> rusqlite::Result<TreeNode> {
    let metadata_str: Option<String> = row.get(9)?;
    Ok(TreeNode {
        id: row.get(0)?,
        tree_root_id: row.get(1)?,
        node_type: row.get(2)?,
        name: row.get(3)?,
        path: row.get(4)?,
        parent_id: row.get(5)?,
        depth: row.get(6)?,
        sort_order: row.get(7)?,
        chunk_id: row.get(8)?,
        metadata: metadata_str.and_then(|s| serde_json::from_str(&s).ok()),
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn get_node_tx(tx: &Transaction<'_>, id: &str) -> Result<Option<TreeNode>> {
    tx.query_row(
        &format!("{NODE_COLUMNS} WHERE id = ?1"),
        params![id],
        map_node,
    )
    .optional()
    .map_err(Error::from)
}

fn descendant_ids_tx(tx: &Transaction<'_>, id: &str) -> Result<Vec<String>> {
    let mut stmt = tx.prepare(
        "SELECT descendant_id FROM tree_closure \
         WHERE ancestor_id = ?1 AND depth > 0 ORDER BY depth",
    )?;
    let ids = stmt
        .query_map(params![id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}
