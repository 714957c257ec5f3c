//! Structure-aware search over tree nodes.
//!
//! Two entry points: [`find_nodes`] filters nodes by structure alone
//! (type, depth, subtree, name/path patterns), and [`search`] runs a chunk
//! search first and then maps the hits onto content nodes, applying the
//! same structural filters. Every result carries a breadcrumb — the names
//! along the ancestor chain — so callers can render hits in context.

use regex::Regex;
use rusqlite::{params, Connection};
use std::collections::{HashMap, HashSet};

use crate::chunk::store::{self as chunk_store, SearchOptions};
use crate::chunk::types::MatchType;
use crate::error::{Error, Result};
use crate::tree::store::{self, map_node};
use crate::tree::types::TreeNode;

/// Structural filters shared by [`find_nodes`] and [`search`].
#[derive(Debug, Clone, Default)]
pub struct TreeSearchOptions {
    /// Restrict to one tree root.
    pub tree_root_id: Option<String>,
    /// Restrict to the subtree under this node (the node itself included).
    pub subtree_node_id: Option<String>,
    /// Allow-list of node types; empty means all.
    pub node_types: Vec<String>,
    pub min_depth: Option<u32>,
    pub max_depth: Option<u32>,
    /// Only content nodes (those linked to a chunk).
    pub require_chunk: bool,
    /// Regex applied to the node name.
    pub name_pattern: Option<String>,
    /// Regex applied to the node path.
    pub path_pattern: Option<String>,
    /// Cap results per tree root before the global limit.
    pub top_n_per_root: Option<usize>,
    pub limit: usize,
}

impl TreeSearchOptions {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }
}

/// A node hit with its ranking score and ancestry context.
#[derive(Debug, Clone)]
pub struct TreeSearchResult {
    pub node: TreeNode,
    /// Chunk search score for semantic hits, 0.0 for structural matches.
    pub score: f64,
    pub match_type: Option<MatchType>,
    /// Names along the ancestor chain, root-first, the node's own name last.
    pub breadcrumb: Vec<String>,
}

// Compiled form of the pattern filters; built once per call.
struct NodeFilter {
    tree_root_id: Option<String>,
    subtree_ids: Option<HashSet<String>>,
    node_types: Vec<String>,
    min_depth: Option<u32>,
    max_depth: Option<u32>,
    require_chunk: bool,
    name_regex: Option<Regex>,
    path_regex: Option<Regex>,
}

impl NodeFilter {
    fn compile(conn: &Connection, options: &TreeSearchOptions) -> Result<Self> {
        let subtree_ids = match options.subtree_node_id.as_deref() {
            None => None,
            Some(node_id) => {
                if store::get_node(conn, node_id)?.is_none() {
                    return Err(Error::NodeNotFound(node_id.to_string()));
                }
                let mut ids: HashSet<String> =
                    store::get_descendant_ids(conn, node_id)?.into_iter().collect();
                ids.insert(node_id.to_string());
                Some(ids)
            }
        };

        Ok(Self {
            tree_root_id: options.tree_root_id.clone(),
            subtree_ids,
            node_types: options.node_types.clone(),
            min_depth: options.min_depth,
            max_depth: options.max_depth,
            require_chunk: options.require_chunk,
            name_regex: compile_pattern(options.name_pattern.as_deref())?,
            path_regex: compile_pattern(options.path_pattern.as_deref())?,
        })
    }

    fn matches(&self, node: &TreeNode) -> bool {
        if let Some(root_id) = self.tree_root_id.as_deref() {
            if node.tree_root_id != root_id {
                return false;
            }
        }
        if let Some(ids) = &self.subtree_ids {
            if !ids.contains(&node.id) {
                return false;
            }
        }
        if !self.node_types.is_empty() && !self.node_types.contains(&node.node_type) {
            return false;
        }
        if self.min_depth.is_some_and(|min| node.depth < min) {
            return false;
        }
        if self.max_depth.is_some_and(|max| node.depth > max) {
            return false;
        }
        if self.require_chunk && node.chunk_id.is_none() {
            return false;
        }
        if let Some(re) = &self.name_regex {
            if !re.is_match(&node.name) {
                return false;
            }
        }
        if let Some(re) = &self.path_regex {
            if !re.is_match(&node.path) {
                return false;
            }
        }
        true
    }
}

fn compile_pattern(pattern: Option<&str>) -> Result<Option<Regex>> {
    pattern
        .map(|p| Regex::new(p).map_err(|e| Error::InvalidPattern(e.to_string())))
        .transpose()
}

/// Structural node lookup, no text query. Ordered by path for stable output.
pub fn find_nodes(
    conn: &Connection,
    options: &TreeSearchOptions,
) -> Result<Vec<TreeSearchResult>> {
    let filter = NodeFilter::compile(conn, options)?;

    let mut stmt = conn.prepare(
        "SELECT id, tree_root_id, node_type, name, path, parent_id, depth, sort_order, \
         chunk_id, metadata, created_at, updated_at FROM tree_nodes \
         WHERE (?1 IS NULL OR tree_root_id = ?1) ORDER BY tree_root_id, path",
    )?;
    let nodes = stmt
        .query_map(params![options.tree_root_id], map_node)?
        .collect::<std::result::Result<Vec<TreeNode>, _>>()?;

    let mut results = Vec::new();
    for node in nodes {
        if !filter.matches(&node) {
            continue;
        }
        let breadcrumb = breadcrumb_for(conn, &node)?;
        results.push(TreeSearchResult {
            node,
            score: 0.0,
            match_type: None,
            breadcrumb,
        });
    }

    cap_and_limit(&mut results, options);
    Ok(results)
}

/// Semantic search scoped to tree structure.
///
/// Runs hybrid chunk search (FTS plus vector when a query embedding is
/// given), maps each hit onto the content nodes referencing it, applies
/// the structural filters, and returns node results in chunk-score order.
/// One chunk referenced by several nodes produces several results.
pub fn search(
    conn: &Connection,
    query: &str,
    query_embedding: Option<&[f32]>,
    options: &TreeSearchOptions,
) -> Result<Vec<TreeSearchResult>> {
    let filter = NodeFilter::compile(conn, options)?;

    // Over-fetch: structural filters drop an unknown share of chunk hits
    let chunk_options = SearchOptions {
        limit: options.limit.max(1) * 3,
        ..SearchOptions::default()
    };
    let chunk_hits = chunk_store::search_hybrid(conn, query, query_embedding, &chunk_options)?;

    let mut results = Vec::new();
    for hit in chunk_hits {
        for node in nodes_for_chunk(conn, &hit.chunk.id)? {
            if !filter.matches(&node) {
                continue;
            }
            let breadcrumb = breadcrumb_for(conn, &node)?;
            results.push(TreeSearchResult {
                node,
                score: hit.score,
                match_type: Some(hit.match_type),
                breadcrumb,
            });
        }
    }

    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    cap_and_limit(&mut results, options);
    Ok(results)
}

fn nodes_for_chunk(conn: &Connection, chunk_id: &str) -> Result<Vec<TreeNode>> {
    let mut stmt = conn.prepare(
        "SELECT id, tree_root_id, node_type, name, path, parent_id, depth, sort_order, \
         chunk_id, metadata, created_at, updated_at FROM tree_nodes WHERE chunk_id = ?1",
    )?;
    let nodes = stmt
        .query_map(params![chunk_id], map_node)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(nodes)
}

fn breadcrumb_for(conn: &Connection, node: &TreeNode) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for ancestor_id in store::get_ancestor_ids(conn, &node.id)? {
        if let Some(ancestor) = store::get_node(conn, &ancestor_id)? {
            names.push(ancestor.name);
        }
    }
    names.push(node.name.clone());
    Ok(names)
}

fn cap_and_limit(results: &mut Vec<TreeSearchResult>, options: &TreeSearchOptions) {
    if let Some(top_n) = options.top_n_per_root {
        let mut per_root: HashMap<String, usize> = HashMap::new();
        results.retain(|r| {
            let seen = per_root.entry(r.node.tree_root_id.clone()).or_insert(0);
            *seen += 1;
            *seen <= top_n
        });
    }
    if options.limit > 0 {
        results.truncate(options.limit);
    }
}
