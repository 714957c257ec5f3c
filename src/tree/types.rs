//! Tree index type definitions.
//!
//! Defines [`TreeType`] (the four hierarchy kinds), [`TreeRoot`] (one per
//! logical hierarchy instance), [`TreeNode`] (structural or content node),
//! and the insert/patch input types.

use serde::{Deserialize, Serialize};

/// The four kinds of hierarchy the index organizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeType {
    /// Files and symbols of an indexed repository.
    Code,
    /// Sections of an ingested document.
    Doc,
    /// Sessions and events.
    Event,
    /// Task plans and their steps.
    Task,
}

impl TreeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Doc => "doc",
            Self::Event => "event",
            Self::Task => "task",
        }
    }
}

impl std::fmt::Display for TreeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TreeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "code" => Ok(Self::Code),
            "doc" => Ok(Self::Doc),
            "event" => Ok(Self::Event),
            "task" => Ok(Self::Task),
            _ => Err(format!("unknown tree type: {s}")),
        }
    }
}

/// One logical hierarchy instance. Owns all nodes under it; deleting a root
/// cascades to its nodes and closure entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeRoot {
    pub id: String,
    pub tree_type: TreeType,
    pub name: String,
    /// External anchor for the hierarchy (e.g. repository path, document URI).
    pub root_path: String,
    pub metadata: Option<serde_json::Value>,
    pub created_at: String,
}

/// A node in a hierarchy. A node with `chunk_id` set is a content node
/// (leaf carrying searchable text); one without is structural.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: String,
    pub tree_root_id: String,
    /// Builder-defined kind (e.g. `"directory"`, `"file"`, `"symbol"`,
    /// `"section"`, `"step"`).
    pub node_type: String,
    pub name: String,
    /// Root-relative path, unique within the tree root.
    pub path: String,
    pub parent_id: Option<String>,
    /// Number of ancestors; 0 for top-level nodes.
    pub depth: u32,
    pub sort_order: i64,
    pub chunk_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: String,
    pub updated_at: String,
}

/// Input for [`crate::tree::store::create_root`].
#[derive(Debug, Clone)]
pub struct NewRoot {
    pub tree_type: TreeType,
    pub name: String,
    pub root_path: String,
    pub metadata: Option<serde_json::Value>,
}

/// Input for [`crate::tree::store::create_node`].
#[derive(Debug, Clone, Default)]
pub struct NewNode {
    pub node_type: String,
    pub name: String,
    /// Raw path; normalized on insert.
    pub path: String,
    pub parent_id: Option<String>,
    pub sort_order: i64,
    pub chunk_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Mutable fields of a node. Structural fields (parent, path, depth) are
/// immutable post-creation; moving requires
/// [`crate::tree::store::move_subtree`].
#[derive(Debug, Clone, Default)]
pub struct NodePatch {
    pub name: Option<String>,
    pub chunk_id: Option<Option<String>>,
    pub metadata: Option<serde_json::Value>,
    pub sort_order: Option<i64>,
}
