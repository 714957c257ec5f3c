//! Core chunk type definitions.
//!
//! Defines [`SemanticChunk`] (the atomic unit of retrievable text),
//! [`MatchType`] (which engine produced a result), [`SemanticSearchResult`]
//! (a transient per-query view, never persisted), and [`NewChunk`] (insert
//! input).

use serde::{Deserialize, Serialize};

/// An atomic unit of retrievable text with an optional vector embedding.
///
/// Immutable once embedded except for metadata patches; owned exclusively by
/// the chunk store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticChunk {
    /// UUID v7 (time-sortable), generated at insert time.
    pub id: String,
    /// ISO 8601 timestamp; defaults to insertion time. Decay/ordering key.
    pub timestamp: String,
    /// The full text content of the chunk.
    pub text: String,
    /// Free-form tags used as post-filters at query time.
    pub tags: Vec<String>,
    /// Conversation/session that produced this chunk, if any.
    pub session_id: Option<String>,
    /// Upstream event that produced this chunk, if any.
    pub source_event_id: Option<String>,
    /// Ingestion source kind (e.g. `"conversation"`, `"code"`, `"doc"`).
    pub source_type: Option<String>,
    /// L2-normalized embedding vector, if one was computed.
    pub embedding: Option<Vec<f32>>,
    /// Arbitrary JSON metadata.
    pub metadata: Option<serde_json::Value>,
}

/// Which search engine(s) produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// FTS5 BM25 keyword match.
    Fts,
    /// sqlite-vec KNN cosine match.
    Vector,
    /// Union of both engines; fusion deferred to the ranking pipeline.
    Hybrid,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fts => "fts",
            Self::Vector => "vector",
            Self::Hybrid => "hybrid",
        }
    }
}

impl std::fmt::Display for MatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MatchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fts" => Ok(Self::Fts),
            "vector" => Ok(Self::Vector),
            "hybrid" => Ok(Self::Hybrid),
            _ => Err(format!("unknown match type: {s}")),
        }
    }
}

/// A single search result. Transient view produced per query, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct SemanticSearchResult {
    pub chunk: SemanticChunk,
    /// Relevance score, higher is better. FTS results carry negated BM25
    /// rank, vector results carry cosine similarity, fused results carry
    /// weighted RRF mass.
    pub score: f64,
    pub match_type: MatchType,
}

/// Input for [`crate::chunk::store::add_chunk`].
#[derive(Debug, Clone, Default)]
pub struct NewChunk {
    pub text: String,
    pub tags: Vec<String>,
    pub session_id: Option<String>,
    pub source_event_id: Option<String>,
    pub source_type: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub metadata: Option<serde_json::Value>,
    /// Override the insertion timestamp (ISO 8601). Used by ingestion of
    /// historical events; defaults to now.
    pub timestamp: Option<String>,
}

impl NewChunk {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn match_type_round_trips() {
        for mt in [MatchType::Fts, MatchType::Vector, MatchType::Hybrid] {
            assert_eq!(MatchType::from_str(mt.as_str()).unwrap(), mt);
        }
        assert!(MatchType::from_str("keyword").is_err());
    }
}
