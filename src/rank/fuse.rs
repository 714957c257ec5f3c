//! Weighted reciprocal-rank fusion of FTS and vector result lists.
//!
//! Each list contributes `weight * 1/(k + rank)` per result; contributions
//! are summed per unique chunk id and the merged set is re-sorted. Raw
//! engine scores are deliberately ignored — BM25 rank and cosine similarity
//! are not commensurable, rank position is.

use serde::Deserialize;
use std::collections::HashMap;

use crate::chunk::types::{MatchType, SemanticSearchResult};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FuseConfig {
    pub fts_weight: f64,
    pub vector_weight: f64,
    pub rrf_k: usize,
}

impl Default for FuseConfig {
    fn default() -> Self {
        Self {
            fts_weight: 0.3,
            vector_weight: 0.7,
            rrf_k: 60,
        }
    }
}

/// Merge independently produced FTS and vector lists into one ranked list
/// tagged [`MatchType::Hybrid`]. Chunks appearing in both lists get additive
/// scores; the variant carrying an embedding is kept for downstream MMR.
pub fn fuse(
    fts_results: Vec<SemanticSearchResult>,
    vector_results: Vec<SemanticSearchResult>,
    config: &FuseConfig,
) -> Vec<SemanticSearchResult> {
    let mut merged: HashMap<String, SemanticSearchResult> = HashMap::new();

    for (weight, list) in [
        (config.fts_weight, fts_results),
        (config.vector_weight, vector_results),
    ] {
        for (rank, mut result) in list.into_iter().enumerate() {
            let contribution = weight / (config.rrf_k as f64 + rank as f64);
            match merged.get_mut(&result.chunk.id) {
                None => {
                    result.score = contribution;
                    result.match_type = MatchType::Hybrid;
                    merged.insert(result.chunk.id.clone(), result);
                }
                Some(existing) => {
                    existing.score += contribution;
                    if existing.chunk.embedding.is_none() && result.chunk.embedding.is_some() {
                        existing.chunk.embedding = result.chunk.embedding.take();
                    }
                }
            }
        }
    }

    let mut fused: Vec<SemanticSearchResult> = merged.into_values().collect();
    fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    fused
}
