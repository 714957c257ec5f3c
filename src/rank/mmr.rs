//! Maximal Marginal Relevance — greedy reranking balancing relevance
//! against redundancy.
//!
//! Candidates are scored as `λ·relevance − (1−λ)·similarity`, where
//! similarity is the highest pairwise similarity to anything already
//! selected. Near-duplicates (similarity at or above `duplicate_threshold`)
//! have their similarity multiplied by `duplicate_penalty` before the
//! formula is applied. Intentionally O(limit × n) pairwise evaluations —
//! candidate sets are bounded to a small multiple of the limit upstream.
//!
//! Similarity uses cosine over embeddings when both chunks carry one and
//! `use_embeddings` is set; otherwise it falls back to token-set similarity
//! for that pair. Both metrics land in `[0, 1]`, keeping the duplicate
//! threshold meaningful across the fallback.

use serde::Deserialize;
use std::collections::HashSet;

use crate::chunk::cosine_similarity;
use crate::chunk::types::SemanticSearchResult;

/// Token-set similarity used when embeddings are unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextSimilarity {
    /// `|A ∩ B| / |A ∪ B|`
    Jaccard,
    /// `|A ∩ B| / min(|A|, |B|)`
    Overlap,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MmrConfig {
    pub enabled: bool,
    /// Relevance weight; `1 - lambda` weights diversity. Default 0.7.
    pub lambda: f64,
    /// Similarity at or above this marks a near-duplicate.
    pub duplicate_threshold: f64,
    /// Multiplier applied to near-duplicate similarity before scoring.
    pub duplicate_penalty: f64,
    pub use_embeddings: bool,
    pub text_similarity: TextSimilarity,
}

impl Default for MmrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lambda: 0.7,
            duplicate_threshold: 0.8,
            duplicate_penalty: 1.5,
            use_embeddings: true,
            text_similarity: TextSimilarity::Jaccard,
        }
    }
}

/// One selected result with its MMR bookkeeping.
#[derive(Debug)]
pub struct MmrPick {
    pub result: SemanticSearchResult,
    /// Relevance normalized to `[0, 1]` by the candidate maximum.
    pub relevance: f64,
    /// Highest raw pairwise similarity to the previously selected set.
    pub max_similarity: f64,
    pub mmr_score: f64,
}

/// Greedily select up to `limit` results.
pub fn apply_mmr(
    candidates: Vec<SemanticSearchResult>,
    limit: usize,
    config: &MmrConfig,
) -> Vec<MmrPick> {
    if candidates.is_empty() || limit == 0 {
        return Vec::new();
    }

    let max_score = candidates
        .iter()
        .map(|c| c.score)
        .fold(f64::NEG_INFINITY, f64::max);

    let mut remaining: Vec<(SemanticSearchResult, f64, HashSet<String>)> = candidates
        .into_iter()
        .map(|c| {
            let relevance = if max_score > 0.0 { c.score / max_score } else { 0.0 };
            let tokens = tokenize(&c.chunk.text);
            (c, relevance, tokens)
        })
        .collect();

    let mut selected: Vec<MmrPick> = Vec::new();
    let mut selected_keys: Vec<(Option<Vec<f32>>, HashSet<String>)> = Vec::new();

    while selected.len() < limit && !remaining.is_empty() {
        let mut best_idx = 0;
        let mut best_score = f64::NEG_INFINITY;
        let mut best_max_sim = 0.0;

        for (idx, (candidate, relevance, tokens)) in remaining.iter().enumerate() {
            let max_sim = selected_keys
                .iter()
                .map(|(emb, toks)| pair_similarity(candidate, tokens, emb.as_deref(), toks, config))
                .fold(0.0f64, f64::max);

            let effective = if max_sim >= config.duplicate_threshold {
                max_sim * config.duplicate_penalty
            } else {
                max_sim
            };
            let mmr_score = config.lambda * relevance - (1.0 - config.lambda) * effective;

            if mmr_score > best_score {
                best_score = mmr_score;
                best_idx = idx;
                best_max_sim = max_sim;
            }
        }

        let (result, relevance, tokens) = remaining.swap_remove(best_idx);
        selected_keys.push((result.chunk.embedding.clone(), tokens));
        selected.push(MmrPick {
            result,
            relevance,
            max_similarity: best_max_sim,
            mmr_score: best_score,
        });
    }

    selected
}

fn pair_similarity(
    candidate: &SemanticSearchResult,
    candidate_tokens: &HashSet<String>,
    other_embedding: Option<&[f32]>,
    other_tokens: &HashSet<String>,
    config: &MmrConfig,
) -> f64 {
    if config.use_embeddings {
        if let (Some(a), Some(b)) = (candidate.chunk.embedding.as_deref(), other_embedding) {
            return cosine_similarity(a, b).clamp(0.0, 1.0);
        }
    }
    token_similarity(candidate_tokens, other_tokens, config.text_similarity)
}

fn token_similarity(a: &HashSet<String>, b: &HashSet<String>, metric: TextSimilarity) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    match metric {
        TextSimilarity::Jaccard => {
            let union = a.union(b).count() as f64;
            intersection / union
        }
        TextSimilarity::Overlap => intersection / (a.len().min(b.len()) as f64),
    }
}

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
