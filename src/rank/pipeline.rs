//! Deterministic multi-stage ranking pipeline.
//!
//! Fixed order: minimum-score filter → temporal decay → MMR → hard limit.
//! Stateless per call; disabling any stage degrades to pass-through, the
//! limit always applies.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::chunk::types::SemanticSearchResult;
use crate::rank::decay::{self, DecayConfig};
use crate::rank::mmr::{self, MmrConfig};

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    /// Results scoring below this before decay are dropped.
    pub min_score: f64,
    pub decay: DecayConfig,
    pub mmr: MmrConfig,
}

/// Run the full pipeline and return at most `limit` results, ranked.
pub fn run(
    results: Vec<SemanticSearchResult>,
    limit: usize,
    config: &PipelineConfig,
    reference_time: DateTime<Utc>,
) -> Vec<SemanticSearchResult> {
    let filtered: Vec<SemanticSearchResult> = results
        .into_iter()
        .filter(|r| r.score >= config.min_score)
        .collect();

    let decayed = decay::apply_decay(filtered, &config.decay, reference_time);

    if config.mmr.enabled {
        mmr::apply_mmr(decayed, limit, &config.mmr)
            .into_iter()
            .map(|pick| pick.result)
            .collect()
    } else {
        let mut out = decayed;
        out.truncate(limit);
        out
    }
}
