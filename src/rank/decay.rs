//! Temporal decay — score attenuation as a function of chunk age.
//!
//! Replaces each result's score with `score * multiplier(age_days)` and
//! re-sorts descending. Future-dated content never gets a boost: any
//! non-positive age yields multiplier 1.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::chunk::types::SemanticSearchResult;

/// Which decay law to apply.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecayFunction {
    /// `e^(-ln2/half_life * age)`; exactly 0.5 at `age == half_life_days`.
    Exponential { half_life_days: f64 },
    /// Linear ramp from 1 at age 0 down to `min_multiplier` at `max_days`.
    Linear { max_days: f64 },
    /// 1 up to `threshold_days`, then a fixed `old_multiplier`.
    Step { threshold_days: f64, old_multiplier: f64 },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DecayConfig {
    pub enabled: bool,
    pub function: DecayFunction,
    /// Floor for the exponential and linear laws.
    pub min_multiplier: f64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            function: DecayFunction::Exponential { half_life_days: 30.0 },
            min_multiplier: 0.1,
        }
    }
}

/// Compute the decay multiplier for a given age in days.
///
/// Always in `[min_multiplier, 1]` for the exponential and linear laws; the
/// step law returns `old_multiplier` as configured (clamped to `[0, 1]`).
pub fn decay_multiplier(config: &DecayConfig, age_days: f64) -> f64 {
    if age_days <= 0.0 {
        return 1.0;
    }
    match config.function {
        DecayFunction::Exponential { half_life_days } => {
            let m = (-std::f64::consts::LN_2 / half_life_days * age_days).exp();
            m.max(config.min_multiplier)
        }
        DecayFunction::Linear { max_days } => {
            if age_days < max_days {
                let m = 1.0 - (age_days / max_days) * (1.0 - config.min_multiplier);
                m.max(config.min_multiplier)
            } else {
                config.min_multiplier
            }
        }
        DecayFunction::Step { threshold_days, old_multiplier } => {
            if age_days <= threshold_days {
                1.0
            } else {
                old_multiplier.clamp(0.0, 1.0)
            }
        }
    }
}

/// Apply temporal decay to every result and re-sort descending by the
/// decayed score. Results with unparseable timestamps are left undecayed.
pub fn apply_decay(
    mut results: Vec<SemanticSearchResult>,
    config: &DecayConfig,
    reference_time: DateTime<Utc>,
) -> Vec<SemanticSearchResult> {
    if !config.enabled || results.is_empty() {
        return results;
    }

    for result in &mut results {
        let Ok(ts) = DateTime::parse_from_rfc3339(&result.chunk.timestamp) else {
            continue;
        };
        let age_ms = (reference_time - ts.with_timezone(&Utc)).num_milliseconds();
        let age_days = age_ms as f64 / 86_400_000.0;
        result.score *= decay_multiplier(config, age_days);
    }

    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::types::{MatchType, SemanticChunk};
    use chrono::Duration;

    fn result_aged(days: i64, score: f64) -> SemanticSearchResult {
        SemanticSearchResult {
            chunk: SemanticChunk {
                id: format!("chunk-{days}"),
                timestamp: (Utc::now() - Duration::days(days)).to_rfc3339(),
                text: "text".into(),
                tags: vec![],
                session_id: None,
                source_event_id: None,
                source_type: None,
                embedding: None,
                metadata: None,
            },
            score,
            match_type: MatchType::Fts,
        }
    }

    #[test]
    fn exponential_halves_at_half_life() {
        let config = DecayConfig::default();
        let m = decay_multiplier(&config, 30.0);
        assert!((m - 0.5).abs() < 1e-9);
    }

    #[test]
    fn multiplier_is_monotonic_and_bounded() {
        let configs = [
            DecayConfig::default(),
            DecayConfig {
                enabled: true,
                function: DecayFunction::Linear { max_days: 60.0 },
                min_multiplier: 0.2,
            },
            DecayConfig {
                enabled: true,
                function: DecayFunction::Step { threshold_days: 7.0, old_multiplier: 0.3 },
                min_multiplier: 0.1,
            },
        ];
        for config in &configs {
            let mut last = 1.0f64;
            for age in 0..400 {
                let m = decay_multiplier(config, age as f64);
                assert!(m <= last + 1e-12, "multiplier must not increase with age");
                assert!(m <= 1.0 && m >= 0.0);
                last = m;
            }
        }
    }

    #[test]
    fn future_dated_content_gets_no_boost() {
        let config = DecayConfig::default();
        assert_eq!(decay_multiplier(&config, -5.0), 1.0);
        assert_eq!(decay_multiplier(&config, 0.0), 1.0);
    }

    #[test]
    fn exponential_respects_floor() {
        let config = DecayConfig::default();
        assert!((decay_multiplier(&config, 10_000.0) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn linear_hits_floor_at_max_days() {
        let config = DecayConfig {
            enabled: true,
            function: DecayFunction::Linear { max_days: 10.0 },
            min_multiplier: 0.25,
        };
        assert!((decay_multiplier(&config, 5.0) - 0.625).abs() < 1e-9);
        assert_eq!(decay_multiplier(&config, 10.0), 0.25);
        assert_eq!(decay_multiplier(&config, 50.0), 0.25);
    }

    #[test]
    fn step_switches_at_threshold() {
        let config = DecayConfig {
            enabled: true,
            function: DecayFunction::Step { threshold_days: 7.0, old_multiplier: 0.4 },
            min_multiplier: 0.1,
        };
        assert_eq!(decay_multiplier(&config, 7.0), 1.0);
        assert_eq!(decay_multiplier(&config, 7.1), 0.4);
    }

    #[test]
    fn apply_decay_reorders_by_decayed_score() {
        let config = DecayConfig::default();
        // Old chunk scores slightly higher raw but decays below the fresh one
        let results = vec![result_aged(90, 1.0), result_aged(0, 0.6)];
        let decayed = apply_decay(results, &config, Utc::now());
        assert_eq!(decayed[0].chunk.id, "chunk-0");
        assert!(decayed[0].score > decayed[1].score);
    }

    #[test]
    fn disabled_decay_is_pass_through() {
        let config = DecayConfig {
            enabled: false,
            ..DecayConfig::default()
        };
        let results = vec![result_aged(90, 1.0), result_aged(0, 0.6)];
        let out = apply_decay(results, &config, Utc::now());
        assert_eq!(out[0].score, 1.0);
        assert_eq!(out[1].score, 0.6);
    }

    #[test]
    fn empty_input_is_identity() {
        let out = apply_decay(Vec::new(), &DecayConfig::default(), Utc::now());
        assert!(out.is_empty());
    }
}
