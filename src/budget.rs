//! Token budget allocation for context assembly.
//!
//! Token counts are estimated from character length (no tokenizer
//! dependency) with a safety overhead, then a fixed total budget is split
//! across context layers in strict priority order: profile, task state,
//! summary, recent events, semantic chunks. A higher-priority layer is
//! never starved by a lower-priority one; unused allocation flows downward.

use serde::Serialize;

use crate::config::BudgetConfig;

/// Character-ratio token estimator.
///
/// `ceil(chars / chars_per_token)` inflated by `overhead_percent` so the
/// estimate errs toward over-counting. Over-estimating wastes a little
/// budget; under-estimating overflows the model context.
#[derive(Debug, Clone, Copy)]
pub struct TokenEstimator {
    pub chars_per_token: usize,
    pub overhead_percent: f64,
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self {
            chars_per_token: 4,
            overhead_percent: 0.10,
        }
    }
}

impl TokenEstimator {
    pub fn from_config(config: &BudgetConfig) -> Self {
        Self {
            chars_per_token: config.chars_per_token.max(1),
            overhead_percent: config.overhead_percent.max(0.0),
        }
    }

    /// Estimated token count for a piece of text. Empty text is 0 tokens.
    pub fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        let base = text.chars().count().div_ceil(self.chars_per_token);
        ((base as f64) * (1.0 + self.overhead_percent)).ceil() as usize
    }
}

/// Per-layer budget caps plus the overall total.
#[derive(Debug, Clone, Serialize)]
pub struct TokenBudget {
    pub profile: usize,
    pub task_state: usize,
    pub summary: usize,
    pub recent_events: usize,
    pub semantic_chunks: usize,
    pub total: usize,
}

impl TokenBudget {
    pub fn from_config(config: &BudgetConfig) -> Self {
        Self {
            profile: config.profile_tokens,
            task_state: config.task_state_tokens,
            summary: config.summary_tokens,
            recent_events: config.events_tokens,
            semantic_chunks: config.chunks_tokens,
            total: config.total_tokens,
        }
    }
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self::from_config(&BudgetConfig::default())
    }
}

/// How many tokens each layer actually has on offer.
#[derive(Debug, Clone, Copy, Default)]
pub struct LayerAvailability {
    pub profile: usize,
    pub task_state: usize,
    pub summary: usize,
    pub recent_events: usize,
    pub semantic_chunks: usize,
}

/// Tokens granted to each layer; never exceeds the layer cap, the layer's
/// availability, or (summed) the total budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BudgetAllocation {
    pub profile: usize,
    pub task_state: usize,
    pub summary: usize,
    pub recent_events: usize,
    pub semantic_chunks: usize,
    /// Tokens left over after all layers were served.
    pub unused: usize,
}

/// Split `budget.total` across the layers in strict priority order.
///
/// Each layer receives `min(layer cap, layer availability, tokens left)`.
/// Shrinking the total squeezes the lowest-priority layers first.
pub fn allocate(budget: &TokenBudget, available: &LayerAvailability) -> BudgetAllocation {
    let mut remaining = budget.total;
    let mut grant = |cap: usize, avail: usize| {
        let granted = cap.min(avail).min(remaining);
        remaining -= granted;
        granted
    };

    let profile = grant(budget.profile, available.profile);
    let task_state = grant(budget.task_state, available.task_state);
    let summary = grant(budget.summary, available.summary);
    let recent_events = grant(budget.recent_events, available.recent_events);
    let semantic_chunks = grant(budget.semantic_chunks, available.semantic_chunks);

    BudgetAllocation {
        profile,
        task_state,
        summary,
        recent_events,
        semantic_chunks,
        unused: remaining,
    }
}

/// Outcome of [`trim_to_fit`]: the items that fit, in their original order.
#[derive(Debug, Clone)]
pub struct TrimResult<T> {
    pub kept: Vec<T>,
    /// Number of items dropped.
    pub trimmed: usize,
    /// Estimated tokens consumed by the kept items.
    pub tokens: usize,
}

/// Greedily keep items in their given order until the token budget is
/// exhausted. An item that does not fit is dropped; later (cheaper) items
/// may still fit. Order of the input is ranking order, so the caller's best
/// items are considered first.
pub fn trim_to_fit<T>(
    items: Vec<T>,
    max_tokens: usize,
    estimator: &TokenEstimator,
    text_of: impl Fn(&T) -> &str,
) -> TrimResult<T> {
    let mut kept = Vec::new();
    let mut trimmed = 0;
    let mut tokens = 0;

    for item in items {
        let cost = estimator.estimate(text_of(&item));
        if tokens + cost <= max_tokens {
            tokens += cost;
            kept.push(item);
        } else {
            trimmed += 1;
        }
    }

    TrimResult {
        kept,
        trimmed,
        tokens,
    }
}
