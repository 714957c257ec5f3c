//! Text-to-vector embedding capability.
//!
//! The core never talks to a provider SDK directly. Callers inject an
//! [`EmbeddingProvider`] implementation (OpenAI, local ONNX, a test mock);
//! the core only requires `embed` and a declared dimension. Provider
//! failures are always recovered by the caller — a failed embed degrades
//! vector search to FTS-only, never to a hard failure.

pub mod cache;

use anyhow::Result;

/// Trait for embedding text into vectors.
///
/// Implementations produce vectors of exactly `dimensions()` length,
/// L2-normalized. All methods are synchronous — callers in async contexts
/// should use a blocking-task wrapper.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of text strings. Implementations may override for
    /// batched inference or batched API calls.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Number of dimensions this provider produces.
    fn dimensions(&self) -> usize;

    /// Provider identifier used in cache keys (e.g. `"openai"`).
    fn provider_id(&self) -> &str;

    /// Model identifier used in cache keys (e.g. `"text-embedding-3-small"`).
    fn model_id(&self) -> &str;
}
