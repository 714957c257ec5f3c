//! Composition root tying storage, embeddings, ranking, trees, and budget
//! together behind one handle.
//!
//! [`KnowledgeManager`] owns the database connection and an optional
//! embedding provider. Embedding failures are absorbed here: a chunk whose
//! embedding cannot be produced is stored FTS-only, and a search whose
//! query embedding fails degrades to keyword search. Storage failures still
//! propagate — a database that cannot be written is not a degraded mode.

use chrono::Utc;
use rusqlite::Connection;

use crate::budget::{self, BudgetAllocation, LayerAvailability, TokenBudget, TokenEstimator, TrimResult};
use crate::chunk::store::{self as chunk_store, SearchOptions};
use crate::chunk::types::{NewChunk, SemanticChunk, SemanticSearchResult};
use crate::config::TrellisConfig;
use crate::db;
use crate::embedding::cache;
use crate::embedding::EmbeddingProvider;
use crate::error::{Error, Result};
use crate::rank::fuse::{self, FuseConfig};
use crate::rank::pipeline::{self, PipelineConfig};
use crate::tree::search::{self as tree_search, TreeSearchOptions, TreeSearchResult};
use crate::tree::store as tree_store;
use crate::tree::types::{NewNode, NewRoot, NodePatch, TreeNode, TreeRoot, TreeType};

pub struct KnowledgeManager {
    conn: Connection,
    config: TrellisConfig,
    pipeline: PipelineConfig,
    provider: Option<Box<dyn EmbeddingProvider>>,
}

impl KnowledgeManager {
    /// Open the database named by the config and run migrations. No
    /// embedding provider is attached yet; until one is, everything runs
    /// FTS-only.
    pub fn open(config: TrellisConfig) -> anyhow::Result<Self> {
        let conn = db::open_database(config.resolved_db_path(), config.embedding.dimensions)?;
        Ok(Self::with_connection(conn, config))
    }

    fn with_connection(conn: Connection, config: TrellisConfig) -> Self {
        let pipeline = PipelineConfig {
            min_score: config.ranking.min_score,
            ..PipelineConfig::default()
        };
        Self {
            conn,
            config,
            pipeline,
            provider: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn open_in_memory(config: TrellisConfig) -> anyhow::Result<Self> {
        let conn = db::open_memory_database(config.embedding.dimensions)?;
        db::migrations::run_migrations(&conn)?;
        Ok(Self::with_connection(conn, config))
    }

    /// Attach an embedding provider. Its dimension must match the database;
    /// a model switch is recorded and logged since cached vectors from the
    /// old model stay keyed separately.
    pub fn attach_provider(&mut self, provider: Box<dyn EmbeddingProvider>) -> Result<()> {
        let expected = self.config.embedding.dimensions;
        if provider.dimensions() != expected {
            return Err(Error::DimensionMismatch {
                expected,
                actual: provider.dimensions(),
            });
        }

        let model = provider.model_id().to_string();
        if let Some(previous) = db::migrations::get_embedding_model(&self.conn)? {
            if previous != "unset" && previous != model {
                tracing::warn!(from = %previous, to = %model, "embedding model changed");
            }
        }
        db::migrations::set_embedding_model(&self.conn, &model)?;

        self.provider = Some(provider);
        Ok(())
    }

    /// Decay and diversity stages of the ranking pipeline, tunable per
    /// manager instance.
    pub fn pipeline_config_mut(&mut self) -> &mut PipelineConfig {
        &mut self.pipeline
    }

    pub fn config(&self) -> &TrellisConfig {
        &self.config
    }

    // ── Chunks ────────────────────────────────────────────────────────────

    /// Store a chunk, embedding its text through the cache when a provider
    /// is attached. Embedding failure stores the chunk without a vector.
    pub fn add_chunk(&mut self, mut input: NewChunk) -> Result<SemanticChunk> {
        if input.embedding.is_none() {
            input.embedding = self.embed_cached(&input.text);
        }
        chunk_store::add_chunk(&mut self.conn, input, self.config.embedding.dimensions)
    }

    pub fn get_chunk(&self, id: &str) -> Result<Option<SemanticChunk>> {
        chunk_store::get_chunk(&self.conn, id)
    }

    pub fn patch_chunk_metadata(&self, id: &str, metadata: &serde_json::Value) -> Result<()> {
        chunk_store::patch_metadata(&self.conn, id, metadata)
    }

    pub fn delete_session(&mut self, session_id: &str) -> Result<usize> {
        chunk_store::delete_by_session(&mut self.conn, session_id)
    }

    /// Hybrid search through the full ranking pipeline.
    ///
    /// FTS and vector lists are retrieved independently (over-fetched by
    /// the candidate multiplier), fused by weighted reciprocal rank, then
    /// run through min-score filter, temporal decay, and MMR. With no
    /// provider or a failed query embedding, only the FTS list feeds the
    /// fusion.
    pub fn search(
        &mut self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SemanticSearchResult>> {
        let limit = if options.limit == 0 {
            self.config.ranking.default_limit
        } else {
            options.limit
        };
        let candidates = SearchOptions {
            tags: options.tags.clone(),
            session_id: options.session_id.clone(),
            limit: limit * self.config.ranking.candidate_multiplier.max(1),
        };

        let fts = chunk_store::search_fts(&self.conn, query, &candidates)?;
        let vector = match self.embed_cached(query) {
            Some(embedding) => chunk_store::search_vector(&self.conn, &embedding, &candidates)?,
            None => Vec::new(),
        };

        let fuse_config = FuseConfig {
            fts_weight: self.config.ranking.fts_weight,
            vector_weight: self.config.ranking.vector_weight,
            rrf_k: self.config.ranking.rrf_k,
        };
        let fused = fuse::fuse(fts, vector, &fuse_config);
        Ok(pipeline::run(fused, limit, &self.pipeline, Utc::now()))
    }

    // ── Trees ─────────────────────────────────────────────────────────────

    pub fn create_root(&self, input: NewRoot) -> Result<TreeRoot> {
        tree_store::create_root(&self.conn, input)
    }

    pub fn get_root(&self, id: &str) -> Result<Option<TreeRoot>> {
        tree_store::get_root(&self.conn, id)
    }

    pub fn list_roots(&self, tree_type: Option<TreeType>) -> Result<Vec<TreeRoot>> {
        tree_store::list_roots(&self.conn, tree_type)
    }

    pub fn delete_root(&mut self, id: &str) -> Result<usize> {
        tree_store::delete_root(&mut self.conn, id)
    }

    pub fn create_node(&mut self, root_id: &str, input: NewNode) -> Result<TreeNode> {
        tree_store::create_node(&mut self.conn, root_id, input)
    }

    pub fn get_node(&self, id: &str) -> Result<Option<TreeNode>> {
        tree_store::get_node(&self.conn, id)
    }

    pub fn get_node_by_path(&self, root_id: &str, path: &str) -> Result<Option<TreeNode>> {
        tree_store::get_node_by_path(&self.conn, root_id, path)
    }

    pub fn get_children(&self, parent_id: &str) -> Result<Vec<TreeNode>> {
        tree_store::get_children(&self.conn, parent_id)
    }

    pub fn update_node(&self, id: &str, patch: NodePatch) -> Result<TreeNode> {
        tree_store::update_node(&self.conn, id, patch)
    }

    pub fn delete_node(&mut self, id: &str) -> Result<()> {
        tree_store::delete_node(&mut self.conn, id)
    }

    pub fn delete_subtree(&mut self, id: &str) -> Result<usize> {
        tree_store::delete_subtree(&mut self.conn, id)
    }

    pub fn move_subtree(&mut self, node_id: &str, new_parent_id: Option<&str>) -> Result<()> {
        tree_store::move_subtree(&mut self.conn, node_id, new_parent_id)
    }

    pub fn get_ancestor_ids(&self, id: &str) -> Result<Vec<String>> {
        tree_store::get_ancestor_ids(&self.conn, id)
    }

    pub fn get_descendant_ids(&self, id: &str) -> Result<Vec<String>> {
        tree_store::get_descendant_ids(&self.conn, id)
    }

    /// Semantic search scoped to tree structure, degrading to FTS-only when
    /// the query embedding is unavailable.
    pub fn search_tree(
        &mut self,
        query: &str,
        options: &TreeSearchOptions,
    ) -> Result<Vec<TreeSearchResult>> {
        let embedding = self.embed_cached(query);
        tree_search::search(&self.conn, query, embedding.as_deref(), options)
    }

    pub fn find_nodes(&self, options: &TreeSearchOptions) -> Result<Vec<TreeSearchResult>> {
        tree_search::find_nodes(&self.conn, options)
    }

    // ── Budget ────────────────────────────────────────────────────────────

    pub fn token_budget(&self) -> TokenBudget {
        TokenBudget::from_config(&self.config.budget)
    }

    pub fn allocate_budget(&self, available: &LayerAvailability) -> BudgetAllocation {
        budget::allocate(&self.token_budget(), available)
    }

    /// Trim ranked search results to a token allowance, best-ranked first.
    pub fn trim_results(
        &self,
        results: Vec<SemanticSearchResult>,
        max_tokens: usize,
    ) -> TrimResult<SemanticSearchResult> {
        let estimator = TokenEstimator::from_config(&self.config.budget);
        budget::trim_to_fit(results, max_tokens, &estimator, |r| r.chunk.text.as_str())
    }

    // ── Cache ─────────────────────────────────────────────────────────────

    pub fn prune_cache(&mut self) -> Result<cache::PruneResult> {
        cache::prune(&mut self.conn, &self.config.cache)
    }

    pub fn cache_stats(&self) -> Result<cache::CacheStats> {
        cache::stats(&self.conn)
    }

    /// Embed text through the cache. Returns `None` (with a warning) when
    /// no provider is attached or the provider fails; callers degrade.
    fn embed_cached(&mut self, text: &str) -> Option<Vec<f32>> {
        let provider = self.provider.as_ref()?;
        let provider_id = provider.provider_id().to_string();
        let model_id = provider.model_id().to_string();

        if self.config.cache.enabled {
            match cache::get(&self.conn, text, &provider_id, &model_id, &self.config.cache) {
                Ok(Some(embedding)) => return Some(embedding),
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "embedding cache read failed"),
            }
        }

        match provider.embed(text) {
            Ok(embedding) => {
                if self.config.cache.enabled {
                    if let Err(e) = cache::set(
                        &mut self.conn,
                        text,
                        &embedding,
                        &provider_id,
                        &model_id,
                        &self.config.cache,
                    ) {
                        tracing::warn!(error = %e, "embedding cache write failed");
                    }
                }
                Some(embedding)
            }
            Err(e) => {
                tracing::warn!(error = %e, "embedding failed, continuing without vector");
                None
            }
        }
    }
}
