//! Ranking pipeline integration: fusion, decay, and MMR working together
//! over results produced by the real chunk store.

mod helpers;

use chrono::{Duration, Utc};
use helpers::{spike, test_db, DIM};
use trellis::chunk::store::{self, SearchOptions};
use trellis::chunk::types::NewChunk;
use trellis::rank::decay::{DecayConfig, DecayFunction};
use trellis::rank::fuse::{self, FuseConfig};
use trellis::rank::mmr::{self, MmrConfig};
use trellis::rank::pipeline::{self, PipelineConfig};

#[test]
fn near_duplicate_results_are_diversified() {
    let (_dir, mut conn) = test_db();
    store::add_chunk(
        &mut conn,
        NewChunk {
            embedding: Some(spike(0)),
            ..NewChunk::text("grandma's apple pie recipe with cinnamon")
        },
        DIM,
    )
    .unwrap();
    store::add_chunk(
        &mut conn,
        NewChunk {
            embedding: Some(spike(0)),
            ..NewChunk::text("classic apple pie recipe with cinnamon crust")
        },
        DIM,
    )
    .unwrap();
    store::add_chunk(
        &mut conn,
        NewChunk {
            embedding: Some(spike(4)),
            ..NewChunk::text("savory mushroom tart with thyme")
        },
        DIM,
    )
    .unwrap();

    let results = store::search_vector(&conn, &spike(0), &SearchOptions::default()).unwrap();
    assert_eq!(results.len(), 3);

    let picks = mmr::apply_mmr(
        results,
        2,
        &MmrConfig {
            lambda: 0.5,
            ..MmrConfig::default()
        },
    );

    // Top pick is an apple pie; the second is the mushroom tart, because
    // the other pie is nearly identical to the first.
    assert_eq!(picks.len(), 2);
    assert!(picks[0].result.chunk.text.contains("apple pie"));
    assert!(picks[1].result.chunk.text.contains("mushroom"));
    assert!(picks[1].max_similarity < 0.5);
}

#[test]
fn older_chunks_rank_lower_under_decay() {
    let (_dir, mut conn) = test_db();
    let old_stamp = (Utc::now() - Duration::days(90)).to_rfc3339();
    store::add_chunk(
        &mut conn,
        NewChunk {
            timestamp: Some(old_stamp),
            ..NewChunk::text("shared keyword from last quarter")
        },
        DIM,
    )
    .unwrap();
    store::add_chunk(&mut conn, NewChunk::text("shared keyword from today"), DIM).unwrap();

    let results = store::search_fts(&conn, "shared keyword", &SearchOptions::default()).unwrap();
    assert_eq!(results.len(), 2);

    let config = PipelineConfig {
        min_score: 0.0,
        decay: DecayConfig {
            enabled: true,
            function: DecayFunction::Exponential { half_life_days: 30.0 },
            min_multiplier: 0.0,
        },
        mmr: MmrConfig {
            enabled: false,
            ..MmrConfig::default()
        },
    };
    let ranked = pipeline::run(results, 10, &config, Utc::now());

    assert!(ranked[0].chunk.text.contains("today"));
    assert!(ranked[1].chunk.text.contains("last quarter"));
    // 90 days at a 30-day half-life is roughly one eighth
    assert!(ranked[1].score < ranked[0].score * 0.2);
}

#[test]
fn fusion_promotes_chunks_found_by_both_engines() {
    let (_dir, mut conn) = test_db();
    store::add_chunk(
        &mut conn,
        NewChunk {
            embedding: Some(spike(0)),
            ..NewChunk::text("kubernetes ingress controller configuration")
        },
        DIM,
    )
    .unwrap();
    store::add_chunk(&mut conn, NewChunk::text("kubernetes pod eviction notes"), DIM).unwrap();
    store::add_chunk(
        &mut conn,
        NewChunk {
            embedding: Some(spike(1)),
            ..NewChunk::text("unrelated grocery list")
        },
        DIM,
    )
    .unwrap();

    let options = SearchOptions::default();
    let fts = store::search_fts(&conn, "kubernetes ingress", &options).unwrap();
    let vector = store::search_vector(&conn, &spike(0), &options).unwrap();

    let fused = fuse::fuse(fts, vector, &FuseConfig::default());
    assert_eq!(fused[0].chunk.text, "kubernetes ingress controller configuration");
}
