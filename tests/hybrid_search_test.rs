//! Chunk store integration: FTS, vector, and hybrid search against a real
//! on-disk database with the sqlite-vec extension loaded.

mod helpers;

use helpers::{spike, test_db, DIM};
use trellis::chunk::store::{self, SearchOptions};
use trellis::chunk::types::{MatchType, NewChunk};

fn chunk_with_embedding(text: &str, axis: usize) -> NewChunk {
    NewChunk {
        embedding: Some(spike(axis)),
        ..NewChunk::text(text)
    }
}

#[test]
fn fts_finds_keyword_matches_only() {
    let (_dir, mut conn) = test_db();
    store::add_chunk(&mut conn, NewChunk::text("the postgres query planner"), DIM).unwrap();
    store::add_chunk(&mut conn, NewChunk::text("watercolor painting basics"), DIM).unwrap();

    let hits = store::search_fts(&conn, "query planner", &SearchOptions::default()).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].match_type, MatchType::Fts);
    assert!(hits[0].chunk.text.contains("postgres"));
}

#[test]
fn vector_search_orders_by_cosine_similarity() {
    let (_dir, mut conn) = test_db();
    let near = store::add_chunk(&mut conn, chunk_with_embedding("near", 0), DIM).unwrap();
    let far = store::add_chunk(&mut conn, chunk_with_embedding("far", 1), DIM).unwrap();

    let hits = store::search_vector(&conn, &spike(0), &SearchOptions::default()).unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].chunk.id, near.id);
    assert_eq!(hits[1].chunk.id, far.id);
    assert!(hits[0].score > hits[1].score);
    // Identical unit vectors have cosine similarity 1
    assert!((hits[0].score - 1.0).abs() < 1e-5);
}

#[test]
fn hybrid_unions_both_engines() {
    let (_dir, mut conn) = test_db();
    // Keyword-only hit
    store::add_chunk(&mut conn, NewChunk::text("zeppelin maintenance log"), DIM).unwrap();
    // Vector-only hit (no shared keywords)
    store::add_chunk(&mut conn, chunk_with_embedding("unrelated words entirely", 3), DIM).unwrap();

    let hits = store::search_hybrid(
        &conn,
        "zeppelin",
        Some(&spike(3)),
        &SearchOptions::default(),
    )
    .unwrap();

    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.match_type == MatchType::Hybrid));
}

#[test]
fn session_and_tag_filters_apply_post_search() {
    let (_dir, mut conn) = test_db();
    store::add_chunk(
        &mut conn,
        NewChunk {
            session_id: Some("s1".into()),
            tags: vec!["alpha".into()],
            ..NewChunk::text("shared phrase one")
        },
        DIM,
    )
    .unwrap();
    store::add_chunk(
        &mut conn,
        NewChunk {
            session_id: Some("s2".into()),
            tags: vec!["beta".into()],
            ..NewChunk::text("shared phrase two")
        },
        DIM,
    )
    .unwrap();

    let by_session = store::search_fts(
        &conn,
        "shared phrase",
        &SearchOptions {
            session_id: Some("s1".into()),
            ..SearchOptions::default()
        },
    )
    .unwrap();
    assert_eq!(by_session.len(), 1);
    assert_eq!(by_session[0].chunk.session_id.as_deref(), Some("s1"));

    let by_tag = store::search_fts(
        &conn,
        "shared phrase",
        &SearchOptions {
            tags: vec!["beta".into()],
            ..SearchOptions::default()
        },
    )
    .unwrap();
    assert_eq!(by_tag.len(), 1);
    assert_eq!(by_tag[0].chunk.tags, vec!["beta".to_string()]);
}

#[test]
fn delete_by_session_clears_all_indexes() {
    let (_dir, mut conn) = test_db();
    store::add_chunk(
        &mut conn,
        NewChunk {
            session_id: Some("doomed".into()),
            embedding: Some(spike(0)),
            ..NewChunk::text("ephemeral scratch notes")
        },
        DIM,
    )
    .unwrap();
    let keeper = store::add_chunk(&mut conn, NewChunk::text("permanent record"), DIM).unwrap();

    let removed = store::delete_by_session(&mut conn, "doomed").unwrap();
    assert_eq!(removed, 1);

    assert!(store::search_fts(&conn, "ephemeral", &SearchOptions::default())
        .unwrap()
        .is_empty());
    assert!(store::search_vector(&conn, &spike(0), &SearchOptions::default())
        .unwrap()
        .is_empty());
    assert!(store::get_chunk(&conn, &keeper.id).unwrap().is_some());
}

#[test]
fn wrong_dimension_embedding_is_rejected() {
    let (_dir, mut conn) = test_db();
    let err = store::add_chunk(
        &mut conn,
        NewChunk {
            embedding: Some(vec![1.0, 0.0]),
            ..NewChunk::text("bad vector")
        },
        DIM,
    )
    .unwrap_err();
    assert!(matches!(err, trellis::Error::DimensionMismatch { expected: 8, actual: 2 }));
}
