//! Shared helpers for integration tests.
#![allow(dead_code)]

use rusqlite::Connection;
use tempfile::TempDir;
use trellis::config::{CacheConfig, EmbeddingConfig, StorageConfig, TrellisConfig};
use trellis::db;
use trellis::embedding::EmbeddingProvider;

/// Small embedding dimension keeps test vectors readable.
pub const DIM: usize = 8;

/// A fresh on-disk database in a temp directory. The directory guard must
/// stay alive for the connection to remain valid.
pub fn test_db() -> (TempDir, Connection) {
    let dir = TempDir::new().expect("create temp dir");
    let conn = db::open_database(dir.path().join("test.db"), DIM).expect("open database");
    (dir, conn)
}

/// Config pointing at a database inside a temp directory.
pub fn test_config(dir: &TempDir) -> TrellisConfig {
    TrellisConfig {
        storage: StorageConfig {
            db_path: dir
                .path()
                .join("test.db")
                .to_string_lossy()
                .into_owned(),
        },
        embedding: EmbeddingConfig {
            provider: "mock".into(),
            model: "mock-small".into(),
            dimensions: DIM,
        },
        cache: CacheConfig {
            enabled: true,
            ..CacheConfig::default()
        },
        ..TrellisConfig::default()
    }
}

/// Unit vector with a single hot axis.
pub fn spike(axis: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[axis % DIM] = 1.0;
    v
}

/// Deterministic embedding provider: folds text bytes into a unit vector,
/// so identical text always embeds identically.
pub struct MockProvider;

impl EmbeddingProvider for MockProvider {
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut v = vec![0.0f32; DIM];
        for (i, b) in text.bytes().enumerate() {
            v[i % DIM] += b as f32;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1.0);
        Ok(v.into_iter().map(|x| x / norm).collect())
    }

    fn dimensions(&self) -> usize {
        DIM
    }

    fn provider_id(&self) -> &str {
        "mock"
    }

    fn model_id(&self) -> &str {
        "mock-small"
    }
}
