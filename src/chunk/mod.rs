pub mod store;
pub mod types;

/// Convert an f32 embedding slice to raw bytes for sqlite-vec.
pub fn embedding_to_bytes(embedding: &[f32]) -> &[u8] {
    unsafe {
        std::slice::from_raw_parts(
            embedding.as_ptr() as *const u8,
            embedding.len() * std::mem::size_of::<f32>(),
        )
    }
}

/// Convert raw bytes from a vec0/cache BLOB column back to f32s.
pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Convert an L2 distance between unit vectors to cosine similarity.
///
/// For unit vectors, `d^2 = 2 - 2*cos`, so `cos = 1 - d^2/2`.
pub fn l2_to_cosine(distance: f64) -> f64 {
    1.0 - (distance * distance) / 2.0
}

/// Cosine similarity between two vectors. Returns 0.0 for zero-norm inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += (*x as f64) * (*y as f64);
        norm_a += (*x as f64) * (*x as f64);
        norm_b += (*y as f64) * (*y as f64);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_round_trip() {
        let v = vec![0.25f32, -1.5, 3.0];
        let bytes = embedding_to_bytes(&v).to_vec();
        assert_eq!(bytes_to_embedding(&bytes), v);
    }

    #[test]
    fn l2_to_cosine_unit_vectors() {
        // identical unit vectors: d=0 -> cos=1
        assert!((l2_to_cosine(0.0) - 1.0).abs() < 1e-12);
        // orthogonal unit vectors: d=sqrt(2) -> cos=0
        assert!(l2_to_cosine(std::f64::consts::SQRT_2).abs() < 1e-12);
    }

    #[test]
    fn cosine_similarity_basics() {
        let a = [1.0f32, 0.0];
        let b = [0.0f32, 1.0];
        assert!(cosine_similarity(&a, &a) > 0.999);
        assert!(cosine_similarity(&a, &b).abs() < 1e-9);
        assert_eq!(cosine_similarity(&a, &[]), 0.0);
    }
}
