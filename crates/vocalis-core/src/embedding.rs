//! Embedding vector math: normalization, fusion arithmetic, cosine scoring,
//! and the fixed-width f32 blob codec used by the profile store.

use crate::error::{AuthError, AuthResult};

/// Scale `v` in place to unit L2 norm. A zero vector is left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let mut norm: f64 = 0.0;
    for &x in v.iter() {
        norm += (x as f64) * (x as f64);
    }
    norm = norm.sqrt();
    if norm > 0.0 {
        let scale = (1.0 / norm) as f32;
        for x in v.iter_mut() {
            *x *= scale;
        }
    }
}

/// Arithmetic mean of one or more equally sized vectors.
pub fn mean_embedding(samples: &[Vec<f32>]) -> AuthResult<Vec<f32>> {
    let first = samples
        .first()
        .ok_or_else(|| AuthError::Validation("no embedding samples supplied".into()))?;
    let dim = first.len();
    if dim == 0 {
        return Err(AuthError::Validation("empty embedding sample".into()));
    }
    let mut acc = vec![0.0f64; dim];
    for s in samples {
        if s.len() != dim {
            return Err(AuthError::DimensionMismatch {
                expected: dim,
                got: s.len(),
            });
        }
        for (a, &x) in acc.iter_mut().zip(s.iter()) {
            *a += x as f64;
        }
    }
    let n = samples.len() as f64;
    Ok(acc.iter().map(|&a| (a / n) as f32).collect())
}

/// Cosine similarity between two vectors, defensively normalized, clamped to
/// [-1, 1]. Returns 0.0 when either side has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> AuthResult<f32> {
    if a.len() != b.len() {
        return Err(AuthError::DimensionMismatch {
            expected: b.len(),
            got: a.len(),
        });
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let xf = x as f64;
        let yf = y as f64;
        dot += xf * yf;
        norm_a += xf * xf;
        norm_b += yf * yf;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }
    let cosine = (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0);
    Ok(cosine as f32)
}

/// Weighted centroid fusion of an existing template with the mean of a new
/// sample batch. Each side is weighted by the number of samples it
/// represents, then the sum is re-normalized (the sum of two unit vectors is
/// not unit length).
pub fn fuse_weighted(
    old: &[f32],
    old_count: u32,
    new_mean: &[f32],
    new_count: u32,
) -> AuthResult<Vec<f32>> {
    if old.len() != new_mean.len() {
        return Err(AuthError::DimensionMismatch {
            expected: old.len(),
            got: new_mean.len(),
        });
    }
    let mut fused: Vec<f32> = old
        .iter()
        .zip(new_mean.iter())
        .map(|(&o, &n)| o * old_count as f32 + n * new_count as f32)
        .collect();
    l2_normalize(&mut fused);
    Ok(fused)
}

/// Encode a vector as little-endian f32 bytes for blob storage.
pub fn encode_blob(v: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(v.len() * 4);
    for &x in v {
        out.extend_from_slice(&x.to_le_bytes());
    }
    out
}

/// Decode a blob written by [`encode_blob`], checking it matches the
/// configured dimensionality. A mismatch means the store was written under a
/// different model configuration and is fatal.
pub fn decode_blob(bytes: &[u8], expected_dim: usize) -> AuthResult<Vec<f32>> {
    if bytes.len() != expected_dim * 4 {
        return Err(AuthError::DimensionMismatch {
            expected: expected_dim,
            got: bytes.len() / 4,
        });
    }
    let mut out = Vec::with_capacity(expected_dim);
    for chunk in bytes.chunks_exact(4) {
        out.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(v: &[f32]) -> f64 {
        v.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>().sqrt()
    }

    #[test]
    fn normalize_unit() {
        let mut v = vec![3.0f32, 4.0];
        l2_normalize(&mut v);
        assert!((norm(&v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn normalize_zero_vector_untouched() {
        let mut v = vec![0.0f32; 4];
        l2_normalize(&mut v);
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn cosine_identical_is_one() {
        let a = vec![1.0f32, 2.0, 3.0];
        let score = cosine_similarity(&a, &a).unwrap();
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_is_zero() {
        let a = vec![1.0f32, 0.0, 0.0];
        let b = vec![0.0f32, 1.0, 0.0];
        let score = cosine_similarity(&a, &b).unwrap();
        assert!(score.abs() < 1e-6);
    }

    #[test]
    fn cosine_opposite_is_minus_one() {
        let a = vec![1.0f32, 2.0, 3.0];
        let b: Vec<f32> = a.iter().map(|x| -x).collect();
        let score = cosine_similarity(&a, &b).unwrap();
        assert!((score + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_stays_in_range() {
        let mut state = 0x9E37_79B9u64;
        let mut next = || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((state >> 33) as f32 / u32::MAX as f32) * 2.0 - 1.0
        };
        for _ in 0..100 {
            let a: Vec<f32> = (0..192).map(|_| next()).collect();
            let b: Vec<f32> = (0..192).map(|_| next()).collect();
            let score = cosine_similarity(&a, &b).unwrap();
            assert!((-1.0..=1.0).contains(&score));
        }
    }

    #[test]
    fn cosine_dimension_mismatch() {
        let a = vec![1.0f32, 2.0];
        let b = vec![1.0f32, 2.0, 3.0];
        assert!(matches!(
            cosine_similarity(&a, &b),
            Err(AuthError::DimensionMismatch { expected: 3, got: 2 })
        ));
    }

    #[test]
    fn mean_of_ragged_samples_rejected() {
        let samples = vec![vec![1.0f32, 0.0], vec![1.0f32, 0.0, 0.0]];
        assert!(matches!(
            mean_embedding(&samples),
            Err(AuthError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn fuse_self_keeps_direction() {
        let mut template = vec![0.6f32, 0.8];
        l2_normalize(&mut template);
        let fused = fuse_weighted(&template, 10, &template, 3).unwrap();
        let score = cosine_similarity(&template, &fused).unwrap();
        assert!((score - 1.0).abs() < 1e-6);
        assert!((norm(&fused) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn fuse_weights_by_sample_count() {
        let old = vec![1.0f32, 0.0];
        let new = vec![0.0f32, 1.0];
        let heavy_old = fuse_weighted(&old, 100, &new, 1).unwrap();
        let balanced = fuse_weighted(&old, 1, &new, 1).unwrap();
        // 100 prior samples dominate a single new one.
        assert!(heavy_old[0] > 0.99);
        assert!((balanced[0] - balanced[1]).abs() < 1e-6);
    }

    #[test]
    fn blob_roundtrip() {
        let v = vec![0.25f32, -1.5, 3.75, 0.0];
        let blob = encode_blob(&v);
        assert_eq!(blob.len(), 16);
        let back = decode_blob(&blob, 4).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn blob_wrong_dim_is_fatal() {
        let blob = encode_blob(&[1.0f32, 2.0]);
        assert!(matches!(
            decode_blob(&blob, 3),
            Err(AuthError::DimensionMismatch { expected: 3, got: 2 })
        ));
    }
}
