//! Small dense-vector helpers shared by the ranking, index, and explain paths.

/// Dot product of two equal-length vectors.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Euclidean norm.
pub fn norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

/// Cosine similarity. Returns 0 when either vector has zero norm.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let denom = norm(a) * norm(b);
    if denom == 0.0 {
        return 0.0;
    }
    dot(a, b) / denom
}

/// Returns an L2-normalized copy; a zero vector is returned unchanged.
pub fn normalized(v: &[f32]) -> Vec<f32> {
    let n = norm(v);
    if n == 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / n).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.3, -1.2, 4.0];
        assert!((cosine(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_zero_vector_is_zero() {
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn normalized_has_unit_norm() {
        let v = normalized(&[3.0, 4.0]);
        assert!((norm(&v) - 1.0).abs() < 1e-6);
        assert!((v[0] - 0.6).abs() < 1e-6);
    }

    /// For unit vectors the L2 distance and the cosine are tied by
    /// `1 - d^2 / 2 == cos`.
    #[test]
    fn l2_cosine_identity_for_unit_vectors() {
        let u = normalized(&[0.2, 0.5, -0.8, 0.1]);
        let v = normalized(&[-0.3, 0.9, 0.4, 0.2]);
        let d2: f32 = u.iter().zip(&v).map(|(x, y)| (x - y) * (x - y)).sum();
        let via_distance = 1.0 - d2 / 2.0;
        assert!((via_distance - dot(&u, &v)).abs() < 1e-5);
    }
}
