//! Similarity math over embedding vectors.
//!
//! Stored vectors are expected to be L2-normalized by the embedder, so the
//! plain dot product is used as the similarity score (it equals cosine
//! similarity for unit vectors). Everything here is pure: no I/O and no
//! shared state.
//!
//! # Ranking
//! [`top_n`] is a stable descending sort: equal scores keep the order in
//! which the candidates were supplied, which makes store queries
//! deterministic for a fixed store and query vector.

use crate::vector::types::VectorError;

/// Computes the dot product of two vectors.
///
/// Both vectors must have the same length. [`FileVectorStore::query`] and
/// [`classify`] check this before scoring; other callers should validate
/// with [`VectorDimension::validate_vector`] first.
///
/// [`FileVectorStore::query`]: crate::vector::FileVectorStore::query
/// [`classify`]: fn@crate::vector::classify
/// [`VectorDimension::validate_vector`]: crate::vector::VectorDimension::validate_vector
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have same dimension");

    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Returns `v / ‖v‖₂`.
///
/// A zero vector has no direction; dividing by a zero norm yields NaN
/// components. Callers that cannot rule this out should go through
/// [`mean_prototype`] or [`update_prototype`], which reject it.
pub fn normalize_l2(vector: &[f32]) -> Vec<f32> {
    let norm = l2_norm(vector);
    vector.iter().map(|value| value / norm).collect()
}

fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scores `query` against every candidate, preserving candidate order.
pub fn similarities<V: AsRef<[f32]>>(query: &[f32], candidates: &[V]) -> Vec<f32> {
    candidates
        .iter()
        .map(|candidate| dot(query, candidate.as_ref()))
        .collect()
}

/// Returns the indices of the `n` best scores that are `>= threshold`.
///
/// Indices are ordered by descending score; ties keep their original
/// relative order. NaN scores never pass the threshold.
pub fn top_n(scores: &[f32], n: usize, threshold: f32) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..scores.len())
        .filter(|&i| scores[i] >= threshold)
        .collect();

    // sort_by is stable, so equal scores stay in submission order
    indices.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
    indices.truncate(n);
    indices
}

/// Builds a class prototype as the normalized mean of `vectors`.
///
/// # Errors
/// - [`VectorError::EmptyInput`] when no vectors are given
/// - [`VectorError::DimensionMismatch`] when the vectors disagree on length
/// - [`VectorError::ZeroNorm`] when the mean is the zero vector
pub fn mean_prototype<V: AsRef<[f32]>>(vectors: &[V]) -> Result<Vec<f32>, VectorError> {
    let first = vectors.first().ok_or(VectorError::EmptyInput {
        operation: "prototype aggregation",
    })?;
    let dimension = first.as_ref().len();

    let mut sum = vec![0.0f32; dimension];
    accumulate(&mut sum, vectors)?;

    let count = vectors.len() as f32;
    for value in sum.iter_mut() {
        *value /= count;
    }

    normalize_checked(&sum)
}

/// Folds new example vectors into an existing prototype.
///
/// Computes `normalize((N·old + Σ new) / (N + |new|))` and returns the
/// updated prototype with the new sample count. With `old_count == 0` the
/// old prototype is ignored and the result is the mean of `new_vectors`.
/// An empty `new_vectors` leaves the prototype and count unchanged.
pub fn update_prototype<V: AsRef<[f32]>>(
    old_prototype: &[f32],
    old_count: usize,
    new_vectors: &[V],
) -> Result<(Vec<f32>, usize), VectorError> {
    if new_vectors.is_empty() {
        return Ok((old_prototype.to_vec(), old_count));
    }
    if old_count == 0 {
        return Ok((mean_prototype(new_vectors)?, new_vectors.len()));
    }

    let weight = old_count as f32;
    let mut sum: Vec<f32> = old_prototype.iter().map(|value| value * weight).collect();
    accumulate(&mut sum, new_vectors)?;

    let total = old_count + new_vectors.len();
    for value in sum.iter_mut() {
        *value /= total as f32;
    }

    Ok((normalize_checked(&sum)?, total))
}

/// Packs a batch of vectors into one contiguous buffer.
pub fn flatten<V: AsRef<[f32]>>(vectors: &[V], dimension: usize) -> Result<Vec<f32>, VectorError> {
    let mut flat = Vec::with_capacity(vectors.len() * dimension);
    for vector in vectors {
        let vector = vector.as_ref();
        if vector.len() != dimension {
            return Err(VectorError::DimensionMismatch {
                expected: dimension,
                actual: vector.len(),
            });
        }
        flat.extend_from_slice(vector);
    }
    Ok(flat)
}

/// Splits a contiguous buffer back into `flat.len() / dimension` vectors.
///
/// Trailing values that do not fill a whole vector are dropped.
pub fn unflatten(flat: &[f32], dimension: usize) -> Vec<Vec<f32>> {
    if dimension == 0 {
        return Vec::new();
    }
    flat.chunks_exact(dimension).map(<[f32]>::to_vec).collect()
}

fn accumulate<V: AsRef<[f32]>>(sum: &mut [f32], vectors: &[V]) -> Result<(), VectorError> {
    for vector in vectors {
        let vector = vector.as_ref();
        if vector.len() != sum.len() {
            return Err(VectorError::DimensionMismatch {
                expected: sum.len(),
                actual: vector.len(),
            });
        }
        for (acc, &value) in sum.iter_mut().zip(vector) {
            *acc += value;
        }
    }
    Ok(())
}

fn normalize_checked(vector: &[f32]) -> Result<Vec<f32>, VectorError> {
    if l2_norm(vector) == 0.0 {
        return Err(VectorError::ZeroNorm);
    }
    Ok(normalize_l2(vector))
}
