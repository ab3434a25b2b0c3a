//! Cosine similarity and the vector index interface.
//!
//! Retrieval only needs `insert` and nearest-k; [`FlatIndex`] is the
//! brute-force implementation and can be replaced by a real index without
//! touching the retrieval filters.

use crate::store::CaseId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("vector is empty")]
    Empty,
}

/// Cosine similarity in `[-1, 1]`.
///
/// `None` when lengths differ, a vector is empty, or either has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }

    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    Some(similarity.clamp(-1.0, 1.0) as f32)
}

/// Cosine distance `1 - cos(a, b)`, in `[0, 2]`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> Option<f32> {
    cosine_similarity(a, b).map(|s| 1.0 - s)
}

/// Similarity percentage for a distance. Negative similarity maps to 0%.
pub fn similarity_percent(distance: f32) -> f32 {
    ((1.0 - distance).max(0.0) * 100.0).min(100.0)
}

/// A stored vector and its distance from the query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub id: CaseId,
    pub distance: f32,
}

/// Insert and nearest-k over fixed-dimension vectors.
pub trait VectorIndex: Send + Sync {
    /// Expected dimension, once known.
    fn dimension(&self) -> Option<usize>;

    /// Insert or replace the vector for `id`.
    fn insert(&mut self, id: CaseId, vector: Vec<f32>) -> Result<(), IndexError>;

    /// Up to `k` neighbours, ascending by distance.
    fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Brute-force index computing every distance on query.
#[derive(Debug, Clone, Default)]
pub struct FlatIndex {
    dimension: Option<usize>,
    vectors: BTreeMap<CaseId, Vec<f32>>,
}

impl FlatIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index that only accepts vectors of `dimension` entries.
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: Some(dimension),
            vectors: BTreeMap::new(),
        }
    }

    fn check(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.is_empty() {
            return Err(IndexError::Empty);
        }
        match self.dimension {
            Some(expected) if expected != vector.len() => Err(IndexError::DimensionMismatch {
                expected,
                actual: vector.len(),
            }),
            _ => Ok(()),
        }
    }
}

impl VectorIndex for FlatIndex {
    fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    fn insert(&mut self, id: CaseId, vector: Vec<f32>) -> Result<(), IndexError> {
        self.check(&vector)?;
        self.dimension.get_or_insert(vector.len());
        self.vectors.insert(id, vector);
        Ok(())
    }

    fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        self.check(query)?;

        let mut neighbors: Vec<Neighbor> = self
            .vectors
            .iter()
            .filter_map(|(id, stored)| {
                cosine_distance(query, stored).map(|distance| Neighbor { id: *id, distance })
            })
            .collect();

        neighbors.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id)));
        neighbors.truncate(k);
        Ok(neighbors)
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }
}
