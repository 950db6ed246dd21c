//! Nearest-Neighbor Index
//!
//! Similarity search over the cache's fixed embedding set. The cache only
//! talks to [`NeighborIndex`], so an approximate index can replace the linear
//! scan without changing cache behaviour at the call site.

use crate::embedder::Embedding;

/// Best match returned by a [`NeighborIndex`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Position of the matched embedding (equals the record position)
    pub index: usize,
    pub score: f32,
}

pub trait NeighborIndex: Send + Sync {
    /// Highest-scoring entry for `query`; ties resolve to the lowest position.
    fn nearest(&self, query: &[f32]) -> Option<Neighbor>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exhaustive cosine-similarity scan
///
/// O(n) per lookup, fine for a few hundred validated queries.
#[derive(Debug, Clone, Default)]
pub struct LinearScanIndex {
    embeddings: Vec<Embedding>,
}

impl LinearScanIndex {
    /// Build from embeddings in record order
    pub fn new(embeddings: Vec<Embedding>) -> Self {
        Self { embeddings }
    }
}

impl NeighborIndex for LinearScanIndex {
    fn nearest(&self, query: &[f32]) -> Option<Neighbor> {
        let mut best: Option<Neighbor> = None;
        for (index, embedding) in self.embeddings.iter().enumerate() {
            let score = cosine_similarity(query, embedding);
            // Strict comparison keeps the earliest entry on ties
            match best {
                Some(current) if score <= current.score => {}
                _ => best = Some(Neighbor { index, score }),
            }
        }
        best
    }

    fn len(&self) -> usize {
        self.embeddings.len()
    }
}

/// Compute cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let score = dot_product / (norm_a * norm_b);
    if score.is_nan() {
        0.0
    } else {
        score
    }
}
