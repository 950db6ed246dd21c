//! Semantic Cache of Known-Good Queries
//!
//! Holds previously validated question/SQL pairs, loaded once at start-up and
//! read-only afterwards. Lookups go exact-match first, then nearest neighbor
//! by cosine similarity over the precomputed embeddings.
//!
//! Share it across requests as `Arc<SemanticCache>`; nothing mutates it after
//! construction, so concurrent reads need no locking.

pub mod index;
pub mod record;

use crate::embedder::{Embedder, Embedding};
use crate::error::{ResolverError, Result};
use crate::normalizer::QueryNormalizer;
use index::{LinearScanIndex, NeighborIndex};
use record::{KnownQueryRecord, KnownQueryRow, KnownQuerySource};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub use index::{cosine_similarity, Neighbor};
pub use record::SourceLoad;

/// How a cached query was matched
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Similar { score: f32 },
}

/// A successful cache lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheHit {
    pub sql: String,
    pub record_index: usize,
    pub matched_query: String,
    pub kind: MatchKind,
}

pub struct SemanticCache {
    records: Vec<KnownQueryRecord>,
    /// normalized query -> first record position in load order
    exact_index: HashMap<String, usize>,
    neighbors: Box<dyn NeighborIndex>,
    embedder: Arc<dyn Embedder>,
    normalizer: QueryNormalizer,
}

impl SemanticCache {
    /// A cache with no records; every lookup misses.
    pub fn empty(embedder: Arc<dyn Embedder>) -> Self {
        Self::from_records(Vec::new(), embedder)
    }

    /// Build from source rows, embedding each normalized query.
    ///
    /// A row whose embedding fails, or whose dimension disagrees with the
    /// first embedded row, is dropped as a whole so records and embeddings
    /// stay aligned.
    pub async fn build(rows: Vec<KnownQueryRow>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let normalizer = QueryNormalizer::new();
        let total = rows.len();
        let mut records: Vec<KnownQueryRecord> = Vec::with_capacity(total);
        let mut dimension: Option<usize> = None;
        let mut failures = 0usize;

        for row in rows {
            let normalized_query = normalizer.normalize(&row.user_query);
            let embedding = match embedder.embed(&normalized_query).await {
                Ok(embedding) => embedding,
                Err(e) => {
                    warn!("Failed to embed known query '{}': {}", row.user_query, e);
                    failures += 1;
                    continue;
                }
            };

            let expected = *dimension.get_or_insert(embedding.len());
            if embedding.len() != expected {
                warn!(
                    "Embedding dimension {} doesn't match cache dimension {} for '{}'",
                    embedding.len(),
                    expected,
                    row.user_query
                );
                failures += 1;
                continue;
            }

            records.push(KnownQueryRecord {
                raw_query: row.user_query,
                normalized_query,
                embedding,
                sql: row.sql_query,
            });
        }

        if total > 0 && records.is_empty() {
            return Err(ResolverError::Cache(format!(
                "none of {} known-good queries could be embedded",
                total
            )));
        }
        info!(
            "✅ Semantic cache built with {} of {} queries ({} dropped)",
            records.len(),
            total,
            failures
        );
        Ok(Self::from_records(records, embedder))
    }

    /// Build from already-embedded records (fixtures, snapshots).
    pub fn from_records(records: Vec<KnownQueryRecord>, embedder: Arc<dyn Embedder>) -> Self {
        let mut exact_index = HashMap::new();
        for (position, record) in records.iter().enumerate() {
            exact_index
                .entry(record.normalized_query.clone())
                .or_insert(position);
        }
        let embeddings: Vec<Embedding> = records.iter().map(|r| r.embedding.clone()).collect();
        Self {
            records,
            exact_index,
            neighbors: Box::new(LinearScanIndex::new(embeddings)),
            embedder,
            normalizer: QueryNormalizer::new(),
        }
    }

    /// Load the CSV source and build; any failure yields an empty cache.
    pub async fn load_or_empty(path: &Path, embedder: Arc<dyn Embedder>) -> Self {
        info!("🔃 Loading known-good queries from {}", path.display());
        let load = match KnownQuerySource::from_csv_path(path) {
            Ok(load) => load,
            Err(e) => {
                error!("Error loading known-good queries: {}", e);
                return Self::empty(embedder);
            }
        };
        match Self::build(load.rows, embedder.clone()).await {
            Ok(cache) => cache,
            Err(e) => {
                error!("Error building semantic cache: {}", e);
                Self::empty(embedder)
            }
        }
    }

    /// Replace the nearest-neighbor index. The index must hold the same
    /// embeddings in record order.
    pub fn with_index(mut self, neighbors: Box<dyn NeighborIndex>) -> Self {
        if neighbors.len() != self.records.len() {
            warn!(
                "Ignoring neighbor index with {} entries for {} records",
                neighbors.len(),
                self.records.len()
            );
            return self;
        }
        self.neighbors = neighbors;
        self
    }

    pub fn records(&self) -> &[KnownQueryRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Exact match after normalization; first record in load order wins.
    pub fn find_exact_match(&self, query: &str) -> Option<CacheHit> {
        if self.is_empty() {
            debug!("Semantic cache is empty, skipping exact match");
            return None;
        }
        let normalized = self.normalizer.normalize(query);
        if normalized.is_empty() {
            return None;
        }
        debug!("Searching exact match for '{}' (normalized '{}')", query, normalized);

        let position = *self.exact_index.get(&normalized)?;
        let record = &self.records[position];
        Some(CacheHit {
            sql: record.sql.clone(),
            record_index: position,
            matched_query: record.raw_query.clone(),
            kind: MatchKind::Exact,
        })
    }

    /// Nearest neighbor by cosine similarity, accepted when `score >= threshold`.
    pub async fn find_similar_match(&self, query: &str, threshold: f32) -> Result<Option<CacheHit>> {
        if self.is_empty() {
            debug!("Semantic cache is empty, skipping similar match");
            return Ok(None);
        }
        let normalized = self.normalizer.normalize(query);
        if normalized.is_empty() {
            return Ok(None);
        }

        let query_embedding = self.embedder.embed(&normalized).await?;
        let Some(best) = self.neighbors.nearest(&query_embedding) else {
            return Ok(None);
        };
        let record = &self.records[best.index];
        debug!(
            "Best similar match '{}' with score {:.4} (threshold {})",
            record.raw_query, best.score, threshold
        );

        if best.score >= threshold {
            Ok(Some(CacheHit {
                sql: record.sql.clone(),
                record_index: best.index,
                matched_query: record.raw_query.clone(),
                kind: MatchKind::Similar { score: best.score },
            }))
        } else {
            Ok(None)
        }
    }
}
