use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{RagError, Result};
use crate::llm::{Embedder, InputKind};
use crate::store::Records;

/// Records embedded per capability call during a build.
const EMBED_BATCH: usize = 64;

/// A stored vector entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub record_id: String,
    /// SHA-256 of the record's `embedding_text`, lowercase hex
    pub content_hash: String,
    /// Unit-length vector
    pub vector: Vec<f32>,
}

/// One fully built index generation. Vectors are L2-normalized, so the inner
/// product used by [`IndexSnapshot::search`] is cosine similarity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSnapshot {
    generation: u64,
    dimension: usize,
    normalized: bool,
    built_at: DateTime<Utc>,
    entries: Vec<IndexEntry>,
}

/// Counts from a build, for logging and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub reused: usize,
    pub embedded: usize,
}

pub fn content_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// Scale `v` to unit length in place. Returns false for zero or non-finite
/// vectors, which cannot be ranked.
pub fn normalize(v: &mut [f32]) -> bool {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return false;
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
    true
}

impl IndexSnapshot {
    /// Build a snapshot for every record in `records`.
    ///
    /// Vectors from `previous` are reused for any record whose content hash
    /// is unchanged; only the remaining texts are sent to `embedder`. Any
    /// failure discards the whole build.
    pub async fn build(
        records: &Records,
        embedder: &dyn Embedder,
        previous: Option<&IndexSnapshot>,
        timeout: Duration,
    ) -> Result<(IndexSnapshot, BuildStats)> {
        let dimension = embedder.dimension();

        let reusable: HashMap<&str, &[f32]> = previous
            .filter(|p| p.dimension == dimension)
            .map(|p| {
                p.entries
                    .iter()
                    .map(|e| (e.content_hash.as_str(), e.vector.as_slice()))
                    .collect()
            })
            .unwrap_or_default();

        let mut entries: Vec<IndexEntry> = Vec::with_capacity(records.len());
        // (position in entries, text) for records that need a fresh vector
        let mut pending: Vec<(usize, String)> = Vec::new();
        let mut stats = BuildStats::default();

        for record in records.iter() {
            let hash = content_hash(&record.embedding_text);
            let vector = match reusable.get(hash.as_str()) {
                Some(v) => {
                    stats.reused += 1;
                    v.to_vec()
                }
                None => {
                    pending.push((entries.len(), record.embedding_text.clone()));
                    Vec::new()
                }
            };
            entries.push(IndexEntry {
                record_id: record.id.clone(),
                content_hash: hash,
                vector,
            });
        }

        for batch in pending.chunks(EMBED_BATCH) {
            let texts: Vec<String> = batch.iter().map(|(_, t)| t.clone()).collect();
            let vectors = embed_with_timeout(embedder, &texts, InputKind::Document, timeout).await?;

            if vectors.len() != texts.len() {
                return Err(RagError::EncodingFailure(format!(
                    "embedder returned {} vectors for {} texts",
                    vectors.len(),
                    texts.len()
                )));
            }

            for ((position, _), mut vector) in batch.iter().zip(vectors) {
                if vector.len() != dimension {
                    return Err(RagError::DimensionMismatch {
                        expected: dimension,
                        actual: vector.len(),
                    });
                }
                if !normalize(&mut vector) {
                    return Err(RagError::EncodingFailure(format!(
                        "zero or non-finite vector for record '{}'",
                        entries[*position].record_id
                    )));
                }
                entries[*position].vector = vector;
                stats.embedded += 1;
            }
        }

        tracing::info!(
            "Built index generation {} ({} reused, {} embedded)",
            records.generation(),
            stats.reused,
            stats.embedded
        );

        Ok((
            IndexSnapshot {
                generation: records.generation(),
                dimension,
                normalized: true,
                built_at: Utc::now(),
                entries,
            },
            stats,
        ))
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn entry(&self, record_id: &str) -> Option<&IndexEntry> {
        self.entries.iter().find(|e| e.record_id == record_id)
    }

    /// Up to `k` `(record_id, score)` pairs with score >= `min_score`, best
    /// first, ties broken by ascending record id.
    pub fn search(&self, query: &[f32], k: usize, min_score: f32) -> Result<Vec<(String, f32)>> {
        if query.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut query = query.to_vec();
        let zero_query = !normalize(&mut query);

        let mut scored: Vec<(&str, f32)> = self
            .entries
            .iter()
            .map(|e| {
                let score = if zero_query { 0.0 } else { dot(&query, &e.vector) };
                (e.record_id.as_str(), score)
            })
            .filter(|(_, score)| *score >= min_score)
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(id, score)| (id.to_string(), score))
            .collect())
    }

    /// Write to `path` atomically (temp file + rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string(self)?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, data)?;
        std::fs::rename(&tmp_path, path)?;
        tracing::debug!("Persisted index generation {} to {}", self.generation, path.display());
        Ok(())
    }

    /// Read a snapshot written by [`IndexSnapshot::save`]. Returns `None`
    /// when nothing has been persisted yet.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(path)?;
        let snapshot: IndexSnapshot = serde_json::from_str(&data)?;
        if !snapshot.normalized {
            return Err(RagError::Config(format!(
                "persisted index at {} is not normalized",
                path.display()
            )));
        }
        if let Some(bad) = snapshot.entries.iter().find(|e| e.vector.len() != snapshot.dimension) {
            return Err(RagError::DimensionMismatch {
                expected: snapshot.dimension,
                actual: bad.vector.len(),
            });
        }
        Ok(Some(snapshot))
    }
}

/// The active index generation behind a single swappable handle. Readers
/// clone the `Arc` and keep a consistent snapshot for the whole query.
#[derive(Debug, Default)]
pub struct EmbeddingIndex {
    current: RwLock<Option<Arc<IndexSnapshot>>>,
}

impl EmbeddingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: IndexSnapshot) -> Arc<IndexSnapshot> {
        let snapshot = Arc::new(snapshot);
        *self.current.write() = Some(Arc::clone(&snapshot));
        snapshot
    }

    pub fn snapshot(&self) -> Option<Arc<IndexSnapshot>> {
        self.current.read().clone()
    }

    /// Current snapshot, provided it was built against `store_generation`
    /// and holds at least one entry.
    pub fn fresh_snapshot(&self, store_generation: u64) -> Result<Arc<IndexSnapshot>> {
        match self.snapshot() {
            Some(s) if s.generation == store_generation && !s.is_empty() => Ok(s),
            Some(s) => Err(RagError::IndexStale {
                index: s.generation,
                store: store_generation,
            }),
            None => Err(RagError::IndexStale {
                index: 0,
                store: store_generation,
            }),
        }
    }

    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        min_score: f32,
        store_generation: u64,
    ) -> Result<Vec<(String, f32)>> {
        self.fresh_snapshot(store_generation)?
            .search(query, k, min_score)
    }
}

pub(crate) async fn embed_with_timeout(
    embedder: &dyn Embedder,
    texts: &[String],
    kind: InputKind,
    timeout: Duration,
) -> Result<Vec<Vec<f32>>> {
    match tokio::time::timeout(timeout, embedder.embed(texts, kind)).await {
        Ok(Ok(vectors)) => Ok(vectors),
        Ok(Err(e)) => Err(RagError::EncodingFailure(format!("{e:#}"))),
        Err(_) => Err(RagError::Timeout {
            stage: "embedding",
            after: timeout,
        }),
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
