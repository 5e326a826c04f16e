//! Retriever: query text in, ranked evidence out.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::encoder::QueryEncoder;
use crate::error::{RagError, Result};
use crate::models::{RetrievalConfig, RetrievalHit, RetrievalResult};
use crate::search::hybrid::{rrf_fusion, RankedList};
use crate::search::{EmbeddingIndex, IndexSnapshot, KeywordHandle, KeywordIndex};
use crate::store::{RecordStore, StoreSnapshot};

/// Candidates fetched per requested result when fusing or capping
const CANDIDATE_MULTIPLIER: usize = 3;

/// The store, vector index and keyword index of one published generation.
#[derive(Clone)]
pub struct View {
    pub store: Arc<StoreSnapshot>,
    pub index: Arc<IndexSnapshot>,
    pub keywords: Arc<KeywordIndex>,
}

#[derive(Clone)]
pub struct Retriever {
    encoder: QueryEncoder,
    store: Arc<RecordStore>,
    index: Arc<EmbeddingIndex>,
    keywords: Arc<KeywordHandle>,
    /// Held for writing while the three handles are swapped, for reading
    /// while a [`View`] is taken.
    gate: Arc<RwLock<()>>,
}

impl Retriever {
    pub fn new(
        encoder: QueryEncoder,
        store: Arc<RecordStore>,
        index: Arc<EmbeddingIndex>,
        keywords: Arc<KeywordHandle>,
    ) -> Self {
        Self {
            encoder,
            store,
            index,
            keywords,
            gate: Arc::new(RwLock::new(())),
        }
    }

    /// Swap in a fully built generation. Readers see either the old three
    /// snapshots or the new three, never a mix.
    pub fn publish(
        &self,
        store: Arc<StoreSnapshot>,
        index: IndexSnapshot,
        keywords: KeywordIndex,
    ) -> Arc<IndexSnapshot> {
        let _gate = self.gate.write();
        self.keywords.publish(keywords);
        let index = self.index.publish(index);
        self.store.publish(store);
        index
    }

    /// The current generation, or `IndexStale` if no index matches the store.
    pub fn view(&self) -> Result<View> {
        let _gate = self.gate.read();
        let store = self.store.snapshot();
        let generation = store.generation();
        let index = self.index.fresh_snapshot(generation)?;
        let keywords = self.keywords.fresh(generation)?;
        Ok(View {
            store,
            index,
            keywords,
        })
    }

    /// Rank records for `query_text` against the current generation.
    pub async fn retrieve(
        &self,
        query_text: &str,
        config: &RetrievalConfig,
    ) -> Result<RetrievalResult> {
        check_query(query_text, config)?;
        let view = self.view()?;
        self.retrieve_in(&view, query_text, config).await
    }

    /// Rank records for `query_text` within `view`.
    ///
    /// Only records with cosine similarity >= `min_score` are admitted. With
    /// `hybrid` set, BM25 ranks reorder the admitted records via RRF and the
    /// reported score is the fused score; otherwise it is the cosine
    /// similarity. Encoder failures fail the whole retrieval.
    pub async fn retrieve_in(
        &self,
        view: &View,
        query_text: &str,
        config: &RetrievalConfig,
    ) -> Result<RetrievalResult> {
        check_query(query_text, config)?;
        let query_text = query_text.trim();
        let store = &view.store;
        let index = &view.index;
        let generation = store.generation();

        let query_vector = self.encoder.encode(query_text).await?;

        let candidate_k = if config.max_per_field.is_empty() {
            config.top_k.saturating_mul(CANDIDATE_MULTIPLIER)
        } else {
            index.len()
        };
        let vector_hits = index.search(&query_vector, candidate_k, config.min_score)?;

        let ranked: Vec<(String, f32)> = if config.hybrid && !vector_hits.is_empty() {
            let keyword_hits = view.keywords.search(query_text, store.len())?;
            let admitted: HashSet<String> = vector_hits.iter().map(|(id, _)| id.clone()).collect();
            rrf_fusion(
                &[
                    RankedList::vector(vector_hits),
                    RankedList::keyword(keyword_hits),
                ],
                Some(&admitted),
            )
            .into_iter()
            .map(|h| (h.record_id, h.combined_score))
            .collect()
        } else {
            vector_hits
        };

        let capped = apply_diversity_caps(ranked, store, config);

        let hits: Vec<RetrievalHit> = capped
            .into_iter()
            .take(config.top_k)
            .enumerate()
            .map(|(rank, (record_id, score))| RetrievalHit {
                record_id,
                score,
                rank,
            })
            .collect();

        tracing::debug!(
            "Retrieved {} records for query (generation {generation}, hybrid {})",
            hits.len(),
            config.hybrid
        );

        Ok(RetrievalResult { hits, generation })
    }
}

fn check_query(query_text: &str, config: &RetrievalConfig) -> Result<()> {
    if query_text.trim().is_empty() {
        return Err(RagError::InvalidQuery("query text is empty".into()));
    }
    if config.top_k == 0 {
        return Err(RagError::InvalidQuery("top_k must be at least 1".into()));
    }
    Ok(())
}

/// Drop candidates once `max_per_field[field]` results already share the
/// same (case-insensitive) value. Records without the field are never capped.
fn apply_diversity_caps(
    ranked: Vec<(String, f32)>,
    store: &StoreSnapshot,
    config: &RetrievalConfig,
) -> Vec<(String, f32)> {
    if config.max_per_field.is_empty() {
        return ranked;
    }

    let mut seen: HashMap<(&str, String), usize> = HashMap::new();
    let mut kept = Vec::with_capacity(ranked.len());

    for (record_id, score) in ranked {
        let Ok(record) = store.get(&record_id) else {
            tracing::warn!("Ranked record '{record_id}' missing from store; skipping");
            continue;
        };

        let keys: Vec<(&str, String)> = config
            .max_per_field
            .keys()
            .filter_map(|field| {
                record
                    .field(field)
                    .map(|v| (field.as_str(), v.to_string().trim().to_lowercase()))
            })
            .collect();

        let over_cap = keys.iter().any(|key| {
            let limit = config.max_per_field[key.0];
            seen.get(key).copied().unwrap_or(0) >= limit
        });
        if over_cap {
            continue;
        }

        for key in keys {
            *seen.entry(key).or_insert(0) += 1;
        }
        kept.push((record_id, score));
    }

    kept
}
