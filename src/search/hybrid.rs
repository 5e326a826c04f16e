use std::collections::{HashMap, HashSet};

/// RRF smoothing constant
const RRF_K: f32 = 60.0;

/// Weight of the semantic ranking in fusion
pub const VECTOR_WEIGHT: f32 = 1.0;
/// Weight of the BM25 ranking in fusion
pub const KEYWORD_WEIGHT: f32 = 0.5;

/// Which ranking a list came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Vector,
    Keyword,
}

/// One ranked `(record_id, raw_score)` list with its fusion weight.
#[derive(Debug, Clone)]
pub struct RankedList {
    pub source: Source,
    pub hits: Vec<(String, f32)>,
    pub weight: f32,
}

impl RankedList {
    pub fn vector(hits: Vec<(String, f32)>) -> Self {
        Self {
            source: Source::Vector,
            hits,
            weight: VECTOR_WEIGHT,
        }
    }

    pub fn keyword(hits: Vec<(String, f32)>) -> Self {
        Self {
            source: Source::Keyword,
            hits,
            weight: KEYWORD_WEIGHT,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FusedHit {
    pub record_id: String,
    pub vector_score: f32,
    pub keyword_score: f32,
    pub combined_score: f32,
}

/// Weighted Reciprocal Rank Fusion.
///
/// Each list contributes `weight / (RRF_K + rank + 1)` to every record it
/// ranks. When `admitted` is given, records outside it are ignored, so
/// keyword matches can reorder but never introduce evidence. Output is
/// sorted by combined score, ties by ascending record id.
pub fn rrf_fusion(lists: &[RankedList], admitted: Option<&HashSet<String>>) -> Vec<FusedHit> {
    let mut score_map: HashMap<&str, FusedHit> = HashMap::new();

    for list in lists {
        for (rank, (record_id, raw)) in list.hits.iter().enumerate() {
            if admitted.is_some_and(|set| !set.contains(record_id)) {
                continue;
            }
            let rrf_score = list.weight * (1.0 / (RRF_K + rank as f32 + 1.0));

            let entry = score_map
                .entry(record_id.as_str())
                .or_insert_with(|| FusedHit {
                    record_id: record_id.clone(),
                    vector_score: 0.0,
                    keyword_score: 0.0,
                    combined_score: 0.0,
                });

            match list.source {
                Source::Vector => entry.vector_score = entry.vector_score.max(*raw),
                Source::Keyword => entry.keyword_score = entry.keyword_score.max(*raw),
            }
            entry.combined_score += rrf_score;
        }
    }

    let mut results: Vec<FusedHit> = score_map.into_values().collect();
    results.sort_by(|a, b| {
        b.combined_score
            .total_cmp(&a.combined_score)
            .then_with(|| a.record_id.cmp(&b.record_id))
    });
    results
}
