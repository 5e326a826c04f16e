use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Fields the founder template knows how to place. A record carrying any of
/// them is composed with the template; anything else falls back to
/// `field: value` lines.
const TEMPLATE_FIELDS: [&str; 7] = [
    "founder_name",
    "role",
    "company",
    "location",
    "idea",
    "about",
    "keywords",
];

/// A scalar field value as it arrives from the ingestion pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(f64),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            FieldValue::Number(n) => write!(f, "{n}"),
        }
    }
}

/// One founder entity. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    /// Named fields in ingestion order
    pub fields: Vec<(String, FieldValue)>,
    /// Text used for semantic and keyword indexing
    pub embedding_text: String,
}

impl Record {
    pub fn new(id: impl Into<String>, fields: Vec<(String, FieldValue)>) -> Self {
        let embedding_text = compose_embedding_text(&fields);
        Self {
            id: id.into(),
            fields,
            embedding_text,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    /// Human-readable rendering of every field, one per line, used as the
    /// evidence snippet in prompts.
    pub fn render(&self) -> String {
        self.fields
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn compose_embedding_text(fields: &[(String, FieldValue)]) -> String {
    let uses_template = fields
        .iter()
        .any(|(k, _)| TEMPLATE_FIELDS.contains(&k.as_str()));

    if !uses_template {
        return fields
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect::<Vec<_>>()
            .join("\n");
    }

    let get = |name: &str| {
        fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.to_string())
            .unwrap_or_default()
    };

    format!(
        "{}, {} at {}, {}. Idea: {}. Bio: {}. Keywords: {}.",
        get("founder_name"),
        get("role"),
        get("company"),
        get("location"),
        get("idea"),
        get("about"),
        get("keywords"),
    )
}

/// Per-query retrieval settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub min_score: f32,
    /// At most N results sharing the same value of the named field
    #[serde(default)]
    pub max_per_field: BTreeMap<String, usize>,
    #[serde(default)]
    pub hybrid: bool,
}

impl RetrievalConfig {
    pub fn new(top_k: usize, min_score: f32) -> Self {
        Self {
            top_k,
            min_score,
            max_per_field: BTreeMap::new(),
            hybrid: false,
        }
    }
}

/// A single ranked piece of evidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalHit {
    pub record_id: String,
    pub score: f32,
    /// 0-based position in the result
    pub rank: usize,
}

/// Ordered evidence for one query: scores non-increasing by rank, ids distinct.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub hits: Vec<RetrievalHit>,
    /// Store generation the result was computed against
    pub generation: u64,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn ids(&self) -> Vec<String> {
        self.hits.iter().map(|h| h.record_id.clone()).collect()
    }
}

/// Evidence text actually placed in the prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    pub record_id: String,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssembledContext {
    pub snippets: Vec<Snippet>,
    pub truncated: bool,
    pub dropped_count: usize,
    /// Characters used by the included snippets
    pub size: usize,
    pub budget: usize,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }

    pub fn contains(&self, record_id: &str) -> bool {
        self.snippets.iter().any(|s| s.record_id == record_id)
    }
}

/// Final answer returned to the service layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    /// Record ids cited in `text` that were present in the context
    pub citations: Vec<String>,
    /// False when no evidence was available and the answer is a refusal
    pub grounded: bool,
}

/// Query request from the service layer; unset fields fall back to defaults
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryRequest {
    pub query_text: String,
    pub top_k: Option<usize>,
    pub min_score: Option<f32>,
    pub budget: Option<usize>,
}

impl QueryRequest {
    pub fn new(query_text: impl Into<String>) -> Self {
        Self {
            query_text: query_text.into(),
            ..Self::default()
        }
    }
}

/// Answer plus the diagnostics a caller needs to render citations
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub answer: Answer,
    pub retrieved_ids: Vec<String>,
    pub truncated: bool,
    pub dropped_count: usize,
    pub generation: u64,
}
