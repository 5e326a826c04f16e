use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{RagError, Result};

/// Process-wide configuration. Built once at startup and handed to each
/// component by value or reference; never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where the records file and persisted index live
    pub data_dir: PathBuf,
    /// Retrieval and context defaults for queries that leave them unset
    pub retrieval: RetrievalDefaults,
    /// LLM provider configuration
    pub llm: LlmConfig,
    /// Timeout for a single embedding call in seconds
    pub embed_timeout_secs: u64,
    /// Timeout for a single generation call in seconds
    pub generate_timeout_secs: u64,
    /// System instructions prepended to every grounded prompt
    pub system_instructions: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalDefaults {
    /// Maximum number of evidence records per query
    pub top_k: usize,
    /// Minimum cosine similarity a record needs to count as evidence
    pub min_score: f32,
    /// Context budget in characters
    pub context_budget: usize,
    /// Blend BM25 keyword ranks into the semantic ranking
    pub hybrid: bool,
    /// Diversity caps, e.g. at most one result per `company`
    #[serde(default)]
    pub max_per_field: BTreeMap<String, usize>,
}

impl Default for RetrievalDefaults {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_score: 0.25,
            context_budget: 6_000,
            hybrid: true,
            max_per_field: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "ollama", "openai" or "cohere"
    pub provider: String,
    /// Base URL for the LLM API
    pub base_url: String,
    /// Model name for answer generation
    pub chat_model: String,
    /// Model name for embeddings
    pub embedding_model: String,
    /// API key (only needed for cloud providers)
    pub api_key: Option<String>,
    /// Embedding vector dimension
    pub embedding_dim: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            retrieval: RetrievalDefaults::default(),
            llm: LlmConfig::default(),
            embed_timeout_secs: 30,
            generate_timeout_secs: 120,
            system_instructions: default_system_instructions(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            chat_model: "llama3.2".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            api_key: None,
            embedding_dim: 768,
        }
    }
}

pub fn default_system_instructions() -> String {
    String::from(
        "You are an assistant that answers questions about startup founders.\n\
         Each user message includes founder records retrieved from a fixed dataset.\n\
         Answer ONLY from those records. Never use outside knowledge.\n\
         Cite every record you rely on with its tag, for example [A1].\n\
         If the records do not answer the question, say what you found and what is missing.",
    )
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("FOUNDER_RAG_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(val) = std::env::var("FOUNDER_RAG_TOP_K") {
            if let Ok(v) = val.parse() {
                config.retrieval.top_k = v;
            }
        }
        if let Ok(val) = std::env::var("FOUNDER_RAG_MIN_SCORE") {
            if let Ok(v) = val.parse() {
                config.retrieval.min_score = v;
            }
        }
        if let Ok(val) = std::env::var("FOUNDER_RAG_CONTEXT_BUDGET") {
            if let Ok(v) = val.parse() {
                config.retrieval.context_budget = v;
            }
        }
        if let Ok(val) = std::env::var("FOUNDER_RAG_HYBRID") {
            if let Ok(v) = val.parse() {
                config.retrieval.hybrid = v;
            }
        }
        if let Ok(val) = std::env::var("FOUNDER_RAG_MAX_PER_FIELD") {
            config.retrieval.max_per_field = parse_field_caps(&val);
        }
        if let Ok(val) = std::env::var("FOUNDER_RAG_EMBED_TIMEOUT_SECS") {
            if let Ok(v) = val.parse() {
                config.embed_timeout_secs = v;
            }
        }
        if let Ok(val) = std::env::var("FOUNDER_RAG_GENERATE_TIMEOUT_SECS") {
            if let Ok(v) = val.parse() {
                config.generate_timeout_secs = v;
            }
        }
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("LLM_CHAT_MODEL") {
            config.llm.chat_model = model;
        }
        if let Ok(model) = std::env::var("LLM_EMBEDDING_MODEL") {
            config.llm.embedding_model = model;
        }
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            config.llm.api_key = Some(key);
        }
        if let Ok(dim) = std::env::var("LLM_EMBEDDING_DIM") {
            if let Ok(d) = dim.parse() {
                config.llm.embedding_dim = d;
            }
        }

        config
    }

    /// Reject settings that would make the pipeline unusable. Called before
    /// any component is constructed.
    pub fn validate(&self) -> Result<()> {
        if self.retrieval.top_k == 0 {
            return Err(RagError::Config("top_k must be at least 1".into()));
        }
        if !(-1.0..=1.0).contains(&self.retrieval.min_score) {
            return Err(RagError::Config(format!(
                "min_score {} is outside [-1, 1]",
                self.retrieval.min_score
            )));
        }
        if self.retrieval.context_budget == 0 {
            return Err(RagError::Config("context budget must be positive".into()));
        }
        if let Some((field, _)) = self.retrieval.max_per_field.iter().find(|(_, n)| **n == 0) {
            return Err(RagError::Config(format!(
                "diversity cap for '{field}' must be at least 1"
            )));
        }
        if self.llm.embedding_dim == 0 {
            return Err(RagError::Config("embedding_dim must be positive".into()));
        }
        if self.embed_timeout_secs == 0 || self.generate_timeout_secs == 0 {
            return Err(RagError::Config("timeouts must be positive".into()));
        }
        match self.llm.provider.as_str() {
            "ollama" | "openai" | "cohere" => Ok(()),
            other => Err(RagError::Config(format!("Unknown LLM provider: {other}"))),
        }
    }

    pub fn embed_timeout(&self) -> Duration {
        Duration::from_secs(self.embed_timeout_secs)
    }

    pub fn generate_timeout(&self) -> Duration {
        Duration::from_secs(self.generate_timeout_secs)
    }

    pub fn records_path(&self) -> PathBuf {
        self.data_dir.join("founders.json")
    }

    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join("index").join("vectors.json")
    }
}

/// Parse `company=1,location=2`. Malformed pairs are ignored.
fn parse_field_caps(val: &str) -> BTreeMap<String, usize> {
    val.split(',')
        .filter_map(|pair| {
            let (field, n) = pair.split_once('=')?;
            let field = field.trim();
            if field.is_empty() {
                return None;
            }
            Some((field.to_string(), n.trim().parse().ok()?))
        })
        .collect()
}
