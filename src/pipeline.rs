//! The assembled pipeline: one config, one store, one index per generation.

use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::context::assemble;
use crate::encoder::QueryEncoder;
use crate::error::{RagError, Result};
use crate::generation::Orchestrator;
use crate::llm::{Embedder, Generator};
use crate::models::{QueryRequest, QueryResponse, RetrievalConfig, RetrievalResult};
use crate::retriever::Retriever;
use crate::search::{BuildStats, EmbeddingIndex, IndexSnapshot, KeywordHandle, KeywordIndex};
use crate::store::{read_records_file, RecordInput, RecordStore, Records, StoreSnapshot};

/// Outcome of a successful `load_records`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    pub generation: u64,
    pub records: usize,
    pub stats: BuildStats,
}

pub struct Pipeline {
    config: Config,
    store: Arc<RecordStore>,
    index: Arc<EmbeddingIndex>,
    embedder: Arc<dyn Embedder>,
    retriever: Retriever,
    orchestrator: Orchestrator,
    /// Serializes rebuilds. Holds the snapshot whose vectors the next build
    /// may reuse: the last published one, or the one restored from disk.
    rebuild: tokio::sync::Mutex<Option<Arc<IndexSnapshot>>>,
}

impl Pipeline {
    /// Validate `config` against the capabilities and any persisted index.
    /// Any mismatch here is fatal; a pipeline is never half-configured.
    pub fn new(
        config: Config,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
    ) -> Result<Self> {
        config.validate()?;

        let encoder = QueryEncoder::new(Arc::clone(&embedder), config.embed_timeout());
        encoder.verify(config.llm.embedding_dim)?;

        let restored = IndexSnapshot::load(&config.index_path())?;
        if let Some(snapshot) = &restored {
            if snapshot.dimension() != config.llm.embedding_dim {
                return Err(RagError::DimensionMismatch {
                    expected: config.llm.embedding_dim,
                    actual: snapshot.dimension(),
                });
            }
            tracing::info!(
                "Restored persisted index ({} entries, built {}) as reuse source",
                snapshot.len(),
                snapshot.built_at()
            );
        }

        let store = Arc::new(RecordStore::new());
        let index = Arc::new(EmbeddingIndex::new());
        let retriever = Retriever::new(
            encoder,
            Arc::clone(&store),
            Arc::clone(&index),
            Arc::new(KeywordHandle::new()),
        );
        let orchestrator = Orchestrator::new(generator, config.generate_timeout());

        Ok(Self {
            config,
            store,
            index,
            embedder,
            retriever,
            orchestrator,
            rebuild: tokio::sync::Mutex::new(restored.map(Arc::new)),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The record set queries are currently served from.
    pub fn records(&self) -> Arc<StoreSnapshot> {
        self.store.snapshot()
    }

    pub fn index(&self) -> Option<Arc<IndexSnapshot>> {
        self.index.snapshot()
    }

    /// Replace the record set and publish indexes for the new generation.
    ///
    /// The new records, vector index and keyword index are all built before
    /// any of them is published, so queries keep answering from the previous
    /// generation while embedding runs. Any failure leaves that generation
    /// in place.
    pub async fn load_records(&self, inputs: Vec<RecordInput>) -> Result<LoadReport> {
        let mut previous = self.rebuild.lock().await;
        let snapshot = self.store.prepare(inputs)?;
        self.build_and_publish(snapshot, &mut previous).await
    }

    /// Read a JSON records file and load it.
    pub async fn load_records_file(&self, path: &Path) -> Result<LoadReport> {
        let inputs = read_records_file(path)?;
        self.load_records(inputs).await
    }

    async fn build_and_publish(
        &self,
        snapshot: StoreSnapshot,
        previous: &mut Option<Arc<IndexSnapshot>>,
    ) -> Result<LoadReport> {
        let snapshot = Arc::new(snapshot);
        let records = Records::from(Arc::clone(&snapshot));

        let keyword_index = KeywordIndex::build(&records)?;
        let (index_snapshot, stats) = IndexSnapshot::build(
            &records,
            self.embedder.as_ref(),
            previous.as_deref(),
            self.config.embed_timeout(),
        )
        .await?;

        let published = self
            .retriever
            .publish(snapshot, index_snapshot, keyword_index);
        *previous = Some(published);

        tracing::info!(
            "Published generation {} ({} records)",
            records.generation(),
            records.len()
        );
        Ok(LoadReport {
            generation: records.generation(),
            records: records.len(),
            stats,
        })
    }

    /// Retrieval only, with request overrides applied to the defaults.
    pub async fn search(&self, request: &QueryRequest) -> Result<RetrievalResult> {
        let config = self.retrieval_config(request);
        self.retriever.retrieve(&request.query_text, &config).await
    }

    /// Full query path: retrieve, assemble, generate.
    pub async fn ask(&self, request: &QueryRequest) -> Result<QueryResponse> {
        let budget = request
            .budget
            .unwrap_or(self.config.retrieval.context_budget);
        if budget == 0 {
            return Err(RagError::InvalidQuery("budget must be positive".into()));
        }

        // Retrieval and assembly both read this one generation
        let view = self.retriever.view()?;
        let config = self.retrieval_config(request);
        let result = self
            .retriever
            .retrieve_in(&view, &request.query_text, &config)
            .await?;

        let context = assemble(&result, &view.store, budget);
        let answer = self
            .orchestrator
            .generate(&request.query_text, &context, &self.config.system_instructions)
            .await?;

        tracing::info!(
            "Answered query with {} retrieved, {} in context, {} cited",
            result.len(),
            context.snippets.len(),
            answer.citations.len()
        );

        Ok(QueryResponse {
            retrieved_ids: result.ids(),
            truncated: context.truncated,
            dropped_count: context.dropped_count,
            generation: result.generation,
            answer,
        })
    }

    /// Write the published index to the configured path. Returns `false`
    /// when nothing has been built yet.
    pub fn persist_index(&self) -> Result<bool> {
        match self.index.snapshot() {
            Some(snapshot) => {
                snapshot.save(&self.config.index_path())?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn retrieval_config(&self, request: &QueryRequest) -> RetrievalConfig {
        let defaults = &self.config.retrieval;
        RetrievalConfig {
            top_k: request.top_k.unwrap_or(defaults.top_k),
            min_score: request.min_score.unwrap_or(defaults.min_score),
            max_per_field: defaults.max_per_field.clone(),
            hybrid: defaults.hybrid,
        }
    }
}
