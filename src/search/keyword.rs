use parking_lot::RwLock;
use std::sync::Arc;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::*;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy};

use crate::error::{RagError, Result};
use crate::store::Records;

/// Indexing heap for the single writer thread.
const WRITER_HEAP_BYTES: usize = 50_000_000;

/// BM25 keyword index built on tantivy, held in RAM for one store generation.
pub struct KeywordIndex {
    generation: u64,
    index: Index,
    reader: IndexReader,
    f_record_id: Field,
    f_text: Field,
}

fn keyword_err(context: &str) -> impl Fn(tantivy::TantivyError) -> RagError + '_ {
    move |e| RagError::KeywordIndex(format!("{context}: {e}"))
}

impl KeywordIndex {
    /// Index the `embedding_text` of every record.
    pub fn build(records: &Records) -> Result<Self> {
        let mut schema_builder = Schema::builder();
        let f_record_id = schema_builder.add_text_field("record_id", STRING | STORED);
        let f_text = schema_builder.add_text_field("text", TEXT);
        let schema = schema_builder.build();

        let index = Index::create_in_ram(schema);
        let mut writer: IndexWriter = index
            .writer_with_num_threads(1, WRITER_HEAP_BYTES)
            .map_err(keyword_err("Failed to create index writer"))?;

        for record in records.iter() {
            writer
                .add_document(doc!(
                    f_record_id => record.id.clone(),
                    f_text => record.embedding_text.clone(),
                ))
                .map_err(keyword_err("Failed to add document"))?;
        }

        writer
            .commit()
            .map_err(keyword_err("Failed to commit index"))?;

        let reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(keyword_err("Failed to create reader"))?;

        Ok(Self {
            generation: records.generation(),
            index,
            reader,
            f_record_id,
            f_text,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Up to `limit` `(record_id, bm25_score)` pairs, best first. Query
    /// syntax errors are tolerated; only terms that parse are used.
    pub fn search(&self, query_str: &str, limit: usize) -> Result<Vec<(String, f32)>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();
        let query_parser = QueryParser::for_index(&self.index, vec![self.f_text]);
        let (query, errors) = query_parser.parse_query_lenient(query_str);
        if !errors.is_empty() {
            tracing::debug!("Ignored {} query syntax errors in '{query_str}'", errors.len());
        }

        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(limit))
            .map_err(keyword_err("Search failed"))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(doc_address)
                .map_err(keyword_err("Failed to retrieve document"))?;

            let Some(record_id) = doc.get_first(self.f_record_id).and_then(|v| v.as_str()) else {
                continue;
            };
            hits.push((record_id.to_string(), score));
        }

        Ok(hits)
    }
}

/// The active keyword index behind a swappable handle.
#[derive(Default)]
pub struct KeywordHandle {
    current: RwLock<Option<Arc<KeywordIndex>>>,
}

impl KeywordHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, index: KeywordIndex) {
        *self.current.write() = Some(Arc::new(index));
    }

    /// Current index, provided it was built against `store_generation`.
    pub fn fresh(&self, store_generation: u64) -> Result<Arc<KeywordIndex>> {
        match self.current.read().as_ref() {
            Some(index) if index.generation == store_generation => Ok(Arc::clone(index)),
            Some(index) => Err(RagError::IndexStale {
                index: index.generation,
                store: store_generation,
            }),
            None => Err(RagError::IndexStale {
                index: 0,
                store: store_generation,
            }),
        }
    }
}
